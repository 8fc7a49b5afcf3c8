use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::RegistryError;
use crate::manifest::RenderableUnit;
use crate::registry::{ComponentRegistry, DEFAULT_FALLBACK};

/// Registry backed by a map, populated at startup.
#[derive(Debug, Clone, Default)]
pub struct InMemoryComponentRegistry {
  units: HashMap<String, RenderableUnit>,
}

impl InMemoryComponentRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn register(&mut self, unit: RenderableUnit) {
    self.units.insert(unit.id.clone(), unit);
  }

  /// Builder-style registration of a unit with no props.
  pub fn with(mut self, id: impl Into<String>) -> Self {
    self.register(RenderableUnit::new(id));
    self
  }

  pub fn len(&self) -> usize {
    self.units.len()
  }

  pub fn is_empty(&self) -> bool {
    self.units.is_empty()
  }
}

#[async_trait]
impl ComponentRegistry for InMemoryComponentRegistry {
  fn has(&self, id: &str) -> bool {
    self.units.contains_key(id)
  }

  async fn get(&self, id: &str) -> Result<RenderableUnit, RegistryError> {
    self
      .units
      .get(id)
      .cloned()
      .ok_or_else(|| RegistryError::ComponentNotFound {
        requested: id.to_string(),
        node_id: String::new(),
        fallback: DEFAULT_FALLBACK.to_string(),
      })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_resolve_registered() {
    let registry = InMemoryComponentRegistry::new().with("welcome");
    let unit = registry.resolve("welcome", "a").await.unwrap();
    assert_eq!(unit.id, "welcome");
  }

  #[tokio::test]
  async fn test_resolve_uses_fallback() {
    let registry = InMemoryComponentRegistry::new().with(DEFAULT_FALLBACK);
    let unit = registry.resolve("missing", "a").await.unwrap();
    assert_eq!(unit.id, DEFAULT_FALLBACK);
  }

  #[tokio::test]
  async fn test_resolve_without_fallback_fails() {
    let registry = InMemoryComponentRegistry::new();
    let err = registry.resolve("missing", "node-7").await.unwrap_err();
    match err {
      RegistryError::ComponentNotFound {
        requested,
        node_id,
        fallback,
      } => {
        assert_eq!(requested, "missing");
        assert_eq!(node_id, "node-7");
        assert_eq!(fallback, DEFAULT_FALLBACK);
      }
      other => panic!("unexpected error: {other}"),
    }
  }
}
