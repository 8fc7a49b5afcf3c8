use async_trait::async_trait;

use crate::error::RegistryError;
use crate::manifest::RenderableUnit;

/// Id resolved when a requested unit is not registered.
pub const DEFAULT_FALLBACK: &str = "default-fallback";

/// Registry of renderable units.
#[async_trait]
pub trait ComponentRegistry: Send + Sync {
  /// Whether a unit is registered under `id`.
  fn has(&self, id: &str) -> bool;

  /// Load the unit registered under `id`.
  async fn get(&self, id: &str) -> Result<RenderableUnit, RegistryError>;

  /// Resolve `requested` for `node_id`, falling back to [`DEFAULT_FALLBACK`].
  async fn resolve(&self, requested: &str, node_id: &str) -> Result<RenderableUnit, RegistryError> {
    if self.has(requested) {
      return self.get(requested).await;
    }

    if self.has(DEFAULT_FALLBACK) {
      tracing::debug!(
        requested,
        node_id,
        fallback = DEFAULT_FALLBACK,
        "component missing, using fallback"
      );
      return self.get(DEFAULT_FALLBACK).await;
    }

    Err(RegistryError::ComponentNotFound {
      requested: requested.to_string(),
      node_id: node_id.to_string(),
      fallback: DEFAULT_FALLBACK.to_string(),
    })
  }
}
