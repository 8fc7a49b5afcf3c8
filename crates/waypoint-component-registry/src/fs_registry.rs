use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use crate::error::RegistryError;
use crate::manifest::{ComponentManifest, RenderableUnit};
use crate::registry::{ComponentRegistry, DEFAULT_FALLBACK};

/// Filesystem-based component registry.
///
/// Components are stored as one manifest per file:
/// ```text
/// {root}/
/// ├── default-fallback.json
/// ├── task.json
/// └── kiosk--welcome.json      (id "kiosk/welcome")
/// ```
///
/// The directory is indexed once on [`FsComponentRegistry::open`]; manifests
/// are read lazily on `get`.
pub struct FsComponentRegistry {
  root: PathBuf,
  index: HashMap<String, PathBuf>,
}

impl FsComponentRegistry {
  /// Index the registry at the given root path. A missing root is an empty registry.
  pub async fn open(root: impl Into<PathBuf>) -> Result<Self, RegistryError> {
    let root = root.into();
    let mut index = HashMap::new();

    if fs::try_exists(&root).await? {
      let mut entries = fs::read_dir(&root).await?;
      while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !path.is_file() {
          continue;
        }

        let file_name = match path.file_name().and_then(|n| n.to_str()) {
          Some(n) => n,
          None => continue,
        };

        if let Some(id) = Self::parse_file_name(file_name) {
          index.insert(id, path);
        }
      }
    }

    tracing::debug!(root = %root.display(), components = index.len(), "indexed component registry");
    Ok(Self { root, index })
  }

  /// Get the root directory of the registry.
  pub fn root(&self) -> &Path {
    &self.root
  }

  /// Parse a manifest file name into a component id.
  /// Example: "kiosk--welcome.json" -> "kiosk/welcome"
  fn parse_file_name(file_name: &str) -> Option<String> {
    let stem = file_name.strip_suffix(".json")?;
    if stem.is_empty() {
      return None;
    }
    Some(stem.replace("--", "/"))
  }

  /// Read the manifest from a component file.
  async fn read_manifest(&self, path: &Path) -> Result<ComponentManifest, RegistryError> {
    let content = fs::read_to_string(path).await?;
    let manifest: ComponentManifest = serde_json::from_str(&content)?;
    Ok(manifest)
  }
}

#[async_trait]
impl ComponentRegistry for FsComponentRegistry {
  fn has(&self, id: &str) -> bool {
    self.index.contains_key(id)
  }

  async fn get(&self, id: &str) -> Result<RenderableUnit, RegistryError> {
    let path = self
      .index
      .get(id)
      .ok_or_else(|| RegistryError::ComponentNotFound {
        requested: id.to_string(),
        node_id: String::new(),
        fallback: DEFAULT_FALLBACK.to_string(),
      })?;
    let manifest = self.read_manifest(path).await?;
    Ok(manifest.into())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_file_name_with_namespace() {
    let result = FsComponentRegistry::parse_file_name("kiosk--welcome.json");
    assert_eq!(result, Some("kiosk/welcome".to_string()));
  }

  #[test]
  fn test_parse_file_name_without_namespace() {
    let result = FsComponentRegistry::parse_file_name("task.json");
    assert_eq!(result, Some("task".to_string()));
  }

  #[test]
  fn test_parse_file_name_invalid() {
    assert_eq!(FsComponentRegistry::parse_file_name("README.md"), None);
    assert_eq!(FsComponentRegistry::parse_file_name(".json"), None);
  }

  #[tokio::test]
  async fn test_open_and_get() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = ComponentManifest {
      id: "kiosk/welcome".to_string(),
      description: None,
      props: serde_json::json!({"title": "Welcome"}),
    };
    std::fs::write(
      dir.path().join(manifest.file_name()),
      serde_json::to_string(&manifest).unwrap(),
    )
    .unwrap();
    std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

    let registry = FsComponentRegistry::open(dir.path()).await.unwrap();
    assert!(registry.has("kiosk/welcome"));
    assert!(!registry.has("notes"));

    let unit = registry.get("kiosk/welcome").await.unwrap();
    assert_eq!(unit.props["title"], "Welcome");
  }

  #[tokio::test]
  async fn test_open_missing_root_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let registry = FsComponentRegistry::open(dir.path().join("absent"))
      .await
      .unwrap();
    assert!(!registry.has("anything"));
  }
}
