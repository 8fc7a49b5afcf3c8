use thiserror::Error;

/// Errors that can occur when resolving components.
#[derive(Debug, Error)]
pub enum RegistryError {
  /// Neither the requested unit nor the fallback is registered.
  #[error("component not found: '{requested}' for node '{node_id}' (fallback '{fallback}' unavailable)")]
  ComponentNotFound {
    requested: String,
    node_id: String,
    fallback: String,
  },

  /// IO error when reading component manifests.
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  /// Failed to parse manifest JSON.
  #[error("invalid manifest: {0}")]
  InvalidManifest(#[from] serde_json::Error),
}
