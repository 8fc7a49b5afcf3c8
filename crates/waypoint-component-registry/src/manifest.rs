use serde::{Deserialize, Serialize};

/// Metadata describing a component stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentManifest {
  /// Component id, e.g. "kiosk/welcome"
  pub id: String,

  /// Short description of what the component renders
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,

  /// Static properties handed to the presentation host
  #[serde(default)]
  pub props: serde_json::Value,
}

impl ComponentManifest {
  /// Returns the file name for this component: the id with slashes replaced
  /// by double dashes, plus `.json`.
  ///
  /// Example: "kiosk/welcome" becomes "kiosk--welcome.json"
  pub fn file_name(&self) -> String {
    format!("{}.json", self.id.replace('/', "--"))
  }
}

/// A resolved unit ready to be handed to the presentation host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderableUnit {
  pub id: String,
  #[serde(default)]
  pub props: serde_json::Value,
}

impl RenderableUnit {
  pub fn new(id: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      props: serde_json::Value::Null,
    }
  }

  pub fn with_props(mut self, props: serde_json::Value) -> Self {
    self.props = props;
    self
  }
}

impl From<ComponentManifest> for RenderableUnit {
  fn from(manifest: ComponentManifest) -> Self {
    Self {
      id: manifest.id,
      props: manifest.props,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_file_name() {
    let manifest = ComponentManifest {
      id: "kiosk/welcome".to_string(),
      description: None,
      props: serde_json::json!({}),
    };

    assert_eq!(manifest.file_name(), "kiosk--welcome.json");
  }

  #[test]
  fn test_file_name_no_namespace() {
    let manifest = ComponentManifest {
      id: "task".to_string(),
      description: Some("generic task page".to_string()),
      props: serde_json::json!({}),
    };

    assert_eq!(manifest.file_name(), "task.json");
  }
}
