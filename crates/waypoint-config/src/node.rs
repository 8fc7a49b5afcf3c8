use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDef {
  pub id: String,
  #[serde(rename = "type")]
  pub node_type: NodeType,
  #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
  pub tags: BTreeSet<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub config: Option<NodeConfig>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub meta: Option<NodeMeta>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
  /// A step the user completes; the most recent one is the resume anchor.
  Task,
  /// A transient instructional step.
  Guide,
  /// A step that hands off to an embedded subflow.
  Subflow,
}

impl NodeType {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Task => "task",
      Self::Guide => "guide",
      Self::Subflow => "subflow",
    }
  }
}

/// Page/content reference for a node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeConfig {
  /// Id of the renderable unit in the component registry.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub page: Option<String>,
  #[serde(flatten)]
  pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeMeta {
  #[serde(default)]
  pub display: DisplayRules,
  /// Boolean expression that holds once the step counts as complete.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub completion_condition: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub presentation: Option<PresentationHints>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayRules {
  #[serde(default)]
  pub show_on: ShowOn,
  #[serde(default)]
  pub sticky_root_on_mobile: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub root_keeps_children_until: Option<String>,
}

/// Device classes a node is displayed on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShowOn {
  #[default]
  #[serde(rename = "all")]
  All,
  #[serde(rename = "mobile")]
  Mobile,
  #[serde(rename = "tablet+")]
  TabletPlus,
  #[serde(rename = "none")]
  None,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresentationHints {
  /// Forces the layer the node is presented on.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub layer: Option<LayerHint>,
  /// Extra data handed to the presentation host.
  #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
  pub data: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerHint {
  Main,
  Global,
}
