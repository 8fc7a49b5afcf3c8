use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::edge::EdgeDef;
use crate::node::NodeDef;

/// A flow definition as authored.
///
/// Embedded subflows use the same shape and are keyed by their id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowDef {
  pub id: String,
  pub version: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  /// Id of the node the flow enters on START.
  pub start: String,
  pub nodes: HashMap<String, NodeDef>,
  #[serde(default)]
  pub edges: Vec<EdgeDef>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub policies: Option<Policies>,
  /// Values seeded into the execution context when the flow starts.
  #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
  pub globals: serde_json::Map<String, serde_json::Value>,
  #[serde(default, skip_serializing_if = "HashMap::is_empty")]
  pub subflows: HashMap<String, FlowDef>,
  /// For subflows: the parent node to re-enter when the subflow closes.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub return_to: Option<String>,
}

/// Flow-wide execution policies.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policies {
  /// Upper bound on forward-skip hops for this flow.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub hop_limit: Option<usize>,

  /// Policies this version does not interpret, kept verbatim.
  #[serde(flatten)]
  pub extra: serde_json::Map<String, serde_json::Value>,
}
