use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerType {
  Main,
  Nested,
  Subflow,
  Global,
}

/// A presented layer. Lives only while its node is on screen.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModalState {
  pub id: String,
  pub node_id: String,
  pub flow_id: String,
  pub layer: LayerType,
  pub level: usize,
  pub parent: Option<String>,
  pub created_at: DateTime<Utc>,
}

impl ModalState {
  pub fn new(
    node_id: impl Into<String>,
    flow_id: impl Into<String>,
    layer: LayerType,
    level: usize,
    parent: Option<String>,
  ) -> Self {
    Self {
      id: Uuid::new_v4().to_string(),
      node_id: node_id.into(),
      flow_id: flow_id.into(),
      layer,
      level,
      parent,
      created_at: Utc::now(),
    }
  }

  pub fn is_for(&self, node_id: &str, flow_id: &str) -> bool {
    self.node_id == node_id && self.flow_id == flow_id
  }
}

/// Result of an open request.
#[derive(Debug, Clone, PartialEq)]
pub enum OpenOutcome {
  Opened(ModalState),
  /// The pair was already on screen; nothing changed and nothing was
  /// dismissed.
  AlreadyOpen(ModalState),
}

impl OpenOutcome {
  pub fn modal(&self) -> &ModalState {
    match self {
      Self::Opened(modal) | Self::AlreadyOpen(modal) => modal,
    }
  }

  pub fn is_new(&self) -> bool {
    matches!(self, Self::Opened(_))
  }
}
