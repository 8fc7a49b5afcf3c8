//! The presentation host seam.

use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use waypoint_component_registry::RenderableUnit;

use super::modal::LayerType;

/// A request to put a renderable unit on screen.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresentRequest {
  pub modal_id: String,
  pub unit: RenderableUnit,
  pub node_id: String,
  pub flow_id: String,
  pub layer: LayerType,
  pub level: usize,
  pub parent: Option<String>,
  /// Free-form node data for the host.
  pub data: serde_json::Value,
}

/// What the host reports when a surface goes away.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dismissal {
  #[serde(default)]
  pub data: serde_json::Value,
  #[serde(default)]
  pub role: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DismissOutcome {
  /// The user backed out (backdrop tap, cancel button).
  Dismissed,
  Closed,
}

impl Dismissal {
  pub fn with_role(role: impl Into<String>) -> Self {
    Self {
      data: serde_json::Value::Null,
      role: Some(role.into()),
    }
  }

  pub fn outcome(&self) -> DismissOutcome {
    match self.role.as_deref() {
      Some("backdrop") | Some("cancel") => DismissOutcome::Dismissed,
      _ => DismissOutcome::Closed,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HostError {
  pub message: String,
}

impl HostError {
  pub fn new(message: impl Into<String>) -> Self {
    Self {
      message: message.into(),
    }
  }
}

/// Puts layers on and off screen.
#[async_trait]
pub trait PresentationHost: Send + Sync {
  async fn present(&self, request: PresentRequest) -> Result<(), HostError>;

  async fn dismiss(&self, modal_id: &str) -> Result<Dismissal, HostError>;
}

/// A host call, as recorded by [`HeadlessHost`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "call", rename_all = "camelCase")]
pub enum HostCall {
  Present {
    modal_id: String,
    node_id: String,
    unit: String,
    layer: LayerType,
    level: usize,
  },
  Dismiss {
    modal_id: String,
  },
}

/// A host with no screen. Tracks which surfaces are up and records every
/// call, for tests and scripted runs.
#[derive(Debug, Default)]
pub struct HeadlessHost {
  inner: Mutex<HeadlessState>,
}

#[derive(Debug, Default)]
struct HeadlessState {
  surfaces: Vec<PresentRequest>,
  calls: Vec<HostCall>,
}

impl HeadlessHost {
  pub fn new() -> Self {
    Self::default()
  }

  /// Node ids currently on screen, bottom-most first.
  pub fn visible_nodes(&self) -> Vec<String> {
    let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
    inner.surfaces.iter().map(|r| r.node_id.clone()).collect()
  }

  pub fn visible_count(&self) -> usize {
    let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
    inner.surfaces.len()
  }

  pub fn calls(&self) -> Vec<HostCall> {
    let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
    inner.calls.clone()
  }

  /// Node ids passed to `present`, in call order.
  pub fn presented_nodes(&self) -> Vec<String> {
    self
      .calls()
      .into_iter()
      .filter_map(|call| match call {
        HostCall::Present { node_id, .. } => Some(node_id),
        HostCall::Dismiss { .. } => None,
      })
      .collect()
  }
}

#[async_trait]
impl PresentationHost for HeadlessHost {
  async fn present(&self, request: PresentRequest) -> Result<(), HostError> {
    debug!(modal_id = %request.modal_id, node_id = %request.node_id, unit = %request.unit.id, "present");
    let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
    inner.calls.push(HostCall::Present {
      modal_id: request.modal_id.clone(),
      node_id: request.node_id.clone(),
      unit: request.unit.id.clone(),
      layer: request.layer,
      level: request.level,
    });
    inner.surfaces.push(request);
    Ok(())
  }

  async fn dismiss(&self, modal_id: &str) -> Result<Dismissal, HostError> {
    debug!(modal_id, "dismiss");
    let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
    inner.calls.push(HostCall::Dismiss {
      modal_id: modal_id.to_string(),
    });
    match inner.surfaces.iter().position(|r| r.modal_id == modal_id) {
      Some(index) => {
        inner.surfaces.remove(index);
        Ok(Dismissal::default())
      }
      None => Err(HostError::new(format!("no surface for modal {}", modal_id))),
    }
  }
}
