//! Command events, telemetry records and notifiers.
//!
//! Every applied command produces a [`FlowEvent`]; navigation and lifecycle
//! milestones produce [`TelemetryRecord`]s. Both are handed to a
//! [`FlowNotifier`], which decides what to do with them (stream to a UI,
//! persist, print, ignore).

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::command::CommandKind;

/// An applied command, as seen by observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowEvent {
  pub command: CommandKind,
  pub payload: serde_json::Value,
  pub meta: EventMeta,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMeta {
  pub source: String,
  pub timestamp: DateTime<Utc>,
}

impl FlowEvent {
  pub fn new(command: CommandKind, payload: serde_json::Value, source: impl Into<String>) -> Self {
    Self {
      command,
      payload,
      meta: EventMeta {
        source: source.into(),
        timestamp: Utc::now(),
      },
    }
  }
}

/// Kind of a telemetry record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TelemetryKind {
  #[serde(rename = "node.enter")]
  NodeEnter,
  #[serde(rename = "edge.taken")]
  EdgeTaken,
  #[serde(rename = "flow.started")]
  FlowStarted,
  #[serde(rename = "flow.closed")]
  FlowClosed,
  #[serde(rename = "flow.error")]
  FlowError,
  #[serde(rename = "subflow.started")]
  SubflowStarted,
  #[serde(rename = "subflow.closed")]
  SubflowClosed,
}

impl TelemetryKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::NodeEnter => "node.enter",
      Self::EdgeTaken => "edge.taken",
      Self::FlowStarted => "flow.started",
      Self::FlowClosed => "flow.closed",
      Self::FlowError => "flow.error",
      Self::SubflowStarted => "subflow.started",
      Self::SubflowClosed => "subflow.closed",
    }
  }
}

impl fmt::Display for TelemetryKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A single telemetry record.
///
/// `flow_id` is `None` only for failures raised before any flow was started.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryRecord {
  pub kind: TelemetryKind,
  pub flow_id: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub node_id: Option<String>,
  pub timestamp: DateTime<Utc>,
  pub data: serde_json::Value,
}

impl TelemetryRecord {
  pub fn new(
    kind: TelemetryKind,
    flow_id: Option<String>,
    node_id: Option<String>,
    data: serde_json::Value,
  ) -> Self {
    Self {
      kind,
      flow_id,
      node_id,
      timestamp: Utc::now(),
      data,
    }
  }
}

/// Receives events and telemetry from the flow runner.
///
/// Called synchronously from the runner, so implementations should hand
/// records off rather than do slow work inline.
pub trait FlowNotifier: Send + Sync {
  fn event(&self, event: FlowEvent);

  fn telemetry(&self, record: TelemetryRecord);
}

impl<N: FlowNotifier + ?Sized> FlowNotifier for Arc<N> {
  fn event(&self, event: FlowEvent) {
    (**self).event(event)
  }

  fn telemetry(&self, record: TelemetryRecord) {
    (**self).telemetry(record)
  }
}

/// A notifier that discards everything.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl FlowNotifier for NoopNotifier {
  fn event(&self, _event: FlowEvent) {}

  fn telemetry(&self, _record: TelemetryRecord) {}
}

/// A notifier that forwards events and telemetry to unbounded channels.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  // Unbounded so a slow consumer never stalls command processing. Volume is
  // a handful of records per command.
  events: mpsc::UnboundedSender<FlowEvent>,
  telemetry: mpsc::UnboundedSender<TelemetryRecord>,
}

impl ChannelNotifier {
  pub fn new(
    events: mpsc::UnboundedSender<FlowEvent>,
    telemetry: mpsc::UnboundedSender<TelemetryRecord>,
  ) -> Self {
    Self { events, telemetry }
  }

  /// Create a notifier together with the receiving ends of both streams.
  pub fn channel() -> (
    Self,
    mpsc::UnboundedReceiver<FlowEvent>,
    mpsc::UnboundedReceiver<TelemetryRecord>,
  ) {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (telemetry_tx, telemetry_rx) = mpsc::unbounded_channel();
    (Self::new(event_tx, telemetry_tx), event_rx, telemetry_rx)
  }
}

impl FlowNotifier for ChannelNotifier {
  fn event(&self, event: FlowEvent) {
    // Receiver may have been dropped
    let _ = self.events.send(event);
  }

  fn telemetry(&self, record: TelemetryRecord) {
    let _ = self.telemetry.send(record);
  }
}
