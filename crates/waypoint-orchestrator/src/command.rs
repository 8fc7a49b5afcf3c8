//! Commands accepted by the flow runner.
//!
//! Callers dispatch a loosely typed [`DispatchEvent`] (`{command, payload}`),
//! which is parsed into a typed [`Command`] before any state is touched.

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use waypoint_flow::{Context, FlowDef};

use crate::error::RunnerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandKind {
  Start,
  Next,
  Back,
  Close,
  StartSubflow,
  NextSubflow,
  BackSubflow,
  CloseSubflow,
  Resume,
  FlowSync,
  JumpTo,
  Reset,
  Error,
}

impl CommandKind {
  pub const ALL: [CommandKind; 13] = [
    Self::Start,
    Self::Next,
    Self::Back,
    Self::Close,
    Self::StartSubflow,
    Self::NextSubflow,
    Self::BackSubflow,
    Self::CloseSubflow,
    Self::Resume,
    Self::FlowSync,
    Self::JumpTo,
    Self::Reset,
    Self::Error,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Start => "START",
      Self::Next => "NEXT",
      Self::Back => "BACK",
      Self::Close => "CLOSE",
      Self::StartSubflow => "START_SUBFLOW",
      Self::NextSubflow => "NEXT_SUBFLOW",
      Self::BackSubflow => "BACK_SUBFLOW",
      Self::CloseSubflow => "CLOSE_SUBFLOW",
      Self::Resume => "RESUME",
      Self::FlowSync => "FLOW_SYNC",
      Self::JumpTo => "JUMP_TO",
      Self::Reset => "RESET",
      Self::Error => "ERROR",
    }
  }
}

impl fmt::Display for CommandKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for CommandKind {
  type Err = RunnerError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Self::ALL
      .into_iter()
      .find(|kind| kind.as_str() == s)
      .ok_or_else(|| RunnerError::UnknownCommand(s.to_string()))
  }
}

/// An untyped command as it arrives from a caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchEvent {
  pub command: String,
  #[serde(default)]
  pub payload: Value,
  /// Generation the caller observed when it produced this event. Events
  /// carrying a stale generation are discarded.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub generation: Option<u64>,
}

impl DispatchEvent {
  pub fn new(command: impl Into<String>, payload: Value) -> Self {
    Self {
      command: command.into(),
      payload,
      generation: None,
    }
  }

  pub fn with_generation(mut self, generation: u64) -> Self {
    self.generation = Some(generation);
    self
  }
}

impl From<Command> for DispatchEvent {
  fn from(command: Command) -> Self {
    DispatchEvent::new(command.kind().as_str(), command.payload())
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StartPayload {
  /// Id of a flow in the runner's registry.
  pub flow_id: Option<String>,
  /// Inline flow definition, validated before use. Wins over `flow_id`.
  pub flow: Option<FlowDef>,
  pub start_at: Option<String>,
  pub context: Context,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NextPayload {
  pub target: Option<String>,
  pub context: Option<Context>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClosePayload {
  pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSubflowPayload {
  pub subflow_id: String,
  #[serde(default)]
  pub start_at: Option<String>,
  #[serde(default)]
  pub return_to: Option<String>,
  #[serde(default)]
  pub context: Context,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CloseSubflowPayload {
  /// Merged into the subflow context before it is folded into the parent.
  pub context: Option<Context>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResumePayload {
  pub context: Option<Context>,
  /// Rehydration target, used only when no flow is loaded.
  pub flow_id: Option<String>,
  pub node_id: Option<String>,
  pub history: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JumpPayload {
  pub target: String,
  #[serde(default)]
  pub context: Option<Context>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
  #[serde(default)]
  pub code: Option<String>,
  pub message: String,
  #[serde(default = "default_recoverable")]
  pub recoverable: bool,
}

fn default_recoverable() -> bool {
  true
}

/// A parsed command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
  Start(StartPayload),
  Next(NextPayload),
  Back,
  Close(ClosePayload),
  StartSubflow(StartSubflowPayload),
  NextSubflow(NextPayload),
  BackSubflow,
  CloseSubflow(CloseSubflowPayload),
  Resume(ResumePayload),
  FlowSync(ResumePayload),
  JumpTo(JumpPayload),
  Reset,
  Error(ErrorPayload),
}

impl Command {
  /// Parse a dispatch event.
  ///
  /// A `null` payload is treated as an empty object, so commands whose
  /// payload fields are all optional can be sent bare.
  pub fn parse(event: &DispatchEvent) -> Result<Self, RunnerError> {
    let kind: CommandKind = event.command.parse()?;
    let payload = match &event.payload {
      Value::Null => Value::Object(Default::default()),
      other => other.clone(),
    };

    let command = match kind {
      CommandKind::Start => Self::Start(from_payload(kind, payload)?),
      CommandKind::Next => Self::Next(from_payload(kind, payload)?),
      CommandKind::Back => Self::Back,
      CommandKind::Close => Self::Close(from_payload(kind, payload)?),
      CommandKind::StartSubflow => Self::StartSubflow(from_payload(kind, payload)?),
      CommandKind::NextSubflow => Self::NextSubflow(from_payload(kind, payload)?),
      CommandKind::BackSubflow => Self::BackSubflow,
      CommandKind::CloseSubflow => Self::CloseSubflow(from_payload(kind, payload)?),
      CommandKind::Resume => Self::Resume(from_payload(kind, payload)?),
      CommandKind::FlowSync => Self::FlowSync(from_payload(kind, payload)?),
      CommandKind::JumpTo => Self::JumpTo(from_payload(kind, payload)?),
      CommandKind::Reset => Self::Reset,
      CommandKind::Error => Self::Error(from_payload(kind, payload)?),
    };
    Ok(command)
  }

  pub fn kind(&self) -> CommandKind {
    match self {
      Self::Start(_) => CommandKind::Start,
      Self::Next(_) => CommandKind::Next,
      Self::Back => CommandKind::Back,
      Self::Close(_) => CommandKind::Close,
      Self::StartSubflow(_) => CommandKind::StartSubflow,
      Self::NextSubflow(_) => CommandKind::NextSubflow,
      Self::BackSubflow => CommandKind::BackSubflow,
      Self::CloseSubflow(_) => CommandKind::CloseSubflow,
      Self::Resume(_) => CommandKind::Resume,
      Self::FlowSync(_) => CommandKind::FlowSync,
      Self::JumpTo(_) => CommandKind::JumpTo,
      Self::Reset => CommandKind::Reset,
      Self::Error(_) => CommandKind::Error,
    }
  }

  /// The payload as JSON, as carried on emitted events.
  pub fn payload(&self) -> Value {
    let value = match self {
      Self::Start(p) => serde_json::to_value(p),
      Self::Next(p) | Self::NextSubflow(p) => serde_json::to_value(p),
      Self::Close(p) => serde_json::to_value(p),
      Self::StartSubflow(p) => serde_json::to_value(p),
      Self::CloseSubflow(p) => serde_json::to_value(p),
      Self::Resume(p) | Self::FlowSync(p) => serde_json::to_value(p),
      Self::JumpTo(p) => serde_json::to_value(p),
      Self::Error(p) => serde_json::to_value(p),
      Self::Back | Self::BackSubflow | Self::Reset => Ok(Value::Null),
    };
    value.unwrap_or(Value::Null)
  }

  pub fn start(flow_id: impl Into<String>) -> Self {
    Self::Start(StartPayload {
      flow_id: Some(flow_id.into()),
      ..Default::default()
    })
  }

  pub fn next() -> Self {
    Self::Next(NextPayload::default())
  }

  pub fn next_to(target: impl Into<String>) -> Self {
    Self::Next(NextPayload {
      target: Some(target.into()),
      context: None,
    })
  }

  pub fn next_with(context: Context) -> Self {
    Self::Next(NextPayload {
      target: None,
      context: Some(context),
    })
  }

  pub fn start_subflow(subflow_id: impl Into<String>) -> Self {
    Self::StartSubflow(StartSubflowPayload {
      subflow_id: subflow_id.into(),
      start_at: None,
      return_to: None,
      context: Context::new(),
    })
  }

  pub fn close_subflow() -> Self {
    Self::CloseSubflow(CloseSubflowPayload::default())
  }

  pub fn jump_to(target: impl Into<String>) -> Self {
    Self::JumpTo(JumpPayload {
      target: target.into(),
      context: None,
    })
  }
}

fn from_payload<T: DeserializeOwned>(command: CommandKind, payload: Value) -> Result<T, RunnerError> {
  serde_json::from_value(payload).map_err(|source| RunnerError::InvalidPayload { command, source })
}
