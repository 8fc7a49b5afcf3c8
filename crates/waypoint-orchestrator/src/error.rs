use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use waypoint_component_registry::RegistryError;
use waypoint_flow::FlowError;

use crate::command::CommandKind;
use crate::presentation::HostError;

/// Code recorded for every failure routed into the ERROR path by the runner.
pub const COMMAND_EXECUTION_FAILED: &str = "COMMAND_EXECUTION_FAILED";

/// Code recorded for an ERROR command that carries no code of its own.
pub const FLOW_ERROR: &str = "FLOW_ERROR";

/// Errors from presenting or dismissing a layer.
#[derive(Debug, Error)]
pub enum PresentationError {
  #[error(transparent)]
  Component(#[from] RegistryError),

  #[error("presentation host failed: {0}")]
  Host(#[from] HostError),

  #[error("presentation host did not respond within {0:?}")]
  Timeout(Duration),
}

/// Errors raised while handling a command.
///
/// These never reach the caller of `dispatch`; they are recorded as a
/// [`FlowFailure`] instead.
#[derive(Debug, Error)]
pub enum RunnerError {
  #[error("unknown command: {0}")]
  UnknownCommand(String),

  #[error("invalid payload for {command}: {source}")]
  InvalidPayload {
    command: CommandKind,
    source: serde_json::Error,
  },

  #[error("START requires a flowId or an inline flow")]
  MissingFlow,

  #[error(transparent)]
  Config(#[from] FlowError),

  #[error(transparent)]
  Presentation(#[from] PresentationError),
}

/// Broad classification of a recorded failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
  Command,
  Configuration,
  Component,
  Presentation,
  Reported,
}

impl RunnerError {
  pub fn code(&self) -> &'static str {
    COMMAND_EXECUTION_FAILED
  }

  pub fn kind(&self) -> FailureKind {
    match self {
      Self::UnknownCommand(_) | Self::InvalidPayload { .. } => FailureKind::Command,
      Self::MissingFlow | Self::Config(_) => FailureKind::Configuration,
      Self::Presentation(PresentationError::Component(_)) => FailureKind::Component,
      Self::Presentation(_) => FailureKind::Presentation,
    }
  }

  /// Whether the flow can carry on after this failure.
  ///
  /// Configuration and component errors fail the same way on every retry.
  /// Rejected commands and host failures leave the flow usable.
  pub fn recoverable(&self) -> bool {
    matches!(
      self.kind(),
      FailureKind::Command | FailureKind::Presentation
    )
  }
}

/// A failure stored in state and reported on the `flow.error` record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowFailure {
  pub code: String,
  pub kind: FailureKind,
  pub message: String,
  pub recoverable: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub command: Option<CommandKind>,
  pub timestamp: DateTime<Utc>,
}

impl FlowFailure {
  pub fn from_error(error: &RunnerError, command: Option<CommandKind>) -> Self {
    Self {
      code: error.code().to_string(),
      kind: error.kind(),
      message: error.to_string(),
      recoverable: error.recoverable(),
      command,
      timestamp: Utc::now(),
    }
  }

  pub fn reported(code: Option<String>, message: String, recoverable: bool) -> Self {
    Self {
      code: code.unwrap_or_else(|| FLOW_ERROR.to_string()),
      kind: FailureKind::Reported,
      message,
      recoverable,
      command: Some(CommandKind::Error),
      timestamp: Utc::now(),
    }
  }
}
