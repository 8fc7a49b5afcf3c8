use thiserror::Error;

use crate::validate::ValidationIssue;

/// Configuration errors: the flow itself is missing or malformed.
#[derive(Debug, Error)]
pub enum FlowError {
  #[error("flow '{flow_id}' failed validation with {} error(s)", issues.len())]
  Invalid {
    flow_id: String,
    issues: Vec<ValidationIssue>,
  },

  #[error("flow not found: {0}")]
  FlowNotFound(String),

  #[error("subflow '{subflow_id}' not found from flow '{flow_id}'")]
  SubflowNotFound { flow_id: String, subflow_id: String },

  #[error("node '{node_id}' not found in flow '{flow_id}'")]
  NodeNotFound { flow_id: String, node_id: String },

  #[error("failed to parse flow definition: {0}")]
  Parse(#[from] serde_json::Error),
}

/// Errors from compiling a condition expression.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExpressionError {
  #[error("parse error at {position}: {message}")]
  Parse { position: usize, message: String },

  #[error("empty expression")]
  Empty,
}

/// Errors from evaluating a compiled condition against a context.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
  #[error("unknown context key: {0}")]
  MissingKey(String),

  #[error("condition is malformed: {0}")]
  Malformed(String),
}
