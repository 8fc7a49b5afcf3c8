//! Waypoint Flow
//!
//! This crate provides the "locked" flow representation for Waypoint.
//! A locked flow is a validated, compiled form of a `FlowDef` that is ready
//! for the orchestrator.
//!
//! Key differences from `waypoint-config`:
//! - Graph structure is validated (start exists, no dangling edges)
//! - Edge and completion conditions are compiled once, up front
//! - Embedded subflows are compiled recursively and shared via `Arc`
//! - Flows are looked up through an explicit [`FlowRegistry`], not a global

mod condition;
mod context;
mod error;
mod expression;
mod flow;
mod graph;
mod registry;
mod validate;

pub use condition::{Condition, compare_values};
pub use context::Context;
pub use error::{EvalError, ExpressionError, FlowError};
pub use expression::Expression;
pub use flow::{CHECKPOINT_TAG, Edge, Flow, Node};
pub use graph::Graph;
pub use registry::FlowRegistry;
pub use validate::{IssueKind, ValidationIssue, ValidationReport, validate_flow};

pub use waypoint_config::{
  ConditionDef, DisplayRules, EdgeDef, FlowDef, LayerHint, NodeConfig, NodeDef, NodeType,
  Operator, Policies, PresentationHints, ShowOn,
};
