use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use waypoint_config::{
  DisplayRules, FlowDef, LayerHint, NodeConfig, NodeDef, NodeType, Policies, PresentationHints,
};

use crate::condition::Condition;
use crate::context::Context;
use crate::error::FlowError;
use crate::graph::Graph;
use crate::validate::validate_flow;

pub const CHECKPOINT_TAG: &str = "checkpoint";

/// A locked flow ready for execution.
///
/// Immutable once built. Conditions are compiled and subflows are locked
/// recursively.
#[derive(Debug, Clone)]
pub struct Flow {
  pub id: String,
  pub version: String,
  pub name: Option<String>,
  pub start: String,
  pub nodes: HashMap<String, Node>,
  pub edges: Vec<Edge>,
  pub policies: Policies,
  pub globals: Context,
  pub subflows: HashMap<String, Arc<Flow>>,
  pub return_to: Option<String>,
  graph: Graph,
}

#[derive(Debug, Clone)]
pub struct Node {
  pub id: String,
  pub node_type: NodeType,
  pub tags: BTreeSet<String>,
  pub config: NodeConfig,
  pub display: DisplayRules,
  pub completion: Option<Condition>,
  pub presentation: PresentationHints,
}

#[derive(Debug, Clone)]
pub struct Edge {
  pub from: String,
  pub to: String,
  pub condition: Condition,
}

impl Flow {
  /// Validate and compile a definition.
  ///
  /// Fails with [`FlowError::Invalid`] if validation reports any error.
  /// Warnings are logged and otherwise ignored.
  pub fn from_def(def: FlowDef) -> Result<Self, FlowError> {
    let report = validate_flow(&def);
    for warning in &report.warnings {
      tracing::warn!(
        flow_id = %warning.flow_id,
        kind = ?warning.kind,
        "{}",
        warning.message
      );
    }
    if !report.is_valid() {
      return Err(FlowError::Invalid {
        flow_id: def.id,
        issues: report.errors,
      });
    }

    Ok(Self::lock(def))
  }

  /// Parse a JSON document and compile it.
  pub fn from_json(json: &str) -> Result<Self, FlowError> {
    let def: FlowDef = serde_json::from_str(json)?;
    Self::from_def(def)
  }

  fn lock(def: FlowDef) -> Self {
    let nodes: HashMap<String, Node> = def
      .nodes
      .into_iter()
      .map(|(id, node)| (id, Node::lock(node)))
      .collect();

    let edges: Vec<Edge> = def
      .edges
      .into_iter()
      .map(|e| Edge {
        condition: Condition::compile(e.condition.as_ref()),
        from: e.from,
        to: e.to,
      })
      .collect();

    let graph = Graph::new(
      nodes.keys().map(|k| k.as_str()),
      edges.iter().map(|e| (e.from.as_str(), e.to.as_str())),
    );

    let subflows = def
      .subflows
      .into_iter()
      .map(|(id, sub)| (id, Arc::new(Self::lock(sub))))
      .collect();

    Self {
      id: def.id,
      version: def.version,
      name: def.name,
      start: def.start,
      nodes,
      edges,
      policies: def.policies.unwrap_or_default(),
      globals: Context::from(def.globals),
      subflows,
      return_to: def.return_to,
      graph,
    }
  }

  /// Get a node by ID.
  pub fn get_node(&self, node_id: &str) -> Option<&Node> {
    self.nodes.get(node_id)
  }

  pub fn contains_node(&self, node_id: &str) -> bool {
    self.nodes.contains_key(node_id)
  }

  /// Like [`Flow::get_node`], but a missing node is a configuration error.
  pub fn require_node(&self, node_id: &str) -> Result<&Node, FlowError> {
    self.get_node(node_id).ok_or_else(|| FlowError::NodeNotFound {
      flow_id: self.id.clone(),
      node_id: node_id.to_string(),
    })
  }

  /// Edges leaving `node_id`, in declaration order.
  pub fn outgoing(&self, node_id: &str) -> impl Iterator<Item = &Edge> {
    self.graph.outgoing(node_id).iter().map(|&i| &self.edges[i])
  }

  pub fn subflow(&self, subflow_id: &str) -> Option<&Arc<Flow>> {
    self.subflows.get(subflow_id)
  }

  pub fn graph(&self) -> &Graph {
    &self.graph
  }

  pub fn hop_limit(&self) -> Option<usize> {
    self.policies.hop_limit
  }
}

impl Node {
  fn lock(def: NodeDef) -> Self {
    let meta = def.meta.unwrap_or_default();
    Self {
      id: def.id,
      node_type: def.node_type,
      tags: def.tags,
      config: def.config.unwrap_or_default(),
      display: meta.display,
      completion: meta
        .completion_condition
        .as_deref()
        .map(Condition::compile_expression),
      presentation: meta.presentation.unwrap_or_default(),
    }
  }

  pub fn is_task(&self) -> bool {
    self.node_type == NodeType::Task
  }

  pub fn has_tag(&self, tag: &str) -> bool {
    self.tags.contains(tag)
  }

  /// Tagged `checkpoint` and asks to stay pinned as a root layer on mobile.
  pub fn is_sticky_root(&self) -> bool {
    self.has_tag(CHECKPOINT_TAG) && self.display.sticky_root_on_mobile
  }

  /// Registry id of the node's page, if it names one.
  pub fn page(&self) -> Option<&str> {
    self.config.page.as_deref()
  }

  pub fn layer_hint(&self) -> Option<LayerHint> {
    self.presentation.layer
  }

  /// Whether the completion condition holds. Nodes without one are complete.
  pub fn is_complete(&self, context: &Context) -> bool {
    self
      .completion
      .as_ref()
      .is_none_or(|c| c.is_satisfied(context))
  }
}
