//! Edge selection and forward/backward resolution.

use tracing::{debug, warn};
use waypoint_flow::{Context, Edge, Flow, Node};

/// Where a forward resolution landed.
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardResolution {
  /// The first presentable node, or the last node reached.
  pub node_id: String,
  /// Edges followed while skipping, as `(from, to)`.
  pub skipped: Vec<(String, String)>,
  /// The hop cap stopped the walk before a presentable node was found.
  pub exhausted: bool,
}

/// Stateless edge selection over a locked flow.
#[derive(Debug, Clone)]
pub struct NavigationResolver {
  hop_limit: usize,
}

impl NavigationResolver {
  pub fn new(hop_limit: usize) -> Self {
    Self { hop_limit }
  }

  /// Hop cap for `flow`: its own `hopLimit` policy, else the configured one.
  pub fn hop_limit(&self, flow: &Flow) -> usize {
    flow.hop_limit().unwrap_or(self.hop_limit)
  }

  /// All outgoing edges of `node_id` whose condition holds, in declared order.
  pub fn valid_edges<'f>(&self, node_id: &str, flow: &'f Flow, context: &Context) -> Vec<&'f Edge> {
    flow
      .outgoing(node_id)
      .filter(|edge| self.is_edge_valid(edge, context))
      .collect()
  }

  /// The first outgoing edge of `node_id` whose condition holds.
  pub fn first_valid_edge<'f>(
    &self,
    node_id: &str,
    flow: &'f Flow,
    context: &Context,
  ) -> Option<&'f Edge> {
    flow
      .outgoing(node_id)
      .find(|edge| self.is_edge_valid(edge, context))
  }

  /// Evaluate an edge condition. Never errors: failures count as false.
  pub fn is_edge_valid(&self, edge: &Edge, context: &Context) -> bool {
    match edge.condition.evaluate(context) {
      Ok(valid) => valid,
      Err(e) => {
        debug!(from = %edge.from, to = %edge.to, error = %e, "edge condition failed closed");
        false
      }
    }
  }

  /// Walk first valid edges from `node` while the current node is not
  /// presentable.
  ///
  /// Stops at the first presentable node, at a node with no valid edge, or
  /// after the hop cap, returning whichever node was reached last.
  pub fn resolve_forward(
    &self,
    node: &Node,
    flow: &Flow,
    context: &Context,
    is_presentable: impl Fn(&Node) -> bool,
  ) -> ForwardResolution {
    let limit = self.hop_limit(flow);
    let mut current = node;
    let mut skipped = Vec::new();

    loop {
      if is_presentable(current) {
        break;
      }
      if skipped.len() >= limit {
        warn!(
          flow_id = %flow.id,
          node_id = %current.id,
          hop_limit = limit,
          "forward skip reached hop limit"
        );
        return ForwardResolution {
          node_id: current.id.clone(),
          skipped,
          exhausted: true,
        };
      }

      let Some(edge) = self.first_valid_edge(&current.id, flow, context) else {
        debug!(flow_id = %flow.id, node_id = %current.id, "no valid edge while skipping");
        break;
      };
      let Some(next) = flow.get_node(&edge.to) else {
        break;
      };

      debug!(flow_id = %flow.id, from = %current.id, to = %next.id, "skipping hidden node");
      skipped.push((current.id.clone(), next.id.clone()));
      current = next;
    }

    ForwardResolution {
      node_id: current.id.clone(),
      skipped,
      exhausted: false,
    }
  }

  /// Index in `history` of the node BACK should return to.
  ///
  /// `None` when there is no predecessor or it no longer exists in `flow`.
  pub fn resolve_backward(&self, history: &[String], flow: &Flow) -> Option<usize> {
    if history.len() <= 1 {
      return None;
    }
    let index = history.len() - 2;
    if !flow.contains_node(&history[index]) {
      warn!(flow_id = %flow.id, node_id = %history[index], "history predecessor is not in flow");
      return None;
    }
    Some(index)
  }
}

impl Default for NavigationResolver {
  fn default() -> Self {
    Self::new(100)
  }
}
