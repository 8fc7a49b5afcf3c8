use std::collections::HashMap;
use std::sync::Arc;

use waypoint_config::FlowDef;

use crate::error::FlowError;
use crate::flow::Flow;

/// Lookup of flows and their embedded subflows by id.
///
/// Built once at startup and shared with the orchestrator.
#[derive(Debug, Clone, Default)]
pub struct FlowRegistry {
  flows: HashMap<String, Arc<Flow>>,
}

impl FlowRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Validate, compile and register a flow definition.
  pub fn register(&mut self, def: FlowDef) -> Result<Arc<Flow>, FlowError> {
    let flow = Arc::new(Flow::from_def(def)?);
    self.flows.insert(flow.id.clone(), flow.clone());
    Ok(flow)
  }

  /// Register an already compiled flow.
  pub fn insert(&mut self, flow: Arc<Flow>) {
    self.flows.insert(flow.id.clone(), flow);
  }

  pub fn get(&self, flow_id: &str) -> Option<Arc<Flow>> {
    self.flows.get(flow_id).cloned()
  }

  pub fn require(&self, flow_id: &str) -> Result<Arc<Flow>, FlowError> {
    self
      .get(flow_id)
      .ok_or_else(|| FlowError::FlowNotFound(flow_id.to_string()))
  }

  /// Find a subflow as seen from `parent`: embedded subflows first, then
  /// top-level flows.
  pub fn find_subflow(&self, parent: &Flow, subflow_id: &str) -> Result<Arc<Flow>, FlowError> {
    parent
      .subflow(subflow_id)
      .cloned()
      .or_else(|| self.get(subflow_id))
      .ok_or_else(|| FlowError::SubflowNotFound {
        flow_id: parent.id.clone(),
        subflow_id: subflow_id.to_string(),
      })
  }

  pub fn ids(&self) -> impl Iterator<Item = &str> {
    self.flows.keys().map(|k| k.as_str())
  }

  pub fn len(&self) -> usize {
    self.flows.len()
  }

  pub fn is_empty(&self) -> bool {
    self.flows.is_empty()
  }
}

impl FromIterator<Arc<Flow>> for FlowRegistry {
  fn from_iter<T: IntoIterator<Item = Arc<Flow>>>(iter: T) -> Self {
    let mut registry = Self::new();
    for flow in iter {
      registry.insert(flow);
    }
    registry
  }
}
