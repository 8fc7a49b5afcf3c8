//! Flow execution state.
//!
//! The [`StateManager`] is the single owner of everything that changes while
//! a flow runs. It is mutated only by the runner, one command at a time, and
//! publishes an immutable [`StateSnapshot`] over a watch channel after each
//! applied command.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tracing::debug;
use waypoint_flow::{Context, Flow, Node};

use crate::error::FlowFailure;

/// A suspended parent flow, saved when a subflow is entered.
#[derive(Debug, Clone)]
pub struct SubflowStackEntry {
  pub parent: Arc<Flow>,
  pub subflow_id: String,
  pub return_to: String,
  pub saved_context: Context,
  pub saved_history: Vec<String>,
  pub saved_last_task: Option<String>,
}

/// Result of popping a subflow.
#[derive(Debug, Clone)]
pub struct PoppedSubflow {
  pub subflow: Arc<Flow>,
  pub return_to: String,
  pub final_context: Context,
}

/// Immutable view of the state after a command.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
  pub flow_id: Option<String>,
  pub current_node: Option<String>,
  pub last_task: Option<String>,
  pub history: Vec<String>,
  pub context: Context,
  pub running: bool,
  /// Flow ids of suspended parents, outermost first.
  pub subflow_stack: Vec<String>,
  pub last_error: Option<FlowFailure>,
  pub generation: u64,
}

impl StateSnapshot {
  fn empty() -> Self {
    Self {
      flow_id: None,
      current_node: None,
      last_task: None,
      history: Vec::new(),
      context: Context::new(),
      running: false,
      subflow_stack: Vec::new(),
      last_error: None,
      generation: 0,
    }
  }

  pub fn subflow_depth(&self) -> usize {
    self.subflow_stack.len()
  }
}

#[derive(Debug)]
pub struct StateManager {
  flow: Option<Arc<Flow>>,
  current_node: Option<String>,
  last_task: Option<String>,
  history: Vec<String>,
  context: Context,
  running: bool,
  stack: Vec<SubflowStackEntry>,
  last_error: Option<FlowFailure>,
  generation: u64,
  notify: watch::Sender<StateSnapshot>,
}

impl StateManager {
  pub fn new() -> Self {
    let (notify, _) = watch::channel(StateSnapshot::empty());
    Self {
      flow: None,
      current_node: None,
      last_task: None,
      history: Vec::new(),
      context: Context::new(),
      running: false,
      stack: Vec::new(),
      last_error: None,
      generation: 0,
      notify,
    }
  }

  /// Load `flow` as the active top-level flow with a fresh context.
  pub fn initialize(&mut self, flow: Arc<Flow>, context: Context) {
    debug!(flow_id = %flow.id, "initializing state");
    self.flow = Some(flow);
    self.context = context;
    self.current_node = None;
    self.last_task = None;
    self.history.clear();
    self.stack.clear();
    self.last_error = None;
    self.generation += 1;
  }

  /// Rehydrate a previously running flow at `history`'s last node.
  pub fn restore(&mut self, flow: Arc<Flow>, history: Vec<String>, context: Context) {
    self.last_task = history
      .iter()
      .rev()
      .find(|id| flow.get_node(id).is_some_and(Node::is_task))
      .cloned();
    self.current_node = history.last().cloned();
    self.history = history;
    self.flow = Some(flow);
    self.context = context;
    self.stack.clear();
    self.last_error = None;
    self.generation += 1;
  }

  /// Move forward onto `node`, appending it to history.
  pub fn navigate_to_node(&mut self, node: &Node) {
    self.current_node = Some(node.id.clone());
    self.history.push(node.id.clone());
    if node.is_task() {
      self.last_task = Some(node.id.clone());
    }
  }

  /// Make `node` current without duplicating it at the end of history.
  pub fn reenter(&mut self, node: &Node) {
    if self.history.last() != Some(&node.id) {
      self.history.push(node.id.clone());
    }
    self.current_node = Some(node.id.clone());
    if node.is_task() {
      self.last_task = Some(node.id.clone());
    }
  }

  /// Truncate history to `index` and make that entry current.
  pub fn navigate_back(&mut self, index: usize) {
    self.history.truncate(index + 1);
    self.current_node = self.history.last().cloned();
  }

  /// Suspend the active flow and make `subflow` active.
  pub fn push_subflow(&mut self, subflow: Arc<Flow>, return_to: String, context: Context) {
    let Some(parent) = self.flow.take() else {
      return;
    };
    self.flow = Some(subflow.clone());
    self.stack.push(SubflowStackEntry {
      parent,
      subflow_id: subflow.id.clone(),
      return_to,
      saved_context: std::mem::replace(&mut self.context, context),
      saved_history: std::mem::take(&mut self.history),
      saved_last_task: self.last_task.take(),
    });
    self.current_node = None;
  }

  /// Resume the innermost suspended parent.
  ///
  /// The parent context becomes the saved parent context with the subflow's
  /// final context merged over it. The caller re-enters the return node.
  pub fn pop_subflow(&mut self) -> Option<PoppedSubflow> {
    let entry = self.stack.pop()?;
    let subflow = self.flow.replace(entry.parent)?;
    let final_context = std::mem::take(&mut self.context);

    self.context = Context::merged(&entry.saved_context, &final_context);
    self.history = entry.saved_history;
    self.last_task = entry.saved_last_task;
    self.current_node = self.history.last().cloned();

    Some(PoppedSubflow {
      subflow,
      return_to: entry.return_to,
      final_context,
    })
  }

  pub fn update_context(&mut self, context: &Context) {
    self.context.merge(context);
  }

  pub fn start_workflow(&mut self) {
    self.running = true;
  }

  pub fn stop_workflow(&mut self) {
    self.running = false;
  }

  pub fn set_error(&mut self, failure: FlowFailure) {
    self.last_error = Some(failure);
  }

  /// Clear everything. Always succeeds.
  pub fn reset(&mut self) {
    self.flow = None;
    self.current_node = None;
    self.last_task = None;
    self.history.clear();
    self.context = Context::new();
    self.running = false;
    self.stack.clear();
    self.last_error = None;
    self.generation += 1;
  }

  pub fn flow(&self) -> Option<&Arc<Flow>> {
    self.flow.as_ref()
  }

  pub fn flow_id(&self) -> Option<&str> {
    self.flow.as_deref().map(|flow| flow.id.as_str())
  }

  pub fn current_node_id(&self) -> Option<&str> {
    self.current_node.as_deref()
  }

  pub fn last_task(&self) -> Option<&str> {
    self.last_task.as_deref()
  }

  pub fn history(&self) -> &[String] {
    &self.history
  }

  pub fn context(&self) -> &Context {
    &self.context
  }

  pub fn is_running(&self) -> bool {
    self.running
  }

  pub fn in_subflow(&self) -> bool {
    !self.stack.is_empty()
  }

  pub fn subflow_depth(&self) -> usize {
    self.stack.len()
  }

  pub fn last_error(&self) -> Option<&FlowFailure> {
    self.last_error.as_ref()
  }

  pub fn generation(&self) -> u64 {
    self.generation
  }

  pub fn snapshot(&self) -> StateSnapshot {
    StateSnapshot {
      flow_id: self.flow_id().map(str::to_string),
      current_node: self.current_node.clone(),
      last_task: self.last_task.clone(),
      history: self.history.clone(),
      context: self.context.clone(),
      running: self.running,
      subflow_stack: self.stack.iter().map(|e| e.parent.id.clone()).collect(),
      last_error: self.last_error.clone(),
      generation: self.generation,
    }
  }

  /// Publish the current snapshot to subscribers.
  pub fn publish(&self) {
    self.notify.send_replace(self.snapshot());
  }

  pub fn subscribe(&self) -> watch::Receiver<StateSnapshot> {
    self.notify.subscribe()
  }
}

impl Default for StateManager {
  fn default() -> Self {
    Self::new()
  }
}
