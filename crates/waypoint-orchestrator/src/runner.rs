//! The flow runner.
//!
//! [`FlowRunner::dispatch`] is the single entry point: it parses a command,
//! applies it to state, reconciles presentation, and reports what happened
//! through the notifier. It never returns an error. Failures are recorded on
//! the ERROR path (state's error slot plus a `flow.error` record).
//!
//! Handlers apply all of their state mutation before their first `.await`,
//! so a suspended presentation call never observes half-applied state.

use std::sync::Arc;

use serde_json::{Value, json};
use tokio::sync::watch;
use tracing::{error, info, instrument, warn};
use waypoint_component_registry::ComponentRegistry;
use waypoint_flow::{Context, Flow, FlowRegistry, Node};

use crate::command::{
  CloseSubflowPayload, Command, CommandKind, DispatchEvent, JumpPayload, NextPayload,
  ResumePayload, StartPayload, StartSubflowPayload,
};
use crate::config::OrchestratorConfig;
use crate::error::{FlowFailure, RunnerError};
use crate::events::{FlowEvent, FlowNotifier, NoopNotifier, TelemetryKind, TelemetryRecord};
use crate::navigation::{ForwardResolution, NavigationResolver};
use crate::presentation::{PresentationCoordinator, PresentationHost, Transition};
use crate::state::{StateManager, StateSnapshot};

/// Whether a handler changed anything worth an event.
enum Outcome {
  Applied,
  Ignored,
}

pub struct FlowRunner<N = NoopNotifier> {
  config: OrchestratorConfig,
  flows: Arc<FlowRegistry>,
  navigation: NavigationResolver,
  state: StateManager,
  presentation: PresentationCoordinator,
  notifier: N,
}

impl FlowRunner<NoopNotifier> {
  pub fn new(
    config: OrchestratorConfig,
    flows: Arc<FlowRegistry>,
    components: Arc<dyn ComponentRegistry>,
    host: Arc<dyn PresentationHost>,
  ) -> Self {
    Self::with_notifier(config, flows, components, host, NoopNotifier)
  }
}

impl<N: FlowNotifier> FlowRunner<N> {
  pub fn with_notifier(
    config: OrchestratorConfig,
    flows: Arc<FlowRegistry>,
    components: Arc<dyn ComponentRegistry>,
    host: Arc<dyn PresentationHost>,
    notifier: N,
  ) -> Self {
    Self {
      navigation: NavigationResolver::new(config.hop_limit),
      presentation: PresentationCoordinator::new(components, host, &config),
      state: StateManager::new(),
      config,
      flows,
      notifier,
    }
  }

  pub fn config(&self) -> &OrchestratorConfig {
    &self.config
  }

  pub fn flows(&self) -> &FlowRegistry {
    &self.flows
  }

  pub fn state(&self) -> &StateManager {
    &self.state
  }

  pub fn presentation(&self) -> &PresentationCoordinator {
    &self.presentation
  }

  pub fn snapshot(&self) -> StateSnapshot {
    self.state.snapshot()
  }

  pub fn subscribe(&self) -> watch::Receiver<StateSnapshot> {
    self.state.subscribe()
  }

  /// Apply an untyped command and return the resulting state.
  ///
  /// Unknown commands and malformed payloads go to the ERROR path. Events
  /// stamped with a generation other than the current one are dropped.
  #[instrument(skip(self, event), fields(command = %event.command))]
  pub async fn dispatch(&mut self, event: DispatchEvent) -> StateSnapshot {
    if let Some(generation) = event.generation
      && generation != self.state.generation()
    {
      warn!(
        stale = generation,
        current = self.state.generation(),
        "discarding command from a superseded generation"
      );
      return self.state.snapshot();
    }

    match Command::parse(&event) {
      Ok(command) => self.apply(command).await,
      Err(e) => {
        self.fail(e, event.command.parse().ok());
        self.state.publish();
        self.state.snapshot()
      }
    }
  }

  /// Apply a typed command and return the resulting state.
  pub async fn apply(&mut self, command: Command) -> StateSnapshot {
    let kind = command.kind();
    let payload = command.payload();

    match self.handle(command).await {
      Ok(Outcome::Applied) => self.emit(kind, payload),
      Ok(Outcome::Ignored) => {}
      Err(e) => self.fail(e, Some(kind)),
    }

    self.state.publish();
    self.state.snapshot()
  }

  async fn handle(&mut self, command: Command) -> Result<Outcome, RunnerError> {
    match command {
      Command::Start(payload) => self.start(payload).await,
      Command::Next(payload) => self.next(payload, false).await,
      Command::Back => self.back(false).await,
      Command::Close(payload) => self.close(payload.reason).await,
      Command::StartSubflow(payload) => self.start_subflow(payload).await,
      Command::NextSubflow(payload) => self.next(payload, true).await,
      Command::BackSubflow => self.back(true).await,
      Command::CloseSubflow(payload) => self.close_subflow(payload).await,
      Command::Resume(payload) | Command::FlowSync(payload) => self.resume(payload).await,
      Command::JumpTo(payload) => self.jump_to(payload).await,
      Command::Reset => Ok(self.reset().await),
      Command::Error(payload) => {
        let failure = FlowFailure::reported(payload.code, payload.message, payload.recoverable);
        warn!(code = %failure.code, message = %failure.message, "error reported");
        self.record_failure(failure);
        Ok(Outcome::Applied)
      }
    }
  }

  #[instrument(skip(self, payload), fields(flow_id = ?payload.flow_id))]
  async fn start(&mut self, payload: StartPayload) -> Result<Outcome, RunnerError> {
    let flow = match (payload.flow, payload.flow_id) {
      (Some(def), _) => Arc::new(Flow::from_def(def)?),
      (None, Some(flow_id)) => self.flows.require(&flow_id)?,
      (None, None) => return Err(RunnerError::MissingFlow),
    };
    let start_at = payload.start_at.unwrap_or_else(|| flow.start.clone());
    flow.require_node(&start_at)?;

    info!(flow_id = %flow.id, version = %flow.version, start = %start_at, "starting flow");
    self
      .state
      .initialize(flow.clone(), Context::merged(&flow.globals, &payload.context));
    self.state.start_workflow();
    self.telemetry(
      TelemetryKind::FlowStarted,
      Some(&start_at),
      json!({
        "version": flow.version,
        "startAt": start_at,
        "context": self.state.context(),
      }),
    );
    let node_id = self.advance(&flow, &start_at)?;

    self.presentation.close_all().await?;
    self.present(&flow, &node_id, Transition::Forward).await?;
    Ok(Outcome::Applied)
  }

  #[instrument(skip(self, payload))]
  async fn next(&mut self, payload: NextPayload, scoped: bool) -> Result<Outcome, RunnerError> {
    if scoped && !self.state.in_subflow() {
      warn!("NEXT_SUBFLOW outside of a subflow");
      return Ok(Outcome::Ignored);
    }
    let (Some(flow), Some(current)) = (
      self.state.flow().cloned(),
      self.state.current_node_id().map(str::to_string),
    ) else {
      warn!("NEXT without an active node");
      return Ok(Outcome::Ignored);
    };

    if let Some(context) = &payload.context {
      self.state.update_context(context);
    }

    let (target, via) = match payload.target {
      Some(target) => {
        flow.require_node(&target)?;
        (target, "explicit")
      }
      None => match self
        .navigation
        .first_valid_edge(&current, &flow, self.state.context())
      {
        Some(edge) => (edge.to.clone(), "edge"),
        None => {
          warn!(flow_id = %flow.id, node_id = %current, "no valid outgoing edge");
          return Ok(Outcome::Ignored);
        }
      },
    };

    self.edge_taken(&flow, &current, &target, via);
    let node_id = self.advance(&flow, &target)?;
    self.present(&flow, &node_id, Transition::Forward).await?;
    Ok(Outcome::Applied)
  }

  #[instrument(skip(self))]
  async fn back(&mut self, scoped: bool) -> Result<Outcome, RunnerError> {
    if scoped && !self.state.in_subflow() {
      warn!("BACK_SUBFLOW outside of a subflow");
      return Ok(Outcome::Ignored);
    }
    let Some(flow) = self.state.flow().cloned() else {
      warn!("BACK without an active flow");
      return Ok(Outcome::Ignored);
    };

    match self.navigation.resolve_backward(self.state.history(), &flow) {
      Some(index) => {
        self.state.navigate_back(index);
        let node_id = self.state.history()[index].clone();
        self.telemetry(
          TelemetryKind::NodeEnter,
          Some(&node_id),
          json!({
            "direction": "back",
            "context": self.state.context(),
            "historyLength": self.state.history().len(),
          }),
        );

        self.presentation.close_current().await?;
        self.present(&flow, &node_id, Transition::Back).await?;
        Ok(Outcome::Applied)
      }
      None if scoped => {
        info!(flow_id = %flow.id, "no predecessor in subflow, closing it");
        self.close_subflow(CloseSubflowPayload::default()).await
      }
      None if self.state.history().len() <= 1 => {
        warn!(flow_id = %flow.id, "BACK at the start of history");
        Ok(Outcome::Ignored)
      }
      None => {
        info!(flow_id = %flow.id, "predecessor no longer in flow, closing");
        self.close(Some("back".to_string())).await
      }
    }
  }

  #[instrument(skip(self))]
  async fn close(&mut self, reason: Option<String>) -> Result<Outcome, RunnerError> {
    let reason = reason.unwrap_or_else(|| "closed".to_string());
    self.state.stop_workflow();

    if let Some(flow_id) = self.state.flow_id() {
      info!(flow_id, reason = %reason, "closing flow");
      self.telemetry(
        TelemetryKind::FlowClosed,
        self.state.current_node_id(),
        json!({
          "reason": reason,
          "context": self.state.context(),
          "history": self.state.history(),
        }),
      );
    }
    self.state.reset();

    self.presentation.close_all().await?;
    Ok(Outcome::Applied)
  }

  #[instrument(skip(self, payload), fields(subflow_id = %payload.subflow_id))]
  async fn start_subflow(&mut self, payload: StartSubflowPayload) -> Result<Outcome, RunnerError> {
    let Some(parent) = self.state.flow().cloned() else {
      warn!("START_SUBFLOW without an active flow");
      return Ok(Outcome::Ignored);
    };
    let subflow = self.flows.find_subflow(&parent, &payload.subflow_id)?;

    let return_to = payload
      .return_to
      .or_else(|| subflow.return_to.clone())
      .or_else(|| self.state.current_node_id().map(str::to_string))
      .unwrap_or_else(|| parent.start.clone());
    let start_at = payload.start_at.unwrap_or_else(|| subflow.start.clone());
    subflow.require_node(&start_at)?;

    let mut context = Context::merged(&subflow.globals, self.state.context());
    context.merge(&payload.context);

    self
      .state
      .push_subflow(subflow.clone(), return_to.clone(), context);
    info!(
      parent = %parent.id,
      subflow = %subflow.id,
      return_to = %return_to,
      depth = self.state.subflow_depth(),
      "entering subflow"
    );
    self.telemetry(
      TelemetryKind::SubflowStarted,
      Some(&start_at),
      json!({
        "parentFlowId": parent.id,
        "returnTo": return_to,
        "depth": self.state.subflow_depth(),
      }),
    );
    let node_id = self.advance(&subflow, &start_at)?;

    self.present(&subflow, &node_id, Transition::SubflowEnter).await?;
    Ok(Outcome::Applied)
  }

  #[instrument(skip(self, payload))]
  async fn close_subflow(&mut self, payload: CloseSubflowPayload) -> Result<Outcome, RunnerError> {
    if !self.state.in_subflow() {
      warn!("CLOSE_SUBFLOW with an empty subflow stack");
      return Ok(Outcome::Ignored);
    }
    if let Some(context) = &payload.context {
      self.state.update_context(context);
    }

    let Some(popped) = self.state.pop_subflow() else {
      return Ok(Outcome::Ignored);
    };
    let Some(parent) = self.state.flow().cloned() else {
      return Ok(Outcome::Ignored);
    };

    let return_to = if parent.contains_node(&popped.return_to) {
      popped.return_to.clone()
    } else {
      warn!(
        flow_id = %parent.id,
        return_to = %popped.return_to,
        "return target missing from parent, using its start"
      );
      parent.start.clone()
    };
    let node = parent.require_node(&return_to)?;
    self.state.reenter(node);

    self.notifier.telemetry(TelemetryRecord::new(
      TelemetryKind::SubflowClosed,
      Some(popped.subflow.id.clone()),
      None,
      json!({
        "parentFlowId": parent.id,
        "returnTo": return_to,
        "context": popped.final_context,
      }),
    ));
    self.telemetry(
      TelemetryKind::NodeEnter,
      Some(&return_to),
      json!({
        "direction": "return",
        "context": self.state.context(),
        "historyLength": self.state.history().len(),
      }),
    );

    self.presentation.close_flow(&popped.subflow.id).await?;
    self
      .present(&parent, &return_to, Transition::SubflowReturn)
      .await?;
    Ok(Outcome::Applied)
  }

  #[instrument(skip(self, payload), fields(target = %payload.target))]
  async fn jump_to(&mut self, payload: JumpPayload) -> Result<Outcome, RunnerError> {
    let Some(flow) = self.state.flow().cloned() else {
      warn!("JUMP_TO without an active flow");
      return Ok(Outcome::Ignored);
    };
    flow.require_node(&payload.target)?;

    if let Some(context) = &payload.context {
      self.state.update_context(context);
    }
    if let Some(current) = self.state.current_node_id().map(str::to_string) {
      self.edge_taken(&flow, &current, &payload.target, "jump");
    }
    let node_id = self.advance(&flow, &payload.target)?;

    self.present(&flow, &node_id, Transition::Forward).await?;
    Ok(Outcome::Applied)
  }

  /// RESUME and FLOW_SYNC. Idempotent: re-presenting the current node is a
  /// no-op when it is already on screen.
  #[instrument(skip(self, payload))]
  async fn resume(&mut self, payload: ResumePayload) -> Result<Outcome, RunnerError> {
    let flow = match self.state.flow().cloned() {
      Some(flow) => {
        if let Some(context) = &payload.context {
          self.state.update_context(context);
        }
        flow
      }
      None => {
        let Some(flow_id) = payload.flow_id.as_deref() else {
          warn!("RESUME with no flow loaded");
          return Ok(Outcome::Ignored);
        };
        let flow = self.flows.require(flow_id)?;
        self.rehydrate(&flow, payload)?;
        flow
      }
    };
    self.state.start_workflow();

    if let Some(node_id) = self.state.current_node_id().map(str::to_string) {
      self.present(&flow, &node_id, Transition::Resume).await?;
    }
    Ok(Outcome::Applied)
  }

  fn rehydrate(&mut self, flow: &Arc<Flow>, payload: ResumePayload) -> Result<(), RunnerError> {
    let mut history = payload.history;
    for node_id in &history {
      flow.require_node(node_id)?;
    }
    let node_id = payload
      .node_id
      .or_else(|| history.last().cloned())
      .unwrap_or_else(|| flow.start.clone());
    flow.require_node(&node_id)?;
    if history.last() != Some(&node_id) {
      history.push(node_id.clone());
    }

    info!(flow_id = %flow.id, node_id = %node_id, "rehydrating flow");
    let context = Context::merged(&flow.globals, &payload.context.unwrap_or_default());
    self.state.restore(flow.clone(), history, context);
    Ok(())
  }

  /// Always succeeds. A host that fails to dismiss is logged and forgotten.
  #[instrument(skip(self))]
  async fn reset(&mut self) -> Outcome {
    info!("resetting");
    self.state.reset();
    if let Err(e) = self.presentation.close_all().await {
      warn!(error = %e, "failed to dismiss layers during reset");
    }
    Outcome::Applied
  }

  /// Forward-skip from `target`, land on the result and record it.
  fn advance(&mut self, flow: &Flow, target: &str) -> Result<String, RunnerError> {
    let resolution = self.resolve_forward(flow, flow.require_node(target)?);
    for (from, to) in &resolution.skipped {
      self.edge_taken(flow, from, to, "skip");
    }

    let node = flow.require_node(&resolution.node_id)?;
    self.state.navigate_to_node(node);
    self.telemetry(
      TelemetryKind::NodeEnter,
      Some(&node.id),
      json!({
        "direction": "forward",
        "context": self.state.context(),
        "historyLength": self.state.history().len(),
      }),
    );
    Ok(node.id.clone())
  }

  fn resolve_forward(&self, flow: &Flow, from: &Node) -> ForwardResolution {
    let presentation = &self.presentation;
    self
      .navigation
      .resolve_forward(from, flow, self.state.context(), |node| {
        presentation.should_open(node)
      })
  }

  async fn present(
    &mut self,
    flow: &Flow,
    node_id: &str,
    transition: Transition,
  ) -> Result<(), RunnerError> {
    let node = flow.require_node(node_id)?;
    let depth = self.state.subflow_depth();
    self
      .presentation
      .present(node, &flow.id, depth, transition)
      .await?;
    Ok(())
  }

  fn fail(&mut self, error: RunnerError, command: Option<CommandKind>) {
    error!(error = %error, command = ?command, "command failed");
    let failure = FlowFailure::from_error(&error, command);
    self.emit(
      CommandKind::Error,
      serde_json::to_value(&failure).unwrap_or(Value::Null),
    );
    self.record_failure(failure);
  }

  fn record_failure(&mut self, failure: FlowFailure) {
    self.state.stop_workflow();
    self.telemetry(
      TelemetryKind::FlowError,
      self.state.current_node_id(),
      serde_json::to_value(&failure).unwrap_or(Value::Null),
    );
    self.state.set_error(failure);
  }

  fn edge_taken(&self, flow: &Flow, from: &str, to: &str, via: &str) {
    let completed = flow
      .get_node(from)
      .is_some_and(|node| node.is_complete(self.state.context()));
    self.telemetry(
      TelemetryKind::EdgeTaken,
      Some(from),
      json!({"from": from, "to": to, "via": via, "completed": completed}),
    );
  }

  fn emit(&self, command: CommandKind, payload: Value) {
    self
      .notifier
      .event(FlowEvent::new(command, payload, &self.config.event_source));
  }

  fn telemetry(&self, kind: TelemetryKind, node_id: Option<&str>, data: Value) {
    self.notifier.telemetry(TelemetryRecord::new(
      kind,
      self.state.flow_id().map(str::to_string),
      node_id.map(str::to_string),
      data,
    ));
  }
}
