//! End-to-end tests for FlowRunner::dispatch against a headless host.

use std::sync::Arc;

use serde_json::{Value, json};
use tokio::sync::mpsc::UnboundedReceiver;
use waypoint_component_registry::InMemoryComponentRegistry;
use waypoint_flow::{Context, FlowRegistry};
use waypoint_orchestrator::{
  COMMAND_EXECUTION_FAILED, ChannelNotifier, Command, CommandKind, DeviceClass, Dismissal,
  DispatchEvent, FailureKind, FlowEvent, FlowRunner, HeadlessHost, HostError, OrchestratorConfig,
  PresentRequest, PresentationHost, TelemetryKind, TelemetryRecord,
};

struct Harness {
  runner: FlowRunner<ChannelNotifier>,
  host: Arc<HeadlessHost>,
  events: UnboundedReceiver<FlowEvent>,
  telemetry: UnboundedReceiver<TelemetryRecord>,
}

impl Harness {
  fn new(device: DeviceClass) -> Self {
    let mut flows = FlowRegistry::new();
    for def in [linear_flow(), onboarding_flow(), tour_flow()] {
      flows.register(serde_json::from_value(def).unwrap()).unwrap();
    }

    let components = InMemoryComponentRegistry::new()
      .with("guide")
      .with("task")
      .with("welcome-page");
    let host = Arc::new(HeadlessHost::new());
    let (notifier, events, telemetry) = ChannelNotifier::channel();
    let config = OrchestratorConfig {
      device_class: device,
      close_delay_ms: 0,
      ..Default::default()
    };

    let runner = FlowRunner::with_notifier(
      config,
      Arc::new(flows),
      Arc::new(components),
      host.clone(),
      notifier,
    );
    Self {
      runner,
      host,
      events,
      telemetry,
    }
  }

  fn desktop() -> Self {
    Self::new(DeviceClass::Desktop)
  }

  async fn send(&mut self, command: &str, payload: Value) -> waypoint_orchestrator::StateSnapshot {
    self
      .runner
      .dispatch(DispatchEvent::new(command, payload))
      .await
  }

  fn drain_telemetry(&mut self) -> Vec<TelemetryRecord> {
    let mut records = Vec::new();
    while let Ok(record) = self.telemetry.try_recv() {
      records.push(record);
    }
    records
  }

  fn drain_events(&mut self) -> Vec<FlowEvent> {
    let mut events = Vec::new();
    while let Ok(event) = self.events.try_recv() {
      events.push(event);
    }
    events
  }
}

fn guide(id: &str) -> Value {
  json!({"id": id, "type": "guide"})
}

fn linear_flow() -> Value {
  json!({
    "id": "linear",
    "version": "1",
    "start": "a",
    "nodes": {
      "a": guide("a"),
      "b": {"id": "b", "type": "guide", "meta": {"display": {"showOn": "none"}}},
      "c": guide("c"),
      "d": guide("d")
    },
    "edges": [
      {"from": "a", "to": "b"},
      {"from": "b", "to": "c"},
      {"from": "c", "to": "d"}
    ]
  })
}

fn onboarding_flow() -> Value {
  json!({
    "id": "onboarding",
    "version": "2",
    "start": "welcome",
    "globals": {"locale": "en"},
    "nodes": {
      "welcome": {"id": "welcome", "type": "guide", "config": {"page": "welcome-page"}},
      "profile": {
        "id": "profile",
        "type": "task",
        "meta": {"completionCondition": "profile.name != null"}
      },
      "pro": guide("pro"),
      "basic": guide("basic"),
      "summary": guide("summary")
    },
    "edges": [
      {"from": "welcome", "to": "profile"},
      {"from": "profile", "to": "pro", "condition": {"field": "plan", "operator": "==", "value": "pro"}},
      {"from": "profile", "to": "basic", "condition": "plan == 'basic' || plan == 'free'"},
      {"from": "pro", "to": "summary"},
      {"from": "basic", "to": "summary"}
    ],
    "subflows": {
      "help": {
        "id": "help",
        "version": "1",
        "start": "h1",
        "nodes": {"h1": guide("h1"), "h2": guide("h2")},
        "edges": [{"from": "h1", "to": "h2"}]
      }
    }
  })
}

fn tour_flow() -> Value {
  json!({
    "id": "tour",
    "version": "1",
    "start": "home",
    "nodes": {
      "home": {
        "id": "home",
        "type": "guide",
        "tags": ["checkpoint"],
        "meta": {"display": {"stickyRootOnMobile": true, "rootKeepsChildrenUntil": "done"}}
      },
      "one": guide("one"),
      "two": guide("two"),
      "done": guide("done")
    },
    "edges": [
      {"from": "home", "to": "one"},
      {"from": "one", "to": "two"},
      {"from": "two", "to": "done"}
    ]
  })
}

fn ctx(value: Value) -> Context {
  Context::try_from(value).unwrap()
}

#[tokio::test]
async fn test_next_skips_hidden_guide() {
  let mut h = Harness::desktop();

  let started = h.send("START", json!({"flowId": "linear"})).await;
  assert_eq!(started.history, vec!["a"]);
  assert!(started.running);

  let snapshot = h.send("NEXT", Value::Null).await;
  assert_eq!(snapshot.current_node.as_deref(), Some("c"));
  assert_eq!(snapshot.history, vec!["a", "c"]);

  let skipped: Vec<_> = h
    .drain_telemetry()
    .into_iter()
    .filter(|r| r.kind == TelemetryKind::EdgeTaken)
    .map(|r| (r.data["from"].clone(), r.data["to"].clone(), r.data["via"].clone()))
    .collect();
  assert_eq!(
    skipped,
    vec![
      (json!("a"), json!("b"), json!("edge")),
      (json!("b"), json!("c"), json!("skip")),
    ]
  );
  assert_eq!(h.host.visible_nodes(), vec!["c"]);
}

#[tokio::test]
async fn test_back_at_start_is_noop() {
  let mut h = Harness::desktop();
  let started = h.send("START", json!({"flowId": "linear"})).await;
  h.drain_events();
  h.drain_telemetry();

  let snapshot = h.send("BACK", Value::Null).await;

  assert_eq!(snapshot, started);
  assert!(h.drain_events().is_empty());
  assert!(h.drain_telemetry().is_empty());
}

#[tokio::test]
async fn test_unknown_command_goes_to_error_path() {
  let mut h = Harness::desktop();
  let before = h.send("START", json!({"flowId": "linear"})).await;
  h.drain_telemetry();

  let after = h.send("TELEPORT", json!({"to": "d"})).await;

  assert_eq!(after.current_node, before.current_node);
  assert_eq!(after.history, before.history);
  assert!(!after.running);

  let failure = after.last_error.unwrap();
  assert_eq!(failure.code, COMMAND_EXECUTION_FAILED);
  assert_eq!(failure.kind, FailureKind::Command);
  assert!(failure.recoverable);

  let records = h.drain_telemetry();
  assert_eq!(records.len(), 1);
  assert_eq!(records[0].kind, TelemetryKind::FlowError);
  assert_eq!(records[0].data["code"], COMMAND_EXECUTION_FAILED);
  assert_eq!(records[0].flow_id.as_deref(), Some("linear"));
}

#[tokio::test]
async fn test_history_grows_and_shrinks_by_one() {
  let mut h = Harness::desktop();
  h.send("START", json!({"flowId": "linear"})).await;

  let at_c = h.send("NEXT", Value::Null).await;
  let at_d = h.send("NEXT", Value::Null).await;
  assert_eq!(at_d.history.len(), at_c.history.len() + 1);
  assert_eq!(at_d.history.last(), at_d.current_node.as_ref());

  let back = h.send("BACK", Value::Null).await;
  assert_eq!(back.history.len(), at_d.history.len() - 1);
  assert_eq!(back.current_node.as_deref(), Some("c"));
  assert_eq!(h.host.visible_nodes(), vec!["c"]);
}

#[tokio::test]
async fn test_start_merges_globals_under_payload_context() {
  let mut h = Harness::desktop();
  let snapshot = h
    .send(
      "START",
      json!({"flowId": "onboarding", "context": {"locale": "fr", "name": "ada"}}),
    )
    .await;

  assert_eq!(snapshot.context, ctx(json!({"locale": "fr", "name": "ada"})));
  assert_eq!(snapshot.current_node.as_deref(), Some("welcome"));
  assert_eq!(snapshot.last_task, None);

  let started: Vec<_> = h
    .drain_telemetry()
    .into_iter()
    .filter(|r| r.kind == TelemetryKind::FlowStarted)
    .collect();
  assert_eq!(started.len(), 1);
  assert_eq!(started[0].data["version"], "2");
}

#[tokio::test]
async fn test_conditional_edges_follow_context() {
  let mut h = Harness::desktop();
  h.send("START", json!({"flowId": "onboarding"})).await;
  let profile = h.send("NEXT", Value::Null).await;
  assert_eq!(profile.last_task.as_deref(), Some("profile"));

  // No plan yet: every conditional edge fails closed.
  let stuck = h.send("NEXT", Value::Null).await;
  assert_eq!(stuck.current_node.as_deref(), Some("profile"));
  assert_eq!(stuck.last_error, None);
  h.drain_telemetry();

  let snapshot = h
    .send(
      "NEXT",
      json!({"context": {"plan": "free", "profile": {"name": "ada"}}}),
    )
    .await;
  assert_eq!(snapshot.current_node.as_deref(), Some("basic"));

  let edge = h
    .drain_telemetry()
    .into_iter()
    .find(|r| r.kind == TelemetryKind::EdgeTaken)
    .unwrap();
  assert_eq!(edge.node_id.as_deref(), Some("profile"));
  assert_eq!(edge.data["completed"], true);
}

#[tokio::test]
async fn test_events_only_for_applied_commands() {
  let mut h = Harness::desktop();
  h.send("START", json!({"flowId": "onboarding"})).await;
  h.send("NEXT", Value::Null).await;
  h.send("NEXT", Value::Null).await; // no valid edge

  let events = h.drain_events();
  let kinds: Vec<_> = events.iter().map(|e| e.command).collect();
  assert_eq!(kinds, vec![CommandKind::Start, CommandKind::Next]);
  assert_eq!(events[0].meta.source, "flow-runner");
  assert_eq!(events[0].payload["flowId"], "onboarding");
}

#[tokio::test]
async fn test_subflow_round_trip() {
  let mut h = Harness::desktop();
  h.send("START", json!({"flowId": "onboarding", "context": {"name": "ada"}}))
    .await;
  let before = h.send("NEXT", Value::Null).await;

  let entered = h
    .send(
      "START_SUBFLOW",
      json!({"subflowId": "help", "context": {"topic": "billing"}}),
    )
    .await;
  assert_eq!(entered.flow_id.as_deref(), Some("help"));
  assert_eq!(entered.current_node.as_deref(), Some("h1"));
  assert_eq!(entered.history, vec!["h1"]);
  assert_eq!(entered.subflow_stack, vec!["onboarding"]);
  assert_eq!(entered.context.get("name"), Some(&json!("ada")));

  h.send("NEXT_SUBFLOW", json!({"context": {"resolved": true}}))
    .await;
  let returned = h.send("CLOSE_SUBFLOW", Value::Null).await;

  assert_eq!(returned.flow_id.as_deref(), Some("onboarding"));
  assert_eq!(returned.current_node, before.current_node);
  assert_eq!(returned.history, before.history);
  assert_eq!(returned.last_task.as_deref(), Some("profile"));
  assert_eq!(returned.subflow_depth(), 0);
  assert_eq!(
    returned.context,
    ctx(json!({"locale": "en", "name": "ada", "topic": "billing", "resolved": true}))
  );
  assert_eq!(h.host.visible_nodes(), vec!["profile"]);

  let kinds: Vec<_> = h.drain_telemetry().into_iter().map(|r| r.kind).collect();
  assert!(kinds.contains(&TelemetryKind::SubflowStarted));
  assert!(kinds.contains(&TelemetryKind::SubflowClosed));
}

#[tokio::test]
async fn test_subflow_presents_above_parent() {
  let mut h = Harness::desktop();
  h.send("START", json!({"flowId": "onboarding"})).await;
  h.send("START_SUBFLOW", json!({"subflowId": "help"})).await;
  assert_eq!(h.host.visible_nodes(), vec!["welcome", "h1"]);

  h.send("NEXT_SUBFLOW", Value::Null).await;
  assert_eq!(h.host.visible_nodes(), vec!["welcome", "h2"]);

  let back = h.send("BACK_SUBFLOW", Value::Null).await;
  assert_eq!(back.current_node.as_deref(), Some("h1"));
  assert_eq!(h.host.visible_nodes(), vec!["welcome", "h1"]);
}

#[tokio::test]
async fn test_back_subflow_at_start_closes_subflow() {
  let mut h = Harness::desktop();
  h.send("START", json!({"flowId": "onboarding"})).await;
  h.send("START_SUBFLOW", json!({"subflowId": "help"})).await;

  let snapshot = h.send("BACK_SUBFLOW", Value::Null).await;
  assert_eq!(snapshot.flow_id.as_deref(), Some("onboarding"));
  assert_eq!(snapshot.current_node.as_deref(), Some("welcome"));
  assert_eq!(h.host.visible_nodes(), vec!["welcome"]);
}

#[tokio::test]
async fn test_subflow_commands_outside_subflow_are_ignored() {
  let mut h = Harness::desktop();
  let started = h.send("START", json!({"flowId": "onboarding"})).await;

  for command in ["NEXT_SUBFLOW", "BACK_SUBFLOW", "CLOSE_SUBFLOW"] {
    let snapshot = h.send(command, Value::Null).await;
    assert_eq!(snapshot, started, "{} should be a no-op", command);
  }
}

#[tokio::test]
async fn test_missing_return_target_falls_back_to_parent_start() {
  let mut h = Harness::desktop();
  h.send("START", json!({"flowId": "onboarding"})).await;
  h.send("NEXT", Value::Null).await;
  h.send(
    "START_SUBFLOW",
    json!({"subflowId": "help", "returnTo": "nowhere"}),
  )
  .await;

  let snapshot = h.send("CLOSE_SUBFLOW", Value::Null).await;
  assert_eq!(snapshot.current_node.as_deref(), Some("welcome"));
  assert_eq!(snapshot.history.last().map(String::as_str), Some("welcome"));
}

#[tokio::test]
async fn test_unknown_subflow_is_configuration_error() {
  let mut h = Harness::desktop();
  h.send("START", json!({"flowId": "onboarding"})).await;

  let snapshot = h.send("START_SUBFLOW", json!({"subflowId": "ghost"})).await;
  let failure = snapshot.last_error.unwrap();
  assert_eq!(failure.kind, FailureKind::Configuration);
  assert!(!failure.recoverable);
  assert_eq!(snapshot.flow_id.as_deref(), Some("onboarding"));
}

#[tokio::test]
async fn test_jump_to() {
  let mut h = Harness::desktop();
  h.send("START", json!({"flowId": "linear"})).await;

  let jumped = h.runner.apply(Command::jump_to("b")).await;
  // b is hidden, so the jump continues to c
  assert_eq!(jumped.current_node.as_deref(), Some("c"));
  assert_eq!(jumped.history, vec!["a", "c"]);

  let bad = h.runner.apply(Command::jump_to("zzz")).await;
  assert_eq!(bad.current_node.as_deref(), Some("c"));
  assert_eq!(bad.last_error.unwrap().kind, FailureKind::Configuration);
}

#[tokio::test]
async fn test_resume_is_idempotent() {
  let mut h = Harness::desktop();
  h.send("START", json!({"flowId": "linear"})).await;
  h.send("ERROR", json!({"message": "network lost"})).await;
  let calls = h.host.calls().len();

  let first = h.send("RESUME", Value::Null).await;
  let second = h.send("FLOW_SYNC", Value::Null).await;

  assert!(first.running);
  assert_eq!(first.current_node, second.current_node);
  assert_eq!(first.history, second.history);
  assert_eq!(h.host.calls().len(), calls);
}

#[tokio::test]
async fn test_resume_rehydrates_from_registry() {
  let mut h = Harness::desktop();
  let snapshot = h
    .send(
      "RESUME",
      json!({"flowId": "onboarding", "nodeId": "profile", "history": ["welcome", "profile"]}),
    )
    .await;

  assert!(snapshot.running);
  assert_eq!(snapshot.current_node.as_deref(), Some("profile"));
  assert_eq!(snapshot.last_task.as_deref(), Some("profile"));
  assert_eq!(snapshot.context.get("locale"), Some(&json!("en")));
  assert_eq!(h.host.visible_nodes(), vec!["profile"]);

  let back = h.send("BACK", Value::Null).await;
  assert_eq!(back.current_node.as_deref(), Some("welcome"));
}

#[tokio::test]
async fn test_close_reports_and_resets() {
  let mut h = Harness::desktop();
  h.send("START", json!({"flowId": "linear", "context": {"score": 3}}))
    .await;
  h.drain_telemetry();

  let snapshot = h.send("CLOSE", json!({"reason": "finished"})).await;
  assert_eq!(snapshot.flow_id, None);
  assert!(snapshot.history.is_empty());
  assert!(!snapshot.running);
  assert_eq!(h.host.visible_count(), 0);

  let closed = h.drain_telemetry();
  assert_eq!(closed.len(), 1);
  assert_eq!(closed[0].kind, TelemetryKind::FlowClosed);
  assert_eq!(closed[0].data["reason"], "finished");
  assert_eq!(closed[0].data["context"]["score"], 3);
}

#[tokio::test]
async fn test_reset_always_succeeds() {
  let mut h = Harness::desktop();
  let empty = h.send("RESET", Value::Null).await;
  assert_eq!(empty.last_error, None);

  h.send("START", json!({"flowId": "linear"})).await;
  let reset = h.send("RESET", Value::Null).await;
  assert_eq!(reset.flow_id, None);
  assert!(reset.generation > empty.generation);
  assert_eq!(h.host.visible_count(), 0);
}

#[tokio::test]
async fn test_error_command_is_recorded() {
  let mut h = Harness::desktop();
  h.send("START", json!({"flowId": "linear"})).await;
  h.drain_telemetry();

  let snapshot = h
    .send(
      "ERROR",
      json!({"code": "UPLOAD_FAILED", "message": "timeout", "recoverable": false}),
    )
    .await;

  let failure = snapshot.last_error.unwrap();
  assert_eq!(failure.code, "UPLOAD_FAILED");
  assert_eq!(failure.kind, FailureKind::Reported);
  assert!(!failure.recoverable);
  assert!(!snapshot.running);
  assert_eq!(snapshot.current_node.as_deref(), Some("a"));

  let records = h.drain_telemetry();
  assert_eq!(records[0].kind, TelemetryKind::FlowError);
}

#[tokio::test]
async fn test_inline_flow_is_validated() {
  let mut h = Harness::desktop();
  let snapshot = h
    .send(
      "START",
      json!({"flow": {"id": "broken", "version": "1", "start": "nope", "nodes": {}, "edges": []}}),
    )
    .await;

  assert_eq!(snapshot.flow_id, None);
  let failure = snapshot.last_error.unwrap();
  assert_eq!(failure.kind, FailureKind::Configuration);
  assert!(!failure.recoverable);
}

#[tokio::test]
async fn test_inline_flow_runs() {
  let mut h = Harness::desktop();
  let snapshot = h
    .send(
      "START",
      json!({"flow": {
        "id": "adhoc",
        "version": "1",
        "start": "x",
        "nodes": {"x": guide("x"), "y": guide("y")},
        "edges": [{"from": "x", "to": "y"}]
      }}),
    )
    .await;
  assert_eq!(snapshot.flow_id.as_deref(), Some("adhoc"));

  let next = h.send("NEXT", Value::Null).await;
  assert_eq!(next.current_node.as_deref(), Some("y"));
}

#[tokio::test]
async fn test_mobile_sticky_root() {
  let mut h = Harness::new(DeviceClass::Mobile);
  h.send("START", json!({"flowId": "tour"})).await;
  h.send("NEXT", Value::Null).await;
  h.send("NEXT", Value::Null).await;
  assert_eq!(h.host.visible_nodes(), vec!["home", "one", "two"]);
  assert_eq!(h.runner.presentation().root_node(), Some("home"));

  h.send("BACK", Value::Null).await;
  assert_eq!(h.host.visible_nodes(), vec!["home", "one"]);

  h.send("NEXT", Value::Null).await;
  let done = h.send("NEXT", Value::Null).await;
  assert_eq!(done.current_node.as_deref(), Some("done"));
  assert_eq!(h.host.visible_nodes(), vec!["done"]);
  assert_eq!(h.runner.presentation().root_node(), Some("done"));
}

#[tokio::test]
async fn test_desktop_keeps_single_main_layer() {
  let mut h = Harness::desktop();
  h.send("START", json!({"flowId": "tour"})).await;
  h.send("NEXT", Value::Null).await;
  h.send("NEXT", Value::Null).await;
  assert_eq!(h.host.visible_nodes(), vec!["two"]);
  assert_eq!(h.runner.presentation().root_node(), None);
}

#[tokio::test]
async fn test_watch_channel_publishes_each_command() {
  let mut h = Harness::desktop();
  let mut rx = h.runner.subscribe();

  h.send("START", json!({"flowId": "linear"})).await;
  assert!(rx.has_changed().unwrap());
  assert_eq!(rx.borrow_and_update().current_node.as_deref(), Some("a"));

  h.send("NEXT", Value::Null).await;
  assert!(rx.has_changed().unwrap());
  assert_eq!(rx.borrow_and_update().current_node.as_deref(), Some("c"));
}

#[tokio::test]
async fn test_next_with_explicit_target() {
  let mut h = Harness::desktop();
  h.send("START", json!({"flowId": "linear"})).await;
  h.drain_telemetry();

  let snapshot = h.send("NEXT", json!({"target": "d"})).await;
  assert_eq!(snapshot.current_node.as_deref(), Some("d"));
  assert_eq!(snapshot.history, vec!["a", "d"]);
  assert_eq!(h.host.visible_nodes(), vec!["d"]);

  let edge = h
    .drain_telemetry()
    .into_iter()
    .find(|r| r.kind == TelemetryKind::EdgeTaken)
    .unwrap();
  assert_eq!(edge.data["via"], "explicit");
  assert_eq!(edge.data["to"], "d");
}

#[tokio::test]
async fn test_next_to_unknown_target_is_configuration_error() {
  let mut h = Harness::desktop();
  h.send("START", json!({"flowId": "linear"})).await;
  h.drain_events();

  let snapshot = h.send("NEXT", json!({"target": "nowhere"})).await;
  assert_eq!(snapshot.current_node.as_deref(), Some("a"));
  assert_eq!(snapshot.history, vec!["a"]);
  assert!(!snapshot.running);

  let failure = snapshot.last_error.unwrap();
  assert_eq!(failure.kind, FailureKind::Configuration);
  assert_eq!(failure.code, COMMAND_EXECUTION_FAILED);
  assert!(!failure.recoverable);

  let kinds: Vec<_> = h.drain_events().into_iter().map(|e| e.command).collect();
  assert_eq!(kinds, vec![CommandKind::Error]);
}

#[tokio::test]
async fn test_mobile_back_closes_top_layer_first() {
  let mut h = Harness::new(DeviceClass::Mobile);
  h.send("START", json!({"flowId": "tour"})).await;
  h.send("NEXT", Value::Null).await;
  h.send("NEXT", Value::Null).await;
  let presented = h.host.presented_nodes().len();

  let at_one = h.send("BACK", Value::Null).await;
  assert_eq!(at_one.current_node.as_deref(), Some("one"));
  assert_eq!(h.host.visible_nodes(), vec!["home", "one"]);

  let at_home = h.send("BACK", Value::Null).await;
  assert_eq!(at_home.current_node.as_deref(), Some("home"));
  assert_eq!(h.host.visible_nodes(), vec!["home"]);
  assert_eq!(h.runner.presentation().root_node(), Some("home"));

  // Layers underneath were revealed, not presented again
  assert_eq!(h.host.presented_nodes().len(), presented);
}

#[tokio::test]
async fn test_mobile_loop_reveals_revisited_child() {
  let mut h = Harness::new(DeviceClass::Mobile);
  h.send(
    "START",
    json!({"flow": {
      "id": "menu",
      "version": "1",
      "start": "home",
      "nodes": {
        "home": {
          "id": "home",
          "type": "guide",
          "tags": ["checkpoint"],
          "meta": {"display": {"stickyRootOnMobile": true, "rootKeepsChildrenUntil": "done"}}
        },
        "one": guide("one"),
        "two": guide("two"),
        "done": guide("done")
      },
      "edges": [
        {"from": "home", "to": "one"},
        {"from": "one", "to": "two"},
        {"from": "two", "to": "one", "condition": "again == true"},
        {"from": "two", "to": "done"}
      ]
    }, "context": {"again": true}}),
  )
  .await;
  h.send("NEXT", Value::Null).await;
  h.send("NEXT", Value::Null).await;

  let looped = h.send("NEXT", Value::Null).await;
  assert_eq!(looped.current_node.as_deref(), Some("one"));
  assert_eq!(looped.history, vec!["home", "one", "two", "one"]);
  assert_eq!(h.host.visible_nodes(), vec!["home", "one"]);
  assert_eq!(
    h.host.visible_nodes().last(),
    looped.current_node.as_ref()
  );

  let jumped = h.runner.apply(Command::jump_to("two")).await;
  assert_eq!(jumped.current_node.as_deref(), Some("two"));
  assert_eq!(h.host.visible_nodes(), vec!["home", "one", "two"]);
}

/// A host whose surfaces never finish appearing.
struct StalledHost;

#[async_trait::async_trait]
impl PresentationHost for StalledHost {
  async fn present(&self, _request: PresentRequest) -> Result<(), HostError> {
    std::future::pending().await
  }

  async fn dismiss(&self, _modal_id: &str) -> Result<Dismissal, HostError> {
    Ok(Dismissal::default())
  }
}

#[tokio::test(start_paused = true)]
async fn test_presentation_timeout_goes_to_error_path() {
  let mut flows = FlowRegistry::new();
  flows
    .register(serde_json::from_value(linear_flow()).unwrap())
    .unwrap();
  let (notifier, _events, mut telemetry) = ChannelNotifier::channel();
  let config = OrchestratorConfig {
    close_delay_ms: 0,
    presentation_timeout_ms: Some(500),
    ..Default::default()
  };
  let mut runner = FlowRunner::with_notifier(
    config,
    Arc::new(flows),
    Arc::new(InMemoryComponentRegistry::new().with("guide")),
    Arc::new(StalledHost),
    notifier,
  );

  let snapshot = runner.apply(Command::start("linear")).await;

  assert_eq!(snapshot.current_node.as_deref(), Some("a"));
  assert!(!snapshot.running);
  let failure = snapshot.last_error.unwrap();
  assert_eq!(failure.kind, FailureKind::Presentation);
  assert!(failure.recoverable);
  assert_eq!(failure.code, COMMAND_EXECUTION_FAILED);
  assert!(runner.presentation().layers().is_empty());

  let mut kinds = Vec::new();
  while let Ok(record) = telemetry.try_recv() {
    kinds.push(record.kind);
  }
  assert_eq!(kinds.last(), Some(&TelemetryKind::FlowError));
}

#[tokio::test]
async fn test_deeply_nested_inline_condition_fails_closed() {
  let mut h = Harness::desktop();
  let condition = format!("{}ok{}", "(".repeat(10_000), ")".repeat(10_000));
  let started = h
    .send(
      "START",
      json!({"flow": {
        "id": "nested",
        "version": "1",
        "start": "x",
        "nodes": {"x": guide("x"), "y": guide("y")},
        "edges": [{"from": "x", "to": "y", "condition": condition}]
      }, "context": {"ok": true}}),
    )
    .await;
  assert_eq!(started.flow_id.as_deref(), Some("nested"));
  assert_eq!(started.last_error, None);

  let next = h.send("NEXT", Value::Null).await;
  assert_eq!(next.current_node.as_deref(), Some("x"));
  assert_eq!(next.last_error, None);
}
