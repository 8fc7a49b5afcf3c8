//! Waypoint Orchestrator
//!
//! Drives guided flows: resolves navigation over a locked
//! [`Flow`](waypoint_flow::Flow), keeps execution state, and reconciles the
//! layers a presentation host shows.
//!
//! # Architecture
//!
//! ```text
//!   FlowHandle ──mpsc──▶ FlowQueue ──▶ FlowRunner::dispatch
//!                                        │
//!                   ┌────────────────────┼──────────────────────┐
//!                   ▼                    ▼                      ▼
//!          NavigationResolver      StateManager       PresentationCoordinator
//!           (edges, skipping)    (history, context,     (layers, sticky root,
//!                                  subflow stack)         PresentationHost)
//!                                        │
//!                                        ▼
//!                             FlowNotifier (events, telemetry)
//! ```
//!
//! Commands are applied one at a time. A failing command never surfaces as
//! an error to the caller; it lands in the snapshot's `lastError` and on the
//! `flow.error` telemetry record.

mod command;
mod config;
mod error;
mod events;
mod navigation;
mod presentation;
mod queue;
mod runner;
mod state;

pub use command::{
  ClosePayload, CloseSubflowPayload, Command, CommandKind, DispatchEvent, ErrorPayload,
  JumpPayload, NextPayload, ResumePayload, StartPayload, StartSubflowPayload,
};
pub use config::{DeviceClass, OrchestratorConfig};
pub use error::{
  COMMAND_EXECUTION_FAILED, FLOW_ERROR, FailureKind, FlowFailure, PresentationError, RunnerError,
};
pub use events::{
  ChannelNotifier, EventMeta, FlowEvent, FlowNotifier, NoopNotifier, TelemetryKind,
  TelemetryRecord,
};
pub use navigation::{ForwardResolution, NavigationResolver};
pub use presentation::{
  DismissOutcome, Dismissal, HeadlessHost, HostCall, HostError, LayerType, ModalState,
  OpenOutcome, PresentRequest, PresentationCoordinator, PresentationHost, Transition,
};
pub use queue::{FlowHandle, FlowQueue, QueueError};
pub use runner::FlowRunner;
pub use state::{PoppedSubflow, StateManager, StateSnapshot, SubflowStackEntry};
