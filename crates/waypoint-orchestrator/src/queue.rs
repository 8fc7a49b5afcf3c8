//! Serialized command processing.
//!
//! The `FlowQueue` owns the [`FlowRunner`] and an mpsc channel. Callers hold
//! cloneable [`FlowHandle`]s; every command they send is applied strictly in
//! arrival order, one at a time, and each caller gets back the snapshot
//! taken right after its own command.

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::command::{Command, DispatchEvent};
use crate::events::FlowNotifier;
use crate::runner::FlowRunner;
use crate::state::StateSnapshot;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
  #[error("flow queue is closed")]
  Closed,
}

enum Queued {
  Event(DispatchEvent),
  Command(Command),
}

struct Envelope {
  item: Queued,
  reply: Option<oneshot::Sender<StateSnapshot>>,
}

/// Single consumer in front of a [`FlowRunner`].
///
/// # Usage
///
/// ```ignore
/// let (queue, handle) = FlowQueue::new(runner);
/// let cancel = CancellationToken::new();
/// let task = queue.spawn(cancel.clone());
///
/// let snapshot = handle.dispatch(DispatchEvent::new("START", payload)).await?;
/// ```
pub struct FlowQueue<N> {
  receiver: mpsc::Receiver<Envelope>,
  runner: FlowRunner<N>,
}

/// Cloneable sending side of a [`FlowQueue`].
#[derive(Clone)]
pub struct FlowHandle {
  sender: mpsc::Sender<Envelope>,
  state: watch::Receiver<StateSnapshot>,
}

impl<N: FlowNotifier> FlowQueue<N> {
  /// Create a queue sized by the runner's `queueCapacity`.
  pub fn new(runner: FlowRunner<N>) -> (Self, FlowHandle) {
    let capacity = runner.config().queue_capacity.max(1);
    Self::with_capacity(runner, capacity)
  }

  pub fn with_capacity(runner: FlowRunner<N>, capacity: usize) -> (Self, FlowHandle) {
    let (sender, receiver) = mpsc::channel(capacity);
    let handle = FlowHandle {
      sender,
      state: runner.subscribe(),
    };
    (Self { receiver, runner }, handle)
  }

  /// Process commands until `cancel` fires or every handle is dropped.
  ///
  /// Returns the runner so its final state can be inspected.
  pub async fn run(mut self, cancel: CancellationToken) -> FlowRunner<N> {
    info!("flow queue started");

    loop {
      tokio::select! {
        _ = cancel.cancelled() => {
          info!("flow queue cancelled");
          break;
        }
        envelope = self.receiver.recv() => {
          let Some(Envelope { item, reply }) = envelope else {
            info!("all flow handles dropped");
            break;
          };
          let snapshot = match item {
            Queued::Event(event) => self.runner.dispatch(event).await,
            Queued::Command(command) => self.runner.apply(command).await,
          };
          if let Some(reply) = reply {
            // Caller may have stopped waiting
            let _ = reply.send(snapshot);
          }
        }
      }
    }

    debug!("flow queue stopped");
    self.runner
  }
}

impl<N: FlowNotifier + 'static> FlowQueue<N> {
  /// Run the queue on a new tokio task.
  pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<FlowRunner<N>> {
    tokio::spawn(self.run(cancel))
  }
}

impl FlowHandle {
  /// Send an untyped command and wait for the state it produced.
  pub async fn dispatch(&self, event: DispatchEvent) -> Result<StateSnapshot, QueueError> {
    self.request(Queued::Event(event)).await
  }

  /// Send a typed command and wait for the state it produced.
  pub async fn apply(&self, command: Command) -> Result<StateSnapshot, QueueError> {
    self.request(Queued::Command(command)).await
  }

  /// Enqueue without waiting for the command to be applied.
  pub async fn submit(&self, event: DispatchEvent) -> Result<(), QueueError> {
    self
      .sender
      .send(Envelope {
        item: Queued::Event(event),
        reply: None,
      })
      .await
      .map_err(|_| QueueError::Closed)
  }

  /// Latest published snapshot.
  pub fn snapshot(&self) -> StateSnapshot {
    self.state.borrow().clone()
  }

  /// A receiver notified after every applied command.
  pub fn subscribe(&self) -> watch::Receiver<StateSnapshot> {
    self.state.clone()
  }

  pub fn is_closed(&self) -> bool {
    self.sender.is_closed()
  }

  async fn request(&self, item: Queued) -> Result<StateSnapshot, QueueError> {
    let (reply, response) = oneshot::channel();
    self
      .sender
      .send(Envelope {
        item,
        reply: Some(reply),
      })
      .await
      .map_err(|_| QueueError::Closed)?;
    response.await.map_err(|_| QueueError::Closed)
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;
  use std::time::Duration;

  use serde_json::json;
  use waypoint_component_registry::InMemoryComponentRegistry;
  use waypoint_flow::FlowRegistry;

  use super::*;
  use crate::config::OrchestratorConfig;
  use crate::events::NoopNotifier;
  use crate::presentation::HeadlessHost;

  fn runner() -> FlowRunner<NoopNotifier> {
    let mut flows = FlowRegistry::new();
    flows
      .register(
        serde_json::from_value(json!({
          "id": "steps",
          "version": "1",
          "start": "s1",
          "nodes": {
            "s1": {"id": "s1", "type": "guide"},
            "s2": {"id": "s2", "type": "guide"},
            "s3": {"id": "s3", "type": "guide"}
          },
          "edges": [{"from": "s1", "to": "s2"}, {"from": "s2", "to": "s3"}]
        }))
        .unwrap(),
      )
      .unwrap();
    FlowRunner::new(
      OrchestratorConfig {
        close_delay_ms: 0,
        ..Default::default()
      },
      Arc::new(flows),
      Arc::new(InMemoryComponentRegistry::new().with("guide")),
      Arc::new(HeadlessHost::new()),
    )
  }

  #[tokio::test]
  async fn test_commands_apply_in_order() {
    let (queue, handle) = FlowQueue::new(runner());
    let cancel = CancellationToken::new();
    let task = queue.spawn(cancel.clone());

    handle.submit(Command::start("steps").into()).await.unwrap();
    handle.submit(Command::next().into()).await.unwrap();
    let snapshot = handle.apply(Command::next()).await.unwrap();

    assert_eq!(snapshot.history, vec!["s1", "s2", "s3"]);
    assert_eq!(handle.snapshot(), snapshot);

    cancel.cancel();
    let runner = task.await.unwrap();
    assert_eq!(runner.snapshot().current_node.as_deref(), Some("s3"));
  }

  #[tokio::test]
  async fn test_concurrent_handles_are_serialized() {
    let (queue, handle) = FlowQueue::new(runner());
    let cancel = CancellationToken::new();
    let task = queue.spawn(cancel.clone());

    handle.apply(Command::start("steps")).await.unwrap();

    let a = handle.clone();
    let b = handle.clone();
    let (first, second) = tokio::join!(a.apply(Command::next()), b.apply(Command::next()));
    let mut lengths = vec![first.unwrap().history.len(), second.unwrap().history.len()];
    lengths.sort();
    assert_eq!(lengths, vec![2, 3]);

    cancel.cancel();
    task.await.unwrap();
  }

  #[tokio::test]
  async fn test_stops_when_handles_drop() {
    let (queue, handle) = FlowQueue::new(runner());
    let task = queue.spawn(CancellationToken::new());

    drop(handle);
    let finished = tokio::time::timeout(Duration::from_secs(1), task).await;
    assert!(finished.is_ok());
  }

  #[tokio::test]
  async fn test_dispatch_after_stop_is_closed() {
    let (queue, handle) = FlowQueue::new(runner());
    let cancel = CancellationToken::new();
    let task = queue.spawn(cancel.clone());

    cancel.cancel();
    task.await.unwrap();

    assert!(handle.is_closed());
    assert!(matches!(
      handle.apply(Command::next()).await,
      Err(QueueError::Closed)
    ));
  }
}
