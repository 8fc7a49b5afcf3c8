//! Presentation coordination.
//!
//! The [`PresentationCoordinator`] decides which layers are on screen after
//! each navigation and drives a [`PresentationHost`] to get them there.
//!
//! # Layer policy
//!
//! ```text
//!   non-mobile          mobile (sticky root)
//!   ┌────────┐          ┌────────┐  nested level 2
//!   │  main  │          ├────────┤  nested level 1
//!   └────────┘          ├────────┤
//!   replaced on         │  root  │  pinned until its
//!   every transition    └────────┘  `rootKeepsChildrenUntil` node
//! ```
//!
//! Subflow nodes sit on the `subflow` layer at their stack depth. Nodes
//! hinted `global` sit on the global layer, which main transitions leave
//! alone.

mod host;
mod modal;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, info};
use waypoint_component_registry::ComponentRegistry;
use waypoint_flow::{LayerHint, Node};

pub use host::{
  DismissOutcome, Dismissal, HeadlessHost, HostCall, HostError, PresentRequest, PresentationHost,
};
pub use modal::{LayerType, ModalState, OpenOutcome};

use crate::config::{DeviceClass, OrchestratorConfig};
use crate::error::PresentationError;

/// Why a node is being presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
  Forward,
  Back,
  /// Reactivation of the current node; never replaces an open layer.
  Resume,
  SubflowEnter,
  SubflowReturn,
}

impl Transition {
  fn keeps_open_layer(&self) -> bool {
    matches!(self, Self::Resume | Self::SubflowReturn)
  }
}

#[derive(Debug, Clone)]
struct RootAnchor {
  modal_id: String,
  until: Option<String>,
}

pub struct PresentationCoordinator {
  components: Arc<dyn ComponentRegistry>,
  host: Arc<dyn PresentationHost>,
  device: DeviceClass,
  close_delay: Duration,
  timeout: Option<Duration>,
  layers: Vec<ModalState>,
  root: Option<RootAnchor>,
}

impl PresentationCoordinator {
  pub fn new(
    components: Arc<dyn ComponentRegistry>,
    host: Arc<dyn PresentationHost>,
    config: &OrchestratorConfig,
  ) -> Self {
    Self {
      components,
      host,
      device: config.device_class,
      close_delay: config.close_delay(),
      timeout: config.presentation_timeout(),
      layers: Vec::new(),
      root: None,
    }
  }

  pub fn device(&self) -> DeviceClass {
    self.device
  }

  /// Whether `node` is visible on this device and has a registered unit.
  pub fn should_open(&self, node: &Node) -> bool {
    self.device.matches(node.display.show_on) && self.component_for(node).is_some()
  }

  /// Registered unit id for `node`: its page, else its node type.
  fn component_for<'n>(&self, node: &'n Node) -> Option<&'n str> {
    node
      .page()
      .filter(|page| self.components.has(page))
      .or_else(|| {
        let type_id = node.node_type.as_str();
        self.components.has(type_id).then_some(type_id)
      })
  }

  /// Open layers, bottom-most first.
  pub fn layers(&self) -> &[ModalState] {
    &self.layers
  }

  pub fn is_open(&self, node_id: &str, flow_id: &str) -> bool {
    self.layers.iter().any(|m| m.is_for(node_id, flow_id))
  }

  /// Node id of the pinned mobile root, if any.
  pub fn root_node(&self) -> Option<&str> {
    self.root_layer().map(|m| m.node_id.as_str())
  }

  fn root_layer(&self) -> Option<&ModalState> {
    let root = self.root.as_ref()?;
    self.layers.iter().find(|m| m.id == root.modal_id)
  }

  /// Bring the screen in line with `node` having become current.
  ///
  /// `depth` is the subflow stack depth; zero for the top-level flow.
  pub async fn present(
    &mut self,
    node: &Node,
    flow_id: &str,
    depth: usize,
    transition: Transition,
  ) -> Result<(), PresentationError> {
    if !self.should_open(node) {
      debug!(node_id = %node.id, device = %self.device, "node not presentable");
      return Ok(());
    }

    if node.layer_hint() == Some(LayerHint::Global) {
      self.open(node, flow_id, LayerType::Global, 0, None).await?;
      return Ok(());
    }

    if depth > 0 {
      return self.present_subflow(node, flow_id, depth, transition).await;
    }

    if self.device.is_mobile() {
      self.present_mobile(node, flow_id, transition).await
    } else {
      self.present_main(node, flow_id, transition).await
    }
  }

  async fn present_main(
    &mut self,
    node: &Node,
    flow_id: &str,
    transition: Transition,
  ) -> Result<(), PresentationError> {
    if transition.keeps_open_layer() && self.is_open(&node.id, flow_id) {
      return Ok(());
    }
    self.close_where(|m| matches!(m.layer, LayerType::Main | LayerType::Nested)).await?;
    self.open(node, flow_id, LayerType::Main, 0, None).await?;
    Ok(())
  }

  async fn present_mobile(
    &mut self,
    node: &Node,
    flow_id: &str,
    transition: Transition,
  ) -> Result<(), PresentationError> {
    let mut released = false;

    if let Some(root) = self.root_layer().cloned() {
      if root.is_for(&node.id, flow_id) {
        self.close_where(|m| m.layer == LayerType::Nested).await?;
        return Ok(());
      }

      let until = self.root.as_ref().and_then(|r| r.until.as_deref());
      if until != Some(node.id.as_str()) {
        // Revisiting an open child pops everything stacked above it.
        if let Some(index) = self
          .layers
          .iter()
          .position(|m| m.layer == LayerType::Nested && m.is_for(&node.id, flow_id))
        {
          let above: Vec<String> = self.layers[index + 1..]
            .iter()
            .filter(|m| m.layer == LayerType::Nested)
            .map(|m| m.id.clone())
            .collect();
          debug!(node_id = %node.id, closing = above.len(), "returning to open child");
          self.close_where(|m| above.contains(&m.id)).await?;
          return Ok(());
        }

        let top = self
          .layers
          .iter()
          .rev()
          .find(|m| m.layer == LayerType::Nested)
          .unwrap_or(&root);
        let level = top.level + 1;
        let parent = Some(top.id.clone());
        self.open(node, flow_id, LayerType::Nested, level, parent).await?;
        return Ok(());
      }

      info!(root = %root.node_id, node_id = %node.id, "sticky root released");
      released = true;
    } else if transition.keeps_open_layer() && self.is_open(&node.id, flow_id) {
      return Ok(());
    }

    self.close_where(|m| matches!(m.layer, LayerType::Main | LayerType::Nested)).await?;
    let outcome = self.open(node, flow_id, LayerType::Main, 0, None).await?;

    if released || node.is_sticky_root() {
      debug!(node_id = %node.id, "anchoring sticky root");
      self.root = Some(RootAnchor {
        modal_id: outcome.modal().id.clone(),
        until: node.display.root_keeps_children_until.clone(),
      });
    }
    Ok(())
  }

  async fn present_subflow(
    &mut self,
    node: &Node,
    flow_id: &str,
    depth: usize,
    transition: Transition,
  ) -> Result<(), PresentationError> {
    if !transition.keeps_open_layer() {
      self
        .close_where(|m| {
          m.layer == LayerType::Subflow && m.level == depth && !m.is_for(&node.id, flow_id)
        })
        .await?;
    }
    let parent = self
      .layers
      .iter()
      .rev()
      .find(|m| m.layer != LayerType::Global && !(m.layer == LayerType::Subflow && m.level >= depth))
      .map(|m| m.id.clone());
    self.open(node, flow_id, LayerType::Subflow, depth, parent).await?;
    Ok(())
  }

  /// Open `node` on `layer`.
  ///
  /// Idempotent per (node, flow): a pair already on screen yields
  /// [`OpenOutcome::AlreadyOpen`] without touching the host.
  pub async fn open(
    &mut self,
    node: &Node,
    flow_id: &str,
    layer: LayerType,
    level: usize,
    parent: Option<String>,
  ) -> Result<OpenOutcome, PresentationError> {
    if let Some(existing) = self.layers.iter().find(|m| m.is_for(&node.id, flow_id)) {
      debug!(node_id = %node.id, flow_id, modal_id = %existing.id, "layer already open");
      return Ok(OpenOutcome::AlreadyOpen(existing.clone()));
    }

    let requested = self
      .component_for(node)
      .or(node.page())
      .unwrap_or(node.node_type.as_str());
    let unit = self.components.resolve(requested, &node.id).await?;

    let modal = ModalState::new(&node.id, flow_id, layer, level, parent);
    let request = PresentRequest {
      modal_id: modal.id.clone(),
      unit,
      node_id: node.id.clone(),
      flow_id: flow_id.to_string(),
      layer,
      level,
      parent: modal.parent.clone(),
      data: node_data(node),
    };
    self.bounded(self.host.present(request)).await?;

    info!(
      node_id = %node.id,
      flow_id,
      modal_id = %modal.id,
      layer = ?layer,
      level,
      "layer opened"
    );
    self.layers.push(modal.clone());
    Ok(OpenOutcome::Opened(modal))
  }

  /// Close one layer. `None` if it was not open.
  ///
  /// The layer is forgotten before the host is asked to dismiss it, so a
  /// failed dismissal never leaves a stale entry behind.
  pub async fn close(&mut self, modal_id: &str) -> Result<Option<DismissOutcome>, PresentationError> {
    let Some(index) = self.layers.iter().position(|m| m.id == modal_id) else {
      return Ok(None);
    };
    let modal = self.layers.remove(index);
    self.forget_root(&[modal.id.as_str()]);

    let dismissal = self.bounded(self.host.dismiss(&modal.id)).await?;
    self.settle().await;
    debug!(modal_id = %modal.id, node_id = %modal.node_id, "layer closed");
    Ok(Some(dismissal.outcome()))
  }

  /// Close the topmost layer that is not global.
  pub async fn close_current(&mut self) -> Result<Option<DismissOutcome>, PresentationError> {
    let top = self
      .layers
      .iter()
      .rev()
      .find(|m| m.layer != LayerType::Global)
      .map(|m| m.id.clone());
    match top {
      Some(modal_id) => self.close(&modal_id).await,
      None => Ok(None),
    }
  }

  /// Close every layer belonging to `flow_id`.
  pub async fn close_flow(&mut self, flow_id: &str) -> Result<(), PresentationError> {
    self.close_where(|m| m.flow_id == flow_id).await
  }

  pub async fn close_all(&mut self) -> Result<(), PresentationError> {
    self.close_where(|_| true).await
  }

  async fn close_where(
    &mut self,
    predicate: impl Fn(&ModalState) -> bool,
  ) -> Result<(), PresentationError> {
    let (closing, keep): (Vec<_>, Vec<_>) =
      std::mem::take(&mut self.layers).into_iter().partition(|m| predicate(m));
    self.layers = keep;
    if closing.is_empty() {
      return Ok(());
    }

    let ids: Vec<&str> = closing.iter().map(|m| m.id.as_str()).collect();
    self.forget_root(&ids);

    // Topmost first
    let dismissals = join_all(
      ids
        .iter()
        .rev()
        .map(|id| self.bounded(self.host.dismiss(id))),
    )
    .await;
    self.settle().await;
    debug!(count = ids.len(), "layers closed");

    dismissals.into_iter().try_for_each(|r| r.map(|_| ()))
  }

  fn forget_root(&mut self, closed: &[&str]) {
    if self
      .root
      .as_ref()
      .is_some_and(|root| closed.contains(&root.modal_id.as_str()))
    {
      self.root = None;
    }
  }

  async fn settle(&self) {
    if !self.close_delay.is_zero() {
      tokio::time::sleep(self.close_delay).await;
    }
  }

  async fn bounded<T>(
    &self,
    call: impl Future<Output = Result<T, HostError>>,
  ) -> Result<T, PresentationError> {
    match self.timeout {
      Some(limit) => tokio::time::timeout(limit, call)
        .await
        .map_err(|_| PresentationError::Timeout(limit))?
        .map_err(PresentationError::from),
      None => call.await.map_err(PresentationError::from),
    }
  }
}

fn node_data(node: &Node) -> serde_json::Value {
  if node.presentation.data.is_null() {
    serde_json::Value::Object(node.config.extra.clone())
  } else {
    node.presentation.data.clone()
  }
}
