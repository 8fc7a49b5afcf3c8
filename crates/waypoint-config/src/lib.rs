//! Waypoint Config
//!
//! This crate contains the serializable flow definition types for Waypoint.
//! These types describe a guided workflow as it is authored, before it is
//! validated and compiled by `waypoint-flow`.
//!
//! Definitions are plain JSON documents with camelCase keys:
//!
//! ```json
//! {
//!   "id": "check-in",
//!   "version": "1",
//!   "start": "welcome",
//!   "nodes": {
//!     "welcome": { "id": "welcome", "type": "task", "config": { "page": "welcome-page" } },
//!     "scan": { "id": "scan", "type": "guide", "meta": { "display": { "showOn": "mobile" } } }
//!   },
//!   "edges": [
//!     { "from": "welcome", "to": "scan", "condition": "visitor.checkedIn == false" }
//!   ]
//! }
//! ```

mod edge;
mod flow;
mod node;

pub use edge::{ConditionDef, EdgeDef, Operator};
pub use flow::{FlowDef, Policies};
pub use node::{
  DisplayRules, LayerHint, NodeConfig, NodeDef, NodeMeta, NodeType, PresentationHints, ShowOn,
};
