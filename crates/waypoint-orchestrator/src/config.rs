//! Orchestrator configuration.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use waypoint_flow::ShowOn;

/// Device class the orchestrator presents for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
  Mobile,
  Tablet,
  #[default]
  Desktop,
}

impl DeviceClass {
  /// Whether a node displayed on `show_on` is visible on this device class.
  pub fn matches(&self, show_on: ShowOn) -> bool {
    match show_on {
      ShowOn::All => true,
      ShowOn::Mobile => *self == Self::Mobile,
      ShowOn::TabletPlus => matches!(self, Self::Tablet | Self::Desktop),
      ShowOn::None => false,
    }
  }

  pub fn is_mobile(&self) -> bool {
    *self == Self::Mobile
  }
}

impl fmt::Display for DeviceClass {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      Self::Mobile => "mobile",
      Self::Tablet => "tablet",
      Self::Desktop => "desktop",
    };
    f.write_str(s)
  }
}

impl FromStr for DeviceClass {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "mobile" => Ok(Self::Mobile),
      "tablet" => Ok(Self::Tablet),
      "desktop" => Ok(Self::Desktop),
      other => Err(format!(
        "unknown device class '{}' (expected mobile, tablet or desktop)",
        other
      )),
    }
  }
}

/// Configuration for the flow runner and its command queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrchestratorConfig {
  /// Device class used for display rules and layer policy.
  pub device_class: DeviceClass,
  /// Delay after dismissing a layer, letting its exit transition finish.
  pub close_delay_ms: u64,
  /// Maximum forward-skip hops when a flow sets no `hopLimit` policy.
  pub hop_limit: usize,
  /// Buffer size of the command queue.
  pub queue_capacity: usize,
  /// Bound on a single presentation host call. `None` waits indefinitely.
  pub presentation_timeout_ms: Option<u64>,
  /// `meta.source` stamped on emitted events.
  pub event_source: String,
}

impl Default for OrchestratorConfig {
  fn default() -> Self {
    Self {
      device_class: DeviceClass::default(),
      close_delay_ms: 150,
      hop_limit: 100,
      queue_capacity: 100,
      presentation_timeout_ms: None,
      event_source: "flow-runner".to_string(),
    }
  }
}

impl OrchestratorConfig {
  pub fn close_delay(&self) -> Duration {
    Duration::from_millis(self.close_delay_ms)
  }

  pub fn presentation_timeout(&self) -> Option<Duration> {
    self.presentation_timeout_ms.map(Duration::from_millis)
  }
}
