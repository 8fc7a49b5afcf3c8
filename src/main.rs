use std::collections::BTreeSet;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use waypoint_component_registry::{
  ComponentRegistry, FsComponentRegistry, InMemoryComponentRegistry, RenderableUnit,
};
use waypoint_config::{FlowDef, NodeType};
use waypoint_flow::{FlowRegistry, validate_flow};
use waypoint_orchestrator::{
  ChannelNotifier, DeviceClass, DispatchEvent, FlowQueue, FlowRunner, HeadlessHost,
  OrchestratorConfig,
};

/// Waypoint - a command-driven orchestrator for guided flows
#[derive(Parser)]
#[command(name = "waypoint")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.waypoint)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  /// Orchestrator config file (default: <data dir>/config.json, if present)
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Validate a flow definition and print the report
  Validate {
    /// Path to the flow file (JSON)
    flow_file: PathBuf,
  },

  /// Run a flow against a headless host
  ///
  /// Dispatch events are read from stdin, one JSON object per line
  /// (`{"command": "NEXT", "payload": {...}}`). With no input, the flow is
  /// started and left at its first presentable node.
  Run {
    /// Path to the flow file (JSON)
    flow_file: PathBuf,

    /// Device class to present for (mobile, tablet, desktop)
    #[arg(long)]
    device: Option<DeviceClass>,

    /// Directory of component manifests (default: <data dir>/components,
    /// if present; otherwise every page and node type is treated as
    /// registered)
    #[arg(long)]
    components: Option<PathBuf>,
  },
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
    .with_writer(io::stderr)
    .init();

  let cli = Cli::parse();

  let data_dir = match cli.data_dir {
    Some(dir) => dir,
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".waypoint"),
  };

  match cli.command {
    Some(Commands::Validate { flow_file }) => validate(flow_file)?,
    Some(Commands::Run {
      flow_file,
      device,
      components,
    }) => {
      let rt = tokio::runtime::Runtime::new()?;
      rt.block_on(run_flow(
        flow_file,
        data_dir,
        cli.config,
        device,
        components,
      ))?;
    }
    None => {
      println!("waypoint - use --help to see available commands");
    }
  }

  Ok(())
}

fn validate(flow_file: PathBuf) -> Result<()> {
  let content = std::fs::read_to_string(&flow_file)
    .with_context(|| format!("failed to read flow file: {}", flow_file.display()))?;
  let def: FlowDef = serde_json::from_str(&content)
    .with_context(|| format!("failed to parse flow file: {}", flow_file.display()))?;

  let report = validate_flow(&def);
  println!("{}", serde_json::to_string_pretty(&report)?);

  if !report.is_valid() {
    bail!(
      "flow '{}' has {} error(s)",
      def.id,
      report.errors.len()
    );
  }
  eprintln!(
    "Flow '{}' is valid ({} warning(s))",
    def.id,
    report.warnings.len()
  );
  Ok(())
}

async fn run_flow(
  flow_file: PathBuf,
  data_dir: PathBuf,
  config_file: Option<PathBuf>,
  device: Option<DeviceClass>,
  components_dir: Option<PathBuf>,
) -> Result<()> {
  let content = tokio::fs::read_to_string(&flow_file)
    .await
    .with_context(|| format!("failed to read flow file: {}", flow_file.display()))?;
  let def: FlowDef = serde_json::from_str(&content)
    .with_context(|| format!("failed to parse flow file: {}", flow_file.display()))?;

  let mut config = load_config(config_file, &data_dir).await?;
  if let Some(device) = device {
    config.device_class = device;
  }

  let components = load_components(components_dir, &data_dir, &def).await?;

  let mut flows = FlowRegistry::new();
  let flow = flows
    .register(def)
    .with_context(|| format!("failed to load flow: {}", flow_file.display()))?;
  eprintln!(
    "Loaded flow: {} ({} nodes, {} subflows)",
    flow.id,
    flow.nodes.len(),
    flow.subflows.len()
  );

  let mut events = read_events_from_stdin()?;
  if events.is_empty() {
    events.push(DispatchEvent::new(
      "START",
      serde_json::json!({ "flowId": flow.id }),
    ));
  }

  let host = Arc::new(HeadlessHost::new());
  let (notifier, mut applied, mut telemetry) = ChannelNotifier::channel();
  let runner = FlowRunner::with_notifier(
    config,
    Arc::new(flows),
    components,
    host.clone(),
    notifier,
  );

  let (queue, handle) = FlowQueue::new(runner);
  let task = queue.spawn(CancellationToken::new());

  for event in events {
    handle
      .dispatch(event)
      .await
      .context("flow queue stopped unexpectedly")?;
  }
  drop(handle);
  let runner = task.await.context("flow queue task failed")?;

  let mut applied_count = 0;
  while applied.try_recv().is_ok() {
    applied_count += 1;
  }
  while let Ok(record) = telemetry.try_recv() {
    println!("{}", serde_json::to_string(&record)?);
  }

  eprintln!("Commands applied: {}", applied_count);
  eprintln!("Visible layers: {:?}", host.visible_nodes());
  println!("{}", serde_json::to_string_pretty(&runner.snapshot())?);

  Ok(())
}

async fn load_config(config_file: Option<PathBuf>, data_dir: &Path) -> Result<OrchestratorConfig> {
  let path = match config_file {
    Some(path) => path,
    None => {
      let default = data_dir.join("config.json");
      if !tokio::fs::try_exists(&default).await.unwrap_or(false) {
        return Ok(OrchestratorConfig::default());
      }
      default
    }
  };

  let content = tokio::fs::read_to_string(&path)
    .await
    .with_context(|| format!("failed to read config file: {}", path.display()))?;
  serde_json::from_str(&content)
    .with_context(|| format!("failed to parse config file: {}", path.display()))
}

async fn load_components(
  components_dir: Option<PathBuf>,
  data_dir: &Path,
  def: &FlowDef,
) -> Result<Arc<dyn ComponentRegistry>> {
  let dir = components_dir.unwrap_or_else(|| data_dir.join("components"));
  if tokio::fs::try_exists(&dir).await.unwrap_or(false) {
    let registry = FsComponentRegistry::open(&dir)
      .await
      .with_context(|| format!("failed to open component directory: {}", dir.display()))?;
    return Ok(Arc::new(registry));
  }

  warn!(
    dir = %dir.display(),
    "no component directory, treating every page and node type as registered"
  );
  let mut registry = InMemoryComponentRegistry::new();
  for id in referenced_units(def) {
    registry.register(RenderableUnit::new(id));
  }
  Ok(Arc::new(registry))
}

/// Every node type plus every page referenced by `def` and its subflows.
fn referenced_units(def: &FlowDef) -> BTreeSet<String> {
  let mut units: BTreeSet<String> = [NodeType::Task, NodeType::Guide, NodeType::Subflow]
    .iter()
    .map(|t| t.as_str().to_string())
    .collect();

  let mut pending = vec![def];
  while let Some(flow) = pending.pop() {
    units.extend(
      flow
        .nodes
        .values()
        .filter_map(|node| node.config.as_ref()?.page.clone()),
    );
    pending.extend(flow.subflows.values());
  }
  units
}

fn read_events_from_stdin() -> Result<Vec<DispatchEvent>> {
  if io::stdin().is_terminal() {
    return Ok(Vec::new());
  }

  let mut input = String::new();
  io::stdin()
    .read_to_string(&mut input)
    .context("failed to read dispatch events from stdin")?;

  input
    .lines()
    .enumerate()
    .filter(|(_, line)| !line.trim().is_empty())
    .map(|(index, line)| {
      serde_json::from_str(line)
        .with_context(|| format!("failed to parse dispatch event on line {}", index + 1))
    })
    .collect()
}
