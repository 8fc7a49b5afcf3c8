//! Structural checks run before a flow is handed to the orchestrator.

use std::collections::HashSet;

use serde::Serialize;
use waypoint_config::{ConditionDef, FlowDef, ShowOn};

use crate::condition::Condition;
use crate::graph::Graph;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
  EmptyId,
  NoNodes,
  UnknownStart,
  NodeIdMismatch,
  DanglingEdge,
  UnknownReturnTarget,
  NonPresentableCycle,
  InvalidPolicy,
  UnreachableNode,
  Cycle,
  MalformedCondition,
  UnknownDisplayAnchor,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationIssue {
  /// Flow the issue was found in; subflows are reported as `parent/child`.
  pub flow_id: String,
  pub kind: IssueKind,
  pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
  pub errors: Vec<ValidationIssue>,
  pub warnings: Vec<ValidationIssue>,
}

impl ValidationReport {
  pub fn is_valid(&self) -> bool {
    self.errors.is_empty()
  }

  fn error(&mut self, flow_id: &str, kind: IssueKind, message: String) {
    self.errors.push(ValidationIssue {
      flow_id: flow_id.to_string(),
      kind,
      message,
    });
  }

  fn warn(&mut self, flow_id: &str, kind: IssueKind, message: String) {
    self.warnings.push(ValidationIssue {
      flow_id: flow_id.to_string(),
      kind,
      message,
    });
  }
}

/// Validate a flow definition and all of its embedded subflows.
///
/// Errors make the flow unusable. Warnings describe shapes that run but are
/// probably unintended (unreachable nodes, cycles, conditions that can never
/// hold).
pub fn validate_flow(def: &FlowDef) -> ValidationReport {
  let mut report = ValidationReport::default();
  validate_into(def, &def.id, None, &mut report);
  report
}

fn validate_into(
  def: &FlowDef,
  label: &str,
  parent: Option<&FlowDef>,
  report: &mut ValidationReport,
) {
  if def.id.trim().is_empty() {
    report.error(label, IssueKind::EmptyId, "flow id is empty".to_string());
  }

  if def.nodes.is_empty() {
    report.error(label, IssueKind::NoNodes, "flow has no nodes".to_string());
  }

  if !def.nodes.contains_key(&def.start) {
    report.error(
      label,
      IssueKind::UnknownStart,
      format!("start node '{}' does not exist", def.start),
    );
  }

  // Sort keys so reports are stable.
  let mut keys: Vec<&String> = def.nodes.keys().collect();
  keys.sort();

  for key in &keys {
    let node = &def.nodes[*key];
    if node.id != **key {
      report.error(
        label,
        IssueKind::NodeIdMismatch,
        format!("node keyed '{}' declares id '{}'", key, node.id),
      );
    }

    if let Some(meta) = &node.meta {
      if let Some(until) = &meta.display.root_keeps_children_until
        && !def.nodes.contains_key(until)
      {
        report.warn(
          label,
          IssueKind::UnknownDisplayAnchor,
          format!(
            "node '{}' keeps children until unknown node '{}'",
            key, until
          ),
        );
      }
      if let Some(source) = &meta.completion_condition
        && let Condition::Malformed { reason, .. } = Condition::compile_expression(source)
      {
        report.warn(
          label,
          IssueKind::MalformedCondition,
          format!("completion condition on '{}' is malformed: {}", key, reason),
        );
      }
    }
  }

  for (index, edge) in def.edges.iter().enumerate() {
    for (end, id) in [("source", &edge.from), ("target", &edge.to)] {
      if !def.nodes.contains_key(id) {
        report.error(
          label,
          IssueKind::DanglingEdge,
          format!("edge #{} references unknown {} node '{}'", index, end, id),
        );
      }
    }

    if let Some(ConditionDef::Expression(_)) = &edge.condition
      && let Condition::Malformed { reason, .. } = Condition::compile(edge.condition.as_ref())
    {
      report.warn(
        label,
        IssueKind::MalformedCondition,
        format!(
          "condition on edge {} -> {} is malformed and will never hold: {}",
          edge.from, edge.to, reason
        ),
      );
    }
  }

  if let Some(policies) = &def.policies
    && policies.hop_limit == Some(0)
  {
    report.error(
      label,
      IssueKind::InvalidPolicy,
      "hopLimit must be at least 1".to_string(),
    );
  }

  if let Some(return_to) = &def.return_to {
    match parent {
      Some(parent) if !parent.nodes.contains_key(return_to) => report.error(
        label,
        IssueKind::UnknownReturnTarget,
        format!(
          "return target '{}' does not exist in parent flow '{}'",
          return_to, parent.id
        ),
      ),
      _ => {}
    }
  }

  if def.nodes.contains_key(&def.start) {
    check_graph(def, label, report);
  }

  let mut subflow_ids: Vec<&String> = def.subflows.keys().collect();
  subflow_ids.sort();
  for id in subflow_ids {
    let sub = &def.subflows[id];
    let sub_label = format!("{}/{}", label, id);
    if sub.id != *id {
      report.error(
        &sub_label,
        IssueKind::NodeIdMismatch,
        format!("subflow keyed '{}' declares id '{}'", id, sub.id),
      );
    }
    validate_into(sub, &sub_label, Some(def), report);
  }
}

fn check_graph(def: &FlowDef, label: &str, report: &mut ValidationReport) {
  let graph = Graph::new(
    def.nodes.keys().map(|k| k.as_str()),
    def
      .edges
      .iter()
      .map(|e| (e.from.as_str(), e.to.as_str())),
  );

  let reachable = graph.reachable_from(&def.start);
  let mut unreachable: Vec<&String> = def
    .nodes
    .keys()
    .filter(|id| !reachable.contains(*id))
    .collect();
  unreachable.sort();
  for id in unreachable {
    report.warn(
      label,
      IssueKind::UnreachableNode,
      format!("node '{}' is not reachable from start '{}'", id, def.start),
    );
  }

  let mut seen = HashSet::new();
  for cycle in graph.find_cycles(&def.start) {
    let mut key = cycle.clone();
    key.sort();
    if !seen.insert(key) {
      continue;
    }

    // A loop made only of never-shown nodes would spin the forward-skip
    // resolver until its hop cap on every pass.
    let never_shown = cycle.iter().all(|id| {
      def
        .nodes
        .get(id)
        .and_then(|n| n.meta.as_ref())
        .is_some_and(|m| m.display.show_on == ShowOn::None)
    });

    let path = cycle.join(" -> ");
    if never_shown {
      report.error(
        label,
        IssueKind::NonPresentableCycle,
        format!("cycle of nodes that are never shown: {}", path),
      );
    } else {
      report.warn(label, IssueKind::Cycle, format!("cycle: {}", path));
    }
  }
}
