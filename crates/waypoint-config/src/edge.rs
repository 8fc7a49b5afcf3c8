use serde::{Deserialize, Serialize};

/// A directed, optionally conditional transition between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeDef {
  pub from: String,
  pub to: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub condition: Option<ConditionDef>,
}

/// Edge condition as authored.
///
/// Either a structured `{field, operator, value}` triple or a boolean
/// expression string evaluated against the execution context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionDef {
  Field {
    field: String,
    operator: Operator,
    value: serde_json::Value,
  },
  Expression(String),
}

/// Comparison operators for structured conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
  #[serde(rename = "==")]
  Eq,
  #[serde(rename = "===")]
  StrictEq,
  #[serde(rename = "!=")]
  Ne,
  #[serde(rename = "!==")]
  StrictNe,
  #[serde(rename = ">")]
  Gt,
  #[serde(rename = ">=")]
  Ge,
  #[serde(rename = "<")]
  Lt,
  #[serde(rename = "<=")]
  Le,
}

impl Operator {
  /// Parse an operator from its source spelling.
  pub fn from_symbol(symbol: &str) -> Option<Self> {
    match symbol {
      "==" => Some(Self::Eq),
      "===" => Some(Self::StrictEq),
      "!=" => Some(Self::Ne),
      "!==" => Some(Self::StrictNe),
      ">" => Some(Self::Gt),
      ">=" => Some(Self::Ge),
      "<" => Some(Self::Lt),
      "<=" => Some(Self::Le),
      _ => None,
    }
  }
}
