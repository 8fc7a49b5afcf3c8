//! Compiled edge conditions.

use serde_json::Value;
use waypoint_config::{ConditionDef, Operator};

use crate::context::Context;
use crate::error::EvalError;
use crate::expression::Expression;

/// A condition compiled from its definition.
///
/// Compilation never fails: a condition that cannot be parsed becomes
/// [`Condition::Malformed`], which always evaluates to false.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
  Always,
  Field {
    field: String,
    operator: Operator,
    value: Value,
  },
  Expression(Expression),
  Malformed { source: String, reason: String },
}

impl Condition {
  pub fn compile(def: Option<&ConditionDef>) -> Self {
    match def {
      None => Self::Always,
      Some(ConditionDef::Field {
        field,
        operator,
        value,
      }) => Self::Field {
        field: field.clone(),
        operator: *operator,
        value: value.clone(),
      },
      Some(ConditionDef::Expression(source)) => Self::compile_expression(source),
    }
  }

  pub fn compile_expression(source: &str) -> Self {
    if source.trim() == "true" {
      return Self::Always;
    }
    match Expression::parse(source) {
      Ok(expr) => Self::Expression(expr),
      Err(e) => Self::Malformed {
        source: source.to_string(),
        reason: e.to_string(),
      },
    }
  }

  pub fn is_malformed(&self) -> bool {
    matches!(self, Self::Malformed { .. })
  }

  pub fn evaluate(&self, context: &Context) -> Result<bool, EvalError> {
    match self {
      Self::Always => Ok(true),
      Self::Field {
        field,
        operator,
        value,
      } => {
        let actual = context
          .lookup(field)
          .ok_or_else(|| EvalError::MissingKey(field.clone()))?;
        Ok(compare_values(actual, *operator, value))
      }
      Self::Expression(expr) => expr.evaluate(context),
      Self::Malformed { reason, .. } => Err(EvalError::Malformed(reason.clone())),
    }
  }

  /// Evaluate, treating any failure as false.
  pub fn is_satisfied(&self, context: &Context) -> bool {
    self.evaluate(context).unwrap_or(false)
  }
}

/// Compare two JSON values with the given operator.
///
/// `==`/`!=` coerce between numbers, numeric strings and booleans.
/// `===`/`!==` require matching JSON types. Ordering operators coerce both
/// sides to numbers and fall back to string ordering only when both sides
/// are non-numeric strings; anything else compares false.
pub fn compare_values(left: &Value, operator: Operator, right: &Value) -> bool {
  match operator {
    Operator::Eq => loose_eq(left, right),
    Operator::Ne => !loose_eq(left, right),
    Operator::StrictEq => strict_eq(left, right),
    Operator::StrictNe => !strict_eq(left, right),
    Operator::Gt | Operator::Ge | Operator::Lt | Operator::Le => {
      let ordering = match (to_number(left), to_number(right)) {
        (Some(l), Some(r)) => l.partial_cmp(&r),
        _ => match (left, right) {
          (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
          _ => None,
        },
      };
      let Some(ordering) = ordering else {
        return false;
      };
      match operator {
        Operator::Gt => ordering.is_gt(),
        Operator::Ge => ordering.is_ge(),
        Operator::Lt => ordering.is_lt(),
        _ => ordering.is_le(),
      }
    }
  }
}

fn strict_eq(left: &Value, right: &Value) -> bool {
  match (left, right) {
    (Value::Number(l), Value::Number(r)) => l.as_f64() == r.as_f64(),
    _ => left == right,
  }
}

fn loose_eq(left: &Value, right: &Value) -> bool {
  match (left, right) {
    (Value::Null, Value::Null) => true,
    (Value::Null, _) | (_, Value::Null) => false,
    (Value::String(l), Value::String(r)) => l == r,
    (Value::Array(_) | Value::Object(_), _) | (_, Value::Array(_) | Value::Object(_)) => {
      strict_eq(left, right)
    }
    _ => match (to_number(left), to_number(right)) {
      (Some(l), Some(r)) => l == r,
      _ => false,
    },
  }
}

fn to_number(value: &Value) -> Option<f64> {
  match value {
    Value::Number(n) => n.as_f64(),
    Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
    Value::String(s) => {
      let trimmed = s.trim();
      if trimmed.is_empty() {
        None
      } else {
        trimmed.parse::<f64>().ok().filter(|f| f.is_finite())
      }
    }
    _ => None,
  }
}
