use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Execution context: accumulated key/value data carried across transitions.
///
/// Updates always merge. Keys from the incoming side overwrite, everything
/// else persists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context(Map<String, Value>);

impl Context {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get(&self, key: &str) -> Option<&Value> {
    self.0.get(key)
  }

  pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
    self.0.insert(key.into(), value.into());
  }

  pub fn contains_key(&self, key: &str) -> bool {
    self.0.contains_key(key)
  }

  /// Merge `other` into this context; its keys win.
  pub fn merge(&mut self, other: &Context) {
    for (key, value) in &other.0 {
      self.0.insert(key.clone(), value.clone());
    }
  }

  /// A new context with `base` underneath and `overlay` on top.
  pub fn merged(base: &Context, overlay: &Context) -> Context {
    let mut out = base.clone();
    out.merge(overlay);
    out
  }

  /// Resolve a dotted path (`visitor.badge.id`). Every segment must exist.
  pub fn lookup(&self, path: &str) -> Option<&Value> {
    let mut segments = path.split('.');
    let mut current = self.0.get(segments.next()?)?;
    for segment in segments {
      current = match current {
        Value::Object(map) => map.get(segment)?,
        Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
        _ => return None,
      };
    }
    Some(current)
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
    self.0.iter()
  }

  pub fn to_value(&self) -> Value {
    Value::Object(self.0.clone())
  }
}

impl From<Map<String, Value>> for Context {
  fn from(map: Map<String, Value>) -> Self {
    Self(map)
  }
}

impl FromIterator<(String, Value)> for Context {
  fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
    Self(iter.into_iter().collect())
  }
}

impl TryFrom<Value> for Context {
  type Error = Value;

  fn try_from(value: Value) -> Result<Self, Self::Error> {
    match value {
      Value::Object(map) => Ok(Self(map)),
      Value::Null => Ok(Self::default()),
      other => Err(other),
    }
  }
}
