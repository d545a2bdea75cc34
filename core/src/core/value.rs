// trancode/src/core/value.rs

//! Variable values and the variable classes they live in.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A context value. JSON's tagged union is used as-is: comparisons are typed,
/// so `"1"` never equals `1` and `1` never equals `1.0`.
pub type Value = serde_json::Value;

/// A named set of values (one session class, or the external inputs/outputs).
pub type VarMap = BTreeMap<String, Value>;

/// The context classes a router can inspect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VarClass {
  SystemSession,
  UserSession,
  FuncCachedVariables,
}

/// Converts a JSON object into a [`VarMap`]. Anything else is wrapped under `key`.
pub fn object_to_varmap(value: Value, key: &str) -> VarMap {
  match value {
    Value::Object(obj) => obj.into_iter().collect(),
    Value::Null => VarMap::new(),
    other => {
      let mut map = VarMap::new();
      map.insert(key.to_string(), other);
      map
    }
  }
}

pub fn varmap_to_object(map: &VarMap) -> Value {
  Value::Object(map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
}

/// Short type label used in validation errors and logs.
pub fn type_label(value: &Value) -> &'static str {
  match value {
    Value::Null => "null",
    Value::Bool(_) => "bool",
    Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
    Value::Number(_) => "float",
    Value::String(_) => "string",
    Value::Array(_) => "array",
    Value::Object(_) => "object",
  }
}
