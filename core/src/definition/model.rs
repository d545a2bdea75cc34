// trancode/src/definition/model.rs

//! The declarative transaction-code definition: function groups, their
//! functions and router rules. Definitions are read-only once loaded and are
//! shared between executions as `Arc<TransactionCode>`.

use crate::core::control::FailurePolicy;
use crate::core::value::{type_label, Value, VarClass};
use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionCode {
  #[serde(rename = "trancodename")]
  pub name: String,
  #[serde(default)]
  pub version: String,
  #[serde(default)]
  pub status: String,
  #[serde(default, rename = "isdefault")]
  pub is_default: bool,
  #[serde(default)]
  pub description: String,
  #[serde(rename = "firstfuncgroup")]
  pub first_func_group: String,
  #[serde(default, rename = "functiongroups")]
  pub function_groups: Vec<FunctionGroupDef>,
}

impl TransactionCode {
  pub fn new(name: impl Into<String>, first_func_group: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      version: String::new(),
      status: String::new(),
      is_default: true,
      description: String::new(),
      first_func_group: first_func_group.into(),
      function_groups: Vec::new(),
    }
  }

  pub fn group(mut self, group: FunctionGroupDef) -> Self {
    self.function_groups.push(group);
    self
  }

  /// Parses and validates a definition. `source_label` only appears in errors.
  pub fn from_json_str(source_label: &str, text: &str) -> EngineResult<Self> {
    let code: TransactionCode = serde_json::from_str(text).map_err(|e| EngineError::Deserialization {
      source_label: source_label.to_string(),
      message: e.to_string(),
    })?;
    code.validate()?;
    Ok(code)
  }

  pub fn from_value(source_label: &str, value: Value) -> EngineResult<Self> {
    let code: TransactionCode = serde_json::from_value(value).map_err(|e| EngineError::Deserialization {
      source_label: source_label.to_string(),
      message: e.to_string(),
    })?;
    code.validate()?;
    Ok(code)
  }

  /// Exact lookup. The empty string never resolves.
  pub fn group_by_name(&self, name: &str) -> Option<&FunctionGroupDef> {
    if name.is_empty() {
      return None;
    }
    self.function_groups.iter().find(|g| g.name == name)
  }

  /// Checks the structural invariants the executor relies on.
  pub fn validate(&self) -> EngineResult<()> {
    let invalid = |message: String| EngineError::InvalidDefinition {
      trancode: self.name.clone(),
      message,
    };

    if self.name.trim().is_empty() {
      return Err(invalid("transaction code name is empty".to_string()));
    }

    let mut seen = HashSet::new();
    for group in &self.function_groups {
      if group.name.is_empty() {
        return Err(invalid("function group with an empty name".to_string()));
      }
      if !seen.insert(group.name.as_str()) {
        return Err(invalid(format!("duplicate function group '{}'", group.name)));
      }

      let router = &group.router;
      if router.values.len() != router.next_func_groups.len() {
        return Err(invalid(format!(
          "router of group '{}' has {} values but {} next groups",
          group.name,
          router.values.len(),
          router.next_func_groups.len()
        )));
      }

      for function in &group.functions {
        if function.function_type.trim().is_empty() {
          return Err(invalid(format!(
            "function '{}' in group '{}' has no functype",
            function.name, group.name
          )));
        }
        for input in &function.inputs {
          if input.source == InputSource::Prefunction && input.key().split('.').count() != 2 {
            return Err(invalid(format!(
              "input '{}' of function '{}' reads a prior function but '{}' is not '<function>.<field>'",
              input.name,
              function.name,
              input.key()
            )));
          }
        }
      }
    }
    Ok(())
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionGroupDef {
  pub name: String,
  #[serde(default)]
  pub functions: Vec<FunctionDef>,
  #[serde(default, rename = "routerdef")]
  pub router: RouterDef,
}

impl FunctionGroupDef {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      functions: Vec::new(),
      router: RouterDef::default(),
    }
  }

  pub fn function(mut self, function: FunctionDef) -> Self {
    self.functions.push(function);
    self
  }

  pub fn router(mut self, router: RouterDef) -> Self {
    self.router = router;
    self
  }
}

/// Conditional routing rule evaluated after a group's functions have run.
///
/// The default rule has no candidates and an empty default group, which ends
/// the flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RouterDef {
  #[serde(default)]
  pub variable: String,
  /// Class `variable` is read from. Without one the router always takes the
  /// default group.
  #[serde(default, rename = "vartype", skip_serializing_if = "Option::is_none")]
  pub var_type: Option<VarClass>,
  #[serde(default)]
  pub values: Vec<Value>,
  #[serde(default, rename = "nextfuncgroups")]
  pub next_func_groups: Vec<String>,
  #[serde(default, rename = "defaultfuncgroup")]
  pub default_func_group: String,
}

impl RouterDef {
  pub fn on(var_type: VarClass, variable: impl Into<String>) -> Self {
    Self {
      variable: variable.into(),
      var_type: Some(var_type),
      ..Default::default()
    }
  }

  /// Always routes to `group`.
  pub fn goto(group: impl Into<String>) -> Self {
    Self {
      default_func_group: group.into(),
      ..Default::default()
    }
  }

  pub fn route(mut self, value: impl Into<Value>, group: impl Into<String>) -> Self {
    self.values.push(value.into());
    self.next_func_groups.push(group.into());
    self
  }

  pub fn otherwise(mut self, group: impl Into<String>) -> Self {
    self.default_func_group = group.into();
    self
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDef {
  pub name: String,
  /// Operation identifier looked up in the operation catalog.
  #[serde(rename = "functype")]
  pub function_type: String,
  #[serde(default)]
  pub content: String,
  #[serde(default)]
  pub inputs: Vec<InputBinding>,
  #[serde(default)]
  pub outputs: Vec<OutputBinding>,
  #[serde(default, rename = "onerror")]
  pub on_error: Option<FailurePolicy>,
}

impl FunctionDef {
  pub fn new(name: impl Into<String>, function_type: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      function_type: function_type.into(),
      content: String::new(),
      inputs: Vec::new(),
      outputs: Vec::new(),
      on_error: None,
    }
  }

  pub fn content(mut self, content: impl Into<String>) -> Self {
    self.content = content.into();
    self
  }

  pub fn input(mut self, input: InputBinding) -> Self {
    self.inputs.push(input);
    self
  }

  pub fn output(mut self, output: OutputBinding) -> Self {
    self.outputs.push(output);
    self
  }

  pub fn on_error(mut self, policy: FailurePolicy) -> Self {
    self.on_error = Some(policy);
    self
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum InputSource {
  #[default]
  Constant,
  SystemSession,
  UserSession,
  ExternalInputs,
  /// `<function>.<field>` from the function cache of the current group.
  Prefunction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
  #[default]
  Any,
  String,
  Integer,
  Float,
  Bool,
  Object,
  Array,
}

impl DataType {
  /// Strict check, no conversions. `Float` accepts any JSON number.
  pub fn accepts(&self, value: &Value) -> bool {
    match self {
      DataType::Any => true,
      DataType::String => value.is_string(),
      DataType::Integer => value.is_i64() || value.is_u64(),
      DataType::Float => value.is_number(),
      DataType::Bool => value.is_boolean(),
      DataType::Object => value.is_object(),
      DataType::Array => value.is_array(),
    }
  }

  pub fn label(&self) -> &'static str {
    match self {
      DataType::Any => "any",
      DataType::String => "string",
      DataType::Integer => "integer",
      DataType::Float => "float",
      DataType::Bool => "bool",
      DataType::Object => "object",
      DataType::Array => "array",
    }
  }

  pub(crate) fn describe_mismatch(&self, value: &Value) -> (String, String) {
    (self.label().to_string(), type_label(value).to_string())
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputBinding {
  pub name: String,
  #[serde(default)]
  pub source: InputSource,
  /// Key read from the source; defaults to `name`.
  #[serde(default, rename = "aliasname")]
  pub alias: Option<String>,
  #[serde(default)]
  pub value: Option<Value>,
  #[serde(default, rename = "defaultvalue")]
  pub default_value: Option<Value>,
  #[serde(default)]
  pub required: bool,
  #[serde(default, rename = "datatype")]
  pub data_type: DataType,
}

impl InputBinding {
  pub fn constant(name: impl Into<String>, value: impl Into<Value>) -> Self {
    Self::from_source(name, InputSource::Constant).with_value(value)
  }

  pub fn from_source(name: impl Into<String>, source: InputSource) -> Self {
    Self {
      name: name.into(),
      source,
      alias: None,
      value: None,
      default_value: None,
      required: false,
      data_type: DataType::Any,
    }
  }

  pub fn alias(mut self, alias: impl Into<String>) -> Self {
    self.alias = Some(alias.into());
    self
  }

  pub fn with_value(mut self, value: impl Into<Value>) -> Self {
    self.value = Some(value.into());
    self
  }

  pub fn default_value(mut self, value: impl Into<Value>) -> Self {
    self.default_value = Some(value.into());
    self
  }

  pub fn required(mut self) -> Self {
    self.required = true;
    self
  }

  pub fn data_type(mut self, data_type: DataType) -> Self {
    self.data_type = data_type;
    self
  }

  /// The key this binding reads from its source.
  pub fn key(&self) -> &str {
    self.alias.as_deref().unwrap_or(&self.name)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OutputTarget {
  UserSession,
  ExternalOutputs,
  ExternalInputs,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputBinding {
  /// Key in the operation's outputs.
  pub name: String,
  /// Key written to each destination; defaults to `name`.
  #[serde(default, rename = "aliasname")]
  pub alias: Option<String>,
  #[serde(default)]
  pub destinations: Vec<OutputTarget>,
}

impl OutputBinding {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      alias: None,
      destinations: Vec::new(),
    }
  }

  pub fn alias(mut self, alias: impl Into<String>) -> Self {
    self.alias = Some(alias.into());
    self
  }

  pub fn to(mut self, target: OutputTarget) -> Self {
    self.destinations.push(target);
    self
  }

  pub fn key(&self) -> &str {
    self.alias.as_deref().unwrap_or(&self.name)
  }
}
