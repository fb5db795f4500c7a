use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One declared parameter of a tool. Declaration order defines positional binding.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolParam {
    pub name: String,
    pub description: String,
    #[serde(default = "default_true")]
    pub required: bool,
}

fn default_true() -> bool {
    true
}

impl ToolParam {
    pub fn required(name: &str, description: &str) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            required: true,
        }
    }

    pub fn optional(name: &str, description: &str) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            required: false,
        }
    }
}

/// Tool definition used for prompt documentation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ToolParam>,
}

#[derive(Clone, Debug, thiserror::Error)]
pub enum ToolError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("execution failed: {0}")]
    ExecutionFailed(String),
    #[error("timeout after {0:?}")]
    Timeout(Duration),
}

/// Core Tool trait. Tools receive arguments already bound to parameter names.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters(&self) -> Vec<ToolParam>;

    /// Example argument mappings shown in tool documentation.
    fn usage_examples(&self) -> Vec<Map<String, Value>> {
        Vec::new()
    }

    async fn execute(&self, args: &Map<String, Value>) -> Result<Value, ToolError>;

    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

/// Read a numeric argument given either as a JSON number or a numeric string.
pub fn number_arg(args: &Map<String, Value>, key: &str) -> Result<f64, ToolError> {
    match args.get(key) {
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| ToolError::InvalidArguments(format!("{key} is not a finite number"))),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| ToolError::InvalidArguments(format!("{key} is not a number: {s:?}"))),
        Some(other) => Err(ToolError::InvalidArguments(format!(
            "{key} must be a number, got {other}"
        ))),
        None => Err(ToolError::InvalidArguments(format!("{key} is required"))),
    }
}

/// Read a string argument; non-string values use their JSON form.
pub fn string_arg(args: &Map<String, Value>, key: &str) -> Result<String, ToolError> {
    match args.get(key) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Ok(other.to_string()),
        None => Err(ToolError::InvalidArguments(format!("{key} is required"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn number_arg_accepts_numbers_and_strings() {
        let a = args(json!({"x": 2.5, "y": " 4 ", "z": "four"}));
        assert_eq!(number_arg(&a, "x").unwrap(), 2.5);
        assert_eq!(number_arg(&a, "y").unwrap(), 4.0);
        assert!(matches!(number_arg(&a, "z"), Err(ToolError::InvalidArguments(_))));
        assert!(matches!(number_arg(&a, "w"), Err(ToolError::InvalidArguments(_))));
    }

    #[test]
    fn string_arg_stringifies_values() {
        let a = args(json!({"s": "hi", "n": 3}));
        assert_eq!(string_arg(&a, "s").unwrap(), "hi");
        assert_eq!(string_arg(&a, "n").unwrap(), "3");
    }

    #[test]
    fn param_required_defaults_true_in_serde() {
        let p: ToolParam = serde_json::from_value(json!({"name": "a", "description": "d"})).unwrap();
        assert!(p.required);
    }
}
