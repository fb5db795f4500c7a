use async_trait::async_trait;
use serde_json::{Map, Value};

use parley_core::tools::{number_arg, string_arg, Tool, ToolError, ToolParam};

use super::number_value;

/// `calculate(op, a, b)` for the four basic operators.
pub struct CalculateTool;

fn apply(op: &str, a: f64, b: f64) -> Result<f64, ToolError> {
    match op.trim() {
        "+" | "add" | "plus" => Ok(a + b),
        "-" | "subtract" | "minus" => Ok(a - b),
        "*" | "x" | "multiply" | "times" => Ok(a * b),
        "/" | "divide" => {
            if b == 0.0 {
                Err(ToolError::ExecutionFailed("division by zero".into()))
            } else {
                Ok(a / b)
            }
        }
        other => Err(ToolError::InvalidArguments(format!("unsupported operator {other:?}"))),
    }
}

#[async_trait]
impl Tool for CalculateTool {
    fn name(&self) -> &str {
        "calculate"
    }

    fn description(&self) -> &str {
        "Apply a basic arithmetic operator (+, -, *, /) to two numbers."
    }

    fn parameters(&self) -> Vec<ToolParam> {
        vec![
            ToolParam::required("op", "one of + - * / or add, subtract, multiply, divide"),
            ToolParam::required("a", "left operand"),
            ToolParam::required("b", "right operand"),
        ]
    }

    fn usage_examples(&self) -> Vec<Map<String, Value>> {
        let mut m = Map::new();
        let _ = m.insert("op".into(), Value::String("+".into()));
        let _ = m.insert("a".into(), Value::from(3));
        let _ = m.insert("b".into(), Value::from(9));
        vec![m]
    }

    async fn execute(&self, args: &Map<String, Value>) -> Result<Value, ToolError> {
        let op = string_arg(args, "op")?;
        let a = number_arg(args, "a")?;
        let b = number_arg(args, "b")?;
        number_value(apply(&op.to_ascii_lowercase(), a, b)?)
    }
}
