use async_trait::async_trait;
use serde_json::{json, Map, Value};

use parley_core::tools::{number_arg, Tool, ToolError, ToolParam};

use super::number_value;

type BinaryFn = fn(f64, f64) -> Result<f64, ToolError>;
type UnaryFn = fn(f64) -> Result<f64, ToolError>;

/// A two-operand numeric tool taking `num1` and `num2`.
pub struct BinaryTool {
    name: &'static str,
    description: &'static str,
    op: BinaryFn,
    examples: &'static [(f64, f64)],
}

/// A one-operand numeric tool.
pub struct UnaryTool {
    name: &'static str,
    description: &'static str,
    param: &'static str,
    op: UnaryFn,
    examples: &'static [f64],
}

pub(super) fn binary_tools() -> Vec<BinaryTool> {
    vec![
        BinaryTool {
            name: "add",
            description: "Add two numbers and return their sum.",
            op: |a, b| Ok(a + b),
            examples: &[(23.0, 19.0), (-32.0, 9.0)],
        },
        BinaryTool {
            name: "subtract",
            description: "Subtract the second number from the first.",
            op: |a, b| Ok(a - b),
            examples: &[],
        },
        BinaryTool {
            name: "multiply",
            description: "Multiply two numbers.",
            op: |a, b| Ok(a * b),
            examples: &[],
        },
        BinaryTool {
            name: "divide",
            description: "Divide the first number by the second. The second number must not be zero.",
            op: |a, b| {
                if b == 0.0 {
                    Err(ToolError::ExecutionFailed("division by zero".into()))
                } else {
                    Ok(a / b)
                }
            },
            examples: &[(23.0, 12.0), (23.0, 1.0), (23.0, 22.0)],
        },
        BinaryTool {
            name: "pow",
            description: "Raise the first number to the power of the second.",
            op: |a, b| Ok(a.powf(b)),
            examples: &[],
        },
    ]
}

pub(super) fn unary_tools() -> Vec<UnaryTool> {
    vec![
        UnaryTool {
            name: "sqrt",
            description: "Square root of a non-negative number.",
            param: "number",
            op: |x| {
                if x < 0.0 {
                    Err(ToolError::ExecutionFailed("square root of a negative number".into()))
                } else {
                    Ok(x.sqrt())
                }
            },
            examples: &[],
        },
        UnaryTool {
            name: "sin",
            description: "Sine of an angle in radians.",
            param: "rads",
            op: |x| Ok(x.sin()),
            examples: &[],
        },
        UnaryTool {
            name: "cos",
            description: "Cosine of an angle in radians.",
            param: "rads",
            op: |x| Ok(x.cos()),
            examples: &[0.2],
        },
        UnaryTool {
            name: "round",
            description: "Round a number to the nearest integer.",
            param: "x",
            op: |x| Ok(x.round()),
            examples: &[],
        },
    ]
}

#[async_trait]
impl Tool for BinaryTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.description
    }

    fn parameters(&self) -> Vec<ToolParam> {
        vec![
            ToolParam::required("num1", "first operand"),
            ToolParam::required("num2", "second operand"),
        ]
    }

    fn usage_examples(&self) -> Vec<Map<String, Value>> {
        self.examples
            .iter()
            .map(|(a, b)| {
                let mut m = Map::new();
                let _ = m.insert("num1".into(), json!(a));
                let _ = m.insert("num2".into(), json!(b));
                m
            })
            .collect()
    }

    async fn execute(&self, args: &Map<String, Value>) -> Result<Value, ToolError> {
        let a = number_arg(args, "num1")?;
        let b = number_arg(args, "num2")?;
        number_value((self.op)(a, b)?)
    }
}

#[async_trait]
impl Tool for UnaryTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.description
    }

    fn parameters(&self) -> Vec<ToolParam> {
        vec![ToolParam::required(self.param, "operand")]
    }

    fn usage_examples(&self) -> Vec<Map<String, Value>> {
        self.examples
            .iter()
            .map(|x| {
                let mut m = Map::new();
                let _ = m.insert(self.param.into(), json!(x));
                m
            })
            .collect()
    }

    async fn execute(&self, args: &Map<String, Value>) -> Result<Value, ToolError> {
        let x = number_arg(args, self.param)?;
        number_value((self.op)(x)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn find_binary(name: &str) -> BinaryTool {
        binary_tools().into_iter().find(|t| t.name == name).unwrap()
    }

    fn find_unary(name: &str) -> UnaryTool {
        unary_tools().into_iter().find(|t| t.name == name).unwrap()
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn add_accepts_string_operands() {
        let out = find_binary("add").execute(&args(json!({"num1": "3", "num2": "9"}))).await.unwrap();
        assert_eq!(out, json!(12));
    }

    #[tokio::test]
    async fn divide_by_zero_fails() {
        let err = find_binary("divide").execute(&args(json!({"num1": 1, "num2": 0}))).await.unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed(_)));
    }

    #[tokio::test]
    async fn fractional_division() {
        let out = find_binary("divide").execute(&args(json!({"num1": 1, "num2": 4}))).await.unwrap();
        assert_eq!(out, json!(0.25));
    }

    #[tokio::test]
    async fn non_numeric_operand_is_invalid() {
        let err = find_binary("multiply").execute(&args(json!({"num1": "two", "num2": 3}))).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn unary_tools_compute() {
        assert_eq!(find_unary("sqrt").execute(&args(json!({"number": 16}))).await.unwrap(), json!(4));
        assert_eq!(find_unary("round").execute(&args(json!({"x": 2.6}))).await.unwrap(), json!(3));
        assert_eq!(find_unary("cos").execute(&args(json!({"rads": 0}))).await.unwrap(), json!(1));
        assert!(find_unary("sqrt").execute(&args(json!({"number": -1}))).await.is_err());
    }

    #[test]
    fn examples_use_declared_params() {
        let add = find_binary("add");
        let examples = add.usage_examples();
        assert_eq!(examples.len(), 2);
        assert_eq!(examples[0]["num1"], json!(23.0));
        assert_eq!(find_unary("cos").usage_examples()[0]["rads"], json!(0.2));
    }
}
