//! Built-in tools available to completions and agents.
//!
//! - **Arithmetic**: add, subtract, multiply, divide, pow, sqrt, sin, cos, round
//! - **Calculator**: `calculate(op, a, b)` over the four basic operators
//! - **Clock**: current date and time

mod arithmetic;
mod calculate;
mod clock;

use std::sync::Arc;

use serde_json::{json, Value};

use parley_core::tools::ToolError;

pub use arithmetic::{BinaryTool, UnaryTool};
pub use calculate::CalculateTool;
pub use clock::CurrentDateTimeTool;

use crate::registry::ToolRegistry;

/// Registry holding every built-in tool.
pub fn create_default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    for tool in arithmetic::binary_tools() {
        registry.register(Arc::new(tool));
    }
    for tool in arithmetic::unary_tools() {
        registry.register(Arc::new(tool));
    }
    registry.register(Arc::new(CalculateTool));
    registry.register(Arc::new(CurrentDateTimeTool));
    registry
}

/// JSON number for a computed result. Integral values come back as integers.
pub(crate) fn number_value(x: f64) -> Result<Value, ToolError> {
    if !x.is_finite() {
        return Err(ToolError::ExecutionFailed(format!("result is not finite ({x})")));
    }
    if x.fract() == 0.0 && x.abs() < 9.0e15 {
        Ok(json!(x as i64))
    } else {
        Ok(json!(x))
    }
}
