use async_trait::async_trait;
use chrono::Local;
use serde_json::{Map, Value};

use parley_core::tools::{Tool, ToolError, ToolParam};

/// Local wall-clock time, e.g. `2026-10-19 14:03:11.512094`.
pub struct CurrentDateTimeTool;

#[async_trait]
impl Tool for CurrentDateTimeTool {
    fn name(&self) -> &str {
        "current_date_time"
    }

    fn description(&self) -> &str {
        "Current local date and time."
    }

    fn parameters(&self) -> Vec<ToolParam> {
        Vec::new()
    }

    fn usage_examples(&self) -> Vec<Map<String, Value>> {
        vec![Map::new()]
    }

    async fn execute(&self, _args: &Map<String, Value>) -> Result<Value, ToolError> {
        Ok(Value::String(Local::now().format("%Y-%m-%d %H:%M:%S%.6f").to_string()))
    }
}
