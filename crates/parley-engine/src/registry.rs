//! Tool registry: central index of the tools an agent or completion may call.
//!
//! The [`ToolRegistry`] maps tool names to [`Tool`] implementations, binds
//! parsed call arguments to declared parameters and dispatches invocations.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use parley_core::tool_call::ToolArgs;
use parley_core::tools::{Tool, ToolDefinition, ToolError};

use crate::error::InvokeError;

const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// Central registry mapping tool names to their implementations.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    timeout: Duration,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    /// Upper bound on a single invocation.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Register a tool. Overwrites any existing tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        debug!(tool_name = tool.name(), "tool registered");
        let _ = self.tools.insert(tool.name().to_owned(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Definitions sorted by tool name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self.tools.values().map(|t| t.to_definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Return all tool names, sorted alphabetically.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Invoke a tool by name with arguments as they were parsed from generated text.
    ///
    /// String results come back verbatim; any other JSON value is serialized.
    pub async fn invoke(&self, name: &str, args: &ToolArgs) -> Result<String, InvokeError> {
        let tool = self
            .get(name)
            .ok_or_else(|| InvokeError::NotFound(name.to_string()))?;
        let bound = bind_args(tool.as_ref(), args).map_err(|reason| InvokeError::BadArguments {
            name: name.to_string(),
            reason,
        })?;

        let failed = |reason: String| InvokeError::Failed {
            name: name.to_string(),
            reason,
        };

        let call = AssertUnwindSafe(tool.execute(&bound)).catch_unwind();
        let value = match tokio::time::timeout(self.timeout, call).await {
            Err(_) => {
                warn!(tool = name, timeout = ?self.timeout, "tool invocation timed out");
                return Err(failed(ToolError::Timeout(self.timeout).to_string()));
            }
            Ok(Err(panic)) => {
                let reason = panic_message(panic.as_ref());
                warn!(tool = name, %reason, "tool panicked");
                return Err(failed(format!("tool panicked: {reason}")));
            }
            Ok(Ok(Err(ToolError::InvalidArguments(reason)))) => {
                return Err(InvokeError::BadArguments {
                    name: name.to_string(),
                    reason,
                });
            }
            Ok(Ok(Err(e))) => return Err(failed(e.to_string())),
            Ok(Ok(Ok(value))) => value,
        };

        Ok(match value {
            Value::String(s) => s,
            other => other.to_string(),
        })
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Bind call arguments to the tool's declared parameters.
///
/// Positional arguments bind in declaration order; named arguments must name a
/// declared parameter. Every required parameter must end up bound.
fn bind_args(tool: &dyn Tool, args: &ToolArgs) -> Result<Map<String, Value>, String> {
    let params = tool.parameters();
    let mut bound = Map::new();

    match args {
        ToolArgs::Positional(values) => {
            if values.len() > params.len() {
                return Err(format!(
                    "expected at most {} arguments, got {}",
                    params.len(),
                    values.len()
                ));
            }
            for (param, value) in params.iter().zip(values) {
                let _ = bound.insert(param.name.clone(), Value::String(value.clone()));
            }
        }
        ToolArgs::Named(map) => {
            for (key, value) in map {
                if !params.iter().any(|p| &p.name == key) {
                    return Err(format!("unexpected argument {key:?}"));
                }
                let _ = bound.insert(key.clone(), value.clone());
            }
        }
    }

    if let Some(missing) = params.iter().find(|p| p.required && !bound.contains_key(&p.name)) {
        return Err(format!("missing required argument {:?}", missing.name));
    }
    Ok(bound)
}

pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use parley_core::tools::ToolParam;
    use serde_json::json;

    use super::*;

    enum Behavior {
        Echo,
        Fail,
        Panic,
        Hang,
        Reject,
    }

    struct StubTool {
        tool_name: String,
        behavior: Behavior,
    }

    impl StubTool {
        fn new(name: &str, behavior: Behavior) -> Self {
            Self {
                tool_name: name.into(),
                behavior,
            }
        }
    }

    #[async_trait]
    impl Tool for StubTool {
        fn name(&self) -> &str {
            &self.tool_name
        }

        fn description(&self) -> &str {
            "stub"
        }

        fn parameters(&self) -> Vec<ToolParam> {
            vec![ToolParam::required("a", "first"), ToolParam::optional("b", "second")]
        }

        async fn execute(&self, args: &Map<String, Value>) -> Result<Value, ToolError> {
            match self.behavior {
                Behavior::Echo => Ok(Value::Object(args.clone())),
                Behavior::Fail => Err(ToolError::ExecutionFailed("disk on fire".into())),
                Behavior::Panic => panic!("boom"),
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(Value::Null)
                }
                Behavior::Reject => Err(ToolError::InvalidArguments("a must be positive".into())),
            }
        }
    }

    fn registry_with(behavior: Behavior) -> ToolRegistry {
        let mut reg = ToolRegistry::new();
        reg.register(Arc::new(StubTool::new("stub", behavior)));
        reg
    }

    #[test]
    fn new_creates_empty_registry() {
        let reg = ToolRegistry::new();
        assert!(reg.is_empty());
        assert_eq!(reg.len(), 0);
    }

    #[test]
    fn register_duplicate_overwrites() {
        let mut reg = ToolRegistry::new();
        reg.register(Arc::new(StubTool::new("stub", Behavior::Echo)));
        reg.register(Arc::new(StubTool::new("stub", Behavior::Fail)));
        assert_eq!(reg.len(), 1);
        assert!(reg.contains("stub"));
    }

    #[test]
    fn names_and_definitions_sorted() {
        let mut reg = ToolRegistry::new();
        reg.register(Arc::new(StubTool::new("write", Behavior::Echo)));
        reg.register(Arc::new(StubTool::new("add", Behavior::Echo)));
        assert_eq!(reg.names(), vec!["add", "write"]);
        let defs: Vec<String> = reg.definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(defs, vec!["add", "write"]);
    }

    #[tokio::test]
    async fn positional_args_bind_in_order() {
        let reg = registry_with(Behavior::Echo);
        let out = reg.invoke("stub", &ToolArgs::Positional(vec!["1".into(), "2".into()])).await.unwrap();
        let value: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value, json!({"a": "1", "b": "2"}));
    }

    #[tokio::test]
    async fn optional_param_may_be_omitted() {
        let reg = registry_with(Behavior::Echo);
        let out = reg.invoke("stub", &ToolArgs::Positional(vec!["1".into()])).await.unwrap();
        assert_eq!(serde_json::from_str::<Value>(&out).unwrap(), json!({"a": "1"}));
    }

    #[tokio::test]
    async fn named_args_pass_through() {
        let reg = registry_with(Behavior::Echo);
        let args = ToolArgs::Named(json!({"a": 5}).as_object().cloned().unwrap());
        let out = reg.invoke("stub", &args).await.unwrap();
        assert_eq!(serde_json::from_str::<Value>(&out).unwrap(), json!({"a": 5}));
    }

    #[tokio::test]
    async fn unknown_tool_is_not_found() {
        let reg = ToolRegistry::new();
        let err = reg.invoke("weather", &ToolArgs::empty()).await.unwrap_err();
        assert_eq!(err, InvokeError::NotFound("weather".into()));
    }

    #[tokio::test]
    async fn argument_mismatches_are_bad_arguments() {
        let reg = registry_with(Behavior::Echo);
        let too_many = ToolArgs::Positional(vec!["1".into(), "2".into(), "3".into()]);
        assert!(matches!(reg.invoke("stub", &too_many).await, Err(InvokeError::BadArguments { .. })));
        assert!(matches!(reg.invoke("stub", &ToolArgs::empty()).await, Err(InvokeError::BadArguments { .. })));
        let unknown_key = ToolArgs::Named(json!({"a": 1, "zzz": 2}).as_object().cloned().unwrap());
        assert!(matches!(reg.invoke("stub", &unknown_key).await, Err(InvokeError::BadArguments { .. })));
    }

    #[tokio::test]
    async fn tool_side_argument_rejection_is_bad_arguments() {
        let reg = registry_with(Behavior::Reject);
        let err = reg.invoke("stub", &ToolArgs::Positional(vec!["-1".into()])).await.unwrap_err();
        assert!(matches!(err, InvokeError::BadArguments { reason, .. } if reason.contains("positive")));
    }

    #[tokio::test]
    async fn execution_failure_is_failed() {
        let reg = registry_with(Behavior::Fail);
        let err = reg.invoke("stub", &ToolArgs::Positional(vec!["1".into()])).await.unwrap_err();
        assert!(matches!(err, InvokeError::Failed { reason, .. } if reason.contains("disk on fire")));
    }

    #[tokio::test]
    async fn panic_is_contained() {
        let reg = registry_with(Behavior::Panic);
        let err = reg.invoke("stub", &ToolArgs::Positional(vec!["1".into()])).await.unwrap_err();
        assert!(matches!(err, InvokeError::Failed { reason, .. } if reason.contains("boom")));
    }

    #[tokio::test(start_paused = true)]
    async fn hung_tool_times_out() {
        let reg = registry_with(Behavior::Hang).with_timeout(Duration::from_secs(1));
        let err = reg.invoke("stub", &ToolArgs::Positional(vec!["1".into()])).await.unwrap_err();
        assert!(matches!(err, InvokeError::Failed { reason, .. } if reason.contains("timeout")));
    }
}
