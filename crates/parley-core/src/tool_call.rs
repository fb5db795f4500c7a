use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Arguments of a tool call as they appeared in generated text.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolArgs {
    /// Comma-separated arguments of the tag protocol, already trimmed and lower-cased.
    Positional(Vec<String>),
    /// Named arguments of the JSON protocol.
    Named(Map<String, Value>),
}

impl ToolArgs {
    pub fn empty() -> Self {
        Self::Positional(Vec::new())
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Positional(args) => args.len(),
            Self::Named(args) => args.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// JSON view of the arguments: an array for positional, an object for named.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Positional(args) => {
                Value::Array(args.iter().cloned().map(Value::String).collect())
            }
            Self::Named(args) => Value::Object(args.clone()),
        }
    }

    /// Look up a named argument. Positional arguments have no names.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Self::Positional(_) => None,
            Self::Named(args) => args.get(key),
        }
    }
}

/// A structured invocation embedded in generated text.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    pub args: ToolArgs,
}

impl ToolCall {
    pub fn positional<I, S>(name: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            args: ToolArgs::Positional(args.into_iter().map(Into::into).collect()),
        }
    }

    pub fn named(name: impl Into<String>, args: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            args: ToolArgs::Named(args),
        }
    }

    /// String argument by name, falling back to a position for tag-style calls.
    pub fn arg_str(&self, key: &str, position: usize) -> Option<String> {
        match &self.args {
            ToolArgs::Named(args) => args.get(key).map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            }),
            ToolArgs::Positional(args) => args.get(position).cloned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn equality_is_structural() {
        let a = ToolCall::positional("calculator", ["add", "3", "9"]);
        let b = ToolCall::positional("calculator", vec!["add".to_string(), "3".into(), "9".into()]);
        assert_eq!(a, b);
        assert_ne!(a, ToolCall::positional("calculator", ["add", "3"]));
    }

    #[test]
    fn positional_to_value_is_array() {
        let call = ToolCall::positional("f", ["a", "b"]);
        assert_eq!(call.args.to_value(), json!(["a", "b"]));
        assert_eq!(call.args.len(), 2);
    }

    #[test]
    fn arg_str_reads_named_and_positional() {
        let mut map = Map::new();
        map.insert("text".into(), json!("why?"));
        map.insert("n".into(), json!(3));
        let named = ToolCall::named("clarify", map);
        assert_eq!(named.arg_str("text", 0).as_deref(), Some("why?"));
        assert_eq!(named.arg_str("n", 1).as_deref(), Some("3"));

        let positional = ToolCall::positional("clarify", ["why"]);
        assert_eq!(positional.arg_str("text", 0).as_deref(), Some("why"));
        assert_eq!(positional.arg_str("text", 1), None);
    }

    #[test]
    fn untagged_serde() {
        let call: ToolCall =
            serde_json::from_value(json!({"name": "add", "args": {"num1": 2}})).unwrap();
        assert!(matches!(call.args, ToolArgs::Named(_)));
        let call: ToolCall = serde_json::from_value(json!({"name": "add", "args": ["2"]})).unwrap();
        assert!(matches!(call.args, ToolArgs::Positional(_)));
    }
}
