//! Tool documentation for system prompts.

use std::fmt::Write;

use crate::protocol::ToolCallProtocol;
use crate::registry::ToolRegistry;

const NO_DESCRIPTION: &str = "Documentation was not provided for the function";

/// Signature, description and usage examples of every registered tool, in
/// name order. Examples are written in the syntax the model is expected to use.
pub fn describe_tools(registry: &ToolRegistry, protocol: &dyn ToolCallProtocol) -> String {
    let mut out = String::new();
    for name in registry.names() {
        let Some(tool) = registry.get(&name) else {
            continue;
        };
        let def = tool.to_definition();
        let params: Vec<String> = def
            .parameters
            .iter()
            .map(|p| if p.required { p.name.clone() } else { format!("{}?", p.name) })
            .collect();

        let _ = writeln!(out, "{}({})", def.name, params.join(", "));
        let description = if def.description.trim().is_empty() {
            NO_DESCRIPTION
        } else {
            def.description.trim()
        };
        let _ = writeln!(out, "{description}");
        for p in def.parameters.iter().filter(|p| !p.description.is_empty()) {
            let _ = writeln!(out, "  {}: {}", p.name, p.description);
        }

        let examples = tool.usage_examples();
        if !examples.is_empty() {
            let _ = writeln!(out, "Usage examples:");
            for example in &examples {
                let _ = writeln!(out, "{}", protocol.render_example(&def, example));
            }
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{JsonProtocol, TaggedProtocol};
    use crate::tools::create_default_registry;

    #[test]
    fn tagged_docs_show_positional_examples() {
        let docs = describe_tools(&create_default_registry(), &TaggedProtocol::default());
        assert!(docs.contains("add(num1, num2)\nAdd two numbers"));
        assert!(docs.contains("<api>add(23.0, 19.0)</api>"));
        assert!(docs.contains("<api>calculate(+, 3, 9)</api>"));
        assert!(docs.contains("<api>current_date_time()</api>"));
    }

    #[test]
    fn json_docs_show_named_examples() {
        let docs = describe_tools(&create_default_registry(), &JsonProtocol::default());
        assert!(docs.contains(r#""tool_name":"cos""#));
        assert!(docs.contains(r#"<|tool_use_start|>"#));
    }

    #[test]
    fn tools_appear_in_name_order() {
        let docs = describe_tools(&create_default_registry(), &TaggedProtocol::default());
        let add = docs.find("add(").unwrap();
        let sqrt = docs.find("sqrt(").unwrap();
        assert!(add < sqrt);
    }
}
