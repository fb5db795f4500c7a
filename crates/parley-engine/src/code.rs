const FENCE: &str = "```";

/// Languages recognised when the fence carries no info line of its own,
/// as in "```python print(1)```".
const PREFIX_LANGUAGES: [&str; 2] = ["python", "javascript"];

/// A fenced code block found in a model response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CodeBlock {
    /// Text before the opening fence.
    pub prefix: String,
    /// Everything between the fences, including the info word.
    pub code: String,
    /// Lowercased info word, if the fence names one.
    pub language: Option<String>,
    source_start: usize,
}

impl CodeBlock {
    /// Assistant-visible form: prefix followed by the re-fenced code.
    pub fn to_markdown(&self) -> String {
        format!("{}{FENCE}\n{}{FENCE}", self.prefix, self.code)
    }

    /// Code with the info word stripped.
    pub fn source(&self) -> &str {
        let rest = &self.code[self.source_start..];
        rest.strip_prefix('\n').unwrap_or(rest)
    }
}

/// First fenced block in `response`. An unterminated fence runs to the end of the text.
pub fn find_code(response: &str) -> Option<CodeBlock> {
    let start = response.find(FENCE)?;
    let body_start = start + FENCE.len();
    let end = response[body_start..]
        .find(FENCE)
        .map_or(response.len(), |i| body_start + i);
    let code = &response[body_start..end];
    let (language, source_start) = detect_language(code);

    Some(CodeBlock {
        prefix: response[..start].to_string(),
        code: code.to_string(),
        language,
        source_start,
    })
}

/// Language named by the block and the byte offset where its source begins.
fn detect_language(code: &str) -> (Option<String>, usize) {
    if let Some(newline) = code.find('\n') {
        let info = code[..newline].trim();
        if !info.is_empty() && !info.contains(char::is_whitespace) && info.chars().all(is_info_char) {
            return (Some(info.to_ascii_lowercase()), newline);
        }
    }

    let lowered = code.to_ascii_lowercase();
    PREFIX_LANGUAGES
        .into_iter()
        .find(|lang| {
            lowered.starts_with(lang)
                && !lowered[lang.len()..].starts_with(|c: char| c.is_ascii_alphanumeric() || c == '_')
        })
        .map_or((None, 0), |lang| (Some(lang.to_string()), lang.len()))
}

fn is_info_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '#' | '.' | '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_python_block() {
        let block = find_code("Here:\n```python\nprint(1)\n```\nbye").unwrap();
        assert_eq!(block.prefix, "Here:\n");
        assert_eq!(block.code, "python\nprint(1)\n");
        assert_eq!(block.language.as_deref(), Some("python"));
        assert_eq!(block.source(), "print(1)\n");
    }

    #[test]
    fn unterminated_fence_runs_to_end() {
        let block = find_code("```javascript\nconsole.log(2)").unwrap();
        assert_eq!(block.language.as_deref(), Some("javascript"));
        assert_eq!(block.source(), "console.log(2)");
    }

    #[test]
    fn unknown_language_is_none() {
        let block = find_code("```\nls -la\n```").unwrap();
        assert_eq!(block.language, None);
        assert_eq!(block.source(), "ls -la\n");
    }

    #[test]
    fn language_match_is_case_insensitive() {
        let block = find_code("```Python\nx = 1```").unwrap();
        assert_eq!(block.language.as_deref(), Some("python"));
        assert_eq!(block.source(), "x = 1");
    }

    #[test]
    fn any_info_word_names_the_language() {
        let block = find_code("```Rust\nfn main() {}\n```").unwrap();
        assert_eq!(block.language.as_deref(), Some("rust"));
        assert_eq!(block.source(), "fn main() {}\n");

        let block = find_code("```bash\necho hi\n```").unwrap();
        assert_eq!(block.language.as_deref(), Some("bash"));
    }

    #[test]
    fn info_word_is_taken_whole() {
        let block = find_code("```pythonic\nx\n```").unwrap();
        assert_eq!(block.language.as_deref(), Some("pythonic"));
        assert_eq!(block.source(), "x\n");
    }

    #[test]
    fn code_on_the_fence_line_falls_back_to_prefix() {
        let block = find_code("```python print(1)```").unwrap();
        assert_eq!(block.language.as_deref(), Some("python"));
        assert_eq!(block.source(), " print(1)");

        let block = find_code("```print(1)\nprint(2)```").unwrap();
        assert_eq!(block.language, None);
        assert_eq!(block.source(), "print(1)\nprint(2)");
    }

    #[test]
    fn no_fence_no_block() {
        assert_eq!(find_code("plain text"), None);
    }

    #[test]
    fn markdown_form_refences_code() {
        let block = find_code("a```python\nx```").unwrap();
        assert_eq!(block.to_markdown(), "a```\npython\nx```");
    }
}
