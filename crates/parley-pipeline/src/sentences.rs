/// Accumulates streamed text and cuts it into sentences at `.`, `!` or `?`.
///
/// With markup delimiters set, nothing is cut between an open delimiter and
/// its close, and the delimited span is never spoken.
#[derive(Debug, Default)]
pub struct SentenceBuffer {
    pending: String,
    markup: Option<(String, String)>,
    /// Byte index in `pending` where an unclosed open delimiter starts.
    markup_start: Option<usize>,
}

impl SentenceBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A buffer that holds back everything from `open` up to `close`.
    pub fn with_markup(open: impl Into<String>, close: impl Into<String>) -> Self {
        Self {
            markup: Some((open.into(), close.into())),
            ..Self::default()
        }
    }

    /// Append an increment and return every sentence it completed, trimmed.
    pub fn push(&mut self, text: &str) -> Vec<String> {
        let mut done = Vec::new();
        for ch in text.chars() {
            self.pending.push(ch);
            let Some((open, close)) = &self.markup else {
                cut_at(&mut self.pending, ch, &mut done);
                continue;
            };
            match self.markup_start {
                Some(start) => {
                    if suffix_start(&self.pending, close).is_some() {
                        self.pending.truncate(start);
                        self.markup_start = None;
                    }
                }
                None => match suffix_start(&self.pending, open) {
                    Some(start) => self.markup_start = Some(start),
                    None => cut_at(&mut self.pending, ch, &mut done),
                },
            }
        }
        done
    }

    /// Forget the unfinished sentence.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.markup_start = None;
    }

    /// Take the unfinished tail, if it has anything worth speaking.
    /// Unclosed markup is dropped.
    pub fn finish(&mut self) -> Option<String> {
        if let Some(start) = self.markup_start.take() {
            self.pending.truncate(start);
        }
        let rest = speakable(&self.pending);
        self.pending.clear();
        rest
    }
}

/// Move `pending` into `done` when `ch` ends a sentence.
fn cut_at(pending: &mut String, ch: char, done: &mut Vec<String>) {
    if matches!(ch, '.' | '!' | '?') {
        if let Some(sentence) = speakable(pending) {
            done.push(sentence);
        }
        pending.clear();
    }
}

/// Where `needle` starts if `text` ends with it, ignoring ASCII case.
fn suffix_start(text: &str, needle: &str) -> Option<usize> {
    let start = text.len().checked_sub(needle.len())?;
    (text.is_char_boundary(start) && text[start..].eq_ignore_ascii_case(needle)).then_some(start)
}

/// Punctuation-only fragments such as the tail of an ellipsis are dropped.
fn speakable(text: &str) -> Option<String> {
    let trimmed = text.trim();
    trimmed
        .chars()
        .any(char::is_alphanumeric)
        .then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_across_increments() {
        let mut buf = SentenceBuffer::new();
        assert!(buf.push("Hel").is_empty());
        assert_eq!(buf.push("lo. Wor"), vec!["Hello."]);
        assert_eq!(buf.push("ld! How are you? I"), vec!["World!", "How are you?"]);
        assert_eq!(buf.finish().as_deref(), Some("I"));
        assert!(buf.finish().is_none());
    }

    #[test]
    fn ellipsis_yields_one_sentence() {
        let mut buf = SentenceBuffer::new();
        assert_eq!(buf.push("Wait... ok."), vec!["Wait.", "ok."]);
    }

    #[test]
    fn clear_discards_pending() {
        let mut buf = SentenceBuffer::new();
        let _ = buf.push("<api>add(2, 3");
        buf.clear();
        assert_eq!(buf.push(" Five."), vec!["Five."]);
    }

    #[test]
    fn markup_is_held_back_until_closed() {
        let mut buf = SentenceBuffer::with_markup("<api>", "</api>");
        assert!(buf.push("The sum is <api>add(2.").is_empty());
        assert!(buf.push("5, 3)</API> and so").is_empty());
        assert_eq!(buf.push(" on. Next"), vec!["The sum is  and so on."]);
        assert_eq!(buf.finish().as_deref(), Some("Next"));
    }

    #[test]
    fn unclosed_markup_is_not_spoken() {
        let mut buf = SentenceBuffer::with_markup("<api>", "</api>");
        assert!(buf.push("Hi <api>add(1.5").is_empty());
        assert_eq!(buf.finish().as_deref(), Some("Hi"));

        assert!(buf.push("<api>mul(0.5, 2").is_empty());
        buf.clear();
        assert_eq!(buf.push("Ten."), vec!["Ten."]);
    }
}
