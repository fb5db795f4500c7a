use std::collections::VecDeque;
use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures::Stream;
use pin_project_lite::pin_project;
use serde::Deserialize;
use tokio::time::{Instant, Sleep};

use parley_core::errors::BackendError;

/// Length of the `data: ` prefix the backend puts in front of every chunk.
const LINE_PREFIX_LEN: usize = 6;

/// One streamed completion chunk.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct CompletionChunk {
    pub content: String,
    pub stop: bool,
    pub stopping_word: Option<String>,
}

/// Decode one line into a chunk. Blank lines yield `None`.
pub fn parse_line(line: &str) -> Option<Result<CompletionChunk, BackendError>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let body = if line.starts_with('{') {
        line
    } else {
        line.get(LINE_PREFIX_LEN..).unwrap_or_default()
    };
    Some(
        serde_json::from_str::<CompletionChunk>(body)
            .map_err(|e| BackendError::MalformedChunk(format!("{e}: {line}"))),
    )
}

pin_project! {
    /// Turns the backend's newline-delimited chunk stream into text increments.
    ///
    /// A stop chunk whose stopping word is one of the requested stop words
    /// yields that word and ends the stream. If no bytes arrive within the idle
    /// window the stream ends with `StreamInterrupted`.
    pub struct NdjsonStream<S> {
        #[pin]
        inner: S,
        #[pin]
        idle: Sleep,
        idle_duration: Duration,
        buffer: Vec<u8>,
        pending: VecDeque<Result<String, BackendError>>,
        stop_words: Vec<String>,
        finished: bool,
    }
}

impl<S> NdjsonStream<S> {
    pub fn new(inner: S, stop_words: Vec<String>, idle_duration: Duration) -> Self {
        Self {
            inner,
            idle: tokio::time::sleep(idle_duration),
            idle_duration,
            buffer: Vec::new(),
            pending: VecDeque::new(),
            stop_words,
            finished: false,
        }
    }
}

fn handle_line(
    line: &[u8],
    stop_words: &[String],
    pending: &mut VecDeque<Result<String, BackendError>>,
    finished: &mut bool,
) {
    if *finished {
        return;
    }
    let text = String::from_utf8_lossy(line);
    let chunk = match parse_line(&text) {
        None => return,
        Some(Ok(chunk)) => chunk,
        Some(Err(e)) => {
            pending.push_back(Err(e));
            *finished = true;
            return;
        }
    };

    if chunk.stop {
        let hit = chunk
            .stopping_word
            .filter(|w| !w.is_empty() && stop_words.iter().any(|s| s == w));
        if !chunk.content.is_empty() {
            pending.push_back(Ok(chunk.content));
        }
        if let Some(word) = hit {
            pending.push_back(Ok(word));
        }
        *finished = true;
    } else if !chunk.content.is_empty() {
        pending.push_back(Ok(chunk.content));
    }
}

impl<S, E> Stream for NdjsonStream<S>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Display,
{
    type Item = Result<String, BackendError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();
        loop {
            if let Some(item) = this.pending.pop_front() {
                return Poll::Ready(Some(item));
            }
            if *this.finished {
                return Poll::Ready(None);
            }

            match this.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    this.idle.as_mut().reset(Instant::now() + *this.idle_duration);
                    this.buffer.extend_from_slice(&bytes);
                    while let Some(pos) = this.buffer.iter().position(|b| *b == b'\n') {
                        let line: Vec<u8> = this.buffer.drain(..=pos).collect();
                        handle_line(&line, this.stop_words, this.pending, this.finished);
                    }
                }
                Poll::Ready(Some(Err(e))) => {
                    this.pending
                        .push_back(Err(BackendError::StreamInterrupted(e.to_string())));
                    *this.finished = true;
                }
                Poll::Ready(None) => {
                    let rest = std::mem::take(this.buffer);
                    handle_line(&rest, this.stop_words, this.pending, this.finished);
                    *this.finished = true;
                }
                Poll::Pending => {
                    if this.idle.as_mut().poll(cx).is_ready() {
                        *this.finished = true;
                        return Poll::Ready(Some(Err(BackendError::StreamInterrupted(format!(
                            "idle timeout after {}s",
                            this.idle_duration.as_secs()
                        )))));
                    }
                    return Poll::Pending;
                }
            }
        }
    }
}
