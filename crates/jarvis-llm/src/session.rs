//! Incremental decoding of a chat-completions event stream.
//!
//! A [`StreamSession`] is fed raw body chunks in arrival order. It splits them
//! into lines, decodes `data:` frames and produces [`StreamEvent`]s. Once a
//! terminal event has been produced the session ignores all further input.

use serde::Deserialize;
use tracing::{debug, warn};

const DATA_PREFIX: &str = "data: ";
const DONE_LINE: &str = "data: [DONE]";

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    Completed,
    Failed,
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Failed,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Completed)
    }
}

/// Event produced while decoding a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// The full response text accumulated so far.
    Delta(String),
    /// Terminal notification, produced exactly once per session.
    Finished(Outcome),
}

/// Result of decoding one complete line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    Blank,
    Done,
    Delta(String),
    /// Unknown prefix, malformed JSON or missing content.
    Skipped,
}

#[derive(Debug, Deserialize)]
struct ChunkFrame {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

impl ChunkFrame {
    fn into_content(self) -> Option<String> {
        self.choices.into_iter().next()?.delta?.content
    }
}

/// Decode one complete line of the event stream.
pub fn parse_line(line: &str) -> Line {
    if line.is_empty() {
        return Line::Blank;
    }
    if line == DONE_LINE {
        return Line::Done;
    }

    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        return Line::Skipped;
    };

    match serde_json::from_str::<ChunkFrame>(payload) {
        Ok(frame) => frame.into_content().map(Line::Delta).unwrap_or(Line::Skipped),
        Err(_) => Line::Skipped,
    }
}

/// State of one streaming response.
#[derive(Debug)]
pub struct StreamSession {
    /// Bytes of an incomplete trailing line.
    buffer: Vec<u8>,
    accumulated: String,
    state: SessionState,
}

impl StreamSession {
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            accumulated: String::new(),
            state: SessionState::Active,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Response text accumulated so far.
    pub fn text(&self) -> &str {
        &self.accumulated
    }

    /// Bytes held back waiting for a line terminator.
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    /// Process a chunk of the response body.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.state != SessionState::Active {
            return events;
        }

        let mut buffer = std::mem::take(&mut self.buffer);
        buffer.extend_from_slice(chunk);

        let mut start = 0;
        while let Some(offset) = buffer[start..].iter().position(|&b| b == b'\n') {
            let end = start + offset;
            self.process_line(&buffer[start..end], &mut events);
            start = end + 1;

            if self.state != SessionState::Active {
                return events;
            }
        }

        buffer.drain(..start);
        self.buffer = buffer;
        events
    }

    /// The connection closed cleanly.
    ///
    /// Any buffered partial line is processed as a final line. If no terminal
    /// event was produced yet, the session completes successfully.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.state != SessionState::Active {
            return events;
        }

        let remainder = std::mem::take(&mut self.buffer);
        if !remainder.is_empty() {
            self.process_line(&remainder, &mut events);
        }

        if self.state == SessionState::Active {
            warn!(
                bytes = self.accumulated.len(),
                "stream ended without [DONE]; treating as complete"
            );
            self.state = SessionState::Completed;
            events.push(StreamEvent::Finished(Outcome::Completed));
        }

        events
    }

    /// The transport failed.
    ///
    /// Replaces the accumulated text with `message`, which is delivered as the
    /// last delta before the failure notification.
    pub fn fail(&mut self, message: &str) -> Vec<StreamEvent> {
        if self.state != SessionState::Active {
            return Vec::new();
        }

        self.state = SessionState::Failed;
        self.buffer.clear();
        self.accumulated = message.to_string();

        vec![
            StreamEvent::Delta(self.accumulated.clone()),
            StreamEvent::Finished(Outcome::Failed),
        ]
    }

    fn process_line(&mut self, raw: &[u8], events: &mut Vec<StreamEvent>) {
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);

        let line = match std::str::from_utf8(raw) {
            Ok(line) => parse_line(line),
            Err(_) => Line::Skipped,
        };

        match line {
            Line::Blank => {}
            Line::Done => {
                debug!("received [DONE]");
                self.state = SessionState::Completed;
                self.buffer.clear();
                events.push(StreamEvent::Finished(Outcome::Completed));
            }
            Line::Delta(content) => {
                self.accumulated.push_str(&content);
                events.push(StreamEvent::Delta(self.accumulated.clone()));
            }
            Line::Skipped => {
                debug!("skipping line: {}", String::from_utf8_lossy(raw));
            }
        }
    }
}

impl Default for StreamSession {
    fn default() -> Self {
        Self::new()
    }
}
