//! Parsing of the login helper's stdout.
//!
//! The helper prints newline-delimited JSON status objects, possibly
//! interleaved with arbitrary noise and possibly split across read chunks.

use crate::accounts::Credential;
use serde_json::Value;

/// Classification of one complete stdout line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusLine {
    /// `success: true` with non-empty `sessionKey` and `orgId`.
    Credential(Credential),
    /// `success: false` with an `error` string.
    ReportedFailure(String),
    /// Anything else: noise, partial objects, progress messages.
    Ignored,
}

/// Classifies a single line. Never fails; malformed input is `Ignored`.
pub fn parse_status_line(line: &str) -> StatusLine {
    let trimmed = line.trim();
    if !trimmed.starts_with('{') {
        return StatusLine::Ignored;
    }
    let Ok(json) = serde_json::from_str::<Value>(trimmed) else {
        return StatusLine::Ignored;
    };

    match json.get("success").and_then(Value::as_bool) {
        Some(true) => {
            let session_key = non_empty_str(&json, "sessionKey");
            let org_id = non_empty_str(&json, "orgId");
            match (session_key, org_id) {
                (Some(session_key), Some(org_id)) => StatusLine::Credential(Credential {
                    session_key,
                    org_id,
                    display_name: non_empty_str(&json, "username"),
                    email: non_empty_str(&json, "userEmail"),
                    cookie_header: non_empty_str(&json, "cookieString"),
                }),
                _ => StatusLine::Ignored,
            }
        }
        Some(false) => match json.get("error").and_then(Value::as_str) {
            Some(error) => StatusLine::ReportedFailure(error.to_string()),
            None => StatusLine::Ignored,
        },
        None => StatusLine::Ignored,
    }
}

fn non_empty_str(json: &Value, key: &str) -> Option<String> {
    json.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Completed output kept for the rescan on exit.
pub const MAX_RETAINED_BYTES: usize = 256 * 1024;

/// Longest unterminated line held before it is dropped as noise.
pub const MAX_PENDING_LINE_BYTES: usize = 1024 * 1024;

/// Byte accumulator that only releases newline-terminated lines.
///
/// Keeps the most recent `MAX_RETAINED_BYTES` of completed lines plus the
/// unterminated tail, so the stream can be rescanned once the producer has
/// exited. A tail longer than `MAX_PENDING_LINE_BYTES` is discarded up to
/// its next newline.
#[derive(Debug, Default)]
pub struct LineBuffer {
    data: Vec<u8>,
    consumed: usize,
    bytes_seen: usize,
    discarding: bool,
}

impl LineBuffer {
    /// Appends a chunk and returns the lines it completed, without terminators.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.bytes_seen += chunk.len();

        let chunk = if self.discarding {
            match chunk.iter().position(|b| *b == b'\n') {
                Some(newline) => {
                    self.discarding = false;
                    &chunk[newline + 1..]
                }
                None => return Vec::new(),
            }
        } else {
            chunk
        };
        self.data.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(offset) = self.data[self.consumed..].iter().position(|b| *b == b'\n') {
            let end = self.consumed + offset;
            lines.push(decode_line(&self.data[self.consumed..end]));
            self.consumed = end + 1;
        }
        self.compact();
        lines
    }

    /// Every retained line, including a trailing segment with no newline.
    pub fn all_lines(&self) -> Vec<String> {
        self.data
            .split(|b| *b == b'\n')
            .filter(|segment| !segment.is_empty())
            .map(decode_line)
            .collect()
    }

    /// Total bytes pushed, including any that were since dropped.
    pub fn bytes_seen(&self) -> usize {
        self.bytes_seen
    }

    fn compact(&mut self) {
        if self.consumed > MAX_RETAINED_BYTES {
            // `consumed` always sits just past a newline, so a boundary exists.
            let excess = self.consumed - MAX_RETAINED_BYTES;
            let cut = self.data[excess..self.consumed]
                .iter()
                .position(|b| *b == b'\n')
                .map_or(self.consumed, |offset| excess + offset + 1);
            self.data.drain(..cut);
            self.consumed -= cut;
        }

        if self.data.len() - self.consumed > MAX_PENDING_LINE_BYTES {
            tracing::debug!(
                pending_bytes = self.data.len() - self.consumed,
                "Dropping oversized unterminated line"
            );
            self.data.truncate(self.consumed);
            self.discarding = true;
        }
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

/// Incremental scanner over the helper's stdout.
///
/// Remembers the most recent explicit failure report; a later definitive
/// success still wins.
#[derive(Debug, Default)]
pub struct OutputScanner {
    buffer: LineBuffer,
    reported_failure: Option<String>,
}

impl OutputScanner {
    /// Feeds a raw chunk; returns the definitive credential once one is complete.
    pub fn feed(&mut self, chunk: &[u8]) -> Option<Credential> {
        let lines = self.buffer.push(chunk);
        self.scan(lines)
    }

    /// Rescans the entire accumulated output after the producer has stopped.
    pub fn finish(&mut self) -> Option<Credential> {
        let lines = self.buffer.all_lines();
        self.scan(lines)
    }

    pub fn reported_failure(&self) -> Option<&str> {
        self.reported_failure.as_deref()
    }

    pub fn bytes_seen(&self) -> usize {
        self.buffer.bytes_seen()
    }

    fn scan(&mut self, lines: Vec<String>) -> Option<Credential> {
        for line in lines {
            match parse_status_line(&line) {
                StatusLine::Credential(credential) => return Some(credential),
                StatusLine::ReportedFailure(reason) => {
                    tracing::debug!(reason = %reason, "Login helper reported failure");
                    self.reported_failure = Some(reason);
                }
                StatusLine::Ignored => {}
            }
        }
        None
    }
}

#[cfg(test)]
#[path = "tests/parser_tests.rs"]
mod tests;
