//! Push-stream message types and SSE parser.
//!
//! The scan stream endpoint speaks `text/event-stream`: frames of
//! `event:`/`data:` lines separated by a blank line. [`SseParser`]
//! reassembles frames from arbitrarily-chunked bytes and
//! [`decode_frame`] turns them into strongly-typed [`StreamEvent`]s.

use piiwatch_core::snapshot::RiskLevel;
use serde::Deserialize;

/// Typed events delivered on a scan's push stream.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// Progress update for the running scan.
    Progress(ProgressData),
    /// A new log line.
    Log(LogData),
    /// The scan finished; carries the result summary.
    Completed(CompletedData),
    /// Stream end: the server will send nothing further.
    Done,
    /// The server reported a stream failure. The channel closes; the
    /// poll channel carries the session from here.
    Error,
}

/// Payload for `progress` events.
#[derive(Debug, Clone, Deserialize)]
pub struct ProgressData {
    /// Completion percentage. Absent values normalize to 0 downstream.
    #[serde(default)]
    pub progress: Option<f64>,
}

/// Payload for `log` events.
#[derive(Debug, Clone, Deserialize)]
pub struct LogData {
    pub message: String,
}

/// Payload for `completed` events.
#[derive(Debug, Clone, Deserialize)]
pub struct CompletedData {
    #[serde(default)]
    pub total_findings: i64,
    #[serde(default)]
    pub overall_risk: Option<RiskLevel>,
}

/// A reassembled server-sent event frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    /// Event name; `message` when the frame carried no `event:` line.
    pub event: String,
    /// Data payload; multiple `data:` lines are joined with `\n`.
    pub data: String,
}

/// Incremental SSE frame parser.
///
/// Feed it raw byte chunks as they arrive; it buffers partial frames
/// across chunk boundaries and yields each frame exactly once, in order.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: String,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume a chunk and return every frame it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));
        // Normalizing after the append keeps a \r\n split across two
        // chunks intact.
        if self.buffer.contains('\r') {
            self.buffer = self.buffer.replace("\r\n", "\n");
        }

        let mut frames = Vec::new();
        while let Some(end) = self.buffer.find("\n\n") {
            let block: String = self.buffer.drain(..end + 2).collect();
            if let Some(frame) = parse_block(&block) {
                frames.push(frame);
            }
        }
        frames
    }
}

/// Parse one blank-line-terminated block into a frame.
///
/// Comment lines (leading `:`) and unknown fields (`id:`, `retry:`) are
/// ignored. Blocks with neither an event name nor data yield `None`.
fn parse_block(block: &str) -> Option<SseFrame> {
    let mut event = String::new();
    let mut data: Vec<&str> = Vec::new();

    for line in block.lines() {
        if line.starts_with(':') {
            continue;
        }
        if let Some(rest) = line.strip_prefix("event:") {
            event = rest.strip_prefix(' ').unwrap_or(rest).to_string();
        } else if let Some(rest) = line.strip_prefix("data:") {
            data.push(rest.strip_prefix(' ').unwrap_or(rest));
        }
    }

    if event.is_empty() && data.is_empty() {
        return None;
    }
    if event.is_empty() {
        event = "message".to_string();
    }
    Some(SseFrame {
        event,
        data: data.join("\n"),
    })
}

/// Decode a frame into a typed [`StreamEvent`].
///
/// Returns `Ok(None)` for event names this engine does not consume;
/// callers should log those and continue. Malformed payloads for known
/// event names return the serde error.
pub fn decode_frame(frame: &SseFrame) -> Result<Option<StreamEvent>, serde_json::Error> {
    let event = match frame.event.as_str() {
        "progress" => StreamEvent::Progress(serde_json::from_str(&frame.data)?),
        "log" => StreamEvent::Log(serde_json::from_str(&frame.data)?),
        "completed" => StreamEvent::Completed(serde_json::from_str(&frame.data)?),
        "done" => StreamEvent::Done,
        "error" => StreamEvent::Error,
        _ => return Ok(None),
    };
    Ok(Some(event))
}
