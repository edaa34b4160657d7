//! Wire format for the progress stream.
//!
//! Server-sent events, one JSON object per frame:
//! Frame format: `data: <json>\n\n`
//! JSON escapes newlines, so every frame is a single `data:` line.
//! Lines starting with `:` are comments (keep-alives) and carry no message.

use crate::error::{Error, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Comment frame flushed while the worker is quiet
pub const KEEP_ALIVE_FRAME: &str = ": keep-alive\n\n";

const DATA_PREFIX: &str = "data:";

// =============================================================================
// Messages
// =============================================================================

/// One message on the progress stream, tagged by `phase`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "lowercase")]
pub enum StreamMessage {
    /// Status line or archived path
    Zipping { output: String },

    /// Terminal failure: short summary in `message`, detail in `output`
    Error { message: String, output: String },

    /// Terminal success: where the client should go next
    Finished { redirect: String },
}

impl StreamMessage {
    pub fn zipping(output: impl Into<String>) -> Self {
        StreamMessage::Zipping {
            output: output.into(),
        }
    }

    pub fn error(message: impl Into<String>, output: impl Into<String>) -> Self {
        StreamMessage::Error {
            message: message.into(),
            output: output.into(),
        }
    }

    pub fn finished(redirect: impl Into<String>) -> Self {
        StreamMessage::Finished {
            redirect: redirect.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamMessage::Zipping { .. })
    }

    /// The `output` field, if this message has one.
    pub fn output(&self) -> Option<&str> {
        match self {
            StreamMessage::Zipping { output } | StreamMessage::Error { output, .. } => Some(output),
            StreamMessage::Finished { .. } => None,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Encode as a complete event-stream frame.
    pub fn encode(&self) -> Result<Bytes> {
        Ok(Bytes::from(format!("{} {}\n\n", DATA_PREFIX, self.to_json()?)))
    }
}

// =============================================================================
// Framing
// =============================================================================

pub fn keep_alive_frame() -> Bytes {
    Bytes::from_static(KEEP_ALIVE_FRAME.as_bytes())
}

/// Decode one frame (with or without its trailing blank line).
pub fn decode_frame(frame: &str) -> Result<StreamMessage> {
    let data: Vec<&str> = frame
        .lines()
        .filter_map(|line| line.strip_prefix(DATA_PREFIX))
        .map(|rest| rest.strip_prefix(' ').unwrap_or(rest))
        .collect();

    if data.is_empty() {
        return Err(Error::Transport(format!("frame has no data: {:?}", frame)));
    }

    Ok(serde_json::from_str(&data.join("\n"))?)
}

/// Split a stream body into its data frames, dropping comment frames.
pub fn split_frames(body: &str) -> Vec<&str> {
    body.split("\n\n")
        .map(str::trim_start)
        .filter(|frame| !frame.is_empty())
        .filter(|frame| frame.lines().any(|line| line.starts_with(DATA_PREFIX)))
        .collect()
}

/// Decode every data frame in a stream body, in order.
pub fn decode_stream(body: &str) -> Result<Vec<StreamMessage>> {
    split_frames(body).into_iter().map(decode_frame).collect()
}

// =============================================================================
// URL helpers
// =============================================================================

/// Join URL path pieces with single slashes.
///
/// A leading `/` on the first piece and a trailing `/` on the last piece are
/// kept; slashes at the joints are collapsed; empty pieces are dropped.
pub fn url_path_join(pieces: &[&str]) -> String {
    let initial = pieces.first().is_some_and(|p| p.starts_with('/'));
    let trailing = pieces.last().is_some_and(|p| p.ends_with('/'));

    let mut result = pieces
        .iter()
        .map(|p| p.trim_matches('/'))
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("/");

    if initial {
        result.insert(0, '/');
    }
    if trailing {
        result.push('/');
    }
    if result == "//" {
        result.truncate(1);
    }
    result
}

// =============================================================================
// Tests
// =============================================================================
