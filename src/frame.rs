//! Frame: wire messages exchanged with websocket clients.
//!
//! ARCHITECTURE
//! ============
//! Clients send `{type, payload}` envelopes. The inbound side of a player
//! decodes them into a typed `Request`; everything the server emits is an
//! `Outbound` value that the player's write loop serialises to JSON.
//!
//! DESIGN
//! ======
//! - Game events are `{type, payload}` objects (`started`, `played`, `ended`).
//! - Confirmations are flat `{message}` objects, errors flat `{error, code}`.
//! - Typed errors implement `ErrorCode` so the wire error carries a grepable
//!   code next to the human message.

use serde::{Deserialize, Serialize};

use crate::games::{Mark, Move};
use crate::state::SessionId;

// =============================================================================
// FIELD CONSTANTS
// =============================================================================

pub const MSG_START: &str = "start";
pub const MSG_PLAY: &str = "play";
pub const MSG_EXIT: &str = "exit";

/// Display name used when a client starts with a blank name.
pub const ANONYMOUS_NAME: &str = "anonymous";

// =============================================================================
// ERROR CODES
// =============================================================================

/// Coarse classification of an error, independent of which module raised it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed message, payload, move, or mark.
    Validation,
    /// Request conflicts with current game or player state.
    StateConflict,
    /// Session or queue lookup miss.
    NotFound,
    /// The hub is gone; the connection cannot make progress.
    Unavailable,
}

/// Grepable error code and classification for structured error messages.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn kind(&self) -> ErrorKind;
}

/// Error as reported to a player: `{"error": ..., "code": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    pub error: String,
    pub code: &'static str,
}

impl ErrorReport {
    #[must_use]
    pub fn from_error(err: &(impl ErrorCode + ?Sized)) -> Self {
        Self { error: err.to_string(), code: err.error_code() }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid json: {0}")]
    InvalidJson(serde_json::Error),
    #[error("invalid message type: {0}")]
    UnknownMessageType(String),
    #[error("invalid {kind} payload: {source}")]
    InvalidPayload { kind: &'static str, source: serde_json::Error },
}

impl ErrorCode for FrameError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidJson(_) => "E_INVALID_JSON",
            Self::UnknownMessageType(_) => "E_UNKNOWN_MESSAGE_TYPE",
            Self::InvalidPayload { .. } => "E_INVALID_PAYLOAD",
        }
    }

    fn kind(&self) -> ErrorKind {
        ErrorKind::Validation
    }
}

// =============================================================================
// INBOUND
// =============================================================================

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct StartPayload {
    name: String,
}

#[derive(Debug, Deserialize)]
struct PlayPayload {
    #[serde(rename = "move")]
    mv: Move,
}

/// A decoded client request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Start { name: String },
    Play { mv: Move },
    Exit,
}

impl Request {
    /// Decode one text frame.
    ///
    /// # Errors
    ///
    /// Returns `InvalidJson` for non-JSON or envelope-less input,
    /// `UnknownMessageType` for unrecognised `type` values, and
    /// `InvalidPayload` when the payload does not match the type.
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let envelope: Envelope = serde_json::from_str(text).map_err(FrameError::InvalidJson)?;

        match envelope.kind.as_str() {
            MSG_START => {
                let payload: StartPayload = decode_payload(MSG_START, envelope.payload)?;
                let name = payload.name.trim();
                let name = if name.is_empty() { ANONYMOUS_NAME } else { name };
                Ok(Self::Start { name: name.to_string() })
            }
            MSG_PLAY => {
                let payload: PlayPayload = decode_payload(MSG_PLAY, envelope.payload)?;
                Ok(Self::Play { mv: payload.mv })
            }
            MSG_EXIT => Ok(Self::Exit),
            other => Err(FrameError::UnknownMessageType(other.to_string())),
        }
    }

    /// Wire `type` of this request.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Start { .. } => MSG_START,
            Self::Play { .. } => MSG_PLAY,
            Self::Exit => MSG_EXIT,
        }
    }
}

fn decode_payload<T: serde::de::DeserializeOwned>(kind: &'static str, payload: serde_json::Value) -> Result<T, FrameError> {
    serde_json::from_value(payload).map_err(|source| FrameError::InvalidPayload { kind, source })
}

// =============================================================================
// OUTBOUND
// =============================================================================

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EndReason {
    Won,
    Abandoned,
    Draw,
}

/// A player was paired into a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Joined {
    pub session_id: SessionId,
    pub opponent: String,
    pub tile: Mark,
}

/// The opponent moved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Played {
    pub player: String,
    #[serde(rename = "move")]
    pub mv: Move,
}

/// A session reached its end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ended {
    /// Used by the write loop to match local status; not sent to clients.
    #[serde(skip)]
    pub session_id: SessionId,
    pub reason: EndReason,
    pub winner: Option<Mark>,
    pub score: u32,
}

/// Typed game events: `{"type": ..., "payload": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
pub enum Event {
    Started(Joined),
    Played(Played),
    Ended(Ended),
}

/// Everything a player's write loop can put on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Outbound {
    Event(Event),
    Notice { message: String },
    Error(ErrorReport),
}

impl Outbound {
    #[must_use]
    pub fn notice(message: impl Into<String>) -> Self {
        Self::Notice { message: message.into() }
    }

    #[must_use]
    pub fn error(report: ErrorReport) -> Self {
        Self::Error(report)
    }

    /// Serialise for a text websocket frame.
    ///
    /// # Errors
    ///
    /// Propagates `serde_json` serialisation failures.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
#[path = "frame_test.rs"]
mod tests;
