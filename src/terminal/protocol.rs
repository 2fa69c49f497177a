//! Terminal backend wire format.
//!
//! Outbound text frames are either raw input or JSON envelopes. The
//! backend parses JSON frames whose `type` it knows (`resize`, `input`)
//! and writes everything else to the shell verbatim, so:
//!
//! - [`WireFormat::Raw`]: a command is sent as `command + "\n"`.
//! - [`WireFormat::Envelope`]: a command is sent as
//!   `{"type":"command","command":"..."}`.
//!
//! Resize always travels as `{"type":"resize","rows":R,"cols":C}`; there is
//! no raw representation for it.

use serde::{Deserialize, Serialize};

/// Encoding used for outbound commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    /// Command text followed by a newline.
    #[default]
    Raw,
    /// `{"type":"command","command":...}` JSON envelope.
    Envelope,
}

impl std::str::FromStr for WireFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "raw" => Ok(Self::Raw),
            "envelope" | "json" => Ok(Self::Envelope),
            other => anyhow::bail!("unknown wire format '{other}' (expected raw or envelope)"),
        }
    }
}

/// A frame sent to the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    /// One submitted command line.
    Command(String),
    /// New terminal dimensions.
    Resize {
        /// Rows.
        rows: u16,
        /// Columns.
        cols: u16,
    },
}

impl OutboundFrame {
    /// Encode as a text frame payload.
    pub fn encode(&self, format: WireFormat) -> String {
        match (self, format) {
            (Self::Command(command), WireFormat::Raw) => format!("{command}\n"),
            (Self::Command(command), WireFormat::Envelope) => {
                serde_json::json!({ "type": "command", "command": command }).to_string()
            }
            (Self::Resize { rows, cols }, _) => {
                serde_json::json!({ "type": "resize", "rows": rows, "cols": cols }).to_string()
            }
        }
    }
}

/// Response body of `POST /api/terminal/session`.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionCreated {
    /// Backend-issued session id.
    #[serde(rename = "sessionId", default)]
    pub session_id: Option<String>,
    /// Informational message.
    #[serde(default)]
    pub message: Option<String>,
    /// Error code when the backend refused the request.
    #[serde(default)]
    pub error: Option<String>,
}
