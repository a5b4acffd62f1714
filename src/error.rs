use thiserror::Error;

/// Errors arising from reassembly and parsing of the device text protocol.
///
/// Field-level problems are not errors: an unparseable value drops that one
/// field and an unknown key is ignored, so the enum only covers conditions
/// that invalidate a whole message or the stream itself.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("reassembly buffer overflow ({len} bytes, limit {limit})")]
    BufferOverflow { len: usize, limit: usize },

    #[error("empty message")]
    EmptyMessage,

    #[error("shot message missing SHOT_ID{}", format_lines_suffix(lines))]
    MissingShotId {
        /// Raw message lines for debug context.
        lines: Vec<String>,
    },

    #[error("shot message carries non-positive SHOT_ID {id}")]
    InvalidShotId { id: i64 },
}

impl ProtocolError {
    /// Create a `MissingShotId` error (lines filled in later via `with_lines`).
    pub(crate) fn missing_shot_id() -> Self {
        Self::MissingShotId { lines: Vec::new() }
    }

    /// Attach the raw message lines to decode-phase errors for diagnostics.
    pub fn with_lines(self, message: &[String]) -> Self {
        match self {
            Self::MissingShotId { .. } => Self::MissingShotId {
                lines: message.to_vec(),
            },
            other => other,
        }
    }
}

/// Format message lines as a suffix like ` | SHOT_ID=3; SPEED_MPH=...` (empty if none).
fn format_lines_suffix(lines: &[String]) -> String {
    if lines.is_empty() {
        return String::new();
    }
    let limit = 4;
    let joined: Vec<&str> = lines.iter().take(limit).map(String::as_str).collect();
    let ellipsis = if lines.len() > limit { "; ..." } else { "" };
    format!(" | {}{ellipsis}", joined.join("; "))
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
