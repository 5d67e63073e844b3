use std::time::Duration;

use crate::config::ConfigError;

/// Error type shared by the transport, stream controller and CLI.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Upstream error: status={status}, message={message}")]
    Upstream { status: u16, message: String },
    #[error("No response body")]
    MissingBody,
    #[error("No data received for {}s", .0.as_secs())]
    IdleTimeout(Duration),
    #[error("Decode error: {0}")]
    Decode(String),
}

impl ChatError {
    /// Whether this error ends the stream it occurred on.
    ///
    /// Decode failures are scoped to a single frame; every other kind is fatal.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        !matches!(self, ChatError::Decode(_))
    }

    /// Human-readable text used in the inline error annotation.
    #[must_use]
    pub fn annotation_text(&self) -> String {
        match self {
            ChatError::Upstream { status, message } if message.is_empty() => {
                format!("HTTP {status}")
            }
            ChatError::Upstream { status, message } => format!("HTTP {status}: {message}"),
            other => other.to_string(),
        }
    }
}

impl From<ConfigError> for ChatError {
    fn from(err: ConfigError) -> Self {
        ChatError::Config(err.to_string())
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return ChatError::Upstream {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or_default().to_string(),
            };
        }
        ChatError::Transport(err.to_string())
    }
}
