//! Error types for slack-shell.
//!
//! Every failure the session can report is a [`ShellError`]. None of them are
//! fatal to the interactive session: the executor renders them inline and the
//! state machine returns to an interactive mode. Only the binary's startup
//! path (missing token, terminal setup) turns an error into a process exit.

use std::path::PathBuf;

use thiserror::Error;

/// Primary error type for slack-shell operations.
#[derive(Error, Debug)]
pub enum ShellError {
    /// A conversation or user name did not resolve.
    #[error("{kind} not found: {name}")]
    NotFound {
        /// What was being looked up ("channel", "user", ...).
        kind: &'static str,
        /// The name as the user typed it.
        name: String,
    },

    /// The Slack Web API answered with `ok: false`.
    #[error("{method} failed: {message}")]
    Api {
        /// API method, e.g. `chat.postMessage`.
        method: String,
        /// Error code reported by the server.
        message: String,
    },

    /// Transport-level HTTP failure.
    #[error("HTTP error: {context}")]
    Http {
        /// Context describing the request that failed.
        context: String,
        /// Underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },

    /// I/O error.
    #[error("I/O error: {context}")]
    IoError {
        /// Context describing the operation that failed.
        context: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Serialization error.
    #[error("Serialization error: {context}")]
    SerializationError {
        /// Context describing the operation that failed.
        context: String,
        /// Underlying serde_json error.
        #[source]
        source: serde_json::Error,
    },

    /// Configuration file could not be read.
    #[error("Configuration error: {message}")]
    ConfigError {
        /// Human-readable error message.
        message: String,
    },

    /// Configuration file was read but is malformed.
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        /// Human-readable error message.
        message: String,
    },

    /// A non-filter verb was used after the first pipeline stage.
    #[error("cannot pipe to '{verb}'")]
    Pipeline {
        /// The offending verb.
        verb: String,
    },

    /// A command was issued in a state that cannot serve it.
    #[error("{message}")]
    Precondition {
        /// Message shown to the user.
        message: String,
    },

    /// No API token in the environment or configuration.
    #[error("slack_token not found (set SLACK_TOKEN or add it to {path})")]
    MissingToken {
        /// Config file that was consulted.
        path: PathBuf,
    },

    /// Terminal surface error.
    #[error("TUI error: {message}")]
    Tui {
        /// Human-readable error message.
        message: String,
    },

    /// The event loop is gone.
    #[error("Session shut down")]
    Shutdown,
}

impl ShellError {
    /// Create a new I/O error with context.
    #[must_use]
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::IoError {
            context: context.into(),
            source,
        }
    }

    /// Create an API error for a method.
    #[must_use]
    pub fn api(method: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            method: method.into(),
            message: message.into(),
        }
    }

    /// Create an HTTP error with context.
    #[must_use]
    pub fn http(context: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Http {
            context: context.into(),
            source,
        }
    }

    /// Create a not-found error.
    #[must_use]
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Create a precondition error.
    #[must_use]
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition {
            message: message.into(),
        }
    }

    /// Get the process exit code for this error.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::NotFound { .. } => 3,
            Self::ConfigError { .. } | Self::InvalidConfig { .. } | Self::MissingToken { .. } => 5,
            Self::Api { .. } | Self::Http { .. } => 69,
            Self::IoError { .. } => 74,
            Self::Shutdown => 130,
            _ => 1,
        }
    }

    /// Whether the session can keep going after reporting this error.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::MissingToken { .. } | Self::Tui { .. } | Self::Shutdown
        )
    }
}

/// Result type alias for slack-shell operations.
pub type Result<T> = std::result::Result<T, ShellError>;

impl From<std::io::Error> for ShellError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError {
            context: "I/O operation failed".to_string(),
            source: err,
        }
    }
}

impl From<serde_json::Error> for ShellError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError {
            context: "JSON operation failed".to_string(),
            source: err,
        }
    }
}
