use std::time::Duration;

use thiserror::Error;

use super::CommandName;
use crate::error::ConnectionError;

/// Errors raised while encoding, decoding or handling control commands.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The control message was not a valid command object.
    #[error("malformed command: {0}")]
    Malformed(#[source] serde_json::Error),
    /// The command's parameters did not match the expected shape.
    #[error("invalid parameters for {command}: {source}")]
    InvalidParameters {
        command: CommandName,
        #[source]
        source: serde_json::Error,
    },
    /// The command could not be serialised.
    #[error("failed to encode {command}: {source}")]
    Encode {
        command: CommandName,
        #[source]
        source: serde_json::Error,
    },
    /// Handlers are fixed once the connection starts serving.
    #[error("command handlers cannot be registered after serving started")]
    Sealed,
    /// A handler for the name already exists.
    #[error("a handler for {0} is already registered")]
    DuplicateHandler(CommandName),
    /// A request received no reply in time.
    #[error("no reply to {command} within {timeout:?}")]
    Timeout {
        command: CommandName,
        timeout: Duration,
    },
    /// The connection closed before the operation finished.
    #[error("connection closed")]
    Closed,
    /// The peer answered a request with `ok = false`.
    #[error("peer rejected {command}: {message}")]
    Rejected {
        command: CommandName,
        message: String,
    },
    /// A local handler refused the command; the text is sent back.
    #[error("{0}")]
    Refused(String),
    /// The command left the connection unusable and it must close.
    #[error(transparent)]
    Fatal(Box<ConnectionError>),
}

impl CommandError {
    /// Wrap `err` so that dispatch closes the connection with it.
    pub fn fatal(err: impl Into<ConnectionError>) -> Self { Self::Fatal(Box::new(err.into())) }
}
