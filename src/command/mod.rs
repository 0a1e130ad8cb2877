//! Control commands exchanged alongside data messages.
//!
//! Every control message is a JSON object of the form
//! `{"command": <name>, "id": <u64>, "parameters": <object>}`. Inbound
//! commands are routed by name to a [`CommandHandler`] registered in the
//! connection's [`CommandDispatcher`]; `reply` commands resolve pending
//! requests instead.

mod dispatcher;
mod error;
mod handler;
mod message;
mod params;

use std::borrow::Cow;

use derive_more::Display;
pub use dispatcher::CommandDispatcher;
pub use error::CommandError;
pub use handler::{CommandHandler, HandlerResult};
pub use message::Command;
pub use params::{
    ErrorParameters,
    FeaturesParameters,
    InitParameters,
    InterfaceMode,
    ReplyParameters,
    VersionParameters,
};
use serde::{Deserialize, Serialize};

/// Name of a control command.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Display, Serialize, Deserialize)]
#[serde(transparent)]
#[display("{_0}")]
pub struct CommandName(Cow<'static, str>);

impl CommandName {
    /// Handshake announcing protocol version and features.
    pub const VERSION: Self = Self(Cow::Borrowed("version"));
    /// Interface assignment sent by the server.
    pub const INIT: Self = Self(Cow::Borrowed("init"));
    /// Keepalive probe.
    pub const PING: Self = Self(Cow::Borrowed("ping"));
    /// Keepalive answer.
    pub const PONG: Self = Self(Cow::Borrowed("pong"));
    /// Fatal error notification sent before closing.
    pub const ERROR: Self = Self(Cow::Borrowed("error"));
    /// Answer to a request carrying an id.
    pub const REPLY: Self = Self(Cow::Borrowed("reply"));
    /// Feature re-advertisement after the handshake.
    pub const FEATURES: Self = Self(Cow::Borrowed("features"));

    /// Create a command name.
    #[must_use]
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self { Self(name.into()) }

    #[must_use]
    pub fn as_str(&self) -> &str { &self.0 }
}

impl From<&'static str> for CommandName {
    fn from(value: &'static str) -> Self { Self(Cow::Borrowed(value)) }
}
