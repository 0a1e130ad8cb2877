//! Control message dispatch and outbound commands.

use std::sync::Arc;

use bytes::Bytes;
use log::{debug, warn};
use serde::Serialize;

use super::Connection;
use crate::{
    adapter::MessageKind,
    command::{
        Command,
        CommandError,
        CommandName,
        ErrorParameters,
        FeaturesParameters,
        InitParameters,
        ReplyParameters,
        VersionParameters,
    },
    error::Result,
    feature::Feature,
    metrics,
};

impl Connection {
    /// Route one inbound control message.
    ///
    /// Malformed and unknown commands are logged and dropped. A handler
    /// result or error is answered with a `reply` when the command carried
    /// an id; fatal handler errors close the connection.
    pub(super) async fn handle_control(self: &Arc<Self>, payload: Bytes) {
        let command = match Command::parse(&payload) {
            Ok(command) => command,
            Err(e) => {
                warn!("dropping malformed control message: id={}, error={e}", self.id);
                return;
            }
        };
        metrics::inc_commands(command.command.as_str());

        if command.command == CommandName::REPLY {
            self.handle_reply(&command);
            return;
        }
        let Some(handler) = self.dispatcher.handler(&command.command) else {
            warn!(
                "dropping unknown command: id={}, command={}",
                self.id, command.command
            );
            return;
        };

        let name = command.command.clone();
        let request_id = command.id;
        match handler.handle(Arc::clone(self), command).await {
            Ok(None) => {}
            Ok(Some(result)) => {
                if let Some(request_id) = request_id {
                    self.send_reply(request_id, ReplyParameters::success(result))
                        .await;
                }
            }
            Err(CommandError::Fatal(err)) => self.close_error(*err).await,
            Err(err) => {
                warn!(
                    "command handler failed: id={}, command={name}, error={err}",
                    self.id
                );
                if let Some(request_id) = request_id {
                    self.send_reply(request_id, ReplyParameters::failure(err.to_string()))
                        .await;
                }
            }
        }
    }

    fn handle_reply(&self, command: &Command) {
        let Some(request_id) = command.id else {
            warn!("dropping reply without id: id={}", self.id);
            return;
        };
        match command.parameters::<ReplyParameters>() {
            Ok(reply) => {
                self.dispatcher.resolve_reply(request_id, reply);
            }
            Err(e) => warn!("dropping malformed reply: id={}, error={e}", self.id),
        }
    }

    /// Send an already built command.
    ///
    /// # Errors
    ///
    /// Returns an error if the command cannot be encoded or the transport
    /// refuses it.
    pub async fn send_control(&self, command: &Command) -> Result<()> {
        let payload = command.to_bytes()?;
        self.adapter
            .send_message(MessageKind::Control, payload)
            .await?;
        Ok(())
    }

    /// Send `name` with a fresh correlation id, returning the id.
    ///
    /// # Errors
    ///
    /// See [`send_control`](Self::send_control).
    pub async fn send_command<P: Serialize>(&self, name: CommandName, params: &P) -> Result<u64> {
        let id = self.dispatcher.next_id();
        self.send_control(&Command::new(name, Some(id), params)?)
            .await?;
        Ok(id)
    }

    /// Send `name` and wait for the peer's `reply`.
    ///
    /// Must not be awaited from inside a command handler, since the reply is
    /// delivered on the same path that runs handlers.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::Timeout`] if no reply arrives within the
    /// configured request timeout, [`CommandError::Closed`] if the
    /// connection closes first and [`CommandError::Rejected`] if the peer
    /// answers with `ok = false`.
    pub async fn request<P: Serialize>(
        &self,
        name: CommandName,
        params: &P,
    ) -> Result<ReplyParameters> {
        if self.is_closing() {
            return Err(CommandError::Closed.into());
        }
        let id = self.dispatcher.next_id();
        let command = Command::new(name.clone(), Some(id), params)?;
        let reply = self.dispatcher.expect_reply(id);
        if self.is_closing() {
            self.dispatcher.forget_reply(id);
            return Err(CommandError::Closed.into());
        }
        if let Err(e) = self.send_control(&command).await {
            self.dispatcher.forget_reply(id);
            return Err(e);
        }

        let timeout = self.config.request_timeout;
        match tokio::time::timeout(timeout, reply).await {
            Err(_) => {
                self.dispatcher.forget_reply(id);
                Err(CommandError::Timeout {
                    command: name,
                    timeout,
                }
                .into())
            }
            Ok(Err(_)) => Err(CommandError::Closed.into()),
            Ok(Ok(reply)) if reply.ok => Ok(reply),
            Ok(Ok(reply)) => Err(CommandError::Rejected {
                command: name,
                message: reply.message,
            }
            .into()),
        }
    }

    async fn send_reply(&self, request_id: u64, reply: ReplyParameters) {
        let result = match Command::new(CommandName::REPLY, Some(request_id), &reply) {
            Ok(command) => self.send_control(&command).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            debug!(
                "failed to send reply: id={}, request={request_id}, error={e}",
                self.id
            );
        }
    }

    /// Tell the peer about a fatal error.
    ///
    /// # Errors
    ///
    /// See [`send_control`](Self::send_control).
    pub async fn send_error(&self, message: &str) -> Result<u64> {
        let params = ErrorParameters {
            message: message.to_owned(),
        };
        self.send_command(CommandName::ERROR, &params).await
    }

    /// Assign addressing to the peer with an `init` command.
    ///
    /// # Errors
    ///
    /// See [`send_control`](Self::send_control).
    pub async fn send_init(&self, params: &InitParameters) -> Result<u64> {
        self.send_command(CommandName::INIT, params).await
    }

    /// Announce the current local feature set with a `features` command.
    ///
    /// Peers below the feature-field protocol ignore it.
    ///
    /// # Errors
    ///
    /// See [`send_control`](Self::send_control).
    pub async fn advertise_features(&self) -> Result<u64> {
        let features = self
            .negotiator
            .read()
            .expect("lock poisoned")
            .features()
            .advertisement();
        self.send_command(
            CommandName::FEATURES,
            &FeaturesParameters { features },
        )
        .await
    }

    pub(super) fn version_parameters(&self) -> VersionParameters {
        let negotiator = self.negotiator.read().expect("lock poisoned");
        let features = negotiator.features();
        VersionParameters {
            protocol_version: self.config.protocol_version,
            version: self.config.software_version.clone(),
            enable_fragmentation: features.is_local(&Feature::FRAGMENTATION),
            features: features.advertisement(),
        }
    }
}
