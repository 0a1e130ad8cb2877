//! Built-in command handlers.

use std::sync::Arc;

use log::{debug, info, warn};

use super::Connection;
use crate::{
    command::{
        Command,
        CommandDispatcher,
        CommandError,
        CommandName,
        ErrorParameters,
        FeaturesParameters,
        HandlerResult,
        InitParameters,
        VersionParameters,
    },
    protocol::NegotiationError,
};

/// Register every built-in handler not overridden by the owner.
pub(super) fn install_defaults(dispatcher: &CommandDispatcher) -> Result<(), CommandError> {
    dispatcher.register_default(CommandName::VERSION, handle_version)?;
    dispatcher.register_default(CommandName::INIT, handle_init)?;
    dispatcher.register_default(CommandName::PING, handle_ping)?;
    dispatcher.register_default(CommandName::PONG, handle_pong)?;
    dispatcher.register_default(CommandName::ERROR, handle_error)?;
    dispatcher.register_default(CommandName::FEATURES, handle_features)?;
    Ok(())
}

/// Apply the peer's handshake. Malformed parameters and the reserved
/// version are fatal; a repeated handshake is ignored.
async fn handle_version(conn: Arc<Connection>, command: Command) -> HandlerResult {
    let params: VersionParameters = command.parameters().map_err(CommandError::fatal)?;
    let result = conn
        .negotiator
        .write()
        .expect("lock poisoned")
        .complete_handshake(
            params.protocol_version,
            params.enable_fragmentation,
            params.features,
        );
    match result {
        Ok(policy) => {
            info!(
                "handshake complete: id={}, remote_protocol_version={}, remote_software={:?}, fragmentation={}, compression={}",
                conn.id,
                params.protocol_version,
                params.version,
                policy.fragmentation,
                policy.compression
            );
            conn.mark_ready_if_handshaken();
            Ok(None)
        }
        Err(NegotiationError::AlreadyDetermined { current }) => {
            warn!(
                "ignoring repeated handshake: id={}, current={current}, announced={}",
                conn.id, params.protocol_version
            );
            Ok(None)
        }
        Err(e) => Err(CommandError::fatal(e)),
    }
}

/// Store the addressing assigned by the server.
async fn handle_init(conn: Arc<Connection>, command: Command) -> HandlerResult {
    let params: InitParameters = command.parameters().map_err(CommandError::fatal)?;
    {
        let mut addressing = conn.addressing.write().expect("lock poisoned");
        addressing.ip = params.ip_address;
        addressing.mtu = Some(params.mtu);
        addressing.mode = params.mode;
    }
    info!(
        "interface assigned: id={}, mode={:?}, ip={}, mtu={}",
        conn.id, params.mode, params.ip_address, params.mtu
    );
    Ok(None)
}

/// Answer a keepalive probe with a `pong` carrying the same id.
async fn handle_ping(conn: Arc<Connection>, command: Command) -> HandlerResult {
    let pong = Command::new(CommandName::PONG, command.id, &())?;
    if let Err(e) = conn.send_control(&pong).await {
        debug!("failed to answer ping: id={}, error={e}", conn.id);
    }
    Ok(None)
}

async fn handle_pong(conn: Arc<Connection>, _command: Command) -> HandlerResult {
    conn.record_pong();
    Ok(None)
}

/// The peer is about to close the link; log its reason and close.
async fn handle_error(conn: Arc<Connection>, command: Command) -> HandlerResult {
    let message = command
        .parameters::<ErrorParameters>()
        .map_or_else(|_| command.parameters.to_string(), |params| params.message);
    warn!("peer reported error: id={}, message={message}", conn.id);
    conn.close().await;
    Ok(None)
}

/// Replace the peer's feature advertisement after the handshake.
async fn handle_features(conn: Arc<Connection>, command: Command) -> HandlerResult {
    let params: FeaturesParameters = command.parameters()?;
    let recomputed = conn
        .negotiator
        .write()
        .expect("lock poisoned")
        .update_remote_features(params.features);
    if !recomputed {
        debug!(
            "feature advertisement stored without recomputation: id={}, remote_protocol_version={}",
            conn.id,
            conn.remote_protocol_version()
        );
    }
    Ok(None)
}
