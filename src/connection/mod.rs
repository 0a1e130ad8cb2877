//! The per-connection protocol engine.
//!
//! A [`Connection`] turns a [`TransportAdapter`] into a virtual network
//! link. It owns negotiation state, the fragment table and the command
//! dispatcher, and supervises a handful of background workers:
//!
//! - the transport's serve loop
//! - the fragment cleanup loop
//! - the virtual interface read loop
//! - the welcome sender that starts the handshake
//! - the keepalive timer
//!
//! All of them stop when the connection's shutdown token is cancelled by
//! [`Connection::close`], the only path to the closed state.

mod builder;
mod control;
mod counter;
mod data;
mod handlers;
mod keepalive;
mod lifecycle;
mod shutdown;

use std::sync::{
    Arc,
    Mutex,
    RwLock,
    atomic::{AtomicBool, Ordering},
};

pub use builder::ConnectionBuilder;
pub use counter::active_connection_count;
use tokio::{sync::watch, time::Instant};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::{
    adapter::TransportAdapter,
    addr::{Ipv4Net, MacAddr},
    command::{CommandDispatcher, CommandError, CommandHandler, CommandName, InterfaceMode},
    config::{ConnectionConfig, PingConfig},
    feature::Feature,
    fragment::{FragmentTable, Fragmenter},
    iface::InterfaceHandle,
    protocol::{LinkPolicy, Negotiator, ProtocolVersion},
    registry::{ConnectionId, PacketHandler},
};

/// Addressing assigned to this end of the tunnel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct Addressing {
    ip: Ipv4Net,
    mac: MacAddr,
    mtu: Option<u32>,
    mode: InterfaceMode,
}

/// Which resources still need releasing; guarded by the close lock.
#[derive(Debug)]
struct CloseState {
    adapter_open: bool,
    iface_open: bool,
    shutdown_open: bool,
    registered: bool,
    closed: bool,
}

/// One tunnel endpoint talking to one remote peer.
pub struct Connection {
    id: ConnectionId,
    config: ConnectionConfig,
    adapter: Arc<dyn TransportAdapter>,
    iface: Option<InterfaceHandle>,
    packet_handler: Option<Arc<dyn PacketHandler>>,
    negotiator: RwLock<Negotiator>,
    fragments: FragmentTable,
    fragmenter: Fragmenter,
    dispatcher: CommandDispatcher,
    addressing: RwLock<Addressing>,
    ready: watch::Sender<bool>,
    welcome_sent: AtomicBool,
    serving: AtomicBool,
    closing: AtomicBool,
    close_state: tokio::sync::Mutex<CloseState>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    ping: Mutex<PingConfig>,
    last_pong: Mutex<Instant>,
    _active: counter::ActiveConnection,
}

impl Connection {
    /// Start building a connection over `adapter`.
    pub fn builder(adapter: Arc<dyn TransportAdapter>) -> ConnectionBuilder {
        ConnectionBuilder::new(adapter)
    }

    #[must_use]
    pub fn id(&self) -> ConnectionId { self.id }

    #[must_use]
    pub fn config(&self) -> &ConnectionConfig { &self.config }

    /// The address assigned by the `init` command, `0.0.0.0/0` until then.
    #[must_use]
    pub fn assigned_ip(&self) -> Ipv4Net { self.addressing.read().expect("lock poisoned").ip }

    #[must_use]
    pub fn mac(&self) -> MacAddr { self.addressing.read().expect("lock poisoned").mac }

    /// The MTU announced by the `init` command, if one arrived.
    #[must_use]
    pub fn mtu(&self) -> Option<u32> { self.addressing.read().expect("lock poisoned").mtu }

    #[must_use]
    pub fn interface_mode(&self) -> InterfaceMode {
        self.addressing.read().expect("lock poisoned").mode
    }

    pub fn set_mac(&self, mac: MacAddr) { self.addressing.write().expect("lock poisoned").mac = mac; }

    #[must_use]
    pub fn remote_protocol_version(&self) -> ProtocolVersion {
        self.negotiator
            .read()
            .expect("lock poisoned")
            .remote_version()
    }

    /// Effective fragmentation and compression flags.
    #[must_use]
    pub fn link_policy(&self) -> LinkPolicy { self.negotiator.read().expect("lock poisoned").policy() }

    #[must_use]
    pub fn is_used_feature(&self, feature: &Feature) -> bool {
        self.negotiator
            .read()
            .expect("lock poisoned")
            .features()
            .is_used(feature)
    }

    /// Enable or disable a locally offered feature.
    ///
    /// Takes effect on the next policy recomputation; call before
    /// [`serve`](Self::serve) so the welcome advertises it.
    pub fn set_local_feature(&self, feature: Feature, enabled: bool) {
        self.negotiator
            .write()
            .expect("lock poisoned")
            .features_mut()
            .set_local(feature, enabled);
    }

    #[must_use]
    pub fn is_local_feature(&self, feature: &Feature) -> bool {
        self.negotiator
            .read()
            .expect("lock poisoned")
            .features()
            .is_local(feature)
    }

    /// Replace the keepalive settings.
    ///
    /// The ping interval is fixed when serving starts; a new timeout applies
    /// from the next ping.
    pub fn configure_ping(&self, ping: PingConfig) { *self.ping.lock().expect("lock poisoned") = ping; }

    #[must_use]
    pub fn ping_config(&self) -> PingConfig { *self.ping.lock().expect("lock poisoned") }

    /// Register a handler for `name` before serving.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::Sealed`] once serving started and
    /// [`CommandError::DuplicateHandler`] if `name` is taken.
    pub fn register_handler(
        &self,
        name: CommandName,
        handler: impl CommandHandler,
    ) -> Result<(), CommandError> {
        self.dispatcher.register(name, handler)
    }

    #[must_use]
    pub fn is_ready(&self) -> bool { *self.ready.borrow() }

    #[must_use]
    pub fn is_closing(&self) -> bool { self.closing.load(Ordering::SeqCst) }

    /// Incomplete fragment groups currently buffered.
    #[must_use]
    pub fn pending_fragments(&self) -> usize { self.fragments.len() }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("remote_protocol_version", &self.remote_protocol_version())
            .field("policy", &self.link_policy())
            .field("ready", &self.is_ready())
            .field("closing", &self.is_closing())
            .finish_non_exhaustive()
    }
}
