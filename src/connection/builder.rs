use std::{
    collections::HashMap,
    sync::{Arc, Mutex, RwLock, atomic::AtomicBool},
};

use log::info;
use tokio::{sync::watch, time::Instant};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use super::{Addressing, CloseState, Connection, counter};
use crate::{
    adapter::TransportAdapter,
    addr::MacAddr,
    command::{CommandDispatcher, CommandHandler, CommandName},
    config::ConnectionConfig,
    feature::{Feature, FeatureRegistry},
    fragment::{FragmentTable, Fragmenter},
    iface::{InterfaceHandle, VirtualInterface},
    protocol::Negotiator,
    registry::{ConnectionId, PacketHandler},
};

/// Configures a [`Connection`] before it is shared.
pub struct ConnectionBuilder {
    adapter: Arc<dyn TransportAdapter>,
    iface: Option<InterfaceHandle>,
    packet_handler: Option<Arc<dyn PacketHandler>>,
    config: ConnectionConfig,
    features: FeatureRegistry,
    handlers: HashMap<CommandName, Arc<dyn CommandHandler>>,
    mac: MacAddr,
}

impl ConnectionBuilder {
    pub(super) fn new(adapter: Arc<dyn TransportAdapter>) -> Self {
        Self {
            adapter,
            iface: None,
            packet_handler: None,
            config: ConnectionConfig::default(),
            features: FeatureRegistry::new(),
            handlers: HashMap::new(),
            mac: MacAddr::UNSPECIFIED,
        }
    }

    /// Attach a virtual interface; `managed` interfaces are closed with the
    /// connection.
    #[must_use]
    pub fn interface(mut self, iface: Arc<dyn VirtualInterface>, managed: bool) -> Self {
        self.iface = Some(if managed {
            InterfaceHandle::managed(iface)
        } else {
            InterfaceHandle::borrowed(iface)
        });
        self
    }

    #[must_use]
    pub fn packet_handler(mut self, handler: Arc<dyn PacketHandler>) -> Self {
        self.packet_handler = Some(handler);
        self
    }

    #[must_use]
    pub fn config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn local_feature(mut self, feature: Feature, enabled: bool) -> Self {
        self.features.set_local(feature, enabled);
        self
    }

    #[must_use]
    pub fn mac(mut self, mac: MacAddr) -> Self {
        self.mac = mac;
        self
    }

    /// Register a command handler; it takes precedence over the built-in
    /// handler of the same name. A later call for the same name wins.
    #[must_use]
    pub fn handler(mut self, name: CommandName, handler: impl CommandHandler) -> Self {
        self.handlers.insert(name, Arc::new(handler));
        self
    }

    /// Finish the connection. Nothing runs until
    /// [`serve`](Connection::serve) is called.
    #[must_use]
    pub fn build(self) -> Arc<Connection> {
        let dispatcher = CommandDispatcher::new();
        for (name, handler) in self.handlers {
            // The dispatcher is fresh and unsealed and names are unique.
            let _ = dispatcher.register_shared(name, handler);
        }
        let iface_managed = self.iface.as_ref().is_some_and(InterfaceHandle::is_managed);
        let conn = Connection {
            id: ConnectionId::next(),
            fragments: FragmentTable::new(self.config.fragment_expiry),
            ping: Mutex::new(self.config.ping),
            config: self.config,
            adapter: self.adapter,
            iface: self.iface,
            packet_handler: self.packet_handler,
            negotiator: RwLock::new(Negotiator::new(self.features)),
            fragmenter: Fragmenter::new(),
            dispatcher,
            addressing: RwLock::new(Addressing {
                mac: self.mac,
                ..Addressing::default()
            }),
            ready: watch::channel(false).0,
            welcome_sent: AtomicBool::new(false),
            serving: AtomicBool::new(false),
            closing: AtomicBool::new(false),
            close_state: tokio::sync::Mutex::new(CloseState {
                adapter_open: true,
                iface_open: iface_managed,
                shutdown_open: true,
                registered: false,
                closed: false,
            }),
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
            last_pong: Mutex::new(Instant::now()),
            _active: counter::ActiveConnection::new(),
        };
        info!(
            "connection created: wsvpn_active_connections={}, id={}",
            counter::active_connection_count(),
            conn.id
        );
        Arc::new(conn)
    }
}
