//! Per-connection configuration.
//!
//! Values deserialise from any `serde` source with durations expressed in
//! whole seconds; missing fields fall back to [`ConnectionConfig::default`].

use std::time::Duration;

use serde::Deserialize;

use crate::{
    fragment::{FRAGMENT_CLEANUP_INTERVAL, FRAGMENT_EXPIRY},
    protocol::ProtocolVersion,
};

/// Default interval between keepalive pings.
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(5);
/// Default time without a pong after which the link is considered dead.
pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_secs(15);
/// Default size of the buffer used to read from the virtual interface.
pub const DEFAULT_PACKET_BUFFER_SIZE: usize = 2000;
/// Default wait for the reply to a request command.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Keepalive settings.
///
/// An `interval` of zero disables keepalive entirely.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PingConfig {
    #[serde(with = "secs")]
    pub interval: Duration,
    #[serde(with = "secs")]
    pub timeout: Duration,
}

impl PingConfig {
    /// Keepalive switched off.
    pub const DISABLED: Self = Self {
        interval: Duration::ZERO,
        timeout: Duration::ZERO,
    };

    /// Whether pings are sent at all.
    #[must_use]
    pub fn is_enabled(&self) -> bool { !self.interval.is_zero() }
}

impl Default for PingConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_PING_INTERVAL,
            timeout: DEFAULT_PING_TIMEOUT,
        }
    }
}

/// Settings applied to a single [`Connection`](crate::connection::Connection).
///
/// ```
/// use std::time::Duration;
///
/// use wsvpn::config::ConnectionConfig;
/// let cfg = ConnectionConfig::default().with_fragment_expiry(Duration::from_secs(5));
/// assert_eq!(cfg.fragment_expiry, Duration::from_secs(5));
/// assert_eq!(cfg.packet_buffer_size, 2000);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub ping: PingConfig,
    pub packet_buffer_size: usize,
    #[serde(with = "secs")]
    pub fragment_expiry: Duration,
    #[serde(with = "secs")]
    pub fragment_cleanup_interval: Duration,
    #[serde(with = "secs")]
    pub request_timeout: Duration,
    /// Free-form software version announced in the handshake.
    pub software_version: String,
    /// Protocol version announced in the handshake.
    pub protocol_version: ProtocolVersion,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            ping: PingConfig::default(),
            packet_buffer_size: DEFAULT_PACKET_BUFFER_SIZE,
            fragment_expiry: FRAGMENT_EXPIRY,
            fragment_cleanup_interval: FRAGMENT_CLEANUP_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            software_version: env!("CARGO_PKG_VERSION").to_owned(),
            protocol_version: ProtocolVersion::CURRENT,
        }
    }
}

impl ConnectionConfig {
    #[must_use]
    pub fn with_ping(mut self, ping: PingConfig) -> Self {
        self.ping = ping;
        self
    }

    #[must_use]
    pub fn with_packet_buffer_size(mut self, size: usize) -> Self {
        self.packet_buffer_size = size;
        self
    }

    #[must_use]
    pub fn with_fragment_expiry(mut self, expiry: Duration) -> Self {
        self.fragment_expiry = expiry;
        self
    }

    #[must_use]
    pub fn with_fragment_cleanup_interval(mut self, interval: Duration) -> Self {
        self.fragment_cleanup_interval = interval;
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_software_version(mut self, version: impl Into<String>) -> Self {
        self.software_version = version.into();
        self
    }

    /// Announce a different protocol version, e.g. to emulate an older peer.
    #[must_use]
    pub fn with_protocol_version(mut self, version: ProtocolVersion) -> Self {
        self.protocol_version = version;
        self
    }
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
