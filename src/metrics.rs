//! Metric helpers for `wsvpn`.
//!
//! Names and thin wrappers around the [`metrics`](https://docs.rs/metrics)
//! macros. Without the `metrics` feature every helper compiles to a no-op.

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

/// Gauge of connections currently alive.
pub const CONNECTIONS_ACTIVE: &str = "wsvpn_connections_active";
/// Counter of incomplete fragment groups evicted by the cleanup loop.
pub const FRAGMENTS_EVICTED: &str = "wsvpn_fragments_evicted_total";
/// Counter of control commands dispatched, labelled by command name.
pub const COMMANDS_TOTAL: &str = "wsvpn_commands_total";
/// Counter of data packets, labelled by direction.
pub const PACKETS_TOTAL: &str = "wsvpn_packets_total";

/// Direction a data packet travelled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Received from the peer.
    Inbound,
    /// Sent to the peer.
    Outbound,
}

impl Direction {
    /// Label value used for this direction.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// Increment the active connections gauge.
pub fn inc_connections() {
    #[cfg(feature = "metrics")]
    gauge!(CONNECTIONS_ACTIVE).increment(1.0);
}

/// Decrement the active connections gauge.
pub fn dec_connections() {
    #[cfg(feature = "metrics")]
    gauge!(CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record `count` evicted fragment groups.
pub fn inc_fragments_evicted(count: usize) {
    #[cfg(feature = "metrics")]
    counter!(FRAGMENTS_EVICTED).increment(u64::try_from(count).unwrap_or(u64::MAX));
    #[cfg(not(feature = "metrics"))]
    let _ = count;
}

/// Record one dispatched command.
pub fn inc_commands(command: &str) {
    #[cfg(feature = "metrics")]
    counter!(COMMANDS_TOTAL, "command" => command.to_owned()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = command;
}

/// Record one data packet for `direction`.
pub fn inc_packets(direction: Direction) {
    #[cfg(feature = "metrics")]
    counter!(PACKETS_TOTAL, "direction" => direction.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = direction;
}
