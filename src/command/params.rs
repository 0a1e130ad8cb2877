//! Typed parameters of the built-in commands.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{addr::Ipv4Net, feature::Feature, protocol::ProtocolVersion};

/// Parameters of the `version` handshake.
///
/// Older peers omit `features`; peers before the negotiated-fragmentation
/// threshold also omit `enable_fragmentation`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionParameters {
    pub protocol_version: ProtocolVersion,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub enable_fragmentation: bool,
    #[serde(default)]
    pub features: BTreeMap<Feature, bool>,
}

/// Layer at which the tunnel carries frames.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InterfaceMode {
    /// IP packets.
    #[default]
    Tun,
    /// Ethernet frames.
    Tap,
}

/// Parameters of the `init` command assigning addressing to a client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitParameters {
    pub mode: InterfaceMode,
    pub ip_address: Ipv4Net,
    pub mtu: u32,
}

/// Parameters of the `error` command.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorParameters {
    pub message: String,
}

/// Parameters of a `reply` command.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplyParameters {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub result: Value,
}

impl ReplyParameters {
    /// A successful reply carrying `result`.
    #[must_use]
    pub fn success(result: Value) -> Self {
        Self {
            ok: true,
            message: String::new(),
            result,
        }
    }

    /// A failed reply carrying `message`.
    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
            result: Value::Null,
        }
    }
}

/// Parameters of the `features` re-advertisement.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeaturesParameters {
    pub features: BTreeMap<Feature, bool>,
}
