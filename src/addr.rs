//! Addressing types assigned to a tunnel endpoint.
//!
//! Interface addresses use [`Ipv4Net`] from `ipnet`, which carries the
//! `10.0.0.2/24` wire form through its `serde` support.

use std::{fmt, str::FromStr};

pub use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when parsing a [`MacAddr`] string.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("invalid MAC address {0:?}")]
pub struct MacParseError(pub String);

/// A 48-bit Ethernet hardware address.
///
/// ```
/// use wsvpn::addr::MacAddr;
/// let mac: MacAddr = "02:00:5e:10:00:01".parse().unwrap();
/// assert_eq!(mac.octets()[0], 0x02);
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddr([u8; 6]);

impl MacAddr {
    /// The all-zero address used before one is assigned.
    pub const UNSPECIFIED: Self = Self([0; 6]);

    #[must_use]
    pub const fn new(octets: [u8; 6]) -> Self { Self(octets) }

    #[must_use]
    pub const fn octets(&self) -> [u8; 6] { self.0 }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl FromStr for MacAddr {
    type Err = MacParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || MacParseError(s.to_owned());
        let mut octets = [0_u8; 6];
        let mut parts = s.split(':');
        for octet in &mut octets {
            let part = parts.next().ok_or_else(invalid)?;
            if part.len() != 2 {
                return Err(invalid());
            }
            *octet = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(Self(octets))
    }
}

impl TryFrom<String> for MacAddr {
    type Error = MacParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> { value.parse() }
}

impl From<MacAddr> for String {
    fn from(value: MacAddr) -> Self { value.to_string() }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn interface_address_uses_cidr_wire_form() {
        let net: Ipv4Net = serde_json::from_str("\"10.1.2.3/16\"").expect("deserialise");
        assert_eq!(net.addr().octets(), [10, 1, 2, 3]);
        assert_eq!(net.prefix_len(), 16);
        assert_eq!(serde_json::to_string(&net).expect("serialise"), "\"10.1.2.3/16\"");
        assert!(serde_json::from_str::<Ipv4Net>("\"10.0.0.1/33\"").is_err());
        assert!(serde_json::from_str::<Ipv4Net>("\"10.0.0.1\"").is_err());
    }

    #[test]
    fn unassigned_address_is_default() {
        assert_eq!(Ipv4Net::default().to_string(), "0.0.0.0/0");
    }

    #[rstest]
    #[case("02:00:5e:10:00:01", [2, 0, 0x5e, 0x10, 0, 1])]
    #[case("FF:FF:FF:FF:FF:FF", [0xff; 6])]
    fn mac_parses(#[case] input: &str, #[case] octets: [u8; 6]) {
        let mac: MacAddr = input.parse().expect("valid mac");
        assert_eq!(mac.octets(), octets);
        assert_eq!(mac.to_string(), input.to_ascii_lowercase());
    }

    #[rstest]
    #[case("02:00:5e:10:00")]
    #[case("02:00:5e:10:00:01:02")]
    #[case("2:0:5e:10:0:1")]
    #[case("zz:00:5e:10:00:01")]
    fn mac_rejects_malformed(#[case] input: &str) {
        assert_eq!(input.parse::<MacAddr>(), Err(MacParseError(input.to_owned())));
    }
}
