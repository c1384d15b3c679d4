//! Mac address type and logic.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// A [MAC Address] type.
///
/// `Mac` is a transparent wrapper around `[u8; 6]` which provides a
/// small collection of predicates and type safety.
///
/// [MAC Address]: https://en.wikipedia.org/wiki/MAC_address
#[must_use]
#[repr(transparent)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct Mac(pub [u8; 6]);

impl From<[u8; 6]> for Mac {
    fn from(value: [u8; 6]) -> Self {
        Mac(value)
    }
}

impl From<Mac> for [u8; 6] {
    fn from(value: Mac) -> Self {
        value.0
    }
}

impl Mac {
    /// The broadcast `Mac`.
    pub const BROADCAST: Mac = Mac([u8::MAX; 6]);
    /// The zero `Mac`.
    ///
    /// Control APIs use `ZERO` as "not set"; it is illegal on the wire.
    pub const ZERO: Mac = Mac([0; 6]);

    /// Returns true iff the least significant bit of the first octet is one.
    #[must_use]
    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 == 0x01
    }

    /// Returns true iff the least significant bit of the first octet is zero.
    #[must_use]
    pub fn is_unicast(&self) -> bool {
        !self.is_multicast()
    }

    /// Returns true iff the binary representation of the [`Mac`] is exclusively zeros.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self == &Mac::ZERO
    }

    /// Returns true iff the [`Mac`] is a legal source address (not zero, not multicast).
    #[must_use]
    pub fn is_valid_src(&self) -> bool {
        !self.is_zero() && !self.is_multicast()
    }
}

impl Display for Mac {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let m = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            m[0], m[1], m[2], m[3], m[4], m[5]
        )
    }
}

/// Error returned when a string cannot be parsed as a [`Mac`].
#[derive(Debug, thiserror::Error)]
#[error("invalid mac address: {0}")]
pub struct MacParseError(String);

impl FromStr for Mac {
    type Err = MacParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut mac = [0u8; 6];
        let mut parts = s.split(':');
        for octet in &mut mac {
            let part = parts.next().ok_or_else(|| MacParseError(s.to_string()))?;
            *octet = u8::from_str_radix(part, 16).map_err(|_| MacParseError(s.to_string()))?;
        }
        if parts.next().is_some() {
            return Err(MacParseError(s.to_string()));
        }
        Ok(Mac(mac))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multicast_bit() {
        let mcast: Mac = "01:00:5e:00:00:01".parse().unwrap();
        assert!(mcast.is_multicast());
        assert!(!mcast.is_valid_src());

        let ucast = Mac([0x02, 0, 0, 0, 0, 0x01]);
        assert!(ucast.is_unicast());
        assert!(ucast.is_valid_src());
    }

    #[test]
    fn parse_roundtrip() {
        let mac = Mac([0xde, 0xad, 0xbe, 0xef, 0x00, 0x01]);
        assert_eq!(mac.to_string().parse::<Mac>().unwrap(), mac);
        assert!("de:ad:be:ef:00".parse::<Mac>().is_err());
        assert!("de:ad:be:ef:00:01:02".parse::<Mac>().is_err());
        assert!("zz:ad:be:ef:00:01".parse::<Mac>().is_err());
    }

    #[test]
    fn zero_is_not_a_source() {
        assert!(Mac::ZERO.is_zero());
        assert!(!Mac::ZERO.is_valid_src());
        assert!(Mac::BROADCAST.is_multicast());
    }
}
