// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Checked IPv4 prefixes.

use ipnet::Ipv4Net;
use prefix_trie::Prefix;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::net::Ipv4Addr;
use std::str::FromStr;
use tracing::debug;

/// An `Ipv4Addr` with a mask describing a network in CIDR notation.
///
/// Unlike [`Ipv4Net`] from the `ipnet` crate, this type ensures that only
/// network bits are set in the address, so two equal networks always compare
/// equal.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(Serialize, Deserialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct Ipv4Prefix(Ipv4Net);

/// A checked prefix length in 0..=32.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(Serialize, Deserialize)]
#[repr(transparent)]
#[serde(try_from = "u8", into = "u8")]
pub struct Ipv4PrefixLen(u8);

/// Errors which can occur when building an [`Ipv4Prefix`].
#[derive(Debug, thiserror::Error)]
pub enum InvalidIpv4Prefix {
    /// The prefix length exceeds 32.
    #[error("invalid prefix length {0}, max is 32")]
    BadLength(u8),
    /// The address has bits set below the mask.
    #[error("address {0}/{1} contains non-network bits")]
    NonNetworkBits(Ipv4Addr, u8),
    /// The string is not `a.b.c.d/len`.
    #[error("cannot parse '{0}' as an ipv4 prefix")]
    Unparseable(String),
}

impl Ipv4PrefixLen {
    /// The longest possible IPv4 prefix (/32).
    pub const MAX: Ipv4PrefixLen = Ipv4PrefixLen(32);

    /// Checked constructor.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidIpv4Prefix::BadLength`] for lengths above 32.
    pub const fn try_new(len: u8) -> Result<Self, InvalidIpv4Prefix> {
        if len > 32 {
            return Err(InvalidIpv4Prefix::BadLength(len));
        }
        Ok(Ipv4PrefixLen(len))
    }

    /// The length as a `u8`.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self.0
    }

    /// The network mask selecting the bits covered by this length.
    #[must_use]
    pub const fn mask(self) -> u32 {
        if self.0 == 0 {
            0
        } else {
            (!0u32) << (32 - self.0)
        }
    }
}

impl TryFrom<u8> for Ipv4PrefixLen {
    type Error = InvalidIpv4Prefix;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ipv4PrefixLen::try_new(value)
    }
}

impl From<Ipv4PrefixLen> for u8 {
    fn from(value: Ipv4PrefixLen) -> u8 {
        value.0
    }
}

impl Ipv4Prefix {
    /// The default route, 0.0.0.0/0.
    pub const DEFAULT: Ipv4Prefix = Ipv4Prefix(Ipv4Net::new_assert(Ipv4Addr::UNSPECIFIED, 0));

    /// Build a prefix, rejecting addresses with set non-network bits.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidIpv4Prefix`] on a bad length or host bits below the mask.
    pub fn new(addr: Ipv4Addr, len: u8) -> Result<Self, InvalidIpv4Prefix> {
        let len = Ipv4PrefixLen::try_new(len)?;
        if addr.to_bits() & len.mask() != addr.to_bits() {
            return Err(InvalidIpv4Prefix::NonNetworkBits(addr, len.as_u8()));
        }
        match Ipv4Net::new(addr, len.as_u8()) {
            Ok(net) => Ok(Ipv4Prefix(net)),
            Err(_) => Err(InvalidIpv4Prefix::BadLength(len.as_u8())),
        }
    }

    /// The /32 prefix covering exactly `addr`.
    #[must_use]
    pub fn host(addr: Ipv4Addr) -> Self {
        match Ipv4Net::new(addr, 32) {
            Ok(net) => Ipv4Prefix(net),
            Err(_) => unreachable!(),
        }
    }

    /// Returns the address of the network.
    #[must_use]
    pub const fn address(&self) -> Ipv4Addr {
        self.0.addr()
    }

    /// Returns the prefix length of the network.
    #[must_use]
    pub const fn length(&self) -> Ipv4PrefixLen {
        Ipv4PrefixLen(self.0.prefix_len())
    }

    /// True if `addr` falls inside this network.
    #[must_use]
    pub fn covers(&self, addr: Ipv4Addr) -> bool {
        self.0.contains(&addr)
    }
}

impl Display for Ipv4Prefix {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Ipv4Prefix {
    type Err = InvalidIpv4Prefix;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let net =
            Ipv4Net::from_str(s).map_err(|_| InvalidIpv4Prefix::Unparseable(s.to_string()))?;
        Ipv4Prefix::new(net.addr(), net.prefix_len())
    }
}

impl Prefix for Ipv4Prefix {
    type R = u32;

    fn repr(&self) -> u32 {
        self.address().to_bits()
    }

    fn prefix_len(&self) -> u8 {
        self.length().as_u8()
    }

    fn from_repr_len(repr: u32, len: u8) -> Self {
        let len = if len > 32 {
            debug!("nonsense prefix length {len}, clamping to 32");
            32
        } else {
            len
        };
        let addr = Ipv4Addr::from_bits(repr & Ipv4PrefixLen(len).mask());
        match Ipv4Net::new(addr, len) {
            Ok(net) => Ipv4Prefix(net),
            Err(_) => unreachable!(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_host_bits() {
        assert!(Ipv4Prefix::new(Ipv4Addr::new(10, 0, 0, 1), 24).is_err());
        assert!(Ipv4Prefix::new(Ipv4Addr::new(10, 0, 0, 0), 24).is_ok());
        assert!(Ipv4Prefix::new(Ipv4Addr::new(10, 0, 0, 0), 33).is_err());
    }

    #[test]
    fn parse_and_display() {
        let p: Ipv4Prefix = "192.168.10.0/24".parse().unwrap();
        assert_eq!(p.address(), Ipv4Addr::new(192, 168, 10, 0));
        assert_eq!(p.length().as_u8(), 24);
        assert_eq!(p.to_string(), "192.168.10.0/24");
        assert!("192.168.10.1/24".parse::<Ipv4Prefix>().is_err());
    }

    #[test]
    fn coverage() {
        bolero::check!()
            .with_type()
            .cloned()
            .for_each(|(raw, len): (u32, u8)| {
                let len = len % 33;
                let addr = Ipv4Addr::from_bits(raw & Ipv4PrefixLen(len).mask());
                let prefix = Ipv4Prefix::new(addr, len).unwrap();
                assert!(prefix.covers(addr));
                assert_eq!(prefix, prefix.to_string().parse().unwrap());
                let host = Ipv4Prefix::host(Ipv4Addr::from_bits(raw));
                assert_eq!(host.length(), Ipv4PrefixLen::MAX);
                assert!(host.covers(Ipv4Addr::from_bits(raw)));
            });
    }
}
