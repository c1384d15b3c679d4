// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Interface identifiers and names.

use std::fmt::{Display, Formatter};
use std::num::NonZero;
use std::str::FromStr;

/// The stable identifier of a control-plane interface.
///
/// Ids are small, non-zero, and stable for the lifetime of the interface so
/// that the datapath can carry them as compact 16-bit handles.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct IfaceId(NonZero<u16>);

/// Error returned when constructing an [`IfaceId`] from zero.
#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("zero is not a legal interface id")]
pub struct InvalidIfaceId;

impl IfaceId {
    /// Create an [`IfaceId`] from a raw `u16`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidIfaceId`] if the value is zero.
    pub fn try_new(raw: u16) -> Result<Self, InvalidIfaceId> {
        NonZero::new(raw).map(IfaceId).ok_or(InvalidIfaceId)
    }

    /// The id as a raw `u16`.
    #[must_use]
    pub fn to_u16(self) -> u16 {
        self.0.get()
    }
}

impl TryFrom<u16> for IfaceId {
    type Error = InvalidIfaceId;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        IfaceId::try_new(value)
    }
}

impl From<IfaceId> for u16 {
    fn from(value: IfaceId) -> u16 {
        value.to_u16()
    }
}

impl Display for IfaceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A validated interface name: non-empty, at most [`IfaceName::MAX_LEN`]
/// bytes, no whitespace or path separators.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IfaceName(String);

/// Errors which can occur when validating an [`IfaceName`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum InvalidIfaceName {
    /// The empty string is not a name.
    #[error("interface name cannot be empty")]
    Empty,
    /// The name does not fit the fixed-size wire field.
    #[error("interface name longer than {max} bytes", max = IfaceName::MAX_LEN)]
    TooLong,
    /// Whitespace and '/' are not allowed in names.
    #[error("interface name contains an illegal character")]
    IllegalChar,
}

impl IfaceName {
    /// Longest accepted name, in bytes.
    pub const MAX_LEN: usize = 63;

    /// The name as a `&str`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for IfaceName {
    type Error = InvalidIfaceName;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        if value.is_empty() {
            return Err(InvalidIfaceName::Empty);
        }
        if value.len() > Self::MAX_LEN {
            return Err(InvalidIfaceName::TooLong);
        }
        if value.chars().any(|c| c.is_whitespace() || c == '/') {
            return Err(InvalidIfaceName::IllegalChar);
        }
        Ok(IfaceName(value.to_string()))
    }
}

impl TryFrom<String> for IfaceName {
    type Error = InvalidIfaceName;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        IfaceName::try_from(value.as_str())
    }
}

impl From<IfaceName> for String {
    fn from(value: IfaceName) -> String {
        value.0
    }
}

impl FromStr for IfaceName {
    type Err = InvalidIfaceName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        IfaceName::try_from(s)
    }
}

impl Display for IfaceName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_rejects_zero() {
        assert!(IfaceId::try_new(0).is_err());
        assert_eq!(IfaceId::try_new(7).unwrap().to_u16(), 7);
    }

    #[test]
    fn name_validation() {
        assert!(IfaceName::try_from("p0").is_ok());
        assert!(IfaceName::try_from("").is_err());
        assert!(IfaceName::try_from("a b").is_err());
        assert!(IfaceName::try_from("a/b").is_err());
        assert!(IfaceName::try_from("x".repeat(64).as_str()).is_err());
    }
}
