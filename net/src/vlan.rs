// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! VLAN id validation.

use std::num::NonZero;

/// A VLAN Identifier.
///
/// This type is `#[repr(transparent)]` over [`NonZero<u16>`], so `Option<Vid>`
/// costs no more than a bare `u16`. Constructing a [`Vid`] proves the value
/// is in the legal 802.1Q range (1..=4094).
#[repr(transparent)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct Vid(NonZero<u16>);

/// Errors which can occur when converting a `u16` to a validated [`Vid`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[must_use]
pub enum InvalidVid {
    /// 0 is reserved and means "the native vlan"; it is not a legal [`Vid`] here.
    #[error("zero is a reserved vlan id")]
    Zero,
    /// 4095 is reserved by the standard.
    #[error("4095 is a reserved vlan id")]
    Reserved,
    /// The value does not fit in the 12-bit id space.
    #[error("{0} is too large to be a legal vlan id (max is 4094)")]
    TooLarge(u16),
}

impl Vid {
    /// The minimum legal [`Vid`] value (1).
    pub const MIN: u16 = 1;
    /// The maximum legal [`Vid`] value (4094).
    pub const MAX: u16 = 4094;

    /// Create a new [`Vid`] from a `u16`.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is 0, 4095, or greater than [`Vid::MAX`].
    pub fn new(vid: u16) -> Result<Self, InvalidVid> {
        match NonZero::new(vid) {
            None => Err(InvalidVid::Zero),
            Some(val) if val.get() == Vid::MAX + 1 => Err(InvalidVid::Reserved),
            Some(val) if val.get() > Vid::MAX + 1 => Err(InvalidVid::TooLarge(val.get())),
            Some(val) => Ok(Vid(val)),
        }
    }

    /// Get the value of the [`Vid`] as a `u16`.
    #[must_use]
    pub fn to_u16(self) -> u16 {
        self.0.get()
    }
}

impl TryFrom<u16> for Vid {
    type Error = InvalidVid;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Vid::new(value)
    }
}

impl From<Vid> for u16 {
    fn from(vid: Vid) -> u16 {
        vid.to_u16()
    }
}

impl std::fmt::Display for Vid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legal_range() {
        bolero::check!().with_type().cloned().for_each(|raw: u16| {
            match Vid::new(raw) {
                Ok(vid) => {
                    assert!(raw >= Vid::MIN && raw <= Vid::MAX);
                    assert_eq!(vid.to_u16(), raw);
                    assert_eq!(u16::from(vid), raw);
                }
                Err(InvalidVid::Zero) => assert_eq!(raw, 0),
                Err(InvalidVid::Reserved) => assert_eq!(raw, 4095),
                Err(InvalidVid::TooLarge(val)) => {
                    assert_eq!(val, raw);
                    assert!(raw > 4095);
                }
            }
        });
    }
}
