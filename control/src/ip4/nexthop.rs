// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The IPv4 next-hop table.
//!
//! Next-hops live in a dense array addressed by stable [`NhId`] indices,
//! paired with an address-to-index hash. The datapath and the route table
//! reference slots by index, never by pointer, so the array is never
//! reallocated and live reconfiguration cannot dangle a reference. A slot is
//! occupied while its reference count is at least one; the count dropping to
//! zero erases the hash entry and clears the slot for reuse.

use crate::errors::CtlError;
use ahash::RandomState;
use net::eth::Mac;
use net::iface::IfaceId;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::ops::BitOr;
use std::time::Instant;

#[allow(unused)]
use tracing::{debug, info, warn};

/// Next-hop state flags.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct NhFlags(u16);

impl NhFlags {
    /// Configured by an operator, never aged out.
    pub const STATIC: NhFlags = NhFlags(1 << 0);
    /// The link-layer address is usable.
    pub const REACHABLE: NhFlags = NhFlags(1 << 1);
    /// The address is local to the router.
    pub const LOCAL: NhFlags = NhFlags(1 << 2);
    /// The slot stands for an attached subnet.
    pub const LINK: NhFlags = NhFlags(1 << 3);
    /// At least one route reaches this hop through a gateway.
    pub const GATEWAY: NhFlags = NhFlags(1 << 4);
    /// Resolution is in flight.
    pub const PENDING: NhFlags = NhFlags(1 << 5);

    /// True if every flag in `other` is set.
    #[must_use]
    pub const fn contains(self, other: NhFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// True if any flag in `other` is set.
    #[must_use]
    pub const fn intersects(self, other: NhFlags) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for NhFlags {
    type Output = NhFlags;

    fn bitor(self, rhs: NhFlags) -> NhFlags {
        NhFlags(self.0 | rhs.0)
    }
}

/// The stable index of a next-hop slot.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct NhId(pub u32);

/// One next-hop slot.
#[derive(Clone, Debug)]
pub struct Nexthop {
    /// The IPv4 address of the hop.
    pub host: Ipv4Addr,
    /// Link-layer address; zero while unresolved.
    pub mac: Mac,
    /// The interface packets to this hop leave through.
    pub iface: Option<IfaceId>,
    /// State flags.
    pub flags: NhFlags,
    /// References held by routes, plus the implicit one of LOCAL/LINK slots.
    pub ref_count: u32,
    /// When reachability was last confirmed; `None` if never.
    pub last_seen: Option<Instant>,
}

impl Default for Nexthop {
    fn default() -> Self {
        Nexthop {
            host: Ipv4Addr::UNSPECIFIED,
            mac: Mac::ZERO,
            iface: None,
            flags: NhFlags::default(),
            ref_count: 0,
            last_seen: None,
        }
    }
}

impl Nexthop {
    /// Age of the last reachability confirmation, in whole seconds.
    /// `None` when the hop was never confirmed reachable.
    #[must_use]
    pub fn age_secs(&self) -> Option<u64> {
        self.last_seen.map(|seen| seen.elapsed().as_secs())
    }

    /// True while the slot holds a live next-hop.
    #[must_use]
    pub fn occupied(&self) -> bool {
        self.ref_count >= 1
    }
}

/// Dense next-hop array plus the address-to-index hash.
#[derive(Clone)]
pub struct NhTable {
    slots: Vec<Nexthop>,
    by_addr: HashMap<Ipv4Addr, NhId, RandomState>,
    free: Vec<NhId>,
    capacity: usize,
}

impl NhTable {
    /// A table bounded at `capacity` slots.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        NhTable {
            slots: Vec::new(),
            by_addr: HashMap::with_hasher(RandomState::with_seed(0)),
            free: Vec::new(),
            capacity,
        }
    }

    /// Number of occupied or allocated slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_addr.len()
    }

    /// True when no slot is allocated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_addr.is_empty()
    }

    /// True when the table cannot allocate another slot.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.free.is_empty() && self.slots.len() >= self.capacity
    }

    /// The index of the slot holding `ip`, if any.
    #[must_use]
    pub fn lookup(&self, ip: Ipv4Addr) -> Option<NhId> {
        self.by_addr.get(&ip).copied()
    }

    /// Read a slot by index.
    ///
    /// No occupancy check: the datapath reads whatever the index names.
    ///
    /// # Panics
    ///
    /// Panics if the index was never allocated.
    #[must_use]
    pub fn get(&self, idx: NhId) -> &Nexthop {
        &self.slots[idx.0 as usize]
    }

    pub(crate) fn get_mut(&mut self, idx: NhId) -> &mut Nexthop {
        &mut self.slots[idx.0 as usize]
    }

    //////////////////////////////////////////////////////////////////
    /// Find the slot for `ip`, allocating an empty one (refcount 0,
    /// address set) when absent. The caller populates the slot and
    /// takes a reference through the route table.
    //////////////////////////////////////////////////////////////////
    pub(crate) fn lookup_or_insert(&mut self, ip: Ipv4Addr) -> Result<NhId, CtlError> {
        if let Some(idx) = self.lookup(ip) {
            return Ok(idx);
        }
        let idx = match self.free.pop() {
            Some(idx) => idx,
            None => {
                if self.slots.len() >= self.capacity {
                    return Err(CtlError::NexthopTableFull);
                }
                #[allow(clippy::cast_possible_truncation)] // capacity bounds the index
                let idx = NhId(self.slots.len() as u32);
                self.slots.push(Nexthop::default());
                idx
            }
        };
        self.by_addr.insert(ip, idx);
        let slot = self.get_mut(idx);
        *slot = Nexthop::default();
        slot.host = ip;
        Ok(idx)
    }

    /// Take a reference on a slot.
    pub(crate) fn incref(&mut self, idx: NhId) {
        self.get_mut(idx).ref_count += 1;
    }

    //////////////////////////////////////////////////////////////////
    /// Release one reference. The 1 -> 0 transition erases the hash
    /// entry, clears the slot and recycles the index.
    //////////////////////////////////////////////////////////////////
    pub(crate) fn decref(&mut self, idx: NhId) {
        let slot = self.get_mut(idx);
        if slot.ref_count <= 1 {
            let host = slot.host;
            *slot = Nexthop::default();
            self.by_addr.remove(&host);
            self.free.push(idx);
            debug!("freed nexthop slot {} ({host})", idx.0);
        } else {
            slot.ref_count -= 1;
        }
    }

    /// Iterate over the allocated slots.
    pub fn iter(&self) -> impl Iterator<Item = (NhId, &Nexthop)> {
        self.by_addr.values().map(|&idx| (idx, self.get(idx)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOST: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);

    #[test]
    fn slot_lifecycle() {
        let mut table = NhTable::with_capacity(4);
        assert!(table.lookup(HOST).is_none());

        let idx = table.lookup_or_insert(HOST).unwrap();
        assert_eq!(table.lookup(HOST), Some(idx));
        assert_eq!(table.get(idx).host, HOST);
        assert!(!table.get(idx).occupied());

        // allocation is idempotent while the slot exists
        assert_eq!(table.lookup_or_insert(HOST).unwrap(), idx);

        table.incref(idx);
        table.incref(idx);
        assert!(table.get(idx).occupied());

        table.decref(idx);
        assert!(table.lookup(HOST).is_some());
        table.decref(idx);
        assert!(table.lookup(HOST).is_none());
        assert!(!table.get(idx).occupied());
    }

    #[test]
    fn indices_are_recycled_and_stable() {
        let mut table = NhTable::with_capacity(2);
        let a = table.lookup_or_insert(Ipv4Addr::new(10, 0, 0, 1)).unwrap();
        let b = table.lookup_or_insert(Ipv4Addr::new(10, 0, 0, 2)).unwrap();
        assert_ne!(a, b);
        assert!(table.is_full());
        assert!(matches!(
            table.lookup_or_insert(Ipv4Addr::new(10, 0, 0, 3)),
            Err(CtlError::NexthopTableFull)
        ));

        table.incref(a);
        table.decref(a);
        // the freed index is reused, the other slot is untouched
        let c = table.lookup_or_insert(Ipv4Addr::new(10, 0, 0, 3)).unwrap();
        assert_eq!(c, a);
        assert_eq!(table.get(b).host, Ipv4Addr::new(10, 0, 0, 2));
    }

    #[test]
    fn occupancy_matches_hash_presence() {
        let mut table = NhTable::with_capacity(8);
        for octet in 1..=5u8 {
            let ip = Ipv4Addr::new(192, 168, 0, octet);
            let idx = table.lookup_or_insert(ip).unwrap();
            table.incref(idx);
        }
        for (idx, slot) in table.iter() {
            assert!(slot.occupied());
            assert_eq!(table.lookup(slot.host), Some(idx));
        }
        assert_eq!(table.len(), 5);
    }
}
