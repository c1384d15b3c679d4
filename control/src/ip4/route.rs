// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The IPv4 route table.
//!
//! A longest-prefix-match trie from prefixes to next-hop indices. Every
//! installed route holds exactly one reference on its next-hop slot;
//! insertion and deletion drive the reference count so a slot can never be
//! freed while a route still names it.

use crate::errors::CtlError;
use crate::ip4::nexthop::{NhId, NhTable};
use net::ipv4::Ipv4Prefix;
use prefix_trie::PrefixMap;
use std::net::Ipv4Addr;

#[allow(unused)]
use tracing::{debug, info};

/// The LPM prefix-to-nexthop mapping.
#[derive(Clone)]
pub struct RouteTable {
    map: PrefixMap<Ipv4Prefix, NhId>,
}

impl Default for RouteTable {
    fn default() -> Self {
        RouteTable::new()
    }
}

impl RouteTable {
    /// An empty route table.
    #[must_use]
    pub fn new() -> Self {
        RouteTable {
            map: PrefixMap::new(),
        }
    }

    /// Number of installed routes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.iter().count()
    }

    /// True when no route is installed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    //////////////////////////////////////////////////////////////////
    /// Install a route and take a reference on its next-hop slot.
    /// Reinserting the same prefix with the same index is a no-op;
    /// with a different index the route is replaced and the previous
    /// slot released.
    //////////////////////////////////////////////////////////////////
    pub(crate) fn insert(&mut self, nh: &mut NhTable, prefix: Ipv4Prefix, idx: NhId) {
        if self.map.get(&prefix) == Some(&idx) {
            return;
        }
        let previous = self.map.insert(prefix, idx);
        nh.incref(idx);
        if let Some(previous) = previous {
            nh.decref(previous);
        }
        debug!("route {prefix} -> nexthop slot {}", idx.0);
    }

    //////////////////////////////////////////////////////////////////
    /// Remove a route and release the reference it held.
    //////////////////////////////////////////////////////////////////
    pub(crate) fn remove(&mut self, nh: &mut NhTable, prefix: Ipv4Prefix) -> Result<(), CtlError> {
        let idx = self
            .map
            .remove(&prefix)
            .ok_or(CtlError::NoSuchRoute(prefix))?;
        nh.decref(idx);
        debug!("removed route {prefix}");
        Ok(())
    }

    /// The index installed for exactly `prefix`, if any.
    #[must_use]
    pub fn get(&self, prefix: Ipv4Prefix) -> Option<NhId> {
        self.map.get(&prefix).copied()
    }

    /// Longest-prefix match for a destination address.
    #[must_use]
    pub fn lookup(&self, addr: Ipv4Addr) -> Option<NhId> {
        self.map
            .get_lpm(&Ipv4Prefix::host(addr))
            .map(|(_, &idx)| idx)
    }

    /// Iterate over the installed routes.
    pub fn iter(&self) -> impl Iterator<Item = (Ipv4Prefix, NhId)> + '_ {
        self.map.iter().map(|(prefix, &idx)| (*prefix, idx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefix(s: &str) -> Ipv4Prefix {
        s.parse().unwrap()
    }

    fn tables() -> (NhTable, RouteTable, NhId, NhId) {
        let mut nh = NhTable::with_capacity(16);
        let a = nh.lookup_or_insert(Ipv4Addr::new(10, 0, 0, 1)).unwrap();
        let b = nh.lookup_or_insert(Ipv4Addr::new(10, 0, 0, 2)).unwrap();
        // keep both slots alive independently of the routes under test
        nh.incref(a);
        nh.incref(b);
        (nh, RouteTable::new(), a, b)
    }

    #[test]
    fn insert_holds_one_reference() {
        let (mut nh, mut routes, a, _) = tables();
        routes.insert(&mut nh, prefix("10.0.0.0/24"), a);
        assert_eq!(nh.get(a).ref_count, 2);

        // same prefix, same index: nothing moves
        routes.insert(&mut nh, prefix("10.0.0.0/24"), a);
        assert_eq!(nh.get(a).ref_count, 2);

        routes.remove(&mut nh, prefix("10.0.0.0/24")).unwrap();
        assert_eq!(nh.get(a).ref_count, 1);
        assert!(matches!(
            routes.remove(&mut nh, prefix("10.0.0.0/24")),
            Err(CtlError::NoSuchRoute(_))
        ));
    }

    #[test]
    fn reinsert_with_other_index_swaps_references() {
        let (mut nh, mut routes, a, b) = tables();
        routes.insert(&mut nh, prefix("10.0.0.0/24"), a);
        routes.insert(&mut nh, prefix("10.0.0.0/24"), b);
        assert_eq!(nh.get(a).ref_count, 1);
        assert_eq!(nh.get(b).ref_count, 2);
        assert_eq!(routes.get(prefix("10.0.0.0/24")), Some(b));
        assert_eq!(routes.len(), 1);
    }

    #[test]
    fn longest_prefix_wins() {
        let (mut nh, mut routes, a, b) = tables();
        routes.insert(&mut nh, prefix("10.0.0.0/8"), a);
        routes.insert(&mut nh, prefix("10.1.0.0/16"), b);

        assert_eq!(routes.lookup(Ipv4Addr::new(10, 1, 2, 3)), Some(b));
        assert_eq!(routes.lookup(Ipv4Addr::new(10, 2, 2, 3)), Some(a));
        assert_eq!(routes.lookup(Ipv4Addr::new(192, 168, 0, 1)), None);
    }
}
