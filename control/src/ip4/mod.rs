// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! IPv4 forwarding state: the next-hop table and the route table.
//!
//! The two tables are coupled by reference counts (every route holds one
//! reference on its next-hop slot), so they live and are published together.
//! Control code mutates them through [`tablesrw::Ip4TablesWriter`]; datapath
//! threads read consistent snapshots through [`tablesrw::Ip4TablesReader`]
//! handles without taking locks.

pub mod nexthop;
pub mod route;
pub mod tablesrw;

use crate::ip4::nexthop::{NhFlags, NhTable};
use crate::ip4::route::RouteTable;
use net::eth::Mac;
use net::iface::IfaceId;
use net::ipv4::Ipv4Prefix;
use std::net::Ipv4Addr;

#[allow(unused)]
use tracing::{debug, warn};

/// The IPv4 forwarding tables, as one publishable unit.
#[derive(Clone)]
pub struct Ip4Tables {
    nh: NhTable,
    routes: RouteTable,
}

impl Ip4Tables {
    /// Empty tables with the next-hop array bounded at `nh_capacity`.
    #[must_use]
    pub fn with_nh_capacity(nh_capacity: usize) -> Self {
        Ip4Tables {
            nh: NhTable::with_capacity(nh_capacity),
            routes: RouteTable::new(),
        }
    }

    /// The next-hop table.
    #[must_use]
    pub fn nh(&self) -> &NhTable {
        &self.nh
    }

    /// The route table.
    #[must_use]
    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    // Change application below is deterministic: changes are validated
    // against the published state before being appended to the op-log, and
    // replay on both table copies in the same order.

    fn apply_nh_add(&mut self, host: Ipv4Addr, iface: IfaceId, mac: Mac) {
        let Ok(idx) = self.nh.lookup_or_insert(host) else {
            warn!("nexthop table overflow replaying add of {host}");
            return;
        };
        let slot = self.nh.get_mut(idx);
        slot.iface = Some(iface);
        slot.mac = mac;
        // last_seen stays unset: reachability is configured, not observed
        slot.flags = NhFlags::STATIC | NhFlags::REACHABLE;
        self.routes.insert(&mut self.nh, Ipv4Prefix::host(host), idx);
    }

    fn apply_nh_del(&mut self, host: Ipv4Addr) {
        if self.nh.lookup(host).is_some() {
            // the route deletion releases the last reference and frees the slot
            if let Err(err) = self.routes.remove(&mut self.nh, Ipv4Prefix::host(host)) {
                warn!("no host route replaying delete of {host}: {err}");
            }
        }
    }

    fn apply_route_add(&mut self, dest: Ipv4Prefix, gw: Ipv4Addr) {
        let Some(idx) = self.nh.lookup(gw) else {
            warn!("missing nexthop {gw} replaying route add of {dest}");
            return;
        };
        let slot = self.nh.get_mut(idx);
        slot.flags = slot.flags | NhFlags::GATEWAY;
        self.routes.insert(&mut self.nh, dest, idx);
    }

    fn apply_route_del(&mut self, dest: Ipv4Prefix) {
        if let Err(err) = self.routes.remove(&mut self.nh, dest) {
            warn!("replaying route delete of {dest}: {err}");
        }
    }
}
