// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Writer/reader handles over the IPv4 tables.
//!
//! The tables are wrapped in left-right: the single control thread owns the
//! [`Ip4TablesWriter`], validates every request against the published state,
//! and appends only changes that are guaranteed to apply cleanly. Datapath
//! threads hold [`Ip4TablesReader`] handles (cloned from the factory) and
//! read without locking.

use crate::errors::CtlError;
use crate::ip4::Ip4Tables;
use crate::ip4::nexthop::{Nexthop, NhFlags, NhId};
use left_right::{Absorb, ReadHandle, ReadHandleFactory, ReadGuard, WriteHandle};
use net::eth::Mac;
use net::iface::IfaceId;
use net::ipv4::Ipv4Prefix;
use std::net::Ipv4Addr;

#[allow(unused)]
use tracing::{debug, info, warn};

enum Ip4Change {
    NhAdd {
        host: Ipv4Addr,
        iface: IfaceId,
        mac: Mac,
    },
    NhDel {
        host: Ipv4Addr,
    },
    RouteAdd {
        dest: Ipv4Prefix,
        gw: Ipv4Addr,
    },
    RouteDel {
        dest: Ipv4Prefix,
    },
}

impl Absorb<Ip4Change> for Ip4Tables {
    fn absorb_first(&mut self, change: &mut Ip4Change, _: &Self) {
        match change {
            Ip4Change::NhAdd { host, iface, mac } => self.apply_nh_add(*host, *iface, *mac),
            Ip4Change::NhDel { host } => self.apply_nh_del(*host),
            Ip4Change::RouteAdd { dest, gw } => self.apply_route_add(*dest, *gw),
            Ip4Change::RouteDel { dest } => self.apply_route_del(*dest),
        }
    }

    fn sync_with(&mut self, first: &Self) {
        *self = first.clone();
    }
}

/// The control-thread write handle over the IPv4 tables.
pub struct Ip4TablesWriter(WriteHandle<Ip4Tables, Ip4Change>);

impl Ip4TablesWriter {
    /// Build the table pair and hand back the writer and one reader.
    #[must_use]
    pub fn new(nh_capacity: usize) -> (Self, Ip4TablesReader) {
        let (writer, reader) = left_right::new_from_empty::<Ip4Tables, Ip4Change>(
            Ip4Tables::with_nh_capacity(nh_capacity),
        );
        (Ip4TablesWriter(writer), Ip4TablesReader(reader))
    }

    fn view(&self) -> ReadGuard<'_, Ip4Tables> {
        self.0.enter().unwrap_or_else(|| unreachable!())
    }

    fn commit(&mut self, change: Ip4Change) {
        self.0.append(change);
        self.0.publish();
    }

    //////////////////////////////////////////////////////////////////
    /// Add a static next-hop and its host route.
    ///
    /// With `exist_ok`, re-adding an identical `(iface, mac)` body is
    /// an idempotent success; any other conflict is an error.
    //////////////////////////////////////////////////////////////////
    pub fn nh_add(
        &mut self,
        host: Ipv4Addr,
        iface: IfaceId,
        mac: Mac,
        exist_ok: bool,
    ) -> Result<(), CtlError> {
        if host.is_unspecified() {
            return Err(CtlError::InvalidArg("nexthop host cannot be zero"));
        }
        {
            let view = self.view();
            if let Some(idx) = view.nh().lookup(host) {
                let slot = view.nh().get(idx);
                if exist_ok && slot.iface == Some(iface) && slot.mac == mac {
                    return Ok(());
                }
                return Err(CtlError::NexthopExists(host));
            }
            if view.nh().is_full() {
                return Err(CtlError::NexthopTableFull);
            }
        }
        self.commit(Ip4Change::NhAdd { host, iface, mac });
        info!("added nexthop {host} via interface {iface}");
        Ok(())
    }

    //////////////////////////////////////////////////////////////////
    /// Delete a static next-hop.
    ///
    /// Refuses slots that routes still reference and slots carrying
    /// the implicit LOCAL/LINK reference. With `missing_ok`, deleting
    /// an absent host succeeds.
    //////////////////////////////////////////////////////////////////
    pub fn nh_del(&mut self, host: Ipv4Addr, missing_ok: bool) -> Result<(), CtlError> {
        {
            let view = self.view();
            let Some(idx) = view.nh().lookup(host) else {
                if missing_ok {
                    return Ok(());
                }
                return Err(CtlError::NoSuchNexthop(host));
            };
            let slot = view.nh().get(idx);
            if slot.flags.intersects(NhFlags::LOCAL | NhFlags::LINK) || slot.ref_count > 1 {
                return Err(CtlError::NexthopBusy(host));
            }
        }
        self.commit(Ip4Change::NhDel { host });
        info!("deleted nexthop {host}");
        Ok(())
    }

    //////////////////////////////////////////////////////////////////
    /// Install a route through an existing next-hop.
    //////////////////////////////////////////////////////////////////
    pub fn route_add(
        &mut self,
        dest: Ipv4Prefix,
        gw: Ipv4Addr,
        exist_ok: bool,
    ) -> Result<(), CtlError> {
        {
            let view = self.view();
            let Some(idx) = view.nh().lookup(gw) else {
                return Err(CtlError::NoSuchNexthop(gw));
            };
            if let Some(current) = view.routes().get(dest) {
                if exist_ok && current == idx {
                    return Ok(());
                }
                return Err(CtlError::RouteExists(dest));
            }
        }
        self.commit(Ip4Change::RouteAdd { dest, gw });
        info!("added route {dest} via {gw}");
        Ok(())
    }

    //////////////////////////////////////////////////////////////////
    /// Remove a route, releasing its next-hop reference.
    //////////////////////////////////////////////////////////////////
    pub fn route_del(&mut self, dest: Ipv4Prefix, missing_ok: bool) -> Result<(), CtlError> {
        {
            let view = self.view();
            if view.routes().get(dest).is_none() {
                if missing_ok {
                    return Ok(());
                }
                return Err(CtlError::NoSuchRoute(dest));
            }
        }
        self.commit(Ip4Change::RouteDel { dest });
        info!("deleted route {dest}");
        Ok(())
    }

    /// Longest-prefix match, resolving to the full next-hop body.
    pub fn route_get(&self, addr: Ipv4Addr) -> Result<Nexthop, CtlError> {
        let view = self.view();
        view.routes()
            .lookup(addr)
            .map(|idx| view.nh().get(idx).clone())
            .ok_or(CtlError::NetUnreachable(addr))
    }

    /// Snapshot of every allocated next-hop slot.
    #[must_use]
    pub fn nh_entries(&self) -> Vec<Nexthop> {
        self.view().nh().iter().map(|(_, slot)| slot.clone()).collect()
    }

    /// Snapshot of the installed routes with their next-hop bodies.
    #[must_use]
    pub fn route_entries(&self) -> Vec<(Ipv4Prefix, Nexthop)> {
        let view = self.view();
        view.routes()
            .iter()
            .map(|(prefix, idx)| (prefix, view.nh().get(idx).clone()))
            .collect()
    }

    /// A factory from which datapath readers are cloned.
    #[must_use]
    pub fn factory(&self) -> Ip4TablesReaderFactory {
        Ip4TablesReaderFactory(self.0.clone().factory())
    }
}

/// A lock-free read handle over the IPv4 tables.
pub struct Ip4TablesReader(ReadHandle<Ip4Tables>);

impl Ip4TablesReader {
    /// Longest-prefix match for a destination address.
    #[must_use]
    pub fn route_lookup(&self, addr: Ipv4Addr) -> Option<Nexthop> {
        let guard = self.0.enter()?;
        let idx = guard.routes().lookup(addr)?;
        Some(guard.nh().get(idx).clone())
    }

    /// Read one next-hop slot by its stable index.
    #[must_use]
    pub fn nh(&self, idx: NhId) -> Option<Nexthop> {
        let guard = self.0.enter()?;
        guard
            .nh()
            .iter()
            .find(|(slot_idx, _)| *slot_idx == idx)
            .map(|(_, slot)| slot.clone())
    }

    /// A factory producing more readers for other datapath threads.
    #[must_use]
    pub fn factory(&self) -> Ip4TablesReaderFactory {
        Ip4TablesReaderFactory(self.0.factory())
    }
}

/// Builds [`Ip4TablesReader`] handles; `Send` so workers can construct
/// their own handle on their own thread.
pub struct Ip4TablesReaderFactory(ReadHandleFactory<Ip4Tables>);

impl Ip4TablesReaderFactory {
    /// A new read handle.
    #[must_use]
    pub fn handle(&self) -> Ip4TablesReader {
        Ip4TablesReader(self.0.handle())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOST: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
    const MAC: Mac = Mac([0x02, 0, 0, 0, 0, 0x01]);

    fn iface() -> IfaceId {
        IfaceId::try_new(1).unwrap()
    }

    fn prefix(s: &str) -> Ipv4Prefix {
        s.parse().unwrap()
    }

    #[test]
    fn nh_add_is_idempotent_with_exist_ok() {
        let (mut writer, _reader) = Ip4TablesWriter::new(16);
        writer.nh_add(HOST, iface(), MAC, false).unwrap();

        let before: Vec<_> = writer.nh_entries();
        assert!(matches!(
            writer.nh_add(HOST, iface(), MAC, false),
            Err(CtlError::NexthopExists(_))
        ));
        writer.nh_add(HOST, iface(), MAC, true).unwrap();
        let after: Vec<_> = writer.nh_entries();
        assert_eq!(before.len(), after.len());
        assert_eq!(before[0].ref_count, after[0].ref_count);

        // same host, different body: conflict even with exist_ok
        let other = Mac([0x02, 0, 0, 0, 0, 0x02]);
        assert!(matches!(
            writer.nh_add(HOST, iface(), other, true),
            Err(CtlError::NexthopExists(_))
        ));
    }

    #[test]
    fn nh_del_missing_ok() {
        let (mut writer, _reader) = Ip4TablesWriter::new(16);
        assert!(matches!(
            writer.nh_del(HOST, false),
            Err(CtlError::NoSuchNexthop(_))
        ));
        writer.nh_del(HOST, true).unwrap();
    }

    #[test]
    fn zero_host_is_rejected() {
        let (mut writer, _reader) = Ip4TablesWriter::new(16);
        assert!(matches!(
            writer.nh_add(Ipv4Addr::UNSPECIFIED, iface(), MAC, false),
            Err(CtlError::InvalidArg(_))
        ));
    }

    #[test]
    fn busy_nexthop_cannot_be_deleted() {
        let (mut writer, _reader) = Ip4TablesWriter::new(16);
        writer.nh_add(HOST, iface(), MAC, false).unwrap();
        writer.route_add(prefix("10.0.0.0/24"), HOST, false).unwrap();

        assert!(matches!(
            writer.nh_del(HOST, false),
            Err(CtlError::NexthopBusy(_))
        ));
        writer.route_del(prefix("10.0.0.0/24"), false).unwrap();
        writer.nh_del(HOST, false).unwrap();
        assert!(writer.nh_entries().is_empty());
    }

    #[test]
    fn route_get_resolves_through_lpm() {
        let (mut writer, reader) = Ip4TablesWriter::new(16);
        writer.nh_add(HOST, iface(), MAC, false).unwrap();
        writer.route_add(prefix("10.0.0.0/8"), HOST, false).unwrap();

        let hop = writer.route_get(Ipv4Addr::new(10, 99, 0, 7)).unwrap();
        assert_eq!(hop.host, HOST);
        assert!(hop.flags.contains(NhFlags::GATEWAY));

        // the datapath reader observes the same state
        let hop = reader.route_lookup(Ipv4Addr::new(10, 99, 0, 7)).unwrap();
        assert_eq!(hop.mac, MAC);
        assert!(reader.route_lookup(Ipv4Addr::new(192, 168, 0, 1)).is_none());

        assert!(matches!(
            writer.route_get(Ipv4Addr::new(192, 168, 0, 1)),
            Err(CtlError::NetUnreachable(_))
        ));
    }

    #[test]
    fn route_add_requires_nexthop() {
        let (mut writer, _reader) = Ip4TablesWriter::new(16);
        assert!(matches!(
            writer.route_add(prefix("10.0.0.0/24"), HOST, false),
            Err(CtlError::NoSuchNexthop(_))
        ));
    }

    #[test]
    fn duplicate_route_semantics() {
        let (mut writer, _reader) = Ip4TablesWriter::new(16);
        writer.nh_add(HOST, iface(), MAC, false).unwrap();
        writer.route_add(prefix("10.0.0.0/24"), HOST, false).unwrap();

        assert!(matches!(
            writer.route_add(prefix("10.0.0.0/24"), HOST, false),
            Err(CtlError::RouteExists(_))
        ));
        writer.route_add(prefix("10.0.0.0/24"), HOST, true).unwrap();

        assert!(matches!(
            writer.route_del(prefix("10.1.0.0/24"), false),
            Err(CtlError::NoSuchRoute(_))
        ));
        writer.route_del(prefix("10.1.0.0/24"), true).unwrap();
    }
}
