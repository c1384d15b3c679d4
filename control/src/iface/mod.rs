// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Interface model and registry.
//!
//! Interfaces live in a dense table indexed by their stable [`IfaceId`]; the
//! id is the compact handle the datapath carries everywhere an interface is
//! referenced. The set of interface types is closed: per-type state is the
//! [`IfaceInfo`] tagged variant and lifecycle calls dispatch by matching on
//! it.

pub(crate) mod port;
pub mod vlan;

use crate::errors::CtlError;
use ethdev::{Ethdev, PktPool, PortId};
use net::eth::Mac;
use net::iface::{IfaceId, IfaceName};
use net::vlan::Vid;
use std::collections::BTreeSet;
use std::ops::BitOr;

#[allow(unused)]
use tracing::{debug, error, info};

/// The closed set of interface types.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[derive(serde::Serialize, serde::Deserialize)]
pub enum IfaceType {
    /// A NIC port bound through the driver probe mechanism.
    Port,
    /// An 802.1Q sub-interface of a port.
    Vlan,
}

/// Administrative interface flags.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct IfaceFlags(u16);

impl IfaceFlags {
    /// Administratively up.
    pub const UP: IfaceFlags = IfaceFlags(1 << 0);
    /// Receive all unicast frames.
    pub const PROMISC: IfaceFlags = IfaceFlags(1 << 1);
    /// Receive all multicast frames.
    pub const ALLMULTI: IfaceFlags = IfaceFlags(1 << 2);

    /// No flags set.
    #[must_use]
    pub const fn empty() -> Self {
        IfaceFlags(0)
    }

    /// True if every flag in `other` is set in `self`.
    #[must_use]
    pub const fn contains(self, other: IfaceFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Set or clear the flags in `other`.
    #[must_use]
    pub const fn with(self, other: IfaceFlags, on: bool) -> Self {
        if on {
            IfaceFlags(self.0 | other.0)
        } else {
            IfaceFlags(self.0 & !other.0)
        }
    }
}

impl BitOr for IfaceFlags {
    type Output = IfaceFlags;

    fn bitor(self, rhs: IfaceFlags) -> IfaceFlags {
        IfaceFlags(self.0 | rhs.0)
    }
}

/// Operational interface state bits.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct IfaceState(u16);

impl IfaceState {
    /// The link is up and the interface forwards.
    pub const RUNNING: IfaceState = IfaceState(1 << 0);

    /// True if every bit in `other` is set in `self`.
    #[must_use]
    pub const fn contains(self, other: IfaceState) -> bool {
        self.0 & other.0 == other.0
    }

    pub(crate) fn set_running(&mut self, running: bool) {
        if running {
            self.0 |= IfaceState::RUNNING.0;
        } else {
            self.0 &= !IfaceState::RUNNING.0;
        }
    }
}

/// Mask naming the attributes a reconfiguration applies; unset attributes
/// must be left untouched.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SetAttrs(u64);

impl SetAttrs {
    /// Administrative flags.
    pub const FLAGS: SetAttrs = SetAttrs(1 << 0);
    /// MTU.
    pub const MTU: SetAttrs = SetAttrs(1 << 1);
    /// VRF id.
    pub const VRF: SetAttrs = SetAttrs(1 << 2);
    /// Port: station MAC address.
    pub const PORT_MAC: SetAttrs = SetAttrs(1 << 8);
    /// Port: requested RX queue count.
    pub const PORT_N_RXQS: SetAttrs = SetAttrs(1 << 9);
    /// Port: TX queue count (driven by the worker count, not by requests).
    pub const PORT_N_TXQS: SetAttrs = SetAttrs(1 << 10);
    /// Port: RX ring size.
    pub const PORT_RXQ_SIZE: SetAttrs = SetAttrs(1 << 11);
    /// Port: TX ring size.
    pub const PORT_TXQ_SIZE: SetAttrs = SetAttrs(1 << 12);
    /// Vlan: parent interface.
    pub const VLAN_PARENT: SetAttrs = SetAttrs(1 << 16);
    /// Vlan: vlan id.
    pub const VLAN_ID: SetAttrs = SetAttrs(1 << 17);
    /// Vlan: multicast MAC programmed on the parent.
    pub const VLAN_MAC: SetAttrs = SetAttrs(1 << 18);
    /// Every attribute; used for initial configuration.
    pub const ALL: SetAttrs = SetAttrs(u64::MAX);

    /// True if every bit of `other` is set.
    #[must_use]
    pub const fn has(self, other: SetAttrs) -> bool {
        self.0 & other.0 == other.0
    }

    /// True if any bit of `other` is set.
    #[must_use]
    pub const fn intersects(self, other: SetAttrs) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for SetAttrs {
    type Output = SetAttrs;

    fn bitor(self, rhs: SetAttrs) -> SetAttrs {
        SetAttrs(self.0 | rhs.0)
    }
}

/// Requested configuration for a port interface.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortConfig {
    /// Driver argument string naming the device to bind.
    pub devargs: String,
    /// Station MAC; zero keeps the device default.
    pub mac: Mac,
    /// Requested RX queue count.
    pub n_rxqs: u16,
    /// Requested RX ring size; zero means driver default.
    pub rxq_size: u16,
    /// Requested TX ring size; zero means driver default.
    pub txq_size: u16,
}

/// Requested configuration for a VLAN sub-interface.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VlanConfig {
    /// Parent interface; must be a port.
    pub parent: IfaceId,
    /// VLAN id on the parent.
    pub vlan_id: Vid,
    /// Multicast MAC to program on the parent; zero for none.
    pub mac: Mac,
}

/// Per-type configuration carried by interface add/set requests.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IfaceInfoConfig {
    /// Port configuration.
    Port(PortConfig),
    /// VLAN sub-interface configuration.
    Vlan(VlanConfig),
}

impl IfaceInfoConfig {
    /// The interface type this configuration builds.
    #[must_use]
    pub fn iface_type(&self) -> IfaceType {
        match self {
            IfaceInfoConfig::Port(_) => IfaceType::Port,
            IfaceInfoConfig::Vlan(_) => IfaceType::Vlan,
        }
    }
}

/// A full interface configuration, as carried by `iface.add` / `iface.set`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IfaceConfig {
    /// Interface name, unique per type.
    pub name: IfaceName,
    /// Administrative flags.
    pub flags: IfaceFlags,
    /// MTU; zero reads the device default back.
    pub mtu: u16,
    /// VRF id.
    pub vrf_id: u16,
    /// Per-type configuration.
    pub info: IfaceInfoConfig,
}

/// Runtime state of a port interface.
#[derive(Debug)]
pub struct PortInfo {
    /// NIC port id assigned at probe time.
    pub port_id: PortId,
    /// The driver arguments the device was probed from.
    pub devargs: String,
    /// Configured station MAC.
    pub mac: Mac,
    /// Effective RX queue count.
    pub n_rxq: u16,
    /// Effective TX queue count; equals the worker count once configured.
    pub n_txq: u16,
    /// Effective RX ring size.
    pub rxq_size: u16,
    /// Effective TX ring size.
    pub txq_size: u16,
    /// The packet-buffer pool backing the RX queues; present iff configured.
    pub pool: Option<PktPool>,
    /// Whether the device-level configuration sequence has run.
    pub configured: bool,
}

impl PortInfo {
    pub(crate) fn new(port_id: PortId, devargs: String) -> Self {
        PortInfo {
            port_id,
            devargs,
            mac: Mac::ZERO,
            n_rxq: 0,
            n_txq: 0,
            rxq_size: 0,
            txq_size: 0,
            pool: None,
            configured: false,
        }
    }
}

/// Runtime state of a VLAN sub-interface.
#[derive(Clone, Debug)]
pub struct VlanInfo {
    /// The parent port interface.
    pub parent: IfaceId,
    /// VLAN id on the parent.
    pub vlan_id: Vid,
    /// Multicast MAC programmed on the parent; zero for none.
    pub mac: Mac,
}

/// The closed tagged variant of per-type interface state.
#[derive(Debug)]
pub enum IfaceInfo {
    /// Port state.
    Port(PortInfo),
    /// VLAN sub-interface state.
    Vlan(VlanInfo),
}

/// A control-plane interface: a NIC port or a VLAN sub-interface.
#[derive(Debug)]
pub struct Iface {
    /// Stable id, unique for the interface lifetime.
    pub id: IfaceId,
    /// Name, unique per type.
    pub name: IfaceName,
    /// Administrative flags.
    pub flags: IfaceFlags,
    /// Operational state.
    pub state: IfaceState,
    /// MTU.
    pub mtu: u16,
    /// VRF id.
    pub vrf_id: u16,
    /// Sub-interfaces parented here.
    pub children: BTreeSet<IfaceId>,
    /// Per-type state.
    pub info: IfaceInfo,
}

impl Iface {
    pub(crate) fn new(id: IfaceId, name: IfaceName, info: IfaceInfo) -> Self {
        Iface {
            id,
            name,
            flags: IfaceFlags::empty(),
            state: IfaceState::default(),
            mtu: 0,
            vrf_id: 0,
            children: BTreeSet::new(),
            info,
        }
    }

    /// The type tag of this interface.
    #[must_use]
    pub fn iface_type(&self) -> IfaceType {
        match &self.info {
            IfaceInfo::Port(_) => IfaceType::Port,
            IfaceInfo::Vlan(_) => IfaceType::Vlan,
        }
    }

    /// Port state, if this is a port.
    #[must_use]
    pub fn as_port(&self) -> Option<&PortInfo> {
        match &self.info {
            IfaceInfo::Port(port) => Some(port),
            IfaceInfo::Vlan(_) => None,
        }
    }

    pub(crate) fn as_port_mut(&mut self) -> Option<&mut PortInfo> {
        match &mut self.info {
            IfaceInfo::Port(port) => Some(port),
            IfaceInfo::Vlan(_) => None,
        }
    }

    /// VLAN state, if this is a sub-interface.
    #[must_use]
    pub fn as_vlan(&self) -> Option<&VlanInfo> {
        match &self.info {
            IfaceInfo::Vlan(vlan) => Some(vlan),
            IfaceInfo::Port(_) => None,
        }
    }

    pub(crate) fn as_vlan_mut(&mut self) -> Option<&mut VlanInfo> {
        match &mut self.info {
            IfaceInfo::Vlan(vlan) => Some(vlan),
            IfaceInfo::Port(_) => None,
        }
    }

    /// The MAC address of the interface, if it has one.
    #[must_use]
    pub fn mac(&self) -> Option<Mac> {
        match &self.info {
            IfaceInfo::Port(port) => Some(port.mac),
            IfaceInfo::Vlan(vlan) => Some(vlan.mac),
        }
    }
}

/// Upper bound on live interfaces.
pub const MAX_IFACES: usize = 1024;

/// A dense table of interfaces keyed by [`IfaceId`].
///
/// Slot `n` holds the interface with id `n + 1`; ids stay stable for the
/// interface's lifetime and are recycled only after deletion.
pub struct IfaceTable {
    slots: Vec<Option<Iface>>,
}

#[allow(clippy::new_without_default)]
impl IfaceTable {
    //////////////////////////////////////////////////////////////////
    /// Create an interface table. All interfaces live here.
    //////////////////////////////////////////////////////////////////
    #[must_use]
    pub fn new() -> Self {
        IfaceTable { slots: Vec::new() }
    }

    fn slot_of(id: IfaceId) -> usize {
        usize::from(id.to_u16()) - 1
    }

    //////////////////////////////////////////////////////////////////
    /// The id the next insertion will use, without reserving it.
    //////////////////////////////////////////////////////////////////
    pub(crate) fn next_free_id(&self) -> Result<IfaceId, CtlError> {
        let slot = self
            .slots
            .iter()
            .position(Option::is_none)
            .unwrap_or(self.slots.len());
        if slot >= MAX_IFACES {
            return Err(CtlError::IfaceTableFull);
        }
        #[allow(clippy::cast_possible_truncation)] // bounded by MAX_IFACES
        let raw = slot as u16 + 1;
        IfaceId::try_new(raw).map_err(|_| CtlError::IfaceTableFull)
    }

    //////////////////////////////////////////////////////////////////
    /// Insert a freshly initialized interface at its id.
    //////////////////////////////////////////////////////////////////
    pub(crate) fn insert(&mut self, iface: Iface) {
        let slot = Self::slot_of(iface.id);
        if slot >= self.slots.len() {
            self.slots.resize_with(slot + 1, || None);
        }
        debug_assert!(self.slots[slot].is_none());
        debug!("added interface '{}' with id {}", iface.name, iface.id);
        self.slots[slot] = Some(iface);
    }

    /// O(1) lookup by id.
    #[must_use]
    pub fn get(&self, id: IfaceId) -> Option<&Iface> {
        self.slots.get(Self::slot_of(id)).and_then(Option::as_ref)
    }

    pub(crate) fn get_mut(&mut self, id: IfaceId) -> Option<&mut Iface> {
        self.slots
            .get_mut(Self::slot_of(id))
            .and_then(Option::as_mut)
    }

    /// Whether an interface with this id exists.
    #[must_use]
    pub fn contains(&self, id: IfaceId) -> bool {
        self.get(id).is_some()
    }

    //////////////////////////////////////////////////////////////////
    /// Temporarily remove an interface, to reconfigure it against the
    /// rest of the table. Must be paired with [`IfaceTable::put`].
    //////////////////////////////////////////////////////////////////
    pub(crate) fn take(&mut self, id: IfaceId) -> Option<Iface> {
        self.slots.get_mut(Self::slot_of(id)).and_then(Option::take)
    }

    pub(crate) fn put(&mut self, iface: Iface) {
        let slot = Self::slot_of(iface.id);
        debug_assert!(self.slots[slot].is_none());
        self.slots[slot] = Some(iface);
    }

    /// Iterate over all interfaces, in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Iface> {
        self.slots.iter().filter_map(Option::as_ref)
    }

    /// Iterate over the interfaces of one type, in id order.
    pub fn iter_type(&self, ty: IfaceType) -> impl Iterator<Item = &Iface> {
        self.iter().filter(move |iface| iface.iface_type() == ty)
    }

    /// Find an interface by type and name.
    #[must_use]
    pub fn find_name(&self, ty: IfaceType, name: &IfaceName) -> Option<&Iface> {
        self.iter_type(ty).find(|iface| &iface.name == name)
    }

    /// Number of live interfaces.
    #[must_use]
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// True when no interface exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

//////////////////////////////////////////////////////////////////////
/// Resolve the NIC port id behind an interface that must be a port.
//////////////////////////////////////////////////////////////////////
pub(crate) fn port_id_of(ifaces: &IfaceTable, id: IfaceId) -> Result<PortId, CtlError> {
    let iface = ifaces.get(id).ok_or(CtlError::NoSuchIface(id))?;
    iface
        .as_port()
        .map(|port| port.port_id)
        .ok_or(CtlError::NotAPort(id))
}

//////////////////////////////////////////////////////////////////////
/// Add a MAC filter on an interface, dispatching by type: ports program
/// the device, sub-interfaces require a multicast MAC and delegate to
/// their parent.
//////////////////////////////////////////////////////////////////////
pub(crate) fn iface_add_mac(
    drv: &mut dyn Ethdev,
    ifaces: &IfaceTable,
    id: IfaceId,
    mac: Mac,
) -> Result<(), CtlError> {
    let mut target = id;
    loop {
        let iface = ifaces.get(target).ok_or(CtlError::NoSuchIface(target))?;
        match &iface.info {
            IfaceInfo::Port(port) => return Ok(drv.add_mac_filter(port.port_id, mac)?),
            IfaceInfo::Vlan(vlan) => {
                if !mac.is_multicast() {
                    return Err(CtlError::InvalidArg("mac filter must be multicast"));
                }
                target = vlan.parent;
            }
        }
    }
}

//////////////////////////////////////////////////////////////////////
/// Remove a MAC filter, with the same dispatch as [`iface_add_mac`].
//////////////////////////////////////////////////////////////////////
pub(crate) fn iface_del_mac(
    drv: &mut dyn Ethdev,
    ifaces: &IfaceTable,
    id: IfaceId,
    mac: Mac,
) -> Result<(), CtlError> {
    let mut target = id;
    loop {
        let iface = ifaces.get(target).ok_or(CtlError::NoSuchIface(target))?;
        match &iface.info {
            IfaceInfo::Port(port) => return Ok(drv.del_mac_filter(port.port_id, mac)?),
            IfaceInfo::Vlan(vlan) => {
                if !mac.is_multicast() {
                    return Err(CtlError::InvalidArg("mac filter must be multicast"));
                }
                target = vlan.parent;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> IfaceName {
        IfaceName::try_from(s).unwrap()
    }

    fn vlan_iface(id: u16, parent: u16) -> Iface {
        Iface::new(
            IfaceId::try_new(id).unwrap(),
            name(&format!("vlan{id}")),
            IfaceInfo::Vlan(VlanInfo {
                parent: IfaceId::try_new(parent).unwrap(),
                vlan_id: Vid::new(100).unwrap(),
                mac: Mac::ZERO,
            }),
        )
    }

    #[test]
    fn dense_ids_and_lookup() {
        let mut table = IfaceTable::new();
        assert!(table.is_empty());

        let id1 = table.next_free_id().unwrap();
        assert_eq!(id1.to_u16(), 1);
        table.insert(vlan_iface(1, 99));

        let id2 = table.next_free_id().unwrap();
        assert_eq!(id2.to_u16(), 2);
        table.insert(vlan_iface(2, 99));

        assert_eq!(table.get(id1).unwrap().id, id1);
        assert_eq!(table.len(), 2);

        // deletion recycles the lowest id
        table.take(id1);
        assert_eq!(table.next_free_id().unwrap(), id1);
        assert!(table.get(id1).is_none());
        assert!(table.contains(id2));
    }

    #[test]
    fn typed_iteration() {
        let mut table = IfaceTable::new();
        table.insert(vlan_iface(1, 99));
        assert_eq!(table.iter_type(IfaceType::Vlan).count(), 1);
        assert_eq!(table.iter_type(IfaceType::Port).count(), 0);
        assert!(table.find_name(IfaceType::Vlan, &name("vlan1")).is_some());
        assert!(table.find_name(IfaceType::Port, &name("vlan1")).is_none());
    }

    #[test]
    fn flags_and_masks() {
        let flags = IfaceFlags::UP | IfaceFlags::PROMISC;
        assert!(flags.contains(IfaceFlags::UP));
        assert!(!flags.contains(IfaceFlags::ALLMULTI));
        assert!(!flags.with(IfaceFlags::UP, false).contains(IfaceFlags::UP));

        let attrs = SetAttrs::FLAGS | SetAttrs::MTU;
        assert!(attrs.has(SetAttrs::FLAGS));
        assert!(attrs.intersects(SetAttrs::MTU | SetAttrs::VRF));
        assert!(!attrs.has(SetAttrs::MTU | SetAttrs::VRF));
        assert!(SetAttrs::ALL.has(attrs));
    }
}
