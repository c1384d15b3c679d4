// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! VLAN sub-interfaces.
//!
//! A sub-interface is keyed by its `(parent, vlan id)` pair. Configuration
//! programs the parent device: the VLAN filter for the id (best-effort, not
//! every device can filter) and the sub-interface's multicast MAC through
//! the parent's filter operations.

use crate::errors::CtlError;
use crate::iface::{
    Iface, IfaceFlags, SetAttrs, VlanConfig, iface_add_mac, iface_del_mac, port_id_of,
};
use crate::iface::{IfaceTable, VlanInfo};
use ahash::RandomState;
use ethdev::Ethdev;
use net::iface::IfaceId;
use net::vlan::Vid;
use std::collections::HashMap;

#[allow(unused)]
use tracing::{debug, error, info, warn};

/// The `(parent, vlan id)` index over sub-interfaces.
pub(crate) type VlanMap = HashMap<(IfaceId, Vid), IfaceId, RandomState>;

pub(crate) fn new_vlan_map() -> VlanMap {
    HashMap::with_hasher(RandomState::with_seed(0))
}

fn keep_first_error(status: &mut Result<(), CtlError>, result: Result<(), CtlError>) {
    if let Err(err) = result
        && status.is_ok()
    {
        *status = Err(err);
    }
}

//////////////////////////////////////////////////////////////////////
/// Initial configuration: full reconfig, with teardown of whatever
/// was partially set up on failure.
//////////////////////////////////////////////////////////////////////
pub(crate) fn init(
    drv: &mut dyn Ethdev,
    ifaces: &mut IfaceTable,
    vlans: &mut VlanMap,
    iface: &mut Iface,
    flags: IfaceFlags,
    mtu: u16,
    vrf_id: u16,
    cfg: &VlanConfig,
) -> Result<(), CtlError> {
    if let Err(err) = reconfig(
        drv,
        ifaces,
        vlans,
        iface,
        SetAttrs::ALL,
        flags,
        mtu,
        vrf_id,
        Some(cfg),
    ) {
        if let Err(fini_err) = fini(drv, ifaces, vlans, iface) {
            warn!("teardown after failed vlan init: {fini_err}");
        }
        return Err(err);
    }
    Ok(())
}

//////////////////////////////////////////////////////////////////////
/// Apply the attributes selected by `set_attrs` to a sub-interface.
///
/// Covers the full cross-product of initial/reconfig with parent or
/// vlan moves, MAC changes and plain attribute updates.
//////////////////////////////////////////////////////////////////////
#[allow(clippy::too_many_arguments)]
pub(crate) fn reconfig(
    drv: &mut dyn Ethdev,
    ifaces: &mut IfaceTable,
    vlans: &mut VlanMap,
    iface: &mut Iface,
    set_attrs: SetAttrs,
    flags: IfaceFlags,
    mtu: u16,
    vrf_id: u16,
    cfg: Option<&VlanConfig>,
) -> Result<(), CtlError> {
    // a full attribute mask is the initial configuration, anything else
    // reconfigures live state
    let initial = set_attrs == SetAttrs::ALL;
    let cur = iface
        .as_vlan()
        .ok_or(CtlError::InvalidArg("not a vlan sub-interface"))?
        .clone();

    if set_attrs.intersects(SetAttrs::VLAN_PARENT | SetAttrs::VLAN_ID) {
        let next = cfg.ok_or(CtlError::InvalidArg("missing vlan config"))?;
        let next_key = (next.parent, next.vlan_id);
        let next_port_id = port_id_of(ifaces, next.parent)?;

        if vlans.contains_key(&next_key) {
            return Err(CtlError::VlanInUse {
                parent: next.parent,
                vid: next.vlan_id,
            });
        }

        if !initial {
            vlans.remove(&(cur.parent, cur.vlan_id));
            if let Some(old_parent) = ifaces.get_mut(cur.parent) {
                old_parent.children.remove(&iface.id);
            }
            // best effort: the old device may not filter vlans at all
            match port_id_of(ifaces, cur.parent) {
                Ok(cur_port_id) => {
                    if let Err(err) = drv.vlan_filter(cur_port_id, cur.vlan_id.to_u16(), false) {
                        warn!("disable vlan {} filter: {err}", cur.vlan_id);
                    }
                }
                Err(err) => warn!("old vlan parent {} lookup: {err}", cur.parent),
            }
        }

        match drv.vlan_filter(next_port_id, next.vlan_id.to_u16(), true) {
            Ok(()) => {}
            Err(err) if err.is_unsupported() => {
                info!("port {next_port_id} cannot filter vlan {}: {err}", next.vlan_id);
            }
            Err(err) => return Err(err.into()),
        }

        if let Some(vlan) = iface.as_vlan_mut() {
            vlan.parent = next.parent;
            vlan.vlan_id = next.vlan_id;
        }
        if let Some(parent) = ifaces.get_mut(next.parent) {
            parent.children.insert(iface.id);
        }
        vlans.insert(next_key, iface.id);
    }

    if set_attrs.has(SetAttrs::VLAN_MAC) {
        let next = cfg.ok_or(CtlError::InvalidArg("missing vlan config"))?;
        if !next.mac.is_zero() && !next.mac.is_multicast() {
            return Err(CtlError::InvalidArg("vlan mac must be multicast"));
        }
        if !initial && !cur.mac.is_zero() {
            // drop the previous filter from the old parent, ignoring errors
            if let Err(err) = iface_del_mac(drv, ifaces, cur.parent, cur.mac) {
                warn!("remove mac {} from parent {}: {err}", cur.mac, cur.parent);
            }
        }
        let parent = iface
            .as_vlan()
            .map(|vlan| vlan.parent)
            .unwrap_or(cur.parent);
        if !next.mac.is_zero() {
            iface_add_mac(drv, ifaces, parent, next.mac)?;
        }
        if let Some(vlan) = iface.as_vlan_mut() {
            vlan.mac = next.mac;
        }
    }

    if set_attrs.has(SetAttrs::FLAGS) {
        iface.flags = flags;
    }
    if set_attrs.has(SetAttrs::MTU) {
        iface.mtu = mtu;
    }
    if set_attrs.has(SetAttrs::VRF) {
        iface.vrf_id = vrf_id;
    }
    Ok(())
}

//////////////////////////////////////////////////////////////////////
/// Tear a sub-interface down: drop the vlan key, disable the filter,
/// remove the multicast MAC from the parent and detach. Every step
/// runs; the first error is reported.
//////////////////////////////////////////////////////////////////////
pub(crate) fn fini(
    drv: &mut dyn Ethdev,
    ifaces: &mut IfaceTable,
    vlans: &mut VlanMap,
    iface: &mut Iface,
) -> Result<(), CtlError> {
    let vlan = iface
        .as_vlan()
        .ok_or(CtlError::InvalidArg("not a vlan sub-interface"))?
        .clone();
    let mut status = Ok(());

    vlans.remove(&(vlan.parent, vlan.vlan_id));

    match port_id_of(ifaces, vlan.parent) {
        Ok(port_id) => {
            if let Err(err) = drv.vlan_filter(port_id, vlan.vlan_id.to_u16(), false) {
                if err.is_unsupported() {
                    debug!("disable vlan {} filter: {err}", vlan.vlan_id);
                } else {
                    keep_first_error(&mut status, Err(err.into()));
                }
            }
        }
        Err(err) => keep_first_error(&mut status, Err(err)),
    }

    if !vlan.mac.is_zero() {
        keep_first_error(&mut status, iface_del_mac(drv, ifaces, vlan.parent, vlan.mac));
    }

    if let Some(parent) = ifaces.get_mut(vlan.parent) {
        parent.children.remove(&iface.id);
    }
    status
}

/// Look up the sub-interface claiming `(parent, vlan_id)`.
#[must_use]
pub fn vlan_iface(vlans: &VlanMap, parent: IfaceId, vlan_id: Vid) -> Option<IfaceId> {
    vlans.get(&(parent, vlan_id)).copied()
}
