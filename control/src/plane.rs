// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The control plane: authoritative tables plus request dispatch.

use crate::api::{CtlRequest, CtlResponse, IfaceDesc, IfaceInfoDesc, NhDesc, PortDesc, RouteDesc};
use crate::errors::CtlError;
use crate::iface::vlan::{VlanMap, new_vlan_map};
use crate::iface::{
    Iface, IfaceConfig, IfaceFlags, IfaceInfo, IfaceInfoConfig, IfaceTable, IfaceType, PortConfig,
    PortInfo, SetAttrs, VlanInfo, port, vlan,
};
use crate::ip4::tablesrw::{Ip4TablesReaderFactory, Ip4TablesWriter};
use crate::worker::WorkerSet;
use ahash::RandomState;
use derive_builder::Builder;
use ethdev::{Ethdev, PortId};
use net::eth::Mac;
use net::iface::{IfaceId, IfaceName};
use net::ipv4::Ipv4Prefix;
use std::collections::HashMap;
use std::net::Ipv4Addr;

#[allow(unused)]
use tracing::{debug, error, info};

const DEFAULT_NH_CAPACITY: usize = 1 << 15;

/// Parameters of a [`ControlPlane`]. N.B. we derive a builder type
/// `ControlPlaneParamsBuilder` and provide defaults for each field.
#[derive(Builder, Debug)]
pub struct ControlPlaneParams {
    /// Instance name, used in logs.
    #[builder(setter(into), default = "router".to_string())]
    name: String,

    /// Bound on the next-hop array.
    #[builder(default = DEFAULT_NH_CAPACITY)]
    nh_capacity: usize,
}

/// The control plane of the router.
///
/// Owns the interface registry, the NIC-port back-table, the VLAN index,
/// the datapath workers and the IPv4 tables, and reconciles all of them
/// with the driver as requests arrive. All methods run synchronously on
/// the single control thread.
pub struct ControlPlane<D: Ethdev> {
    name: String,
    drv: D,
    ifaces: IfaceTable,
    ports: HashMap<PortId, IfaceId, RandomState>,
    vlans: VlanMap,
    workers: WorkerSet,
    ip4: Ip4TablesWriter,
}

impl<D: Ethdev> ControlPlane<D> {
    /// Build a control plane over the given driver runtime.
    pub fn new(params: ControlPlaneParams, drv: D) -> Self {
        let (ip4, _) = Ip4TablesWriter::new(params.nh_capacity);
        info!("starting control plane '{}'", params.name);
        ControlPlane {
            name: params.name,
            drv,
            ifaces: IfaceTable::new(),
            ports: HashMap::with_hasher(RandomState::with_seed(0)),
            vlans: new_vlan_map(),
            workers: WorkerSet::new(),
            ip4,
        }
    }

    /// The instance name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The driver runtime, for introspection.
    #[must_use]
    pub fn driver(&self) -> &D {
        &self.drv
    }

    /// The interface registry, read-only.
    #[must_use]
    pub fn ifaces(&self) -> &IfaceTable {
        &self.ifaces
    }

    /// The datapath workers, read-only.
    #[must_use]
    pub fn workers(&self) -> &WorkerSet {
        &self.workers
    }

    /// A factory handing out IPv4 table readers to datapath threads.
    #[must_use]
    pub fn ip4_reader_factory(&self) -> Ip4TablesReaderFactory {
        self.ip4.factory()
    }

    //////////////////////////////////////////////////////////////////
    /// Dispatch one control request to its handler.
    //////////////////////////////////////////////////////////////////
    pub fn dispatch(&mut self, request: CtlRequest) -> Result<CtlResponse, CtlError> {
        match request {
            CtlRequest::PortAdd { name, devargs } => {
                self.port_add(&name, &devargs).map(CtlResponse::Port)
            }
            CtlRequest::PortDel { name } => self.port_del(&name).map(|()| CtlResponse::Empty),
            CtlRequest::PortGet { name } => self.port_get(&name).map(CtlResponse::Port),
            CtlRequest::PortList => Ok(CtlResponse::Ports(self.port_list()?)),
            CtlRequest::IfaceAdd { config } => self.iface_add(&config).map(CtlResponse::IfaceId),
            CtlRequest::IfaceSet {
                id,
                set_attrs,
                config,
            } => self
                .iface_set(id, set_attrs, &config)
                .map(|()| CtlResponse::Empty),
            CtlRequest::IfaceDel { id } => self.iface_del(id).map(|()| CtlResponse::Empty),
            CtlRequest::IfaceGet { id } => self.iface_get(id).map(CtlResponse::Iface),
            CtlRequest::IfaceList => Ok(CtlResponse::Ifaces(self.iface_list())),
            CtlRequest::Nh4Add {
                host,
                iface,
                mac,
                exist_ok,
            } => self
                .nh4_add(host, iface, mac, exist_ok)
                .map(|()| CtlResponse::Empty),
            CtlRequest::Nh4Del { host, missing_ok } => self
                .nh4_del(host, missing_ok)
                .map(|()| CtlResponse::Empty),
            CtlRequest::Nh4List => Ok(CtlResponse::Nexthops(self.nh4_list())),
            CtlRequest::Route4Add {
                dest,
                gw,
                exist_ok,
            } => self
                .route4_add(dest, gw, exist_ok)
                .map(|()| CtlResponse::Empty),
            CtlRequest::Route4Del { dest, missing_ok } => self
                .route4_del(dest, missing_ok)
                .map(|()| CtlResponse::Empty),
            CtlRequest::Route4Get { addr } => self.route4_get(addr).map(CtlResponse::Nexthop),
            CtlRequest::Route4List => Ok(CtlResponse::Routes(self.route4_list())),
        }
    }

    //////////////////////////////////////////////////////////////////
    /// Create an interface: allocate an id, run the type's initial
    /// configuration, and register the result. A failed init leaves
    /// no trace.
    //////////////////////////////////////////////////////////////////
    pub fn iface_add(&mut self, config: &IfaceConfig) -> Result<IfaceId, CtlError> {
        let ty = config.info.iface_type();
        if self.ifaces.find_name(ty, &config.name).is_some() {
            return Err(CtlError::NameInUse(config.name.clone()));
        }
        let id = self.ifaces.next_free_id()?;

        match &config.info {
            IfaceInfoConfig::Port(cfg) => {
                if self.drv.port_by_devargs(&cfg.devargs).is_some() {
                    return Err(CtlError::DeviceInUse(cfg.devargs.clone()));
                }
                let workers_before = self.workers.count();
                let port_id = self.drv.probe(&cfg.devargs)?;
                let mut iface = Iface::new(
                    id,
                    config.name.clone(),
                    IfaceInfo::Port(PortInfo::new(port_id, cfg.devargs.clone())),
                );
                if let Err(err) = port::init(
                    &mut self.drv,
                    &mut self.workers,
                    &mut iface,
                    config.flags,
                    config.mtu,
                    config.vrf_id,
                    cfg,
                ) {
                    // drop any worker that was created for this port only
                    self.workers.destroy_idle();
                    return Err(err);
                }
                self.ports.insert(port_id, id);
                self.ifaces.insert(iface);
                if self.workers.count() > workers_before {
                    // a new worker appeared; every other port owes it a tx queue
                    self.resize_tx_queues(Some(id))?;
                }
                Ok(id)
            }
            IfaceInfoConfig::Vlan(cfg) => {
                let mut iface = Iface::new(
                    id,
                    config.name.clone(),
                    IfaceInfo::Vlan(VlanInfo {
                        parent: cfg.parent,
                        vlan_id: cfg.vlan_id,
                        mac: Mac::ZERO,
                    }),
                );
                vlan::init(
                    &mut self.drv,
                    &mut self.ifaces,
                    &mut self.vlans,
                    &mut iface,
                    config.flags,
                    config.mtu,
                    config.vrf_id,
                    cfg,
                )?;
                self.ifaces.insert(iface);
                Ok(id)
            }
        }
    }

    //////////////////////////////////////////////////////////////////
    /// Reconfigure the attributes selected by the mask; unset
    /// attributes are left untouched.
    //////////////////////////////////////////////////////////////////
    pub fn iface_set(
        &mut self,
        id: IfaceId,
        set_attrs: SetAttrs,
        config: &IfaceConfig,
    ) -> Result<(), CtlError> {
        let mut iface = self.ifaces.take(id).ok_or(CtlError::NoSuchIface(id))?;
        let result = match iface.iface_type() {
            IfaceType::Port => {
                let cfg = match &config.info {
                    IfaceInfoConfig::Port(cfg) => Some(cfg),
                    IfaceInfoConfig::Vlan(_) => None,
                };
                port::reconfig(
                    &mut self.drv,
                    &mut self.workers,
                    &mut iface,
                    set_attrs,
                    config.flags,
                    config.mtu,
                    config.vrf_id,
                    cfg,
                )
            }
            IfaceType::Vlan => {
                let cfg = match &config.info {
                    IfaceInfoConfig::Vlan(cfg) => Some(cfg),
                    IfaceInfoConfig::Port(_) => None,
                };
                vlan::reconfig(
                    &mut self.drv,
                    &mut self.ifaces,
                    &mut self.vlans,
                    &mut iface,
                    set_attrs,
                    config.flags,
                    config.mtu,
                    config.vrf_id,
                    cfg,
                )
            }
        };
        self.ifaces.put(iface);
        result
    }

    //////////////////////////////////////////////////////////////////
    /// Destroy an interface. A port refuses while sub-interfaces
    /// still reference it; removing a port also prunes workers that
    /// lost their last RX queue and shrinks every surviving port's
    /// TX queue set to the new worker count.
    //////////////////////////////////////////////////////////////////
    pub fn iface_del(&mut self, id: IfaceId) -> Result<(), CtlError> {
        let mut iface = self.ifaces.take(id).ok_or(CtlError::NoSuchIface(id))?;
        if !iface.children.is_empty() {
            self.ifaces.put(iface);
            return Err(CtlError::HasChildren(id));
        }
        match iface.iface_type() {
            IfaceType::Port => {
                let port_id = iface
                    .as_port()
                    .map(|port| port.port_id)
                    .ok_or(CtlError::NotAPort(id))?;
                let result = port::fini(&mut self.drv, &mut self.workers, &mut iface);
                self.ports.remove(&port_id);
                if self.workers.destroy_idle() > 0 {
                    self.resize_tx_queues(None)?;
                }
                result
            }
            IfaceType::Vlan => vlan::fini(
                &mut self.drv,
                &mut self.ifaces,
                &mut self.vlans,
                &mut iface,
            ),
        }
    }

    /// Describe one interface.
    pub fn iface_get(&self, id: IfaceId) -> Result<IfaceDesc, CtlError> {
        let iface = self.ifaces.get(id).ok_or(CtlError::NoSuchIface(id))?;
        Ok(Self::iface_desc(iface))
    }

    /// Describe every interface, in id order.
    #[must_use]
    pub fn iface_list(&self) -> Vec<IfaceDesc> {
        self.ifaces.iter().map(Self::iface_desc).collect()
    }

    fn iface_desc(iface: &Iface) -> IfaceDesc {
        let info = match &iface.info {
            IfaceInfo::Port(port) => IfaceInfoDesc::Port {
                port_id: port.port_id.as_u16(),
                devargs: port.devargs.clone(),
                mac: port.mac,
                n_rxqs: port.n_rxq,
                n_txqs: port.n_txq,
            },
            IfaceInfo::Vlan(vlan) => IfaceInfoDesc::Vlan {
                parent: vlan.parent,
                vlan_id: vlan.vlan_id,
                mac: vlan.mac,
            },
        };
        IfaceDesc {
            id: iface.id,
            name: iface.name.clone(),
            iface_type: iface.iface_type(),
            flags: iface.flags,
            state: iface.state,
            mtu: iface.mtu,
            vrf_id: iface.vrf_id,
            info,
        }
    }

    //////////////////////////////////////////////////////////////////
    /// Probe a device and create a port interface with default
    /// attributes. The name and device conflicts are checked before
    /// anything touches the driver.
    //////////////////////////////////////////////////////////////////
    pub fn port_add(&mut self, name: &IfaceName, devargs: &str) -> Result<PortDesc, CtlError> {
        let config = IfaceConfig {
            name: name.clone(),
            flags: IfaceFlags::UP,
            mtu: 0,
            vrf_id: 0,
            info: IfaceInfoConfig::Port(PortConfig {
                devargs: devargs.to_string(),
                mac: Mac::ZERO,
                n_rxqs: 1,
                rxq_size: 0,
                txq_size: 0,
            }),
        };
        let id = self.iface_add(&config)?;
        self.port_desc(id)
    }

    /// Destroy the port with this name.
    pub fn port_del(&mut self, name: &IfaceName) -> Result<(), CtlError> {
        let id = self
            .ifaces
            .find_name(IfaceType::Port, name)
            .map(|iface| iface.id)
            .ok_or_else(|| CtlError::NoSuchPort(name.to_string()))?;
        self.iface_del(id)
    }

    /// Describe the port with this name.
    pub fn port_get(&self, name: &IfaceName) -> Result<PortDesc, CtlError> {
        let id = self
            .ifaces
            .find_name(IfaceType::Port, name)
            .map(|iface| iface.id)
            .ok_or_else(|| CtlError::NoSuchPort(name.to_string()))?;
        self.port_desc(id)
    }

    /// Describe every port, in id order.
    pub fn port_list(&self) -> Result<Vec<PortDesc>, CtlError> {
        self.ifaces
            .iter_type(IfaceType::Port)
            .map(|iface| self.port_desc(iface.id))
            .collect()
    }

    /// Build a port descriptor, reading MTU and MAC back from the device.
    fn port_desc(&self, id: IfaceId) -> Result<PortDesc, CtlError> {
        let iface = self.ifaces.get(id).ok_or(CtlError::NoSuchIface(id))?;
        let port = iface.as_port().ok_or(CtlError::NotAPort(id))?;
        let info = self.drv.info(port.port_id)?;
        Ok(PortDesc {
            id: iface.id,
            name: iface.name.clone(),
            port_id: port.port_id.as_u16(),
            device: info.device_name,
            mac: self.drv.mac_addr(port.port_id)?,
            mtu: self.drv.mtu(port.port_id)?,
            n_rxqs: port.n_rxq,
            n_txqs: port.n_txq,
            rxq_size: port.rxq_size,
            txq_size: port.txq_size,
        })
    }

    //////////////////////////////////////////////////////////////////
    /// After the worker count changed, resize every port's TX queue
    /// set to match, except the port that triggered the change.
    //////////////////////////////////////////////////////////////////
    fn resize_tx_queues(&mut self, skip: Option<IfaceId>) -> Result<(), CtlError> {
        let ids: Vec<IfaceId> = self
            .ifaces
            .iter_type(IfaceType::Port)
            .map(|iface| iface.id)
            .filter(|id| Some(*id) != skip)
            .collect();
        for id in ids {
            let Some(mut iface) = self.ifaces.take(id) else {
                continue;
            };
            let (flags, mtu, vrf_id) = (iface.flags, iface.mtu, iface.vrf_id);
            let result = port::reconfig(
                &mut self.drv,
                &mut self.workers,
                &mut iface,
                SetAttrs::PORT_N_TXQS,
                flags,
                mtu,
                vrf_id,
                None,
            );
            self.ifaces.put(iface);
            result?;
        }
        Ok(())
    }

    /// Add a static next-hop; see [`Ip4TablesWriter::nh_add`].
    pub fn nh4_add(
        &mut self,
        host: Ipv4Addr,
        iface: IfaceId,
        mac: Mac,
        exist_ok: bool,
    ) -> Result<(), CtlError> {
        if !self.ifaces.contains(iface) {
            return Err(CtlError::NoSuchIface(iface));
        }
        self.ip4.nh_add(host, iface, mac, exist_ok)
    }

    /// Delete a static next-hop; see [`Ip4TablesWriter::nh_del`].
    pub fn nh4_del(&mut self, host: Ipv4Addr, missing_ok: bool) -> Result<(), CtlError> {
        self.ip4.nh_del(host, missing_ok)
    }

    /// Describe every next-hop.
    #[must_use]
    pub fn nh4_list(&self) -> Vec<NhDesc> {
        self.ip4
            .nh_entries()
            .iter()
            .map(NhDesc::from)
            .collect()
    }

    /// Install a route; see [`Ip4TablesWriter::route_add`].
    pub fn route4_add(
        &mut self,
        dest: Ipv4Prefix,
        gw: Ipv4Addr,
        exist_ok: bool,
    ) -> Result<(), CtlError> {
        self.ip4.route_add(dest, gw, exist_ok)
    }

    /// Remove a route; see [`Ip4TablesWriter::route_del`].
    pub fn route4_del(&mut self, dest: Ipv4Prefix, missing_ok: bool) -> Result<(), CtlError> {
        self.ip4.route_del(dest, missing_ok)
    }

    /// Resolve the next-hop for a destination address.
    pub fn route4_get(&self, addr: Ipv4Addr) -> Result<NhDesc, CtlError> {
        self.ip4.route_get(addr).map(|nh| NhDesc::from(&nh))
    }

    /// Describe every installed route.
    #[must_use]
    pub fn route4_list(&self) -> Vec<RouteDesc> {
        self.ip4
            .route_entries()
            .iter()
            .map(|(dest, nh)| RouteDesc {
                dest: *dest,
                nexthop: nh.host,
            })
            .collect()
    }

    /// Look up the sub-interface claiming `(parent, vlan_id)`.
    #[must_use]
    pub fn vlan_iface(&self, parent: IfaceId, vlan_id: net::vlan::Vid) -> Option<IfaceId> {
        vlan::vlan_iface(&self.vlans, parent, vlan_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iface::IfaceState;
    use ethdev::null::NullEthdev;

    fn plane() -> ControlPlane<NullEthdev> {
        let params = ControlPlaneParamsBuilder::default()
            .name("test")
            .nh_capacity(64)
            .build()
            .unwrap();
        ControlPlane::new(params, NullEthdev::new())
    }

    fn name(s: &str) -> IfaceName {
        IfaceName::try_from(s).unwrap()
    }

    #[test]
    fn port_add_configures_device_and_workers() {
        let mut plane = plane();
        let desc = plane.port_add(&name("p0"), "p0").unwrap();
        assert_eq!(desc.n_rxqs, 1);
        assert_eq!(desc.n_txqs, plane.workers().count());
        assert!(!desc.mac.is_zero());
        assert!(desc.mtu >= 64);
        assert_eq!(plane.driver().pool_count(), 1);

        // the registry agrees with the descriptor
        let iface = plane.iface_get(desc.id).unwrap();
        assert_eq!(iface.iface_type, IfaceType::Port);
        assert!(iface.state.contains(IfaceState::RUNNING));
    }

    #[test]
    fn reconfig_roundtrip_is_observable_noop() {
        let mut plane = plane();
        let desc = plane.port_add(&name("p0"), "p0").unwrap();
        let iface = plane.iface_get(desc.id).unwrap();

        let IfaceInfoDesc::Port { mac, n_rxqs, .. } = &iface.info else {
            panic!("expected a port");
        };
        let config = IfaceConfig {
            name: iface.name.clone(),
            flags: iface.flags,
            mtu: iface.mtu,
            vrf_id: iface.vrf_id,
            info: IfaceInfoConfig::Port(PortConfig {
                devargs: desc.device.clone(),
                mac: *mac,
                n_rxqs: *n_rxqs,
                rxq_size: desc.rxq_size,
                txq_size: desc.txq_size,
            }),
        };
        plane.iface_set(desc.id, SetAttrs::ALL, &config).unwrap();

        assert_eq!(plane.iface_get(desc.id).unwrap(), iface);
        assert_eq!(plane.port_get(&name("p0")).unwrap(), desc);
    }

    #[test]
    fn rxq_resize_reassigns_queues() {
        let mut plane = plane();
        let desc = plane.port_add(&name("p0"), "p0").unwrap();

        let mut config = IfaceConfig {
            name: name("p0"),
            flags: IfaceFlags::UP,
            mtu: 0,
            vrf_id: 0,
            info: IfaceInfoConfig::Port(PortConfig {
                devargs: "p0".to_string(),
                mac: Mac::ZERO,
                n_rxqs: 4,
                rxq_size: 0,
                txq_size: 0,
            }),
        };
        plane
            .iface_set(desc.id, SetAttrs::PORT_N_RXQS, &config)
            .unwrap();
        assert_eq!(plane.port_get(&name("p0")).unwrap().n_rxqs, 4);

        let covered: usize = plane
            .workers()
            .iter()
            .map(|w| w.rxqs().iter().filter(|m| m.port.as_u16() == desc.port_id).count())
            .sum();
        assert_eq!(covered, 4);

        // shrinking drops the stale queues again
        if let IfaceInfoConfig::Port(cfg) = &mut config.info {
            cfg.n_rxqs = 2;
        }
        plane
            .iface_set(desc.id, SetAttrs::PORT_N_RXQS, &config)
            .unwrap();
        let covered: usize = plane
            .workers()
            .iter()
            .map(|w| w.rxqs().iter().filter(|m| m.port.as_u16() == desc.port_id).count())
            .sum();
        assert_eq!(covered, 2);
    }

    #[test]
    fn nh_add_requires_live_interface() {
        let mut plane = plane();
        let missing = IfaceId::try_new(42).unwrap();
        assert!(matches!(
            plane.nh4_add(
                Ipv4Addr::new(10, 0, 0, 1),
                missing,
                Mac([2, 0, 0, 0, 0, 1]),
                false
            ),
            Err(CtlError::NoSuchIface(_))
        ));
    }

    #[test]
    fn dispatch_maps_requests_to_handlers() {
        let mut plane = plane();
        let response = plane
            .dispatch(CtlRequest::PortAdd {
                name: name("p0"),
                devargs: "p0".to_string(),
            })
            .unwrap();
        let CtlResponse::Port(desc) = response else {
            panic!("expected a port descriptor");
        };

        let response = plane
            .dispatch(CtlRequest::Nh4Add {
                host: Ipv4Addr::new(10, 0, 0, 1),
                iface: desc.id,
                mac: Mac([2, 0, 0, 0, 0, 1]),
                exist_ok: false,
            })
            .unwrap();
        assert!(matches!(response, CtlResponse::Empty));

        let CtlResponse::Nexthops(hops) = plane.dispatch(CtlRequest::Nh4List).unwrap() else {
            panic!("expected nexthops");
        };
        assert_eq!(hops.len(), 1);
        assert_eq!(hops[0].host, Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(hops[0].age_secs, None);
    }
}
