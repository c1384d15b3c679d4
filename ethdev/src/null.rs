// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! An emulated driver backend.
//!
//! [`NullEthdev`] implements the full [`Ethdev`] contract against in-memory
//! state, the way a `net_null` virtual device would: probing always succeeds,
//! queues and pools are bookkeeping only, and the link follows the
//! administrative state. Device arguments take the form `name[,socket=N]`,
//! where the optional `socket` option pins the emulated device to a NUMA
//! node.

use crate::dev::{DevConf, DevInfo, Link, MAX_ETHPORTS, PortId, QueueId, rss};
use crate::pool::{PktPool, PoolConf};
use crate::socket::{CpuId, Lcore, SocketId};
use crate::{DevError, Ethdev};
use ahash::RandomState;
use net::eth::Mac;
use std::collections::{BTreeSet, HashMap};

#[allow(unused)]
use tracing::{debug, info, warn};

const NULL_MTU: u16 = 1500;

#[derive(Debug, PartialEq, Eq)]
enum PortState {
    Stopped,
    Started,
    Closed,
}

#[derive(Debug)]
struct NullPort {
    devargs: String,
    socket: Option<SocketId>,
    mac: Mac,
    mtu: u16,
    promisc: bool,
    allmulti: bool,
    admin_up: bool,
    state: PortState,
    conf: Option<DevConf>,
    rx_queues: BTreeSet<u16>,
    tx_queues: BTreeSet<u16>,
    mac_filters: Vec<Mac>,
    vlan_filters: BTreeSet<u16>,
}

/// The emulated [`Ethdev`] backend.
#[derive(Debug)]
pub struct NullEthdev {
    lcores: Vec<Lcore>,
    ports: Vec<Option<NullPort>>,
    pools: HashMap<String, PoolConf, RandomState>,
    rss_offloads: u64,
    rx_offload_capa: u64,
    vlan_filter_supported: bool,
    probe_attempts: usize,
}

impl Default for NullEthdev {
    fn default() -> Self {
        Self::new()
    }
}

impl NullEthdev {
    /// A backend with two worker cores on NUMA socket 0.
    #[must_use]
    pub fn new() -> Self {
        Self::with_lcores(vec![
            Lcore {
                cpu: CpuId(1),
                socket: SocketId(0),
            },
            Lcore {
                cpu: CpuId(2),
                socket: SocketId(0),
            },
        ])
    }

    /// A backend with the given worker-core topology.
    #[must_use]
    pub fn with_lcores(lcores: Vec<Lcore>) -> Self {
        NullEthdev {
            lcores,
            ports: Vec::new(),
            pools: HashMap::with_hasher(RandomState::with_seed(0)),
            rss_offloads: rss::DEFAULT,
            rx_offload_capa: crate::dev::offload::RX_DEFAULT,
            vlan_filter_supported: true,
            probe_attempts: 0,
        }
    }

    /// Pretend the hardware cannot filter VLANs, to exercise best-effort paths.
    #[must_use]
    pub fn without_vlan_filter(mut self) -> Self {
        self.vlan_filter_supported = false;
        self
    }

    /// Restrict the RSS hash functions the emulated hardware advertises.
    #[must_use]
    pub fn with_rss_offloads(mut self, offloads: u64) -> Self {
        self.rss_offloads = offloads;
        self
    }

    /// How many probes were attempted, successful or not.
    #[must_use]
    pub fn probe_attempts(&self) -> usize {
        self.probe_attempts
    }

    /// Number of live pools.
    #[must_use]
    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    /// The VLAN ids currently filtered on a port.
    ///
    /// # Errors
    ///
    /// Returns [`DevError::NoSuchDevice`] for an unknown port.
    pub fn vlan_filters(&self, port: PortId) -> Result<Vec<u16>, DevError> {
        Ok(self.port(port)?.vlan_filters.iter().copied().collect())
    }

    /// The MAC addresses currently in a port's filter.
    ///
    /// # Errors
    ///
    /// Returns [`DevError::NoSuchDevice`] for an unknown port.
    pub fn mac_filters(&self, port: PortId) -> Result<Vec<Mac>, DevError> {
        Ok(self.port(port)?.mac_filters.clone())
    }

    fn port(&self, port: PortId) -> Result<&NullPort, DevError> {
        self.ports
            .get(usize::from(port.as_u16()))
            .and_then(Option::as_ref)
            .ok_or(DevError::NoSuchDevice)
    }

    fn port_mut(&mut self, port: PortId) -> Result<&mut NullPort, DevError> {
        self.ports
            .get_mut(usize::from(port.as_u16()))
            .and_then(Option::as_mut)
            .ok_or(DevError::NoSuchDevice)
    }

    fn parse_devargs(devargs: &str) -> Result<(String, Option<SocketId>), DevError> {
        let mut parts = devargs.split(',');
        let name = parts.next().unwrap_or_default();
        if name.is_empty() {
            return Err(DevError::InvalidArg("empty device name"));
        }
        let mut socket = None;
        for opt in parts {
            match opt.split_once('=') {
                Some(("socket", value)) => {
                    let id = value
                        .parse::<u32>()
                        .map_err(|_| DevError::InvalidArg("bad socket option"))?;
                    socket = Some(SocketId(id));
                }
                _ => return Err(DevError::InvalidArg("unknown device option")),
            }
        }
        Ok((name.to_string(), socket))
    }
}

impl Ethdev for NullEthdev {
    fn probe(&mut self, devargs: &str) -> Result<PortId, DevError> {
        self.probe_attempts += 1;
        let (_, socket) = Self::parse_devargs(devargs)?;
        if self.port_by_devargs(devargs).is_some() {
            return Err(DevError::Exists);
        }
        let slot = self
            .ports
            .iter()
            .position(Option::is_none)
            .unwrap_or(self.ports.len());
        if slot >= usize::from(MAX_ETHPORTS) {
            return Err(DevError::NoMem);
        }
        #[allow(clippy::cast_possible_truncation)] // bounded by MAX_ETHPORTS
        let port_id = PortId(slot as u16);
        let port = NullPort {
            devargs: devargs.to_string(),
            socket,
            mac: Mac([0x02, 0x00, 0x00, 0x00, 0x00, port_id.as_u16() as u8 + 1]),
            mtu: NULL_MTU,
            promisc: false,
            allmulti: false,
            admin_up: true,
            state: PortState::Stopped,
            conf: None,
            rx_queues: BTreeSet::new(),
            tx_queues: BTreeSet::new(),
            mac_filters: Vec::new(),
            vlan_filters: BTreeSet::new(),
        };
        debug!("probed null device '{devargs}' as port {port_id}");
        if slot == self.ports.len() {
            self.ports.push(Some(port));
        } else {
            self.ports[slot] = Some(port);
        }
        Ok(port_id)
    }

    #[allow(clippy::cast_possible_truncation)] // indices bounded by MAX_ETHPORTS
    fn port_by_devargs(&self, devargs: &str) -> Option<PortId> {
        self.ports.iter().enumerate().find_map(|(idx, slot)| {
            slot.as_ref()
                .filter(|port| port.devargs == devargs)
                .map(|_| PortId(idx as u16))
        })
    }

    fn info(&self, port: PortId) -> Result<DevInfo, DevError> {
        let p = self.port(port)?;
        Ok(DevInfo {
            driver_name: "net_null".to_string(),
            device_name: p.devargs.clone(),
            socket: p.socket,
            max_rx_queues: 64,
            max_tx_queues: 64,
            default_rxq_size: 0,
            default_txq_size: 0,
            flow_type_rss_offloads: self.rss_offloads,
            rx_offload_capa: self.rx_offload_capa,
        })
    }

    fn configure(&mut self, port: PortId, conf: &DevConf) -> Result<(), DevError> {
        let p = self.port_mut(port)?;
        if p.state == PortState::Started {
            return Err(DevError::Errno(16 /* EBUSY */));
        }
        if conf.n_rxq == 0 || conf.n_rxq > 64 || conf.n_txq > 64 {
            return Err(DevError::InvalidArg("queue count out of range"));
        }
        // reconfiguration drops previous queue setup, as real devices do
        p.rx_queues.clear();
        p.tx_queues.clear();
        p.conf = Some(conf.clone());
        Ok(())
    }

    fn start(&mut self, port: PortId) -> Result<(), DevError> {
        let p = self.port_mut(port)?;
        let Some(conf) = &p.conf else {
            return Err(DevError::InvalidArg("device not configured"));
        };
        if p.rx_queues.len() != usize::from(conf.n_rxq)
            || p.tx_queues.len() != usize::from(conf.n_txq)
        {
            return Err(DevError::InvalidArg("queues not set up"));
        }
        p.state = PortState::Started;
        Ok(())
    }

    fn stop(&mut self, port: PortId) -> Result<(), DevError> {
        let p = self.port_mut(port)?;
        if p.state == PortState::Started {
            p.state = PortState::Stopped;
        }
        Ok(())
    }

    fn is_started(&self, port: PortId) -> Result<bool, DevError> {
        Ok(self.port(port)?.state == PortState::Started)
    }

    fn close(&mut self, port: PortId) -> Result<(), DevError> {
        let p = self.port_mut(port)?;
        p.state = PortState::Closed;
        p.conf = None;
        p.rx_queues.clear();
        p.tx_queues.clear();
        Ok(())
    }

    fn remove(&mut self, port: PortId) -> Result<(), DevError> {
        let slot = self
            .ports
            .get_mut(usize::from(port.as_u16()))
            .ok_or(DevError::NoSuchDevice)?;
        if slot.take().is_none() {
            return Err(DevError::NoSuchDevice);
        }
        Ok(())
    }

    fn rx_queue_setup(
        &mut self,
        port: PortId,
        queue: QueueId,
        nb_desc: u16,
        _socket: Option<SocketId>,
        pool: &PktPool,
    ) -> Result<(), DevError> {
        if !self.pools.contains_key(pool.name()) {
            return Err(DevError::InvalidArg("unknown pool"));
        }
        let p = self.port_mut(port)?;
        let Some(conf) = &p.conf else {
            return Err(DevError::InvalidArg("device not configured"));
        };
        if queue.0 >= conf.n_rxq {
            return Err(DevError::InvalidArg("rx queue index out of range"));
        }
        if nb_desc == 0 {
            return Err(DevError::InvalidArg("empty rx ring"));
        }
        p.rx_queues.insert(queue.0);
        Ok(())
    }

    fn tx_queue_setup(
        &mut self,
        port: PortId,
        queue: QueueId,
        nb_desc: u16,
        _socket: Option<SocketId>,
    ) -> Result<(), DevError> {
        let p = self.port_mut(port)?;
        let Some(conf) = &p.conf else {
            return Err(DevError::InvalidArg("device not configured"));
        };
        if queue.0 >= conf.n_txq {
            return Err(DevError::InvalidArg("tx queue index out of range"));
        }
        if nb_desc == 0 {
            return Err(DevError::InvalidArg("empty tx ring"));
        }
        p.tx_queues.insert(queue.0);
        Ok(())
    }

    fn pool_create(&mut self, conf: PoolConf) -> Result<PktPool, DevError> {
        if self.pools.contains_key(&conf.name) {
            return Err(DevError::Exists);
        }
        if conf.size == 0 {
            return Err(DevError::InvalidArg("empty pool"));
        }
        self.pools.insert(conf.name.clone(), conf.clone());
        Ok(PktPool::new(conf))
    }

    fn pool_free(&mut self, pool: PktPool) {
        if self.pools.remove(pool.name()).is_none() {
            warn!("freeing unknown pool '{}'", pool.name());
        }
    }

    fn link(&self, port: PortId) -> Result<Link, DevError> {
        let p = self.port(port)?;
        let up = p.state == PortState::Started && p.admin_up;
        Ok(Link {
            up,
            speed_mbps: if up { 10_000 } else { 0 },
        })
    }

    fn set_link_up(&mut self, port: PortId, up: bool) -> Result<(), DevError> {
        self.port_mut(port)?.admin_up = up;
        Ok(())
    }

    fn promiscuous(&self, port: PortId) -> Result<bool, DevError> {
        Ok(self.port(port)?.promisc)
    }

    fn set_promiscuous(&mut self, port: PortId, on: bool) -> Result<(), DevError> {
        self.port_mut(port)?.promisc = on;
        Ok(())
    }

    fn allmulticast(&self, port: PortId) -> Result<bool, DevError> {
        Ok(self.port(port)?.allmulti)
    }

    fn set_allmulticast(&mut self, port: PortId, on: bool) -> Result<(), DevError> {
        self.port_mut(port)?.allmulti = on;
        Ok(())
    }

    fn mtu(&self, port: PortId) -> Result<u16, DevError> {
        Ok(self.port(port)?.mtu)
    }

    fn set_mtu(&mut self, port: PortId, mtu: u16) -> Result<(), DevError> {
        if mtu < 68 {
            return Err(DevError::InvalidArg("mtu below minimum"));
        }
        self.port_mut(port)?.mtu = mtu;
        Ok(())
    }

    fn mac_addr(&self, port: PortId) -> Result<Mac, DevError> {
        Ok(self.port(port)?.mac)
    }

    fn set_mac_addr(&mut self, port: PortId, mac: Mac) -> Result<(), DevError> {
        if !mac.is_valid_src() {
            return Err(DevError::InvalidArg("not a unicast mac"));
        }
        self.port_mut(port)?.mac = mac;
        Ok(())
    }

    fn add_mac_filter(&mut self, port: PortId, mac: Mac) -> Result<(), DevError> {
        if mac.is_zero() {
            return Err(DevError::InvalidArg("zero mac"));
        }
        let p = self.port_mut(port)?;
        if !p.mac_filters.contains(&mac) {
            p.mac_filters.push(mac);
        }
        Ok(())
    }

    fn del_mac_filter(&mut self, port: PortId, mac: Mac) -> Result<(), DevError> {
        self.port_mut(port)?.mac_filters.retain(|m| *m != mac);
        Ok(())
    }

    fn vlan_filter(&mut self, port: PortId, vid: u16, on: bool) -> Result<(), DevError> {
        if !self.vlan_filter_supported {
            return Err(DevError::NotSupported);
        }
        let p = self.port_mut(port)?;
        if on {
            p.vlan_filters.insert(vid);
        } else {
            p.vlan_filters.remove(&vid);
        }
        Ok(())
    }

    fn lcores(&self) -> Vec<Lcore> {
        self.lcores.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dev::RxMode;
    use tracing_test::traced_test;

    fn pool(drv: &mut NullEthdev, name: &str) -> PktPool {
        drv.pool_create(PoolConf {
            name: name.to_string(),
            size: 2047,
            cache_size: 256,
            socket: None,
        })
        .unwrap()
    }

    #[test]
    fn probe_and_duplicate() {
        let mut drv = NullEthdev::new();
        let p0 = drv.probe("p0").unwrap();
        assert_eq!(drv.port_by_devargs("p0"), Some(p0));
        assert!(matches!(drv.probe("p0"), Err(DevError::Exists)));
        assert_eq!(drv.probe_attempts(), 2);

        let p1 = drv.probe("p1,socket=1").unwrap();
        assert_eq!(drv.info(p1).unwrap().socket, Some(SocketId(1)));
        assert_ne!(drv.mac_addr(p0).unwrap(), drv.mac_addr(p1).unwrap());
    }

    #[traced_test]
    #[test]
    fn lifecycle_requires_queues() {
        let mut drv = NullEthdev::new();
        let p0 = drv.probe("p0").unwrap();
        let conf = DevConf {
            n_rxq: 1,
            n_txq: 1,
            rx_mode: RxMode::Single,
            rx_offloads: 0,
        };
        drv.configure(p0, &conf).unwrap();
        assert!(drv.start(p0).is_err());

        let mbufs = pool(&mut drv, "p0-pool");
        drv.rx_queue_setup(p0, QueueId(0), 512, None, &mbufs).unwrap();
        drv.tx_queue_setup(p0, QueueId(0), 512, None).unwrap();
        drv.start(p0).unwrap();
        assert!(drv.is_started(p0).unwrap());
        assert!(drv.link(p0).unwrap().up);

        drv.set_link_up(p0, false).unwrap();
        assert!(!drv.link(p0).unwrap().up);

        drv.stop(p0).unwrap();
        drv.close(p0).unwrap();
        drv.remove(p0).unwrap();
        assert!(matches!(drv.info(p0), Err(DevError::NoSuchDevice)));
        drv.pool_free(mbufs);
        assert_eq!(drv.pool_count(), 0);
    }

    #[test]
    fn vlan_filter_support_is_optional() {
        let mut drv = NullEthdev::new().without_vlan_filter();
        let p0 = drv.probe("p0").unwrap();
        assert!(drv.vlan_filter(p0, 100, true).unwrap_err().is_unsupported());

        let mut drv = NullEthdev::new();
        let p0 = drv.probe("p0").unwrap();
        drv.vlan_filter(p0, 100, true).unwrap();
        assert_eq!(drv.vlan_filters(p0).unwrap(), vec![100]);
        drv.vlan_filter(p0, 100, false).unwrap();
        assert!(drv.vlan_filters(p0).unwrap().is_empty());
    }
}
