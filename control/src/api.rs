// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The request/response surface of the control plane.
//!
//! Requests form a closed enum and are dispatched synchronously by
//! [`crate::ControlPlane::dispatch`]; the transport that frames them onto a
//! wire lives outside this crate. Descriptor types are plain data and
//! serialize with serde so any transport can carry them.

use crate::iface::{IfaceConfig, IfaceFlags, IfaceState, IfaceType, SetAttrs};
use crate::ip4::nexthop::{Nexthop, NhFlags};
use net::eth::Mac;
use net::iface::{IfaceId, IfaceName};
use net::ipv4::Ipv4Prefix;
use net::vlan::Vid;
use std::net::Ipv4Addr;

/// A port interface, as reported to API clients.
#[derive(Clone, Debug, PartialEq, Eq)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct PortDesc {
    /// Interface id.
    pub id: IfaceId,
    /// Interface name.
    pub name: IfaceName,
    /// NIC port id.
    pub port_id: u16,
    /// Bus-level device name, as reported by the driver.
    pub device: String,
    /// Station MAC, read back from the device.
    pub mac: Mac,
    /// MTU, read back from the device.
    pub mtu: u16,
    /// Effective RX queue count.
    pub n_rxqs: u16,
    /// Effective TX queue count (one per datapath worker).
    pub n_txqs: u16,
    /// Effective RX ring size.
    pub rxq_size: u16,
    /// Effective TX ring size.
    pub txq_size: u16,
}

/// Per-type descriptor payload of an interface.
#[derive(Clone, Debug, PartialEq, Eq)]
#[derive(serde::Serialize, serde::Deserialize)]
pub enum IfaceInfoDesc {
    /// Port details.
    Port {
        /// NIC port id.
        port_id: u16,
        /// Driver argument string the device was probed from.
        devargs: String,
        /// Configured station MAC.
        mac: Mac,
        /// Effective RX queue count.
        n_rxqs: u16,
        /// Effective TX queue count.
        n_txqs: u16,
    },
    /// VLAN sub-interface details.
    Vlan {
        /// Parent interface id.
        parent: IfaceId,
        /// VLAN id on the parent.
        vlan_id: Vid,
        /// Multicast MAC programmed on the parent; zero for none.
        mac: Mac,
    },
}

/// An interface of any type, as reported to API clients.
#[derive(Clone, Debug, PartialEq, Eq)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct IfaceDesc {
    /// Interface id.
    pub id: IfaceId,
    /// Interface name.
    pub name: IfaceName,
    /// Interface type tag.
    pub iface_type: IfaceType,
    /// Administrative flags.
    pub flags: IfaceFlags,
    /// Operational state.
    pub state: IfaceState,
    /// MTU.
    pub mtu: u16,
    /// VRF id.
    pub vrf_id: u16,
    /// Per-type payload.
    pub info: IfaceInfoDesc,
}

/// A next-hop, as reported to API clients.
#[derive(Clone, Debug, PartialEq, Eq)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct NhDesc {
    /// The IPv4 address of the hop.
    pub host: Ipv4Addr,
    /// The interface packets to this hop leave through.
    pub iface: Option<IfaceId>,
    /// Link-layer address; zero while unresolved.
    pub mac: Mac,
    /// State flags.
    pub flags: NhFlags,
    /// Seconds since reachability was last confirmed. `None` when the hop
    /// was never confirmed, which is always the case for static entries.
    pub age_secs: Option<u64>,
}

impl From<&Nexthop> for NhDesc {
    fn from(nh: &Nexthop) -> Self {
        NhDesc {
            host: nh.host,
            iface: nh.iface,
            mac: nh.mac,
            flags: nh.flags,
            age_secs: nh.age_secs(),
        }
    }
}

/// A route, as reported to API clients.
#[derive(Clone, Debug, PartialEq, Eq)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct RouteDesc {
    /// Destination prefix.
    pub dest: Ipv4Prefix,
    /// Address of the next-hop the prefix resolves to.
    pub nexthop: Ipv4Addr,
}

/// A control request. One request mutates or reads one table, synchronously.
#[derive(Clone, Debug)]
pub enum CtlRequest {
    /// Probe a device and create a port interface with default attributes.
    PortAdd {
        /// Name for the new port.
        name: IfaceName,
        /// Driver arguments naming the device.
        devargs: String,
    },
    /// Destroy the port with this name.
    PortDel {
        /// Port name.
        name: IfaceName,
    },
    /// Describe the port with this name.
    PortGet {
        /// Port name.
        name: IfaceName,
    },
    /// Describe every port.
    PortList,
    /// Create an interface from a full configuration.
    IfaceAdd {
        /// The configuration to build the interface from.
        config: IfaceConfig,
    },
    /// Reconfigure the attributes selected by `set_attrs`.
    IfaceSet {
        /// Target interface.
        id: IfaceId,
        /// Which attributes of `config` apply.
        set_attrs: SetAttrs,
        /// The attribute values.
        config: IfaceConfig,
    },
    /// Destroy an interface.
    IfaceDel {
        /// Target interface.
        id: IfaceId,
    },
    /// Describe one interface.
    IfaceGet {
        /// Target interface.
        id: IfaceId,
    },
    /// Describe every interface.
    IfaceList,
    /// Add a static IPv4 next-hop and its host route.
    Nh4Add {
        /// The next-hop address.
        host: Ipv4Addr,
        /// Interface the hop is reached through.
        iface: IfaceId,
        /// Link-layer address of the hop.
        mac: Mac,
        /// Succeed if an identical entry already exists.
        exist_ok: bool,
    },
    /// Delete an IPv4 next-hop.
    Nh4Del {
        /// The next-hop address.
        host: Ipv4Addr,
        /// Succeed if no such entry exists.
        missing_ok: bool,
    },
    /// List every IPv4 next-hop.
    Nh4List,
    /// Install an IPv4 route through an existing next-hop.
    Route4Add {
        /// Destination prefix.
        dest: Ipv4Prefix,
        /// Gateway address; must resolve to a next-hop.
        gw: Ipv4Addr,
        /// Succeed if the identical route already exists.
        exist_ok: bool,
    },
    /// Remove an IPv4 route.
    Route4Del {
        /// Destination prefix.
        dest: Ipv4Prefix,
        /// Succeed if no such route exists.
        missing_ok: bool,
    },
    /// Resolve the next-hop for a destination address.
    Route4Get {
        /// Destination address.
        addr: Ipv4Addr,
    },
    /// List every installed route.
    Route4List,
}

/// The payload of a successful request.
#[derive(Clone, Debug)]
pub enum CtlResponse {
    /// Nothing to report.
    Empty,
    /// The id of a created interface.
    IfaceId(IfaceId),
    /// One port.
    Port(PortDesc),
    /// All ports.
    Ports(Vec<PortDesc>),
    /// One interface.
    Iface(IfaceDesc),
    /// All interfaces.
    Ifaces(Vec<IfaceDesc>),
    /// One next-hop.
    Nexthop(NhDesc),
    /// All next-hops.
    Nexthops(Vec<NhDesc>),
    /// All routes.
    Routes(Vec<RouteDesc>),
}
