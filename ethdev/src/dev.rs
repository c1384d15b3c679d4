// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Device identifiers, information and configuration.

use crate::socket::SocketId;

/// The maximum number of NIC ports a runtime can expose.
pub const MAX_ETHPORTS: u16 = 32;

/// A NIC port index assigned by the driver runtime at probe time.
///
/// This is a newtype around `u16` to provide type safety and prevent
/// accidental misuse.
#[repr(transparent)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PortId(pub u16);

impl PortId {
    /// The port id as a `u16`.
    #[must_use]
    pub fn as_u16(self) -> u16 {
        self.0
    }
}

impl std::fmt::Display for PortId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An RX or TX queue index on a port.
#[repr(transparent)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QueueId(pub u16);

impl std::fmt::Display for QueueId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// RSS hash-function bits, in the driver's `flow_type_rss_offloads` encoding.
pub mod rss {
    /// Hash on the IPv4 header.
    pub const IPV4: u64 = 1 << 2;
    /// Hash on the TCP 4-tuple.
    pub const TCP4: u64 = 1 << 4;
    /// Hash on the UDP 4-tuple.
    pub const UDP4: u64 = 1 << 7;
    /// The hash functions requested for multi-queue RX by default.
    pub const DEFAULT: u64 = IPV4 | TCP4 | UDP4;
}

/// RX offload capability bits.
pub mod offload {
    /// IPv4 header checksum validation.
    pub const RX_IPV4_CKSUM: u64 = 1 << 1;
    /// L4 checksum validation.
    pub const RX_L4_CKSUM: u64 = 1 << 3;
    /// The RX offloads requested by default, masked by device capabilities.
    pub const RX_DEFAULT: u64 = RX_IPV4_CKSUM | RX_L4_CKSUM;
}

/// Static information reported by the driver for a probed device.
#[derive(Debug, Clone)]
pub struct DevInfo {
    /// Name of the backing driver.
    pub driver_name: String,
    /// Bus-level name of the device.
    pub device_name: String,
    /// NUMA socket the device is attached to; `None` when the driver
    /// reports no affinity.
    pub socket: Option<SocketId>,
    /// Hardware bound on RX queues.
    pub max_rx_queues: u16,
    /// Hardware bound on TX queues.
    pub max_tx_queues: u16,
    /// Preferred RX ring size, zero when the driver has no preference.
    pub default_rxq_size: u16,
    /// Preferred TX ring size, zero when the driver has no preference.
    pub default_txq_size: u16,
    /// RSS hash functions the device can compute.
    pub flow_type_rss_offloads: u64,
    /// RX offloads the device supports.
    pub rx_offload_capa: u64,
}

/// How a device distributes received packets over its RX queues.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RxMode {
    /// All packets on queue 0.
    Single,
    /// RSS over the given hash functions.
    Rss(u64),
}

/// Device-level configuration applied by [`crate::Ethdev::configure`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevConf {
    /// Number of RX queues.
    pub n_rxq: u16,
    /// Number of TX queues.
    pub n_txq: u16,
    /// RX distribution mode.
    pub rx_mode: RxMode,
    /// Enabled RX offloads (must be a subset of the device capabilities).
    pub rx_offloads: u64,
}

/// Link status read back from the device.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Link {
    /// Whether the link is up.
    pub up: bool,
    /// Negotiated speed in Mbps, zero when down or unknown.
    pub speed_mbps: u32,
}
