// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Poll-mode NIC driver abstraction.
//!
//! The control plane programs NIC devices exclusively through the [`Ethdev`]
//! trait: device probe and removal, device information, configure/start/stop,
//! RX/TX queue setup, MAC and VLAN filter operations, link management and
//! packet-buffer pool allocation. A production build backs this with a real
//! poll-mode driver runtime; the [`null::NullEthdev`] backend emulates the
//! same contract in memory and is what tests and development run against.

#![deny(
    unsafe_code,
    clippy::all,
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]

pub mod dev;
pub mod null;
pub mod pool;
pub mod socket;

pub use dev::{DevConf, DevInfo, Link, PortId, QueueId, RxMode};
pub use pool::{PktPool, PoolConf};
pub use socket::{CpuId, Lcore, SocketId};

use net::eth::Mac;

/// Errors reported by the driver runtime, close to their errno equivalents.
#[derive(Debug, thiserror::Error)]
pub enum DevError {
    /// No device with this port id (ENODEV).
    #[error("no such device")]
    NoSuchDevice,
    /// The operation is not implemented by this device (ENOTSUP).
    #[error("operation not supported")]
    NotSupported,
    /// A device with the same arguments already exists (EEXIST).
    #[error("device already exists")]
    Exists,
    /// The driver could not allocate memory (ENOMEM).
    #[error("driver out of memory")]
    NoMem,
    /// The driver rejected an argument (EINVAL).
    #[error("invalid device argument: {0}")]
    InvalidArg(&'static str),
    /// Any other driver error, carried as a raw errno value.
    #[error("driver errno {0}")]
    Errno(i32),
}

impl DevError {
    /// True for the error kinds the control plane treats as best-effort
    /// (`ENOTSUP`/`ENOSYS` equivalents).
    #[must_use]
    pub fn is_unsupported(&self) -> bool {
        matches!(self, DevError::NotSupported)
    }
}

/// The contract the control plane demands of a poll-mode NIC driver runtime.
///
/// All calls execute synchronously on the control thread; a call may block
/// for the duration of a device transition.
pub trait Ethdev {
    /// Probe a device from its driver argument string and return its port id.
    fn probe(&mut self, devargs: &str) -> Result<PortId, DevError>;
    /// Find an already-probed device by its argument string.
    fn port_by_devargs(&self, devargs: &str) -> Option<PortId>;
    /// Static information about a probed device.
    fn info(&self, port: PortId) -> Result<DevInfo, DevError>;
    /// Apply a device-level configuration (queue counts, RX mode, offloads).
    fn configure(&mut self, port: PortId, conf: &DevConf) -> Result<(), DevError>;
    /// Start the device.
    fn start(&mut self, port: PortId) -> Result<(), DevError>;
    /// Stop the device. Stopping a stopped device is a no-op.
    fn stop(&mut self, port: PortId) -> Result<(), DevError>;
    /// Whether the device is currently started.
    fn is_started(&self, port: PortId) -> Result<bool, DevError>;
    /// Close the device, releasing its queues.
    fn close(&mut self, port: PortId) -> Result<(), DevError>;
    /// Detach the underlying device from the runtime.
    fn remove(&mut self, port: PortId) -> Result<(), DevError>;

    /// Set up one RX queue backed by `pool`.
    fn rx_queue_setup(
        &mut self,
        port: PortId,
        queue: QueueId,
        nb_desc: u16,
        socket: Option<SocketId>,
        pool: &PktPool,
    ) -> Result<(), DevError>;
    /// Set up one TX queue.
    fn tx_queue_setup(
        &mut self,
        port: PortId,
        queue: QueueId,
        nb_desc: u16,
        socket: Option<SocketId>,
    ) -> Result<(), DevError>;
    /// Allocate a packet-buffer pool.
    fn pool_create(&mut self, conf: PoolConf) -> Result<PktPool, DevError>;
    /// Release a packet-buffer pool.
    fn pool_free(&mut self, pool: PktPool);

    /// Current link status.
    fn link(&self, port: PortId) -> Result<Link, DevError>;
    /// Administratively raise or lower the link.
    fn set_link_up(&mut self, port: PortId, up: bool) -> Result<(), DevError>;
    /// Read back the promiscuous state.
    fn promiscuous(&self, port: PortId) -> Result<bool, DevError>;
    /// Enable or disable promiscuous mode.
    fn set_promiscuous(&mut self, port: PortId, on: bool) -> Result<(), DevError>;
    /// Read back the all-multicast state.
    fn allmulticast(&self, port: PortId) -> Result<bool, DevError>;
    /// Enable or disable all-multicast mode.
    fn set_allmulticast(&mut self, port: PortId, on: bool) -> Result<(), DevError>;
    /// Read back the device MTU.
    fn mtu(&self, port: PortId) -> Result<u16, DevError>;
    /// Program the device MTU.
    fn set_mtu(&mut self, port: PortId, mtu: u16) -> Result<(), DevError>;

    /// The device's default (station) MAC address.
    fn mac_addr(&self, port: PortId) -> Result<Mac, DevError>;
    /// Replace the device's default MAC address.
    fn set_mac_addr(&mut self, port: PortId, mac: Mac) -> Result<(), DevError>;
    /// Add a MAC address to the device filter.
    fn add_mac_filter(&mut self, port: PortId, mac: Mac) -> Result<(), DevError>;
    /// Remove a MAC address from the device filter.
    fn del_mac_filter(&mut self, port: PortId, mac: Mac) -> Result<(), DevError>;
    /// Enable or disable hardware filtering of a VLAN id.
    ///
    /// Devices without VLAN filtering report [`DevError::NotSupported`]; the
    /// caller decides whether that is fatal.
    fn vlan_filter(&mut self, port: PortId, vid: u16, on: bool) -> Result<(), DevError>;

    /// The worker cores available to the datapath, with their NUMA sockets.
    fn lcores(&self) -> Vec<Lcore>;
}
