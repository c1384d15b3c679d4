// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Packet-buffer pool handles.

use crate::socket::SocketId;

/// Parameters for allocating a packet-buffer pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConf {
    /// Pool name, unique within the runtime.
    pub name: String,
    /// Number of buffers in the pool.
    pub size: u32,
    /// Size of the per-core buffer cache.
    pub cache_size: u32,
    /// NUMA socket to allocate on; `None` lets the runtime choose.
    pub socket: Option<SocketId>,
}

/// A handle to an allocated packet-buffer pool.
///
/// The handle is deliberately not `Clone`: exactly one owner (the port the
/// pool was sized for) holds it, and returns it to the runtime through
/// [`crate::Ethdev::pool_free`] on teardown.
#[derive(Debug, PartialEq, Eq)]
pub struct PktPool {
    conf: PoolConf,
}

impl PktPool {
    pub(crate) fn new(conf: PoolConf) -> Self {
        PktPool { conf }
    }

    /// The pool name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.conf.name
    }

    /// The number of buffers in the pool.
    #[must_use]
    pub fn size(&self) -> u32 {
        self.conf.size
    }

    /// The NUMA socket the pool was allocated on.
    #[must_use]
    pub fn socket(&self) -> Option<SocketId> {
        self.conf.socket
    }
}

impl std::fmt::Display for PktPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Pool({})", self.conf.name)
    }
}
