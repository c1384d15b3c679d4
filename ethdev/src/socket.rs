// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! NUMA topology types.
//!
//! # Note
//!
//! What poll-mode driver runtimes call a "socket" is more accurately a
//! [NUMA] node, but the established name is socket, so we stick with it.
//!
//! [NUMA]: https://en.wikipedia.org/wiki/Non-uniform_memory_access

/// A NUMA node id.
///
/// This is a newtype around `u32` to provide type safety and prevent
/// accidental misuse. "No affinity" is expressed as `Option<SocketId>`
/// rather than a sentinel value.
#[repr(transparent)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SocketId(pub u32);

impl std::fmt::Display for SocketId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "socket{}", self.0)
    }
}

/// A CPU id usable for a datapath worker.
#[repr(transparent)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CpuId(pub u16);

impl std::fmt::Display for CpuId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cpu{}", self.0)
    }
}

/// A worker core: a CPU and the NUMA socket it belongs to.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Lcore {
    /// The CPU id.
    pub cpu: CpuId,
    /// The NUMA socket the CPU belongs to.
    pub socket: SocketId,
}
