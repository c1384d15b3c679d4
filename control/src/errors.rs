// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Control-plane error type and its errno mapping.

use ethdev::DevError;
use net::iface::{IfaceId, IfaceName};
use net::ipv4::Ipv4Prefix;
use net::vlan::Vid;
use std::net::Ipv4Addr;

/// Errors returned by control-plane operations.
///
/// Every variant maps to a standard errno value at the API boundary, see
/// [`CtlError::errno`].
#[derive(Debug, thiserror::Error)]
pub enum CtlError {
    /// A request argument failed validation.
    #[error("invalid argument: {0}")]
    InvalidArg(&'static str),

    /// An interface with this type and name already exists.
    #[error("interface '{0}' already exists")]
    NameInUse(IfaceName),

    /// The device arguments already back another port.
    #[error("device '{0}' is already attached")]
    DeviceInUse(String),

    /// No interface with this id.
    #[error("no interface with id {0}")]
    NoSuchIface(IfaceId),

    /// No port interface with this name.
    #[error("no port named '{0}'")]
    NoSuchPort(String),

    /// The interface is not a port, but the operation needs one.
    #[error("interface {0} is not a port")]
    NotAPort(IfaceId),

    /// The interface still has sub-interfaces.
    #[error("interface {0} has sub-interfaces")]
    HasChildren(IfaceId),

    /// The interface registry is at capacity.
    #[error("interface table is full")]
    IfaceTableFull,

    /// Another sub-interface already claims this (parent, vlan) pair.
    #[error("vlan {vid} on interface {parent} is already in use")]
    VlanInUse {
        /// The parent interface.
        parent: IfaceId,
        /// The claimed VLAN id.
        vid: Vid,
    },

    /// A next-hop for this address already exists with a different body.
    #[error("nexthop {0} already exists")]
    NexthopExists(Ipv4Addr),

    /// No next-hop for this address.
    #[error("no nexthop for {0}")]
    NoSuchNexthop(Ipv4Addr),

    /// The next-hop is still referenced, or carries an implicit reference.
    #[error("nexthop {0} is in use")]
    NexthopBusy(Ipv4Addr),

    /// The next-hop table is at capacity.
    #[error("nexthop table is full")]
    NexthopTableFull,

    /// A route for this prefix already exists with a different next-hop.
    #[error("route {0} already exists")]
    RouteExists(Ipv4Prefix),

    /// No route for this prefix.
    #[error("no route for {0}")]
    NoSuchRoute(Ipv4Prefix),

    /// No route covers this address.
    #[error("{0} is unreachable")]
    NetUnreachable(Ipv4Addr),

    /// More RX queues than the per-port occupancy bitmap can track.
    #[error("{0} rx queues exceed the per-port limit of 64")]
    TooManyRxQueues(u16),

    /// No CPU is available to host a datapath worker.
    #[error("no worker core available")]
    NoWorkerCore,

    /// A driver error passed through transparently.
    #[error(transparent)]
    Dev(#[from] DevError),
}

/// The errno values the API boundary speaks.
pub(crate) mod errno {
    pub const ENOENT: i32 = 2;
    pub const ENOMEM: i32 = 12;
    pub const EBUSY: i32 = 16;
    pub const EEXIST: i32 = 17;
    pub const ENODEV: i32 = 19;
    pub const EINVAL: i32 = 22;
    pub const ENOSPC: i32 = 28;
    pub const EMEDIUMTYPE: i32 = 124;
    pub const ENOTSUP: i32 = 95;
    pub const EADDRINUSE: i32 = 98;
    pub const ENETUNREACH: i32 = 101;
}

impl CtlError {
    /// The errno equivalent reported to API clients.
    #[must_use]
    pub fn errno(&self) -> i32 {
        match self {
            CtlError::InvalidArg(_) | CtlError::TooManyRxQueues(_) => errno::EINVAL,
            CtlError::NameInUse(_)
            | CtlError::DeviceInUse(_)
            | CtlError::NexthopExists(_)
            | CtlError::RouteExists(_) => errno::EEXIST,
            CtlError::NoSuchIface(_) | CtlError::NoSuchPort(_) => errno::ENODEV,
            CtlError::NotAPort(_) => errno::EMEDIUMTYPE,
            CtlError::HasChildren(_) | CtlError::NexthopBusy(_) => errno::EBUSY,
            CtlError::IfaceTableFull | CtlError::NoWorkerCore => errno::ENOSPC,
            CtlError::VlanInUse { .. } => errno::EADDRINUSE,
            CtlError::NoSuchNexthop(_) | CtlError::NoSuchRoute(_) => errno::ENOENT,
            CtlError::NexthopTableFull => errno::ENOMEM,
            CtlError::NetUnreachable(_) => errno::ENETUNREACH,
            CtlError::Dev(dev) => match dev {
                DevError::NoSuchDevice => errno::ENODEV,
                DevError::NotSupported => errno::ENOTSUP,
                DevError::Exists => errno::EEXIST,
                DevError::NoMem => errno::ENOMEM,
                DevError::InvalidArg(_) => errno::EINVAL,
                DevError::Errno(raw) => *raw,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_mapping() {
        assert_eq!(CtlError::InvalidArg("x").errno(), errno::EINVAL);
        assert_eq!(
            CtlError::NetUnreachable(Ipv4Addr::UNSPECIFIED).errno(),
            errno::ENETUNREACH
        );
        assert_eq!(CtlError::Dev(DevError::NotSupported).errno(), errno::ENOTSUP);
        assert_eq!(CtlError::Dev(DevError::Errno(42)).errno(), 42);
    }
}
