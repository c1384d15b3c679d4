// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Control plane for a userspace software router.
//!
//! This crate owns the authoritative configuration of network interfaces
//! (NIC ports and their VLAN sub-interfaces) and the IPv4 forwarding state
//! (next-hops and routes), and programs the packet datapath accordingly
//! through the [`ethdev`] driver abstraction. All state changes are driven
//! synchronously by API requests dispatched on a single control thread;
//! datapath threads observe the IPv4 tables through lock-free read handles.

#![deny(clippy::all, clippy::pedantic)]
#![allow(
    clippy::similar_names,
    clippy::struct_field_names,
    clippy::missing_errors_doc,
    clippy::module_name_repetitions
)]

pub mod api;
mod errors;
pub mod iface;
pub mod ip4;
mod plane;
pub mod worker;

pub use api::{CtlRequest, CtlResponse};
pub use errors::CtlError;
pub use iface::{IfaceConfig, IfaceInfoConfig, IfaceType, PortConfig, SetAttrs, VlanConfig};
pub use ip4::tablesrw::{Ip4TablesReader, Ip4TablesReaderFactory};
pub use plane::{ControlPlane, ControlPlaneParams, ControlPlaneParamsBuilder};
