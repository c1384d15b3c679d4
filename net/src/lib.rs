// SPDX-License-Identifier: Apache-2.0

//! Checked network data types shared by the control plane and its driver layer.

#![deny(
    missing_docs,
    clippy::all,
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]

pub mod eth;
pub mod iface;
pub mod ipv4;
pub mod vlan;
