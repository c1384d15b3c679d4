// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Ethernet types.

pub mod mac;

pub use mac::Mac;
