// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Port interfaces: NIC devices owned by the control plane.
//!
//! A port owns the probed device, its packet-buffer pool and its queue
//! layout. The device-level configuration sequence runs on first setup and
//! again whenever a sizing attribute (queue counts, ring sizes) changes;
//! plain attribute updates (flags, MTU, MAC) only bracket the device with a
//! stop/start when it was running.

use crate::errors::CtlError;
use crate::iface::{Iface, IfaceFlags, PortConfig, SetAttrs};
use crate::worker::{MAX_RXQ_PER_PORT, WorkerSet};
use ethdev::dev::{DevConf, RxMode, offload, rss};
use ethdev::{Ethdev, PoolConf, QueueId};

#[allow(unused)]
use tracing::{debug, error, info, warn};

/// Ring size used when neither the request nor the driver names one.
const FALLBACK_RING_SIZE: u16 = 512;
/// Per-core cache of the port's buffer pool.
const POOL_CACHE_SIZE: u32 = 256;
/// Headroom for one RX burst when sizing the pool.
const MAX_PKT_BURST: u32 = 64;

fn effective_ring_size(requested: u16, driver_default: u16) -> u16 {
    if requested != 0 {
        requested
    } else if driver_default != 0 {
        driver_default
    } else {
        FALLBACK_RING_SIZE
    }
}

fn pool_size(n_rxq: u16, rxq_size: u16, n_txq: u16, txq_size: u16) -> u32 {
    let n_bufs = u32::from(n_rxq) * u32::from(rxq_size)
        + u32::from(n_txq) * u32::from(txq_size)
        + MAX_PKT_BURST;
    n_bufs.next_power_of_two() - 1
}

fn keep_first_error(status: &mut Result<(), CtlError>, result: Result<(), ethdev::DevError>) {
    if let Err(err) = result
        && status.is_ok()
    {
        *status = Err(err.into());
    }
}

//////////////////////////////////////////////////////////////////////
/// Initial configuration: full reconfig, with teardown of the partial
/// device state on failure.
//////////////////////////////////////////////////////////////////////
pub(crate) fn init(
    drv: &mut dyn Ethdev,
    workers: &mut WorkerSet,
    iface: &mut Iface,
    flags: IfaceFlags,
    mtu: u16,
    vrf_id: u16,
    cfg: &PortConfig,
) -> Result<(), CtlError> {
    if let Err(err) = reconfig(
        drv,
        workers,
        iface,
        SetAttrs::ALL,
        flags,
        mtu,
        vrf_id,
        Some(cfg),
    ) {
        if let Err(fini_err) = fini(drv, workers, iface) {
            warn!("teardown after failed port init: {fini_err}");
        }
        return Err(err);
    }
    Ok(())
}

//////////////////////////////////////////////////////////////////////
/// Apply the attributes selected by `set_attrs` to a port interface.
//////////////////////////////////////////////////////////////////////
#[allow(clippy::too_many_arguments, clippy::too_many_lines)]
pub(crate) fn reconfig(
    drv: &mut dyn Ethdev,
    workers: &mut WorkerSet,
    iface: &mut Iface,
    set_attrs: SetAttrs,
    flags: IfaceFlags,
    mtu: u16,
    vrf_id: u16,
    cfg: Option<&PortConfig>,
) -> Result<(), CtlError> {
    let mut sizing_changed = false;
    {
        let port = iface
            .as_port_mut()
            .ok_or(CtlError::InvalidArg("not a port"))?;
        if !port.configured {
            sizing_changed = true;
        }
        if set_attrs.has(SetAttrs::PORT_N_TXQS) {
            // the worker count drives n_txq; force a resize pass
            sizing_changed = true;
        }
        if let Some(cfg) = cfg {
            if set_attrs.has(SetAttrs::PORT_N_RXQS) && cfg.n_rxqs != port.n_rxq {
                if cfg.n_rxqs > MAX_RXQ_PER_PORT {
                    return Err(CtlError::TooManyRxQueues(cfg.n_rxqs));
                }
                port.n_rxq = cfg.n_rxqs;
                sizing_changed = true;
            }
            if set_attrs.has(SetAttrs::PORT_RXQ_SIZE)
                && cfg.rxq_size != 0
                && cfg.rxq_size != port.rxq_size
            {
                port.rxq_size = cfg.rxq_size;
                sizing_changed = true;
            }
            if set_attrs.has(SetAttrs::PORT_TXQ_SIZE)
                && cfg.txq_size != 0
                && cfg.txq_size != port.txq_size
            {
                port.txq_size = cfg.txq_size;
                sizing_changed = true;
            }
        }
    }

    if sizing_changed {
        apply_device_config(drv, workers, iface)?;
    }

    let port_id = iface
        .as_port()
        .ok_or(CtlError::InvalidArg("not a port"))?
        .port_id;

    if set_attrs.intersects(SetAttrs::FLAGS | SetAttrs::MTU | SetAttrs::PORT_MAC) {
        let was_started = drv.is_started(port_id)?;
        if was_started {
            drv.stop(port_id)?;
        }

        if set_attrs.has(SetAttrs::FLAGS) {
            if let Err(err) = drv.set_promiscuous(port_id, flags.contains(IfaceFlags::PROMISC)) {
                warn!("set promiscuous on port {port_id}: {err}");
            }
            if let Err(err) = drv.set_allmulticast(port_id, flags.contains(IfaceFlags::ALLMULTI)) {
                warn!("set allmulticast on port {port_id}: {err}");
            }
            if let Err(err) = drv.set_link_up(port_id, flags.contains(IfaceFlags::UP)) {
                warn!("set link state on port {port_id}: {err}");
            }
            // reconcile with what the device actually accepted
            let promisc = drv.promiscuous(port_id)?;
            let allmulti = drv.allmulticast(port_id)?;
            iface.flags = flags
                .with(IfaceFlags::PROMISC, promisc)
                .with(IfaceFlags::ALLMULTI, allmulti);
        }

        if set_attrs.has(SetAttrs::MTU) {
            if mtu != 0 {
                drv.set_mtu(port_id, mtu)?;
                iface.mtu = mtu;
            } else {
                iface.mtu = drv.mtu(port_id)?;
            }
        }

        if set_attrs.has(SetAttrs::PORT_MAC) {
            let requested = cfg.map(|cfg| cfg.mac).unwrap_or_default();
            let mac = if requested.is_zero() {
                drv.mac_addr(port_id)?
            } else {
                drv.set_mac_addr(port_id, requested)?;
                requested
            };
            if let Some(port) = iface.as_port_mut() {
                port.mac = mac;
            }
        }

        if was_started {
            drv.start(port_id)?;
        }
    }

    if set_attrs.has(SetAttrs::VRF) {
        iface.vrf_id = vrf_id;
    }

    let link = drv.link(port_id)?;
    iface.state.set_running(link.up);
    Ok(())
}

//////////////////////////////////////////////////////////////////////
/// The device-level configuration sequence: workers, queue sizing,
/// RSS masking, device configure, pool allocation, queue setup and
/// worker assignment.
//////////////////////////////////////////////////////////////////////
fn apply_device_config(
    drv: &mut dyn Ethdev,
    workers: &mut WorkerSet,
    iface: &mut Iface,
) -> Result<(), CtlError> {
    let name = iface.name.clone();
    let port = iface
        .as_port_mut()
        .ok_or(CtlError::InvalidArg("not a port"))?;
    let port_id = port.port_id;
    let info = drv.info(port_id)?;

    workers.ensure_default(&drv.lcores(), info.socket)?;

    port.n_txq = workers.count();
    if port.n_rxq == 0 {
        port.n_rxq = 1;
    }

    if drv.is_started(port_id)? {
        drv.stop(port_id)?;
    }
    if let Some(pool) = port.pool.take() {
        drv.pool_free(pool);
    }

    let rxq_size = effective_ring_size(port.rxq_size, info.default_rxq_size);
    let txq_size = effective_ring_size(port.txq_size, info.default_txq_size);

    let rss_hash = rss::DEFAULT & info.flow_type_rss_offloads;
    let rx_mode = if port.n_rxq > 1 && rss_hash != 0 {
        RxMode::Rss(rss_hash)
    } else {
        if port.n_rxq > 1 {
            // device cannot spread flows: multi-queue RX is pointless
            warn!("port {port_id} lacks RSS support, falling back to one rx queue");
            port.n_rxq = 1;
        }
        RxMode::Single
    };

    drv.configure(
        port_id,
        &DevConf {
            n_rxq: port.n_rxq,
            n_txq: port.n_txq,
            rx_mode,
            rx_offloads: offload::RX_DEFAULT & info.rx_offload_capa,
        },
    )?;

    let pool_socket = info.socket.or_else(|| workers.default_socket(None));
    let pool = drv.pool_create(PoolConf {
        name: format!("mbuf-{name}"),
        size: pool_size(port.n_rxq, rxq_size, port.n_txq, txq_size),
        cache_size: POOL_CACHE_SIZE,
        socket: pool_socket,
    })?;
    for queue in 0..port.n_rxq {
        drv.rx_queue_setup(port_id, QueueId(queue), rxq_size, info.socket, &pool)?;
    }
    for queue in 0..port.n_txq {
        drv.tx_queue_setup(port_id, QueueId(queue), txq_size, info.socket)?;
    }
    port.pool = Some(pool);
    port.rxq_size = rxq_size;
    port.txq_size = txq_size;

    workers.assign_port_queues(port_id, port.n_rxq, info.socket)?;

    port.configured = true;
    drv.start(port_id)?;
    debug!(
        "configured port {port_id} ('{name}'): {} rx / {} tx queues",
        port.n_rxq, port.n_txq
    );
    Ok(())
}

//////////////////////////////////////////////////////////////////////
/// Tear a port down: unplug it from the workers, stop, close and
/// remove the device, free the pool. Teardown runs every step and
/// reports the first error.
//////////////////////////////////////////////////////////////////////
pub(crate) fn fini(
    drv: &mut dyn Ethdev,
    workers: &mut WorkerSet,
    iface: &mut Iface,
) -> Result<(), CtlError> {
    let port = iface
        .as_port_mut()
        .ok_or(CtlError::InvalidArg("not a port"))?;
    let port_id = port.port_id;
    let mut status = Ok(());

    workers.unplug_port(port_id);
    keep_first_error(&mut status, drv.stop(port_id));
    keep_first_error(&mut status, drv.close(port_id));
    keep_first_error(&mut status, drv.remove(port_id));
    if let Some(pool) = port.pool.take() {
        drv.pool_free(pool);
    }
    port.configured = false;
    info!("removed port {port_id} ('{}')", iface.name);
    status
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_sizing_precedence() {
        assert_eq!(effective_ring_size(1024, 256), 1024);
        assert_eq!(effective_ring_size(0, 256), 256);
        assert_eq!(effective_ring_size(0, 0), FALLBACK_RING_SIZE);
    }

    #[test]
    fn pool_sizing_rounds_to_pow2_minus_one() {
        // 1 rxq + 1 txq of 512 descriptors plus one burst
        assert_eq!(pool_size(1, 512, 1, 512), 2047);
        // an exact power of two stays at itself minus one
        assert_eq!(pool_size(2, 512, 2, 480), 2047);
    }
}
