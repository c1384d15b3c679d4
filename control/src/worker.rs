// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Datapath workers and their RX/TX queue assignments.
//!
//! A worker is a datapath thread pinned to a CPU. The control plane keeps
//! one TX queue per worker per port (so transmission never contends) and
//! places each RX queue on a worker local to the port's NUMA socket. Queues
//! are assigned disabled; the packet graph enables them when it plugs the
//! port.

use crate::errors::CtlError;
use ethdev::{CpuId, Lcore, PortId, QueueId, SocketId};

#[allow(unused)]
use tracing::{debug, info, warn};

/// A port queue served by a worker.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct QueueMap {
    /// The NIC port.
    pub port: PortId,
    /// The queue index on that port.
    pub queue: QueueId,
    /// Whether the packet graph polls this queue yet.
    pub enabled: bool,
}

/// A datapath worker and its queue assignments.
#[derive(Clone, Debug)]
pub struct Worker {
    /// The CPU the worker is pinned to.
    pub cpu: CpuId,
    /// The NUMA socket of that CPU.
    pub socket: SocketId,
    rxqs: Vec<QueueMap>,
    txqs: Vec<QueueMap>,
}

impl Worker {
    fn new(cpu: CpuId, socket: SocketId) -> Self {
        info!("starting datapath worker on {cpu} ({socket})");
        Worker {
            cpu,
            socket,
            rxqs: Vec::new(),
            txqs: Vec::new(),
        }
    }

    /// The RX queues this worker polls.
    #[must_use]
    pub fn rxqs(&self) -> &[QueueMap] {
        &self.rxqs
    }

    /// The per-port TX queues reserved for this worker.
    #[must_use]
    pub fn txqs(&self) -> &[QueueMap] {
        &self.txqs
    }
}

/// Per-port occupancy is tracked in one machine word, which caps the RX
/// queues a single port may spread over workers.
pub const MAX_RXQ_PER_PORT: u16 = 64;

/// The ordered set of datapath workers.
#[derive(Clone, Debug, Default)]
pub struct WorkerSet {
    workers: Vec<Worker>,
}

impl WorkerSet {
    /// An empty worker set; workers are created on demand as ports need
    /// them.
    #[must_use]
    pub fn new() -> Self {
        WorkerSet::default()
    }

    /// Number of live workers.
    #[must_use]
    pub fn count(&self) -> u16 {
        #[allow(clippy::cast_possible_truncation)] // bounded by the cpu count
        let count = self.workers.len() as u16;
        count
    }

    /// Iterate over the workers in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Worker> {
        self.workers.iter()
    }

    /// The socket of the worker that would host unassigned queues.
    pub(crate) fn default_socket(&self, socket: Option<SocketId>) -> Option<SocketId> {
        self.default_worker_idx(socket)
            .map(|idx| self.workers[idx].socket)
    }

    fn default_worker_idx(&self, socket: Option<SocketId>) -> Option<usize> {
        if let Some(socket) = socket
            && let Some(idx) = self.workers.iter().position(|w| w.socket == socket)
        {
            return Some(idx);
        }
        if self.workers.is_empty() { None } else { Some(0) }
    }

    //////////////////////////////////////////////////////////////////
    /// Make sure a worker exists that can serve the given socket,
    /// creating one on a free CPU when necessary.
    //////////////////////////////////////////////////////////////////
    pub(crate) fn ensure_default(
        &mut self,
        lcores: &[Lcore],
        socket: Option<SocketId>,
    ) -> Result<(), CtlError> {
        let satisfied = match socket {
            Some(socket) => self.workers.iter().any(|w| w.socket == socket),
            None => !self.workers.is_empty(),
        };
        if satisfied {
            return Ok(());
        }
        let free = lcores
            .iter()
            .filter(|lcore| socket.is_none_or(|s| lcore.socket == s))
            .find(|lcore| self.workers.iter().all(|w| w.cpu != lcore.cpu))
            .ok_or(CtlError::NoWorkerCore)?;
        self.workers.push(Worker::new(free.cpu, free.socket));
        Ok(())
    }

    //////////////////////////////////////////////////////////////////
    /// Recompute the queue maps for one port: exactly one TX queue per
    /// worker (numbered in worker order), surviving RX assignments kept,
    /// missing RX queues placed on the socket-local default worker.
    /// Applying this twice yields identical maps.
    //////////////////////////////////////////////////////////////////
    pub(crate) fn assign_port_queues(
        &mut self,
        port: PortId,
        n_rxq: u16,
        socket: Option<SocketId>,
    ) -> Result<(), CtlError> {
        if n_rxq > MAX_RXQ_PER_PORT {
            return Err(CtlError::TooManyRxQueues(n_rxq));
        }

        let mut next_txq = 0u16;
        for worker in &mut self.workers {
            worker.txqs.retain(|map| map.port != port);
            worker.txqs.push(QueueMap {
                port,
                queue: QueueId(next_txq),
                enabled: false,
            });
            next_txq += 1;
        }

        // one-word occupancy bitmap over queue ids, hence the cap above
        let mut occupancy = 0u64;
        for worker in &mut self.workers {
            worker.rxqs.retain(|map| {
                if map.port != port {
                    return true;
                }
                let q = map.queue.0;
                if q < n_rxq && occupancy & (1 << q) == 0 {
                    occupancy |= 1 << q;
                    true
                } else {
                    false
                }
            });
        }

        let default = self
            .default_worker_idx(socket)
            .ok_or(CtlError::NoWorkerCore)?;
        for q in 0..n_rxq {
            if occupancy & (1 << q) == 0 {
                debug!(
                    "rx queue {q} of port {port} assigned to worker on {}",
                    self.workers[default].cpu
                );
                self.workers[default].rxqs.push(QueueMap {
                    port,
                    queue: QueueId(q),
                    enabled: false,
                });
            }
        }
        Ok(())
    }

    //////////////////////////////////////////////////////////////////
    /// Drop every queue map referring to a port being torn down.
    //////////////////////////////////////////////////////////////////
    pub(crate) fn unplug_port(&mut self, port: PortId) {
        for worker in &mut self.workers {
            worker.rxqs.retain(|map| map.port != port);
            worker.txqs.retain(|map| map.port != port);
        }
    }

    //////////////////////////////////////////////////////////////////
    /// Destroy workers left without RX queues; returns how many died.
    //////////////////////////////////////////////////////////////////
    pub(crate) fn destroy_idle(&mut self) -> usize {
        let before = self.workers.len();
        self.workers.retain(|worker| {
            if worker.rxqs.is_empty() {
                info!("stopping idle datapath worker on {}", worker.cpu);
                false
            } else {
                true
            }
        });
        before - self.workers.len()
    }
}
