/********************************************************************************
 * Copyright (c) 2026 Contributors to the Eclipse Foundation
 *
 * See the NOTICE file(s) distributed with this work for additional
 * information regarding copyright ownership.
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

//! Per-host egress worker pool with refcounted bindings.

use crate::data_plane::egress_worker::EgressWorker;
use crate::error::StreamError;
use crate::frame::{Connection, Frame};
use crate::observability::events;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{self, Sender};
use tracing::{debug, warn};

const COMPONENT: &str = "egress_pool";

/// Egress state for one destination host.
pub(crate) struct EgressBinding {
    pub(crate) ref_count: usize,
    pub(crate) worker: EgressWorker,
    pub(crate) sender: Sender<Frame>,
}

/// Refcounted registry of egress workers keyed by destination host rank.
pub(crate) struct EgressPool {
    queue_size: usize,
    pub(crate) workers: Mutex<HashMap<usize, EgressBinding>>,
}

impl EgressPool {
    pub(crate) fn new(queue_size: usize) -> Self {
        Self {
            queue_size,
            workers: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the frame queue toward `host`, spawning its worker on first use.
    pub(crate) fn attach(
        &self,
        host: usize,
        connection: &Arc<dyn Connection>,
    ) -> Result<Sender<Frame>, StreamError> {
        let mut workers = self.workers.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(binding) = workers.get_mut(&host) {
            if binding.worker.is_finished() {
                // dispatch thread died; later streams get a fresh one
                let (sender, receiver) = mpsc::channel(self.queue_size);
                binding.worker = EgressWorker::new(host, connection.clone(), receiver)?;
                binding.sender = sender;
                warn!(
                    event = events::EGRESS_WORKER_CREATE,
                    component = COMPONENT,
                    host,
                    worker_id = binding.worker.worker_id(),
                    reason = "dispatch_thread_finished",
                    "replaced finished egress worker"
                );
            }
            binding.ref_count += 1;
            debug!(
                event = events::EGRESS_WORKER_REUSE,
                component = COMPONENT,
                host,
                worker_id = binding.worker.worker_id(),
                ref_count = binding.ref_count,
                "reusing egress worker"
            );
            return Ok(binding.sender.clone());
        }

        let (sender, receiver) = mpsc::channel(self.queue_size);
        let worker = EgressWorker::new(host, connection.clone(), receiver)?;
        debug!(
            event = events::EGRESS_WORKER_CREATE,
            component = COMPONENT,
            host,
            worker_id = worker.worker_id(),
            worker_thread = worker.runtime_thread(),
            "created egress worker"
        );
        workers.insert(
            host,
            EgressBinding {
                ref_count: 1,
                worker,
                sender: sender.clone(),
            },
        );
        Ok(sender)
    }

    /// Drops one reference to `host`; the binding goes away at zero and its
    /// worker stops once every outstanding sender is gone.
    pub(crate) fn detach(&self, host: usize) {
        let mut workers = self.workers.lock().unwrap_or_else(|e| e.into_inner());

        let Some(binding) = workers.get_mut(&host) else {
            warn!(
                event = events::EGRESS_DETACH_UNKNOWN,
                component = COMPONENT,
                host,
                "no egress worker bound to host"
            );
            return;
        };

        binding.ref_count -= 1;
        if binding.ref_count == 0 {
            if let Some(binding) = workers.remove(&host) {
                debug!(
                    event = events::EGRESS_WORKER_REMOVE,
                    component = COMPONENT,
                    host,
                    worker_id = binding.worker.worker_id(),
                    worker_thread = binding.worker.runtime_thread(),
                    "removed egress worker"
                );
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn ref_count(&self, host: usize) -> usize {
        let workers = self.workers.lock().unwrap_or_else(|e| e.into_inner());
        workers.get(&host).map_or(0, |binding| binding.ref_count)
    }
}

#[cfg(test)]
mod tests {
    use super::EgressPool;
    use crate::error::TransportError;
    use crate::frame::{Connection, Frame};
    use async_trait::async_trait;
    use std::sync::Arc;

    struct NoopConnection;

    #[async_trait]
    impl Connection for NoopConnection {
        async fn send(&self, _frame: Frame) -> Result<(), TransportError> {
            Ok(())
        }
    }

    #[test]
    fn attach_reuses_queue_and_increments_refcount() {
        let pool = EgressPool::new(8);
        let connection: Arc<dyn Connection> = Arc::new(NoopConnection);

        let sender_a = pool.attach(1, &connection).expect("attach");
        let sender_b = pool.attach(1, &connection).expect("attach");

        assert_eq!(pool.workers.lock().expect("lock").len(), 1);
        assert_eq!(pool.ref_count(1), 2);
        assert!(sender_a.same_channel(&sender_b));
    }

    #[test]
    fn detach_drops_binding_when_refcount_reaches_zero() {
        let pool = EgressPool::new(8);
        let connection: Arc<dyn Connection> = Arc::new(NoopConnection);

        pool.attach(2, &connection).expect("attach");
        pool.attach(2, &connection).expect("attach");

        pool.detach(2);
        assert_eq!(pool.ref_count(2), 1);

        pool.detach(2);
        assert!(pool.workers.lock().expect("lock").is_empty());

        // unknown hosts are ignored
        pool.detach(2);
    }
}
