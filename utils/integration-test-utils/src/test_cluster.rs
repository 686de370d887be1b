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


use crate::in_memory_network::InMemoryNetwork;
use mix_stream::{Multiplexer, MultiplexerConfig, StreamError};
use std::sync::Arc;
use std::thread;

const DEFAULT_HARD_RAM_LIMIT: usize = 64 * 1024 * 1024;

/// A whole job in one process: one multiplexer per host over an in-memory
/// network.
pub struct TestCluster {
    network: Arc<InMemoryNetwork>,
    multiplexers: Vec<Arc<Multiplexer>>,
}

/// Identity handed to every worker thread of [`TestCluster::run_on_workers`].
#[derive(Clone)]
pub struct ClusterWorker {
    pub host: usize,
    pub worker: usize,
    pub multiplexer: Arc<Multiplexer>,
}

impl ClusterWorker {
    pub fn global_worker(&self) -> usize {
        self.multiplexer.config().global_worker(self.host, self.worker)
    }
}

impl TestCluster {
    pub fn new(num_hosts: usize, workers_per_host: usize) -> Result<Self, StreamError> {
        Self::with_limits(num_hosts, workers_per_host, DEFAULT_HARD_RAM_LIMIT, None)
    }

    pub fn with_limits(
        num_hosts: usize,
        workers_per_host: usize,
        hard_ram_limit: usize,
        egress_queue_size: Option<usize>,
    ) -> Result<Self, StreamError> {
        let network = InMemoryNetwork::new(num_hosts);
        let mut multiplexers = Vec::with_capacity(num_hosts);

        for host in 0..num_hosts {
            let mut config =
                MultiplexerConfig::new(num_hosts, workers_per_host, host, hard_ram_limit);
            if let Some(size) = egress_queue_size {
                config.egress_queue_size = size;
            }
            let multiplexer = Multiplexer::new(config, network.connections_for(host))?;
            network.register_listener(host, multiplexer.ingress_listener());
            multiplexers.push(multiplexer);
        }

        Ok(Self {
            network,
            multiplexers,
        })
    }

    pub fn network(&self) -> &Arc<InMemoryNetwork> {
        &self.network
    }

    pub fn multiplexer(&self, host: usize) -> &Arc<Multiplexer> {
        &self.multiplexers[host]
    }

    pub fn multiplexers(&self) -> &[Arc<Multiplexer>] {
        &self.multiplexers
    }

    pub fn num_hosts(&self) -> usize {
        self.multiplexers.len()
    }

    pub fn workers_per_host(&self) -> usize {
        self.multiplexers
            .first()
            .map_or(0, |multiplexer| multiplexer.workers_per_host())
    }

    /// Runs `body` on one thread per worker of the job and returns the results
    /// in global worker order. Panics of worker threads are re-raised.
    pub fn run_on_workers<T, F>(&self, body: F) -> Vec<T>
    where
        T: Send + 'static,
        F: Fn(ClusterWorker) -> T + Send + Sync + 'static,
    {
        let body = Arc::new(body);
        let mut handles = Vec::new();
        for (host, multiplexer) in self.multiplexers.iter().enumerate() {
            for worker in 0..multiplexer.workers_per_host() {
                let body = body.clone();
                let cluster_worker = ClusterWorker {
                    host,
                    worker,
                    multiplexer: multiplexer.clone(),
                };
                handles.push(
                    thread::Builder::new()
                        .name(format!("h{host}w{worker}"))
                        .spawn(move || body(cluster_worker)),
                );
            }
        }

        handles
            .into_iter()
            .map(|handle| match handle {
                Ok(handle) => handle
                    .join()
                    .unwrap_or_else(|panic| std::panic::resume_unwind(panic)),
                Err(err) => panic!("unable to spawn worker thread: {err}"),
            })
            .collect()
    }
}
