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

//! Host-wide registry of mix stream instances and the resources they share.

use crate::block::BlockPool;
use crate::config::{block_size_for, MultiplexerConfig};
use crate::control_plane::stream_registry::{StreamHandle, StreamRegistry};
use crate::data_plane::egress_pool::EgressPool;
use crate::data_plane::ingress_listener::IngressListener;
use crate::error::StreamError;
use crate::frame::{Connection, Frame, FrameKind, FrameListener, MagicByte};
use crate::mix::stream::MixStream;
use crate::mix::stream_data::MixStreamData;
use crate::observability::{events, fields};
use crate::{StreamId, StreamKey};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::mpsc::Sender;
use tracing::debug;

const COMPONENT: &str = "multiplexer";

#[derive(Debug, Default)]
struct StreamAccounting {
    active_streams: usize,
    max_active_streams: usize,
}

/// Creates, resolves and releases the mix stream instances of one host.
///
/// Remote hosts are reached through one [`Connection`] each; frames from
/// them enter through [`ingress_listener`](Self::ingress_listener).
pub struct Multiplexer {
    config: MultiplexerConfig,
    pool: Arc<BlockPool>,
    connections: Vec<Option<Arc<dyn Connection>>>,
    egress: EgressPool,
    registry: StreamRegistry<MixStreamData>,
    accounting: Mutex<StreamAccounting>,
    next_stream_ids: Vec<AtomicU64>,
    this: Weak<Multiplexer>,
}

impl Multiplexer {
    /// `connections[host]` must be set for every host other than
    /// `config.host_rank`; the local entry is ignored.
    pub fn new(
        config: MultiplexerConfig,
        connections: Vec<Option<Arc<dyn Connection>>>,
    ) -> Result<Arc<Self>, StreamError> {
        config.validate()?;
        if connections.len() != config.num_hosts {
            return Err(StreamError::InvalidConfig(format!(
                "expected {} connections, got {}",
                config.num_hosts,
                connections.len()
            )));
        }
        if let Some(host) = (0..config.num_hosts)
            .find(|&host| host != config.host_rank && connections[host].is_none())
        {
            return Err(StreamError::MissingConnection { host });
        }

        let pool = Arc::new(BlockPool::new(config.hard_ram_limit));
        let egress = EgressPool::new(config.egress_queue_size);
        let registry = StreamRegistry::new(config.workers_per_host);
        let next_stream_ids = (0..config.workers_per_host)
            .map(|_| AtomicU64::new(0))
            .collect();

        Ok(Arc::new_cyclic(|this| Self {
            config,
            pool,
            connections,
            egress,
            registry,
            accounting: Mutex::new(StreamAccounting::default()),
            next_stream_ids,
            this: this.clone(),
        }))
    }

    pub fn config(&self) -> &MultiplexerConfig {
        &self.config
    }

    pub fn block_pool(&self) -> &Arc<BlockPool> {
        &self.pool
    }

    pub fn num_hosts(&self) -> usize {
        self.config.num_hosts
    }

    pub fn workers_per_host(&self) -> usize {
        self.config.workers_per_host
    }

    pub fn num_workers(&self) -> usize {
        self.config.num_workers()
    }

    pub fn host_rank(&self) -> usize {
        self.config.host_rank
    }

    /// Writer block size derived from the pool budget.
    pub fn block_size(&self) -> usize {
        block_size_for(
            self.pool.hard_ram_limit(),
            self.config.num_workers(),
            self.config.default_block_size,
        )
    }

    /// Listener the transport calls with every frame addressed to this host.
    pub fn ingress_listener(&self) -> Arc<dyn FrameListener> {
        Arc::new(IngressListener::new(
            self.config.host_rank,
            self.this.clone(),
        ))
    }

    /// Next stream id of `local_worker`.
    ///
    /// Every worker allocates ids from its own sequence, so workers that
    /// create their streams in the same order agree on the ids.
    ///
    /// # Panics
    ///
    /// Panics if `local_worker` is not a local worker index.
    pub fn new_mix_stream_id(&self, local_worker: usize) -> StreamId {
        assert!(
            local_worker < self.config.workers_per_host,
            "local worker {local_worker} out of range for {} workers per host",
            self.config.workers_per_host
        );
        StreamId::new(self.next_stream_ids[local_worker].fetch_add(1, Ordering::Relaxed))
    }

    /// Allocates a fresh id and opens the stream on `local_worker`.
    pub fn get_new_mix_stream(
        &self,
        local_worker: usize,
        dia_id: usize,
    ) -> Result<MixStream, StreamError> {
        let id = self.new_mix_stream_id(local_worker);
        self.get_or_create_mix_stream(id, local_worker, dia_id)
    }

    /// Opens a facade over the instance for `(id, local_worker)`, creating it
    /// unless received frames already did.
    pub fn get_or_create_mix_stream(
        &self,
        id: StreamId,
        local_worker: usize,
        dia_id: usize,
    ) -> Result<MixStream, StreamError> {
        let key = StreamKey::new(id, local_worker);
        let (handle, data) =
            self.get_or_create(key, dia_id)?
                .ok_or(StreamError::StreamReleased {
                    stream_id: id,
                    worker: local_worker,
                })?;
        data.set_dia_id(dia_id);
        let multiplexer = self
            .this
            .upgrade()
            .ok_or_else(|| StreamError::InvalidConfig("multiplexer is shutting down".into()))?;
        Ok(MixStream::new(multiplexer, handle))
    }

    /// Instance of `(id, worker)` other local workers deliver into, created on
    /// demand. `None` once that instance was released.
    pub fn mix_loopback(
        &self,
        id: StreamId,
        worker: usize,
    ) -> Result<Option<Arc<MixStreamData>>, StreamError> {
        Ok(self
            .get_or_create(StreamKey::new(id, worker), 0)?
            .map(|(_, data)| data))
    }

    /// Routes one received frame to its stream instance.
    ///
    /// Frames must come from a worker of another host; local workers reach
    /// each other through loopback only.
    pub fn on_frame(&self, frame: Frame) -> Result<(), StreamError> {
        let header = frame.header;
        if header.magic != MagicByte::MixStreamBlock {
            return Err(StreamError::UnexpectedMagic(header.magic));
        }
        if header.receiver_host != self.config.host_rank
            || header.receiver_worker >= self.config.workers_per_host
        {
            return Err(StreamError::MisroutedFrame {
                receiver_host: header.receiver_host,
                host_rank: self.config.host_rank,
            });
        }
        if header.sender_host >= self.config.num_hosts
            || header.sender_host == self.config.host_rank
            || header.sender_worker >= self.config.workers_per_host
        {
            return Err(StreamError::UnexpectedSender {
                sender_host: header.sender_host,
                sender_worker: header.sender_worker,
            });
        }

        let key = StreamKey::new(header.stream_id, header.receiver_worker);
        let Some((_, data)) = self.get_or_create(key, 0)? else {
            return Err(StreamError::IngestAfterClose {
                stream_id: key.stream_id,
                worker: key.local_worker,
            });
        };

        let source = header.sender_global_worker(self.config.workers_per_host);
        match frame.kind {
            FrameKind::Block(block) => data.on_stream_block(source, block),
            FrameKind::Close => {
                data.on_close_stream(source);
                Ok(())
            }
        }
    }

    /// Streams that opened writers and did not finish closing yet.
    pub fn active_streams(&self) -> usize {
        self.accounting().active_streams
    }

    /// High-water mark of [`active_streams`](Self::active_streams).
    pub fn max_active_streams(&self) -> usize {
        self.accounting().max_active_streams
    }

    /// Stream instances currently registered on this host.
    pub fn registered_streams(&self) -> usize {
        self.registry.len()
    }

    pub(crate) fn resolve(&self, handle: &StreamHandle) -> Option<Arc<MixStreamData>> {
        self.registry.resolve(handle)
    }

    pub(crate) fn stream_opened(&self) {
        let mut accounting = self.accounting.lock().unwrap_or_else(|e| e.into_inner());
        accounting.active_streams += 1;
        accounting.max_active_streams = accounting
            .max_active_streams
            .max(accounting.active_streams);
    }

    pub(crate) fn stream_closed(&self) {
        let mut accounting = self.accounting.lock().unwrap_or_else(|e| e.into_inner());
        accounting.active_streams = accounting.active_streams.saturating_sub(1);
    }

    /// Retires `key` and drops its egress references.
    pub(crate) fn release(&self, key: &StreamKey) {
        if self.registry.release(key).is_none() {
            return;
        }
        for host in self.remote_hosts() {
            self.egress.detach(host);
        }
        debug!(
            event = events::STREAM_RELEASE,
            component = COMPONENT,
            stream = fields::format_stream_key(key).as_str(),
            registered = self.registry.len(),
            "released stream instance"
        );
    }

    fn get_or_create(
        &self,
        key: StreamKey,
        dia_id: usize,
    ) -> Result<Option<(StreamHandle, Arc<MixStreamData>)>, StreamError> {
        assert!(
            key.local_worker < self.config.workers_per_host,
            "local worker {} out of range for {} workers per host",
            key.local_worker,
            self.config.workers_per_host
        );
        self.registry
            .get_or_insert_with(key, || self.create_stream_data(key, dia_id))
    }

    fn create_stream_data(
        &self,
        key: StreamKey,
        dia_id: usize,
    ) -> Result<MixStreamData, StreamError> {
        let mut egress: Vec<Option<Sender<Frame>>> = vec![None; self.config.num_hosts];
        let mut attached = Vec::new();
        for host in self.remote_hosts() {
            match self.attach_egress(host) {
                Ok(sender) => {
                    egress[host] = Some(sender);
                    attached.push(host);
                }
                Err(err) => {
                    for host in attached {
                        self.egress.detach(host);
                    }
                    return Err(err);
                }
            }
        }

        MixStreamData::new(&self.config, self.pool.clone(), key, dia_id, &egress).inspect_err(
            |_| {
                for &host in &attached {
                    self.egress.detach(host);
                }
            },
        )
    }

    fn attach_egress(&self, host: usize) -> Result<Sender<Frame>, StreamError> {
        let connection = self
            .connections
            .get(host)
            .and_then(Option::as_ref)
            .ok_or(StreamError::MissingConnection { host })?;
        self.egress.attach(host, connection)
    }

    fn remote_hosts(&self) -> impl Iterator<Item = usize> {
        let host_rank = self.config.host_rank;
        (0..self.config.num_hosts).filter(move |&host| host != host_rank)
    }

    fn accounting(&self) -> std::sync::MutexGuard<'_, StreamAccounting> {
        self.accounting.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::Multiplexer;
    use crate::config::MultiplexerConfig;
    use crate::error::{StreamError, TransportError};
    use crate::block::Block;
    use crate::frame::{Connection, Frame, FrameHeader, MagicByte};
    use crate::StreamId;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct NoopConnection;

    #[async_trait]
    impl Connection for NoopConnection {
        async fn send(&self, _frame: Frame) -> Result<(), TransportError> {
            Ok(())
        }
    }

    fn config(num_hosts: usize, host_rank: usize) -> MultiplexerConfig {
        MultiplexerConfig::new(num_hosts, 2, host_rank, 1 << 30)
    }

    #[test]
    fn new_requires_a_connection_per_remote_host() {
        let connection: Arc<dyn Connection> = Arc::new(NoopConnection);

        assert!(matches!(
            Multiplexer::new(config(3, 1), vec![Some(connection.clone()), None, None]),
            Err(StreamError::MissingConnection { host: 2 })
        ));
        assert!(matches!(
            Multiplexer::new(config(3, 1), vec![None]),
            Err(StreamError::InvalidConfig(_))
        ));
        assert!(Multiplexer::new(
            config(3, 1),
            vec![Some(connection.clone()), None, Some(connection)]
        )
        .is_ok());
    }

    #[test]
    fn stream_ids_are_sequential_per_worker() {
        let multiplexer = Multiplexer::new(config(1, 0), vec![None]).expect("multiplexer");

        assert_eq!(multiplexer.new_mix_stream_id(0).value(), 0);
        assert_eq!(multiplexer.new_mix_stream_id(0).value(), 1);
        assert_eq!(multiplexer.new_mix_stream_id(1).value(), 0);
    }

    #[test]
    fn block_size_follows_the_pool_budget() {
        // 1 GiB / 16 / 2 workers
        let multiplexer = Multiplexer::new(config(1, 0), vec![None]).expect("multiplexer");

        assert_eq!(multiplexer.block_size(), crate::config::DEFAULT_BLOCK_SIZE);

        let small = Multiplexer::new(
            MultiplexerConfig::new(1, 4, 0, 16 * 4 * 1000),
            vec![None],
        )
        .expect("multiplexer");
        assert_eq!(small.block_size(), 512);
    }

    #[test]
    fn loopback_resolution_creates_instances_on_demand() {
        let multiplexer = Multiplexer::new(config(1, 0), vec![None]).expect("multiplexer");
        let id = multiplexer.new_mix_stream_id(0);

        let first = multiplexer
            .mix_loopback(id, 1)
            .expect("instance should build")
            .expect("instance is live");
        let second = multiplexer
            .mix_loopback(id, 1)
            .expect("instance should build")
            .expect("instance is live");

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(multiplexer.registered_streams(), 1);
    }

    #[test]
    fn frames_from_unexpected_senders_are_rejected_before_dispatch() {
        let connection: Arc<dyn Connection> = Arc::new(NoopConnection);
        let multiplexer =
            Multiplexer::new(config(2, 1), vec![Some(connection), None]).expect("multiplexer");
        let id = StreamId::new(0);

        for (sender_host, sender_worker) in [(0, 3), (0, 2), (1, 0), (2, 0)] {
            let header = FrameHeader {
                magic: MagicByte::MixStreamBlock,
                stream_id: id,
                sender_host,
                sender_worker,
                receiver_host: 1,
                receiver_worker: 0,
            };
            let frame = Frame::block(header, Block::from_items(&[1u8]).expect("encode"));

            assert!(matches!(
                multiplexer.on_frame(frame),
                Err(StreamError::UnexpectedSender { .. })
            ));
        }
        assert_eq!(multiplexer.registered_streams(), 0);

        let header = FrameHeader {
            magic: MagicByte::MixStreamBlock,
            stream_id: id,
            sender_host: 0,
            sender_worker: 1,
            receiver_host: 1,
            receiver_worker: 0,
        };
        multiplexer
            .on_frame(Frame::block(header, Block::from_items(&[1u8]).expect("encode")))
            .expect("frame from a remote worker is accepted");
        assert_eq!(multiplexer.registered_streams(), 1);
    }
}
