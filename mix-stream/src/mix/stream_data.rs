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

//! Per-(stream, local worker) state: output sinks, loopback inlets, the mixing
//! queue and the close handshake.

use crate::block::{Block, BlockPool};
use crate::close_handshake::{expected_closing_acks, ClosingHandshake};
use crate::config::MultiplexerConfig;
use crate::error::StreamError;
use crate::frame::{Frame, FrameHeader, MagicByte};
use crate::mix::queue::MixBlockQueue;
use crate::mix::reader::MixReader;
use crate::mix::sink::{LoopbackSink, NetworkSink, SinkSlot, WriterSink};
use crate::mix::writer::BlockWriter;
use crate::multiplexer::Multiplexer;
use crate::observability::{events, fields};
use crate::stats::{self, StreamCounters, StreamStats, StreamTimers};
use crate::{StreamId, StreamKey};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::Sender;
use tracing::{debug, info, warn, Level};

const COMPONENT: &str = "mix_stream_data";

/// State of one stream instance on one local worker.
///
/// Owned by the multiplexer's registry. Operations that need to reach other
/// local workers' instances take the multiplexer as an argument instead of
/// holding it, so instances never keep their owner alive.
#[derive(Debug)]
pub struct MixStreamData {
    key: StreamKey,
    dia_id: AtomicUsize,
    config: MultiplexerConfig,
    pool: Arc<BlockPool>,
    /// One slot per global destination worker, host-major.
    sinks: Vec<SinkSlot>,
    /// One inlet per local worker, indexed by the sending worker.
    loopback: Vec<Arc<LoopbackSink>>,
    queue: Arc<MixBlockQueue>,
    counters: Arc<StreamCounters>,
    timers: StreamTimers,
    handshake: ClosingHandshake,
    is_closed: AtomicBool,
    handshake_complete: AtomicBool,
    writers_opened: AtomicBool,
}

impl MixStreamData {
    /// Builds the instance; `egress[host]` must be set for every remote host.
    pub(crate) fn new(
        config: &MultiplexerConfig,
        pool: Arc<BlockPool>,
        key: StreamKey,
        dia_id: usize,
        egress: &[Option<Sender<Frame>>],
    ) -> Result<Self, StreamError> {
        let num_workers = config.num_workers();
        let host_rank = config.host_rank;
        let counters = Arc::new(StreamCounters::default());
        let queue = Arc::new(MixBlockQueue::new(num_workers, key.local_worker, dia_id));

        let mut sinks = Vec::with_capacity(num_workers);
        for host in 0..config.num_hosts {
            for worker in 0..config.workers_per_host {
                if host == host_rank {
                    sinks.push(SinkSlot::Unused);
                    continue;
                }
                let sender = egress
                    .get(host)
                    .and_then(Option::as_ref)
                    .ok_or(StreamError::MissingConnection { host })?;
                let header = FrameHeader {
                    magic: MagicByte::MixStreamBlock,
                    stream_id: key.stream_id,
                    sender_host: host_rank,
                    sender_worker: key.local_worker,
                    receiver_host: host,
                    receiver_worker: worker,
                };
                sinks.push(SinkSlot::Network(Arc::new(NetworkSink::new(
                    header,
                    sender.clone(),
                    counters.clone(),
                ))));
            }
        }

        let loopback = (0..config.workers_per_host)
            .map(|worker| {
                Arc::new(LoopbackSink::new(
                    queue.clone(),
                    config.global_worker(host_rank, worker),
                    counters.clone(),
                ))
            })
            .collect();

        debug!(
            event = events::STREAM_CREATE,
            component = COMPONENT,
            stream = fields::format_stream_key(&key).as_str(),
            dia_id,
            num_workers,
            "created stream instance"
        );

        Ok(Self {
            key,
            dia_id: AtomicUsize::new(dia_id),
            config: config.clone(),
            pool,
            sinks,
            loopback,
            queue,
            counters,
            timers: StreamTimers::new(),
            handshake: ClosingHandshake::new(expected_closing_acks(
                config.num_hosts,
                config.workers_per_host,
            )),
            is_closed: AtomicBool::new(false),
            handshake_complete: AtomicBool::new(false),
            writers_opened: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> StreamId {
        self.key.stream_id
    }

    pub fn local_worker(&self) -> usize {
        self.key.local_worker
    }

    pub fn key(&self) -> StreamKey {
        self.key
    }

    pub fn dia_id(&self) -> usize {
        self.dia_id.load(Ordering::Relaxed)
    }

    pub fn set_dia_id(&self, dia_id: usize) {
        self.dia_id.store(dia_id, Ordering::Relaxed);
        self.queue.set_dia_id(dia_id);
    }

    pub fn sinks(&self) -> &[SinkSlot] {
        &self.sinks
    }

    pub fn loopback(&self) -> &[Arc<LoopbackSink>] {
        &self.loopback
    }

    /// Inlet other local workers use to reach this instance.
    ///
    /// # Panics
    ///
    /// Panics if `from_worker` is not a local worker index.
    pub fn loopback_sink(&self, from_worker: usize) -> &Arc<LoopbackSink> {
        assert!(
            from_worker < self.loopback.len(),
            "loopback requested for worker {from_worker} of {}",
            self.loopback.len()
        );
        &self.loopback[from_worker]
    }

    /// Remaining close notifications before the handshake can finish.
    pub fn remaining_closing_acks(&self) -> usize {
        self.handshake.remaining()
    }

    /// One writer per global destination worker, host-major.
    pub fn get_writers(&self, multiplexer: &Multiplexer) -> Result<Vec<BlockWriter>, StreamError> {
        let block_size = multiplexer.block_size();
        if !self.writers_opened.swap(true, Ordering::AcqRel) {
            multiplexer.stream_opened();
        }

        debug!(
            event = events::STREAM_GET_WRITERS,
            component = COMPONENT,
            stream = fields::format_stream_key(&self.key).as_str(),
            hard_ram_limit = self.pool.hard_ram_limit(),
            block_size,
            active_streams = multiplexer.active_streams(),
            max_active_streams = multiplexer.max_active_streams(),
            "opening writers"
        );

        self.timers.tx_timespan.start_eventually();

        let mut writers = Vec::with_capacity(self.sinks.len());
        for (destination, slot) in self.sinks.iter().enumerate() {
            let sink = match slot {
                SinkSlot::Network(sink) => WriterSink::Network(sink.clone()),
                SinkSlot::Unused => {
                    let worker = destination % self.config.workers_per_host;
                    let target = multiplexer
                        .mix_loopback(self.key.stream_id, worker)?
                        .ok_or(StreamError::LoopbackReleased {
                            stream_id: self.key.stream_id,
                            worker,
                        })?;
                    let sink = target.loopback_sink(self.key.local_worker).clone();
                    sink.set_source_counters(self.counters.clone());
                    WriterSink::Loopback(sink)
                }
            };
            writers.push(BlockWriter::new(sink, self.pool.clone(), block_size));
        }
        Ok(writers)
    }

    pub fn get_mix_reader(&self, consume: bool) -> MixReader {
        self.timers.rx_timespan.start_eventually();
        debug!(
            event = events::STREAM_GET_READER,
            component = COMPONENT,
            stream = fields::format_stream_key(&self.key).as_str(),
            consume,
            "opening reader"
        );
        MixReader::new(self.queue.clone(), consume)
    }

    pub fn get_reader(&self, consume: bool) -> MixReader {
        self.get_mix_reader(consume)
    }

    /// Runs the close handshake once and releases the instance.
    ///
    /// Blocks until every remote worker's close notification arrived. Returns
    /// the final traffic snapshot on the call that performed the handshake.
    pub fn close(&self, multiplexer: &Multiplexer) -> Option<StreamStats> {
        if self.is_closed.swap(true, Ordering::AcqRel) {
            return None;
        }
        let stream = fields::format_stream_key(&self.key);
        debug!(
            event = events::STREAM_CLOSE_START,
            component = COMPONENT,
            stream = stream.as_str(),
            "closing stream"
        );

        for sink in self.sinks.iter().filter_map(SinkSlot::as_network) {
            if sink.closed() {
                continue;
            }
            if let Err(err) = sink.close() {
                warn!(
                    event = events::STREAM_CLOSE_SINK_FAILED,
                    component = COMPONENT,
                    stream = stream.as_str(),
                    receiver = fields::format_worker_address(
                        sink.header().receiver_host,
                        sink.header().receiver_worker
                    )
                    .as_str(),
                    err = %err,
                    "unable to send close sentinel"
                );
            }
        }

        for worker in 0..self.config.workers_per_host {
            match multiplexer.mix_loopback(self.key.stream_id, worker) {
                Ok(Some(target)) => {
                    let sink = target.loopback_sink(self.key.local_worker);
                    if !sink.closed() {
                        sink.close();
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(
                        event = events::STREAM_CLOSE_SINK_FAILED,
                        component = COMPONENT,
                        stream = stream.as_str(),
                        receiver = fields::format_worker_address(self.config.host_rank, worker)
                            .as_str(),
                        err = %err,
                        "unable to resolve loopback target"
                    );
                }
            }
        }

        debug!(
            event = events::STREAM_CLOSE_WAIT_ACKS,
            component = COMPONENT,
            stream = stream.as_str(),
            expected = self.handshake.expected(),
            remaining = self.handshake.remaining(),
            "waiting for closing acknowledgements"
        );
        self.handshake.wait_all();
        self.handshake_complete.store(true, Ordering::Release);

        self.timers.tx_lifetime.stop_eventually();
        self.timers.tx_timespan.stop_eventually();
        let stats = self.on_all_closed();

        if self.writers_opened.load(Ordering::Acquire) {
            multiplexer.stream_closed();
        }
        multiplexer.release(&self.key);

        debug!(
            event = events::STREAM_CLOSE_OK,
            component = COMPONENT,
            stream = stream.as_str(),
            "stream closed"
        );
        Some(stats)
    }

    /// True once the handshake finished, or once closing started and every
    /// source finished writing.
    pub fn closed(&self) -> bool {
        if self.handshake_complete.load(Ordering::Acquire) {
            return true;
        }
        self.is_closed.load(Ordering::Acquire) && self.queue.write_closed()
    }

    /// Ingests a block received from global worker `from`.
    ///
    /// # Panics
    ///
    /// Panics if `from` is not a valid global worker index.
    pub fn on_stream_block(&self, from: usize, block: Block) -> Result<(), StreamError> {
        assert!(
            from < self.queue.num_workers(),
            "block from source {from} out of range for {} workers",
            self.queue.num_workers()
        );
        if self.handshake_complete.load(Ordering::Acquire) {
            return Err(StreamError::IngestAfterClose {
                stream_id: self.key.stream_id,
                worker: self.key.local_worker,
            });
        }

        self.timers.rx_timespan.start_eventually();
        self.counters
            .rx_net
            .add_block(block.num_items(), block.size());

        if tracing::enabled!(Level::DEBUG) {
            debug!(
                event = events::STREAM_BLOCK_RECEIVED,
                component = COMPONENT,
                stream = fields::format_stream_key(&self.key).as_str(),
                source = from,
                items = block.num_items(),
                bytes = block.size(),
                "received block"
            );
        }

        self.queue.append_block(from, block);
        Ok(())
    }

    /// Ingests the close notification of global worker `from`.
    ///
    /// # Panics
    ///
    /// Panics if `from` is out of range, lives on this host, closes twice, or
    /// exceeds the expected number of notifications.
    pub fn on_close_stream(&self, from: usize) {
        assert!(
            from < self.queue.num_workers(),
            "close from source {from} out of range for {} workers",
            self.queue.num_workers()
        );
        assert!(
            from / self.config.workers_per_host != self.config.host_rank,
            "close notification from local source {from}"
        );
        self.queue.close(from);
        self.counters.rx_net.add_sentinel();

        debug!(
            event = events::STREAM_CLOSE_RECEIVED,
            component = COMPONENT,
            stream = fields::format_stream_key(&self.key).as_str(),
            source = from,
            "received close notification"
        );

        if self.handshake.acknowledge() {
            self.timers.rx_lifetime.stop_eventually();
            self.timers.rx_timespan.stop_eventually();
        }
    }

    /// Snapshot of traffic counters and timers.
    pub fn stats(&self) -> StreamStats {
        stats::snapshot(&self.counters, &self.timers)
    }

    fn on_all_closed(&self) -> StreamStats {
        let stats = self.stats();
        info!(
            event = events::STREAM_ALL_CLOSED,
            component = COMPONENT,
            stream = fields::format_stream_key(&self.key).as_str(),
            dia_id = self.dia_id(),
            tx_net_items = stats.tx_net.items,
            tx_net_bytes = stats.tx_net.bytes,
            tx_net_blocks = stats.tx_net.blocks,
            tx_int_items = stats.tx_int.items,
            tx_int_bytes = stats.tx_int.bytes,
            tx_int_blocks = stats.tx_int.blocks,
            rx_net_items = stats.rx_net.items,
            rx_net_bytes = stats.rx_net.bytes,
            rx_net_blocks = stats.rx_net.blocks,
            rx_int_items = stats.rx_int.items,
            rx_int_bytes = stats.rx_int.bytes,
            rx_int_blocks = stats.rx_int.blocks,
            tx_lifetime_ms = stats.tx_lifetime_ms as u64,
            rx_lifetime_ms = stats.rx_lifetime_ms as u64,
            tx_timespan_ms = stats.tx_timespan_ms as u64,
            rx_timespan_ms = stats.rx_timespan_ms as u64,
            "all close notifications exchanged"
        );
        stats
    }
}

/// An instance released without a close handshake still tells every peer it
/// is done: remote workers get their close sentinel and the loopback inlets
/// into this queue are closed. Inlets into other local workers' queues are
/// only reachable through the multiplexer and stay as they are.
impl Drop for MixStreamData {
    fn drop(&mut self) {
        if self.is_closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let stream = fields::format_stream_key(&self.key);
        warn!(
            event = events::STREAM_DROPPED_OPEN,
            component = COMPONENT,
            stream = stream.as_str(),
            "stream instance dropped without closing"
        );

        for sink in self.sinks.iter().filter_map(SinkSlot::as_network) {
            if let Err(err) = sink.close_detached() {
                warn!(
                    event = events::STREAM_CLOSE_SINK_FAILED,
                    component = COMPONENT,
                    stream = stream.as_str(),
                    receiver = fields::format_worker_address(
                        sink.header().receiver_host,
                        sink.header().receiver_worker
                    )
                    .as_str(),
                    err = %err,
                    "unable to send close sentinel"
                );
            }
        }
        for inlet in &self.loopback {
            inlet.close();
        }
    }
}
