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

//! Block sinks: network transmission toward a remote worker, or direct
//! delivery into another local worker's mixing queue.

use crate::block::Block;
use crate::error::StreamError;
use crate::frame::{Frame, FrameHeader};
use crate::mix::queue::MixBlockQueue;
use crate::stats::StreamCounters;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::Sender;

/// Sends framed blocks toward one remote worker through the host's egress queue.
#[derive(Debug)]
pub struct NetworkSink {
    header: FrameHeader,
    egress: Sender<Frame>,
    closed: AtomicBool,
    counters: Arc<StreamCounters>,
}

impl NetworkSink {
    pub(crate) fn new(
        header: FrameHeader,
        egress: Sender<Frame>,
        counters: Arc<StreamCounters>,
    ) -> Self {
        Self {
            header,
            egress,
            closed: AtomicBool::new(false),
            counters,
        }
    }

    pub fn header(&self) -> &FrameHeader {
        &self.header
    }

    /// Queues `block` for transmission, waiting while the egress queue is full.
    pub fn append_block(&self, block: Block) -> Result<(), StreamError> {
        if self.closed() {
            return Err(StreamError::SinkClosed {
                worker: self.header.receiver_worker,
            });
        }
        self.counters
            .tx_net
            .add_block(block.num_items(), block.size());
        self.send(Frame::block(self.header, block))
    }

    /// Sends the close sentinel once; later calls do nothing.
    pub fn close(&self) -> Result<(), StreamError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.counters.tx_net.add_sentinel();
        self.send(Frame::close(self.header))
    }

    pub fn closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Sends the close sentinel from a context that may be a runtime thread.
    ///
    /// Outside a runtime this waits for queue space like [`close`](Self::close);
    /// inside one it fails with [`StreamError::EgressFull`] instead of parking.
    pub(crate) fn close_detached(&self) -> Result<(), StreamError> {
        if tokio::runtime::Handle::try_current().is_err() {
            return self.close();
        }
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.counters.tx_net.add_sentinel();
        let host = self.header.receiver_host;
        self.egress
            .try_send(Frame::close(self.header))
            .map_err(|err| match err {
                TrySendError::Full(_) => StreamError::EgressFull { host },
                TrySendError::Closed(_) => StreamError::EgressClosed { host },
            })
    }

    fn send(&self, frame: Frame) -> Result<(), StreamError> {
        self.egress
            .blocking_send(frame)
            .map_err(|_| StreamError::EgressClosed {
                host: self.header.receiver_host,
            })
    }
}

/// Delivers blocks from one local worker straight into another local worker's
/// mixing queue.
#[derive(Debug)]
pub struct LoopbackSink {
    queue: Arc<MixBlockQueue>,
    source: usize,
    closed: AtomicBool,
    target_counters: Arc<StreamCounters>,
    source_counters: Mutex<Option<Arc<StreamCounters>>>,
}

impl LoopbackSink {
    pub(crate) fn new(
        queue: Arc<MixBlockQueue>,
        source: usize,
        target_counters: Arc<StreamCounters>,
    ) -> Self {
        Self {
            queue,
            source,
            closed: AtomicBool::new(false),
            target_counters,
            source_counters: Mutex::new(None),
        }
    }

    /// Global worker index this sink reports as the block source.
    pub fn source(&self) -> usize {
        self.source
    }

    /// Local worker owning the target queue.
    pub fn target_worker(&self) -> usize {
        self.queue.local_worker()
    }

    /// Attributes loopback transmissions to the producing stream.
    pub(crate) fn set_source_counters(&self, counters: Arc<StreamCounters>) {
        let mut source_counters = self
            .source_counters
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        *source_counters = Some(counters);
    }

    pub fn append_block(&self, block: Block) -> Result<(), StreamError> {
        if self.closed() {
            return Err(StreamError::SinkClosed {
                worker: self.target_worker(),
            });
        }
        self.target_counters
            .rx_int
            .add_block(block.num_items(), block.size());
        if let Some(counters) = self
            .source_counters
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
        {
            counters.tx_int.add_block(block.num_items(), block.size());
        }
        self.queue.append_block(self.source, block);
        Ok(())
    }

    /// Marks the source finished in the target queue; later calls do nothing.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.queue.close(self.source);
    }

    pub fn closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Entry of a stream's per-destination sink array.
#[derive(Debug)]
pub enum SinkSlot {
    Network(Arc<NetworkSink>),
    /// Destination on this host; reached through loopback instead.
    Unused,
}

impl SinkSlot {
    pub fn as_network(&self) -> Option<&Arc<NetworkSink>> {
        match self {
            SinkSlot::Network(sink) => Some(sink),
            SinkSlot::Unused => None,
        }
    }
}

/// Sink a writer emits its blocks to.
#[derive(Clone, Debug)]
pub enum WriterSink {
    Network(Arc<NetworkSink>),
    Loopback(Arc<LoopbackSink>),
}

impl WriterSink {
    pub fn append_block(&self, block: Block) -> Result<(), StreamError> {
        match self {
            WriterSink::Network(sink) => sink.append_block(block),
            WriterSink::Loopback(sink) => sink.append_block(block),
        }
    }

    pub fn close(&self) -> Result<(), StreamError> {
        match self {
            WriterSink::Network(sink) => sink.close(),
            WriterSink::Loopback(sink) => {
                sink.close();
                Ok(())
            }
        }
    }

    pub fn closed(&self) -> bool {
        match self {
            WriterSink::Network(sink) => sink.closed(),
            WriterSink::Loopback(sink) => sink.closed(),
        }
    }

    pub fn is_loopback(&self) -> bool {
        matches!(self, WriterSink::Loopback(_))
    }
}
