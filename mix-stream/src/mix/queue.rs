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

//! Multi-producer mixing queue: blocks from every source worker merged in
//! arrival order, with per-source end-of-stream markers.

use crate::block::Block;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;

/// A block together with the global worker index that produced it.
#[derive(Clone, Debug, PartialEq)]
pub struct MixBlock {
    pub source: usize,
    pub block: Block,
}

#[derive(Debug)]
pub(crate) enum QueueEvent {
    Block(MixBlock),
    Closed { source: usize },
}

#[derive(Debug)]
pub(crate) struct ReadState {
    pub(crate) rx: UnboundedReceiver<QueueEvent>,
    /// Blocks handed to non-consuming readers, in delivery order.
    pub(crate) replay: Vec<MixBlock>,
}

/// Merge queue of one stream instance.
///
/// Producers never block: the channel is unbounded and memory pressure is
/// governed by the block budget. Within one source, blocks keep their order;
/// across sources they interleave as they arrive.
#[derive(Debug)]
pub struct MixBlockQueue {
    num_workers: usize,
    local_worker: usize,
    dia_id: AtomicUsize,
    tx: UnboundedSender<QueueEvent>,
    write_open: Vec<AtomicBool>,
    write_open_count: AtomicUsize,
    read_open: Vec<AtomicBool>,
    read_open_count: AtomicUsize,
    pub(crate) read: Mutex<ReadState>,
}

impl MixBlockQueue {
    pub fn new(num_workers: usize, local_worker: usize, dia_id: usize) -> Self {
        let (tx, rx) = unbounded_channel();
        Self {
            num_workers,
            local_worker,
            dia_id: AtomicUsize::new(dia_id),
            tx,
            write_open: (0..num_workers).map(|_| AtomicBool::new(true)).collect(),
            write_open_count: AtomicUsize::new(num_workers),
            read_open: (0..num_workers).map(|_| AtomicBool::new(true)).collect(),
            read_open_count: AtomicUsize::new(num_workers),
            read: Mutex::new(ReadState {
                rx,
                replay: Vec::new(),
            }),
        }
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    pub fn local_worker(&self) -> usize {
        self.local_worker
    }

    pub fn dia_id(&self) -> usize {
        self.dia_id.load(Ordering::Relaxed)
    }

    pub fn set_dia_id(&self, dia_id: usize) {
        self.dia_id.store(dia_id, Ordering::Relaxed);
    }

    /// Makes `block` from `source` available to the reader.
    ///
    /// # Panics
    ///
    /// Panics if `source` is out of range or already closed.
    pub fn append_block(&self, source: usize, block: Block) {
        assert!(
            source < self.num_workers,
            "source {source} out of range for {} workers",
            self.num_workers
        );
        assert!(
            self.write_open[source].load(Ordering::Acquire),
            "block from source {source} after it closed"
        );
        // the receiver lives as long as the queue, so sending cannot fail
        let _ = self
            .tx
            .send(QueueEvent::Block(MixBlock { source, block }));
    }

    /// Marks the end of data from `source`.
    ///
    /// # Panics
    ///
    /// Panics if `source` is out of range or closes twice.
    pub fn close(&self, source: usize) {
        assert!(
            source < self.num_workers,
            "source {source} out of range for {} workers",
            self.num_workers
        );
        assert!(
            self.write_open[source].swap(false, Ordering::AcqRel),
            "source {source} closed twice"
        );
        self.write_open_count.fetch_sub(1, Ordering::AcqRel);
        let _ = self.tx.send(QueueEvent::Closed { source });
    }

    /// True once `source` called [`close`](Self::close).
    pub fn source_write_closed(&self, source: usize) -> bool {
        !self.write_open[source].load(Ordering::Acquire)
    }

    /// True once every source closed.
    pub fn write_closed(&self) -> bool {
        self.write_open_count.load(Ordering::Acquire) == 0
    }

    /// True once the reader observed the end of `source`.
    pub fn source_read_closed(&self, source: usize) -> bool {
        !self.read_open[source].load(Ordering::Acquire)
    }

    /// True once the reader observed the end of every source.
    pub fn read_closed(&self) -> bool {
        self.read_open_count.load(Ordering::Acquire) == 0
    }

    /// Applies one dequeued event; returns the block for block events.
    pub(crate) fn accept(
        &self,
        state: &mut ReadState,
        event: QueueEvent,
        consume: bool,
    ) -> Option<MixBlock> {
        match event {
            QueueEvent::Block(mix_block) => {
                if !consume {
                    state.replay.push(mix_block.clone());
                }
                Some(mix_block)
            }
            QueueEvent::Closed { source } => {
                self.read_open[source].store(false, Ordering::Release);
                self.read_open_count.fetch_sub(1, Ordering::AcqRel);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::MixBlockQueue;
    use crate::block::Block;

    #[test]
    fn write_closed_after_every_source_closes() {
        let queue = MixBlockQueue::new(3, 0, 0);

        queue.close(0);
        queue.close(2);
        assert!(!queue.write_closed());
        assert!(queue.source_write_closed(2));
        assert!(!queue.source_write_closed(1));

        queue.close(1);
        assert!(queue.write_closed());
        assert!(!queue.read_closed());
    }

    #[test]
    #[should_panic(expected = "closed twice")]
    fn closing_a_source_twice_panics() {
        let queue = MixBlockQueue::new(2, 0, 0);
        queue.close(1);
        queue.close(1);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn append_from_unknown_source_panics() {
        let queue = MixBlockQueue::new(2, 0, 0);
        queue.append_block(2, Block::from_items(&[1u8]).expect("encode"));
    }

    #[test]
    #[should_panic(expected = "after it closed")]
    fn append_after_source_close_panics() {
        let queue = MixBlockQueue::new(2, 0, 0);
        queue.close(0);
        queue.append_block(0, Block::from_items(&[1u8]).expect("encode"));
    }

    #[test]
    fn dia_id_can_be_updated() {
        let queue = MixBlockQueue::new(1, 0, 5);
        queue.set_dia_id(9);

        assert_eq!(queue.dia_id(), 9);
        assert_eq!(queue.num_workers(), 1);
        assert_eq!(queue.local_worker(), 0);
    }
}
