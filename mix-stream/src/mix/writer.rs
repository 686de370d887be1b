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

//! Item writer that packs serialized items into blocks for one sink.

use crate::block::{encode_item, BlockPool};
use crate::error::StreamError;
use crate::mix::sink::WriterSink;
use crate::observability::events;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn, Level};

const COMPONENT: &str = "block_writer";

/// Accumulates items into blocks of `block_size` bytes and emits them to a sink.
///
/// Dropping the writer flushes and closes it.
#[derive(Debug)]
pub struct BlockWriter {
    sink: WriterSink,
    pool: Arc<BlockPool>,
    block_size: usize,
    buffer: Vec<u8>,
    item: Vec<u8>,
    num_items: usize,
    closed: bool,
}

impl BlockWriter {
    pub(crate) fn new(sink: WriterSink, pool: Arc<BlockPool>, block_size: usize) -> Self {
        Self {
            sink,
            pool,
            block_size,
            buffer: Vec::new(),
            item: Vec::new(),
            num_items: 0,
            closed: false,
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn is_loopback(&self) -> bool {
        self.sink.is_loopback()
    }

    pub fn closed(&self) -> bool {
        self.closed
    }

    /// Serializes `item` into the current block, emitting the block first if
    /// the item would not fit.
    pub fn put<T: Serialize>(&mut self, item: &T) -> Result<(), StreamError> {
        if self.closed || self.sink.closed() {
            return Err(StreamError::SinkClosed {
                worker: self.destination_worker(),
            });
        }
        self.item.clear();
        encode_item(item, &mut self.item)?;

        if !self.buffer.is_empty() && self.buffer.len() + self.item.len() > self.block_size {
            self.flush()?;
        }
        self.buffer.extend_from_slice(&self.item);
        self.num_items += 1;

        if self.buffer.len() >= self.block_size {
            self.flush()?;
        }
        Ok(())
    }

    /// Emits the partially filled block, if any.
    pub fn flush(&mut self) -> Result<(), StreamError> {
        if self.num_items == 0 {
            return Ok(());
        }
        let buffer = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.block_size));
        let block = self.pool.seal(buffer, self.num_items);
        self.num_items = 0;

        if tracing::enabled!(Level::DEBUG) {
            debug!(
                event = events::WRITER_FLUSH,
                component = COMPONENT,
                loopback = self.sink.is_loopback(),
                items = block.num_items(),
                bytes = block.size(),
                "emitting block"
            );
        }
        self.sink.append_block(block)
    }

    /// Flushes and closes the sink. Closing twice does nothing.
    pub fn close(&mut self) -> Result<(), StreamError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if !self.sink.closed() {
            self.flush()?;
        }
        self.sink.close()
    }

    fn destination_worker(&self) -> usize {
        match &self.sink {
            WriterSink::Network(sink) => sink.header().receiver_worker,
            WriterSink::Loopback(sink) => sink.target_worker(),
        }
    }
}

impl Drop for BlockWriter {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(
                event = events::WRITER_CLOSE_FAILED,
                component = COMPONENT,
                err = %err,
                "unable to close writer on drop"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::BlockWriter;
    use crate::block::BlockPool;
    use crate::error::StreamError;
    use crate::mix::queue::MixBlockQueue;
    use crate::mix::reader::MixReader;
    use crate::mix::sink::{LoopbackSink, WriterSink};
    use crate::stats::StreamCounters;
    use std::sync::Arc;

    fn loopback_writer(block_size: usize) -> (BlockWriter, Arc<MixBlockQueue>) {
        let queue = Arc::new(MixBlockQueue::new(1, 0, 0));
        let sink = Arc::new(LoopbackSink::new(
            queue.clone(),
            0,
            Arc::new(StreamCounters::default()),
        ));
        let writer = BlockWriter::new(
            WriterSink::Loopback(sink),
            Arc::new(BlockPool::new(1 << 20)),
            block_size,
        );
        (writer, queue)
    }

    #[test]
    fn put_splits_items_at_block_boundary() {
        // each u64 encodes to 8 bytes, so 3 fit into a 24 byte block
        let (mut writer, queue) = loopback_writer(24);
        for item in 0u64..7 {
            writer.put(&item).expect("put should succeed");
        }
        writer.close().expect("close should succeed");

        let blocks: Vec<_> = MixReader::new(queue, true).collect();
        let sizes: Vec<usize> = blocks.iter().map(|b| b.block.num_items()).collect();
        assert_eq!(sizes, vec![3, 3, 1]);

        let items: Vec<u64> = blocks
            .iter()
            .flat_map(|b| b.block.decode_items::<u64>().expect("decode"))
            .collect();
        assert_eq!(items, (0..7).collect::<Vec<_>>());
    }

    #[test]
    fn oversized_item_travels_alone() {
        let (mut writer, queue) = loopback_writer(16);
        writer.put(&1u8).expect("small item");
        writer.put(&vec![0u8; 64]).expect("large item");
        writer.put(&2u8).expect("small item");
        writer.close().expect("close");

        let sizes: Vec<usize> = MixReader::new(queue, true)
            .map(|b| b.block.num_items())
            .collect();
        assert_eq!(sizes, vec![1, 1, 1]);
    }

    #[test]
    fn drop_flushes_and_closes() {
        let (mut writer, queue) = loopback_writer(1024);
        writer.put(&"tail".to_string()).expect("put");
        drop(writer);

        assert!(queue.write_closed());
        let items: Vec<String> = MixReader::new(queue, true).collect_items().expect("read");
        assert_eq!(items, vec!["tail"]);
    }

    #[test]
    fn put_after_close_is_rejected() {
        let (mut writer, _queue) = loopback_writer(1024);
        writer.close().expect("close");

        assert!(writer.closed());
        assert!(matches!(
            writer.put(&1u8),
            Err(StreamError::SinkClosed { .. })
        ));
    }
}
