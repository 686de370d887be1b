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

//! Deterministic benchmark fixtures for the Criterion harness.

use crate::block::Block;
use crate::config::MultiplexerConfig;
use crate::data_plane::egress_worker::EgressWorker;
use crate::error::{StreamError, TransportError};
use crate::frame::{Connection, Frame, FrameHeader, MagicByte};
use crate::mix::queue::MixBlockQueue;
use crate::mix::reader::MixReader;
use crate::multiplexer::Multiplexer;
use crate::StreamId;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use tokio::sync::mpsc;

/// Fixed fixture for `mixing_queue/*` benchmark IDs.
pub struct MixingQueueFixture {
    sources: usize,
    blocks_per_source: usize,
    block: Block,
}

impl MixingQueueFixture {
    pub fn new(
        sources: usize,
        blocks_per_source: usize,
        items_per_block: usize,
    ) -> Result<Self, StreamError> {
        let items: Vec<u64> = (0..items_per_block as u64).collect();
        Ok(Self {
            sources: sources.max(1),
            blocks_per_source,
            block: Block::from_items(&items)?,
        })
    }

    /// Pushes every block from one producer thread per source and drains the
    /// queue with a consuming reader. Returns the number of blocks read.
    pub fn run_concurrent_producers(&self) -> usize {
        let queue = Arc::new(MixBlockQueue::new(self.sources, 0, 0));
        let producers: Vec<_> = (0..self.sources)
            .map(|source| {
                let queue = queue.clone();
                let block = self.block.clone();
                let blocks = self.blocks_per_source;
                thread::spawn(move || {
                    for _ in 0..blocks {
                        queue.append_block(source, block.clone());
                    }
                    queue.close(source);
                })
            })
            .collect();

        let read = MixReader::new(queue, true).count();
        for producer in producers {
            let _ = producer.join();
        }
        read
    }
}

/// Runs one stream on a single host with `workers` worker threads, each writing
/// `items_per_destination` items to every worker through loopback. Returns the
/// total number of items read.
pub fn run_loopback_exchange_once(
    workers: usize,
    items_per_destination: usize,
) -> Result<usize, StreamError> {
    let config = MultiplexerConfig::new(1, workers.max(1), 0, 256 * 1024 * 1024);
    let multiplexer = Multiplexer::new(config, vec![None])?;

    let handles: Vec<_> = (0..multiplexer.workers_per_host())
        .map(|worker| {
            let multiplexer = multiplexer.clone();
            thread::spawn(move || -> Result<usize, StreamError> {
                let stream = multiplexer.get_new_mix_stream(worker, 0)?;
                for mut writer in stream.get_writers()? {
                    for item in 0..items_per_destination as u64 {
                        writer.put(&item)?;
                    }
                    writer.close()?;
                }
                let items = stream.get_reader(true)?.collect_items::<u64>()?;
                stream.close();
                Ok(items.len())
            })
        })
        .collect();

    let mut total = 0;
    for handle in handles {
        total += handle
            .join()
            .map_err(|_| StreamError::InvalidConfig("worker thread panicked".to_string()))??;
    }
    Ok(total)
}

#[derive(Default)]
struct CountingConnection {
    send_count: AtomicUsize,
}

#[async_trait]
impl Connection for CountingConnection {
    async fn send(&self, _frame: Frame) -> Result<(), TransportError> {
        self.send_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Executes one in-process egress dispatch cycle and returns the send count.
pub async fn run_egress_dispatch_once(frames: usize) -> usize {
    let counting = Arc::new(CountingConnection::default());
    let connection: Arc<dyn Connection> = counting.clone();
    let header = FrameHeader {
        magic: MagicByte::MixStreamBlock,
        stream_id: StreamId::new(0),
        sender_host: 0,
        sender_worker: 0,
        receiver_host: 1,
        receiver_worker: 0,
    };

    let (sender, receiver) = mpsc::channel(frames.max(1));
    for _ in 0..frames {
        if sender.send(Frame::close(header)).await.is_err() {
            break;
        }
    }
    drop(sender);

    EgressWorker::dispatch_loop(
        "benchmark-egress-dispatch".to_string(),
        1,
        connection,
        receiver,
    )
    .await;

    counting.send_count.load(Ordering::Relaxed)
}
