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

//! Consumer handle over a stream's mixing queue.

use crate::error::StreamError;
use crate::mix::queue::{MixBlock, MixBlockQueue, ReadState};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::sync::mpsc::error::TryRecvError;

/// Outcome of a non-blocking read.
#[derive(Debug, PartialEq)]
pub enum TryNext {
    Block(MixBlock),
    /// No source has data ready, but not every source finished.
    Empty,
    /// Every source finished and all blocks were delivered.
    Finished,
}

#[derive(Debug)]
enum ReadMode {
    Live,
    Replay { position: usize },
}

/// Yields blocks from all sources in arrival order.
///
/// A consuming reader drops each block from the queue as it hands it out. A
/// non-consuming reader keeps a copy so that, once the stream has been read to
/// the end, later readers replay the same sequence.
///
/// The blocking methods park the calling thread and must be used from worker
/// threads, not from inside an async runtime.
#[derive(Debug)]
pub struct MixReader {
    queue: Arc<MixBlockQueue>,
    consume: bool,
    mode: ReadMode,
}

impl MixReader {
    pub(crate) fn new(queue: Arc<MixBlockQueue>, consume: bool) -> Self {
        let mode = if queue.read_closed() {
            ReadMode::Replay { position: 0 }
        } else {
            ReadMode::Live
        };
        Self {
            queue,
            consume,
            mode,
        }
    }

    pub fn consume(&self) -> bool {
        self.consume
    }

    /// True once the end of `source` was observed, which happens only after
    /// every block of that source was delivered.
    pub fn source_finished(&self, source: usize) -> bool {
        self.queue.source_read_closed(source)
    }

    /// Blocks until a block is available or every source finished.
    pub fn next_block(&mut self) -> Option<MixBlock> {
        let consume = self.consume;
        match &mut self.mode {
            ReadMode::Replay { position } => {
                let state = self.queue.read.blocking_lock();
                Self::replay_next(&state, position)
            }
            ReadMode::Live => {
                let mut state = self.queue.read.blocking_lock();
                while !self.queue.read_closed() {
                    let event = state.rx.blocking_recv()?;
                    if let Some(mix_block) = self.queue.accept(&mut state, event, consume) {
                        return Some(mix_block);
                    }
                }
                None
            }
        }
    }

    /// Async counterpart of [`next_block`](Self::next_block).
    pub async fn next_block_async(&mut self) -> Option<MixBlock> {
        let consume = self.consume;
        match &mut self.mode {
            ReadMode::Replay { position } => {
                let state = self.queue.read.lock().await;
                Self::replay_next(&state, position)
            }
            ReadMode::Live => {
                let mut state = self.queue.read.lock().await;
                while !self.queue.read_closed() {
                    let event = state.rx.recv().await?;
                    if let Some(mix_block) = self.queue.accept(&mut state, event, consume) {
                        return Some(mix_block);
                    }
                }
                None
            }
        }
    }

    /// Returns immediately, reporting whether data was ready.
    pub fn try_next_block(&mut self) -> TryNext {
        let consume = self.consume;
        let Ok(mut state) = self.queue.read.try_lock() else {
            return TryNext::Empty;
        };
        match &mut self.mode {
            ReadMode::Replay { position } => match Self::replay_next(&state, position) {
                Some(mix_block) => TryNext::Block(mix_block),
                None => TryNext::Finished,
            },
            ReadMode::Live => {
                while !self.queue.read_closed() {
                    match state.rx.try_recv() {
                        Ok(event) => {
                            if let Some(mix_block) =
                                self.queue.accept(&mut state, event, consume)
                            {
                                return TryNext::Block(mix_block);
                            }
                        }
                        Err(TryRecvError::Empty) => return TryNext::Empty,
                        Err(TryRecvError::Disconnected) => return TryNext::Finished,
                    }
                }
                TryNext::Finished
            }
        }
    }

    /// Reads to the end and decodes every item, in delivery order.
    pub fn collect_items<T: DeserializeOwned>(&mut self) -> Result<Vec<T>, StreamError> {
        let mut items = Vec::new();
        while let Some(mix_block) = self.next_block() {
            items.extend(mix_block.block.decode_items::<T>()?);
        }
        Ok(items)
    }

    fn replay_next(state: &ReadState, position: &mut usize) -> Option<MixBlock> {
        let mix_block = state.replay.get(*position).cloned();
        if mix_block.is_some() {
            *position += 1;
        }
        mix_block
    }
}

impl Iterator for MixReader {
    type Item = MixBlock;

    fn next(&mut self) -> Option<MixBlock> {
        self.next_block()
    }
}
