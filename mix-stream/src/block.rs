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

//! Serialized item blocks and the shared block memory budget.

use crate::error::StreamError;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

fn item_config() -> impl bincode::config::Config {
    bincode::config::standard().with_fixed_int_encoding()
}

/// Appends one encoded item to `buffer`, returning the encoded length.
pub(crate) fn encode_item<T: Serialize>(
    item: &T,
    buffer: &mut Vec<u8>,
) -> Result<usize, StreamError> {
    let encoded = bincode::serde::encode_to_vec(item, item_config())?;
    buffer.extend_from_slice(&encoded);
    Ok(encoded.len())
}

/// Immutable buffer of serialized items; clones share the same memory.
#[derive(Clone, PartialEq, Eq)]
pub struct Block {
    data: Bytes,
    num_items: usize,
}

impl Block {
    pub fn new(data: Bytes, num_items: usize) -> Self {
        Self { data, num_items }
    }

    /// Encodes `items` into a single block.
    pub fn from_items<T: Serialize>(items: &[T]) -> Result<Self, StreamError> {
        let mut buffer = Vec::new();
        for item in items {
            encode_item(item, &mut buffer)?;
        }
        Ok(Self::new(Bytes::from(buffer), items.len()))
    }

    /// Payload size in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn num_items(&self) -> usize {
        self.num_items
    }

    pub fn is_empty(&self) -> bool {
        self.num_items == 0
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Decodes every item of the block in order.
    pub fn decode_items<T: DeserializeOwned>(&self) -> Result<Vec<T>, StreamError> {
        let mut items = Vec::with_capacity(self.num_items);
        let mut offset = 0;
        while items.len() < self.num_items {
            let (item, read) =
                bincode::serde::decode_from_slice::<T, _>(&self.data[offset..], item_config())?;
            offset += read;
            items.push(item);
        }
        Ok(items)
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block")
            .field("size", &self.data.len())
            .field("num_items", &self.num_items)
            .finish()
    }
}

/// Process-wide block memory budget.
///
/// Only the budget and aggregate counters live here; blocks themselves are
/// reference counted and freed when their last clone drops.
#[derive(Debug)]
pub struct BlockPool {
    hard_ram_limit: usize,
    allocated_bytes: AtomicUsize,
    total_blocks: AtomicUsize,
}

impl BlockPool {
    pub fn new(hard_ram_limit: usize) -> Self {
        Self {
            hard_ram_limit,
            allocated_bytes: AtomicUsize::new(0),
            total_blocks: AtomicUsize::new(0),
        }
    }

    pub fn hard_ram_limit(&self) -> usize {
        self.hard_ram_limit
    }

    /// Seals a writer buffer into a block and accounts for it.
    pub(crate) fn seal(&self, buffer: Vec<u8>, num_items: usize) -> Block {
        self.allocated_bytes.fetch_add(buffer.len(), Ordering::Relaxed);
        self.total_blocks.fetch_add(1, Ordering::Relaxed);
        Block::new(Bytes::from(buffer), num_items)
    }

    /// Bytes sealed into blocks over the lifetime of the pool.
    pub fn allocated_bytes(&self) -> usize {
        self.allocated_bytes.load(Ordering::Relaxed)
    }

    pub fn total_blocks(&self) -> usize {
        self.total_blocks.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::{Block, BlockPool};

    #[test]
    fn decode_items_returns_items_in_encoding_order() {
        let block = Block::from_items(&["A".to_string(), "B".to_string(), "C".to_string()])
            .expect("items should encode");

        assert_eq!(block.num_items(), 3);
        assert_eq!(
            block.decode_items::<String>().expect("items should decode"),
            vec!["A", "B", "C"]
        );
    }

    #[test]
    fn clones_share_payload() {
        let block = Block::from_items(&[1u64, 2, 3]).expect("items should encode");
        let clone = block.clone();

        assert_eq!(block.data().as_ptr(), clone.data().as_ptr());
        assert_eq!(block.size(), 24);
    }

    #[test]
    fn decode_with_wrong_type_reports_error() {
        let block = Block::from_items(&[1u8]).expect("items should encode");

        assert!(block.decode_items::<u64>().is_err());
    }

    #[test]
    fn pool_accounts_sealed_blocks() {
        let pool = BlockPool::new(1024);
        let block = pool.seal(vec![0u8; 10], 2);

        assert_eq!(block.size(), 10);
        assert_eq!(pool.allocated_bytes(), 10);
        assert_eq!(pool.total_blocks(), 1);
        assert_eq!(pool.hard_ram_limit(), 1024);
    }
}
