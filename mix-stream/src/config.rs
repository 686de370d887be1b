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

//! Multiplexer topology and memory-budget configuration.

use crate::error::StreamError;
use serde::{Deserialize, Serialize};

/// Block size used when the RAM budget does not yield a smaller power of two.
pub const DEFAULT_BLOCK_SIZE: usize = 2 * 1024 * 1024;

/// Frames buffered per destination host before network writers block.
pub const DEFAULT_EGRESS_QUEUE_SIZE: usize = 64;

fn default_block_size() -> usize {
    DEFAULT_BLOCK_SIZE
}

fn default_egress_queue_size() -> usize {
    DEFAULT_EGRESS_QUEUE_SIZE
}

/// Topology of the job as seen from one host, plus the shared memory budget.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MultiplexerConfig {
    pub num_hosts: usize,
    pub workers_per_host: usize,
    pub host_rank: usize,
    pub hard_ram_limit: usize,
    #[serde(default = "default_block_size")]
    pub default_block_size: usize,
    #[serde(default = "default_egress_queue_size")]
    pub egress_queue_size: usize,
}

impl MultiplexerConfig {
    pub fn new(
        num_hosts: usize,
        workers_per_host: usize,
        host_rank: usize,
        hard_ram_limit: usize,
    ) -> Self {
        Self {
            num_hosts,
            workers_per_host,
            host_rank,
            hard_ram_limit,
            default_block_size: DEFAULT_BLOCK_SIZE,
            egress_queue_size: DEFAULT_EGRESS_QUEUE_SIZE,
        }
    }

    /// Total number of workers in the job.
    pub fn num_workers(&self) -> usize {
        self.num_hosts * self.workers_per_host
    }

    /// Global index of a worker address.
    pub fn global_worker(&self, host: usize, worker: usize) -> usize {
        host * self.workers_per_host + worker
    }

    pub fn validate(&self) -> Result<(), StreamError> {
        if self.num_hosts == 0 || self.workers_per_host == 0 {
            return Err(StreamError::InvalidConfig(format!(
                "topology must have at least one worker, got {} hosts x {} workers",
                self.num_hosts, self.workers_per_host
            )));
        }
        if self.host_rank >= self.num_hosts {
            return Err(StreamError::InvalidConfig(format!(
                "host_rank {} out of range for {} hosts",
                self.host_rank, self.num_hosts
            )));
        }
        if self.egress_queue_size == 0 {
            return Err(StreamError::InvalidConfig(
                "egress_queue_size must be positive".to_string(),
            ));
        }
        if self.default_block_size == 0 {
            return Err(StreamError::InvalidConfig(
                "default_block_size must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Block size for writers of one stream, see [`block_size_for`].
    pub fn block_size(&self) -> usize {
        block_size_for(
            self.hard_ram_limit,
            self.num_workers(),
            self.default_block_size,
        )
    }
}

/// Largest power of two not above `value`, or zero for zero.
pub fn round_down_to_power_of_two(value: usize) -> usize {
    if value == 0 {
        0
    } else {
        1 << (usize::BITS - 1 - value.leading_zeros())
    }
}

/// Derives the writer block size from the shared RAM budget.
///
/// A sixteenth of the budget is split across every worker of the job and rounded
/// down to a power of two. Zero or anything above `default_block_size` falls back
/// to `default_block_size`.
pub fn block_size_for(
    hard_ram_limit: usize,
    total_workers: usize,
    default_block_size: usize,
) -> usize {
    let block_size_base = hard_ram_limit / 16 / total_workers.max(1);
    let block_size = round_down_to_power_of_two(block_size_base);
    if block_size == 0 || block_size > default_block_size {
        default_block_size
    } else {
        block_size
    }
}

#[cfg(test)]
mod tests {
    use super::{
        block_size_for, round_down_to_power_of_two, MultiplexerConfig, DEFAULT_BLOCK_SIZE,
        DEFAULT_EGRESS_QUEUE_SIZE,
    };

    const GIB: usize = 1024 * 1024 * 1024;

    #[test]
    fn round_down_to_power_of_two_keeps_exact_powers() {
        assert_eq!(round_down_to_power_of_two(0), 0);
        assert_eq!(round_down_to_power_of_two(1), 1);
        assert_eq!(round_down_to_power_of_two(4096), 4096);
        assert_eq!(round_down_to_power_of_two(4097), 4096);
        assert_eq!(round_down_to_power_of_two(8191), 4096);
    }

    #[test]
    fn block_size_for_one_gib_and_eight_workers_is_clamped_to_default() {
        let expected = round_down_to_power_of_two(GIB / 16 / 8);
        assert_eq!(expected, 8 * 1024 * 1024);

        assert_eq!(block_size_for(GIB, 8, DEFAULT_BLOCK_SIZE), DEFAULT_BLOCK_SIZE);
        assert_eq!(block_size_for(GIB, 8, 16 * 1024 * 1024), expected);
    }

    #[test]
    fn block_size_for_small_budget_rounds_down() {
        // 100 MiB / 16 / 8 = 800 KiB, rounded down to 512 KiB
        assert_eq!(
            block_size_for(100 * 1024 * 1024, 8, DEFAULT_BLOCK_SIZE),
            512 * 1024
        );
    }

    #[test]
    fn block_size_for_tiny_budget_falls_back_to_default() {
        assert_eq!(block_size_for(8, 8, DEFAULT_BLOCK_SIZE), DEFAULT_BLOCK_SIZE);
        assert_eq!(block_size_for(0, 8, DEFAULT_BLOCK_SIZE), DEFAULT_BLOCK_SIZE);
    }

    #[test]
    fn validate_rejects_host_rank_outside_topology() {
        let config = MultiplexerConfig::new(2, 2, 2, GIB);
        assert!(config.validate().is_err());

        let config = MultiplexerConfig::new(0, 2, 0, GIB);
        assert!(config.validate().is_err());

        let config = MultiplexerConfig::new(2, 2, 1, GIB);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_parses_from_json5_with_defaults() {
        let config: MultiplexerConfig = json5::from_str(
            r#"{
                // two hosts, four workers each
                num_hosts: 2,
                workers_per_host: 4,
                host_rank: 1,
                hard_ram_limit: 1073741824,
            }"#,
        )
        .expect("config should parse");

        assert_eq!(config.num_workers(), 8);
        assert_eq!(config.global_worker(1, 3), 7);
        assert_eq!(config.default_block_size, DEFAULT_BLOCK_SIZE);
        assert_eq!(config.egress_queue_size, DEFAULT_EGRESS_QUEUE_SIZE);
    }

    #[test]
    fn config_rejects_unknown_fields() {
        let parsed: Result<MultiplexerConfig, _> = json5::from_str(
            r#"{ num_hosts: 1, workers_per_host: 1, host_rank: 0, hard_ram_limit: 0, extra: 1 }"#,
        );

        assert!(parsed.is_err());
    }
}
