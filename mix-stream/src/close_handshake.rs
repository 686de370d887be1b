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

//! Counting wait behind the close handshake.

use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Semaphore;

/// Close notifications a stream instance must receive before it may finish
/// closing: one from every worker on every other host.
pub fn expected_closing_acks(num_hosts: usize, workers_per_host: usize) -> usize {
    num_hosts.saturating_sub(1) * workers_per_host
}

/// Countdown of remote close notifications plus the wait primitive the close
/// sequence blocks on.
#[derive(Debug)]
pub struct ClosingHandshake {
    expected: usize,
    remaining: AtomicUsize,
    acks: Semaphore,
}

impl ClosingHandshake {
    pub fn new(expected: usize) -> Self {
        Self {
            expected,
            remaining: AtomicUsize::new(expected),
            acks: Semaphore::new(0),
        }
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::Acquire)
    }

    /// Records one close notification. Returns `true` for the last expected one.
    ///
    /// # Panics
    ///
    /// Panics when more notifications arrive than expected.
    pub fn acknowledge(&self) -> bool {
        let previous = self
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |remaining| {
                remaining.checked_sub(1)
            });
        let reached_zero = match previous {
            Ok(previous) => previous == 1,
            Err(_) => panic!(
                "received more than {} closing acknowledgements",
                self.expected
            ),
        };
        self.acks.add_permits(1);
        reached_zero
    }

    /// Blocks the calling thread until every expected notification arrived.
    pub fn wait_all(&self) {
        if self.expected == 0 {
            return;
        }
        let permits = u32::try_from(self.expected).unwrap_or(u32::MAX);
        // the semaphore is never closed, so acquiring can only succeed
        if let Ok(permit) = futures::executor::block_on(self.acks.acquire_many(permits)) {
            permit.forget();
        }
    }

    /// Returns `true` without blocking if every notification already arrived.
    pub fn try_wait_all(&self) -> bool {
        if self.expected == 0 {
            return true;
        }
        let permits = u32::try_from(self.expected).unwrap_or(u32::MAX);
        match self.acks.try_acquire_many(permits) {
            Ok(permit) => {
                permit.forget();
                true
            }
            Err(_) => false,
        }
    }
}
