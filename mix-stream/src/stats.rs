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

//! Per-stream traffic counters and timers.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct TimespanState {
    started: Option<Instant>,
    elapsed: Option<Duration>,
}

/// Wall-clock span that starts and stops at most once.
#[derive(Debug, Default)]
pub struct Timespan {
    state: Mutex<TimespanState>,
}

impl Timespan {
    pub fn new() -> Self {
        Self::default()
    }

    /// A timespan that is already running.
    pub fn started() -> Self {
        let timespan = Self::new();
        timespan.start_eventually();
        timespan
    }

    /// Starts the span unless it already started.
    pub fn start_eventually(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.started.is_none() {
            state.started = Some(Instant::now());
        }
    }

    /// Stops a running span unless it already stopped.
    pub fn stop_eventually(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if let (Some(started), None) = (state.started, state.elapsed) {
            state.elapsed = Some(started.elapsed());
        }
    }

    pub fn is_running(&self) -> bool {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.started.is_some() && state.elapsed.is_none()
    }

    /// Elapsed time so far, frozen once stopped.
    pub fn elapsed(&self) -> Duration {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        match (state.started, state.elapsed) {
            (_, Some(elapsed)) => elapsed,
            (Some(started), None) => started.elapsed(),
            (None, None) => Duration::ZERO,
        }
    }
}

/// Item/byte/block triple of one traffic direction.
#[derive(Debug, Default)]
pub struct TrafficCounter {
    items: AtomicU64,
    bytes: AtomicU64,
    blocks: AtomicU64,
}

impl TrafficCounter {
    pub fn add_block(&self, items: usize, bytes: usize) {
        self.items.fetch_add(items as u64, Ordering::Relaxed);
        self.bytes.fetch_add(bytes as u64, Ordering::Relaxed);
        self.blocks.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts a close sentinel, which travels as an empty block.
    pub fn add_sentinel(&self) {
        self.blocks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TrafficStats {
        TrafficStats {
            items: self.items.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            blocks: self.blocks.load(Ordering::Relaxed),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct TrafficStats {
    pub items: u64,
    pub bytes: u64,
    pub blocks: u64,
}

/// Counters shared between a stream and the sinks feeding or draining it.
#[derive(Debug, Default)]
pub struct StreamCounters {
    pub rx_net: TrafficCounter,
    pub rx_int: TrafficCounter,
    pub tx_net: TrafficCounter,
    pub tx_int: TrafficCounter,
}

/// Point-in-time view of one stream's traffic and timers.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct StreamStats {
    pub rx_net: TrafficStats,
    pub rx_int: TrafficStats,
    pub tx_net: TrafficStats,
    pub tx_int: TrafficStats,
    pub tx_lifetime_ms: u128,
    pub rx_lifetime_ms: u128,
    pub tx_timespan_ms: u128,
    pub rx_timespan_ms: u128,
}

#[derive(Debug)]
pub(crate) struct StreamTimers {
    pub(crate) tx_lifetime: Timespan,
    pub(crate) rx_lifetime: Timespan,
    pub(crate) tx_timespan: Timespan,
    pub(crate) rx_timespan: Timespan,
}

impl StreamTimers {
    pub(crate) fn new() -> Self {
        Self {
            tx_lifetime: Timespan::started(),
            rx_lifetime: Timespan::started(),
            tx_timespan: Timespan::new(),
            rx_timespan: Timespan::new(),
        }
    }
}

pub(crate) fn snapshot(counters: &StreamCounters, timers: &StreamTimers) -> StreamStats {
    StreamStats {
        rx_net: counters.rx_net.snapshot(),
        rx_int: counters.rx_int.snapshot(),
        tx_net: counters.tx_net.snapshot(),
        tx_int: counters.tx_int.snapshot(),
        tx_lifetime_ms: timers.tx_lifetime.elapsed().as_millis(),
        rx_lifetime_ms: timers.rx_lifetime.elapsed().as_millis(),
        tx_timespan_ms: timers.tx_timespan.elapsed().as_millis(),
        rx_timespan_ms: timers.rx_timespan.elapsed().as_millis(),
    }
}

#[cfg(test)]
mod tests {
    use super::{Timespan, TrafficCounter};
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn timespan_start_is_idempotent() {
        let timespan = Timespan::new();
        assert!(!timespan.is_running());
        assert_eq!(timespan.elapsed(), Duration::ZERO);

        timespan.start_eventually();
        sleep(Duration::from_millis(5));
        timespan.start_eventually();

        assert!(timespan.is_running());
        assert!(timespan.elapsed() >= Duration::from_millis(5));
    }

    #[test]
    fn timespan_stop_freezes_elapsed() {
        let timespan = Timespan::started();
        timespan.stop_eventually();
        let frozen = timespan.elapsed();

        sleep(Duration::from_millis(5));
        timespan.stop_eventually();

        assert!(!timespan.is_running());
        assert_eq!(timespan.elapsed(), frozen);
    }

    #[test]
    fn stop_before_start_is_a_no_op() {
        let timespan = Timespan::new();
        timespan.stop_eventually();
        timespan.start_eventually();

        assert!(timespan.is_running());
    }

    #[test]
    fn traffic_counter_counts_sentinels_as_blocks_only() {
        let counter = TrafficCounter::default();
        counter.add_block(3, 30);
        counter.add_sentinel();

        let stats = counter.snapshot();
        assert_eq!(stats.items, 3);
        assert_eq!(stats.bytes, 30);
        assert_eq!(stats.blocks, 2);
    }
}
