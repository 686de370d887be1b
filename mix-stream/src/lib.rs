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

//! # mix-stream
//!
//! `mix-stream` implements the mix stream of a distributed dataflow engine: a
//! many-to-many exchange in which every worker of a job writes blocks of
//! serialized items to every other worker, and every worker reads the blocks
//! addressed to it merged from all sources in arrival order.
//!
//! Typical usage is centered on [`Multiplexer`] and [`MixStream`]. Each host
//! builds one multiplexer over its connections to the other hosts; each
//! worker thread opens a stream, writes through one [`BlockWriter`] per
//! destination worker, reads through a [`MixReader`] and closes the stream.
//!
//! ```
//! use mix_stream::{Multiplexer, MultiplexerConfig};
//!
//! // single host, two workers: every exchange goes through loopback
//! let config = MultiplexerConfig::new(1, 2, 0, 64 * 1024 * 1024);
//! let multiplexer = Multiplexer::new(config, vec![None]).unwrap();
//!
//! let handles: Vec<_> = (0..2)
//!     .map(|worker| {
//!         let multiplexer = multiplexer.clone();
//!         std::thread::spawn(move || {
//!             let stream = multiplexer.get_new_mix_stream(worker, 0).unwrap();
//!             for (destination, mut writer) in stream.get_writers().unwrap().into_iter().enumerate() {
//!                 writer.put(&format!("{worker}->{destination}")).unwrap();
//!                 writer.close().unwrap();
//!             }
//!             let mut items: Vec<String> = stream.get_reader(true).unwrap().collect_items().unwrap();
//!             stream.close();
//!             items.sort();
//!             items
//!         })
//!     })
//!     .collect();
//!
//! let received: Vec<Vec<String>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
//! assert_eq!(received[0], vec!["0->0".to_string(), "1->0".to_string()]);
//! assert_eq!(received[1], vec!["0->1".to_string(), "1->1".to_string()]);
//! ```
//!
//! ## Close handshake
//!
//! Closing a stream sends a close sentinel to every remote worker, closes the
//! loopback inlets this worker feeds on its own host, then blocks until every
//! worker on every other host sent its own sentinel. Only then is the stream
//! instance released. A stream whose peers never close blocks forever; there
//! is no timeout.
//!
//! Dropping a [`MixStream`] runs the handshake. An instance that is released
//! without ever being closed still sends its close sentinels, so remote peers
//! are not left waiting.
//!
//! ## Internal architecture map
//!
//! - API facade: [`Multiplexer`], [`MixStream`], writers and readers
//! - Mix: stream instances, sinks, the mixing queue and its reader
//! - Control plane: the registry of stream instances and their handles
//! - Data plane: per-host egress workers and the ingress listener
//! - Runtime: dedicated threads running the egress dispatch loops
//!
//! ## Threading
//!
//! Writers, readers and `close` block the calling thread and must be driven
//! from worker threads, not from inside an async runtime. The transport side
//! ([`Connection`], [`FrameListener`]) is async.
//!
//! ## Observability model
//!
//! The crate uses `tracing` for logs/events.
//! Library code emits events and does not initialize a global subscriber.
//! Binaries and tests are responsible for one-time `tracing_subscriber`
//! initialization at process boundaries.

mod block;
pub use block::{Block, BlockPool};

mod close_handshake;
pub use close_handshake::{expected_closing_acks, ClosingHandshake};

mod config;
pub use config::{
    block_size_for, round_down_to_power_of_two, MultiplexerConfig, DEFAULT_BLOCK_SIZE,
    DEFAULT_EGRESS_QUEUE_SIZE,
};

mod control_plane;
pub use control_plane::stream_registry::StreamHandle;

mod data_plane;

mod error;
pub use error::{StreamError, TransportError};

mod frame;
pub use frame::{Connection, Frame, FrameHeader, FrameKind, FrameListener, MagicByte};

mod mix;
pub use mix::queue::{MixBlock, MixBlockQueue};
pub use mix::reader::{MixReader, TryNext};
pub use mix::sink::{LoopbackSink, NetworkSink, SinkSlot, WriterSink};
pub use mix::stream::MixStream;
pub use mix::stream_data::MixStreamData;
pub use mix::writer::BlockWriter;

mod multiplexer;
pub use multiplexer::Multiplexer;

#[doc(hidden)]
pub mod benchmark_support;
#[doc(hidden)]
pub mod observability;
mod runtime;

mod stats;
pub use stats::{StreamCounters, StreamStats, Timespan, TrafficCounter, TrafficStats};

mod stream_id;
pub use stream_id::{StreamId, StreamKey};
