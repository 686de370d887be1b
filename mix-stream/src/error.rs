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

//! Crate error type.

use crate::frame::MagicByte;
use crate::StreamId;
use thiserror::Error;

/// Failures surfaced by mix-stream operations.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("sink for worker {worker} is already closed")]
    SinkClosed { worker: usize },

    #[error("egress channel to host {host} is closed")]
    EgressClosed { host: usize },

    #[error("no connection configured for host {host}")]
    MissingConnection { host: usize },

    #[error("loopback target for stream {stream_id} worker {worker} was already released")]
    LoopbackReleased { stream_id: StreamId, worker: usize },

    #[error("stream {stream_id} worker {worker} was already released")]
    StreamReleased { stream_id: StreamId, worker: usize },

    #[error("stream handle for {stream_id} worker {worker} is stale")]
    StaleHandle { stream_id: StreamId, worker: usize },

    #[error("stream {stream_id} worker {worker} received data after closing")]
    IngestAfterClose { stream_id: StreamId, worker: usize },

    #[error("frame addressed to host {receiver_host} arrived at host {host_rank}")]
    MisroutedFrame {
        receiver_host: usize,
        host_rank: usize,
    },

    #[error("frame from unexpected sender host {sender_host} worker {sender_worker}")]
    UnexpectedSender {
        sender_host: usize,
        sender_worker: usize,
    },

    #[error("egress queue to host {host} is full")]
    EgressFull { host: usize },

    #[error("unexpected frame magic {0:?}")]
    UnexpectedMagic(MagicByte),

    #[error("failed to encode item: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("failed to decode item: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("failed to spawn egress worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("invalid multiplexer configuration: {0}")]
    InvalidConfig(String),
}

/// Failures reported by a [`Connection`](crate::Connection) implementation.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection to host {host} is closed")]
    ConnectionClosed { host: usize },

    #[error("transport failure: {0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::StreamError;
    use crate::StreamId;
    use std::error::Error;

    #[test]
    fn ingest_after_close_display_names_stream_and_worker() {
        let error = StreamError::IngestAfterClose {
            stream_id: StreamId::new(7),
            worker: 2,
        };

        assert_eq!(
            error.to_string(),
            "stream 7 worker 2 received data after closing"
        );
        assert!(error.source().is_none());
    }

    #[test]
    fn spawn_error_exposes_io_source() {
        let error = StreamError::from(std::io::Error::other("no threads left"));

        assert!(error.to_string().contains("no threads left"));
        assert!(error.source().is_some());
    }
}
