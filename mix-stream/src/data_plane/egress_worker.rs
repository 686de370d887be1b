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

//! Egress worker that drains one host's frame queue into its connection.

use crate::error::StreamError;
use crate::frame::{Connection, Frame, FrameHeader};
use crate::observability::{events, fields, fields::WorkerContext};
use crate::runtime::worker_runtime::{
    spawn_dispatch_loop, DispatchLoopHandle, DEFAULT_EGRESS_RUNTIME_THREAD_NAME,
};
use std::sync::Arc;
use tokio::sync::mpsc::Receiver;
use tracing::{debug, info, warn, Level};
use uuid::Uuid;

const EGRESS_RUNTIME_THREAD_NAME_PREFIX: &str = "mix-egress-";
const EGRESS_RUNTIME_THREAD_NAME_MAX_LEN: usize = 15;
const COMPONENT: &str = "egress_worker";

struct FormattedFrameFields {
    kind: &'static str,
    stream: String,
    sender: String,
    receiver: String,
}

impl FormattedFrameFields {
    fn new(kind: &'static str, header: &FrameHeader) -> Self {
        Self {
            kind,
            stream: header.stream_id.to_string(),
            sender: fields::format_worker_address(header.sender_host, header.sender_worker),
            receiver: fields::format_worker_address(header.receiver_host, header.receiver_worker),
        }
    }
}

/// Owns the dispatch thread serving one destination host.
pub(crate) struct EgressWorker {
    worker_id: String,
    dispatch_handle: DispatchLoopHandle,
}

impl EgressWorker {
    pub(crate) fn new(
        host: usize,
        connection: Arc<dyn Connection>,
        frame_receiver: Receiver<Frame>,
    ) -> Result<Self, StreamError> {
        let worker_id = Uuid::new_v4().hyphenated().to_string();
        let runtime_thread_name = Self::build_runtime_thread_name(&worker_id);
        let worker_id_for_loop = worker_id.clone();

        let dispatch_handle = spawn_dispatch_loop(
            runtime_thread_name,
            connection,
            frame_receiver,
            move |connection, frame_receiver| async move {
                Self::dispatch_loop(worker_id_for_loop, host, connection, frame_receiver).await;
            },
        )?;

        Ok(Self {
            worker_id,
            dispatch_handle,
        })
    }

    pub(crate) fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub(crate) fn runtime_thread(&self) -> &str {
        self.dispatch_handle.worker_thread()
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.dispatch_handle.is_finished()
    }

    fn build_runtime_thread_name(worker_id: &str) -> String {
        let suffix_len =
            EGRESS_RUNTIME_THREAD_NAME_MAX_LEN - EGRESS_RUNTIME_THREAD_NAME_PREFIX.len();
        let suffix: String = worker_id
            .chars()
            .filter(|ch| ch.is_ascii_hexdigit())
            .take(suffix_len)
            .collect();

        if suffix.len() == suffix_len {
            format!("{EGRESS_RUNTIME_THREAD_NAME_PREFIX}{suffix}")
        } else {
            DEFAULT_EGRESS_RUNTIME_THREAD_NAME.to_string()
        }
    }

    /// Sends queued frames in FIFO order until every sender is dropped.
    pub(crate) async fn dispatch_loop(
        worker_id: String,
        host: usize,
        connection: Arc<dyn Connection>,
        mut frame_receiver: Receiver<Frame>,
    ) {
        let worker_context = WorkerContext::with_current_thread(worker_id);

        while let Some(frame) = frame_receiver.recv().await {
            let header = frame.header;
            let kind = fields::format_frame_kind(&frame);
            let mut frame_fields =
                tracing::enabled!(Level::DEBUG).then(|| FormattedFrameFields::new(kind, &header));

            if let Some(fields) = frame_fields.as_ref() {
                debug!(
                    event = events::EGRESS_SEND_ATTEMPT,
                    component = COMPONENT,
                    worker_id = worker_context.worker_id.as_str(),
                    worker_thread = worker_context.worker_thread.as_str(),
                    host,
                    frame_kind = fields.kind,
                    stream = fields.stream.as_str(),
                    sender = fields.sender.as_str(),
                    receiver = fields.receiver.as_str(),
                    "attempting egress send"
                );
            }

            if let Err(err) = connection.send(frame).await {
                if tracing::enabled!(Level::WARN) {
                    let fields = frame_fields
                        .get_or_insert_with(|| FormattedFrameFields::new(kind, &header));
                    warn!(
                        event = events::EGRESS_SEND_FAILED,
                        component = COMPONENT,
                        worker_id = worker_context.worker_id.as_str(),
                        worker_thread = worker_context.worker_thread.as_str(),
                        host,
                        frame_kind = fields.kind,
                        stream = fields.stream.as_str(),
                        sender = fields.sender.as_str(),
                        receiver = fields.receiver.as_str(),
                        err = %err,
                        "egress send failed"
                    );
                }
            } else if let Some(fields) = frame_fields.as_ref() {
                debug!(
                    event = events::EGRESS_SEND_OK,
                    component = COMPONENT,
                    worker_id = worker_context.worker_id.as_str(),
                    worker_thread = worker_context.worker_thread.as_str(),
                    host,
                    frame_kind = fields.kind,
                    stream = fields.stream.as_str(),
                    "egress send succeeded"
                );
            }
        }

        info!(
            event = events::EGRESS_RECV_CLOSED,
            component = COMPONENT,
            worker_id = worker_context.worker_id.as_str(),
            worker_thread = worker_context.worker_thread.as_str(),
            host,
            reason = fields::REASON_CHANNEL_CLOSED,
            "frame queue closed; stopping dispatch loop"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::{EgressWorker, EGRESS_RUNTIME_THREAD_NAME_MAX_LEN, EGRESS_RUNTIME_THREAD_NAME_PREFIX};
    use crate::block::Block;
    use crate::error::TransportError;
    use crate::frame::{Connection, Frame, FrameHeader, MagicByte};
    use crate::StreamId;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct RecordingConnection {
        frames: Mutex<Vec<Frame>>,
        fail: bool,
    }

    impl RecordingConnection {
        fn sent(&self) -> Vec<Frame> {
            self.frames.lock().expect("lock").clone()
        }
    }

    #[async_trait]
    impl Connection for RecordingConnection {
        async fn send(&self, frame: Frame) -> Result<(), TransportError> {
            if self.fail {
                return Err(TransportError::ConnectionClosed { host: 1 });
            }
            self.frames.lock().expect("lock").push(frame);
            Ok(())
        }
    }

    fn header(sender_worker: usize) -> FrameHeader {
        FrameHeader {
            magic: MagicByte::MixStreamBlock,
            stream_id: StreamId::new(4),
            sender_host: 0,
            sender_worker,
            receiver_host: 1,
            receiver_worker: 0,
        }
    }

    #[tokio::test]
    async fn dispatch_loop_forwards_frames_in_order_and_exits_on_close() {
        let connection = Arc::new(RecordingConnection::default());
        let (sender, receiver) = mpsc::channel(8);

        for sequence in 0u32..3 {
            sender
                .send(Frame::block(
                    header(0),
                    Block::from_items(&[sequence]).expect("encode"),
                ))
                .await
                .expect("queue should accept frame");
        }
        sender
            .send(Frame::close(header(0)))
            .await
            .expect("queue should accept close");
        drop(sender);

        EgressWorker::dispatch_loop("ordered".to_string(), 1, connection.clone(), receiver).await;

        let sent = connection.sent();
        assert_eq!(sent.len(), 4);
        assert!(sent[3].is_close());
    }

    #[tokio::test]
    async fn dispatch_loop_keeps_draining_after_send_failure() {
        let connection = Arc::new(RecordingConnection {
            fail: true,
            ..Default::default()
        });
        let (sender, receiver) = mpsc::channel(8);
        sender
            .send(Frame::close(header(0)))
            .await
            .expect("queue should accept first");
        sender
            .send(Frame::close(header(1)))
            .await
            .expect("queue should accept second");
        drop(sender);

        EgressWorker::dispatch_loop("failing".to_string(), 1, connection.clone(), receiver).await;

        assert!(connection.sent().is_empty());
    }

    #[test]
    fn spawned_worker_stops_when_senders_drop() {
        let connection: Arc<dyn Connection> = Arc::new(RecordingConnection::default());
        let (sender, receiver) = mpsc::channel(8);
        let worker = EgressWorker::new(1, connection, receiver).expect("worker should spawn");

        assert!(!worker.worker_id().is_empty());
        assert!(worker
            .runtime_thread()
            .starts_with(EGRESS_RUNTIME_THREAD_NAME_PREFIX));

        drop(sender);
        while !worker.is_finished() {
            std::thread::yield_now();
        }
    }

    #[test]
    fn build_runtime_thread_name_keeps_prefix_and_linux_safe_length() {
        let thread_name = EgressWorker::build_runtime_thread_name("abcdef0123456789");

        assert!(thread_name.starts_with(EGRESS_RUNTIME_THREAD_NAME_PREFIX));
        assert_eq!(thread_name.len(), EGRESS_RUNTIME_THREAD_NAME_MAX_LEN);
    }

    #[test]
    fn build_runtime_thread_name_uses_fallback_for_short_non_hex_ids() {
        let thread_name = EgressWorker::build_runtime_thread_name("zzz");

        assert_eq!(
            thread_name,
            crate::runtime::worker_runtime::DEFAULT_EGRESS_RUNTIME_THREAD_NAME
        );
    }
}
