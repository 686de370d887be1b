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

//! Canonical structured field keys and value-format helpers.

use crate::frame::{Frame, FrameKind};
use crate::StreamKey;

pub const EVENT: &str = "event";
pub const COMPONENT: &str = "component";
pub const WORKER_ID: &str = "worker_id";
pub const WORKER_THREAD: &str = "worker_thread";
pub const STREAM: &str = "stream";
pub const HOST: &str = "host";
pub const SOURCE: &str = "source";

pub const FRAME_KIND: &str = "frame_kind";
pub const SENDER: &str = "sender";
pub const RECEIVER: &str = "receiver";

pub const REF_COUNT: &str = "ref_count";
pub const REASON: &str = "reason";
pub const ERR: &str = "err";

pub const FRAME_KIND_BLOCK: &str = "block";
pub const FRAME_KIND_CLOSE: &str = "close";
pub const REASON_CHANNEL_CLOSED: &str = "channel_closed";
pub const DEFAULT_WORKER_THREAD: &str = "unknown-thread";

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WorkerContext {
    pub worker_id: String,
    pub worker_thread: String,
}

impl WorkerContext {
    pub fn new(worker_id: impl Into<String>, worker_thread: Option<&str>) -> Self {
        Self {
            worker_id: worker_id.into(),
            worker_thread: thread_name_or_default(worker_thread),
        }
    }

    pub fn with_current_thread(worker_id: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.into(),
            worker_thread: current_thread_name_or_default(),
        }
    }
}

pub fn thread_name_or_default(thread_name: Option<&str>) -> String {
    thread_name.unwrap_or(DEFAULT_WORKER_THREAD).to_string()
}

pub fn current_thread_name_or_default() -> String {
    thread_name_or_default(std::thread::current().name())
}

pub fn format_stream_key(key: &StreamKey) -> String {
    key.to_string()
}

pub fn format_frame_kind(frame: &Frame) -> &'static str {
    match frame.kind {
        FrameKind::Block(_) => FRAME_KIND_BLOCK,
        FrameKind::Close => FRAME_KIND_CLOSE,
    }
}

/// Formats a worker address as `h<host>w<worker>`.
pub fn format_worker_address(host: usize, worker: usize) -> String {
    format!("h{host}w{worker}")
}

pub fn format_frame_sender(frame: &Frame) -> String {
    format_worker_address(frame.header.sender_host, frame.header.sender_worker)
}

pub fn format_frame_receiver(frame: &Frame) -> String {
    format_worker_address(frame.header.receiver_host, frame.header.receiver_worker)
}
