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

//! Network collaborator surface: framed blocks and the connection/listener traits.
//!
//! The byte layout on the wire belongs to the transport. Frames carry enough
//! addressing for the receiving multiplexer to find the stream instance and the
//! source worker of every block.

use crate::block::Block;
use crate::error::TransportError;
use crate::StreamId;
use async_trait::async_trait;

/// Tag identifying the kind of stream a frame belongs to.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum MagicByte {
    Invalid,
    MixStreamBlock,
}

/// Addressing shared by every frame of one (stream, sender, receiver) triple.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct FrameHeader {
    pub magic: MagicByte,
    pub stream_id: StreamId,
    pub sender_host: usize,
    pub sender_worker: usize,
    pub receiver_host: usize,
    pub receiver_worker: usize,
}

impl FrameHeader {
    /// Global index of the sending worker, used as the mixing-queue source.
    pub fn sender_global_worker(&self, workers_per_host: usize) -> usize {
        self.sender_host * workers_per_host + self.sender_worker
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum FrameKind {
    Block(Block),
    /// End of stream from the sender.
    Close,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    pub header: FrameHeader,
    pub kind: FrameKind,
}

impl Frame {
    pub fn block(header: FrameHeader, block: Block) -> Self {
        Self {
            header,
            kind: FrameKind::Block(block),
        }
    }

    pub fn close(header: FrameHeader) -> Self {
        Self {
            header,
            kind: FrameKind::Close,
        }
    }

    pub fn is_close(&self) -> bool {
        matches!(self.kind, FrameKind::Close)
    }
}

/// Reliable, ordered link to one remote host.
#[async_trait]
pub trait Connection: Send + Sync {
    async fn send(&self, frame: Frame) -> Result<(), TransportError>;
}

/// Inbound side of the transport: receives frames addressed to this host.
#[async_trait]
pub trait FrameListener: Send + Sync {
    async fn on_receive(&self, frame: Frame);
}
