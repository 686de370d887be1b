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

//! Scope-bound stream facade.

use crate::control_plane::stream_registry::StreamHandle;
use crate::error::StreamError;
use crate::mix::reader::MixReader;
use crate::mix::stream_data::MixStreamData;
use crate::mix::writer::BlockWriter;
use crate::multiplexer::Multiplexer;
use crate::stats::StreamStats;
use crate::StreamId;
use std::sync::Arc;

/// Handle over one stream instance, closing it when dropped.
///
/// Holds a registry handle rather than the instance, so once the close
/// handshake releases the instance every operation except `close` and
/// `closed` fails with [`StreamError::StaleHandle`].
pub struct MixStream {
    multiplexer: Arc<Multiplexer>,
    handle: StreamHandle,
}

impl MixStream {
    pub(crate) fn new(multiplexer: Arc<Multiplexer>, handle: StreamHandle) -> Self {
        Self {
            multiplexer,
            handle,
        }
    }

    pub fn id(&self) -> StreamId {
        self.handle.key().stream_id
    }

    pub fn local_worker(&self) -> usize {
        self.handle.key().local_worker
    }

    pub fn handle(&self) -> StreamHandle {
        self.handle
    }

    pub fn get_writers(&self) -> Result<Vec<BlockWriter>, StreamError> {
        self.data()?.get_writers(&self.multiplexer)
    }

    pub fn get_mix_reader(&self, consume: bool) -> Result<MixReader, StreamError> {
        Ok(self.data()?.get_mix_reader(consume))
    }

    pub fn get_reader(&self, consume: bool) -> Result<MixReader, StreamError> {
        Ok(self.data()?.get_reader(consume))
    }

    /// Runs the close handshake if nobody did yet; see [`MixStreamData::close`].
    pub fn close(&self) -> Option<StreamStats> {
        self.multiplexer
            .resolve(&self.handle)
            .and_then(|data| data.close(&self.multiplexer))
    }

    pub fn closed(&self) -> bool {
        self.multiplexer
            .resolve(&self.handle)
            .map_or(true, |data| data.closed())
    }

    /// Current traffic snapshot, while the instance is still registered.
    pub fn stats(&self) -> Option<StreamStats> {
        self.multiplexer.resolve(&self.handle).map(|data| data.stats())
    }

    fn data(&self) -> Result<Arc<MixStreamData>, StreamError> {
        self.multiplexer
            .resolve(&self.handle)
            .ok_or(StreamError::StaleHandle {
                stream_id: self.id(),
                worker: self.local_worker(),
            })
    }
}

impl Drop for MixStream {
    fn drop(&mut self) {
        self.close();
    }
}
