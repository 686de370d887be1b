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


use async_trait::async_trait;
use mix_stream::{Connection, Frame, FrameHeader, FrameListener, TransportError};
use std::sync::{Arc, Mutex, OnceLock};
use tracing::debug;

/// Loss-free, ordered, in-process network between the hosts of one job.
///
/// A frame sent on a connection is handed to the destination host's listener
/// before `send` returns, so per-connection order is the send order.
pub struct InMemoryNetwork {
    listeners: Vec<OnceLock<Arc<dyn FrameListener>>>,
    delivered: Mutex<Vec<FrameHeader>>,
}

impl InMemoryNetwork {
    pub fn new(num_hosts: usize) -> Arc<Self> {
        Arc::new(Self {
            listeners: (0..num_hosts).map(|_| OnceLock::new()).collect(),
            delivered: Mutex::new(Vec::new()),
        })
    }

    pub fn num_hosts(&self) -> usize {
        self.listeners.len()
    }

    /// Attaches the listener frames for `host` are delivered to. Returns
    /// `false` if the host already had one.
    pub fn register_listener(&self, host: usize, listener: Arc<dyn FrameListener>) -> bool {
        self.listeners
            .get(host)
            .is_some_and(|slot| slot.set(listener).is_ok())
    }

    pub fn connection(self: &Arc<Self>, from_host: usize, to_host: usize) -> Arc<dyn Connection> {
        Arc::new(InMemoryConnection {
            network: self.clone(),
            from_host,
            to_host,
        })
    }

    /// Connections of `host` to every other host, indexed by destination.
    pub fn connections_for(self: &Arc<Self>, host: usize) -> Vec<Option<Arc<dyn Connection>>> {
        (0..self.num_hosts())
            .map(|to_host| (to_host != host).then(|| self.connection(host, to_host)))
            .collect()
    }

    /// Headers of every frame delivered so far, in delivery order.
    pub fn delivered_headers(&self) -> Vec<FrameHeader> {
        self.delivered
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

/// One direction of an [`InMemoryNetwork`] link.
pub struct InMemoryConnection {
    network: Arc<InMemoryNetwork>,
    from_host: usize,
    to_host: usize,
}

#[async_trait]
impl Connection for InMemoryConnection {
    async fn send(&self, frame: Frame) -> Result<(), TransportError> {
        let Some(listener) = self
            .network
            .listeners
            .get(self.to_host)
            .and_then(OnceLock::get)
            .cloned()
        else {
            return Err(TransportError::ConnectionClosed { host: self.to_host });
        };

        debug!(
            from_host = self.from_host,
            to_host = self.to_host,
            close = frame.is_close(),
            "delivering in-memory frame"
        );
        self.network
            .delivered
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(frame.header);
        listener.on_receive(frame).await;
        Ok(())
    }
}
