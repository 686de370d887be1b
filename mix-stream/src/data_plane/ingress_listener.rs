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

//! Ingress listener adapter that hands received frames to the multiplexer.

use crate::error::StreamError;
use crate::frame::{Frame, FrameListener};
use crate::multiplexer::Multiplexer;
use crate::observability::{events, fields};
use async_trait::async_trait;
use std::sync::Weak;
use tracing::{debug, error, warn, Level};

const COMPONENT: &str = "ingress_listener";

struct FormattedFrameFields {
    kind: &'static str,
    stream: String,
    sender: String,
    receiver: String,
}

impl FormattedFrameFields {
    fn from_frame(frame: &Frame) -> Self {
        Self {
            kind: fields::format_frame_kind(frame),
            stream: frame.header.stream_id.to_string(),
            sender: fields::format_frame_sender(frame),
            receiver: fields::format_frame_receiver(frame),
        }
    }
}

/// Transport-facing listener of one host.
///
/// Holds the multiplexer weakly so a transport that outlives it cannot keep
/// streams alive; frames arriving after the multiplexer dropped are discarded.
#[derive(Clone)]
pub(crate) struct IngressListener {
    host_rank: usize,
    multiplexer: Weak<Multiplexer>,
}

impl IngressListener {
    pub(crate) fn new(host_rank: usize, multiplexer: Weak<Multiplexer>) -> Self {
        Self {
            host_rank,
            multiplexer,
        }
    }
}

#[async_trait]
impl FrameListener for IngressListener {
    async fn on_receive(&self, frame: Frame) {
        let host = self.host_rank;
        let formatted_fields =
            tracing::enabled!(Level::DEBUG).then(|| FormattedFrameFields::from_frame(&frame));

        if let Some(fields) = formatted_fields.as_ref() {
            debug!(
                event = events::INGRESS_RECEIVE,
                component = COMPONENT,
                host,
                frame_kind = fields.kind,
                stream = fields.stream.as_str(),
                sender = fields.sender.as_str(),
                receiver = fields.receiver.as_str(),
                "received ingress frame"
            );
        }

        let Some(multiplexer) = self.multiplexer.upgrade() else {
            warn!(
                event = events::INGRESS_DISPATCH_FAILED,
                component = COMPONENT,
                host,
                reason = "multiplexer_dropped",
                "discarding frame for dropped multiplexer"
            );
            return;
        };

        match multiplexer.on_frame(frame) {
            Ok(()) => {}
            Err(err @ StreamError::IngestAfterClose { .. }) => {
                warn!(
                    event = events::INGRESS_REJECT_AFTER_CLOSE,
                    component = COMPONENT,
                    host,
                    err = %err,
                    "rejected frame for closed stream"
                );
            }
            Err(err) => {
                error!(
                    event = events::INGRESS_DISPATCH_FAILED,
                    component = COMPONENT,
                    host,
                    err = %err,
                    "unable to dispatch ingress frame"
                );
            }
        }
    }
}
