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

//! Runtime helper for spawning egress dispatch loops.

use crate::error::StreamError;
use crate::frame::{Connection, Frame};
use crate::observability::{events, fields};
use std::sync::Arc;
use std::thread;
use tokio::runtime::Builder;
use tokio::sync::mpsc::Receiver;
use tracing::{debug, error};

pub(crate) const DEFAULT_EGRESS_RUNTIME_THREAD_NAME: &str = "mix-egress";
const COMPONENT: &str = "worker_runtime";

/// Join handle and thread label of one spawned dispatch loop.
pub(crate) struct DispatchLoopHandle {
    worker_thread: String,
    join_handle: thread::JoinHandle<()>,
}

impl DispatchLoopHandle {
    pub(crate) fn worker_thread(&self) -> &str {
        &self.worker_thread
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.join_handle.is_finished()
    }
}

/// Spawns a named thread running `run_loop` on a current-thread Tokio runtime.
pub(crate) fn spawn_dispatch_loop<F, Fut>(
    thread_name: String,
    connection: Arc<dyn Connection>,
    frame_receiver: Receiver<Frame>,
    run_loop: F,
) -> Result<DispatchLoopHandle, StreamError>
where
    F: FnOnce(Arc<dyn Connection>, Receiver<Frame>) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    debug!(
        event = events::RUNTIME_SPAWN_START,
        component = COMPONENT,
        worker_thread = thread_name.as_str(),
        "spawning egress dispatch thread"
    );

    let join_handle = thread::Builder::new()
        .name(thread_name.clone())
        .spawn(move || {
            let runtime = match Builder::new_current_thread().enable_all().build() {
                Ok(runtime) => runtime,
                Err(err) => {
                    error!(
                        event = events::RUNTIME_BUILD_FAILED,
                        component = COMPONENT,
                        worker_thread = fields::current_thread_name_or_default(),
                        err = %err,
                        "unable to build egress runtime"
                    );
                    return;
                }
            };

            runtime.block_on(run_loop(connection, frame_receiver));
        })
        .map_err(|err| {
            error!(
                event = events::RUNTIME_SPAWN_FAILED,
                component = COMPONENT,
                worker_thread = thread_name.as_str(),
                err = %err,
                "unable to spawn egress dispatch thread"
            );
            StreamError::Spawn(err)
        })?;

    debug!(
        event = events::RUNTIME_SPAWN_OK,
        component = COMPONENT,
        worker_thread = thread_name.as_str(),
        "spawned egress dispatch thread"
    );

    Ok(DispatchLoopHandle {
        worker_thread: thread_name,
        join_handle,
    })
}
