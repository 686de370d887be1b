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

//! Arena of live stream instances keyed by (stream id, local worker).

use crate::{StreamId, StreamKey};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// Lightweight reference a facade keeps instead of the instance itself.
///
/// The generation distinguishes the entry a handle was issued for from any
/// later entry under the same key.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct StreamHandle {
    key: StreamKey,
    generation: u64,
}

impl StreamHandle {
    pub fn key(&self) -> StreamKey {
        self.key
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

struct RegistryEntry<T> {
    generation: u64,
    value: Arc<T>,
}

struct RegistryState<T> {
    entries: HashMap<StreamKey, RegistryEntry<T>>,
    retired: HashSet<StreamKey>,
    /// Every key below this stream id is retired on all local workers.
    retired_below: u64,
    next_generation: u64,
}

impl<T> RegistryState<T> {
    fn is_retired(&self, key: &StreamKey) -> bool {
        key.stream_id.value() < self.retired_below || self.retired.contains(key)
    }

    /// Folds fully retired stream ids at the watermark into it.
    fn compact_retired(&mut self, workers_per_host: usize) {
        loop {
            let stream_id = StreamId::new(self.retired_below);
            let all_retired = (0..workers_per_host)
                .all(|worker| self.retired.contains(&StreamKey::new(stream_id, worker)));
            if !all_retired {
                return;
            }
            for worker in 0..workers_per_host {
                self.retired.remove(&StreamKey::new(stream_id, worker));
            }
            self.retired_below += 1;
        }
    }
}

/// Storage owner for stream instances.
///
/// Released keys are retired and never resolve again, so late lookups cannot
/// resurrect a stream that already finished its close handshake. Once every
/// local worker released a stream id and all lower ids, the id is folded into
/// a watermark, so the retired set only holds ids still in flight.
pub(crate) struct StreamRegistry<T> {
    workers_per_host: usize,
    state: Mutex<RegistryState<T>>,
}

impl<T> StreamRegistry<T> {
    pub(crate) fn new(workers_per_host: usize) -> Self {
        Self {
            workers_per_host,
            state: Mutex::new(RegistryState {
                entries: HashMap::new(),
                retired: HashSet::new(),
                retired_below: 0,
                next_generation: 0,
            }),
        }
    }

    /// Returns the entry for `key`, inserting the value built by `create` when
    /// absent. Yields `Ok(None)` for retired keys.
    pub(crate) fn get_or_insert_with<E>(
        &self,
        key: StreamKey,
        create: impl FnOnce() -> Result<T, E>,
    ) -> Result<Option<(StreamHandle, Arc<T>)>, E> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.is_retired(&key) {
            return Ok(None);
        }
        if let Some(entry) = state.entries.get(&key) {
            let handle = StreamHandle {
                key,
                generation: entry.generation,
            };
            return Ok(Some((handle, entry.value.clone())));
        }

        let value = Arc::new(create()?);
        let generation = state.next_generation;
        state.next_generation += 1;
        state.entries.insert(
            key,
            RegistryEntry {
                generation,
                value: value.clone(),
            },
        );
        Ok(Some((StreamHandle { key, generation }, value)))
    }

    /// Resolves a handle; `None` once its entry was released.
    pub(crate) fn resolve(&self, handle: &StreamHandle) -> Option<Arc<T>> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state
            .entries
            .get(&handle.key)
            .filter(|entry| entry.generation == handle.generation)
            .map(|entry| entry.value.clone())
    }

    /// Removes and retires `key`. Returns the released value if it was live.
    pub(crate) fn release(&self, key: &StreamKey) -> Option<Arc<T>> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if !state.is_retired(key) {
            state.retired.insert(*key);
            state.compact_retired(self.workers_per_host);
        }
        state.entries.remove(key).map(|entry| entry.value)
    }

    #[cfg(test)]
    pub(crate) fn is_retired(&self, key: &StreamKey) -> bool {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.is_retired(key)
    }

    #[cfg(test)]
    pub(crate) fn retired_len(&self) -> usize {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.retired.len()
    }

    pub(crate) fn len(&self) -> usize {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::StreamRegistry;
    use crate::{StreamId, StreamKey};
    use std::convert::Infallible;
    use std::sync::Arc;

    fn key(id: u64, worker: usize) -> StreamKey {
        StreamKey::new(StreamId::new(id), worker)
    }

    #[test]
    fn get_or_insert_creates_once_and_shares_the_value() {
        let registry = StreamRegistry::<String>::new(2);
        let mut calls = 0;

        let (first_handle, first) = registry
            .get_or_insert_with(key(1, 0), || {
                calls += 1;
                Ok::<_, Infallible>("stream".to_string())
            })
            .expect("infallible")
            .expect("key is live");
        let (second_handle, second) = registry
            .get_or_insert_with(key(1, 0), || Ok::<_, Infallible>("other".to_string()))
            .expect("infallible")
            .expect("key is live");

        assert_eq!(calls, 1);
        assert_eq!(first_handle, second_handle);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn released_keys_are_retired_and_handles_go_stale() {
        let registry = StreamRegistry::<u32>::new(2);
        let (handle, _) = registry
            .get_or_insert_with(key(4, 1), || Ok::<_, Infallible>(7))
            .expect("infallible")
            .expect("key is live");

        assert_eq!(registry.resolve(&handle).as_deref(), Some(&7));
        assert_eq!(registry.release(&handle.key()).as_deref(), Some(&7));

        assert!(registry.resolve(&handle).is_none());
        assert!(registry.is_retired(&handle.key()));
        assert!(registry
            .get_or_insert_with(key(4, 1), || Ok::<_, Infallible>(8))
            .expect("infallible")
            .is_none());
        assert_eq!(registry.release(&handle.key()), None);
    }

    #[test]
    fn generations_differ_between_keys() {
        let registry = StreamRegistry::<u32>::new(2);
        let (a, _) = registry
            .get_or_insert_with(key(1, 0), || Ok::<_, Infallible>(1))
            .expect("infallible")
            .expect("key is live");
        let (b, _) = registry
            .get_or_insert_with(key(1, 1), || Ok::<_, Infallible>(2))
            .expect("infallible")
            .expect("key is live");

        assert_ne!(a.generation(), b.generation());
    }

    #[test]
    fn failed_creation_leaves_no_entry() {
        let registry = StreamRegistry::<u32>::new(2);

        let result = registry.get_or_insert_with(key(2, 0), || Err("boom"));

        assert!(matches!(result, Err("boom")));
        assert_eq!(registry.len(), 0);
        assert!(!registry.is_retired(&key(2, 0)));
    }

    #[test]
    fn fully_retired_stream_ids_fold_into_the_watermark() {
        let registry = StreamRegistry::<u32>::new(2);
        for (id, worker) in [(0, 0), (1, 0), (1, 1)] {
            registry.release(&key(id, worker));
        }

        // id 0 still waits for worker 1, so nothing folds yet
        assert_eq!(registry.retired_len(), 3);

        registry.release(&key(0, 1));

        assert_eq!(registry.retired_len(), 0);
        for (id, worker) in [(0, 0), (0, 1), (1, 0), (1, 1)] {
            assert!(registry.is_retired(&key(id, worker)));
        }
        assert!(!registry.is_retired(&key(2, 0)));
        assert!(registry
            .get_or_insert_with(key(1, 1), || Ok::<_, Infallible>(9))
            .expect("infallible")
            .is_none());
    }
}
