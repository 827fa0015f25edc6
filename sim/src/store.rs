// Copyright (c) 2022-2023 The MobileCoin Foundation

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use log::{debug, warn};

use custody_core::store::{Key, Reset, Store, STORE_VALUE_MAX};

#[derive(Default, Debug)]
struct Inner {
    values: HashMap<Key, Vec<u8>>,
    initialized: bool,
}

/// In-memory persistent store, clones share the same contents
#[derive(Clone, Default, Debug)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
    read_only: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail subsequent writes
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    /// Fetch the raw value for a key
    pub fn get(&self, key: Key) -> Option<Vec<u8>> {
        self.with(|i| i.values.get(&key).cloned())
    }

    /// Overwrite the raw value for a key
    pub fn put(&self, key: Key, value: &[u8]) {
        self.with(|i| i.values.insert(key, value.to_vec()));
    }

    /// Remove every value except chip provisioning state and clear the
    /// initialised flag
    pub fn wipe(&self) {
        self.with(|i| {
            i.values.retain(|k, _| *k == Key::PairingSecret);
            i.initialized = false;
        })
    }

    fn with<R>(&self, f: impl FnOnce(&mut Inner) -> R) -> R {
        let mut i = match self.inner.lock() {
            Ok(i) => i,
            Err(e) => e.into_inner(),
        };
        f(&mut i)
    }

    fn writable(&self) -> bool {
        !self.read_only.load(Ordering::SeqCst)
    }
}

impl Store for MemoryStore {
    fn read(&self, key: Key) -> Option<heapless::Vec<u8, STORE_VALUE_MAX>> {
        self.with(|i| {
            i.values
                .get(&key)
                .and_then(|v| heapless::Vec::from_slice(v).ok())
        })
    }

    fn write(&mut self, key: Key, value: &[u8]) -> bool {
        if !self.writable() || value.len() > STORE_VALUE_MAX {
            warn!("store write refused: {}", key);
            return false;
        }

        self.put(key, value);
        true
    }

    fn erase(&mut self, key: Key) -> bool {
        if !self.writable() {
            return false;
        }

        self.with(|i| i.values.remove(&key));
        true
    }

    fn is_initialized(&self) -> bool {
        self.with(|i| i.initialized)
    }

    fn set_initialized(&mut self) -> bool {
        if !self.writable() {
            return false;
        }

        self.with(|i| i.initialized = true);
        true
    }
}

/// Factory reset counting invocations and, unless disabled, wiping a [`MemoryStore`]
#[derive(Clone, Debug)]
pub struct SimReset {
    store: MemoryStore,
    wipe: Arc<AtomicBool>,
    count: Arc<AtomicUsize>,
}

impl SimReset {
    pub fn new(store: MemoryStore) -> Self {
        Self {
            store,
            wipe: Arc::new(AtomicBool::new(true)),
            count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Enable or disable wiping the store, resets are counted regardless
    pub fn set_wipe(&self, wipe: bool) {
        self.wipe.store(wipe, Ordering::SeqCst);
    }

    /// Number of factory resets performed
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl Reset for SimReset {
    fn factory_reset(&mut self) {
        let n = self.count.fetch_add(1, Ordering::SeqCst) + 1;
        warn!("factory reset ({})", n);

        if self.wipe.load(Ordering::SeqCst) {
            self.store.wipe();
            debug!("store wiped");
        }
    }
}
