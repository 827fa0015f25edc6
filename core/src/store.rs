// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Persistent key-value store and factory reset collaborators
//!
//! The flash driver backing these is external to the core, only the
//! [SeedVault][crate::vault::SeedVault] and the secure element backends
//! write to the store.

use num_enum::TryFromPrimitive;
use strum::{Display, EnumIter, EnumString};

/// Persistent store keys
#[derive(
    Copy, Clone, PartialEq, Eq, Hash, Debug, Display, EnumString, EnumIter, TryFromPrimitive,
)]
#[repr(u8)]
pub enum Key {
    /// [EncryptedSeedRecord][crate::vault::EncryptedSeedRecord]
    EncryptedSeed = 0x01,
    /// Failed unlock attempt counter (single byte)
    UnlockAttempts = 0x02,
    /// Salt root for host-side salted hashing
    SaltRoot = 0x03,
    /// Secure element channel pairing secret (chip provisioning)
    PairingSecret = 0x10,
}

/// [`Store`] trait provides durable persistence for [`SeedVault`][crate::vault::SeedVault]
/// and secure element provisioning state
pub trait Store {
    /// Read the value stored for `key`, `None` if absent
    fn read(&self, key: Key) -> Option<heapless::Vec<u8, STORE_VALUE_MAX>>;

    /// Durably write `value` for `key`, returning only once the write is committed
    fn write(&mut self, key: Key, value: &[u8]) -> bool;

    /// Erase the value stored for `key`
    fn erase(&mut self, key: Key) -> bool;

    /// Check whether device setup has been finalised
    fn is_initialized(&self) -> bool;

    /// Mark device setup as finalised
    fn set_initialized(&mut self) -> bool;
}

/// Maximum size of a single stored value
pub const STORE_VALUE_MAX: usize = 128;

impl<T: Store> Store for &mut T {
    fn read(&self, key: Key) -> Option<heapless::Vec<u8, STORE_VALUE_MAX>> {
        T::read(self, key)
    }

    fn write(&mut self, key: Key, value: &[u8]) -> bool {
        T::write(self, key, value)
    }

    fn erase(&mut self, key: Key) -> bool {
        T::erase(self, key)
    }

    fn is_initialized(&self) -> bool {
        T::is_initialized(self)
    }

    fn set_initialized(&mut self) -> bool {
        T::set_initialized(self)
    }
}

/// [`Reset`] trait provides the destructive factory reset, wiping all persisted
/// device state except the secure element pairing secret
pub trait Reset {
    fn factory_reset(&mut self);
}

impl<T: Reset> Reset for &mut T {
    fn factory_reset(&mut self) {
        T::factory_reset(self)
    }
}
