// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Domain separated host-side hashing
//!
//! `salted_hash = SHA256(salt_root || purpose || data)`, with a per-device
//! salt root created from the secure element RNG on first boot.

use sha2::{digest::generic_array::GenericArray, Digest, Sha256};
use zeroize::Zeroizing;

use crate::{
    secure_element::SecureElement,
    store::{Key, Store},
    Error,
};

/// [`Salt`] trait provides domain separated hashing
pub trait Salt {
    /// Hash `data` for the provided `purpose`
    fn salted_hash(&self, purpose: &str, data: &[u8]) -> Zeroizing<[u8; 32]>;
}

impl<T: Salt> Salt for &T {
    fn salted_hash(&self, purpose: &str, data: &[u8]) -> Zeroizing<[u8; 32]> {
        T::salted_hash(self, purpose, data)
    }
}

/// Per-device salt root
#[derive(Clone)]
pub struct SaltRoot(Zeroizing<[u8; 32]>);

impl SaltRoot {
    /// Create a salt root from raw bytes
    pub fn new(root: [u8; 32]) -> Self {
        Self(Zeroizing::new(root))
    }

    /// Load the persisted salt root
    pub fn load<S: Store>(store: &S) -> Result<Self, Error> {
        let v = store.read(Key::SaltRoot).ok_or(Error::Generic)?;

        let mut root = Zeroizing::new([0u8; 32]);
        if v.len() != root.len() {
            return Err(Error::Generic);
        }
        root.copy_from_slice(&v);

        Ok(Self(root))
    }

    /// Load the persisted salt root, creating one from the secure element
    /// RNG if none exists
    pub fn load_or_create<S: Store, SE: SecureElement>(
        store: &mut S,
        se: &mut SE,
    ) -> Result<Self, Error> {
        if store.read(Key::SaltRoot).is_some() {
            return Self::load(store);
        }

        #[cfg(feature = "log")]
        log::debug!("creating salt root");

        let root = se.random()?;
        if !store.write(Key::SaltRoot, &root[..]) {
            return Err(Error::Storage);
        }

        Ok(Self(root))
    }
}

impl Salt for SaltRoot {
    fn salted_hash(&self, purpose: &str, data: &[u8]) -> Zeroizing<[u8; 32]> {
        let mut h = Sha256::new();
        h.update(&self.0[..]);
        h.update(purpose.as_bytes());
        h.update(data);

        let mut out = Zeroizing::new([0u8; 32]);
        h.finalize_into(GenericArray::from_mut_slice(&mut out[..]));
        out
    }
}
