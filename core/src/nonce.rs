// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Two-phase anti-exfil signing sessions
//!
//! [`NonceCache::commit`] returns the device nonce commitment and caches the
//! keypath and message, [`NonceCache::sign`] consumes the cached session
//! once the host has revealed its nonce. At most one session is pending.

use heapless::Vec;
use zeroize::Zeroize;

use crate::{
    helpers::abort,
    signer::{self, Signature, MAX_KEYPATH_LEN},
    vault::SeedSource,
    Error,
};

/// Pending signing session
#[derive(Clone, PartialEq, Debug)]
struct SignData {
    keypath: Vec<u32, MAX_KEYPATH_LEN>,
    msg: [u8; 32],
}

impl Zeroize for SignData {
    fn zeroize(&mut self) {
        self.keypath.iter_mut().for_each(|c| c.zeroize());
        self.keypath.clear();
        self.msg.zeroize();
    }
}

/// Single-slot cache for anti-exfil signing sessions
#[derive(Default)]
pub struct NonceCache {
    pending: Option<SignData>,
}

impl NonceCache {
    /// Create an empty cache
    pub const fn new() -> Self {
        Self { pending: None }
    }

    /// Check whether a session is pending
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Commit to signing `msg` with the key at `keypath`, returning the
    /// device nonce commitment for `host_commitment`.
    ///
    /// Fails with [`Error::SessionState`] if a session is already pending,
    /// the cache is left untouched when the commitment cannot be computed.
    pub fn commit<K: SeedSource>(
        &mut self,
        keys: &K,
        keypath: &[u32],
        msg: &[u8; 32],
        host_commitment: &[u8; 32],
    ) -> Result<[u8; 33], Error> {
        if keypath.len() > MAX_KEYPATH_LEN {
            abort("nonce commit: keypath too long");
        }

        if self.pending.is_some() {
            #[cfg(feature = "log")]
            log::warn!("nonce commit with session pending");

            return Err(Error::SessionState);
        }

        let client_commitment = signer::secp256k1_nonce_commit(keys, keypath, msg, host_commitment)?;

        let mut data = SignData {
            keypath: Vec::new(),
            msg: *msg,
        };
        if data.keypath.extend_from_slice(keypath).is_err() {
            abort("nonce commit: keypath too long");
        }
        self.pending = Some(data);

        #[cfg(feature = "log")]
        log::debug!("nonce session committed");

        Ok(client_commitment)
    }

    /// Sign the pending session using the revealed `host_nonce`.
    ///
    /// Fails with [`Error::SessionState`] if no session is pending. The
    /// session is cleared whether or not signing succeeds.
    pub fn sign<K: SeedSource>(
        &mut self,
        keys: &K,
        host_nonce: &[u8; 32],
    ) -> Result<Signature, Error> {
        let data = match &self.pending {
            Some(d) => d,
            None => return Err(Error::SessionState),
        };

        let r = signer::secp256k1_sign(keys, &data.keypath, &data.msg, Some(host_nonce));

        self.clear();

        r
    }

    /// Discard any pending session
    pub fn clear(&mut self) {
        if let Some(d) = &mut self.pending {
            d.zeroize();
        }
        self.pending = None;
    }
}

impl Drop for NonceCache {
    fn drop(&mut self) {
        self.clear();
    }
}
