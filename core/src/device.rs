// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Device context used by host transports
//!
//! [`Device`] owns the [`SeedVault`] and the pending [`NonceCache`] session,
//! exposing the custody operations to host request handlers.

use zeroize::Zeroizing;

use crate::{
    config::Config,
    nonce::NonceCache,
    secure_element::{Model, SecureElement},
    signer::{self, Signature},
    store::{Reset, Store},
    vault::SeedVault,
    Error,
};

/// Custody device context
pub struct Device<SE, S, R> {
    vault: SeedVault<SE, S, R>,
    nonce: NonceCache,
}

impl<SE: SecureElement, S: Store, R: Reset> Device<SE, S, R> {
    /// Create a locked device with the default policy
    pub fn new(se: SE, store: S, reset: R) -> Self {
        Self::new_with_config(se, store, reset, Config::default())
    }

    /// Create a locked device with the provided policy
    pub fn new_with_config(se: SE, store: S, reset: R, config: Config) -> Self {
        Self {
            vault: SeedVault::new_with_config(se, store, reset, config),
            nonce: NonceCache::new(),
        }
    }

    /// Provision the secure element and salt root, called once per boot
    pub fn boot(&mut self) -> Result<(), Error> {
        #[cfg(feature = "log")]
        log::debug!("boot");

        self.vault.setup()
    }

    /// Access the seed vault
    pub fn vault(&self) -> &SeedVault<SE, S, R> {
        &self.vault
    }

    /// Mutable access to the seed vault
    pub fn vault_mut(&mut self) -> &mut SeedVault<SE, S, R> {
        &mut self.vault
    }

    /// See [`SeedVault::encrypt_and_store_seed`]
    pub fn encrypt_and_store_seed(&mut self, seed: &[u8], password: &str) -> Result<(), Error> {
        self.vault.encrypt_and_store_seed(seed, password)
    }

    /// See [`SeedVault::create_and_store_seed`]
    pub fn create_and_store_seed(
        &mut self,
        password: &str,
        host_entropy: &[u8; 32],
    ) -> Result<(), Error> {
        self.vault.create_and_store_seed(password, host_entropy)
    }

    /// Finalise setup, see [`SeedVault::mark_initialized`]
    pub fn mark_initialized(&mut self) -> Result<(), Error> {
        self.vault.mark_initialized()
    }

    /// Unlock the keystore, see [`SeedVault::unlock`]
    pub fn unlock(&mut self, password: &str) -> Result<u8, Error> {
        let r = self.vault.unlock(password);

        if let Err(Error::MaxAttemptsExceeded) = r {
            self.nonce.clear();
        }

        r
    }

    /// See [`SeedVault::unlock_bip39`]
    pub fn unlock_bip39(&mut self, passphrase: &str) -> Result<(), Error> {
        self.vault.unlock_bip39(passphrase)
    }

    /// Lock the keystore and discard any pending signing session
    pub fn lock(&mut self) {
        self.nonce.clear();
        self.vault.lock();
    }

    /// Check whether the keystore is locked
    pub fn is_locked(&self) -> bool {
        self.vault.is_locked()
    }

    /// Fetch the number of unlock attempts remaining
    pub fn remaining_attempts(&self) -> u8 {
        self.vault.remaining_attempts()
    }

    /// See [`SeedVault::get_bip39_mnemonic`]
    pub fn get_bip39_mnemonic(&self) -> Result<Zeroizing<String>, Error> {
        self.vault.get_bip39_mnemonic()
    }

    /// Derive the extended public key at `keypath`
    pub fn get_xpub(&self, keypath: &[u32]) -> Result<bip32::XPub, Error> {
        self.vault.get_xpub(keypath)
    }

    /// Derive and encode the extended public key at `keypath`
    pub fn encode_xpub_at_keypath(&self, keypath: &[u32]) -> Result<String, Error> {
        self.vault.encode_xpub_at_keypath(keypath)
    }

    /// Fetch the compressed public key at `keypath`
    pub fn secp256k1_get_public_key(&self, keypath: &[u32]) -> Result<[u8; 33], Error> {
        signer::secp256k1_get_public_key(&self.vault, keypath)
    }

    /// Sign a 32-byte digest in a single step
    pub fn secp256k1_sign(
        &self,
        keypath: &[u32],
        msg: &[u8; 32],
        host_nonce: Option<&[u8; 32]>,
    ) -> Result<Signature, Error> {
        signer::secp256k1_sign(&self.vault, keypath, msg, host_nonce)
    }

    /// Open an anti-exfil signing session, see [`NonceCache::commit`]
    pub fn nonce_commit(
        &mut self,
        keypath: &[u32],
        msg: &[u8; 32],
        host_commitment: &[u8; 32],
    ) -> Result<[u8; 33], Error> {
        self.nonce
            .commit(&self.vault, keypath, msg, host_commitment)
    }

    /// Complete the pending signing session, see [`NonceCache::sign`]
    pub fn nonce_sign(&mut self, host_nonce: &[u8; 32]) -> Result<Signature, Error> {
        self.nonce.sign(&self.vault, host_nonce)
    }

    /// Abort the pending signing session
    pub fn nonce_clear(&mut self) {
        self.nonce.clear();
    }

    /// Check whether a signing session is pending
    pub fn nonce_pending(&self) -> bool {
        self.nonce.is_pending()
    }

    /// Generate the device attestation key, returning the public key `X || Y`
    pub fn attestation_pubkey(&mut self) -> Result<[u8; 64], Error> {
        self.vault.secure_element().gen_attestation_key()
    }

    /// Sign a host challenge with the attestation key, returning `R || S`
    pub fn attestation_sign(&mut self, challenge: &[u8; 32]) -> Result<[u8; 64], Error> {
        self.vault.secure_element().attestation_sign(challenge)
    }

    /// Fetch the number of monotonic counter increments remaining
    pub fn monotonic_increments_remaining(&mut self) -> Result<u32, Error> {
        self.vault.secure_element().monotonic_increments_remaining()
    }

    /// Fetch the secure element model
    pub fn model(&mut self) -> Result<Model, Error> {
        self.vault.secure_element().model()
    }
}
