// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Encrypted seed storage and the locked / unlocked keystore state
//!
//! The [`SeedVault`] owns the secure element, persistent store and factory
//! reset collaborators along with the [`KeystoreState`]. Unlocked seed
//! material is held only in the [`KeystoreState::Unlocked`] variant and is
//! zeroized when the vault is locked or dropped.
//!
//! Every unlock attempt is persisted to the store before the password is
//! stretched, so a power cut during or after the check cannot be used to
//! retry a guess without it counting.

use bip39::{Language, Mnemonic, Seed};
use byteorder::{ByteOrder, LittleEndian};
use sha2::{digest::generic_array::GenericArray, Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::{
    cipher::{self, IV_LEN, TAG_LEN},
    config::Config,
    salt::SaltRoot,
    secure_element::SecureElement,
    store::{Key, Reset, Store, STORE_VALUE_MAX},
    stretch::stretch_password,
    Error,
};

/// Supported raw seed lengths (128, 192 and 256 bits)
pub const SEED_LENGTHS: [usize; 3] = [16, 24, 32];

/// Maximum raw seed length
pub const SEED_MAX: usize = 32;

/// BIP39 extended seed length
pub const BIP39_SEED_LEN: usize = 64;

/// Maximum record ciphertext length (IV and two padded blocks over the maximum seed)
pub const CIPHERTEXT_MAX: usize = IV_LEN + SEED_MAX + 16;

/// Record header, `seed_len:u8 || ct_len:u16le`
const RECORD_HEADER_LEN: usize = 3;

/// [`SeedSource`] trait provides the unlocked BIP39 seed for key derivation
pub trait SeedSource {
    /// Fetch the unlocked BIP39 seed, [`Error::Locked`] while locked
    fn bip39_seed(&self) -> Result<&[u8; BIP39_SEED_LEN], Error>;
}

impl<T: SeedSource> SeedSource for &T {
    fn bip39_seed(&self) -> Result<&[u8; BIP39_SEED_LEN], Error> {
        T::bip39_seed(self)
    }
}

impl<T: SeedSource> SeedSource for &mut T {
    fn bip39_seed(&self) -> Result<&[u8; BIP39_SEED_LEN], Error> {
        T::bip39_seed(self)
    }
}

/// Persisted encrypted seed
#[derive(Clone, PartialEq, Debug)]
pub struct EncryptedSeedRecord {
    /// Raw seed length
    pub seed_len: u8,
    /// `iv || ciphertext`
    pub ciphertext: heapless::Vec<u8, CIPHERTEXT_MAX>,
    /// HMAC-SHA256 over `ciphertext`
    pub tag: [u8; TAG_LEN],
}

impl EncryptedSeedRecord {
    /// Encode to `seed_len:u8 || ct_len:u16le || ct || tag`
    pub fn encode(&self) -> Result<heapless::Vec<u8, STORE_VALUE_MAX>, Error> {
        let mut buff = heapless::Vec::new();
        let mut len = [0u8; 2];
        LittleEndian::write_u16(&mut len, self.ciphertext.len() as u16);

        buff.push(self.seed_len).map_err(|_| Error::Generic)?;
        buff.extend_from_slice(&len).map_err(|_| Error::Generic)?;
        buff.extend_from_slice(&self.ciphertext).map_err(|_| Error::Generic)?;
        buff.extend_from_slice(&self.tag).map_err(|_| Error::Generic)?;

        Ok(buff)
    }

    /// Decode a persisted record, malformed records are [`Error::Generic`]
    pub fn decode(buff: &[u8]) -> Result<Self, Error> {
        if buff.len() < RECORD_HEADER_LEN + TAG_LEN {
            return Err(Error::Generic);
        }

        let seed_len = buff[0];
        let ct_len = LittleEndian::read_u16(&buff[1..3]) as usize;

        if !SEED_LENGTHS.contains(&(seed_len as usize))
            || buff.len() != RECORD_HEADER_LEN + ct_len + TAG_LEN
        {
            return Err(Error::Generic);
        }

        let (ct, tag) = buff[RECORD_HEADER_LEN..].split_at(ct_len);

        let ciphertext = heapless::Vec::from_slice(ct).map_err(|_| Error::Generic)?;
        let mut t = [0u8; TAG_LEN];
        t.copy_from_slice(tag);

        Ok(Self {
            seed_len,
            ciphertext,
            tag: t,
        })
    }
}

/// Unlocked seed material
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Unlocked {
    seed: [u8; SEED_MAX],
    seed_len: usize,
    bip39_seed: [u8; BIP39_SEED_LEN],
}

impl Unlocked {
    fn new(seed: &[u8], passphrase: &str) -> Result<Self, Error> {
        let mut s = Self {
            seed: [0u8; SEED_MAX],
            seed_len: seed.len(),
            bip39_seed: [0u8; BIP39_SEED_LEN],
        };

        s.seed[..seed.len()].copy_from_slice(seed);
        bip39_seed(seed, passphrase, &mut s.bip39_seed)?;

        Ok(s)
    }

    fn seed(&self) -> &[u8] {
        &self.seed[..self.seed_len]
    }
}

/// Keystore state, created [`KeystoreState::Locked`] at boot
#[derive(Default)]
pub enum KeystoreState {
    #[default]
    Locked,
    Unlocked(Unlocked),
}

/// Derive the BIP39 seed for a raw seed (mnemonic entropy) and passphrase
fn bip39_seed(
    seed: &[u8],
    passphrase: &str,
    out: &mut [u8; BIP39_SEED_LEN],
) -> Result<(), Error> {
    let m =
        Mnemonic::from_entropy(seed, Language::English).map_err(|_| Error::InvalidArgument)?;
    let s = Seed::new(&m, passphrase);
    out.copy_from_slice(s.as_bytes());
    Ok(())
}

/// Encrypted seed vault
pub struct SeedVault<SE, S, R> {
    se: SE,
    store: S,
    reset: R,
    config: Config,
    state: KeystoreState,
}

impl<SE: SecureElement, S: Store, R: Reset> SeedVault<SE, S, R> {
    /// Create a locked vault with the default policy
    pub fn new(se: SE, store: S, reset: R) -> Self {
        Self::new_with_config(se, store, reset, Config::default())
    }

    /// Create a locked vault with the provided policy
    pub fn new_with_config(se: SE, store: S, reset: R, config: Config) -> Self {
        Self {
            se,
            store,
            reset,
            config,
            state: KeystoreState::Locked,
        }
    }

    /// Provision the secure element and ensure the salt root exists
    pub fn setup(&mut self) -> Result<(), Error> {
        self.se.setup(&mut self.store)?;
        SaltRoot::load_or_create(&mut self.store, &mut self.se)?;

        Ok(())
    }

    /// Access the secure element
    pub fn secure_element(&mut self) -> &mut SE {
        &mut self.se
    }

    /// Access the persistent store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Fetch the vault policy
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Finalise device setup, subsequent seed stores are rejected
    pub fn mark_initialized(&mut self) -> Result<(), Error> {
        match self.store.set_initialized() {
            true => Ok(()),
            false => Err(Error::Storage),
        }
    }

    /// Check whether the keystore is locked
    pub fn is_locked(&self) -> bool {
        matches!(self.state, KeystoreState::Locked)
    }

    /// Lock the keystore, zeroizing unlocked seed material. Idempotent.
    pub fn lock(&mut self) {
        #[cfg(feature = "log")]
        if !self.is_locked() {
            log::debug!("locking keystore");
        }

        // Drop zeroizes
        self.state = KeystoreState::Locked;
    }

    /// Copy the unlocked raw seed, `None` while locked
    pub fn copy_seed(&self) -> Option<Zeroizing<Vec<u8>>> {
        match &self.state {
            KeystoreState::Unlocked(u) => Some(Zeroizing::new(u.seed().to_vec())),
            KeystoreState::Locked => None,
        }
    }

    /// Fetch the number of failed unlock attempts
    pub fn failed_attempts(&self) -> u8 {
        self.store
            .read(Key::UnlockAttempts)
            .and_then(|v| v.first().copied())
            .unwrap_or(0)
    }

    /// Fetch the number of unlock attempts remaining before factory reset
    pub fn remaining_attempts(&self) -> u8 {
        self.config
            .max_unlock_attempts
            .saturating_sub(self.failed_attempts())
    }

    fn set_failed_attempts(&mut self, n: u8) -> Result<(), Error> {
        match self.store.write(Key::UnlockAttempts, &[n]) {
            true => Ok(()),
            false => Err(Error::Storage),
        }
    }

    fn stretch(&mut self, password: &str) -> Result<Zeroizing<[u8; 32]>, Error> {
        let salt = SaltRoot::load(&self.store)?;

        stretch_password(&mut self.se, &salt, password).map_err(|_e| {
            #[cfg(feature = "log")]
            log::warn!("password stretch failed: {:?}", _e);

            Error::Generic
        })
    }

    fn load_record(&self) -> Result<EncryptedSeedRecord, Error> {
        let v = self.store.read(Key::EncryptedSeed).ok_or(Error::Generic)?;
        EncryptedSeedRecord::decode(&v)
    }

    /// Stretch `password` and decrypt the persisted record, `None` on
    /// authentication failure
    fn decrypt_record(
        &mut self,
        record: &EncryptedSeedRecord,
        password: &str,
    ) -> Result<Option<Zeroizing<Vec<u8>>>, Error> {
        let secret = self.stretch(password)?;

        let seed = match cipher::decrypt(&secret, &record.ciphertext, &record.tag)? {
            Some(s) => s,
            None => return Ok(None),
        };

        if seed.len() != record.seed_len as usize {
            return Err(Error::Generic);
        }

        Ok(Some(seed))
    }

    /// Encrypt `seed` under `password` and persist it.
    ///
    /// Rejected with [`Error::AlreadyExists`] once setup has been finalised.
    /// The lock state is not changed.
    pub fn encrypt_and_store_seed(&mut self, seed: &[u8], password: &str) -> Result<(), Error> {
        if self.store.is_initialized() {
            return Err(Error::AlreadyExists);
        }

        if !SEED_LENGTHS.contains(&seed.len()) {
            return Err(Error::InvalidArgument);
        }

        // Seed must be usable as mnemonic entropy
        let mut check = Zeroizing::new([0u8; BIP39_SEED_LEN]);
        bip39_seed(seed, "", &mut check)?;

        #[cfg(feature = "log")]
        log::debug!("storing {} byte seed", seed.len());

        self.se.update_keys().map_err(|_| Error::Generic)?;

        let secret = self.stretch(password)?;

        let random = self.se.random().map_err(|_| Error::Generic)?;
        let mut iv = [0u8; IV_LEN];
        iv.copy_from_slice(&random[..IV_LEN]);

        let (ct, tag) = cipher::encrypt(&secret, &iv, seed)?;
        let record = EncryptedSeedRecord {
            seed_len: seed.len() as u8,
            ciphertext: heapless::Vec::from_slice(&ct).map_err(|_| Error::Generic)?,
            tag,
        };

        if !self.store.write(Key::EncryptedSeed, &record.encode()?) {
            return Err(Error::Storage);
        }

        // Re-read and decrypt to verify the persisted record
        let verified = self
            .load_record()
            .and_then(|r| self.decrypt_record(&r, password))
            .map(|s| matches!(s, Some(s) if bool::from(s[..].ct_eq(seed))));

        if verified != Ok(true) {
            #[cfg(feature = "log")]
            log::warn!("seed record verification failed");

            if !self.store.erase(Key::EncryptedSeed) {
                #[cfg(feature = "log")]
                log::error!("failed to erase unverified seed record");

                return Err(Error::Storage);
            }
            return Err(Error::Generic);
        }

        // New record starts with a full attempt budget
        self.set_failed_attempts(0)?;

        Ok(())
    }

    /// Create a new 32-byte seed from chip and host entropy and store it
    pub fn create_and_store_seed(
        &mut self,
        password: &str,
        host_entropy: &[u8; 32],
    ) -> Result<(), Error> {
        if self.store.is_initialized() {
            return Err(Error::AlreadyExists);
        }

        let random = self.se.random().map_err(|_| Error::Generic)?;

        let mut seed = Zeroizing::new([0u8; 32]);
        Sha256::new()
            .chain_update(&random[..])
            .chain_update(host_entropy)
            .finalize_into(GenericArray::from_mut_slice(&mut seed[..]));

        self.encrypt_and_store_seed(&seed[..], password)
    }

    /// Unlock the keystore, returning the remaining attempt count.
    ///
    /// Unlocking while already unlocked re-verifies the password and fails with
    /// [`Error::Generic`] if the stored seed no longer matches the unlocked seed,
    /// leaving the keystore unlocked.
    pub fn unlock(&mut self, password: &str) -> Result<u8, Error> {
        let record = self.load_record()?;

        let max = self.config.max_unlock_attempts;
        let failed = self.failed_attempts();

        if failed >= max {
            #[cfg(feature = "log")]
            log::warn!("unlock attempts exhausted");

            return Err(Error::MaxAttemptsExceeded);
        }

        // Count the attempt before touching the chip
        self.set_failed_attempts(failed + 1)?;

        let seed = match self.decrypt_record(&record, password) {
            Ok(Some(s)) => s,
            Ok(None) => {
                let failed = failed + 1;

                #[cfg(feature = "log")]
                log::warn!("incorrect password ({} of {} attempts)", failed, max);

                if failed >= max {
                    self.exhausted();
                    return Err(Error::MaxAttemptsExceeded);
                }

                return Err(Error::IncorrectPassword {
                    remaining: max - failed,
                });
            }
            // Chip failures consume the attempt as well
            Err(e) => {
                if failed + 1 >= max {
                    self.exhausted();
                    return Err(Error::MaxAttemptsExceeded);
                }

                return Err(e);
            }
        };

        if let KeystoreState::Unlocked(u) = &self.state {
            if !bool::from(u.seed().ct_eq(&seed[..])) {
                #[cfg(feature = "log")]
                log::warn!("stored seed does not match unlocked seed");

                self.set_failed_attempts(failed)?;
                return Err(Error::Generic);
            }
        } else {
            self.state = KeystoreState::Unlocked(Unlocked::new(&seed, "")?);

            #[cfg(feature = "log")]
            log::debug!("keystore unlocked");
        }

        self.set_failed_attempts(0)?;

        Ok(max)
    }

    /// Lock and wipe on entering the exhausted state
    fn exhausted(&mut self) {
        #[cfg(feature = "log")]
        log::warn!("unlock attempts exhausted, factory reset");

        self.lock();
        self.reset.factory_reset();
    }

    /// Re-derive the BIP39 seed with a mnemonic passphrase
    pub fn unlock_bip39(&mut self, passphrase: &str) -> Result<(), Error> {
        match &mut self.state {
            KeystoreState::Unlocked(u) => {
                let mut derived = Zeroizing::new([0u8; BIP39_SEED_LEN]);
                bip39_seed(u.seed(), passphrase, &mut derived)?;
                u.bip39_seed.copy_from_slice(&derived[..]);
                Ok(())
            }
            KeystoreState::Locked => Err(Error::Locked),
        }
    }

    /// Fetch the BIP39 mnemonic for the unlocked seed
    pub fn get_bip39_mnemonic(&self) -> Result<Zeroizing<String>, Error> {
        match &self.state {
            KeystoreState::Unlocked(u) => {
                let m = Mnemonic::from_entropy(u.seed(), Language::English)
                    .map_err(|_| Error::Generic)?;
                Ok(Zeroizing::new(m.phrase().to_string()))
            }
            KeystoreState::Locked => Err(Error::Locked),
        }
    }

    /// Derive the extended public key at `keypath` from the unlocked seed
    pub fn get_xpub(&self, keypath: &[u32]) -> Result<bip32::XPub, Error> {
        crate::signer::get_xpub(self, keypath)
    }

    /// Derive and encode the extended public key at `keypath`
    pub fn encode_xpub_at_keypath(&self, keypath: &[u32]) -> Result<String, Error> {
        crate::signer::encode_xpub_at_keypath(self, keypath)
    }
}

impl<SE, S, R> SeedSource for SeedVault<SE, S, R> {
    fn bip39_seed(&self) -> Result<&[u8; BIP39_SEED_LEN], Error> {
        match &self.state {
            KeystoreState::Unlocked(u) => Ok(&u.bip39_seed),
            KeystoreState::Locked => Err(Error::Locked),
        }
    }
}
