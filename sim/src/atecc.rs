// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Crypto-authentication chip model
//!
//! Config and data zones start unlocked. Slot keys are writable until the
//! data zone is locked, after which keyed operations require the paired
//! (IO protected) channel. Every roll key HMAC increments counter 0 and is
//! refused once the counter reaches its limit.

use hmac::{Hmac, Mac};
use log::debug;
use p256::{
    ecdsa::{signature::hazmat::PrehashSigner, Signature, SigningKey},
    elliptic_curve::sec1::ToEncodedPoint,
    PublicKey,
};
use rand::{rngs::StdRng, RngCore, SeedableRng};
use sha2::Sha256;

use custody_core::{
    config::MONOTONIC_COUNTER_MAX_USE,
    secure_element::{
        atecc::{
            status, Command, KeySlot, Response, CONFIG_ZONE_SIZE, LOCKED, LOCK_CONFIG, LOCK_VALUE,
            UNLOCKED,
        },
        Protection, Secret, Status,
    },
};

use crate::ChipModel;

/// Number of data zone slots
pub const SLOTS: usize = 16;

/// Revision bytes reported by a 608B
pub const REVISION_608B: [u8; 4] = [0x00, 0x00, 0x60, 0x03];

/// Revision bytes reported by a 608A
pub const REVISION_608A: [u8; 4] = [0x00, 0x00, 0x60, 0x02];

/// Crypto-authentication chip state
pub struct AteccModel {
    config: [u8; CONFIG_ZONE_SIZE],
    slots: [[u8; 32]; SLOTS],
    attestation: Option<SigningKey>,
    /// Monotonic counter 0
    pub counter: u32,
    /// Counter 0 use limit
    pub counter_limit: u32,
    /// Reported revision
    pub revision: [u8; 4],
    paired: bool,
    rng: StdRng,
}

impl AteccModel {
    /// Create a factory-fresh chip with a seeded RNG
    pub fn new(seed: u64) -> Self {
        let mut config = [0u8; CONFIG_ZONE_SIZE];
        config[LOCK_VALUE] = UNLOCKED;
        config[LOCK_CONFIG] = UNLOCKED;

        Self {
            config,
            slots: [[0u8; 32]; SLOTS],
            attestation: None,
            counter: 0,
            counter_limit: MONOTONIC_COUNTER_MAX_USE,
            revision: REVISION_608B,
            paired: false,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Check whether the config zone is locked
    pub fn config_locked(&self) -> bool {
        self.config[LOCK_CONFIG] == LOCKED
    }

    /// Check whether the data zone is locked
    pub fn data_locked(&self) -> bool {
        self.config[LOCK_VALUE] == LOCKED
    }

    /// Check whether the IO protection channel is active
    pub fn paired(&self) -> bool {
        self.paired
    }

    /// Overwrite a config zone byte
    pub fn poke_config(&mut self, offset: usize, value: u8) {
        self.config[offset] = value;
    }

    fn random(&mut self) -> [u8; 32] {
        let mut r = [0u8; 32];
        self.rng.fill_bytes(&mut r);
        r
    }

    /// Keyed operations are only available over the paired channel
    fn check_keyed(&self, protection: Protection) -> Result<(), Status> {
        if !self.data_locked() || protection != Protection::Full || !self.paired {
            return Err(status::EXECUTION_ERROR);
        }
        Ok(())
    }

    fn hmac(&mut self, slot: KeySlot, msg: &[u8; 32]) -> Result<Secret, Status> {
        match slot {
            KeySlot::IoProtection | KeySlot::Attestation => return Err(status::EXECUTION_ERROR),
            KeySlot::RollKey => {
                if self.counter >= self.counter_limit {
                    return Err(status::EXECUTION_ERROR);
                }
                self.counter += 1;
            }
            _ => (),
        }

        let mut mac = Hmac::<Sha256>::new_from_slice(&self.slots[slot as usize])
            .map_err(|_| status::EXECUTION_ERROR)?;
        mac.update(msg);

        let mut out = Secret([0u8; 32]);
        out.0.copy_from_slice(&mac.finalize().into_bytes());
        Ok(out)
    }
}

impl ChipModel for AteccModel {
    type Command = Command;
    type Response = Response;

    fn execute(&mut self, protection: Protection, cmd: Command) -> Result<Response, Status> {
        match cmd {
            Command::Info => Ok(Response::Info(self.revision)),
            Command::ReadConfig => Ok(Response::Config(self.config)),
            Command::WriteConfig { offset, data } => {
                let offset = offset as usize;
                let end = offset + data.len();
                if self.config_locked()
                    || end > CONFIG_ZONE_SIZE
                    || (offset <= LOCK_CONFIG && end > LOCK_VALUE)
                {
                    return Err(status::EXECUTION_ERROR);
                }
                self.config[offset..][..data.len()].copy_from_slice(&data);
                Ok(Response::Ok)
            }
            Command::LockConfig => {
                if self.config_locked() {
                    return Err(status::EXECUTION_ERROR);
                }
                self.config[LOCK_CONFIG] = LOCKED;
                Ok(Response::Ok)
            }
            Command::LockData => {
                if !self.config_locked() || self.data_locked() {
                    return Err(status::EXECUTION_ERROR);
                }
                self.config[LOCK_VALUE] = LOCKED;
                Ok(Response::Ok)
            }
            Command::WriteKey { slot, key } => {
                if !self.config_locked() || self.data_locked() {
                    return Err(status::EXECUTION_ERROR);
                }
                self.slots[slot as usize] = key.0;
                Ok(Response::Ok)
            }
            Command::Pair(secret) => {
                if !self.data_locked() || secret.0 != self.slots[KeySlot::IoProtection as usize] {
                    self.paired = false;
                    return Err(status::CHECKMAC_FAIL);
                }

                debug!("atecc: channel paired");
                self.paired = true;
                Ok(Response::Ok)
            }
            Command::DeriveKey { slot } => {
                self.check_keyed(protection)?;
                if slot != KeySlot::RollKey {
                    return Err(status::EXECUTION_ERROR);
                }
                self.slots[slot as usize] = self.random();
                Ok(Response::Ok)
            }
            Command::Hmac { slot, msg } => {
                self.check_keyed(protection)?;
                self.hmac(slot, &msg.0).map(Response::Mac)
            }
            Command::Random => Ok(Response::Random(Secret(self.random()))),
            Command::CounterRead => Ok(Response::Counter(self.counter)),
            Command::GenKey { slot } => {
                self.check_keyed(protection)?;
                if slot != KeySlot::Attestation {
                    return Err(status::EXECUTION_ERROR);
                }

                let sk = SigningKey::random(&mut self.rng);
                let point = PublicKey::from(sk.verifying_key()).to_encoded_point(false);
                self.attestation = Some(sk);

                let mut pubkey = [0u8; 64];
                pubkey.copy_from_slice(&point.as_bytes()[1..]);
                Ok(Response::PublicKey(pubkey))
            }
            Command::Sign { slot, digest } => {
                self.check_keyed(protection)?;

                let sk = match (slot, &self.attestation) {
                    (KeySlot::Attestation, Some(sk)) => sk,
                    _ => return Err(status::EXECUTION_ERROR),
                };

                let sig: Signature = sk.sign_prehash(&digest).map_err(|_| status::ECC_FAULT)?;

                let mut s = [0u8; 64];
                s.copy_from_slice(&sig.to_bytes());
                Ok(Response::Signature(s))
            }
        }
    }

    fn power_on(&mut self) {
        self.paired = false;
    }
}
