// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Common tests for custody devices.
//!
//! Routines are generic over [`SecureElement`] so each runs against both
//! simulated chip families.

use hex_literal::hex;

use custody_core::{device::Device, secure_element::SecureElement, signer::HARDENED};
use custody_sim::{MemoryStore, SimReset};

pub mod vault;

pub mod signing;

pub mod nonce;

pub mod locked;

/// Raw seed fixture
pub const MOCK_SEED: [u8; 32] =
    hex!("1111111111111111222222222222222233333333333333334444444444444444");

/// Second raw seed fixture
pub const MOCK_SEED_2: [u8; 32] =
    hex!("3333333333333333444444444444444411111111111111112222222222222222");

/// BIP39 seed fixture
pub const MOCK_BIP39_SEED: [u8; 64] = hex!(
    "1111111111111111222222222222222233333333333333334444444444444444"
    "1111111111111111222222222222222233333333333333334444444444444444"
);

/// Keypath `m/44'/0'/0'/0/5`
pub const KEYPATH: [u32; 5] = [44 + HARDENED, HARDENED, HARDENED, 0, 5];

/// Private key at [`KEYPATH`] for [`MOCK_BIP39_SEED`]
pub const EXPECTED_SECKEY: [u8; 32] =
    hex!("4e64dfd33aae66c4c7526cf02ee8ae3f5892329d67dfd4ad05e9c3d06edf74fb");

/// Extended public key at [`KEYPATH`] for [`MOCK_BIP39_SEED`]
pub const EXPECTED_XPUB: &str = "xpub6Gmp9vKrJrVbU5JDcPRm6UmJPjTBurWfqow6w3BoK46E6mVyScMfTXd66WFeLfRa7Ug4iGMWDpWLpZAYcuUHyzcWZCqh8393rbuMoerRK1p";

/// Password used by test routines
pub const PASSWORD: &str = "password";

/// Device under test with handles to its persistent state
pub struct Session<SE> {
    pub device: Device<SE, MemoryStore, SimReset>,
    pub store: MemoryStore,
    pub reset: SimReset,
}

impl<SE: SecureElement> Session<SE> {
    /// Boot the device and store `seed` under [`PASSWORD`]
    pub fn seeded(mut self, seed: &[u8]) -> anyhow::Result<Self> {
        self.device.boot()?;
        self.device.encrypt_and_store_seed(seed, PASSWORD)?;
        Ok(self)
    }
}
