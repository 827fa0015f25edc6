// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Single-chip crypto-authentication backend
//!
//! Key material lives in numbered data zone slots, access control is set by the
//! slot and key configuration words in the config zone. Provisioning writes
//! the configuration, locks the config zone, fills the secret slots and locks
//! the data zone. A chip with both zones locked is operational and only has
//! its channel paired at boot.

use strum::{Display, EnumIter};
use zeroize::Zeroizing;

use super::{
    exchange, load_pairing_secret, provision_pairing_secret, Model, Protection, Secret,
    SecureElement, Slot, Status, Transport,
};
use crate::{config::Config, helpers::abort, store::Store, Error};

/// Config zone size
pub const CONFIG_ZONE_SIZE: usize = 128;

/// Offset of the slot configuration words in the config zone
pub const SLOT_CONFIG_OFFSET: usize = 20;

/// Offset of the key configuration words in the config zone
pub const KEY_CONFIG_OFFSET: usize = 96;

/// Data zone lock byte
pub const LOCK_VALUE: usize = 86;

/// Config zone lock byte
pub const LOCK_CONFIG: usize = 87;

/// Lock byte value for an unlocked zone
pub const UNLOCKED: u8 = 0x55;

/// Lock byte value for a locked zone
pub const LOCKED: u8 = 0x00;

/// Slot configuration words (little endian, one per slot)
pub const SLOT_CONFIG: [u8; 32] = [
    // 0: IO protection key, never readable
    0x8f, 0x0f, //
    // 1: auth key
    0x8f, 0x8f, //
    // 2: encryption key
    0x8f, 0x4f, //
    // 3: roll key, DeriveKey target, execution bound to counter 0
    0x9f, 0x8f, //
    // 4: kdf key
    0x8f, 0x4f, //
    // 5: attestation private key, internal sign only
    0x82, 0x20, //
    // 6..15: unused
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
];

/// Key configuration words (little endian, one per slot)
pub const KEY_CONFIG: [u8; 32] = [
    // 0..2: secret, requires random nonce
    0x3c, 0x00, 0x3c, 0x00, 0x3c, 0x00, //
    // 3: limited use (counter 0)
    0x3c, 0x20, //
    // 4: secret
    0x3c, 0x00, //
    // 5: P256 private key, GenKey permitted
    0x33, 0x00, //
    // 6..15: unused
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
];

/// Chip revision byte at and above which the chip is a 608B
const REVISION_608B: u8 = 0x03;

/// Data zone key slots
#[derive(Copy, Clone, PartialEq, Eq, Debug, Display, EnumIter)]
#[repr(u8)]
pub enum KeySlot {
    IoProtection = 0,
    Auth = 1,
    Encryption = 2,
    RollKey = 3,
    Kdf = 4,
    Attestation = 5,
}

impl KeySlot {
    /// Map a logical [`Slot`] to its data zone slot
    pub fn for_slot(slot: Slot) -> Option<Self> {
        match slot {
            Slot::RollKey => Some(KeySlot::RollKey),
            Slot::Kdf => Some(KeySlot::Kdf),
            Slot::Hmac => Some(KeySlot::Auth),
            Slot::SymKey => Some(KeySlot::Encryption),
            Slot::Attestation => Some(KeySlot::Attestation),
            Slot::Counter => None,
        }
    }
}

/// Chip commands
#[derive(Clone, PartialEq, Debug)]
pub enum Command {
    /// Fetch the chip revision
    Info,
    /// Read the full config zone
    ReadConfig,
    /// Write 32 bytes of configuration at `offset`
    WriteConfig { offset: u8, data: [u8; 32] },
    /// Lock the config zone
    LockConfig,
    /// Lock the data zone
    LockData,
    /// Write a secret key to a slot (data zone unlocked only)
    WriteKey { slot: KeySlot, key: Secret },
    /// Enable IO protection using the shared pairing secret
    Pair(Secret),
    /// Regenerate a slot key inside the chip
    DeriveKey { slot: KeySlot },
    /// HMAC-SHA256 of `msg` keyed by a slot secret
    Hmac { slot: KeySlot, msg: Secret },
    /// Fetch 32 random bytes
    Random,
    /// Read monotonic counter 0
    CounterRead,
    /// Generate a P256 key pair in a slot
    GenKey { slot: KeySlot },
    /// ECDSA sign a digest with a slot private key
    Sign { slot: KeySlot, digest: [u8; 32] },
}

/// Chip responses
#[derive(Clone, PartialEq, Debug)]
pub enum Response {
    Ok,
    Info([u8; 4]),
    Config([u8; CONFIG_ZONE_SIZE]),
    Mac(Secret),
    Random(Secret),
    Counter(u32),
    PublicKey([u8; 64]),
    Signature([u8; 64]),
}

/// Chip status codes
pub mod status {
    use super::Status;

    pub const CHECKMAC_FAIL: Status = Status(0x0001);
    pub const PARSE_ERROR: Status = Status(0x0003);
    pub const ECC_FAULT: Status = Status(0x0005);
    pub const EXECUTION_ERROR: Status = Status(0x000f);
    pub const COMM_ERROR: Status = Status(0x00ff);
}

/// Crypto-authentication chip backend
pub struct Atecc<T> {
    transport: T,
    config: Config,
    protection: Protection,
}

impl<T: Transport<Command = Command, Response = Response>> Atecc<T> {
    /// Create a backend over the provided chip transport
    pub fn new(transport: T, config: Config) -> Self {
        Self {
            transport,
            config,
            protection: Protection::Unprotected,
        }
    }

    /// Fetch the current channel protection level
    pub fn protection(&self) -> Protection {
        self.protection
    }

    /// Access the underlying transport
    pub fn transport(&mut self) -> &mut T {
        &mut self.transport
    }

    fn exec(&mut self, cmd: Command) -> Result<Response, Error> {
        #[cfg(feature = "log")]
        log::trace!("atecc cmd: {:?}", cmd);

        exchange(&mut self.transport, self.protection, cmd).map_err(|_s| {
            #[cfg(feature = "log")]
            log::warn!("atecc command failed: {:?}", _s);

            Error::Communication
        })
    }

    fn exec_ok(&mut self, cmd: Command) -> Result<(), Error> {
        match self.exec(cmd)? {
            Response::Ok => Ok(()),
            _ => Err(unexpected()),
        }
    }

    fn read_config(&mut self) -> Result<[u8; CONFIG_ZONE_SIZE], Error> {
        match self.exec(Command::ReadConfig)? {
            Response::Config(c) => Ok(c),
            _ => Err(unexpected()),
        }
    }

    fn random_secret(&mut self) -> Result<Secret, Error> {
        match self.exec(Command::Random)? {
            Response::Random(r) => Ok(r),
            _ => Err(unexpected()),
        }
    }

    /// Write and lock the config zone
    fn write_config(&mut self) -> Result<(), Error> {
        #[cfg(feature = "log")]
        log::debug!("atecc: writing config zone");

        self.exec_ok(Command::WriteConfig {
            offset: SLOT_CONFIG_OFFSET as u8,
            data: SLOT_CONFIG,
        })?;
        self.exec_ok(Command::WriteConfig {
            offset: KEY_CONFIG_OFFSET as u8,
            data: KEY_CONFIG,
        })?;

        self.exec_ok(Command::LockConfig)
    }

    /// Fill the secret slots and lock the data zone
    fn write_data<S: Store>(&mut self, store: &mut S) -> Result<Secret, Error> {
        #[cfg(feature = "log")]
        log::debug!("atecc: provisioning data zone");

        let pairing = provision_pairing_secret(store, || self.random_secret())?;
        self.exec_ok(Command::WriteKey {
            slot: KeySlot::IoProtection,
            key: pairing.clone(),
        })?;

        for slot in [KeySlot::Auth, KeySlot::Encryption, KeySlot::Kdf] {
            let key = self.random_secret()?;
            self.exec_ok(Command::WriteKey { slot, key })?;
        }

        self.exec_ok(Command::LockData)?;

        Ok(pairing)
    }

    /// Enable IO protection, a rejected pairing means the chip belongs
    /// to another host
    fn pair(&mut self, secret: Secret) -> Result<(), Error> {
        match exchange(&mut self.transport, Protection::Unprotected, Command::Pair(secret)) {
            Ok(Response::Ok) => (),
            Ok(_) => return Err(unexpected()),
            Err(_s) => {
                #[cfg(feature = "log")]
                log::warn!("atecc pairing failed: {:?}", _s);

                return Err(Error::Configuration);
            }
        }

        self.protection = Protection::Full;

        Ok(())
    }
}

impl<T: Transport<Command = Command, Response = Response>> SecureElement for Atecc<T> {
    fn setup<S: Store>(&mut self, store: &mut S) -> Result<(), Error> {
        self.protection = Protection::Unprotected;

        let mut config = self.read_config()?;

        if config[LOCK_CONFIG] == UNLOCKED {
            self.write_config()?;
            config = self.read_config()?;
        }

        if config[LOCK_CONFIG] != LOCKED
            || config[SLOT_CONFIG_OFFSET..][..32] != SLOT_CONFIG
            || config[KEY_CONFIG_OFFSET..][..32] != KEY_CONFIG
        {
            #[cfg(feature = "log")]
            log::warn!("atecc: config zone mismatch");

            return Err(Error::Configuration);
        }

        let needs_provisioning = config[LOCK_VALUE] == UNLOCKED;

        let pairing = match needs_provisioning {
            true => self.write_data(store)?,
            false => load_pairing_secret(store)?,
        };

        self.pair(pairing)?;

        // Roll key is derived in-chip once the data zone is locked
        if needs_provisioning {
            self.update_keys()?;
        }

        #[cfg(feature = "log")]
        log::debug!("atecc: setup complete (needs provisioning: {})", needs_provisioning);

        Ok(())
    }

    fn update_keys(&mut self) -> Result<(), Error> {
        self.exec_ok(Command::DeriveKey {
            slot: KeySlot::RollKey,
        })
    }

    fn kdf(&mut self, slot: Slot, msg: &[u8; 32]) -> Result<Zeroizing<[u8; 32]>, Error> {
        let slot = match slot {
            Slot::RollKey | Slot::Kdf => KeySlot::for_slot(slot).ok_or(Error::InvalidArgument)?,
            _ => return Err(Error::InvalidArgument),
        };

        // HMAC output is natively 32 bytes
        match self.exec(Command::Hmac {
            slot,
            msg: Secret::from(msg),
        })? {
            Response::Mac(m) => Ok(m.take()),
            _ => Err(unexpected()),
        }
    }

    fn random(&mut self) -> Result<Zeroizing<[u8; 32]>, Error> {
        self.random_secret().map(Secret::take)
    }

    fn monotonic_increments_remaining(&mut self) -> Result<u32, Error> {
        let counter = match self.exec(Command::CounterRead)? {
            Response::Counter(c) => c,
            _ => return Err(unexpected()),
        };

        let max = self.config.monotonic_counter_max_use;
        if counter > max {
            abort("atecc monotonic counter larger than max");
        }

        Ok(max - counter)
    }

    fn gen_attestation_key(&mut self) -> Result<[u8; 64], Error> {
        match self.exec(Command::GenKey {
            slot: KeySlot::Attestation,
        })? {
            Response::PublicKey(k) => Ok(k),
            _ => Err(unexpected()),
        }
    }

    fn attestation_sign(&mut self, challenge: &[u8; 32]) -> Result<[u8; 64], Error> {
        match self.exec(Command::Sign {
            slot: KeySlot::Attestation,
            digest: *challenge,
        })? {
            Response::Signature(s) => Ok(s),
            _ => Err(unexpected()),
        }
    }

    fn model(&mut self) -> Result<Model, Error> {
        match self.exec(Command::Info)? {
            Response::Info(rev) if rev[3] >= REVISION_608B => Ok(Model::Atecc608B),
            Response::Info(_) => Ok(Model::Atecc608A),
            _ => Err(unexpected()),
        }
    }
}

fn unexpected() -> Error {
    #[cfg(feature = "log")]
    log::warn!("atecc: unexpected response");

    Error::Communication
}
