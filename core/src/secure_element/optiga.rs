// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Security co-processor backend
//!
//! Key material lives in addressed data / key objects, each carrying TLV
//! access-control metadata. Provisioning binds the host via the platform
//! binding secret, writes metadata for every object and finally moves the
//! binding object lifecycle state (LcsO) to operational. Once operational
//! the setup is skipped and only the shielded channel is established.

use byteorder::{BigEndian, ByteOrder};
use sha2::{Digest, Sha256};
use strum::{Display, EnumIter};
use zeroize::Zeroizing;

use super::{
    der, exchange, load_pairing_secret, provision_pairing_secret, Model, Protection, Secret,
    SecureElement, Slot, Status, Transport,
};
use crate::{config::Config, helpers::abort, store::Store, Error};

/// Object identifiers
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Display, EnumIter)]
#[repr(u16)]
pub enum Oid {
    /// Attestation key object
    Attestation = 0xE0F1,
    /// Monotonic counter 0, `value:u32be || threshold:u32be`
    Counter = 0xE120,
    /// Platform binding (shielded channel) secret
    PlatformBinding = 0xE140,
    /// AES key object, execution bound to [`Oid::Counter`]
    SymKey = 0xE200,
    /// HMAC secret data object
    Hmac = 0xF1D0,
}

/// Lifecycle state: creation
pub const LCSO_CREATION: u8 = 0x01;

/// Lifecycle state: operational
pub const LCSO_OPERATIONAL: u8 = 0x07;

/// Metadata TLV container tag
const METADATA_TAG: u8 = 0x20;

/// LcsO TLV tag
const LCSO_TAG: u8 = 0xC0;

/// Platform binding secret metadata, written last to complete provisioning
pub const PLATFORM_BINDING_METADATA: [u8; 19] = [
    METADATA_TAG,
    17,
    // LcsO
    LCSO_TAG,
    0x01,
    LCSO_OPERATIONAL,
    // Change: only while LcsO < operational
    0xD0,
    0x03,
    0xE1,
    0xFC,
    LCSO_OPERATIONAL,
    // Read: never
    0xD1,
    0x01,
    0xFF,
    // Execute: always
    0xD3,
    0x01,
    0x00,
    // Type: platform binding secret
    0xE8,
    0x01,
    0x22,
];

/// AES key object metadata
pub const SYMKEY_METADATA: [u8; 20] = [
    METADATA_TAG,
    18,
    LCSO_TAG,
    0x01,
    LCSO_OPERATIONAL,
    // Change: always (key generation only, host writes are refused by the chip)
    0xD0,
    0x01,
    0x00,
    // Read: never
    0xD1,
    0x01,
    0xFF,
    // Execute: counter 0xE120 && shielded channel
    0xD3,
    0x07,
    0x40,
    0xE1,
    0x20,
    0xFD,
    0x20,
    0xE1,
    0x40,
];

/// Attestation key object metadata
pub const ATTESTATION_METADATA: [u8; 19] = [
    METADATA_TAG,
    17,
    LCSO_TAG,
    0x01,
    LCSO_OPERATIONAL,
    // Key usage: sign
    0xE1,
    0x01,
    0x10,
    // Change: always (key generation only)
    0xD0,
    0x01,
    0x00,
    // Read: never
    0xD1,
    0x01,
    0xFF,
    // Execute: shielded channel
    0xD3,
    0x03,
    0x20,
    0xE1,
    0x40,
];

/// HMAC secret object metadata
pub const HMAC_METADATA: [u8; 21] = [
    METADATA_TAG,
    19,
    LCSO_TAG,
    0x01,
    LCSO_OPERATIONAL,
    // Type: pre-shared secret
    0xE8,
    0x01,
    0x21,
    // Change: shielded channel
    0xD0,
    0x03,
    0x20,
    0xE1,
    0x40,
    // Read: never
    0xD1,
    0x01,
    0xFF,
    // Execute: shielded channel
    0xD3,
    0x03,
    0x20,
    0xE1,
    0x40,
];

/// Expected metadata for each configured object
pub const METADATA: [(Oid, &[u8]); 4] = [
    (Oid::SymKey, &SYMKEY_METADATA),
    (Oid::Hmac, &HMAC_METADATA),
    (Oid::Attestation, &ATTESTATION_METADATA),
    (Oid::PlatformBinding, &PLATFORM_BINDING_METADATA),
];

/// Response data buffer (metadata, DER keys and signatures)
pub type Data = heapless::Vec<u8, 80>;

/// Chip commands
#[derive(Clone, PartialEq, Debug)]
pub enum Command {
    /// Open the chip application context
    OpenApplication,
    /// Read object metadata
    ReadMetadata(Oid),
    /// Write object metadata
    WriteMetadata(Oid, &'static [u8]),
    /// Read object data
    ReadData(Oid),
    /// Erase and write non-secret object data
    WriteData(Oid, Data),
    /// Erase and write a secret object
    WriteSecret(Oid, Secret),
    /// Establish the shielded channel using the platform binding secret
    Pair(Secret),
    /// HMAC-SHA256 keyed by a secret object
    Hmac { oid: Oid, msg: Secret },
    /// AES-CMAC keyed by a key object
    Cmac { oid: Oid, msg: Secret },
    /// Fetch 32 bytes from the TRNG
    Random,
    /// Generate an AES-256 key in a key object
    GenSymKey(Oid),
    /// Generate a P256 key pair in a key object, returning the DER public key
    GenKeyPair(Oid),
    /// ECDSA sign a digest, returning DER `INTEGER`s
    Sign { oid: Oid, digest: [u8; 32] },
}

/// Chip responses
#[derive(Clone, PartialEq, Debug)]
pub enum Response {
    Ok,
    Data(Data),
    Mac(Secret),
    Cmac(Zeroizing<[u8; 16]>),
    Random(Secret),
}

/// Chip status codes
pub mod status {
    use super::Status;

    pub const INVALID_OID: Status = Status(0x8001);
    pub const ACCESS_CONDITIONS_NOT_SATISFIED: Status = Status(0x8007);
    pub const SECURITY_STATUS_NOT_SATISFIED: Status = Status(0x8024);
    pub const COMMS_ERROR: Status = Status(0x0102);
}

/// Security co-processor backend
pub struct Optiga<T> {
    transport: T,
    config: Config,
    protection: Protection,
}

impl<T: Transport<Command = Command, Response = Response>> Optiga<T> {
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
        log::trace!("optiga cmd: {:?}", cmd);

        exchange(&mut self.transport, self.protection, cmd).map_err(|_s| {
            #[cfg(feature = "log")]
            log::warn!("optiga command failed: {:?}", _s);

            Error::Communication
        })
    }

    fn exec_ok(&mut self, cmd: Command) -> Result<(), Error> {
        match self.exec(cmd)? {
            Response::Ok => Ok(()),
            _ => Err(unexpected()),
        }
    }

    fn exec_data(&mut self, cmd: Command) -> Result<Data, Error> {
        match self.exec(cmd)? {
            Response::Data(d) => Ok(d),
            _ => Err(unexpected()),
        }
    }

    fn random_secret(&mut self) -> Result<Secret, Error> {
        match self.exec(Command::Random)? {
            Response::Random(r) => Ok(r),
            _ => Err(unexpected()),
        }
    }

    /// Read the binding object lifecycle state
    fn lifecycle_state(&mut self) -> Result<u8, Error> {
        let md = self.exec_data(Command::ReadMetadata(Oid::PlatformBinding))?;

        if md.len() < 5 || md[0] != METADATA_TAG || md[2] != LCSO_TAG || md[3] != 0x01 {
            #[cfg(feature = "log")]
            log::warn!("optiga: unexpected binding metadata");

            return Err(Error::Configuration);
        }

        Ok(md[4])
    }

    /// Write the binding secret and object configuration.
    ///
    /// Every write here is repeatable while the binding object remains in
    /// the creation state, so an interrupted run is completed on next boot.
    fn write_objects<S: Store>(&mut self, store: &mut S) -> Result<Secret, Error> {
        #[cfg(feature = "log")]
        log::debug!("optiga: writing configuration");

        let pairing = provision_pairing_secret(store, || self.random_secret())?;
        self.exec_ok(Command::WriteSecret(Oid::PlatformBinding, pairing.clone()))?;

        self.exec_ok(Command::WriteMetadata(Oid::SymKey, &SYMKEY_METADATA))?;
        self.exec_ok(Command::WriteMetadata(Oid::Hmac, &HMAC_METADATA))?;

        let mut counter = [0u8; 8];
        BigEndian::write_u32(&mut counter[4..], self.config.monotonic_counter_max_use);
        let counter = Data::from_slice(&counter).map_err(|_| Error::Configuration)?;
        self.exec_ok(Command::WriteData(Oid::Counter, counter))?;

        self.exec_ok(Command::WriteMetadata(
            Oid::Attestation,
            &ATTESTATION_METADATA,
        ))?;

        Ok(pairing)
    }

    fn pair(&mut self, secret: Secret) -> Result<(), Error> {
        match exchange(&mut self.transport, Protection::Unprotected, Command::Pair(secret)) {
            Ok(Response::Ok) => (),
            Ok(_) => return Err(unexpected()),
            Err(_s) => {
                #[cfg(feature = "log")]
                log::warn!("optiga pairing failed: {:?}", _s);

                return Err(Error::Configuration);
            }
        }

        self.protection = Protection::Full;

        Ok(())
    }

    /// Check the shielded channel is active and every object carries
    /// the expected metadata
    fn verify_config(&mut self) -> Result<(), Error> {
        if self.protection != Protection::Full {
            return Err(Error::Configuration);
        }

        for (oid, expected) in METADATA {
            let md = self.exec_data(Command::ReadMetadata(oid))?;
            if &md[..] != expected {
                #[cfg(feature = "log")]
                log::warn!("optiga: metadata mismatch for {}", oid);

                return Err(Error::Configuration);
            }
        }

        Ok(())
    }
}

impl<T: Transport<Command = Command, Response = Response>> SecureElement for Optiga<T> {
    fn setup<S: Store>(&mut self, store: &mut S) -> Result<(), Error> {
        self.protection = Protection::Unprotected;

        self.exec_ok(Command::OpenApplication)?;

        let lcso = self.lifecycle_state()?;
        let needs_provisioning = lcso < LCSO_OPERATIONAL;

        let pairing = match needs_provisioning {
            true => self.write_objects(store)?,
            false => load_pairing_secret(store)?,
        };

        self.pair(pairing)?;

        // Secret objects are only writable over the shielded channel, the
        // binding metadata goes last as it moves the chip to operational
        if needs_provisioning {
            let key = self.random_secret()?;
            self.exec_ok(Command::WriteSecret(Oid::Hmac, key))?;
            self.update_keys()?;

            self.exec_ok(Command::WriteMetadata(
                Oid::PlatformBinding,
                &PLATFORM_BINDING_METADATA,
            ))?;
        }

        self.verify_config()?;

        #[cfg(feature = "log")]
        log::debug!(
            "optiga: setup complete (lcso: {:#04x}, needs provisioning: {})",
            lcso,
            needs_provisioning
        );

        Ok(())
    }

    fn update_keys(&mut self) -> Result<(), Error> {
        self.exec_ok(Command::GenSymKey(Oid::SymKey))
    }

    fn kdf(&mut self, slot: Slot, msg: &[u8; 32]) -> Result<Zeroizing<[u8; 32]>, Error> {
        let msg = Secret::from(msg);

        match slot {
            // CMAC is 16 bytes, hashed on the host to the common width
            Slot::RollKey => match self.exec(Command::Cmac {
                oid: Oid::SymKey,
                msg,
            })? {
                Response::Cmac(mac) => {
                    let mut out = Zeroizing::new([0u8; 32]);
                    out.copy_from_slice(&Sha256::digest(&mac[..]));
                    Ok(out)
                }
                _ => Err(unexpected()),
            },
            Slot::Kdf => match self.exec(Command::Hmac {
                oid: Oid::Hmac,
                msg,
            })? {
                Response::Mac(mac) => Ok(mac.take()),
                _ => Err(unexpected()),
            },
            _ => Err(Error::InvalidArgument),
        }
    }

    fn random(&mut self) -> Result<Zeroizing<[u8; 32]>, Error> {
        self.random_secret().map(Secret::take)
    }

    fn monotonic_increments_remaining(&mut self) -> Result<u32, Error> {
        let d = self.exec_data(Command::ReadData(Oid::Counter))?;
        if d.len() < 4 {
            return Err(unexpected());
        }

        let counter = BigEndian::read_u32(&d[..4]);

        let max = self.config.monotonic_counter_max_use;
        if counter > max {
            abort("optiga monotonic counter larger than max");
        }

        Ok(max - counter)
    }

    fn gen_attestation_key(&mut self) -> Result<[u8; 64], Error> {
        let d = self.exec_data(Command::GenKeyPair(Oid::Attestation))?;
        der::parse_pubkey(&d).ok_or_else(unexpected)
    }

    fn attestation_sign(&mut self, challenge: &[u8; 32]) -> Result<[u8; 64], Error> {
        let d = self.exec_data(Command::Sign {
            oid: Oid::Attestation,
            digest: *challenge,
        })?;
        der::parse_signature(&d).ok_or_else(unexpected)
    }

    fn model(&mut self) -> Result<Model, Error> {
        Ok(Model::OptigaTrustMV3)
    }
}

fn unexpected() -> Error {
    #[cfg(feature = "log")]
    log::warn!("optiga: unexpected response");

    Error::Communication
}
