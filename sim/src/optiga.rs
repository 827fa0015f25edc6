// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Security co-processor model
//!
//! Objects start in the creation lifecycle state. Metadata and non-secret
//! data are writable until the platform binding object becomes operational,
//! keyed operations require the shielded channel established by [`Command::Pair`].
//! Symmetric key use increments the bound monotonic counter and is refused
//! once it reaches its threshold.

use std::collections::HashMap;

use aes::Aes256;
use byteorder::{BigEndian, ByteOrder};
use cmac::Cmac;
use hmac::{Hmac, Mac};
use log::debug;
use p256::{
    ecdsa::{signature::hazmat::PrehashSigner, Signature, SigningKey},
    elliptic_curve::sec1::ToEncodedPoint,
    PublicKey,
};
use rand::{rngs::StdRng, RngCore, SeedableRng};
use sha2::Sha256;
use zeroize::Zeroizing;

use custody_core::secure_element::{
    optiga::{status, Command, Data, Oid, Response, LCSO_CREATION, LCSO_OPERATIONAL},
    Protection, Secret, Status,
};

use crate::ChipModel;

/// DER `BIT STRING` header for an uncompressed P256 public key
const DER_PUBKEY_HEADER: [u8; 3] = [0x03, 0x42, 0x00];

/// Metadata of an object in the creation state
const CREATION_METADATA: [u8; 5] = [0x20, 0x03, 0xC0, 0x01, LCSO_CREATION];

/// Security co-processor state
pub struct OptigaModel {
    metadata: HashMap<Oid, Vec<u8>>,
    binding: Option<[u8; 32]>,
    hmac: Option<[u8; 32]>,
    symkey: Option<[u8; 32]>,
    attestation: Option<SigningKey>,
    /// Counter object, `value:u32be || threshold:u32be`
    pub counter: [u8; 8],
    open: bool,
    paired: bool,
    rng: StdRng,
}

impl OptigaModel {
    /// Create a factory-fresh chip with a seeded RNG
    pub fn new(seed: u64) -> Self {
        Self {
            metadata: HashMap::new(),
            binding: None,
            hmac: None,
            symkey: None,
            attestation: None,
            counter: [0u8; 8],
            open: false,
            paired: false,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Fetch object metadata
    pub fn metadata(&self, oid: Oid) -> &[u8] {
        self.metadata
            .get(&oid)
            .map(|m| &m[..])
            .unwrap_or(&CREATION_METADATA)
    }

    /// Overwrite object metadata, bypassing access conditions
    pub fn poke_metadata(&mut self, oid: Oid, md: &[u8]) {
        self.metadata.insert(oid, md.to_vec());
    }

    /// Check whether the platform binding object is operational
    pub fn operational(&self) -> bool {
        self.lcso(Oid::PlatformBinding) >= LCSO_OPERATIONAL
    }

    /// Check whether the shielded channel is active
    pub fn paired(&self) -> bool {
        self.paired
    }

    /// Set the monotonic counter value
    pub fn set_counter(&mut self, value: u32) {
        BigEndian::write_u32(&mut self.counter[..4], value);
    }

    fn lcso(&self, oid: Oid) -> u8 {
        self.metadata(oid).get(4).copied().unwrap_or(LCSO_CREATION)
    }

    fn random(&mut self) -> [u8; 32] {
        let mut r = [0u8; 32];
        self.rng.fill_bytes(&mut r);
        r
    }

    fn check_shielded(&self, protection: Protection) -> Result<(), Status> {
        if protection != Protection::Full || !self.paired {
            return Err(status::SECURITY_STATUS_NOT_SATISFIED);
        }
        Ok(())
    }

    /// Configuration writes are refused once the binding object is operational
    fn check_creation(&self) -> Result<(), Status> {
        if self.operational() {
            return Err(status::ACCESS_CONDITIONS_NOT_SATISFIED);
        }
        Ok(())
    }

    fn cmac(&mut self, msg: &[u8; 32]) -> Result<Zeroizing<[u8; 16]>, Status> {
        let key = self.symkey.ok_or(status::ACCESS_CONDITIONS_NOT_SATISFIED)?;

        let value = BigEndian::read_u32(&self.counter[..4]);
        let threshold = BigEndian::read_u32(&self.counter[4..]);
        if value >= threshold {
            return Err(status::ACCESS_CONDITIONS_NOT_SATISFIED);
        }
        BigEndian::write_u32(&mut self.counter[..4], value + 1);

        let mut mac = <Cmac<Aes256> as Mac>::new_from_slice(&key)
            .map_err(|_| status::ACCESS_CONDITIONS_NOT_SATISFIED)?;
        mac.update(msg);

        let mut out = Zeroizing::new([0u8; 16]);
        out.copy_from_slice(&mac.finalize().into_bytes());
        Ok(out)
    }

    fn hmac(&self, msg: &[u8; 32]) -> Result<Secret, Status> {
        let key = self.hmac.ok_or(status::ACCESS_CONDITIONS_NOT_SATISFIED)?;

        let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(&key)
            .map_err(|_| status::ACCESS_CONDITIONS_NOT_SATISFIED)?;
        mac.update(msg);

        let mut out = Secret([0u8; 32]);
        out.0.copy_from_slice(&mac.finalize().into_bytes());
        Ok(out)
    }
}

fn data(b: &[u8]) -> Result<Response, Status> {
    Data::from_slice(b)
        .map(Response::Data)
        .map_err(|_| status::COMMS_ERROR)
}

impl ChipModel for OptigaModel {
    type Command = Command;
    type Response = Response;

    fn execute(&mut self, protection: Protection, cmd: Command) -> Result<Response, Status> {
        if !self.open && cmd != Command::OpenApplication {
            return Err(status::COMMS_ERROR);
        }

        match cmd {
            Command::OpenApplication => {
                self.open = true;
                Ok(Response::Ok)
            }
            Command::ReadMetadata(oid) => data(self.metadata(oid)),
            Command::WriteMetadata(oid, md) => {
                self.check_creation()?;
                self.metadata.insert(oid, md.to_vec());

                if oid == Oid::PlatformBinding {
                    debug!("optiga: lifecycle state {:#04x}", self.lcso(oid));
                }
                Ok(Response::Ok)
            }
            Command::ReadData(Oid::Counter) => data(&self.counter),
            Command::ReadData(_) => Err(status::ACCESS_CONDITIONS_NOT_SATISFIED),
            Command::WriteData(Oid::Counter, d) => {
                self.check_creation()?;
                if d.len() != self.counter.len() {
                    return Err(status::COMMS_ERROR);
                }
                self.counter.copy_from_slice(&d);
                Ok(Response::Ok)
            }
            Command::WriteData(..) => Err(status::ACCESS_CONDITIONS_NOT_SATISFIED),
            Command::WriteSecret(Oid::PlatformBinding, s) => {
                self.check_creation()?;
                self.binding = Some(s.0);
                Ok(Response::Ok)
            }
            Command::WriteSecret(Oid::Hmac, s) => {
                self.check_shielded(protection)?;
                self.hmac = Some(s.0);
                Ok(Response::Ok)
            }
            Command::WriteSecret(..) => Err(status::INVALID_OID),
            Command::Pair(s) => {
                if self.binding != Some(s.0) {
                    self.paired = false;
                    return Err(status::SECURITY_STATUS_NOT_SATISFIED);
                }

                debug!("optiga: shielded channel established");
                self.paired = true;
                Ok(Response::Ok)
            }
            Command::Hmac { oid: Oid::Hmac, msg } => {
                self.check_shielded(protection)?;
                self.hmac(&msg.0).map(Response::Mac)
            }
            Command::Cmac {
                oid: Oid::SymKey,
                msg,
            } => {
                self.check_shielded(protection)?;
                self.cmac(&msg.0).map(Response::Cmac)
            }
            Command::Hmac { .. } | Command::Cmac { .. } => Err(status::INVALID_OID),
            Command::Random => Ok(Response::Random(Secret(self.random()))),
            Command::GenSymKey(Oid::SymKey) => {
                self.check_shielded(protection)?;
                self.symkey = Some(self.random());
                Ok(Response::Ok)
            }
            Command::GenKeyPair(Oid::Attestation) => {
                self.check_shielded(protection)?;

                let sk = SigningKey::random(&mut self.rng);
                let point = PublicKey::from(sk.verifying_key()).to_encoded_point(false);
                self.attestation = Some(sk);

                let mut d = DER_PUBKEY_HEADER.to_vec();
                d.extend_from_slice(point.as_bytes());
                data(&d)
            }
            Command::GenSymKey(_) | Command::GenKeyPair(_) => Err(status::INVALID_OID),
            Command::Sign {
                oid: Oid::Attestation,
                digest,
            } => {
                self.check_shielded(protection)?;

                let sk = self
                    .attestation
                    .as_ref()
                    .ok_or(status::ACCESS_CONDITIONS_NOT_SATISFIED)?;
                let sig: Signature = sk
                    .sign_prehash(&digest)
                    .map_err(|_| status::ACCESS_CONDITIONS_NOT_SATISFIED)?;

                // The chip returns the two DER INTEGERs without the SEQUENCE header
                let der = sig.to_der();
                data(&der.as_bytes()[2..])
            }
            Command::Sign { .. } => Err(status::INVALID_OID),
        }
    }

    fn power_on(&mut self) {
        self.open = false;
        self.paired = false;
    }
}
