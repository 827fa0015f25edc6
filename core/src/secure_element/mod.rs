// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Secure element abstraction
//!
//! Chip libraries are asynchronous: a command is dispatched and completion is
//! signalled later from an interrupt context. Every [`SecureElement`] operation
//! here is a blocking rendezvous over a [`Completion`] / [`Pending`] pair, so no
//! secret-handling operation can be suspended half way through.
//!
//! Two chip families are supported with the same interface, [`atecc`] (single
//! chip crypto-authentication family) and [`optiga`] (security co-processor
//! family). Each maps the logical [`Slot`]s onto its own objects and writes its
//! own access-control layout during provisioning. Raw chip [`Status`] codes
//! do not leave this module.

use core::fmt::Debug;

use strum::{Display, EnumIter, EnumString};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::{
    store::{Key, Store},
    Error,
};

mod completion;
pub use completion::{pair, Completion, Pending};

pub mod der;

pub mod atecc;
pub mod optiga;

/// Build-time selected secure element backend
#[cfg(feature = "optiga")]
pub type Platform<T> = optiga::Optiga<T>;

/// Build-time selected secure element backend
#[cfg(not(feature = "optiga"))]
pub type Platform<T> = atecc::Atecc<T>;

/// Logical key slots exposed by the secure element
#[derive(Copy, Clone, PartialEq, Eq, Debug, Display, EnumString, EnumIter)]
pub enum Slot {
    /// KDF key rotated by [`SecureElement::update_keys`], usage bound to the monotonic counter
    RollKey,
    /// Stable per-device KDF key
    Kdf,
    /// HMAC secret object
    Hmac,
    /// Chip-generated symmetric key object
    SymKey,
    /// Non-exportable attestation signing key
    Attestation,
    /// Monotonic counter
    Counter,
}

/// Communication protection level for the host / chip channel
#[derive(Copy, Clone, PartialEq, Eq, Debug, Display)]
pub enum Protection {
    /// Plaintext channel, only used during pairing
    Unprotected,
    /// Fully encrypted (shielded) channel
    Full,
}

/// Chip model reported by [`SecureElement::model`]
#[derive(Copy, Clone, PartialEq, Eq, Debug, Display, EnumString, EnumIter)]
pub enum Model {
    Atecc608A,
    Atecc608B,
    OptigaTrustMV3,
}

/// Raw chip status code, internal to the backends
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct Status(pub u16);

impl Status {
    /// Command completed successfully
    pub const SUCCESS: Status = Status(0x0000);
    /// Completion dropped by the driver without a result
    pub const DROPPED: Status = Status(0xffff);
}

impl Debug for Status {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Status(0x{:04x})", self.0)
    }
}

/// 32-byte secret carried in chip commands and responses, redacted from debug output
#[derive(Clone, PartialEq, Zeroize, ZeroizeOnDrop)]
pub struct Secret(pub [u8; 32]);

impl Secret {
    /// Move the secret out into a [`Zeroizing`] buffer
    pub fn take(mut self) -> Zeroizing<[u8; 32]> {
        let v = Zeroizing::new(self.0);
        self.0.zeroize();
        v
    }
}

impl From<&[u8; 32]> for Secret {
    fn from(v: &[u8; 32]) -> Self {
        Self(*v)
    }
}

impl Debug for Secret {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Secret(..)")
    }
}

/// [`Transport`] trait is implemented by chip drivers, dispatching a command
/// and firing the [`Completion`] once the chip has finished
pub trait Transport {
    /// Chip command set
    type Command: Debug;
    /// Chip command response
    type Response;

    /// Dispatch a command at the provided protection level.
    ///
    /// An `Err` means the command was never started and the completion will not fire.
    fn dispatch(
        &mut self,
        protection: Protection,
        cmd: Self::Command,
        done: Completion<Self::Response>,
    ) -> Result<(), Status>;
}

impl<T: Transport> Transport for &mut T {
    type Command = T::Command;
    type Response = T::Response;

    fn dispatch(
        &mut self,
        protection: Protection,
        cmd: Self::Command,
        done: Completion<Self::Response>,
    ) -> Result<(), Status> {
        T::dispatch(self, protection, cmd, done)
    }
}

/// Dispatch a command and block until the chip completes it.
///
/// Failures are returned without retry, the caller decides whether to retry.
pub(crate) fn exchange<T: Transport>(
    t: &mut T,
    protection: Protection,
    cmd: T::Command,
) -> Result<T::Response, Status> {
    let (done, pending) = pair();

    t.dispatch(protection, cmd, done)?;

    pending.wait()
}

/// [`SecureElement`] trait provides blocking secure element operations,
/// independent of the underlying chip family
pub trait SecureElement {
    /// Provision the chip (idempotent, skipped once the lifecycle state is operational)
    /// and verify the resulting configuration
    fn setup<S: Store>(&mut self, store: &mut S) -> Result<(), Error>;

    /// Rotate the [`Slot::RollKey`] secret
    fn update_keys(&mut self) -> Result<(), Error>;

    /// Keyed derivation using a chip-held secret, normalised to 32 bytes
    fn kdf(&mut self, slot: Slot, msg: &[u8; 32]) -> Result<Zeroizing<[u8; 32]>, Error>;

    /// True random bytes from the chip RNG
    fn random(&mut self) -> Result<Zeroizing<[u8; 32]>, Error>;

    /// Remaining uses of the [`Slot::RollKey`] counter
    fn monotonic_increments_remaining(&mut self) -> Result<u32, Error>;

    /// Generate the attestation key, returning the raw `X || Y` public key
    fn gen_attestation_key(&mut self) -> Result<[u8; 64], Error>;

    /// Sign a challenge with the attestation key, returning raw `R || S`
    fn attestation_sign(&mut self, challenge: &[u8; 32]) -> Result<[u8; 64], Error>;

    /// Fetch the chip model
    fn model(&mut self) -> Result<Model, Error>;
}

impl<T: SecureElement> SecureElement for &mut T {
    fn setup<S: Store>(&mut self, store: &mut S) -> Result<(), Error> {
        T::setup(self, store)
    }

    fn update_keys(&mut self) -> Result<(), Error> {
        T::update_keys(self)
    }

    fn kdf(&mut self, slot: Slot, msg: &[u8; 32]) -> Result<Zeroizing<[u8; 32]>, Error> {
        T::kdf(self, slot, msg)
    }

    fn random(&mut self) -> Result<Zeroizing<[u8; 32]>, Error> {
        T::random(self)
    }

    fn monotonic_increments_remaining(&mut self) -> Result<u32, Error> {
        T::monotonic_increments_remaining(self)
    }

    fn gen_attestation_key(&mut self) -> Result<[u8; 64], Error> {
        T::gen_attestation_key(self)
    }

    fn attestation_sign(&mut self, challenge: &[u8; 32]) -> Result<[u8; 64], Error> {
        T::attestation_sign(self, challenge)
    }

    fn model(&mut self) -> Result<Model, Error> {
        T::model(self)
    }
}

/// Load the channel pairing secret persisted at provisioning
pub(crate) fn load_pairing_secret<S: Store>(store: &S) -> Result<Secret, Error> {
    let v = store.read(Key::PairingSecret).ok_or(Error::Configuration)?;

    let mut secret = Secret([0u8; 32]);
    if v.len() != secret.0.len() {
        return Err(Error::Configuration);
    }
    secret.0.copy_from_slice(&v);

    Ok(secret)
}

/// Fetch the channel pairing secret, creating and persisting one from
/// `random` if provisioning has not yet stored it
pub(crate) fn provision_pairing_secret<S: Store>(
    store: &mut S,
    random: impl FnOnce() -> Result<Secret, Error>,
) -> Result<Secret, Error> {
    if store.read(Key::PairingSecret).is_some() {
        return load_pairing_secret(store);
    }

    let secret = random()?;
    if !store.write(Key::PairingSecret, &secret.0) {
        return Err(Error::Storage);
    }

    Ok(secret)
}


#[cfg(test)]
pub(crate) mod mock {
    use super::*;

    /// Script executed for each command, returning the chip result
    pub type Script<C, R> = Box<dyn FnMut(Protection, &C) -> Result<R, Status>>;

    /// Transport completing each command inline from a script
    pub struct Scripted<C, R> {
        script: Script<C, R>,
        /// Debug rendering of each dispatched command
        pub sent: Vec<String>,
        /// Refuse dispatch with this status
        pub refuse: Option<Status>,
    }

    impl<C, R> Scripted<C, R> {
        pub fn new(script: impl FnMut(Protection, &C) -> Result<R, Status> + 'static) -> Self {
            Self {
                script: Box::new(script),
                sent: Vec::new(),
                refuse: None,
            }
        }
    }

    impl<C: Debug, R> Transport for Scripted<C, R> {
        type Command = C;
        type Response = R;

        fn dispatch(
            &mut self,
            protection: Protection,
            cmd: C,
            done: Completion<R>,
        ) -> Result<(), Status> {
            if let Some(s) = self.refuse {
                return Err(s);
            }

            self.sent.push(format!("{cmd:?}"));
            done.complete((self.script)(protection, &cmd));

            Ok(())
        }
    }
}
