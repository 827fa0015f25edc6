// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Password stretching bound to the secure element
//!
//! ```text
//! stretch_in  = salted_hash("keystore_seed_access_in", password)
//! kdf1        = SE.kdf(RollKey, stretch_in)
//! kdf2        = SE.kdf(Kdf, kdf1)
//! kdf3        = SE.kdf(Kdf, kdf2)
//! stretch_out = salted_hash("keystore_seed_access_out", kdf3)
//! secret      = HMAC-SHA256(key = stretch_out, msg = kdf3)
//! ```
//!
//! Every guess requires three operations on the physical chip. Nothing is
//! cached between calls and all intermediates are zeroized on drop.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::{
    salt::Salt,
    secure_element::{SecureElement, Slot},
    Error,
};

/// Salted hash purpose for the password input
pub const PURPOSE_IN: &str = "keystore_seed_access_in";

/// Salted hash purpose for the chip output
pub const PURPOSE_OUT: &str = "keystore_seed_access_out";

/// Stretch a password to a 32-byte encryption secret.
///
/// Secure element failures are returned as-is.
pub fn stretch_password<SE: SecureElement, SA: Salt>(
    se: &mut SE,
    salt: &SA,
    password: &str,
) -> Result<Zeroizing<[u8; 32]>, Error> {
    let stretch_in = salt.salted_hash(PURPOSE_IN, password.as_bytes());

    let kdf1 = se.kdf(Slot::RollKey, &stretch_in)?;
    let kdf2 = se.kdf(Slot::Kdf, &kdf1)?;
    let kdf3 = se.kdf(Slot::Kdf, &kdf2)?;

    let stretch_out = salt.salted_hash(PURPOSE_OUT, &kdf3[..]);

    finalize(&stretch_out, &kdf3)
}

/// Combine the salted chip output with the final chip KDF
fn finalize(stretch_out: &[u8; 32], kdf3: &[u8; 32]) -> Result<Zeroizing<[u8; 32]>, Error> {
    let mut mac = Hmac::<Sha256>::new_from_slice(stretch_out).map_err(|_| Error::Generic)?;
    mac.update(kdf3);

    let mut secret = Zeroizing::new([0u8; 32]);
    secret.copy_from_slice(&mac.finalize().into_bytes());

    Ok(secret)
}
