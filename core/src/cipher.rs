// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Authenticated seed encryption
//!
//! AES-256-CBC (PKCS#7) with an encrypt-then-MAC HMAC-SHA256 tag. Encryption and
//! MAC keys are the two halves of `SHA512(secret)`, ciphertext is `iv || cbc`.

use aes::{
    cipher::{
        block_padding::Pkcs7, generic_array::GenericArray, BlockDecryptMut, BlockEncryptMut,
        KeyIvInit,
    },
    Aes256,
};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256, Sha512};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::Error;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;
type HmacSha256 = Hmac<Sha256>;

/// IV length, prefixed to the ciphertext
pub const IV_LEN: usize = 16;

/// Authentication tag length
pub const TAG_LEN: usize = 32;

/// Split `secret` into encryption and MAC keys
fn keys(secret: &[u8; 32]) -> Zeroizing<[u8; 64]> {
    let mut k = Zeroizing::new([0u8; 64]);
    Sha512::new()
        .chain_update(secret)
        .finalize_into(GenericArray::from_mut_slice(&mut k[..]));
    k
}

fn tag(mac_key: &[u8], ciphertext: &[u8]) -> Result<[u8; TAG_LEN], Error> {
    let mut mac = HmacSha256::new_from_slice(mac_key).map_err(|_| Error::Generic)?;
    mac.update(ciphertext);
    Ok(mac.finalize().into_bytes().into())
}

/// Encrypt `plaintext` under `secret`, returning `(iv || ciphertext, tag)`
pub fn encrypt(
    secret: &[u8; 32],
    iv: &[u8; IV_LEN],
    plaintext: &[u8],
) -> Result<(Vec<u8>, [u8; TAG_LEN]), Error> {
    let k = keys(secret);
    let (enc_key, mac_key) = k.split_at(32);

    let cbc = Aes256CbcEnc::new(
        GenericArray::from_slice(enc_key),
        GenericArray::from_slice(iv),
    )
    .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    let mut ct = Vec::with_capacity(IV_LEN + cbc.len());
    ct.extend_from_slice(iv);
    ct.extend_from_slice(&cbc);

    let t = tag(mac_key, &ct)?;

    Ok((ct, t))
}

/// Verify and decrypt `iv || ciphertext` under `secret`.
///
/// Returns `None` where the tag does not match (wrong secret) or the
/// ciphertext is malformed.
pub fn decrypt(
    secret: &[u8; 32],
    ciphertext: &[u8],
    expected_tag: &[u8; TAG_LEN],
) -> Result<Option<Zeroizing<Vec<u8>>>, Error> {
    let k = keys(secret);
    let (enc_key, mac_key) = k.split_at(32);

    let t = tag(mac_key, ciphertext)?;
    if !bool::from(t[..].ct_eq(&expected_tag[..])) {
        return Ok(None);
    }

    if ciphertext.len() < IV_LEN {
        return Ok(None);
    }
    let (iv, body) = ciphertext.split_at(IV_LEN);

    let plaintext = Aes256CbcDec::new(
        GenericArray::from_slice(enc_key),
        GenericArray::from_slice(iv),
    )
    .decrypt_padded_vec_mut::<Pkcs7>(body)
    .ok()
    .map(Zeroizing::new);

    Ok(plaintext)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn decrypt_with_secret() {
        let secret = [0x42; 32];
        let (ct, t) = encrypt(&secret, &[0x01; IV_LEN], &[0xab; 32]).unwrap();

        // IV prefix and one block of padding
        assert_eq!(&ct[..IV_LEN], &[0x01; IV_LEN]);
        assert_eq!(ct.len(), IV_LEN + 48);

        let pt = decrypt(&secret, &ct, &t).unwrap().unwrap();
        assert_eq!(&pt[..], &[0xab; 32]);
    }

    #[test]
    fn wrong_secret_rejected() {
        let (ct, t) = encrypt(&[0x42; 32], &[0x01; IV_LEN], &[0xab; 16]).unwrap();

        assert!(decrypt(&[0x43; 32], &ct, &t).unwrap().is_none());
    }

    #[test]
    fn tampering_rejected() {
        let secret = [0x42; 32];
        let (mut ct, mut t) = encrypt(&secret, &[0x01; IV_LEN], &[0xab; 24]).unwrap();

        t[0] ^= 1;
        assert!(decrypt(&secret, &ct, &t).unwrap().is_none());
        t[0] ^= 1;

        ct[IV_LEN] ^= 1;
        assert!(decrypt(&secret, &ct, &t).unwrap().is_none());
        ct[IV_LEN] ^= 1;

        assert!(decrypt(&secret, &ct[..IV_LEN - 1], &t).unwrap().is_none());
    }
}
