// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Hierarchical deterministic key derivation and secp256k1 signing
//!
//! Keys are derived per BIP-32 from the unlocked BIP-39 seed. Signing
//! supports the anti-exfil (sign-to-contract) protocol, where the signing
//! nonce is bound to a host supplied nonce the device commits to before
//! learning it:
//!
//! 1. Host picks `host_nonce` and sends `host_commitment = H_data(host_nonce)`
//! 2. Device computes `k0 = RFC6979(d, msg, host_commitment)` and returns
//!    `R0 = k0·G` as its commitment
//! 3. Host reveals `host_nonce`, device signs using
//!    `k = k0 + H_point(R0 || host_nonce)`
//! 4. Host checks the signature `R` equals `R0 + H_point(R0 || host_nonce)·G`
//!
//! Without a host nonce the standard RFC6979 deterministic nonce is used.

use bip32::{ChildNumber, Prefix, XPrv, XPub};
use k256::{
    ecdsa::{signature::hazmat::PrehashVerifier, Signature as EcdsaSignature, VerifyingKey},
    elliptic_curve::{
        bigint::U256, generic_array::GenericArray, ops::Reduce, point::AffineCoordinates,
        scalar::IsHigh, sec1::ToEncodedPoint,
    },
    ProjectivePoint, PublicKey, Scalar,
};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::{helpers::tagged_hash, vault::SeedSource, Error};

/// Maximum number of keypath elements
pub const MAX_KEYPATH_LEN: usize = 10;

/// Hardened child offset
pub const HARDENED: u32 = 0x8000_0000;

/// Tag for host nonce commitments
const TAG_DATA: &[u8] = b"s2c/ecdsa/data";

/// Tag for the nonce point tweak
const TAG_POINT: &[u8] = b"s2c/ecdsa/point";

/// secp256k1 group order, big endian
const ORDER: [u8; 32] = [
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFE,
    0xBA, 0xAE, 0xDC, 0xE6, 0xAF, 0x48, 0xA0, 0x3B, 0xBF, 0xD2, 0x5E, 0x8C, 0xD0, 0x36, 0x41, 0x41,
];

/// Compact signature with recovery id
#[derive(Clone, PartialEq, Debug)]
pub struct Signature {
    /// `r || s`, low-S normalised
    pub sig: [u8; 64],
    /// Public key recovery id
    pub recid: u8,
}

/// Derive the extended private key at `keypath`
fn derive_xprv<K: SeedSource>(keys: &K, keypath: &[u32]) -> Result<XPrv, Error> {
    if keypath.len() > MAX_KEYPATH_LEN {
        return Err(Error::InvalidArgument);
    }

    let seed = keys.bip39_seed()?;

    let mut xprv = XPrv::new(seed).map_err(|_| Error::Signing)?;
    for &c in keypath {
        xprv = xprv
            .derive_child(ChildNumber::from(c))
            .map_err(|_| Error::Signing)?;
    }

    Ok(xprv)
}

/// Fetch the private scalar at `keypath`
fn secret_scalar<K: SeedSource>(keys: &K, keypath: &[u32]) -> Result<Zeroizing<Scalar>, Error> {
    let xprv = derive_xprv(keys, keypath)?;
    let d = *xprv.private_key().as_nonzero_scalar().as_ref();
    Ok(Zeroizing::new(d))
}

/// Derive the extended public key at `keypath`
pub fn get_xpub<K: SeedSource>(keys: &K, keypath: &[u32]) -> Result<XPub, Error> {
    derive_xprv(keys, keypath).map(|k| k.public_key())
}

/// Derive and base58 encode the extended public key at `keypath`
pub fn encode_xpub_at_keypath<K: SeedSource>(keys: &K, keypath: &[u32]) -> Result<String, Error> {
    get_xpub(keys, keypath).map(|k| k.to_string(Prefix::XPUB))
}

/// Fetch the compressed public key at `keypath`
pub fn secp256k1_get_public_key<K: SeedSource>(
    keys: &K,
    keypath: &[u32],
) -> Result<[u8; 33], Error> {
    get_xpub(keys, keypath).map(|k| k.to_bytes())
}

/// Reduce 32 big endian bytes modulo the group order
fn reduce(b: &[u8; 32]) -> Scalar {
    <Scalar as Reduce<U256>>::reduce_bytes(GenericArray::from_slice(b))
}

/// RFC6979 nonce with the host commitment as additional data
fn commit_nonce(d: &Scalar, msg: &[u8; 32], host_commitment: &[u8; 32]) -> Zeroizing<Scalar> {
    let mut x = Zeroizing::new([0u8; 32]);
    x.copy_from_slice(&d.to_bytes());

    let k = rfc6979::generate_k::<Sha256, _>(
        GenericArray::from_slice(&x[..]),
        GenericArray::from_slice(&ORDER),
        GenericArray::from_slice(msg),
        host_commitment,
    );

    let mut b = Zeroizing::new([0u8; 32]);
    b.copy_from_slice(&k);
    Zeroizing::new(reduce(&b))
}

fn compress(p: &ProjectivePoint) -> [u8; 33] {
    let mut c = [0u8; 33];
    c.copy_from_slice(p.to_affine().to_encoded_point(true).as_bytes());
    c
}

/// Nonce tweak `H_point(R0 || host_nonce)`
fn nonce_tweak(r0: &[u8; 33], host_nonce: &[u8; 32]) -> Scalar {
    reduce(&tagged_hash(TAG_POINT, &[&r0[..], &host_nonce[..]]))
}

/// Host side nonce commitment
pub fn anti_exfil_host_commit(host_nonce: &[u8; 32]) -> [u8; 32] {
    tagged_hash(TAG_DATA, &[&host_nonce[..]])
}

/// Compute the device nonce commitment `R0` for a signing session
pub fn secp256k1_nonce_commit<K: SeedSource>(
    keys: &K,
    keypath: &[u32],
    msg: &[u8; 32],
    host_commitment: &[u8; 32],
) -> Result<[u8; 33], Error> {
    let d = secret_scalar(keys, keypath)?;
    let k0 = commit_nonce(&d, msg, host_commitment);

    Ok(compress(&(ProjectivePoint::GENERATOR * *k0)))
}

/// Sign a 32-byte digest with the key at `keypath`.
///
/// With a host nonce the signature nonce commits to it (see module docs),
/// otherwise the standard RFC6979 nonce is used.
pub fn secp256k1_sign<K: SeedSource>(
    keys: &K,
    keypath: &[u32],
    msg: &[u8; 32],
    host_nonce: Option<&[u8; 32]>,
) -> Result<Signature, Error> {
    let host_nonce = match host_nonce {
        Some(n) => n,
        None => {
            let xprv = derive_xprv(keys, keypath)?;
            let (sig, recid) = xprv
                .private_key()
                .sign_prehash_recoverable(msg)
                .map_err(|_| Error::Signing)?;

            let mut s = Signature {
                sig: [0u8; 64],
                recid: recid.to_byte(),
            };
            s.sig.copy_from_slice(&sig.to_bytes());
            return Ok(s);
        }
    };

    let d = secret_scalar(keys, keypath)?;

    let k0 = commit_nonce(&d, msg, &anti_exfil_host_commit(host_nonce));
    let r0 = compress(&(ProjectivePoint::GENERATOR * *k0));

    let k = Zeroizing::new(*k0 + nonce_tweak(&r0, host_nonce));

    sign_with_nonce(&d, &k, msg)
}

/// ECDSA signature with an explicit nonce, low-S normalised
fn sign_with_nonce(d: &Scalar, k: &Scalar, msg: &[u8; 32]) -> Result<Signature, Error> {
    let k_inv = Option::<Scalar>::from(k.invert()).ok_or(Error::Signing)?;

    let big_r = (ProjectivePoint::GENERATOR * k).to_affine();
    let x = big_r.x();

    let r = <Scalar as Reduce<U256>>::reduce_bytes(&x);
    let z = reduce(msg);

    let mut s = k_inv * (z + r * d);

    if bool::from(r.is_zero()) || bool::from(s.is_zero()) {
        return Err(Error::Signing);
    }

    let mut recid = u8::from(bool::from(big_r.y_is_odd()));
    if x.as_slice() >= &ORDER[..] {
        recid |= 0b10;
    }

    if bool::from(s.is_high()) {
        s = -s;
        recid ^= 1;
    }

    let mut sig = [0u8; 64];
    sig[..32].copy_from_slice(&r.to_bytes());
    sig[32..].copy_from_slice(&s.to_bytes());

    Ok(Signature { sig, recid })
}

/// Host side verification that a signature is valid for `pubkey` and its
/// nonce incorporates `host_nonce` on top of the device commitment
pub fn anti_exfil_host_verify(
    sig: &[u8; 64],
    msg: &[u8; 32],
    pubkey: &[u8; 33],
    host_nonce: &[u8; 32],
    client_commitment: &[u8; 33],
) -> bool {
    let (vk, s, r0) = match (
        VerifyingKey::from_sec1_bytes(pubkey),
        EcdsaSignature::from_slice(sig),
        PublicKey::from_sec1_bytes(client_commitment),
    ) {
        (Ok(vk), Ok(s), Ok(r0)) => (vk, s, r0),
        _ => return false,
    };

    if vk.verify_prehash(msg, &s).is_err() {
        return false;
    }

    let t = nonce_tweak(client_commitment, host_nonce);
    let expected = (r0.to_projective() + ProjectivePoint::GENERATOR * t).to_affine();

    let r = <Scalar as Reduce<U256>>::reduce_bytes(&expected.x());

    r.to_bytes()[..] == sig[..32]
}
