// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Key derivation and signing tests

use bip32::{ChildNumber, Prefix, XPrv};
use bip39::{Language, Mnemonic, Seed};
use k256::{
    ecdsa::{signature::hazmat::PrehashVerifier, RecoveryId, Signature, SigningKey, VerifyingKey},
    elliptic_curve::sec1::ToEncodedPoint,
    PublicKey,
};
use log::debug;
use rand::random;

use custody_core::{
    secure_element::SecureElement,
    signer::{self, MAX_KEYPATH_LEN},
    vault::{SeedSource, BIP39_SEED_LEN},
    Error,
};

use crate::{Session, EXPECTED_SECKEY, EXPECTED_XPUB, KEYPATH, MOCK_BIP39_SEED, MOCK_SEED, PASSWORD};

/// Fixed BIP39 seed, bypassing the vault
pub struct FixedSeed(pub [u8; BIP39_SEED_LEN]);

impl SeedSource for FixedSeed {
    fn bip39_seed(&self) -> Result<&[u8; BIP39_SEED_LEN], Error> {
        Ok(&self.0)
    }
}

/// Derive the expected signing key for `keypath` from a raw seed
pub fn expected_key(seed: &[u8], passphrase: &str, keypath: &[u32]) -> anyhow::Result<XPrv> {
    let m = Mnemonic::from_entropy(seed, Language::English)?;
    let seed = Seed::new(&m, passphrase);

    let mut k = XPrv::new(seed.as_bytes()).map_err(|e| anyhow::anyhow!("bip32: {e}"))?;
    for c in keypath {
        k = k
            .derive_child(ChildNumber::from(*c))
            .map_err(|e| anyhow::anyhow!("bip32: {e}"))?;
    }

    Ok(k)
}

/// SEC1 compressed encoding of a verifying key
pub fn compressed(vk: &VerifyingKey) -> [u8; 33] {
    let mut out = [0u8; 33];
    out.copy_from_slice(PublicKey::from(vk).to_encoded_point(true).as_bytes());
    out
}

/// Derivation against known vectors
pub fn vectors() -> anyhow::Result<()> {
    let keys = FixedSeed(MOCK_BIP39_SEED);

    assert_eq!(
        signer::encode_xpub_at_keypath(&keys, &KEYPATH)?,
        EXPECTED_XPUB
    );

    let expected = SigningKey::from_slice(&EXPECTED_SECKEY)?;
    let pubkey = signer::secp256k1_get_public_key(&keys, &KEYPATH)?;
    assert_eq!(
        &pubkey[..],
        compressed(expected.verifying_key()).as_slice()
    );

    Ok(())
}

/// Extended public keys match an independent derivation from the mnemonic
pub fn xpub<SE: SecureElement>(s: Session<SE>) -> anyhow::Result<()> {
    let mut s = s.seeded(&MOCK_SEED)?;
    s.device.unlock(PASSWORD)?;

    for n in 0..=KEYPATH.len() {
        let keypath = &KEYPATH[..n];
        let expected = expected_key(&MOCK_SEED, "", keypath)?;

        let xpub = s.device.encode_xpub_at_keypath(keypath)?;
        debug!("xpub at depth {}: {}", n, xpub);

        assert_eq!(
            xpub,
            expected.public_key().to_string(Prefix::XPUB).as_str()
        );
    }

    assert_eq!(
        s.device.encode_xpub_at_keypath(&[0u32; MAX_KEYPATH_LEN + 1]),
        Err(Error::InvalidArgument)
    );

    Ok(())
}

/// A mnemonic passphrase changes every derived key
pub fn passphrase<SE: SecureElement>(s: Session<SE>) -> anyhow::Result<()> {
    let mut s = s.seeded(&MOCK_SEED)?;
    s.device.unlock(PASSWORD)?;

    let plain = s.device.encode_xpub_at_keypath(&KEYPATH)?;

    s.device.unlock_bip39("abc")?;
    let with_passphrase = s.device.encode_xpub_at_keypath(&KEYPATH)?;

    assert_ne!(plain, with_passphrase);

    let expected = expected_key(&MOCK_SEED, "abc", &KEYPATH)?;
    assert_eq!(
        with_passphrase,
        expected.public_key().to_string(Prefix::XPUB).as_str()
    );

    // Mnemonic is independent of the passphrase
    let m = Mnemonic::from_entropy(&MOCK_SEED, Language::English)?;
    assert_eq!(s.device.get_bip39_mnemonic()?.as_str(), m.phrase());

    s.device.unlock_bip39("")?;
    assert_eq!(s.device.encode_xpub_at_keypath(&KEYPATH)?, plain);

    Ok(())
}

/// Signatures verify, are low-S and recover to the signing key
pub fn sign<SE: SecureElement>(s: Session<SE>) -> anyhow::Result<()> {
    let mut s = s.seeded(&MOCK_SEED)?;
    s.device.unlock(PASSWORD)?;

    let expected = expected_key(&MOCK_SEED, "", &KEYPATH)?;
    let vk = VerifyingKey::from(expected.private_key());

    let pubkey = s.device.secp256k1_get_public_key(&KEYPATH)?;
    assert_eq!(pubkey, compressed(&vk));

    for i in 0..8 {
        let msg: [u8; 32] = random();
        let host_nonce: Option<[u8; 32]> = (i % 2 == 1).then(random);

        let sig = s
            .device
            .secp256k1_sign(&KEYPATH, &msg, host_nonce.as_ref())?;

        let signature = Signature::from_slice(&sig.sig)?;
        assert!(signature.normalize_s().is_none(), "signature is not low-S");

        vk.verify_prehash(&msg, &signature)?;

        let recid = RecoveryId::from_byte(sig.recid)
            .ok_or_else(|| anyhow::anyhow!("invalid recid {}", sig.recid))?;
        let recovered = VerifyingKey::recover_from_prehash(&msg, &signature, recid)?;
        assert_eq!(recovered, vk);
    }

    Ok(())
}
