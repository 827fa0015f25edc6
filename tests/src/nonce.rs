// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Anti-exfil signing session tests

use log::debug;
use rand::random;

use custody_core::{
    secure_element::SecureElement,
    signer::{anti_exfil_host_commit, anti_exfil_host_verify},
    Error,
};

use crate::{Session, KEYPATH, MOCK_SEED, PASSWORD};

/// Commit then sign, with the host checking each signature incorporates
/// its nonce
pub fn session<SE: SecureElement>(s: Session<SE>) -> anyhow::Result<()> {
    let mut s = s.seeded(&MOCK_SEED)?;
    s.device.unlock(PASSWORD)?;

    let pubkey = s.device.secp256k1_get_public_key(&KEYPATH)?;
    debug!("pubkey: {}", hex::encode(pubkey));

    for i in 0..4 {
        let msg: [u8; 32] = random();
        let host_nonce: [u8; 32] = random();
        let host_commitment = anti_exfil_host_commit(&host_nonce);

        let commitment = s.device.nonce_commit(&KEYPATH, &msg, &host_commitment)?;
        assert!(s.device.nonce_pending());

        let sig = s.device.nonce_sign(&host_nonce)?;
        assert!(!s.device.nonce_pending());
        debug!("session {} recid {}", i, sig.recid);

        assert!(anti_exfil_host_verify(
            &sig.sig,
            &msg,
            &pubkey,
            &host_nonce,
            &commitment
        ));

        // Matches the single step signature with the same host nonce
        let direct = s.device.secp256k1_sign(&KEYPATH, &msg, Some(&host_nonce))?;
        assert_eq!(sig, direct);

        // A different host nonce does not verify against the commitment
        let other: [u8; 32] = random();
        assert!(!anti_exfil_host_verify(
            &sig.sig, &msg, &pubkey, &other, &commitment
        ));
    }

    Ok(())
}

/// Sessions are single use and must be completed or cleared
pub fn session_state<SE: SecureElement>(s: Session<SE>) -> anyhow::Result<()> {
    let mut s = s.seeded(&MOCK_SEED)?;
    s.device.unlock(PASSWORD)?;

    let msg = [0x23; 32];
    let host_nonce = [0x55; 32];
    let host_commitment = anti_exfil_host_commit(&host_nonce);

    assert_eq!(s.device.nonce_sign(&host_nonce), Err(Error::SessionState));

    s.device.nonce_commit(&KEYPATH, &msg, &host_commitment)?;
    assert_eq!(
        s.device.nonce_commit(&KEYPATH, &msg, &host_commitment),
        Err(Error::SessionState)
    );

    s.device.nonce_clear();
    assert!(!s.device.nonce_pending());
    assert_eq!(s.device.nonce_sign(&host_nonce), Err(Error::SessionState));

    // Commit to the same inputs is deterministic
    let a = s.device.nonce_commit(&KEYPATH, &msg, &host_commitment)?;
    s.device.nonce_clear();
    let b = s.device.nonce_commit(&KEYPATH, &msg, &host_commitment)?;
    assert_eq!(a, b);

    s.device.nonce_sign(&host_nonce)?;
    assert_eq!(s.device.nonce_sign(&host_nonce), Err(Error::SessionState));

    Ok(())
}

/// Locking aborts a pending session
pub fn lock_aborts<SE: SecureElement>(s: Session<SE>) -> anyhow::Result<()> {
    let mut s = s.seeded(&MOCK_SEED)?;
    s.device.unlock(PASSWORD)?;

    let host_nonce = [0x55; 32];
    s.device
        .nonce_commit(&KEYPATH, &[0x23; 32], &anti_exfil_host_commit(&host_nonce))?;

    s.device.lock();
    assert!(!s.device.nonce_pending());

    s.device.unlock(PASSWORD)?;
    assert_eq!(s.device.nonce_sign(&host_nonce), Err(Error::SessionState));

    Ok(())
}
