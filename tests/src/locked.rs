// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Locked keystore tests

use strum::IntoEnumIterator;

use custody_core::{
    secure_element::SecureElement,
    signer::anti_exfil_host_commit,
    store::{Key, Store},
    Error,
};
use custody_sim::MemoryStore;

use crate::{Session, KEYPATH, MOCK_SEED, PASSWORD};

/// Capture every persisted value
fn snapshot(store: &MemoryStore) -> (Vec<Option<Vec<u8>>>, bool) {
    let values = Key::iter().map(|k| store.get(k)).collect();
    (values, store.is_initialized())
}

/// Key operations fail while locked and leave persisted state untouched
pub fn locked<SE: SecureElement>(s: Session<SE>) -> anyhow::Result<()> {
    let mut s = s.seeded(&MOCK_SEED)?;

    // Lock after a successful unlock as well as from boot
    for relock in [false, true] {
        if relock {
            s.device.unlock(PASSWORD)?;
            s.device.lock();
        }

        let before = snapshot(&s.store);
        let msg = [0x23; 32];
        let host_nonce = [0x55; 32];

        assert!(s.device.is_locked());
        assert!(s.device.vault().copy_seed().is_none());

        assert_eq!(s.device.get_xpub(&KEYPATH).err(), Some(Error::Locked));
        assert_eq!(
            s.device.encode_xpub_at_keypath(&KEYPATH),
            Err(Error::Locked)
        );
        assert_eq!(
            s.device.secp256k1_get_public_key(&KEYPATH),
            Err(Error::Locked)
        );
        assert_eq!(
            s.device.secp256k1_sign(&KEYPATH, &msg, None),
            Err(Error::Locked)
        );
        assert_eq!(
            s.device.secp256k1_sign(&KEYPATH, &msg, Some(&host_nonce)),
            Err(Error::Locked)
        );
        assert_eq!(
            s.device
                .nonce_commit(&KEYPATH, &msg, &anti_exfil_host_commit(&host_nonce)),
            Err(Error::Locked)
        );
        assert!(!s.device.nonce_pending());

        assert_eq!(s.device.get_bip39_mnemonic().err(), Some(Error::Locked));
        assert_eq!(s.device.unlock_bip39("abc"), Err(Error::Locked));

        assert_eq!(snapshot(&s.store), before);
    }

    Ok(())
}
