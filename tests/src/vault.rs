// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Seed storage, unlock and lockout tests

use bip39::{Language, Mnemonic};
use log::info;

use custody_core::{
    secure_element::SecureElement,
    store::Key,
    vault::SEED_LENGTHS,
    Error,
};

use crate::{Session, MOCK_SEED, MOCK_SEED_2, PASSWORD};

/// Store and unlock seeds of every supported length
pub fn round_trip<SE: SecureElement>(new: impl Fn() -> Session<SE>) -> anyhow::Result<()> {
    for len in SEED_LENGTHS {
        info!("round trip with {} byte seed", len);

        let mut s = new().seeded(&MOCK_SEED[..len])?;
        let max = s.device.vault().config().max_unlock_attempts;

        assert!(s.device.is_locked());
        assert!(s.device.vault().copy_seed().is_none());

        assert_eq!(s.device.unlock(PASSWORD)?, max);
        assert!(!s.device.is_locked());

        let seed = s.device.vault().copy_seed().expect("unlocked seed");
        assert_eq!(&seed[..], &MOCK_SEED[..len]);

        let expected = Mnemonic::from_entropy(&MOCK_SEED[..len], Language::English)?;
        assert_eq!(s.device.get_bip39_mnemonic()?.as_str(), expected.phrase());

        s.device.lock();
        assert!(s.device.is_locked());
        assert!(s.device.vault().copy_seed().is_none());
    }

    Ok(())
}

/// Create a seed from chip and host entropy
pub fn create_seed<SE: SecureElement>(mut s: Session<SE>) -> anyhow::Result<()> {
    s.device.boot()?;
    s.device.create_and_store_seed(PASSWORD, &[0x5a; 32])?;

    assert!(s.store.get(Key::EncryptedSeed).is_some());

    s.device.unlock(PASSWORD)?;
    let seed = s.device.vault().copy_seed().expect("unlocked seed");
    assert_eq!(seed.len(), 32);
    assert_ne!(&seed[..], &[0x5a; 32]);

    Ok(())
}

/// Seeds can no longer be stored once setup is finalised
pub fn write_once<SE: SecureElement>(s: Session<SE>) -> anyhow::Result<()> {
    let mut s = s.seeded(&MOCK_SEED)?;
    s.device.mark_initialized()?;

    let record = s.store.get(Key::EncryptedSeed);

    assert_eq!(
        s.device.encrypt_and_store_seed(&MOCK_SEED_2, PASSWORD),
        Err(Error::AlreadyExists)
    );
    assert_eq!(
        s.device.create_and_store_seed(PASSWORD, &[0u8; 32]),
        Err(Error::AlreadyExists)
    );
    assert_eq!(s.store.get(Key::EncryptedSeed), record);

    s.device.unlock(PASSWORD)?;
    assert_eq!(
        &s.device.vault().copy_seed().expect("unlocked seed")[..],
        &MOCK_SEED
    );

    Ok(())
}

/// Wrong passwords count down to a single factory reset, after which
/// every unlock is refused
pub fn lockout<SE: SecureElement>(s: Session<SE>) -> anyhow::Result<()> {
    let mut s = s.seeded(&MOCK_SEED)?;
    s.reset.set_wipe(false);

    let max = s.device.vault().config().max_unlock_attempts;

    for k in 1..max {
        assert_eq!(
            s.device.unlock("wrong"),
            Err(Error::IncorrectPassword { remaining: max - k })
        );
        assert_eq!(s.device.remaining_attempts(), max - k);
        assert_eq!(s.reset.count(), 0);
    }

    assert_eq!(s.device.unlock("wrong"), Err(Error::MaxAttemptsExceeded));
    assert_eq!(s.device.remaining_attempts(), 0);
    assert_eq!(s.reset.count(), 1);

    // Correct password no longer accepted, no further reset
    assert_eq!(s.device.unlock(PASSWORD), Err(Error::MaxAttemptsExceeded));
    assert_eq!(s.reset.count(), 1);
    assert!(s.device.is_locked());

    Ok(())
}

/// Exhausting attempts wipes the persisted seed
pub fn lockout_wipes<SE: SecureElement>(s: Session<SE>) -> anyhow::Result<()> {
    let mut s = s.seeded(&MOCK_SEED)?;
    s.device.mark_initialized()?;

    let max = s.device.vault().config().max_unlock_attempts;
    for _ in 1..max {
        assert!(matches!(
            s.device.unlock("wrong"),
            Err(Error::IncorrectPassword { .. })
        ));
    }
    assert_eq!(s.device.unlock("wrong"), Err(Error::MaxAttemptsExceeded));
    assert_eq!(s.reset.count(), 1);

    assert!(s.store.get(Key::EncryptedSeed).is_none());
    assert_eq!(s.device.unlock(PASSWORD), Err(Error::Generic));

    // Setup may be repeated once the device restarts
    s.device.boot()?;
    s.device.encrypt_and_store_seed(&MOCK_SEED_2, "other")?;
    s.device.unlock("other")?;
    assert_eq!(
        &s.device.vault().copy_seed().expect("unlocked seed")[..],
        &MOCK_SEED_2
    );

    Ok(())
}

/// Unlocking while unlocked succeeds without consuming attempts, and a
/// successful unlock restores the full attempt count
pub fn unlock_idempotent<SE: SecureElement>(s: Session<SE>) -> anyhow::Result<()> {
    let mut s = s.seeded(&MOCK_SEED)?;
    let max = s.device.vault().config().max_unlock_attempts;

    for _ in 0..3 {
        assert_eq!(s.device.unlock(PASSWORD)?, max);
        assert_eq!(s.device.remaining_attempts(), max);
    }

    assert_eq!(
        s.device.unlock("wrong"),
        Err(Error::IncorrectPassword { remaining: max - 1 })
    );
    // A failed attempt does not lock an unlocked keystore
    assert!(!s.device.is_locked());

    assert_eq!(s.device.unlock(PASSWORD)?, max);
    assert_eq!(s.device.remaining_attempts(), max);

    Ok(())
}

/// Replacing the stored seed while unlocked is detected on the next unlock
pub fn seed_swap<SE: SecureElement>(s: Session<SE>) -> anyhow::Result<()> {
    let mut s = s.seeded(&MOCK_SEED)?;
    let max = s.device.vault().config().max_unlock_attempts;

    s.device.unlock(PASSWORD)?;

    s.device.encrypt_and_store_seed(&MOCK_SEED_2, PASSWORD)?;
    assert!(!s.device.is_locked());

    assert_eq!(s.device.unlock(PASSWORD), Err(Error::Generic));

    // No lockout or reset, the first seed stays unlocked
    assert_eq!(s.device.remaining_attempts(), max);
    assert_eq!(s.reset.count(), 0);
    assert_eq!(
        &s.device.vault().copy_seed().expect("unlocked seed")[..],
        &MOCK_SEED
    );

    Ok(())
}
