// Copyright (c) 2022-2023 The MobileCoin Foundation

/// Custody core errors, codes are stable for host transports
#[derive(Clone, PartialEq, Debug)]
#[cfg_attr(feature = "thiserror", derive(thiserror::Error))]
#[repr(u8)]
pub enum Error {
    /// Secure element provisioning or metadata mismatch
    #[cfg_attr(feature = "thiserror", error("secure element configuration error"))]
    Configuration = 0x00,

    /// Secure element did not respond as expected
    #[cfg_attr(feature = "thiserror", error("secure element communication error"))]
    Communication = 0x01,

    /// Operation requires an unlocked keystore
    #[cfg_attr(feature = "thiserror", error("keystore locked"))]
    Locked = 0x02,

    /// Seed already stored
    #[cfg_attr(feature = "thiserror", error("seed already exists"))]
    AlreadyExists = 0x03,

    /// Incorrect password
    #[cfg_attr(
        feature = "thiserror",
        error("incorrect password ({remaining} attempts remaining)")
    )]
    IncorrectPassword { remaining: u8 } = 0x04,

    /// Unlock attempts exhausted, terminal until factory reset
    #[cfg_attr(feature = "thiserror", error("maximum unlock attempts exceeded"))]
    MaxAttemptsExceeded = 0x05,

    /// Commit with a pending session or sign without one
    #[cfg_attr(feature = "thiserror", error("invalid signing session state"))]
    SessionState = 0x06,

    /// Invalid argument (keypath length, seed length)
    #[cfg_attr(feature = "thiserror", error("invalid argument"))]
    InvalidArgument = 0x07,

    /// Persistent store write failed
    #[cfg_attr(feature = "thiserror", error("persistent storage error"))]
    Storage = 0x08,

    /// Key derivation or signature computation failed
    #[cfg_attr(feature = "thiserror", error("signing error"))]
    Signing = 0x09,

    /// Generic keystore failure (missing or mismatched seed)
    #[cfg_attr(feature = "thiserror", error("generic keystore error"))]
    Generic = 0xf0,
}

impl Error {
    /// Fetch the wire code for this error
    pub fn code(&self) -> u8 {
        match self {
            Error::Configuration => 0x00,
            Error::Communication => 0x01,
            Error::Locked => 0x02,
            Error::AlreadyExists => 0x03,
            Error::IncorrectPassword { .. } => 0x04,
            Error::MaxAttemptsExceeded => 0x05,
            Error::SessionState => 0x06,
            Error::InvalidArgument => 0x07,
            Error::Storage => 0x08,
            Error::Signing => 0x09,
            Error::Generic => 0xf0,
        }
    }
}
