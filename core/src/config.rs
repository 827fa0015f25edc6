// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Custody policy configuration

/// Default number of unlock attempts prior to factory reset
pub const MAX_UNLOCK_ATTEMPTS: u8 = 10;

/// Number of times the roll key slot can be used.
///
/// The chip maximum is not documented, this sits a little below the
/// indicated endurance of 600000 updates.
pub const MONOTONIC_COUNTER_MAX_USE: u32 = 590_000;

/// Custody policy, defaults match the reference device policy
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct Config {
    /// Failed unlock attempts permitted before the device is wiped
    pub max_unlock_attempts: u8,

    /// Threshold written to the chip monotonic counter at provisioning
    pub monotonic_counter_max_use: u32,
}

impl Config {
    /// Create a configuration using the reference policy
    pub const fn new() -> Self {
        Self {
            max_unlock_attempts: MAX_UNLOCK_ATTEMPTS,
            monotonic_counter_max_use: MONOTONIC_COUNTER_MAX_USE,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
