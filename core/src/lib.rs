// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Hardware wallet seed custody core
//!
//! This provides the secret-key custody functions of a hardware signing device:
//! password stretching bound to a [secure element][secure_element], encrypted seed
//! storage with attempt-limited unlock ([vault]), hierarchical-deterministic
//! key derivation and secp256k1 signing ([signer]) and the two-phase
//! anti-exfil signing session ([nonce]).
//!
//! Host transports interact with the core via a [`Device`][device::Device] context,
//! which owns the [`SeedVault`][vault::SeedVault] and the pending signing session.
//!
//! ## Operations
//!
//! ### Provisioning
//!
//! At boot the device calls [`Device::boot`][device::Device::boot], which configures
//! the secure element (a no-op once the chip lifecycle state is operational) and
//! creates the salt root used for host-side domain separated hashing.
//!
//! A seed is stored once via [`encrypt_and_store_seed`][device::Device::encrypt_and_store_seed]
//! or [`create_and_store_seed`][device::Device::create_and_store_seed].
//!
//! ### Unlocking
//!
//! [`unlock`][device::Device::unlock] stretches the password through the secure element
//! and decrypts the seed record. Every failed attempt is persisted before the
//! result is returned, exhausting [`Config::max_unlock_attempts`][config::Config]
//! triggers a factory reset.
//!
//! ### Signing with anti-exfil
//!
//! 1. Host issues [`nonce_commit`][device::Device::nonce_commit] with the keypath,
//!    message hash and a commitment to its nonce, receiving the device's nonce commitment
//! 2. Host issues [`nonce_sign`][device::Device::nonce_sign] revealing its nonce,
//!    receiving a signature that can be checked with [`signer::anti_exfil_host_verify`]
//!
//! A pending session must be dropped with [`nonce_clear`][device::Device::nonce_clear]
//! when the host aborts between the two steps.

pub mod config;

pub mod error;
pub use error::Error;

pub mod store;

pub mod secure_element;

pub mod salt;

pub mod cipher;

pub mod stretch;

pub mod vault;

pub mod signer;

pub mod nonce;

pub mod device;

pub mod helpers;
