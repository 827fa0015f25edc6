// Copyright (c) 2022-2023 The MobileCoin Foundation

use anyhow::Context;
use clap::Parser;
use log::{debug, info, warn, LevelFilter};
use rand::{rngs::OsRng, RngCore};
use strum::Display;

use custody_core::{
    config::Config,
    device::Device,
    secure_element::{atecc::Atecc, optiga::Optiga, SecureElement},
    signer::{anti_exfil_host_commit, anti_exfil_host_verify, HARDENED},
    Error,
};
use custody_sim::*;

/// Simulated chip family
#[derive(Copy, Clone, Debug, PartialEq, clap::ValueEnum, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ChipKind {
    Atecc,
    Optiga,
}

/// Seed custody session simulator
///
/// Provisions a simulated secure element, stores a seed under the
/// provided password and walks an unlock / anti-exfil signing session.
#[derive(Clone, Debug, PartialEq, Parser)]
pub struct Args {
    /// Secure element family
    #[clap(long, value_enum, default_value = "atecc")]
    chip: ChipKind,

    /// Keystore password
    #[clap(long, env = "CUSTODY_PASSWORD", default_value = "password")]
    password: String,

    /// Raw seed length (16, 24 or 32 bytes)
    #[clap(long, default_value = "32")]
    seed_len: usize,

    /// Chip RNG seed
    #[clap(long, default_value = "0")]
    rng_seed: u64,

    /// Log level
    #[clap(long, default_value = "info")]
    log_level: LevelFilter,
}

fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Setup logging
    let _ = simplelog::SimpleLogger::init(args.log_level, simplelog::Config::default());

    info!("Starting {} session", args.chip);

    let store = MemoryStore::new();
    let reset = SimReset::new(store.clone());
    let config = Config::default();

    match args.chip {
        ChipKind::Atecc => {
            let chip = Chip::new(AteccModel::new(args.rng_seed));
            let se = Atecc::new(chip, config);
            run(Device::new_with_config(se, store, reset, config), &args)
        }
        ChipKind::Optiga => {
            let chip = Chip::new(OptigaModel::new(args.rng_seed));
            let se = Optiga::new(chip, config);
            run(Device::new_with_config(se, store, reset, config), &args)
        }
    }
}

fn run<SE: SecureElement>(
    mut d: Device<SE, MemoryStore, SimReset>,
    args: &Args,
) -> anyhow::Result<()> {
    d.boot().context("boot")?;
    info!("Secure element: {}", d.model()?);

    // Store a fresh seed
    let mut seed = vec![0u8; args.seed_len];
    OsRng.fill_bytes(&mut seed);

    d.encrypt_and_store_seed(&seed, &args.password)
        .context("store seed")?;
    d.mark_initialized()?;

    debug!(
        "Monotonic increments remaining: {}",
        d.monotonic_increments_remaining()?
    );

    // One bad guess
    match d.unlock("not the password") {
        Err(Error::IncorrectPassword { remaining }) => {
            warn!("Incorrect password, {} attempts remaining", remaining)
        }
        r => anyhow::bail!("unexpected unlock result: {:?}", r),
    }

    let remaining = d.unlock(&args.password).context("unlock")?;
    info!("Unlocked ({} attempts available)", remaining);

    info!("Mnemonic: {}", d.get_bip39_mnemonic()?.as_str());

    let keypath = [44 | HARDENED, HARDENED, HARDENED, 0, 0];
    info!("xpub: {}", d.encode_xpub_at_keypath(&keypath[..3])?);

    // Anti-exfil signing session
    let mut msg = [0u8; 32];
    let mut host_nonce = [0u8; 32];
    OsRng.fill_bytes(&mut msg);
    OsRng.fill_bytes(&mut host_nonce);

    let client_commitment =
        d.nonce_commit(&keypath, &msg, &anti_exfil_host_commit(&host_nonce))?;
    let sig = d.nonce_sign(&host_nonce)?;

    let pubkey = d.secp256k1_get_public_key(&keypath)?;
    let valid = anti_exfil_host_verify(&sig.sig, &msg, &pubkey, &host_nonce, &client_commitment);

    info!(
        "Signature: {} (recid: {}, host verified: {})",
        hex::encode(sig.sig),
        sig.recid,
        valid
    );
    if !valid {
        anyhow::bail!("anti-exfil verification failed");
    }

    // Device attestation
    let attestation_key = d.attestation_pubkey()?;
    let mut challenge = [0u8; 32];
    OsRng.fill_bytes(&mut challenge);
    let attestation = d.attestation_sign(&challenge)?;

    info!("Attestation key: {}", hex::encode(attestation_key));
    info!("Attestation signature: {}", hex::encode(attestation));

    d.lock();
    info!("Locked");

    Ok(())
}
