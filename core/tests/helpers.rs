#![allow(unused)]

use std::sync::{Arc, Mutex};

use custody_core::{
    config::Config,
    device::Device,
    secure_element::{atecc::Atecc, optiga::Optiga},
};
use custody_sim::{AteccModel, Chip, MemoryStore, OptigaModel, SimReset};
use custody_tests::Session;

pub type AteccSession = Session<Atecc<Chip<AteccModel>>>;

pub type OptigaSession = Session<Optiga<Chip<OptigaModel>>>;

/// Chip RNG seed
pub const CHIP_SEED: u64 = 0x1234_5678;

pub fn init_logging() {
    let _ = simplelog::SimpleLogger::init(log::LevelFilter::Debug, Default::default());
}

/// Power on an ATECC backed device over existing chip and store state
pub fn atecc_session(model: Arc<Mutex<AteccModel>>, store: MemoryStore) -> AteccSession {
    let reset = SimReset::new(store.clone());
    let se = Atecc::new(Chip::from_shared(model), Config::new());

    Session {
        device: Device::new(se, store.clone(), reset.clone()),
        store,
        reset,
    }
}

/// Power on an Optiga backed device over existing chip and store state
pub fn optiga_session(model: Arc<Mutex<OptigaModel>>, store: MemoryStore) -> OptigaSession {
    let reset = SimReset::new(store.clone());
    let se = Optiga::new(Chip::from_shared(model), Config::new());

    Session {
        device: Device::new(se, store.clone(), reset.clone()),
        store,
        reset,
    }
}

/// Factory-fresh ATECC backed device
pub fn atecc() -> AteccSession {
    atecc_session(
        Arc::new(Mutex::new(AteccModel::new(CHIP_SEED))),
        MemoryStore::new(),
    )
}

/// Factory-fresh Optiga backed device
pub fn optiga() -> OptigaSession {
    optiga_session(
        Arc::new(Mutex::new(OptigaModel::new(CHIP_SEED))),
        MemoryStore::new(),
    )
}
