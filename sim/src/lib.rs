// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Software models of the supported secure elements, for use in tests and
//! the `custody-sim` CLI.
//!
//! Each [`Chip`] runs its model on a worker thread and completes commands
//! asynchronously through the [`Completion`][custody_core::secure_element::Completion]
//! handle, as a chip driver interrupt would. Model state is shared so a
//! chip can be "power cycled" by building a new [`Chip`] over the same state.

mod chip;
pub use chip::{Chip, ChipModel};

pub mod atecc;
pub use atecc::AteccModel;

pub mod optiga;
pub use optiga::OptigaModel;

mod store;
pub use store::{MemoryStore, SimReset};
