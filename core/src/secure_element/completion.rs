// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Single-use completion handoff between a chip driver and the calling thread
//!
//! Chip drivers complete commands from an interrupt / DMA-completion context.
//! A [`Completion`] is handed to the driver with each command and consumed
//! when fired, the caller blocks on the matching [`Pending`] until then.

use std::sync::mpsc::{sync_channel, Receiver, SyncSender};

use super::Status;

/// Create a linked completion / pending pair for a single command
pub fn pair<R>() -> (Completion<R>, Pending<R>) {
    let (tx, rx) = sync_channel(1);
    (Completion { tx }, Pending { rx })
}

/// Completion handle, fired exactly once by the chip driver
#[derive(Debug)]
pub struct Completion<R> {
    tx: SyncSender<Result<R, Status>>,
}

impl<R> Completion<R> {
    /// Complete the command with a terminal result
    pub fn complete(self, result: Result<R, Status>) {
        // The slot has capacity for exactly one value and `self` is consumed,
        // a failed send means the caller has already gone away.
        let _ = self.tx.try_send(result);
    }

    /// Complete the command successfully
    pub fn succeed(self, value: R) {
        self.complete(Ok(value))
    }

    /// Complete the command with a chip failure status
    pub fn fail(self, status: Status) {
        self.complete(Err(status))
    }
}

/// Caller side of a dispatched command
#[derive(Debug)]
pub struct Pending<R> {
    rx: Receiver<Result<R, Status>>,
}

impl<R> Pending<R> {
    /// Block until the driver completes the command.
    ///
    /// There is no timeout, a chip that never responds is left to the
    /// platform watchdog. A driver dropping the completion without firing it
    /// is reported as [`Status::DROPPED`].
    pub fn wait(self) -> Result<R, Status> {
        match self.rx.recv() {
            Ok(r) => r,
            Err(_) => Err(Status::DROPPED),
        }
    }
}
