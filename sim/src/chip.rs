// Copyright (c) 2022-2023 The MobileCoin Foundation

use std::{
    fmt::Debug,
    sync::{
        mpsc::{channel, Sender},
        Arc, Mutex, MutexGuard,
    },
    thread::{self, JoinHandle},
};

use log::{debug, trace, warn};

use custody_core::secure_element::{Completion, Protection, Status, Transport};

/// [`ChipModel`] trait implemented by simulated chip families
pub trait ChipModel: Send + 'static {
    type Command: Debug + Send + 'static;
    type Response: Send + 'static;

    /// Execute a command at the provided channel protection level
    fn execute(
        &mut self,
        protection: Protection,
        cmd: Self::Command,
    ) -> Result<Self::Response, Status>;

    /// Reset volatile (session) state
    fn power_on(&mut self);
}

struct Job<M: ChipModel> {
    protection: Protection,
    cmd: M::Command,
    done: Completion<M::Response>,
}

/// Simulated chip, executing commands on a worker thread
pub struct Chip<M: ChipModel> {
    model: Arc<Mutex<M>>,
    fault: Arc<Mutex<Option<(usize, Status)>>>,
    tx: Option<Sender<Job<M>>>,
    worker: Option<JoinHandle<()>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(g) => g,
        Err(e) => e.into_inner(),
    }
}

impl<M: ChipModel> Chip<M> {
    /// Power on a new chip
    pub fn new(model: M) -> Self {
        Self::from_shared(Arc::new(Mutex::new(model)))
    }

    /// Power on a chip over existing model state
    pub fn from_shared(model: Arc<Mutex<M>>) -> Self {
        lock(&model).power_on();

        let fault = Arc::new(Mutex::new(None));
        let (tx, rx) = channel::<Job<M>>();

        let (m, f) = (model.clone(), fault.clone());
        let worker = thread::spawn(move || {
            debug!("chip worker start");

            for job in rx {
                trace!("exec: {:?}", job.cmd);

                let fault = {
                    let mut f = lock(&f);
                    match f.as_mut() {
                        Some((0, s)) => {
                            let s = *s;
                            *f = None;
                            Some(s)
                        }
                        Some((n, _)) => {
                            *n -= 1;
                            None
                        }
                        None => None,
                    }
                };

                let r = match fault {
                    Some(s) => Err(s),
                    None => lock(&m).execute(job.protection, job.cmd),
                };

                if let Err(s) = &r {
                    warn!("chip returned {:?}", s);
                }

                job.done.complete(r);
            }

            debug!("chip worker exit");
        });

        Self {
            model,
            fault,
            tx: Some(tx),
            worker: Some(worker),
        }
    }

    /// Access the model state
    pub fn model(&self) -> MutexGuard<'_, M> {
        lock(&self.model)
    }

    /// Fetch a handle to the shared model state
    pub fn shared(&self) -> Arc<Mutex<M>> {
        self.model.clone()
    }

    /// Fail the next command with the provided status
    pub fn fail_next(&self, status: Status) {
        self.fail_at(0, status);
    }

    /// Execute `n` commands then fail the following one with the provided
    /// status, leaving the model as an interrupted command sequence would
    pub fn fail_at(&self, n: usize, status: Status) {
        *lock(&self.fault) = Some((n, status));
    }
}

impl<M: ChipModel> Transport for Chip<M> {
    type Command = M::Command;
    type Response = M::Response;

    fn dispatch(
        &mut self,
        protection: Protection,
        cmd: Self::Command,
        done: Completion<Self::Response>,
    ) -> Result<(), Status> {
        let tx = self.tx.as_ref().ok_or(Status::DROPPED)?;

        tx.send(Job {
            protection,
            cmd,
            done,
        })
        .map_err(|_| Status::DROPPED)
    }
}

impl<M: ChipModel> Drop for Chip<M> {
    fn drop(&mut self) {
        // Closing the queue stops the worker
        self.tx = None;

        if let Some(w) = self.worker.take() {
            let _ = w.join();
        }
    }
}
