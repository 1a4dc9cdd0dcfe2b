//! Background workers.

use std::sync::mpsc;
use std::thread;

pub mod delivery;

pub use delivery::{deliver_campaign, DeliveryRun, DeliveryWorkerConfig, DeliveryWorkerPool};

/// Handle to stop and join a background worker.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    pub(crate) fn new(shutdown: mpsc::Sender<()>, join: thread::JoinHandle<()>) -> Self {
        Self {
            shutdown,
            join: Some(join),
        }
    }

    /// Request shutdown and wait for the worker to stop.
    ///
    /// A campaign already being delivered is finished first.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}
