//! Background workers: plain threads with a shutdown channel.

pub mod expiry_sweeper;
pub mod reorder_watch;

use std::sync::mpsc;
use std::thread;

pub use expiry_sweeper::{ExpirySweeper, SweepReport};
pub use reorder_watch::{ReorderAlert, ReorderAlerts, ReorderWatch};

/// Handle to stop and join a background worker.
#[derive(Debug)]
pub struct WorkerHandle {
    name: &'static str,
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    fn spawn<F>(name: &'static str, body: F) -> std::io::Result<Self>
    where
        F: FnOnce(mpsc::Receiver<()>) + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || body(shutdown_rx))?;
        Ok(Self {
            name,
            shutdown: shutdown_tx,
            join: Some(join),
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Request shutdown and wait for the worker to stop.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            if j.join().is_err() {
                tracing::error!(worker = self.name, "worker thread panicked");
            }
        }
    }
}
