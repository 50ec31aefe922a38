use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::imports::ImportCoordinator;
use crate::reservations::ReservationManager;
use crate::router::ConfidenceRouter;

use super::WorkerHandle;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub reservations: usize,
    pub tasks: usize,
    pub sessions: usize,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.reservations + self.tasks + self.sessions
    }
}

/// Expires reservations and HIL tasks past their TTL and purges stale import sessions.
///
/// Every sweep is idempotent; running it twice, or alongside a request that touches the
/// same record, changes each record at most once.
pub struct ExpirySweeper {
    reservations: Arc<ReservationManager>,
    router: Arc<ConfidenceRouter>,
    imports: Arc<ImportCoordinator>,
}

impl ExpirySweeper {
    pub fn new(
        reservations: Arc<ReservationManager>,
        router: Arc<ConfidenceRouter>,
        imports: Arc<ImportCoordinator>,
    ) -> Self {
        Self {
            reservations,
            router,
            imports,
        }
    }

    /// One pass over everything with a TTL. A failing part is logged and the rest still run.
    pub fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();
        match self.reservations.sweep_expired(now) {
            Ok(n) => report.reservations = n,
            Err(err) => warn!(error = %err, "reservation sweep failed"),
        }
        match self.router.expire_stale(now) {
            Ok(n) => report.tasks = n,
            Err(err) => warn!(error = %err, "hil task sweep failed"),
        }
        match self.imports.purge_expired(now) {
            Ok(n) => report.sessions = n,
            Err(err) => warn!(error = %err, "import session sweep failed"),
        }
        if report.total() > 0 {
            info!(
                reservations = report.reservations,
                tasks = report.tasks,
                sessions = report.sessions,
                "expiry sweep"
            );
        }
        report
    }

    pub fn spawn(self, interval: Duration) -> std::io::Result<WorkerHandle> {
        WorkerHandle::spawn("expiry-sweeper", move |shutdown_rx| self.run(interval, shutdown_rx))
    }

    fn run(&self, interval: Duration, shutdown_rx: mpsc::Receiver<()>) {
        loop {
            match shutdown_rx.recv_timeout(interval) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {
                    self.sweep(Utc::now());
                }
            }
        }
        debug!("expiry sweeper stopped");
    }
}
