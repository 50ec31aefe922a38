//! Wiring: every component built over in-memory stores and one shared audit log.

use std::sync::Arc;

use tracing::info;

use ledgergate_ai::{Classifier, ScriptedClassifier};
use ledgergate_events::{EventBus, InMemoryEventBus};

use crate::audit::InMemoryAuditLog;
use crate::catalog::CatalogStore;
use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::imports::ImportCoordinator;
use crate::ledger::MovementLedger;
use crate::ledger_store::{InMemoryLedgerStore, LedgerEntry, PublishingLedgerStore};
use crate::projector::BalanceProjector;
use crate::reservations::ReservationManager;
use crate::router::ConfidenceRouter;
use crate::store::InMemoryKeyedStore;
use crate::workers::{ExpirySweeper, ReorderAlerts, ReorderWatch, WorkerHandle};

pub struct Engine {
    pub config: EngineConfig,
    pub audit: Arc<InMemoryAuditLog>,
    pub bus: Arc<InMemoryEventBus<LedgerEntry>>,
    pub catalog: Arc<CatalogStore>,
    pub ledger: Arc<MovementLedger>,
    pub projector: Arc<BalanceProjector>,
    pub reservations: Arc<ReservationManager>,
    pub router: Arc<ConfidenceRouter>,
    pub imports: Arc<ImportCoordinator>,
    pub alerts: Arc<ReorderAlerts>,
}

impl Engine {
    /// Build from config, loading the classifier script when one is configured.
    pub fn from_config(config: EngineConfig) -> EngineResult<Self> {
        let classifier: Arc<dyn Classifier> = match &config.classifier_script {
            Some(path) => Arc::new(ScriptedClassifier::from_json_file(path)?),
            None => Arc::new(ScriptedClassifier::default()),
        };
        Self::in_memory(config, classifier)
    }

    pub fn in_memory(config: EngineConfig, classifier: Arc<dyn Classifier>) -> EngineResult<Self> {
        config.validate()?;

        let audit = Arc::new(InMemoryAuditLog::new());
        let bus = Arc::new(InMemoryEventBus::<LedgerEntry>::new());

        let catalog = Arc::new(CatalogStore::new(
            Arc::new(InMemoryKeyedStore::new()),
            Arc::new(InMemoryKeyedStore::new()),
            audit.clone(),
        ));
        let store = PublishingLedgerStore::new(InMemoryLedgerStore::new(), bus.clone());
        let ledger = Arc::new(MovementLedger::new(Arc::new(store), catalog.clone(), audit.clone()));
        let projector = Arc::new(BalanceProjector::new(ledger.clone(), catalog.clone()));
        let reservations = Arc::new(ReservationManager::new(
            ledger.clone(),
            catalog.clone(),
            Arc::new(InMemoryKeyedStore::new()),
            audit.clone(),
        ));
        let router = Arc::new(ConfidenceRouter::new(
            config.policy.clone(),
            ledger.clone(),
            catalog.clone(),
            Arc::new(InMemoryKeyedStore::new()),
            audit.clone(),
            config.hil_ttl(),
        ));
        let imports = Arc::new(ImportCoordinator::new(
            classifier,
            router.clone(),
            Arc::new(InMemoryKeyedStore::new()),
            audit.clone(),
            config.import_threshold,
            config.session_ttl(),
        ));

        info!(
            hil_ttl_days = config.hil_ttl_days,
            import_threshold = config.import_threshold,
            "engine ready"
        );
        Ok(Self {
            config,
            audit,
            bus,
            catalog,
            ledger,
            projector,
            reservations,
            router,
            imports,
            alerts: Arc::new(ReorderAlerts::new()),
        })
    }

    /// Start the expiry sweeper and the reorder watch.
    pub fn start_workers(&self) -> std::io::Result<EngineWorkers> {
        let sweeper = ExpirySweeper::new(self.reservations.clone(), self.router.clone(), self.imports.clone())
            .spawn(self.config.sweep_interval())?;
        let watch = ReorderWatch::new(self.catalog.clone(), self.projector.clone(), self.alerts.clone())
            .spawn(self.bus.subscribe())?;
        Ok(EngineWorkers {
            handles: vec![sweeper, watch],
        })
    }
}

#[derive(Debug)]
pub struct EngineWorkers {
    handles: Vec<WorkerHandle>,
}

impl EngineWorkers {
    pub fn shutdown(self) {
        for h in self.handles {
            let name = h.name();
            h.shutdown();
            info!(worker = name, "worker stopped");
        }
    }
}
