//! Update cycles: refresh the record store, re-derive the view, checkpoint.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use fwl_client::{FilterKind, Presenter, Record, RecordStore, RecordStoreError, ViewRow};
use thiserror::Error;
use tracing::{info, warn};
use userdata_store::{CheckpointOutcome, PersistedState, UserDataError, UserDataStore};

use crate::bootstrap::SessionBootstrap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleKind {
    Soft,
    Hard,
}

impl CycleKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Soft => "update",
            Self::Hard => "reload",
        }
    }
}

impl fmt::Display for CycleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Idle,
    Running(CycleKind),
    Saving(CycleKind),
}

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("an update cycle is already running")]
    CycleActive,

    #[error(transparent)]
    Records(#[from] RecordStoreError),

    #[error(transparent)]
    Persistence(#[from] UserDataError),
}

/// What the list view needs after a cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewSnapshot {
    pub rows: Vec<ViewRow>,
    pub records: Vec<Record>,
    pub filters: Vec<(FilterKind, Option<String>)>,
    pub username: Option<String>,
}

pub struct UpdateOrchestrator {
    records: Mutex<Box<dyn RecordStore>>,
    presenter: Mutex<Box<dyn Presenter>>,
    store: UserDataStore,
    bootstrap: Arc<SessionBootstrap>,
    phase: Mutex<CyclePhase>,
    first_sync_pending: AtomicBool,
}

impl UpdateOrchestrator {
    /// `has_prior_state` is false when no data file was found; the first call
    /// to [`UpdateOrchestrator::run_first_sync_if_needed`] then runs a hard
    /// reload.
    pub fn new(
        records: Box<dyn RecordStore>,
        mut presenter: Box<dyn Presenter>,
        store: UserDataStore,
        bootstrap: Arc<SessionBootstrap>,
        has_prior_state: bool,
    ) -> Self {
        presenter.total_update(records.as_ref());
        Self {
            records: Mutex::new(records),
            presenter: Mutex::new(presenter),
            store,
            bootstrap,
            phase: Mutex::new(CyclePhase::Idle),
            first_sync_pending: AtomicBool::new(!has_prior_state),
        }
    }

    pub fn phase(&self) -> CyclePhase {
        *lock_unpoisoned(&self.phase)
    }

    pub fn needs_first_sync(&self) -> bool {
        self.first_sync_pending.load(Ordering::SeqCst)
    }

    pub fn data_store(&self) -> &UserDataStore {
        &self.store
    }

    pub fn run_soft(&self) -> Result<CheckpointOutcome, UpdateError> {
        self.run(CycleKind::Soft)
    }

    pub fn run_hard(&self) -> Result<CheckpointOutcome, UpdateError> {
        self.run(CycleKind::Hard)
    }

    /// Runs the hard reload owed to a first start, once.
    pub fn run_first_sync_if_needed(&self) -> Option<Result<CheckpointOutcome, UpdateError>> {
        if !self.first_sync_pending.swap(false, Ordering::SeqCst) {
            return None;
        }
        info!("no prior state, running first sync");
        Some(self.run_hard())
    }

    pub fn run(&self, kind: CycleKind) -> Result<CheckpointOutcome, UpdateError> {
        {
            let mut phase = lock_unpoisoned(&self.phase);
            if *phase != CyclePhase::Idle {
                warn!(%kind, current = ?*phase, "update cycle rejected");
                return Err(UpdateError::CycleActive);
            }
            *phase = CyclePhase::Running(kind);
        }
        info!(%kind, "update cycle started");

        let result = self.run_cycle(kind);
        *lock_unpoisoned(&self.phase) = CyclePhase::Idle;

        match &result {
            Ok(outcome) => info!(%kind, ?outcome, "update cycle finished"),
            Err(error) => warn!(%kind, error = %error, "update cycle failed"),
        }
        result
    }

    fn run_cycle(&self, kind: CycleKind) -> Result<CheckpointOutcome, UpdateError> {
        {
            let mut records = lock_unpoisoned(&self.records);
            match kind {
                CycleKind::Soft => records.soft_update()?,
                CycleKind::Hard => records.hard_update()?,
            }
            lock_unpoisoned(&self.presenter).total_update(records.as_ref());
        }

        *lock_unpoisoned(&self.phase) = CyclePhase::Saving(kind);
        Ok(self.checkpoint()?)
    }

    /// Writes the current username, filter configuration and records.
    pub fn checkpoint(&self) -> Result<CheckpointOutcome, UserDataError> {
        let username = self.bootstrap.remembered_username().unwrap_or_default();
        let filter_config = lock_unpoisoned(&self.presenter).store_to_string();
        let records = lock_unpoisoned(&self.records).store_to_string();
        self.store
            .checkpoint(&PersistedState::new(username, filter_config, records))
    }

    /// Final checkpoint, regardless of what happened before.
    pub fn shutdown(&self) -> Result<CheckpointOutcome, UserDataError> {
        info!("final checkpoint");
        self.checkpoint()
    }

    pub fn view_snapshot(&self) -> ViewSnapshot {
        let records = lock_unpoisoned(&self.records).records().to_vec();
        let presenter = lock_unpoisoned(&self.presenter);
        ViewSnapshot {
            rows: presenter.view_rows(),
            records,
            filters: FilterKind::ALL
                .iter()
                .map(|&kind| (kind, presenter.filter_value(kind).map(str::to_string)))
                .collect(),
            username: self.bootstrap.remembered_username(),
        }
    }

    pub fn record(&self, id: u64) -> Option<Record> {
        lock_unpoisoned(&self.records).get_by_id(id).cloned()
    }

    /// Changes one filter value and returns the re-derived rows.
    pub fn apply_filter(&self, kind: FilterKind, value: Option<String>) -> Vec<ViewRow> {
        let mut presenter = lock_unpoisoned(&self.presenter);
        presenter.set_filter(kind, value);
        presenter.view_rows()
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
