use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use fwl_client::{
    ApiHandle, AuthClient, FilterKind, HistoryClient, Presenter, RecordStoreError, StoreKind,
    ViewRow,
};
use fwl_tui::{Command, CustomCommand, CustomCommandCtx, CustomCommandError, RuntimeHandle};
use tracing::{error, info, warn};
use userdata_store::{CheckpointOutcome, PersistedState, UserDataError, UserDataStore};
use zeroize::Zeroizing;

use crate::app::{App, HostOps};
use crate::bootstrap::SessionBootstrap;
use crate::gate::{CredentialGate, LoginRequest, LoginSurface};
use crate::orchestrator::{CycleKind, UpdateError, UpdateOrchestrator, ViewSnapshot};
use crate::presenter::{default_filters, ListPresenter};
use crate::progress::ProgressSink;
use crate::records::MemoryRecordStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    LoginRequested(LoginRequest),
    LoginRejected,
    LoginHidden,
    Progress(i32),
    CycleStarted(CycleKind),
    CycleFinished { kind: CycleKind, saved: bool },
    CycleFailed { kind: CycleKind, error: String },
    ViewUpdated(ViewSnapshot),
}

/// Worker-to-UI queue. Pushing never blocks on the UI; events are applied to
/// [`App`] on the runtime thread by a drain command.
#[derive(Clone)]
pub struct AppEventQueue {
    app: Arc<Mutex<App>>,
    pending: Arc<Mutex<VecDeque<AppEvent>>>,
    runtime_handle: RuntimeHandle,
}

impl AppEventQueue {
    pub fn new(app: Arc<Mutex<App>>, runtime_handle: RuntimeHandle) -> Self {
        Self {
            app,
            pending: Arc::new(Mutex::new(VecDeque::new())),
            runtime_handle,
        }
    }

    pub fn push(&self, event: AppEvent) {
        let should_drain = {
            let mut queue = lock_unpoisoned(&self.pending);
            let should_drain = queue.is_empty();
            // Only the latest progress value matters.
            let coalesced = match (&event, queue.back_mut()) {
                (AppEvent::Progress(value), Some(AppEvent::Progress(queued))) => {
                    *queued = *value;
                    true
                }
                _ => false,
            };
            if !coalesced {
                queue.push_back(event);
            }
            should_drain
        };

        if should_drain {
            self.runtime_handle
                .dispatch(Command::Custom(Box::new(DrainAppEventsCommand {
                    queue: self.clone(),
                })));
        }
    }

    pub fn progress_sink(&self) -> ProgressSink {
        let queue = self.clone();
        ProgressSink::new(move |value| queue.push(AppEvent::Progress(value)))
    }

    fn drain(&self) -> usize {
        let mut drained = 0usize;

        loop {
            let event = lock_unpoisoned(&self.pending).pop_front();
            match event {
                Some(event) => {
                    self.apply(event);
                    drained += 1;
                }
                None => break,
            }
        }

        drained
    }

    /// Drains queued events and schedules a render.
    ///
    /// Use this from headless callers that never tick the runtime.
    pub fn flush_pending_app_events(&self) -> usize {
        let drained = self.drain();
        if drained > 0 {
            self.runtime_handle.dispatch(Command::RequestRender);
        }

        drained
    }

    fn apply(&self, event: AppEvent) {
        let mut app = lock_unpoisoned(&self.app);
        match event {
            AppEvent::LoginRequested(request) => app.on_login_requested(&request),
            AppEvent::LoginRejected => app.on_login_rejected(),
            AppEvent::LoginHidden => app.on_login_hidden(),
            AppEvent::Progress(value) => app.on_progress(value),
            AppEvent::CycleStarted(kind) => app.on_cycle_started(kind),
            AppEvent::CycleFinished { kind, saved } => app.on_cycle_finished(kind, saved),
            AppEvent::CycleFailed { kind, error } => app.on_cycle_failed(kind, &error),
            AppEvent::ViewUpdated(snapshot) => app.on_view_updated(snapshot),
        }
    }
}

impl LoginSurface for AppEventQueue {
    fn show_login(&self, request: &LoginRequest) {
        self.push(AppEvent::LoginRequested(request.clone()));
    }

    fn login_rejected(&self) {
        self.push(AppEvent::LoginRejected);
    }

    fn hide_login(&self) {
        self.push(AppEvent::LoginHidden);
    }
}

struct DrainAppEventsCommand {
    queue: AppEventQueue,
}

impl CustomCommand for DrainAppEventsCommand {
    fn name(&self) -> &'static str {
        "drain_app_events"
    }

    fn apply(self: Box<Self>, ctx: &mut CustomCommandCtx) -> Result<(), CustomCommandError> {
        if self.queue.drain() > 0 {
            ctx.request_render();
        }
        Ok(())
    }
}

/// Collaborators and prior state the controller is built from.
pub struct Services {
    pub auth: Arc<dyn AuthClient>,
    pub history: Arc<dyn HistoryClient>,
    pub store: UserDataStore,
    pub prior: Option<PersistedState>,
}

struct ActiveCycle {
    id: u64,
    join_handle: Option<JoinHandle<()>>,
}

pub struct RuntimeController {
    queue: AppEventQueue,
    runtime_handle: RuntimeHandle,
    gate: Arc<CredentialGate>,
    bootstrap: Arc<SessionBootstrap>,
    orchestrator: Arc<UpdateOrchestrator>,
    next_cycle_id: AtomicU64,
    active_cycle: Mutex<Option<ActiveCycle>>,
}

impl RuntimeController {
    /// Wires the gate, session bootstrap, record store, presenter and
    /// orchestrator from `services`.
    ///
    /// Fails only when the persisted record blob cannot be read back.
    pub fn new(
        app: Arc<Mutex<App>>,
        runtime_handle: RuntimeHandle,
        services: Services,
    ) -> Result<Arc<Self>, RecordStoreError> {
        let Services {
            auth,
            history,
            store,
            prior,
        } = services;

        if store.has_backup() {
            warn!(
                backup = %store.backup_path().display(),
                "backup from an interrupted checkpoint found; it is kept until the next successful save"
            );
        }
        if let Some(prior) = prior.as_ref().filter(|prior| !prior.is_current_version()) {
            warn!(version = %prior.version, "data file written by another version, reading it anyway");
        }

        let queue = AppEventQueue::new(app, runtime_handle.clone());
        let surface: Arc<dyn LoginSurface> = Arc::new(queue.clone());
        let gate = CredentialGate::new(auth, surface);
        let remembered = prior
            .as_ref()
            .map(|prior| prior.username.clone())
            .unwrap_or_default();
        let bootstrap = SessionBootstrap::new(Arc::clone(&gate), remembered);

        let api = ApiHandle::new(history, bootstrap.clone());
        let (filter_blob, record_blob) = prior
            .as_ref()
            .map(|prior| (prior.filter_config.as_str(), prior.records.as_str()))
            .unwrap_or_default();
        let records = MemoryRecordStore::restore_from_string(
            StoreKind::Movie,
            record_blob,
            api,
            queue.progress_sink().callback(),
        )?;
        let mut presenter = ListPresenter::restore_from_string(filter_blob);
        for (kind, layout) in default_filters() {
            presenter.add_filter(kind, layout);
        }

        let presenter: Box<dyn Presenter> = Box::new(presenter);
        let orchestrator = UpdateOrchestrator::new(
            Box::new(records),
            presenter,
            store,
            Arc::clone(&bootstrap),
            prior.is_some(),
        );

        Ok(Arc::new(Self {
            queue,
            runtime_handle,
            gate,
            bootstrap,
            orchestrator: Arc::new(orchestrator),
            next_cycle_id: AtomicU64::new(1),
            active_cycle: Mutex::new(None),
        }))
    }

    pub fn queue(&self) -> &AppEventQueue {
        &self.queue
    }

    pub fn gate(&self) -> &Arc<CredentialGate> {
        &self.gate
    }

    pub fn bootstrap(&self) -> &Arc<SessionBootstrap> {
        &self.bootstrap
    }

    pub fn orchestrator(&self) -> &Arc<UpdateOrchestrator> {
        &self.orchestrator
    }

    /// Publishes the restored view and starts the first sync when there was
    /// no prior state.
    pub fn startup(self: &Arc<Self>) -> Result<(), String> {
        self.queue
            .push(AppEvent::ViewUpdated(self.orchestrator.view_snapshot()));
        if self.orchestrator.needs_first_sync() {
            self.start_cycle(None)?;
        }
        Ok(())
    }

    /// See [`AppEventQueue::flush_pending_app_events`].
    pub fn flush_pending_app_events(&self) -> usize {
        self.queue.flush_pending_app_events()
    }

    pub fn is_cycle_active(&self) -> bool {
        self.lock_active_cycle()
            .as_ref()
            .and_then(|active| active.join_handle.as_ref())
            .is_some_and(|join_handle| !join_handle.is_finished())
    }

    /// Cancels any pending login, waits for the running cycle, then writes the
    /// final checkpoint.
    pub fn shutdown(&self) -> Result<CheckpointOutcome, UserDataError> {
        self.gate.close();
        let active = self.lock_active_cycle().take();
        if let Some(mut active) = active {
            if let Some(join_handle) = active.join_handle.take() {
                if join_handle.join().is_err() {
                    error!(cycle = active.id, "update worker panicked");
                }
            }
        }
        self.orchestrator.shutdown()
    }

    /// `None` runs the first-start hard reload.
    fn start_cycle(self: &Arc<Self>, kind: Option<CycleKind>) -> Result<(), String> {
        let mut active = self.lock_active_cycle();
        if let Some(current) = active.as_mut() {
            let finished = current
                .join_handle
                .as_ref()
                .map_or(true, JoinHandle::is_finished);
            if !finished {
                return Err("an update is already running".to_string());
            }
            if let Some(join_handle) = current.join_handle.take() {
                let _ = join_handle.join();
            }
        }

        let id = self.next_cycle_id.fetch_add(1, Ordering::SeqCst);
        let controller = Arc::clone(self);
        let join_handle = thread::Builder::new()
            .name(format!("fw-local-update-{id}"))
            .spawn(move || controller.run_worker(kind))
            .map_err(|error| format!("failed to spawn update worker: {error}"))?;

        *active = Some(ActiveCycle {
            id,
            join_handle: Some(join_handle),
        });
        Ok(())
    }

    fn run_worker(self: Arc<Self>, requested: Option<CycleKind>) {
        let kind = requested.unwrap_or(CycleKind::Hard);
        self.queue.push(AppEvent::CycleStarted(kind));

        let orchestrator = Arc::clone(&self.orchestrator);
        let outcome = catch_unwind(AssertUnwindSafe(|| match requested {
            Some(kind) => Some(orchestrator.run(kind)),
            None => orchestrator.run_first_sync_if_needed(),
        }));

        let event = match outcome {
            Ok(Some(Ok(outcome))) => AppEvent::CycleFinished {
                kind,
                saved: matches!(outcome, CheckpointOutcome::Written { .. }),
            },
            Ok(Some(Err(error))) => {
                if let UpdateError::Persistence(source) = &error {
                    error!(error = %source, "checkpoint failed");
                }
                AppEvent::CycleFailed {
                    kind,
                    error: error.to_string(),
                }
            }
            Ok(None) => AppEvent::CycleFinished { kind, saved: false },
            Err(_) => {
                error!(%kind, "update worker panicked");
                AppEvent::CycleFailed {
                    kind,
                    error: "update worker panicked".to_string(),
                }
            }
        };

        self.queue.push(event);
        self.queue
            .push(AppEvent::ViewUpdated(self.orchestrator.view_snapshot()));
        info!(%kind, "update worker finished");
    }

    fn lock_active_cycle(&self) -> MutexGuard<'_, Option<ActiveCycle>> {
        lock_unpoisoned(&self.active_cycle)
    }
}

impl HostOps for Arc<RuntimeController> {
    fn start_update(&mut self, kind: CycleKind) -> Result<(), String> {
        self.start_cycle(Some(kind))
    }

    fn submit_login(&mut self, username: &str, secret: Zeroizing<String>) -> Result<(), String> {
        self.gate
            .submit(username, secret)
            .map_err(|error| error.to_string())
    }

    fn cancel_login(&mut self) -> Result<(), String> {
        self.gate.cancel().map_err(|error| error.to_string())
    }

    fn apply_filter(&mut self, kind: FilterKind, value: Option<String>) -> Vec<ViewRow> {
        let rows = self.orchestrator.apply_filter(kind, value);
        info!(filter = kind.label(), rows = rows.len(), "filter applied");
        rows
    }

    fn request_render(&mut self) {
        self.runtime_handle.dispatch(Command::RequestRender);
    }

    fn request_stop(&mut self) {
        self.runtime_handle.dispatch(Command::RequestStop);
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
