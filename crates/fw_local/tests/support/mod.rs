#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, Weak};
use std::thread;
use std::time::{Duration, Instant};

use fw_local::app::App;
use fw_local::gate::{CredentialGate, LoginRequest, LoginSurface};
use fw_local::runtime::{RuntimeController, Services};
use fw_local::tui::AppComponent;
use fwl_client::Record;
use fwl_client_mock::{record, MockHistoryService};
use fwl_tui::{Terminal, TUI};
use userdata_store::UserDataStore;
use zeroize::Zeroizing;

type InputHandler = Box<dyn FnMut(String) + Send>;
type ResizeHandler = Box<dyn FnMut() + Send>;

#[derive(Default)]
pub struct TerminalTrace {
    pub writes: Vec<String>,
    pub start_calls: usize,
    pub stop_calls: usize,
    pub drain_calls: Vec<(u64, u64)>,
    pub on_input: Option<InputHandler>,
    pub on_resize: Option<ResizeHandler>,
}

pub struct SharedTerminal {
    state: Arc<Mutex<TerminalTrace>>,
    columns: u16,
    rows: u16,
}

impl SharedTerminal {
    pub fn new(columns: u16, rows: u16) -> (Self, Arc<Mutex<TerminalTrace>>) {
        let state = Arc::new(Mutex::new(TerminalTrace::default()));
        (
            Self {
                state: Arc::clone(&state),
                columns,
                rows,
            },
            state,
        )
    }
}

impl Terminal for SharedTerminal {
    fn start(
        &mut self,
        on_input: Box<dyn FnMut(String) + Send>,
        on_resize: Box<dyn FnMut() + Send>,
    ) -> std::io::Result<()> {
        let mut state = lock_unpoisoned(&self.state);
        state.start_calls += 1;
        state.on_input = Some(on_input);
        state.on_resize = Some(on_resize);
        Ok(())
    }

    fn stop(&mut self) -> std::io::Result<()> {
        lock_unpoisoned(&self.state).stop_calls += 1;
        Ok(())
    }

    fn drain_input(&mut self, max_ms: u64, idle_ms: u64) {
        lock_unpoisoned(&self.state)
            .drain_calls
            .push((max_ms, idle_ms));
    }

    fn write(&mut self, data: &str) {
        lock_unpoisoned(&self.state).writes.push(data.to_string());
    }

    fn columns(&self) -> u16 {
        self.columns
    }

    fn rows(&self) -> u16 {
        self.rows
    }
}

pub fn inject_input(state: &Arc<Mutex<TerminalTrace>>, data: &str) {
    let mut state = lock_unpoisoned(state);
    let Some(on_input) = state.on_input.as_mut() else {
        panic!("terminal input handler is not registered");
    };

    on_input(data.to_string());
}

pub fn rendered_output(state: &Arc<Mutex<TerminalTrace>>) -> String {
    lock_unpoisoned(state).writes.join("")
}

pub fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Newest first, ids `count..=1`.
pub fn catalog(count: u64) -> Vec<Record> {
    (1..=count)
        .rev()
        .map(|id| record(id, &format!("Movie {id}"), 1990 + id as u16, (id % 10) as u8))
        .collect()
}

pub fn service(records: Vec<Record>) -> Arc<MockHistoryService> {
    Arc::new(
        MockHistoryService::new(3)
            .with_account("demo", "pw")
            .with_records(records),
    )
}

pub struct Harness {
    pub tui: TUI<SharedTerminal>,
    pub app: Arc<Mutex<App>>,
    pub host: Arc<RuntimeController>,
    pub trace: Arc<Mutex<TerminalTrace>>,
}

impl Harness {
    pub fn new(service: Arc<MockHistoryService>, data_file: &Path) -> Self {
        let store = UserDataStore::new(data_file);
        let prior = store.load_state().expect("data file should load");
        let app = Arc::new(Mutex::new(App::new()));
        let (terminal, trace) = SharedTerminal::new(100, 30);
        let mut tui = TUI::new(terminal);

        let host = RuntimeController::new(
            Arc::clone(&app),
            tui.runtime_handle(),
            Services {
                auth: service.clone(),
                history: service,
                store,
                prior,
            },
        )
        .expect("controller should build");
        let root = tui.register_component(AppComponent::new(Arc::clone(&app), Arc::clone(&host)));
        tui.set_root(vec![root]);
        tui.set_focus(root);

        Self {
            tui,
            app,
            host,
            trace,
        }
    }

    pub fn start(&mut self) {
        self.tui.start().expect("runtime start");
        self.host.startup().expect("startup");
        self.tui.run_once();
    }

    pub fn type_keys(&mut self, data: &str) {
        inject_input(&self.trace, data);
        self.tui.run_once();
    }

    pub fn run_until(&mut self, timeout: Duration, mut predicate: impl FnMut(&App) -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if predicate(&lock_unpoisoned(&self.app)) {
                return true;
            }

            self.tui.run_once();
            thread::sleep(Duration::from_millis(5));
        }

        predicate(&lock_unpoisoned(&self.app))
    }

    pub fn output(&self) -> String {
        rendered_output(&self.trace)
    }
}

/// Surface that answers every login request with fixed credentials.
#[derive(Default)]
pub struct AutoLogin {
    gate: OnceLock<Weak<CredentialGate>>,
    secrets: Mutex<Vec<String>>,
    pub requests: Mutex<Vec<LoginRequest>>,
    pub rejections: Mutex<usize>,
    pub hides: Mutex<usize>,
}

impl AutoLogin {
    /// Secrets are tried in order; after the last, requests are cancelled.
    pub fn with_secrets(secrets: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            secrets: Mutex::new(secrets.iter().rev().map(|s| s.to_string()).collect()),
            ..Self::default()
        })
    }

    pub fn attach(&self, gate: &Arc<CredentialGate>) {
        let _ = self.gate.set(Arc::downgrade(gate));
    }

    fn answer(&self) {
        let Some(gate) = self.gate.get().and_then(Weak::upgrade) else {
            return;
        };
        let next = lock_unpoisoned(&self.secrets).pop();
        match next {
            Some(secret) => gate
                .submit("demo", Zeroizing::new(secret))
                .expect("submit should be accepted"),
            None => gate.cancel().expect("cancel should be accepted"),
        }
    }
}

impl LoginSurface for AutoLogin {
    fn show_login(&self, request: &LoginRequest) {
        lock_unpoisoned(&self.requests).push(request.clone());
        self.answer();
    }

    fn login_rejected(&self) {
        *lock_unpoisoned(&self.rejections) += 1;
        self.answer();
    }

    fn hide_login(&self) {
        *lock_unpoisoned(&self.hides) += 1;
    }
}
