use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

use fw_local::app::App;
use fw_local::config::AppConfig;
use fw_local::logging;
use fw_local::providers;
use fw_local::runtime::{RuntimeController, Services};
use fw_local::tui::AppComponent;
use fwl_tui::{install_panic_hook, ProcessTerminal, TUI};
use tracing::{error, info};
use userdata_store::UserDataStore;

fn main() -> io::Result<()> {
    let cwd = std::env::current_dir()?;
    let config = AppConfig::from_env(&cwd);
    logging::init(config.log_file.as_deref(), config.debug)?;
    install_panic_hook();

    let client = providers::client_from_config(&config).map_err(io::Error::other)?;
    let store = UserDataStore::new(config.data_file.clone());
    let prior = store.load_state().map_err(io::Error::other)?;
    info!(
        path = %store.path().display(),
        prior_state = prior.is_some(),
        "starting"
    );

    let app = Arc::new(Mutex::new(App::new()));
    let terminal = ProcessTerminal::new();
    let mut tui = TUI::new(terminal);
    let runtime_handle = tui.runtime_handle();

    let host = RuntimeController::new(
        Arc::clone(&app),
        runtime_handle,
        Services {
            auth: client.auth,
            history: client.history,
            store,
            prior,
        },
    )
    .map_err(io::Error::other)?;
    let root_component = tui.register_component(AppComponent::new(Arc::clone(&app), Arc::clone(&host)));
    tui.set_root(vec![root_component]);
    tui.set_focus(root_component);

    tui.start()?;
    if let Err(error) = host.startup() {
        lock_unpoisoned(&app).set_error(error);
    }

    while !lock_unpoisoned(&app).should_exit && !tui.is_stop_requested() {
        tui.run_blocking_once();
    }

    let stopped = tui.stop();
    match host.shutdown() {
        Ok(outcome) => info!(?outcome, "final checkpoint written"),
        Err(err) => {
            error!(error = %err, "final checkpoint failed");
            return Err(io::Error::other(err));
        }
    }
    stopped
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
