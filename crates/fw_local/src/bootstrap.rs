//! Session ownership: the only place a [`Session`] is kept.

use std::sync::{Arc, Mutex, MutexGuard};

use fwl_client::{Session, SessionSource};
use tracing::{error, info, warn};

use crate::gate::CredentialGate;

#[derive(Default)]
struct BootstrapState {
    session: Option<Session>,
    remembered_username: String,
}

/// Lazily establishes a session through the [`CredentialGate`], suggesting
/// the remembered username.
pub struct SessionBootstrap {
    gate: Arc<CredentialGate>,
    state: Mutex<BootstrapState>,
    // Held across `acquire` so at most one login runs at a time.
    acquiring: Mutex<()>,
}

impl SessionBootstrap {
    pub fn new(gate: Arc<CredentialGate>, remembered_username: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            gate,
            state: Mutex::new(BootstrapState {
                session: None,
                remembered_username: remembered_username.into(),
            }),
            acquiring: Mutex::new(()),
        })
    }

    /// Username the next checkpoint persists; `None` until an identity exists.
    pub fn remembered_username(&self) -> Option<String> {
        let state = lock_unpoisoned(&self.state);
        (!state.remembered_username.is_empty()).then(|| state.remembered_username.clone())
    }

    pub fn has_session(&self) -> bool {
        lock_unpoisoned(&self.state).session.is_some()
    }

    fn current_session(&self) -> Option<Session> {
        lock_unpoisoned(&self.state).session.clone()
    }
}

impl SessionSource for SessionBootstrap {
    fn session(&self) -> Option<Session> {
        if let Some(session) = self.current_session() {
            return Some(session);
        }

        let _acquiring = lock_unpoisoned(&self.acquiring);
        // Another caller may have signed in while we waited.
        if let Some(session) = self.current_session() {
            return Some(session);
        }

        let suggestion = lock_unpoisoned(&self.state).remembered_username.clone();
        let outcome = match self.gate.acquire(&suggestion) {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(error = %err, "credential acquisition failed");
                return None;
            }
        };

        let Some(session) = outcome.session else {
            info!("sign-in cancelled, continuing without a session");
            return None;
        };

        let mut state = lock_unpoisoned(&self.state);
        state.session = Some(session.clone());
        if !outcome.username.is_empty() {
            state.remembered_username = outcome.username;
        }
        Some(session)
    }

    fn invalidate(&self, session: &Session) {
        let mut state = lock_unpoisoned(&self.state);
        if state.session.as_ref() == Some(session) {
            warn!(username = %session.username(), "session rejected by the service, signing in again");
            state.session = None;
        }
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
