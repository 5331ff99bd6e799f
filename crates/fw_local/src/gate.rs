//! Blocking credential handshake between a background caller and the login dialog.
//!
//! [`CredentialGate::acquire`] runs on a worker thread and parks on a condition
//! variable. The dialog, driven from the UI loop, resolves the pending request
//! through [`CredentialGate::submit`] or [`CredentialGate::cancel`]. Credential
//! validation happens back on the acquiring thread so the UI never waits on the
//! remote service.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use fwl_client::{AuthClient, Session};
use thiserror::Error;
use tracing::{debug, error, info};
use zeroize::Zeroizing;

/// What the dialog needs to know to show itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginRequest {
    /// Pre-filled, read-only username. `None` leaves the field editable.
    pub locked_username: Option<String>,
}

impl LoginRequest {
    fn for_suggestion(suggested_username: &str) -> Self {
        Self {
            locked_username: (!suggested_username.is_empty())
                .then(|| suggested_username.to_string()),
        }
    }
}

/// UI side of the handshake. Implementations must not block.
pub trait LoginSurface: Send + Sync {
    fn show_login(&self, request: &LoginRequest);

    /// The last submitted credentials were refused; the dialog stays open.
    fn login_rejected(&self);

    fn hide_login(&self);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginOutcome {
    pub session: Option<Session>,
    pub username: String,
}

impl LoginOutcome {
    #[must_use]
    pub fn cancelled() -> Self {
        Self {
            session: None,
            username: String::new(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.session.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatePhase {
    Idle,
    AwaitingInput,
    Validating,
    Resolved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GateError {
    #[error("a login request is already pending")]
    RequestPending,

    #[error("no login request is pending")]
    NoPendingRequest,

    #[error("credentials are being validated")]
    Validating,
}

struct Credentials {
    username: String,
    secret: Zeroizing<String>,
}

struct PendingRequest {
    request: LoginRequest,
    phase: GatePhase,
    submitted: Option<Credentials>,
    outcome: Option<LoginOutcome>,
}

#[derive(Default)]
struct GateState {
    pending: Option<PendingRequest>,
    closed: bool,
}

pub struct CredentialGate {
    auth: Arc<dyn AuthClient>,
    surface: Arc<dyn LoginSurface>,
    state: Mutex<GateState>,
    changed: Condvar,
}

impl CredentialGate {
    pub fn new(auth: Arc<dyn AuthClient>, surface: Arc<dyn LoginSurface>) -> Arc<Self> {
        Arc::new(Self {
            auth,
            surface,
            state: Mutex::new(GateState::default()),
            changed: Condvar::new(),
        })
    }

    pub fn state(&self) -> GatePhase {
        self.lock_state()
            .pending
            .as_ref()
            .map(|pending| pending.phase)
            .unwrap_or(GatePhase::Idle)
    }

    pub fn pending_request(&self) -> Option<LoginRequest> {
        self.lock_state()
            .pending
            .as_ref()
            .map(|pending| pending.request.clone())
    }

    /// Shows the dialog and blocks until the user signs in or cancels.
    ///
    /// With a non-empty `suggested_username` the username is locked and is
    /// what a successful outcome reports. Failed attempts keep the call
    /// suspended. Must not be called from the UI thread.
    pub fn acquire(&self, suggested_username: &str) -> Result<LoginOutcome, GateError> {
        let request = LoginRequest::for_suggestion(suggested_username);
        {
            let mut state = self.lock_state();
            if state.closed {
                debug!("gate closed, login request cancelled immediately");
                return Ok(LoginOutcome::cancelled());
            }
            if state.pending.is_some() {
                error!("login requested while another request is pending");
                return Err(GateError::RequestPending);
            }
            state.pending = Some(PendingRequest {
                request: request.clone(),
                phase: GatePhase::AwaitingInput,
                submitted: None,
                outcome: None,
            });
        }
        info!(
            locked_username = request.locked_username.is_some(),
            "login dialog requested"
        );
        self.surface.show_login(&request);

        let mut state = self.lock_state();
        loop {
            let Some(pending) = state.pending.as_mut() else {
                // Only this call clears the slot.
                return Ok(LoginOutcome::cancelled());
            };

            if let Some(outcome) = pending.outcome.take() {
                state.pending = None;
                drop(state);
                self.surface.hide_login();
                info!("login dialog cancelled");
                return Ok(outcome);
            }

            if let Some(Credentials {
                username: entered_username,
                secret,
            }) = pending.submitted.take()
            {
                let username = request
                    .locked_username
                    .clone()
                    .unwrap_or(entered_username);
                drop(state);

                let session = self.auth.login(&username, &secret);
                drop(secret);

                state = self.lock_state();
                let Some(pending) = state.pending.as_mut() else {
                    return Ok(LoginOutcome::cancelled());
                };
                if let Some(outcome) = pending.outcome.take() {
                    state.pending = None;
                    drop(state);
                    self.surface.hide_login();
                    return Ok(outcome);
                }

                match session {
                    Some(session) => {
                        state.pending = None;
                        drop(state);
                        self.surface.hide_login();
                        info!(%username, "login succeeded");
                        return Ok(LoginOutcome {
                            session: Some(session),
                            username,
                        });
                    }
                    None => {
                        pending.phase = GatePhase::AwaitingInput;
                        drop(state);
                        info!(%username, "login rejected");
                        self.surface.login_rejected();
                        state = self.lock_state();
                        continue;
                    }
                }
            }

            state = self
                .changed
                .wait(state)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    /// Hands the dialog's credentials to the waiting caller.
    ///
    /// The secret is moved into zeroized storage and wiped once validated.
    pub fn submit(&self, username: &str, secret: Zeroizing<String>) -> Result<(), GateError> {
        let mut state = self.lock_state();
        let pending = state.pending.as_mut().ok_or(GateError::NoPendingRequest)?;
        match pending.phase {
            GatePhase::AwaitingInput => {}
            GatePhase::Validating => return Err(GateError::Validating),
            GatePhase::Idle | GatePhase::Resolved => return Err(GateError::NoPendingRequest),
        }
        pending.phase = GatePhase::Validating;
        pending.submitted = Some(Credentials {
            username: username.to_string(),
            secret,
        });
        drop(state);
        debug!("credentials submitted");
        self.changed.notify_all();
        Ok(())
    }

    /// Resolves the pending request as cancelled.
    pub fn cancel(&self) -> Result<(), GateError> {
        let mut state = self.lock_state();
        let pending = state.pending.as_mut().ok_or(GateError::NoPendingRequest)?;
        match pending.phase {
            GatePhase::AwaitingInput => {}
            GatePhase::Validating => return Err(GateError::Validating),
            GatePhase::Idle | GatePhase::Resolved => return Err(GateError::NoPendingRequest),
        }
        Self::resolve_cancelled(pending);
        drop(state);
        self.changed.notify_all();
        Ok(())
    }

    /// Cancels whatever is pending and makes every later `acquire` return
    /// cancelled without showing the dialog. Used at shutdown.
    pub fn close(&self) {
        let mut state = self.lock_state();
        state.closed = true;
        if let Some(pending) = state.pending.as_mut() {
            Self::resolve_cancelled(pending);
        }
        drop(state);
        self.changed.notify_all();
    }

    fn resolve_cancelled(pending: &mut PendingRequest) {
        pending.phase = GatePhase::Resolved;
        pending.submitted = None;
        pending.outcome = Some(LoginOutcome::cancelled());
    }

    fn lock_state(&self) -> MutexGuard<'_, GateState> {
        lock_unpoisoned(&self.state)
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
