//! FW local: browse and refresh a cached copy of a movie-watching history.
//!
//! ## Data file
//!
//! State lives in one file, `userdata.fws` in the working directory unless
//! `FW_LOCAL_DATA_FILE` points elsewhere. See [`userdata_store`] for the
//! format and the backup-then-replace checkpoint sequence.
//!
//! ## Client selection
//!
//! `FW_LOCAL_CLIENT=mock` (the default) uses the in-process demo service. Its
//! account comes from `FW_LOCAL_MOCK_USER` / `FW_LOCAL_MOCK_PASSWORD`
//! (`demo` / `demo` when unset).
//!
//! ## Logging
//!
//! Set `FW_LOCAL_LOG` to a file path to record `tracing` output there;
//! `FW_LOCAL_DEBUG=1` lowers the default level to `debug` and `RUST_LOG`
//! overrides both.
//!
//! Threading contract: the terminal loop runs on the main thread; update
//! cycles run on one `fw-local-update-<n>` worker at a time, which is also the
//! only thread that ever waits in [`gate::CredentialGate::acquire`].

pub mod app;
pub mod bootstrap;
pub mod config;
pub mod gate;
pub mod logging;
pub mod orchestrator;
pub mod presenter;
pub mod progress;
pub mod providers;
pub mod records;
pub mod runtime;
pub mod tui;
