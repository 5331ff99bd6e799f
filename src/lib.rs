//! Terminal UI runtime for fw-local.
//!
//! Invariant: single output gate: only `core::output::OutputGate::flush(..)` writes to the
//! terminal.
//!
//! # Public API Overview
//! - Build widgets and compose them into a runtime via [`TUI`].
//! - Ship work to the runtime thread from anywhere with [`RuntimeHandle::dispatch`].
//! - Parse/inspect input with key and event helpers.
//! - Use text and width helpers for ANSI-safe formatting.
//!
//! # Runtime Alias
//! [`TUI`] is a type alias for `runtime::tui::TuiRuntime<T>`.

pub mod core;
pub mod platform;
pub mod runtime;
pub mod widgets;

/// Built-in UI components.
pub use crate::widgets::{Input, ProgressBar};

/// Keyboard input parsing and matching helpers.
pub use crate::core::input::{matches_key, parse_key};
pub use crate::core::input_event::{parse_input_events, InputEvent};

/// Terminal interfaces and process-backed implementation.
pub use crate::core::terminal::Terminal;
pub use crate::platform::process_terminal::{install_panic_hook, ProcessTerminal};

/// Runtime component trait.
pub use crate::core::component::Component;
/// Stable component identifier type.
pub use crate::runtime::component_registry::ComponentId;
/// Cross-thread command plumbing.
pub use crate::runtime::{
    Command, CustomCommand, CustomCommandCtx, CustomCommandError, RuntimeHandle,
};

/// Alias for the main runtime type.
pub type TUI<T> = crate::runtime::tui::TuiRuntime<T>;

/// ANSI stripping helper.
pub use crate::core::text::ansi::strip_ansi;
/// ANSI-aware padding and truncation helpers.
pub use crate::core::text::utils::{pad_to_width, truncate_to_width};
/// Visible width helper that ignores ANSI control sequences.
pub use crate::core::text::width::visible_width;
