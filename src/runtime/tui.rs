//! TUI runtime.
//!
//! One runtime owns the terminal and every registered component. All component
//! access happens on the thread that calls [`TuiRuntime::run_blocking_once`] /
//! [`TuiRuntime::run_once`]; other threads talk to it through
//! [`RuntimeHandle::dispatch`].

use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::{trace, warn};

use crate::core::component::Component;
use crate::core::input_event::{parse_input_events, InputEvent};
use crate::core::output::{OutputGate, TerminalCmd};
use crate::core::terminal::Terminal;
use crate::core::text::utils::truncate_to_width;
use crate::runtime::component_registry::{ComponentId, ComponentRegistry};

const STOP_DRAIN_MAX_MS: u64 = 1000;
const STOP_DRAIN_IDLE_MS: u64 = 50;
const COALESCE_MAX_DURATION_MS: u64 = 2;
const COALESCE_MAX_ITERATIONS: usize = 8;

#[derive(Clone, Copy, Debug)]
struct CoalesceBudget {
    max_duration: Duration,
    max_iterations: usize,
}

impl Default for CoalesceBudget {
    fn default() -> Self {
        Self {
            max_duration: Duration::from_millis(COALESCE_MAX_DURATION_MS),
            max_iterations: COALESCE_MAX_ITERATIONS,
        }
    }
}

impl CoalesceBudget {
    fn allows(&self, start: Instant, iterations: usize) -> bool {
        start.elapsed() < self.max_duration && iterations < self.max_iterations
    }
}

/// Error reported by a [`CustomCommand`]. Logged by the runtime, never fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomCommandError {
    message: String,
}

impl CustomCommandError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CustomCommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for CustomCommandError {}

/// Effects a custom command may request from the runtime.
#[derive(Debug, Default)]
pub struct CustomCommandCtx {
    render_requested: bool,
    stop_requested: bool,
}

impl CustomCommandCtx {
    pub fn request_render(&mut self) {
        self.render_requested = true;
    }

    pub fn request_stop(&mut self) {
        self.stop_requested = true;
    }
}

/// Work shipped from another thread and applied on the runtime thread.
pub trait CustomCommand: Send {
    fn name(&self) -> &'static str;

    fn apply(self: Box<Self>, ctx: &mut CustomCommandCtx) -> Result<(), CustomCommandError>;
}

pub enum Command {
    RequestRender,
    RequestStop,
    Custom(Box<dyn CustomCommand>),
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RequestRender => f.write_str("RequestRender"),
            Self::RequestStop => f.write_str("RequestStop"),
            Self::Custom(command) => f.debug_tuple("Custom").field(&command.name()).finish(),
        }
    }
}

#[derive(Default)]
struct RuntimeWakeState {
    pending_inputs: Vec<String>,
    pending_commands: VecDeque<Box<dyn CustomCommand>>,
    pending_resize: bool,
    render_requested: bool,
    stop_requested: bool,
}

impl RuntimeWakeState {
    fn has_work(&self) -> bool {
        !self.pending_inputs.is_empty()
            || !self.pending_commands.is_empty()
            || self.pending_resize
            || self.render_requested
    }
}

#[derive(Default)]
struct RuntimeWake {
    state: Mutex<RuntimeWakeState>,
    cvar: Condvar,
}

impl RuntimeWake {
    fn wait_for_event(&self) -> bool {
        let mut state = lock_unpoisoned(&self.state);
        while !state.stop_requested && !state.has_work() {
            state = self
                .cvar
                .wait(state)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }

        !state.stop_requested
    }

    fn enqueue_input(&self, data: String) {
        lock_unpoisoned(&self.state).pending_inputs.push(data);
        self.cvar.notify_one();
    }

    fn enqueue_command(&self, command: Box<dyn CustomCommand>) {
        lock_unpoisoned(&self.state).pending_commands.push_back(command);
        self.cvar.notify_one();
    }

    fn signal_resize(&self) {
        lock_unpoisoned(&self.state).pending_resize = true;
        self.cvar.notify_one();
    }

    fn request_render(&self) {
        lock_unpoisoned(&self.state).render_requested = true;
        self.cvar.notify_one();
    }

    fn request_stop(&self) {
        lock_unpoisoned(&self.state).stop_requested = true;
        self.cvar.notify_all();
    }

    fn is_stop_requested(&self) -> bool {
        lock_unpoisoned(&self.state).stop_requested
    }

    fn take_pending_resize(&self) -> bool {
        std::mem::take(&mut lock_unpoisoned(&self.state).pending_resize)
    }

    fn drain_inputs(&self) -> Vec<String> {
        std::mem::take(&mut lock_unpoisoned(&self.state).pending_inputs)
    }

    fn drain_commands(&self) -> VecDeque<Box<dyn CustomCommand>> {
        std::mem::take(&mut lock_unpoisoned(&self.state).pending_commands)
    }

    fn take_render_requested(&self) -> bool {
        std::mem::take(&mut lock_unpoisoned(&self.state).render_requested)
    }

    fn has_pending_non_render(&self) -> bool {
        let state = lock_unpoisoned(&self.state);
        state.pending_resize || !state.pending_inputs.is_empty() || !state.pending_commands.is_empty()
    }

    fn reset_for_start(&self) {
        let mut state = lock_unpoisoned(&self.state);
        state.stop_requested = false;
        state.pending_resize = false;
        state.pending_inputs.clear();
        state.render_requested = false;
    }
}

/// Cloneable, `Send` handle for talking to a runtime from any thread.
#[derive(Clone)]
pub struct RuntimeHandle {
    wake: Arc<RuntimeWake>,
}

impl RuntimeHandle {
    pub fn dispatch(&self, command: Command) {
        match command {
            Command::RequestRender => self.wake.request_render(),
            Command::RequestStop => self.wake.request_stop(),
            Command::Custom(command) => self.wake.enqueue_command(command),
        }
    }
}

pub struct TuiRuntime<T: Terminal> {
    terminal: T,
    output: OutputGate,
    components: ComponentRegistry,
    root: Vec<ComponentId>,
    focus: Option<ComponentId>,
    wake: Arc<RuntimeWake>,
    coalesce_budget: CoalesceBudget,
    last_frame: Option<Vec<String>>,
    stopped: bool,
}

impl<T: Terminal> TuiRuntime<T> {
    pub fn new(terminal: T) -> Self {
        Self {
            terminal,
            output: OutputGate::new(),
            components: ComponentRegistry::new(),
            root: Vec::new(),
            focus: None,
            wake: Arc::new(RuntimeWake::default()),
            coalesce_budget: CoalesceBudget::default(),
            last_frame: None,
            stopped: true,
        }
    }

    pub fn runtime_handle(&self) -> RuntimeHandle {
        RuntimeHandle {
            wake: Arc::clone(&self.wake),
        }
    }

    pub fn register_component(&mut self, component: impl Component + 'static) -> ComponentId {
        self.components.register_boxed(Box::new(component))
    }

    /// Components rendered top to bottom.
    pub fn set_root(&mut self, root: Vec<ComponentId>) {
        self.root = root;
        self.last_frame = None;
        self.request_render();
    }

    /// Component receiving input events.
    pub fn set_focus(&mut self, id: ComponentId) {
        self.focus = Some(id);
    }

    pub fn terminal_columns(&self) -> u16 {
        self.terminal.columns()
    }

    pub fn terminal_rows(&self) -> u16 {
        self.terminal.rows()
    }

    pub fn start(&mut self) -> io::Result<()> {
        self.output.clear();
        self.wake.reset_for_start();
        self.stopped = false;

        let wake_input = Arc::clone(&self.wake);
        let wake_resize = Arc::clone(&self.wake);
        if let Err(err) = self.terminal.start(
            Box::new(move |data| wake_input.enqueue_input(data)),
            Box::new(move || wake_resize.signal_resize()),
        ) {
            self.stopped = true;
            return Err(err);
        }

        self.output.push(TerminalCmd::AltScreenEnter);
        self.output.push(TerminalCmd::HideCursor);
        self.output.push(TerminalCmd::BracketedPasteEnable);
        self.output.push(TerminalCmd::ClearScreen);
        self.output.flush(&mut self.terminal);
        self.last_frame = None;
        self.request_render();

        Ok(())
    }

    pub fn stop(&mut self) -> io::Result<()> {
        if self.stopped {
            return Ok(());
        }
        self.wake.request_stop();
        self.output.push(TerminalCmd::ShowCursor);
        self.output.push(TerminalCmd::BracketedPasteDisable);
        self.output.push(TerminalCmd::AltScreenLeave);
        self.output.flush(&mut self.terminal);
        self.terminal
            .drain_input(STOP_DRAIN_MAX_MS, STOP_DRAIN_IDLE_MS);
        let result = self.terminal.stop();
        self.stopped = true;
        result
    }

    /// True once a [`Command::RequestStop`] was dispatched (or the runtime stopped).
    pub fn is_stop_requested(&self) -> bool {
        self.stopped || self.wake.is_stop_requested()
    }

    /// Block until at least one input/resize/command/render event is available,
    /// then coalesce work and render once (bounded).
    ///
    /// Returns immediately once a stop was requested; callers loop on
    /// [`TuiRuntime::is_stop_requested`].
    pub fn run_blocking_once(&mut self) {
        if self.stopped {
            return;
        }

        if !self.wake.wait_for_event() {
            return;
        }

        self.run_coalesced_once();
    }

    /// Process whatever is queued without blocking.
    pub fn run_once(&mut self) {
        if self.stopped {
            return;
        }
        self.process_pending();
        self.render_if_needed();
    }

    fn run_coalesced_once(&mut self) {
        let start = Instant::now();
        let mut iterations = 0;

        loop {
            let did_work = self.process_pending();
            if !did_work || !self.coalesce_budget.allows(start, iterations) {
                break;
            }
            iterations += 1;

            if !self.wake.has_pending_non_render() {
                break;
            }
        }

        self.render_if_needed();
    }

    fn process_pending(&mut self) -> bool {
        let mut did_work = false;

        if self.wake.take_pending_resize() {
            let event = InputEvent::Resize {
                columns: self.terminal.columns(),
                rows: self.terminal.rows(),
            };
            if let Some(component) = self.focused() {
                component.handle_event(&event);
            }
            for id in self.root.clone() {
                if let Some(component) = self.components.get_mut(id) {
                    component.invalidate();
                }
            }
            self.last_frame = None;
            self.output.push(TerminalCmd::ClearScreen);
            self.request_render();
            did_work = true;
        }

        for data in self.wake.drain_inputs() {
            self.handle_input(&data);
            did_work = true;
        }

        for command in self.wake.drain_commands() {
            self.apply_custom_command(command);
            did_work = true;
        }

        did_work
    }

    fn apply_custom_command(&mut self, command: Box<dyn CustomCommand>) {
        let name = command.name();
        let mut ctx = CustomCommandCtx::default();
        if let Err(error) = command.apply(&mut ctx) {
            warn!(command = name, %error, "custom command failed");
        }
        if ctx.render_requested {
            self.request_render();
        }
        if ctx.stop_requested {
            self.wake.request_stop();
        }
    }

    /// Parse `data` into events and deliver them to the focused component.
    pub fn handle_input(&mut self, data: &str) {
        let events = parse_input_events(data);
        if events.is_empty() {
            return;
        }

        let Some(component) = self.focused() else {
            return;
        };
        for event in &events {
            component.handle_event(event);
        }
        self.request_render();
    }

    pub fn request_render(&mut self) {
        self.wake.request_render();
    }

    pub fn render_if_needed(&mut self) {
        if self.wake.take_render_requested() {
            self.do_render();
        }
        self.output.flush(&mut self.terminal);
    }

    pub fn render_now(&mut self) {
        self.wake.take_render_requested();
        self.do_render();
        self.output.flush(&mut self.terminal);
    }

    fn focused(&mut self) -> Option<&mut Box<dyn Component>> {
        let id = self.focus?;
        self.components.get_mut(id)
    }

    fn do_render(&mut self) {
        let width = self.terminal.columns() as usize;
        let height = self.terminal.rows() as usize;

        let mut lines = Vec::new();
        for id in self.root.clone() {
            if let Some(component) = self.components.get_mut(id) {
                component.set_terminal_rows(height);
                lines.extend(component.render(width));
            }
        }
        lines.truncate(height);
        let lines: Vec<String> = lines
            .iter()
            .map(|line| truncate_to_width(line, width, "", false))
            .collect();

        if self.last_frame.as_ref() == Some(&lines) {
            return;
        }

        let mut frame = String::from("\x1b[H");
        for (index, line) in lines.iter().enumerate() {
            if index > 0 {
                frame.push_str("\r\n");
            }
            frame.push_str(line);
            frame.push_str("\x1b[0m\x1b[K");
        }
        frame.push_str("\x1b[J");
        self.output.push(TerminalCmd::Bytes(frame));
        trace!(lines = lines.len(), width, "frame rendered");
        self.last_frame = Some(lines);
    }
}

impl<T: Terminal> Drop for TuiRuntime<T> {
    fn drop(&mut self) {
        if self.stopped {
            return;
        }

        // Best-effort cleanup: never panic in Drop (especially during unwind).
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = self.stop();
        }));
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
