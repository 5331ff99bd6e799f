//! UI state machine. Owns no threads; every side effect goes through [`HostOps`].

use std::collections::HashMap;

use fwl_client::{FilterKind, Record, ViewRow};
use fwl_tui::{Component, Input, InputEvent};
use zeroize::Zeroizing;

use crate::gate::LoginRequest;
use crate::orchestrator::{CycleKind, ViewSnapshot};
use crate::progress::ProgressIndicator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Browsing,
    Detail(u64),
    Filter,
    Exiting,
}

pub trait HostOps {
    fn start_update(&mut self, kind: CycleKind) -> Result<(), String>;
    fn submit_login(&mut self, username: &str, secret: Zeroizing<String>) -> Result<(), String>;
    fn cancel_login(&mut self) -> Result<(), String>;
    fn apply_filter(&mut self, kind: FilterKind, value: Option<String>) -> Vec<ViewRow>;
    fn request_render(&mut self);
    fn request_stop(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginField {
    Username,
    Secret,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginMessage {
    Prompt,
    Rejected,
    Validating,
}

impl LoginMessage {
    pub fn text(self) -> &'static str {
        match self {
            Self::Prompt => "Sign in to refresh your history",
            Self::Rejected => "Wrong username or password",
            Self::Validating => "Signing in…",
        }
    }
}

pub struct LoginDialog {
    pub username: Input,
    pub secret: Input,
    focus: LoginField,
    message: LoginMessage,
    locked: bool,
}

impl LoginDialog {
    fn open(request: &LoginRequest) -> Self {
        let mut username = Input::new("Username: ");
        let mut secret = Input::masked("Password: ");
        let locked = match request.locked_username.as_deref() {
            Some(locked_username) => {
                username.set_value(locked_username);
                username.set_read_only(true);
                true
            }
            None => false,
        };
        let focus = if locked {
            LoginField::Secret
        } else {
            LoginField::Username
        };
        username.set_focused(focus == LoginField::Username);
        secret.set_focused(focus == LoginField::Secret);
        Self {
            username,
            secret,
            focus,
            message: LoginMessage::Prompt,
            locked,
        }
    }

    pub fn focus(&self) -> LoginField {
        self.focus
    }

    pub fn message(&self) -> LoginMessage {
        self.message
    }

    pub fn is_username_locked(&self) -> bool {
        self.locked
    }

    fn move_focus(&mut self) {
        if self.locked {
            return;
        }
        self.focus = match self.focus {
            LoginField::Username => LoginField::Secret,
            LoginField::Secret => LoginField::Username,
        };
        self.username.set_focused(self.focus == LoginField::Username);
        self.secret.set_focused(self.focus == LoginField::Secret);
    }

    fn focused_input(&mut self) -> &mut Input {
        match self.focus {
            LoginField::Username => &mut self.username,
            LoginField::Secret => &mut self.secret,
        }
    }

    fn clear(&mut self) {
        self.username.clear();
        self.secret.clear();
    }

    /// Takes the secret out of the field.
    fn take_secret(&mut self) -> Zeroizing<String> {
        let secret = Zeroizing::new(self.secret.value().to_string());
        self.secret.clear();
        secret
    }
}

/// Inline editor for one filter value.
pub struct FilterEditor {
    kinds: Vec<FilterKind>,
    index: usize,
    pub input: Input,
}

impl FilterEditor {
    fn open(filters: &[(FilterKind, Option<String>)]) -> Self {
        let kinds: Vec<FilterKind> = filters.iter().map(|(kind, _)| *kind).collect();
        let mut editor = Self {
            kinds,
            index: 0,
            input: Input::new(""),
        };
        editor.load(filters);
        editor
    }

    pub fn kind(&self) -> Option<FilterKind> {
        self.kinds.get(self.index).copied()
    }

    fn step(&mut self, forward: bool, filters: &[(FilterKind, Option<String>)]) {
        if self.kinds.is_empty() {
            return;
        }
        self.index = if forward {
            (self.index + 1) % self.kinds.len()
        } else {
            (self.index + self.kinds.len() - 1) % self.kinds.len()
        };
        self.load(filters);
    }

    fn load(&mut self, filters: &[(FilterKind, Option<String>)]) {
        let Some(kind) = self.kind() else {
            return;
        };
        let value = filters
            .iter()
            .find(|(candidate, _)| *candidate == kind)
            .and_then(|(_, value)| value.as_deref())
            .unwrap_or_default();
        self.input = Input::new(format!("{}: ", kind.label()));
        self.input.set_value(value);
        self.input.set_focused(true);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub text: String,
    pub is_error: bool,
}

pub struct App {
    pub mode: Mode,
    pub login: Option<LoginDialog>,
    pub filter_editor: Option<FilterEditor>,
    pub rows: Vec<ViewRow>,
    pub selected: usize,
    pub filters: Vec<(FilterKind, Option<String>)>,
    pub progress: ProgressIndicator,
    pub running: Option<CycleKind>,
    pub status: Option<StatusLine>,
    pub username: Option<String>,
    pub should_exit: bool,
    records: HashMap<u64, Record>,
    page_rows: usize,
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

impl App {
    pub fn new() -> Self {
        Self {
            mode: Mode::Browsing,
            login: None,
            filter_editor: None,
            rows: Vec::new(),
            selected: 0,
            filters: Vec::new(),
            progress: ProgressIndicator::new(),
            running: None,
            status: None,
            username: None,
            should_exit: false,
            records: HashMap::new(),
            page_rows: 10,
        }
    }

    pub fn is_login_visible(&self) -> bool {
        self.login.is_some()
    }

    pub fn selected_row(&self) -> Option<&ViewRow> {
        self.rows.get(self.selected)
    }

    pub fn record(&self, id: u64) -> Option<&Record> {
        self.records.get(&id)
    }

    /// Rows moved by page up/down.
    pub fn set_page_rows(&mut self, rows: usize) {
        self.page_rows = rows.max(1);
    }

    pub fn handle_event(&mut self, event: &InputEvent, host: &mut dyn HostOps) {
        if event.key_id() == Some("ctrl+c") {
            self.on_quit(host);
            return;
        }

        if self.login.is_some() {
            self.handle_login_event(event, host);
        } else {
            match self.mode {
                Mode::Browsing => self.handle_browsing_event(event, host),
                Mode::Detail(_) => self.handle_detail_event(event, host),
                Mode::Filter => self.handle_filter_event(event, host),
                Mode::Exiting => {}
            }
        }
        host.request_render();
    }

    fn handle_login_event(&mut self, event: &InputEvent, host: &mut dyn HostOps) {
        let Some(dialog) = self.login.as_mut() else {
            return;
        };
        match dialog.message {
            LoginMessage::Validating => return,
            LoginMessage::Rejected => dialog.message = LoginMessage::Prompt,
            LoginMessage::Prompt => {}
        }

        match event.key_id() {
            Some("enter") => self.on_login_submit(host),
            Some("escape") => self.on_login_cancel(host),
            Some("tab" | "shift+tab" | "up" | "down") => dialog.move_focus(),
            _ => dialog.focused_input().handle_event(event),
        }
    }

    fn on_login_submit(&mut self, host: &mut dyn HostOps) {
        let Some(dialog) = self.login.as_mut() else {
            return;
        };
        let username = dialog.username.value().to_string();
        let secret = dialog.take_secret();
        dialog.message = LoginMessage::Validating;
        if let Err(error) = host.submit_login(&username, secret) {
            dialog.message = LoginMessage::Prompt;
            self.set_error(format!("Sign-in failed: {error}"));
        }
    }

    fn on_login_cancel(&mut self, host: &mut dyn HostOps) {
        let Some(dialog) = self.login.as_mut() else {
            return;
        };
        dialog.clear();
        if let Err(error) = host.cancel_login() {
            self.set_error(format!("Cancel failed: {error}"));
        }
    }

    fn handle_browsing_event(&mut self, event: &InputEvent, host: &mut dyn HostOps) {
        if let Some(text) = text_of(event) {
            for ch in text.chars() {
                self.on_browsing_char(ch, host);
                if self.mode != Mode::Browsing {
                    break;
                }
            }
            return;
        }

        match event.key_id() {
            Some("up") => self.move_selection(-1),
            Some("down") => self.move_selection(1),
            Some("pageUp") => self.move_selection(-(self.page_rows as isize)),
            Some("pageDown") => self.move_selection(self.page_rows as isize),
            Some("home") => self.selected = 0,
            Some("end") => self.selected = self.rows.len().saturating_sub(1),
            Some("enter") => self.open_detail(),
            _ => {}
        }
    }

    fn on_browsing_char(&mut self, ch: char, host: &mut dyn HostOps) {
        match ch {
            'u' => self.on_start_update(CycleKind::Soft, host),
            'r' => self.on_start_update(CycleKind::Hard, host),
            'f' => {
                self.filter_editor = Some(FilterEditor::open(&self.filters));
                self.mode = Mode::Filter;
            }
            'q' => self.on_quit(host),
            'k' => self.move_selection(-1),
            'j' => self.move_selection(1),
            _ => {}
        }
    }

    pub fn on_start_update(&mut self, kind: CycleKind, host: &mut dyn HostOps) {
        if self.running.is_some() {
            self.set_status("An update is already running");
            return;
        }
        match host.start_update(kind) {
            Ok(()) => {
                self.running = Some(kind);
                self.set_status(format!("Starting {kind}…"));
            }
            Err(error) => self.set_error(format!("Cannot start {kind}: {error}")),
        }
    }

    pub fn on_quit(&mut self, host: &mut dyn HostOps) {
        self.mode = Mode::Exiting;
        self.should_exit = true;
        self.set_status("Saving and shutting down…");
        host.request_stop();
        host.request_render();
    }

    fn handle_detail_event(&mut self, event: &InputEvent, _host: &mut dyn HostOps) {
        let close = matches!(event.key_id(), Some("escape" | "enter"))
            || text_of(event).is_some_and(|text| text.contains('q'));
        if close {
            self.mode = Mode::Browsing;
        }
    }

    fn handle_filter_event(&mut self, event: &InputEvent, host: &mut dyn HostOps) {
        let Some(editor) = self.filter_editor.as_mut() else {
            self.mode = Mode::Browsing;
            return;
        };
        match event.key_id() {
            Some("escape") => {
                self.filter_editor = None;
                self.mode = Mode::Browsing;
            }
            Some("tab" | "down") => editor.step(true, &self.filters),
            Some("shift+tab" | "up") => editor.step(false, &self.filters),
            Some("enter") => {
                let Some(kind) = editor.kind() else {
                    return;
                };
                let value = Some(editor.input.value().trim().to_string())
                    .filter(|value| !value.is_empty());
                let rows = host.apply_filter(kind, value.clone());
                if let Some(slot) = self.filters.iter_mut().find(|(candidate, _)| *candidate == kind) {
                    slot.1 = value;
                }
                self.set_rows(rows);
                self.set_status(format!("{} matching", self.rows.len()));
            }
            _ => editor.input.handle_event(event),
        }
    }

    fn open_detail(&mut self) {
        if let Some(id) = self.selected_row().map(|row| row.record_id) {
            if self.records.contains_key(&id) {
                self.mode = Mode::Detail(id);
            }
        }
    }

    fn move_selection(&mut self, delta: isize) {
        if self.rows.is_empty() {
            self.selected = 0;
            return;
        }
        let last = self.rows.len() as isize - 1;
        self.selected = (self.selected as isize + delta).clamp(0, last) as usize;
    }

    fn set_rows(&mut self, rows: Vec<ViewRow>) {
        let previous = self.selected_row().map(|row| row.record_id);
        self.rows = rows;
        self.selected = previous
            .and_then(|id| self.rows.iter().position(|row| row.record_id == id))
            .unwrap_or(0);
        if let Mode::Detail(id) = self.mode {
            if !self.records.contains_key(&id) {
                self.mode = Mode::Browsing;
            }
        }
    }

    pub fn set_status(&mut self, text: impl Into<String>) {
        self.status = Some(StatusLine {
            text: text.into(),
            is_error: false,
        });
    }

    pub fn set_error(&mut self, text: impl Into<String>) {
        self.status = Some(StatusLine {
            text: text.into(),
            is_error: true,
        });
    }

    pub fn on_login_requested(&mut self, request: &LoginRequest) {
        self.login = Some(LoginDialog::open(request));
    }

    pub fn on_login_rejected(&mut self) {
        if let Some(dialog) = self.login.as_mut() {
            dialog.message = LoginMessage::Rejected;
            if !dialog.locked && dialog.focus != LoginField::Secret {
                dialog.move_focus();
            }
        }
    }

    pub fn on_login_hidden(&mut self) {
        self.login = None;
    }

    pub fn on_progress(&mut self, value: i32) {
        self.progress.set(value);
    }

    pub fn on_cycle_started(&mut self, kind: CycleKind) {
        self.running = Some(kind);
        self.set_status(format!("Running {kind}…"));
    }

    pub fn on_cycle_finished(&mut self, kind: CycleKind, saved: bool) {
        self.running = None;
        if saved {
            self.set_status(format!("{} finished, saved", capitalized(kind.label())));
        } else {
            self.set_status(format!(
                "{} finished, nothing saved without a sign-in",
                capitalized(kind.label())
            ));
        }
    }

    pub fn on_cycle_failed(&mut self, kind: CycleKind, error: &str) {
        self.running = None;
        self.progress.set(crate::progress::HIDDEN);
        self.set_error(format!("{} failed: {error}", capitalized(kind.label())));
    }

    pub fn on_view_updated(&mut self, snapshot: ViewSnapshot) {
        self.records = snapshot
            .records
            .into_iter()
            .map(|record| (record.id, record))
            .collect();
        self.filters = snapshot.filters;
        self.username = snapshot.username;
        self.set_rows(snapshot.rows);
    }
}

fn text_of(event: &InputEvent) -> Option<&str> {
    match event {
        InputEvent::Text { text, .. } => Some(text),
        _ => None,
    }
}

fn capitalized(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fwl_client_mock::record;
    use fwl_tui::parse_input_events;

    #[derive(Default)]
    struct RecordingHost {
        updates: Vec<CycleKind>,
        logins: Vec<(String, String)>,
        cancels: usize,
        filters: Vec<(FilterKind, Option<String>)>,
        stops: usize,
        reject_updates: bool,
    }

    impl HostOps for RecordingHost {
        fn start_update(&mut self, kind: CycleKind) -> Result<(), String> {
            if self.reject_updates {
                return Err("busy".to_string());
            }
            self.updates.push(kind);
            Ok(())
        }

        fn submit_login(&mut self, username: &str, secret: Zeroizing<String>) -> Result<(), String> {
            self.logins.push((username.to_string(), secret.to_string()));
            Ok(())
        }

        fn cancel_login(&mut self) -> Result<(), String> {
            self.cancels += 1;
            Ok(())
        }

        fn apply_filter(&mut self, kind: FilterKind, value: Option<String>) -> Vec<ViewRow> {
            self.filters.push((kind, value));
            vec![ViewRow {
                record_id: 2,
                text: "Heat".to_string(),
            }]
        }

        fn request_render(&mut self) {}

        fn request_stop(&mut self) {
            self.stops += 1;
        }
    }

    fn send(app: &mut App, host: &mut RecordingHost, data: &str) {
        for event in parse_input_events(data) {
            app.handle_event(&event, host);
        }
    }

    fn browsing_app() -> App {
        let mut app = App::new();
        app.on_view_updated(ViewSnapshot {
            rows: vec![
                ViewRow {
                    record_id: 1,
                    text: "Stalker".to_string(),
                },
                ViewRow {
                    record_id: 2,
                    text: "Heat".to_string(),
                },
            ],
            records: vec![record(1, "Stalker", 1979, 9), record(2, "Heat", 1995, 7)],
            filters: FilterKind::ALL.iter().map(|&kind| (kind, None)).collect(),
            username: None,
        });
        app
    }

    #[test]
    fn locked_username_focuses_secret_and_enter_submits() {
        let mut app = App::new();
        let mut host = RecordingHost::default();
        app.on_login_requested(&LoginRequest {
            locked_username: Some("alice".to_string()),
        });

        send(&mut app, &mut host, "\tpw\r");

        assert_eq!(host.logins, vec![("alice".to_string(), "pw".to_string())]);
        let dialog = app.login.as_ref().expect("dialog stays until hidden");
        assert_eq!(dialog.focus(), LoginField::Secret);
        assert_eq!(dialog.secret.value(), "");
        assert_eq!(dialog.message(), LoginMessage::Validating);
    }

    #[test]
    fn rejection_message_clears_on_next_key() {
        let mut app = App::new();
        let mut host = RecordingHost::default();
        app.on_login_requested(&LoginRequest {
            locked_username: None,
        });
        send(&mut app, &mut host, "bob\tnope\r");
        app.on_login_rejected();
        assert_eq!(
            app.login.as_ref().map(LoginDialog::message),
            Some(LoginMessage::Rejected)
        );

        send(&mut app, &mut host, "x");

        let dialog = app.login.as_ref().expect("dialog open");
        assert_eq!(dialog.message(), LoginMessage::Prompt);
        assert_eq!(dialog.secret.value(), "x");
        assert_eq!(dialog.username.value(), "bob");
    }

    #[test]
    fn escape_cancels_login_and_clears_fields() {
        let mut app = App::new();
        let mut host = RecordingHost::default();
        app.on_login_requested(&LoginRequest {
            locked_username: None,
        });
        send(&mut app, &mut host, "bob\tsecret");

        send(&mut app, &mut host, "\x1b");

        assert_eq!(host.cancels, 1);
        let dialog = app.login.as_ref().expect("dialog closes on hide");
        assert_eq!(dialog.username.value(), "");
        assert_eq!(dialog.secret.value(), "");
        app.on_login_hidden();
        assert!(!app.is_login_visible());
    }

    #[test]
    fn control_keys_start_cycles_and_quit() {
        let mut app = browsing_app();
        let mut host = RecordingHost::default();

        send(&mut app, &mut host, "u");
        assert_eq!(host.updates, vec![CycleKind::Soft]);

        send(&mut app, &mut host, "r");
        assert_eq!(host.updates, vec![CycleKind::Soft], "second start is refused");

        app.on_cycle_finished(CycleKind::Soft, true);
        send(&mut app, &mut host, "r");
        assert_eq!(host.updates, vec![CycleKind::Soft, CycleKind::Hard]);

        send(&mut app, &mut host, "q");
        assert!(app.should_exit);
        assert_eq!(app.mode, Mode::Exiting);
        assert_eq!(host.stops, 1);
    }

    #[test]
    fn failed_start_reports_error() {
        let mut app = browsing_app();
        let mut host = RecordingHost {
            reject_updates: true,
            ..RecordingHost::default()
        };

        send(&mut app, &mut host, "u");

        assert_eq!(app.running, None);
        let status = app.status.as_ref().expect("status shown");
        assert!(status.is_error);
        assert!(status.text.contains("busy"));
    }

    #[test]
    fn enter_opens_detail_for_selected_row() {
        let mut app = browsing_app();
        let mut host = RecordingHost::default();

        send(&mut app, &mut host, "\x1b[B\r");
        assert_eq!(app.mode, Mode::Detail(2));
        assert_eq!(app.record(2).map(|r| r.title.as_str()), Some("Heat"));

        send(&mut app, &mut host, "\x1b");
        assert_eq!(app.mode, Mode::Browsing);
    }

    #[test]
    fn filter_editor_applies_value_to_current_kind() {
        let mut app = browsing_app();
        let mut host = RecordingHost::default();

        send(&mut app, &mut host, "f");
        assert_eq!(app.mode, Mode::Filter);
        send(&mut app, &mut host, "\t1995\r");

        assert_eq!(
            host.filters,
            vec![(FilterKind::Rating, Some("1995".to_string()))]
        );
        assert_eq!(app.rows.len(), 1);
        assert_eq!(app.selected_row().map(|row| row.record_id), Some(2));

        send(&mut app, &mut host, "\x1b");
        assert_eq!(app.mode, Mode::Browsing);
    }

    #[test]
    fn hide_then_show_progress_stays_visible() {
        let mut app = App::new();
        app.on_progress(-1);
        app.on_progress(25);
        assert!(app.progress.is_visible());
        assert_eq!(app.progress.percent(), 25);
    }
}
