use std::sync::{Arc, Mutex, MutexGuard};

use fwl_client::{FilterKind, Record};
use fwl_tui::{
    pad_to_width, truncate_to_width, visible_width, Component, InputEvent, ProgressBar,
};
use userdata_store::CURRENT_VERSION;

use crate::app::{App, HostOps, LoginDialog, LoginMessage, Mode};
use crate::runtime::RuntimeController;

const HEADER_ROWS: usize = 3;
const FOOTER_ROWS: usize = 4;
const HELP_TEXT: &str = "u update  r reload  f filters  enter details  q quit";

fn ansi_wrap(text: &str, prefix: &str, suffix: &str) -> String {
    format!("{prefix}{text}{suffix}")
}

fn dim(text: &str) -> String {
    ansi_wrap(text, "\x1b[2m", "\x1b[22m")
}

fn bold(text: &str) -> String {
    ansi_wrap(text, "\x1b[1m", "\x1b[22m")
}

fn reverse(text: &str) -> String {
    ansi_wrap(text, "\x1b[7m", "\x1b[27m")
}

fn red(text: &str) -> String {
    ansi_wrap(text, "\x1b[31m", "\x1b[39m")
}

fn cyan(text: &str) -> String {
    ansi_wrap(text, "\x1b[36m", "\x1b[39m")
}

pub struct AppComponent {
    app: Arc<Mutex<App>>,
    host: Arc<RuntimeController>,
    progress_bar: ProgressBar,
    terminal_rows: usize,
    scroll: usize,
}

impl AppComponent {
    pub fn new(app: Arc<Mutex<App>>, host: Arc<RuntimeController>) -> Self {
        Self {
            app,
            host,
            progress_bar: ProgressBar::new(),
            terminal_rows: 24,
            scroll: 0,
        }
    }

    fn with_app_mut(&self, mut f: impl FnMut(&mut App, &mut dyn HostOps)) {
        let mut app = lock_unpoisoned(&self.app);
        let mut host = Arc::clone(&self.host);
        f(&mut app, &mut host);
    }

    fn body_rows(&self) -> usize {
        self.terminal_rows
            .saturating_sub(HEADER_ROWS + FOOTER_ROWS)
            .max(1)
    }

    /// `reserved` rows of the body are already taken by lines above the list.
    fn render_list(&mut self, app: &App, width: usize, reserved: usize, lines: &mut Vec<String>) {
        let body = self.body_rows().saturating_sub(reserved).max(1);
        if app.selected < self.scroll {
            self.scroll = app.selected;
        } else if app.selected >= self.scroll + body {
            self.scroll = app.selected + 1 - body;
        }
        self.scroll = self.scroll.min(app.rows.len().saturating_sub(body));

        if app.rows.is_empty() {
            lines.push(dim("No records yet. Press u to update or r to reload."));
            return;
        }
        for (index, row) in app.rows.iter().enumerate().skip(self.scroll).take(body) {
            let text = truncate_to_width(&row.text, width, "…", false);
            if index == app.selected {
                lines.push(reverse(&pad_to_width(&text, width)));
            } else {
                lines.push(text);
            }
        }
    }

    fn render_footer(&mut self, app: &App, width: usize, lines: &mut Vec<String>) {
        if app.progress.is_visible() {
            self.progress_bar.set_percent(app.progress.percent());
            lines.extend(self.progress_bar.render(width));
        } else {
            lines.push(String::new());
        }

        match app.status.as_ref() {
            Some(status) if status.is_error => lines.push(red(&status.text)),
            Some(status) => lines.push(status.text.clone()),
            None => lines.push(String::new()),
        }
        lines.push(dim(HELP_TEXT));
    }
}

impl Component for AppComponent {
    fn render(&mut self, width: usize) -> Vec<String> {
        let app = Arc::clone(&self.app);
        let mut app = lock_unpoisoned(&app);
        app.set_page_rows(self.body_rows());

        let mut lines = Vec::new();
        lines.push(render_header(app.username.as_deref()));
        lines.push(render_filters(&app));
        lines.push(dim(&"─".repeat(width)));

        if let Some(dialog) = app.login.as_mut() {
            render_login(dialog, width, &mut lines);
        } else {
            match app.mode {
                Mode::Detail(id) => match app.record(id) {
                    Some(record) => render_detail(record, width, &mut lines),
                    None => lines.push(dim("Record no longer available")),
                },
                Mode::Filter => {
                    let editor_start = lines.len();
                    if let Some(editor) = app.filter_editor.as_mut() {
                        lines.extend(editor.input.render(width));
                        if let Some(kind) = editor.kind() {
                            lines.push(dim(filter_hint(kind)));
                        }
                        lines.push(dim("tab next filter  enter apply  esc close"));
                    }
                    let reserved = lines.len() - editor_start;
                    self.render_list(&app, width, reserved, &mut lines);
                }
                Mode::Browsing | Mode::Exiting => self.render_list(&app, width, 0, &mut lines),
            }
        }

        let body_end = HEADER_ROWS + self.body_rows();
        if lines.len() < body_end {
            lines.resize(body_end, String::new());
        }
        self.render_footer(&app, width, &mut lines);
        lines
    }

    fn set_terminal_rows(&mut self, rows: usize) {
        self.terminal_rows = rows;
    }

    fn handle_event(&mut self, event: &InputEvent) {
        if let InputEvent::Resize { rows, .. } = event {
            self.terminal_rows = *rows as usize;
            return;
        }
        self.with_app_mut(|app, host| app.handle_event(event, host));
    }
}

fn render_header(username: Option<&str>) -> String {
    let user = match username {
        Some(username) => format!("signed in as {username}"),
        None => "not signed in".to_string(),
    };
    format!(
        "{} {} {}",
        bold("FW local"),
        dim(CURRENT_VERSION),
        cyan(&user)
    )
}

fn render_filters(app: &App) -> String {
    let active: Vec<String> = app
        .filters
        .iter()
        .filter_map(|(kind, value)| value.as_ref().map(|value| format!("{}={value}", kind.label())))
        .collect();
    if active.is_empty() {
        dim("no filters")
    } else {
        format!("{} {}", dim("filters:"), active.join("  "))
    }
}

fn filter_hint(kind: FilterKind) -> &'static str {
    match kind {
        FilterKind::Year => "e.g. 1995, 1990..2000, 1990.. or ..2000",
        FilterKind::Rating => "e.g. 8, 7.. or 1..5 (0 is unrated)",
        FilterKind::Date => "e.g. 2023, 2023-05..2023-08 or ..2024-01-31",
        FilterKind::Genre => "e.g. Drama, Crime / all: Drama, Crime / exactly: Drama",
        FilterKind::Country | FilterKind::Director => "full name, any letter case",
    }
}

fn render_login(dialog: &mut LoginDialog, width: usize, lines: &mut Vec<String>) {
    lines.push(bold("Sign in"));
    let message = dialog.message();
    match message {
        LoginMessage::Rejected => lines.push(red(message.text())),
        LoginMessage::Prompt | LoginMessage::Validating => lines.push(message.text().to_string()),
    }
    lines.push(String::new());
    lines.extend(dialog.username.render(width));
    lines.extend(dialog.secret.render(width));
    lines.push(String::new());
    lines.push(dim("enter sign in  esc cancel  tab switch field"));
}

fn render_detail(record: &Record, width: usize, lines: &mut Vec<String>) {
    lines.push(bold(&record.title));
    if !record.original_title.is_empty() && record.original_title != record.title {
        lines.push(dim(&record.original_title));
    }
    let mut fields = Vec::new();
    if let Some(year) = record.year {
        fields.push(("Year", year.to_string()));
    }
    if record.rating > 0 {
        fields.push(("Rating", format!("{}/10", record.rating)));
    }
    if let Some(rating) = record.community_rating {
        fields.push(("Filmweb", format!("{}.{:02}", rating / 100, rating % 100)));
    }
    if record.favourite {
        fields.push(("Favourite", "yes".to_string()));
    }
    if let Some(minutes) = record.duration_minutes {
        fields.push(("Duration", format!("{minutes} min")));
    }
    if let Some(seen) = record.seen_on.as_ref() {
        fields.push(("Seen", seen.clone()));
    }
    for (label, values) in [
        ("Genres", &record.genres),
        ("Countries", &record.countries),
        ("Directors", &record.directors),
        ("Cast", &record.cast),
    ] {
        if !values.is_empty() {
            fields.push((label, values.join(", ")));
        }
    }
    if !record.comment.is_empty() {
        fields.push(("Comment", record.comment.clone()));
    }

    let label_width = fields
        .iter()
        .map(|(label, _)| visible_width(label))
        .max()
        .unwrap_or(0);
    for (label, value) in fields {
        let line = format!("{}  {value}", pad_to_width(label, label_width));
        lines.push(truncate_to_width(&line, width, "…", false));
    }
    lines.push(String::new());
    lines.push(dim("esc back"));
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fwl_client_mock::record;
    use fwl_tui::strip_ansi;

    #[test]
    fn header_shows_version_and_user() {
        let header = strip_ansi(&render_header(Some("alice")));
        assert_eq!(header, format!("FW local {CURRENT_VERSION} signed in as alice"));
    }

    #[test]
    fn detail_lists_known_fields_only() {
        let mut stalker = record(1, "Stalker", 1979, 9);
        stalker.directors = vec!["Andrei Tarkovsky".to_string()];
        let mut lines = Vec::new();
        render_detail(&stalker, 60, &mut lines);
        let plain: Vec<String> = lines.iter().map(|line| strip_ansi(line)).collect();

        assert_eq!(plain[0], "Stalker");
        assert!(plain.contains(&"Year       1979".to_string()));
        assert!(plain.contains(&"Directors  Andrei Tarkovsky".to_string()));
        assert!(!plain.iter().any(|line| line.starts_with("Genres")));
        assert!(!plain.iter().any(|line| line.starts_with("Cast")));
    }

    #[test]
    fn detail_shows_filmweb_rating_duration_and_cast() {
        let mut stalker = record(1, "Stalker", 1979, 9);
        stalker.community_rating = Some(805);
        stalker.duration_minutes = Some(161);
        stalker.cast = vec!["Alisa Freyndlikh".to_string(), "Aleksandr Kaydanovskiy".to_string()];
        let mut lines = Vec::new();
        render_detail(&stalker, 80, &mut lines);
        let plain: Vec<String> = lines.iter().map(|line| strip_ansi(line)).collect();

        assert!(plain.contains(&"Filmweb   8.05".to_string()));
        assert!(plain.contains(&"Duration  161 min".to_string()));
        assert!(plain.contains(&"Cast      Alisa Freyndlikh, Aleksandr Kaydanovskiy".to_string()));
    }
}
