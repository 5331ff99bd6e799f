//! Contract between FW local and the collaborators it treats as external.
//!
//! The application core (credential gate, session bootstrap, persistence and
//! update orchestration) only talks to the remote service, the record store and
//! the presentation layer through the traits in this crate. Transport, record
//! schema evolution and filter predicates live behind them.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Progress channel shared by long-running collaborators.
///
/// `-1` hides the indicator, `0..=100` shows it at that percentage.
pub type ProgressCallback = Arc<dyn Fn(i32) + Send + Sync>;

/// Error returned while constructing a client before any request is made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInitError {
    message: String,
}

impl ClientInitError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ClientInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ClientInitError {}

impl From<String> for ClientInitError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for ClientInitError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Authenticated session issued by the remote service.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    token: String,
    username: String,
}

impl Session {
    #[must_use]
    pub fn new(token: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            username: username.into(),
        }
    }

    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Account the session was issued for.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &"<redacted>")
            .field("username", &self.username)
            .finish()
    }
}

/// Credential check against the remote service.
pub trait AuthClient: Send + Sync {
    /// Returns `None` for invalid credentials. Never fails for that case.
    fn login(&self, username: &str, secret: &str) -> Option<Session>;
}

/// Hands out the current session, establishing one when needed.
pub trait SessionSource: Send + Sync {
    /// `None` when the user declined to authenticate.
    fn session(&self) -> Option<Session>;

    /// The service refused `session`; the next [`SessionSource::session`] call
    /// must not return it again.
    fn invalidate(&self, _session: &Session) {}
}

/// Kind of history a record store holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum StoreKind {
    Movie,
}

impl StoreKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Movie => "movie",
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One watched item. Persistence treats the serialized form as opaque.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub original_title: String,
    #[serde(default)]
    pub year: Option<u16>,
    /// User rating 1..=10, `0` when unrated.
    #[serde(default)]
    pub rating: u8,
    #[serde(default)]
    pub favourite: bool,
    /// ISO-8601 date the item was marked as seen.
    #[serde(default)]
    pub seen_on: Option<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub countries: Vec<String>,
    #[serde(default)]
    pub directors: Vec<String>,
    #[serde(default)]
    pub cast: Vec<String>,
    #[serde(default)]
    pub duration_minutes: Option<u16>,
    /// Filmweb community rating in hundredths, `782` is 7.82.
    #[serde(default)]
    pub community_rating: Option<u16>,
    #[serde(default)]
    pub comment: String,
}

/// One page of history, newest entries first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordPage {
    pub records: Vec<Record>,
    pub page: usize,
    pub total_pages: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("not signed in")]
    NotAuthenticated,

    #[error("session was rejected by the service")]
    SessionRejected,

    #[error("page {page} is out of range ({total_pages} pages available)")]
    PageOutOfRange { page: usize, total_pages: usize },

    #[error("service unavailable: {0}")]
    Unavailable(String),
}

/// Remote history service.
pub trait HistoryClient: Send + Sync {
    fn fetch_page(
        &self,
        session: &Session,
        kind: StoreKind,
        page: usize,
    ) -> Result<RecordPage, ClientError>;
}

/// Established client handle: every request obtains its session through the
/// [`SessionSource`], so nothing downstream ever holds the session itself.
#[derive(Clone)]
pub struct ApiHandle {
    client: Arc<dyn HistoryClient>,
    sessions: Arc<dyn SessionSource>,
}

impl ApiHandle {
    #[must_use]
    pub fn new(client: Arc<dyn HistoryClient>, sessions: Arc<dyn SessionSource>) -> Self {
        Self { client, sessions }
    }

    pub fn fetch_page(&self, kind: StoreKind, page: usize) -> Result<RecordPage, ClientError> {
        let session = self.sessions.session().ok_or(ClientError::NotAuthenticated)?;
        match self.client.fetch_page(&session, kind, page) {
            Err(ClientError::SessionRejected) => {
                // One fresh session per request; a second rejection is returned as is.
                self.sessions.invalidate(&session);
                let session = self.sessions.session().ok_or(ClientError::NotAuthenticated)?;
                self.client.fetch_page(&session, kind, page)
            }
            result => result,
        }
    }
}

#[derive(Debug, Error)]
pub enum RecordStoreError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("failed to restore {kind} store from blob line {line}: {source}")]
    Restore {
        kind: StoreKind,
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// In-memory record store that refreshes itself from the remote service.
pub trait RecordStore: Send {
    fn kind(&self) -> StoreKind;

    /// Refreshes only the items plausibly changed since the last check.
    fn soft_update(&mut self) -> Result<(), RecordStoreError>;

    /// Re-fetches everything and rebuilds the store.
    fn hard_update(&mut self) -> Result<(), RecordStoreError>;

    fn get_by_id(&self, id: u64) -> Option<&Record>;

    fn records(&self) -> &[Record];

    /// Opaque blob persisted by the checkpoint.
    fn store_to_string(&self) -> String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    Year,
    Rating,
    Date,
    Genre,
    Country,
    Director,
}

impl FilterKind {
    pub const ALL: [FilterKind; 6] = [
        Self::Year,
        Self::Rating,
        Self::Date,
        Self::Genre,
        Self::Country,
        Self::Director,
    ];

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Year => "year",
            Self::Rating => "rating",
            Self::Date => "date seen",
            Self::Genre => "genre",
            Self::Country => "country",
            Self::Director => "director",
        }
    }
}

/// Placement of a filter widget on the presentation grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterLayout {
    pub row: u16,
    pub column: u16,
    pub row_span: u16,
}

impl FilterLayout {
    #[must_use]
    pub fn at(row: u16, column: u16) -> Self {
        Self {
            row,
            column,
            row_span: 1,
        }
    }

    #[must_use]
    pub fn spanning(self, row_span: u16) -> Self {
        Self { row_span, ..self }
    }
}

/// One rendered row of the presentation layer's current view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewRow {
    pub record_id: u64,
    pub text: String,
}

/// Presentation layer: filters plus the derived list view.
pub trait Presenter: Send {
    /// Re-derives the whole view from the store.
    fn total_update(&mut self, store: &dyn RecordStore);

    /// Opaque single-line filter configuration blob.
    fn store_to_string(&self) -> String;

    fn add_filter(&mut self, kind: FilterKind, layout: FilterLayout);

    /// Sets the value of a registered filter; `None` disables it.
    fn set_filter(&mut self, kind: FilterKind, value: Option<String>);

    fn filter_value(&self, kind: FilterKind) -> Option<&str>;

    fn view_rows(&self) -> Vec<ViewRow>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NoSession;

    impl SessionSource for NoSession {
        fn session(&self) -> Option<Session> {
            None
        }
    }

    #[derive(Default)]
    struct CountingClient {
        calls: AtomicUsize,
    }

    impl HistoryClient for CountingClient {
        fn fetch_page(
            &self,
            _session: &Session,
            _kind: StoreKind,
            page: usize,
        ) -> Result<RecordPage, ClientError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(RecordPage {
                records: Vec::new(),
                page,
                total_pages: 1,
            })
        }
    }

    #[test]
    fn api_handle_without_session_never_reaches_client() {
        let client = Arc::new(CountingClient::default());
        let api = ApiHandle::new(client.clone(), Arc::new(NoSession));

        let error = api
            .fetch_page(StoreKind::Movie, 0)
            .expect_err("fetch without a session must fail");

        assert_eq!(error, ClientError::NotAuthenticated);
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }

    struct RotatingSessions {
        issued: AtomicUsize,
        invalidated: AtomicUsize,
    }

    impl SessionSource for RotatingSessions {
        fn session(&self) -> Option<Session> {
            let n = self.issued.fetch_add(1, Ordering::SeqCst);
            Some(Session::new(format!("token-{n}"), "alice"))
        }

        fn invalidate(&self, _session: &Session) {
            self.invalidated.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct RejectsFirstToken;

    impl HistoryClient for RejectsFirstToken {
        fn fetch_page(
            &self,
            session: &Session,
            _kind: StoreKind,
            page: usize,
        ) -> Result<RecordPage, ClientError> {
            if session.token() == "token-0" {
                return Err(ClientError::SessionRejected);
            }
            Ok(RecordPage {
                records: Vec::new(),
                page,
                total_pages: 1,
            })
        }
    }

    #[test]
    fn rejected_session_is_invalidated_and_request_retried_once() {
        let sessions = Arc::new(RotatingSessions {
            issued: AtomicUsize::new(0),
            invalidated: AtomicUsize::new(0),
        });
        let api = ApiHandle::new(Arc::new(RejectsFirstToken), sessions.clone());

        let page = api
            .fetch_page(StoreKind::Movie, 0)
            .expect("second session should be accepted");

        assert_eq!(page.page, 0);
        assert_eq!(sessions.invalidated.load(Ordering::SeqCst), 1);
        assert_eq!(sessions.issued.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn session_debug_output_redacts_token() {
        let session = Session::new("secret-token", "alice");
        let debug = format!("{session:?}");

        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("alice"));
    }

    #[test]
    fn record_deserializes_with_only_required_fields() {
        let record: Record = serde_json::from_str(r#"{"id":7,"title":"Stalker"}"#)
            .expect("minimal record should parse");

        assert_eq!(record.id, 7);
        assert_eq!(record.rating, 0);
        assert!(record.genres.is_empty());
        assert!(record.cast.is_empty());
        assert_eq!(record.duration_minutes, None);
        assert_eq!(record.community_rating, None);
    }

    #[test]
    fn record_reads_filmweb_rating_cast_and_duration() {
        let record: Record = serde_json::from_str(
            r#"{"id":7,"title":"Stalker","cast":["Alisa Freyndlikh"],"duration_minutes":161,"community_rating":805}"#,
        )
        .expect("record should parse");

        assert_eq!(record.cast, vec!["Alisa Freyndlikh".to_string()]);
        assert_eq!(record.duration_minutes, Some(161));
        assert_eq!(record.community_rating, Some(805));
    }
}
