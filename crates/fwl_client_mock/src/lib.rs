//! Deterministic in-process implementation of the `fwl_client` contract.
//!
//! There is no transport here. The service keeps its accounts, issued sessions
//! and a paged history catalog in memory, which makes it usable both for local
//! runs and for driving the application core from tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use fwl_client::{
    AuthClient, ClientError, HistoryClient, Record, RecordPage, Session, StoreKind,
};
use tracing::debug;
use uuid::Uuid;

/// Stable client identifier used for explicit startup selection.
pub const MOCK_CLIENT_ID: &str = "mock";

pub const DEMO_USERNAME: &str = "demo";
pub const DEMO_PASSWORD: &str = "demo";

const DEFAULT_PAGE_SIZE: usize = 10;

#[derive(Debug, Default)]
struct ServiceState {
    sessions: HashMap<String, String>,
    /// Newest first, like the remote history listing.
    catalog: Vec<Record>,
    failing_page: Option<usize>,
}

/// Mock history service: authentication plus paged history.
#[derive(Debug)]
pub struct MockHistoryService {
    accounts: HashMap<String, String>,
    page_size: usize,
    page_delay: Duration,
    state: Mutex<ServiceState>,
    login_attempts: AtomicUsize,
    pages_served: AtomicUsize,
}

impl MockHistoryService {
    /// Creates an empty service. A zero page size falls back to the default.
    #[must_use]
    pub fn new(page_size: usize) -> Self {
        Self {
            accounts: HashMap::new(),
            page_size: if page_size == 0 {
                DEFAULT_PAGE_SIZE
            } else {
                page_size
            },
            page_delay: Duration::ZERO,
            state: Mutex::new(ServiceState::default()),
            login_attempts: AtomicUsize::new(0),
            pages_served: AtomicUsize::new(0),
        }
    }

    /// Service with the `demo`/`demo` account and a small built-in catalog.
    #[must_use]
    pub fn demo() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
            .with_account(DEMO_USERNAME, DEMO_PASSWORD)
            .with_records(demo_catalog())
            .with_page_delay(Duration::from_millis(Self::DEMO_PAGE_DELAY_MS))
    }

    #[must_use]
    pub fn with_account(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.accounts.insert(username.into(), password.into());
        self
    }

    /// Replaces the catalog. `records` is expected newest first.
    #[must_use]
    pub fn with_records(self, records: Vec<Record>) -> Self {
        lock_unpoisoned(&self.state).catalog = records;
        self
    }

    #[must_use]
    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }

    /// Adds a freshly watched item at the head of the history.
    pub fn push_newest(&self, record: Record) {
        let mut state = lock_unpoisoned(&self.state);
        state.catalog.retain(|existing| existing.id != record.id);
        state.catalog.insert(0, record);
    }

    /// Replaces an existing item in place. Returns false for unknown ids.
    pub fn replace_record(&self, record: Record) -> bool {
        let mut state = lock_unpoisoned(&self.state);
        match state
            .catalog
            .iter_mut()
            .find(|existing| existing.id == record.id)
        {
            Some(existing) => {
                *existing = record;
                true
            }
            None => false,
        }
    }

    /// Makes every fetch of `page` fail with [`ClientError::Unavailable`].
    pub fn fail_page(&self, page: Option<usize>) {
        lock_unpoisoned(&self.state).failing_page = page;
    }

    /// Invalidates every issued session.
    pub fn revoke_sessions(&self) {
        lock_unpoisoned(&self.state).sessions.clear();
    }

    #[must_use]
    pub fn login_attempts(&self) -> usize {
        self.login_attempts.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn pages_served(&self) -> usize {
        self.pages_served.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    const DEMO_PAGE_DELAY_MS: u64 = 150;
}

impl Default for MockHistoryService {
    fn default() -> Self {
        Self::demo()
    }
}

impl AuthClient for MockHistoryService {
    fn login(&self, username: &str, secret: &str) -> Option<Session> {
        self.login_attempts.fetch_add(1, Ordering::SeqCst);

        if self.accounts.get(username).map(String::as_str) != Some(secret) {
            debug!(username, "mock login rejected");
            return None;
        }

        let token = Uuid::new_v4().to_string();
        lock_unpoisoned(&self.state)
            .sessions
            .insert(token.clone(), username.to_string());
        debug!(username, "mock session issued");
        Some(Session::new(token, username))
    }
}

impl HistoryClient for MockHistoryService {
    fn fetch_page(
        &self,
        session: &Session,
        kind: StoreKind,
        page: usize,
    ) -> Result<RecordPage, ClientError> {
        if !self.page_delay.is_zero() {
            thread::sleep(self.page_delay);
        }

        let state = lock_unpoisoned(&self.state);
        if state.sessions.get(session.token()).map(String::as_str) != Some(session.username()) {
            return Err(ClientError::SessionRejected);
        }
        if state.failing_page == Some(page) {
            return Err(ClientError::Unavailable(format!(
                "mock failure injected for {kind} page {page}"
            )));
        }

        let total_pages = state.catalog.len().div_ceil(self.page_size).max(1);
        if page >= total_pages {
            return Err(ClientError::PageOutOfRange { page, total_pages });
        }

        let records = state
            .catalog
            .iter()
            .skip(page * self.page_size)
            .take(self.page_size)
            .cloned()
            .collect();
        self.pages_served.fetch_add(1, Ordering::SeqCst);

        Ok(RecordPage {
            records,
            page,
            total_pages,
        })
    }
}

/// Builds a record with the fields the demo catalog and tests care about.
#[must_use]
pub fn record(id: u64, title: &str, year: u16, rating: u8) -> Record {
    Record {
        id,
        title: title.to_string(),
        original_title: String::new(),
        year: Some(year),
        rating,
        favourite: false,
        seen_on: None,
        genres: Vec::new(),
        countries: Vec::new(),
        directors: Vec::new(),
        cast: Vec::new(),
        duration_minutes: None,
        community_rating: None,
        comment: String::new(),
    }
}

fn demo_catalog() -> Vec<Record> {
    const ENTRIES: &[(&str, u16, u8, &str, &str, &str)] = &[
        ("Stalker", 1979, 10, "drama", "USSR", "Andrei Tarkovsky"),
        ("Ran", 1985, 9, "drama", "Japan", "Akira Kurosawa"),
        ("Ikiru", 1952, 9, "drama", "Japan", "Akira Kurosawa"),
        ("Alien", 1979, 8, "horror", "UK", "Ridley Scott"),
        ("Heat", 1995, 8, "crime", "USA", "Michael Mann"),
        ("Amelie", 2001, 7, "comedy", "France", "Jean-Pierre Jeunet"),
        ("Oldboy", 2003, 8, "thriller", "South Korea", "Park Chan-wook"),
        ("Solaris", 1972, 9, "drama", "USSR", "Andrei Tarkovsky"),
        ("Brazil", 1985, 7, "comedy", "UK", "Terry Gilliam"),
        ("Chinatown", 1974, 8, "crime", "USA", "Roman Polanski"),
        ("Persona", 1966, 8, "drama", "Sweden", "Ingmar Bergman"),
        ("Paprika", 2006, 7, "animation", "Japan", "Satoshi Kon"),
        ("Fargo", 1996, 8, "crime", "USA", "Joel Coen"),
        ("Leon", 1994, 0, "thriller", "France", "Luc Besson"),
        ("Vertigo", 1958, 9, "thriller", "USA", "Alfred Hitchcock"),
        ("Mirror", 1975, 0, "drama", "USSR", "Andrei Tarkovsky"),
        ("Akira", 1988, 8, "animation", "Japan", "Katsuhiro Otomo"),
        ("Metropolis", 1927, 7, "sci-fi", "Germany", "Fritz Lang"),
        ("Rashomon", 1950, 9, "drama", "Japan", "Akira Kurosawa"),
        ("Wings of Desire", 1987, 8, "fantasy", "Germany", "Wim Wenders"),
        ("Playtime", 1967, 6, "comedy", "France", "Jacques Tati"),
        ("The Thing", 1982, 8, "horror", "USA", "John Carpenter"),
        ("Yi Yi", 2000, 0, "drama", "Taiwan", "Edward Yang"),
        ("Memories of Murder", 2003, 9, "crime", "South Korea", "Bong Joon-ho"),
    ];

    ENTRIES
        .iter()
        .enumerate()
        .map(|(index, &(title, year, rating, genre, country, director))| {
            let mut record = record(1000 + index as u64, title, year, rating);
            record.favourite = rating == 10;
            record.seen_on = Some(format!("2024-{:02}-{:02}", 12 - index / 2, 28 - index));
            record.genres = vec![genre.to_string()];
            record.countries = vec![country.to_string()];
            record.directors = vec![director.to_string()];
            record.duration_minutes = Some(90 + (index as u16 * 7) % 70);
            record.community_rating = Some(650 + u16::from(rating) * 25);
            record
        })
        .collect()
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
