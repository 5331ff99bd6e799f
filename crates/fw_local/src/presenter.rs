//! List presentation: filters over a cached copy of the store and the rows they leave.

use fwl_client::{FilterKind, FilterLayout, Presenter, Record, RecordStore, ViewRow};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Filters registered at startup, in grid order.
pub fn default_filters() -> [(FilterKind, FilterLayout); 6] {
    [
        (FilterKind::Year, FilterLayout::at(0, 0)),
        (FilterKind::Rating, FilterLayout::at(1, 0)),
        (FilterKind::Date, FilterLayout::at(2, 0)),
        (FilterKind::Genre, FilterLayout::at(0, 1).spanning(3)),
        (FilterKind::Country, FilterLayout::at(0, 2).spanning(3)),
        (FilterKind::Director, FilterLayout::at(0, 3).spanning(3)),
    ]
}

/// How a genre list is compared with a record's genres.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenreMode {
    /// At least one of the listed genres.
    AnyOf,
    /// Every listed genre, others allowed.
    AllOf,
    /// Exactly the listed genres and none more.
    Exactly,
}

impl GenreMode {
    fn prefix(self) -> &'static str {
        match self {
            Self::AnyOf => "any",
            Self::AllOf => "all",
            Self::Exactly => "exactly",
        }
    }
}

/// Parsed filter value.
///
/// Text forms, as typed in the filter editor:
/// - year, rating: `1990..2000`, `1990..`, `..2000`, or `1995` for a single value;
/// - date seen: the same ranges over `YYYY`, `YYYY-MM` or `YYYY-MM-DD`; a
///   shorter upper bound covers the whole year or month;
/// - genre: `any: Drama, Crime` (the default without a prefix), `all: ..` or
///   `exactly: ..`;
/// - country, director: one name, matched exactly ignoring case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum FilterRule {
    Year { from: Option<u16>, to: Option<u16> },
    Rating { from: Option<u8>, to: Option<u8> },
    Seen { from: Option<String>, to: Option<String> },
    Genres { mode: GenreMode, genres: Vec<String> },
    Country { name: String },
    Director { name: String },
}

impl FilterRule {
    pub fn parse(kind: FilterKind, text: &str) -> Result<Self, String> {
        let text = text.trim();
        match kind {
            FilterKind::Year => {
                let (from, to) = parse_range(text, |end| end.parse::<u16>().ok())?;
                Ok(Self::Year { from, to })
            }
            FilterKind::Rating => {
                let (from, to) = parse_range(text, |end| {
                    end.parse::<u8>().ok().filter(|rating| *rating <= 10)
                })?;
                Ok(Self::Rating { from, to })
            }
            FilterKind::Date => {
                let (from, to) =
                    parse_range(text, |end| is_iso_date_prefix(end).then(|| end.to_string()))?;
                Ok(Self::Seen { from, to })
            }
            FilterKind::Genre => {
                let (mode, list) = match text.split_once(':') {
                    Some((prefix, list)) => {
                        let mode = match prefix.trim().to_lowercase().as_str() {
                            "any" => GenreMode::AnyOf,
                            "all" => GenreMode::AllOf,
                            "exactly" => GenreMode::Exactly,
                            other => return Err(format!("unknown genre mode '{other}'")),
                        };
                        (mode, list)
                    }
                    None => (GenreMode::AnyOf, text),
                };
                let genres: Vec<String> = list
                    .split(',')
                    .map(str::trim)
                    .filter(|genre| !genre.is_empty())
                    .map(str::to_string)
                    .collect();
                if genres.is_empty() {
                    return Err(format!("no genres given for '{}'", mode.prefix()));
                }
                Ok(Self::Genres { mode, genres })
            }
            FilterKind::Country | FilterKind::Director if text.is_empty() => {
                Err("empty name".to_string())
            }
            FilterKind::Country => Ok(Self::Country {
                name: text.to_string(),
            }),
            FilterKind::Director => Ok(Self::Director {
                name: text.to_string(),
            }),
        }
    }

    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Self::Year { from, to } => record
                .year
                .is_some_and(|year| in_range(year, *from, *to)),
            Self::Rating { from, to } => in_range(record.rating, *from, *to),
            Self::Seen { from, to } => record.seen_on.as_deref().is_some_and(|seen| {
                from.as_deref().map_or(true, |from| seen >= from)
                    && to.as_deref().map_or(true, |to| {
                        seen.get(..to.len()).unwrap_or(seen) <= to
                    })
            }),
            Self::Genres { mode, genres } => {
                let has = |genre: &String| contains_folded(&record.genres, genre);
                match mode {
                    GenreMode::AnyOf => genres.iter().any(has),
                    GenreMode::AllOf => genres.iter().all(has),
                    GenreMode::Exactly => {
                        genres.iter().all(has) && genres.len() == record.genres.len()
                    }
                }
            }
            Self::Country { name } => contains_folded(&record.countries, name),
            Self::Director { name } => contains_folded(&record.directors, name),
        }
    }
}

fn parse_range<T: Clone>(
    text: &str,
    parse_end: impl Fn(&str) -> Option<T>,
) -> Result<(Option<T>, Option<T>), String> {
    let end = |part: &str| -> Result<Option<T>, String> {
        let part = part.trim();
        if part.is_empty() {
            return Ok(None);
        }
        parse_end(part)
            .map(Some)
            .ok_or_else(|| format!("invalid bound '{part}'"))
    };
    match text.split_once("..") {
        Some((from, to)) => {
            let range = (end(from)?, end(to)?);
            if range.0.is_none() && range.1.is_none() {
                return Err("range needs at least one bound".to_string());
            }
            Ok(range)
        }
        None => match end(text)? {
            Some(value) => Ok((Some(value.clone()), Some(value))),
            None => Err("empty value".to_string()),
        },
    }
}

fn in_range<T: PartialOrd>(value: T, from: Option<T>, to: Option<T>) -> bool {
    from.map_or(true, |from| value >= from) && to.map_or(true, |to| value <= to)
}

/// `YYYY`, `YYYY-MM` or `YYYY-MM-DD`.
fn is_iso_date_prefix(text: &str) -> bool {
    let parts: Vec<&str> = text.split('-').collect();
    let widths = [4, 2, 2];
    !parts.is_empty()
        && parts.len() <= widths.len()
        && parts
            .iter()
            .zip(widths)
            .all(|(part, width)| part.len() == width && part.bytes().all(|b| b.is_ascii_digit()))
}

struct Filter {
    kind: FilterKind,
    layout: FilterLayout,
    value: Option<String>,
    // `None` while the value is unset or could not be parsed.
    rule: Option<FilterRule>,
}

impl Filter {
    fn new(kind: FilterKind, layout: FilterLayout) -> Self {
        Self {
            kind,
            layout,
            value: None,
            rule: None,
        }
    }

    fn set_value(&mut self, value: Option<String>) {
        self.rule = value.as_deref().and_then(|text| {
            FilterRule::parse(self.kind, text)
                .map_err(|error| {
                    warn!(filter = self.kind.label(), %error, "ignoring filter value");
                })
                .ok()
        });
        self.value = value;
    }

    fn matches(&self, record: &Record) -> bool {
        self.rule.as_ref().map_or(true, |rule| rule.matches(record))
    }
}

fn contains_folded(values: &[String], wanted: &str) -> bool {
    let wanted = wanted.trim().to_lowercase();
    values.iter().any(|value| value.to_lowercase() == wanted)
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredFilter {
    kind: FilterKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    rule: Option<FilterRule>,
}

/// Default [`Presenter`]. Its blob is a single JSON line of filter values.
#[derive(Default)]
pub struct ListPresenter {
    filters: Vec<Filter>,
    // Values restored before their filter was registered.
    restored: Vec<StoredFilter>,
    cache: Vec<Record>,
    rows: Vec<ViewRow>,
}

impl ListPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a blob produced by [`Presenter::store_to_string`]. An empty or
    /// unreadable blob yields a presenter without saved filter values.
    pub fn restore_from_string(blob: &str) -> Self {
        let blob = blob.trim();
        let restored = if blob.is_empty() {
            Vec::new()
        } else {
            match serde_json::from_str::<Vec<StoredFilter>>(blob) {
                Ok(restored) => restored,
                Err(err) => {
                    warn!(error = %err, "ignoring unreadable filter configuration");
                    Vec::new()
                }
            }
        };
        Self {
            restored,
            ..Self::default()
        }
    }

    pub fn layout(&self, kind: FilterKind) -> Option<FilterLayout> {
        self.filter(kind).map(|filter| filter.layout)
    }

    pub fn registered_filters(&self) -> Vec<FilterKind> {
        self.filters.iter().map(|filter| filter.kind).collect()
    }

    fn filter(&self, kind: FilterKind) -> Option<&Filter> {
        self.filters.iter().find(|filter| filter.kind == kind)
    }

    fn derive_rows(&mut self) {
        self.rows = self
            .cache
            .iter()
            .filter(|record| self.filters.iter().all(|filter| filter.matches(record)))
            .map(|record| ViewRow {
                record_id: record.id,
                text: row_text(record),
            })
            .collect();
    }
}

fn row_text(record: &Record) -> String {
    let mut text = record.title.clone();
    if let Some(year) = record.year {
        text.push_str(&format!(" ({year})"));
    }
    if record.rating > 0 {
        text.push_str(&format!("  {}/10", record.rating));
    }
    if record.favourite {
        text.push_str("  ♥");
    }
    if let Some(seen) = record.seen_on.as_deref() {
        text.push_str(&format!("  seen {seen}"));
    }
    text
}

impl Presenter for ListPresenter {
    fn total_update(&mut self, store: &dyn RecordStore) {
        self.cache = store.records().to_vec();
        self.derive_rows();
    }

    fn store_to_string(&self) -> String {
        let stored: Vec<StoredFilter> = self
            .filters
            .iter()
            .map(|filter| StoredFilter {
                kind: filter.kind,
                value: filter.value.clone(),
                rule: filter.rule.clone(),
            })
            .collect();
        serde_json::to_string(&stored).unwrap_or_default()
    }

    fn add_filter(&mut self, kind: FilterKind, layout: FilterLayout) {
        if let Some(filter) = self.filters.iter_mut().find(|filter| filter.kind == kind) {
            filter.layout = layout;
            return;
        }
        let mut filter = Filter::new(kind, layout);
        if let Some(position) = self.restored.iter().position(|stored| stored.kind == kind) {
            let stored = self.restored.swap_remove(position);
            match stored.rule {
                Some(rule) => {
                    filter.value = stored.value;
                    filter.rule = Some(rule);
                }
                None => filter.set_value(stored.value),
            }
        }
        self.filters.push(filter);
        self.derive_rows();
    }

    fn set_filter(&mut self, kind: FilterKind, value: Option<String>) {
        let value = value
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        match self.filters.iter_mut().find(|filter| filter.kind == kind) {
            Some(filter) => filter.set_value(value),
            None => {
                warn!(filter = kind.label(), "value set for an unregistered filter");
                return;
            }
        }
        self.derive_rows();
    }

    fn filter_value(&self, kind: FilterKind) -> Option<&str> {
        self.filter(kind).and_then(|filter| filter.value.as_deref())
    }

    fn view_rows(&self) -> Vec<ViewRow> {
        self.rows.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fwl_client::{RecordStoreError, StoreKind};
    use fwl_client_mock::record;

    struct FixedStore(Vec<Record>);

    impl RecordStore for FixedStore {
        fn kind(&self) -> StoreKind {
            StoreKind::Movie
        }

        fn soft_update(&mut self) -> Result<(), RecordStoreError> {
            Ok(())
        }

        fn hard_update(&mut self) -> Result<(), RecordStoreError> {
            Ok(())
        }

        fn get_by_id(&self, id: u64) -> Option<&Record> {
            self.0.iter().find(|record| record.id == id)
        }

        fn records(&self) -> &[Record] {
            &self.0
        }

        fn store_to_string(&self) -> String {
            String::new()
        }
    }

    fn store() -> FixedStore {
        let mut stalker = record(1, "Stalker", 1979, 9);
        stalker.genres = vec!["Sci-Fi".into(), "Drama".into()];
        stalker.directors = vec!["Andrei Tarkovsky".into()];
        stalker.seen_on = Some("2023-05-14".into());
        let mut heat = record(2, "Heat", 1995, 7);
        heat.genres = vec!["Crime".into()];
        heat.seen_on = Some("2024-01-02".into());
        heat.countries = vec!["USA".into()];
        FixedStore(vec![stalker, heat, record(3, "Unrated", 2001, 0)])
    }

    fn presenter() -> ListPresenter {
        let mut presenter = ListPresenter::new();
        for (kind, layout) in default_filters() {
            presenter.add_filter(kind, layout);
        }
        presenter.total_update(&store());
        presenter
    }

    fn ids(presenter: &ListPresenter) -> Vec<u64> {
        presenter.view_rows().iter().map(|row| row.record_id).collect()
    }

    #[test]
    fn default_filters_use_the_grid_layout() {
        let presenter = presenter();
        assert_eq!(presenter.registered_filters(), FilterKind::ALL.to_vec());
        assert_eq!(presenter.layout(FilterKind::Date), Some(FilterLayout::at(2, 0)));
        assert_eq!(
            presenter.layout(FilterKind::Director),
            Some(FilterLayout::at(0, 3).spanning(3))
        );
    }

    #[test]
    fn no_filter_values_show_everything_in_store_order() {
        assert_eq!(ids(&presenter()), vec![1, 2, 3]);
    }

    fn ids_with(kind: FilterKind, value: &str) -> Vec<u64> {
        let mut presenter = presenter();
        presenter.set_filter(kind, Some(value.to_string()));
        ids(&presenter)
    }

    #[test]
    fn year_filter_takes_open_and_closed_ranges() {
        assert_eq!(ids_with(FilterKind::Year, "1990..2001"), vec![2, 3]);
        assert_eq!(ids_with(FilterKind::Year, "1990.."), vec![2, 3]);
        assert_eq!(ids_with(FilterKind::Year, "..1990"), vec![1]);
        assert_eq!(ids_with(FilterKind::Year, "1995"), vec![2]);
    }

    #[test]
    fn rating_filter_bounds_are_inclusive() {
        assert_eq!(ids_with(FilterKind::Rating, "7.."), vec![1, 2]);
        assert_eq!(ids_with(FilterKind::Rating, "..7"), vec![2, 3]);
        assert_eq!(ids_with(FilterKind::Rating, "1..8"), vec![2]);
        assert_eq!(ids_with(FilterKind::Rating, "0"), vec![3]);
    }

    #[test]
    fn seen_filter_compares_dates_and_short_upper_bounds_cover_the_period() {
        assert_eq!(ids_with(FilterKind::Date, "2023..2023"), vec![1]);
        assert_eq!(ids_with(FilterKind::Date, "2023-06.."), vec![2]);
        assert_eq!(ids_with(FilterKind::Date, "..2023-05"), vec![1]);
        assert_eq!(ids_with(FilterKind::Date, "2024-01-02"), vec![2]);
    }

    #[test]
    fn genre_filter_modes() {
        assert_eq!(ids_with(FilterKind::Genre, "drama"), vec![1]);
        assert_eq!(ids_with(FilterKind::Genre, "any: Crime, Drama"), vec![1, 2]);
        assert_eq!(ids_with(FilterKind::Genre, "all: Drama, Sci-Fi"), vec![1]);
        assert_eq!(ids_with(FilterKind::Genre, "all: Drama, Crime"), Vec::<u64>::new());
        assert_eq!(ids_with(FilterKind::Genre, "exactly: Drama"), Vec::<u64>::new());
        assert_eq!(ids_with(FilterKind::Genre, "exactly: sci-fi, drama"), vec![1]);
    }

    #[test]
    fn country_and_director_match_whole_names() {
        assert_eq!(ids_with(FilterKind::Director, "tarkovsky"), Vec::<u64>::new());
        assert_eq!(ids_with(FilterKind::Director, "andrei tarkovsky"), vec![1]);
        assert_eq!(ids_with(FilterKind::Country, "usa"), vec![2]);
    }

    #[test]
    fn filters_combine() {
        let mut presenter = presenter();
        presenter.set_filter(FilterKind::Rating, Some("7..".into()));
        assert_eq!(ids(&presenter), vec![1, 2]);

        presenter.set_filter(FilterKind::Genre, Some("drama".into()));
        assert_eq!(ids(&presenter), vec![1]);

        presenter.set_filter(FilterKind::Genre, Some("  ".into()));
        presenter.set_filter(FilterKind::Date, Some("2024".into()));
        assert_eq!(ids(&presenter), vec![2]);
    }

    #[test]
    fn unparsable_values_are_kept_but_filter_nothing() {
        let mut presenter = presenter();
        presenter.set_filter(FilterKind::Year, Some("nineties".into()));
        assert_eq!(presenter.filter_value(FilterKind::Year), Some("nineties"));
        assert_eq!(ids(&presenter), vec![1, 2, 3]);
    }

    #[test]
    fn rule_parsing_rejects_bad_bounds_and_modes() {
        assert_eq!(
            FilterRule::parse(FilterKind::Year, " 1990..2000 "),
            Ok(FilterRule::Year {
                from: Some(1990),
                to: Some(2000),
            })
        );
        assert!(FilterRule::parse(FilterKind::Rating, "11").is_err());
        assert!(FilterRule::parse(FilterKind::Rating, "..").is_err());
        assert!(FilterRule::parse(FilterKind::Date, "2023-5").is_err());
        assert!(FilterRule::parse(FilterKind::Genre, "sometimes: Drama").is_err());
        assert!(FilterRule::parse(FilterKind::Genre, "all:").is_err());
    }

    #[test]
    fn blob_is_single_line_and_carries_parsed_rules() {
        let mut presenter = presenter();
        presenter.set_filter(FilterKind::Genre, Some("all: Drama, Sci-Fi".into()));
        presenter.set_filter(FilterKind::Year, Some("..1990".into()));
        let blob = presenter.store_to_string();
        assert!(!blob.contains('\n'));
        assert!(blob.contains(r#""mode":"all_of""#));
        assert!(blob.contains(r#""genres":["Drama","Sci-Fi"]"#));
        assert!(blob.contains(r#""rule":"year","from":null,"to":1990"#));

        let mut restored = ListPresenter::restore_from_string(&blob);
        for (kind, layout) in default_filters() {
            restored.add_filter(kind, layout);
        }
        restored.total_update(&store());

        assert_eq!(restored.filter_value(FilterKind::Genre), Some("all: Drama, Sci-Fi"));
        assert_eq!(ids(&restored), vec![1]);
    }

    #[test]
    fn blob_without_rules_is_reparsed_from_values() {
        let mut restored =
            ListPresenter::restore_from_string(r#"[{"kind":"rating","value":"8.."}]"#);
        for (kind, layout) in default_filters() {
            restored.add_filter(kind, layout);
        }
        restored.total_update(&store());
        assert_eq!(ids(&restored), vec![1]);
    }

    #[test]
    fn unreadable_blob_falls_back_to_no_values() {
        let mut restored = ListPresenter::restore_from_string("{not json");
        restored.add_filter(FilterKind::Year, FilterLayout::at(0, 0));
        assert_eq!(restored.filter_value(FilterKind::Year), None);
    }

    #[test]
    fn row_text_shows_year_rating_and_date() {
        let presenter = presenter();
        assert_eq!(
            presenter.view_rows()[0].text,
            "Stalker (1979)  9/10  seen 2023-05-14"
        );
        assert_eq!(presenter.view_rows()[2].text, "Unrated (2001)");
    }
}
