use std::io::{self, Write};

use tracing::warn;

use crate::error::UserDataError;

pub const CURRENT_VERSION: &str = "1.0-alpha.5";
pub const COMMENT_MARKER: char = '#';
pub const VERSION_MARKER: &str = "#VERSION";
pub const USERNAME_MARKER: &str = "#USERNAME";
pub const MOVIES_MARKER: &str = "#MOVIES";

/// Payload lines of a data file, in file order, with comment lines removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawUserData {
    lines: Vec<String>,
}

impl RawUserData {
    #[must_use]
    pub fn new(lines: Vec<String>) -> Self {
        Self { lines }
    }

    #[must_use]
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    #[must_use]
    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }
}

/// Everything a checkpoint writes.
///
/// `filter_config` and `records` are owned by the presentation layer and the
/// record store respectively; this crate never looks inside them. The filter
/// configuration occupies exactly one line, the record blob takes the rest of
/// the file. Blob lines starting with `#` do not survive a load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedState {
    pub version: String,
    pub username: String,
    pub filter_config: String,
    pub records: String,
}

impl PersistedState {
    /// Builds a state stamped with [`CURRENT_VERSION`].
    #[must_use]
    pub fn new(
        username: impl Into<String>,
        filter_config: impl Into<String>,
        records: impl Into<String>,
    ) -> Self {
        Self {
            version: CURRENT_VERSION.to_string(),
            username: username.into(),
            filter_config: filter_config.into(),
            records: records.into(),
        }
    }

    /// Interprets loaded payload lines. Missing sections read as empty strings.
    #[must_use]
    pub fn from_lines(lines: &[String]) -> Self {
        let line = |index: usize| lines.get(index).cloned().unwrap_or_default();

        Self {
            version: line(0),
            username: line(1),
            filter_config: line(2),
            records: lines.get(3..).map(|rest| rest.join("\n")).unwrap_or_default(),
        }
    }

    /// True when a session was established at some point, i.e. there is
    /// something worth persisting.
    #[must_use]
    pub fn has_identity(&self) -> bool {
        !self.username.is_empty()
    }

    #[must_use]
    pub fn is_current_version(&self) -> bool {
        self.version == CURRENT_VERSION
    }

    /// Checks that every single-line section reads back as written.
    ///
    /// A version or username that spans lines or starts with `#` would shift
    /// the sections after it on load, so it is rejected. The filter
    /// configuration belongs to the caller and only gets a warning.
    pub fn validate(&self) -> Result<(), UserDataError> {
        for (field, value) in [("version", &self.version), ("username", &self.username)] {
            if let Some(reason) = line_problem(value) {
                return Err(UserDataError::UnencodableField { field, reason });
            }
        }
        if let Some(reason) = line_problem(&self.filter_config) {
            warn!(reason, "filter configuration will not load back intact");
        }
        Ok(())
    }

    pub(crate) fn encode_into(&self, out: &mut dyn Write) -> io::Result<()> {
        for line in [
            VERSION_MARKER,
            self.version.as_str(),
            USERNAME_MARKER,
            self.username.as_str(),
            MOVIES_MARKER,
            self.filter_config.as_str(),
            self.records.as_str(),
        ] {
            out.write_all(line.as_bytes())?;
            out.write_all(b"\n")?;
        }

        Ok(())
    }
}

fn line_problem(value: &str) -> Option<&'static str> {
    if value.contains('\n') {
        Some("contains a line break")
    } else if value.starts_with(COMMENT_MARKER) {
        Some("starts with the comment marker '#'")
    } else {
        None
    }
}

impl From<RawUserData> for PersistedState {
    fn from(raw: RawUserData) -> Self {
        Self::from_lines(raw.lines())
    }
}
