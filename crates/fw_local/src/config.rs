//! Environment configuration.

use std::env;
use std::path::{Path, PathBuf};

use userdata_store::default_data_file;

pub const DATA_FILE_ENV_VAR: &str = "FW_LOCAL_DATA_FILE";
pub const LOG_FILE_ENV_VAR: &str = "FW_LOCAL_LOG";
pub const DEBUG_ENV_VAR: &str = "FW_LOCAL_DEBUG";
pub const CLIENT_ENV_VAR: &str = "FW_LOCAL_CLIENT";
pub const MOCK_USER_ENV_VAR: &str = "FW_LOCAL_MOCK_USER";
pub const MOCK_PASSWORD_ENV_VAR: &str = "FW_LOCAL_MOCK_PASSWORD";

pub const DEFAULT_MOCK_USER: &str = "demo";
pub const DEFAULT_MOCK_PASSWORD: &str = "demo";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub data_file: PathBuf,
    pub log_file: Option<PathBuf>,
    pub debug: bool,
    pub client_id: Option<String>,
    pub mock_user: String,
    pub mock_password: String,
}

impl AppConfig {
    /// Reads the environment; relative paths resolve against `cwd`.
    pub fn from_env(cwd: &Path) -> Self {
        let data_file = env_string_opt(DATA_FILE_ENV_VAR)
            .map(|path| cwd.join(path))
            .unwrap_or_else(|| default_data_file(cwd));

        Self {
            data_file,
            log_file: env_string_opt(LOG_FILE_ENV_VAR).map(|path| cwd.join(path)),
            debug: env_flag(DEBUG_ENV_VAR),
            client_id: env_string_opt(CLIENT_ENV_VAR).map(|value| value.trim().to_string()),
            mock_user: env_string_opt(MOCK_USER_ENV_VAR)
                .unwrap_or_else(|| DEFAULT_MOCK_USER.to_string()),
            mock_password: env_string_opt(MOCK_PASSWORD_ENV_VAR)
                .unwrap_or_else(|| DEFAULT_MOCK_PASSWORD.to_string()),
        }
    }
}

fn env_flag(key: &str) -> bool {
    env::var(key).map(|value| value == "1").unwrap_or(false)
}

fn env_string_opt(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        if value.trim().is_empty() {
            None
        } else {
            Some(value)
        }
    })
}
