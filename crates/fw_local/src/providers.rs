use std::sync::Arc;

use fwl_client::{AuthClient, ClientInitError, HistoryClient};
use fwl_client_mock::MockHistoryService;

use crate::config::AppConfig;

pub const DEFAULT_CLIENT_ID: &str = "mock";

/// Authentication and history halves of one service client.
#[derive(Clone)]
pub struct ClientPair {
    pub auth: Arc<dyn AuthClient>,
    pub history: Arc<dyn HistoryClient>,
}

pub fn client_from_config(config: &AppConfig) -> Result<ClientPair, ClientInitError> {
    client_for_id(
        config.client_id.as_deref().unwrap_or(DEFAULT_CLIENT_ID),
        config,
    )
}

pub fn client_for_id(client_id: &str, config: &AppConfig) -> Result<ClientPair, ClientInitError> {
    match client_id {
        DEFAULT_CLIENT_ID => {
            let service = Arc::new(
                MockHistoryService::demo()
                    .with_account(config.mock_user.clone(), config.mock_password.clone()),
            );
            Ok(ClientPair {
                auth: service.clone(),
                history: service,
            })
        }
        unknown => Err(ClientInitError::new(format!(
            "Unsupported client '{unknown}'. Available clients: {DEFAULT_CLIENT_ID}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn config() -> AppConfig {
        AppConfig {
            data_file: PathBuf::from("userdata.fws"),
            log_file: None,
            debug: false,
            client_id: None,
            mock_user: "alice".to_string(),
            mock_password: "pw".to_string(),
        }
    }

    #[test]
    fn mock_client_accepts_configured_account() {
        let client = client_from_config(&config()).expect("mock client should resolve");
        assert!(client.auth.login("alice", "pw").is_some());
        assert!(client.auth.login("alice", "wrong").is_none());
    }

    #[test]
    fn client_for_id_rejects_unknown_client() {
        let error = match client_for_id("remote", &config()) {
            Ok(_) => panic!("unknown clients should fail"),
            Err(error) => error,
        };

        assert!(error.message().contains("Unsupported client 'remote'"));
    }
}
