//! ============================================================================
//! Platform Configuration - Environment-driven settings
//! ============================================================================
//! Loaded once at startup by the binaries (after dotenvy has pulled in any
//! .env file). Everything has a sane default except the receiver wallet,
//! which payment initiation refuses to run without.
//! ============================================================================

use std::sync::Arc;
use tracing::warn;

use crate::tasks::policy::{AllowListAutoVerify, AutoVerifyPolicy, NoAutoVerify};

/// Default bind address for the HTTP server
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";

/// Default toncenter-style explorer endpoint
pub const DEFAULT_EXPLORER_URL: &str = "https://toncenter.com/api/v2";

/// Platform configuration
#[derive(Debug, Clone)]
pub struct PlatformConfig {
    /// Database file path (None = ONLYVIPS_DB_PATH or the home default)
    pub db_path: Option<String>,
    /// host:port for the HTTP server
    pub bind_addr: String,
    /// Operator-controlled TON wallet receiving all payments
    pub receiver_wallet: String,
    /// Chain-explorer API base URL
    pub explorer_base_url: String,
    /// Optional explorer API key
    pub explorer_api_key: Option<String>,
    /// Task ids auto-verified on first attempt. Development only — leave
    /// empty in production.
    pub auto_verify_task_ids: Vec<u32>,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            receiver_wallet: String::new(),
            explorer_base_url: DEFAULT_EXPLORER_URL.to_string(),
            explorer_api_key: None,
            auto_verify_task_ids: Vec::new(),
        }
    }
}

impl PlatformConfig {
    /// Build the configuration from environment variables
    pub fn from_env() -> Self {
        let auto_verify_task_ids = std::env::var("ONLYVIPS_DEV_AUTO_VERIFY")
            .map(|raw| parse_task_id_list(&raw))
            .unwrap_or_default();

        Self {
            db_path: std::env::var("ONLYVIPS_DB_PATH").ok(),
            bind_addr: std::env::var("ONLYVIPS_BIND")
                .unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string()),
            receiver_wallet: std::env::var("TON_RECEIVER_WALLET").unwrap_or_default(),
            explorer_base_url: std::env::var("TON_EXPLORER_URL")
                .unwrap_or_else(|_| DEFAULT_EXPLORER_URL.to_string()),
            explorer_api_key: std::env::var("TON_EXPLORER_API_KEY").ok(),
            auto_verify_task_ids,
        }
    }

    /// Auto-verify strategy matching this configuration: a no-op unless a
    /// development allow-list was provided
    pub fn auto_verify_policy(&self) -> Arc<dyn AutoVerifyPolicy> {
        if self.auto_verify_task_ids.is_empty() {
            Arc::new(NoAutoVerify)
        } else {
            Arc::new(AllowListAutoVerify::new(self.auto_verify_task_ids.iter().copied()))
        }
    }
}

/// Parse a comma-separated task id list, skipping malformed entries
fn parse_task_id_list(raw: &str) -> Vec<u32> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| match s.parse() {
            Ok(id) => Some(id),
            Err(_) => {
                warn!("Ignoring malformed task id in auto-verify list: {:?}", s);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_task_id_list() {
        assert_eq!(parse_task_id_list("3"), vec![3]);
        assert_eq!(parse_task_id_list("3, 4,5"), vec![3, 4, 5]);
        assert_eq!(parse_task_id_list(""), Vec::<u32>::new());
        assert_eq!(parse_task_id_list("3,abc,4"), vec![3, 4]);
    }

    #[test]
    fn test_default_policy_is_noop() {
        let config = PlatformConfig::default();
        assert!(!config.auto_verify_policy().auto_verify(3));
    }

    #[test]
    fn test_allow_list_policy_from_config() {
        let config = PlatformConfig {
            auto_verify_task_ids: vec![3],
            ..Default::default()
        };
        let policy = config.auto_verify_policy();
        assert!(policy.auto_verify(3));
        assert!(!policy.auto_verify(4));
    }
}
