//! ============================================================================
//! TON Explorer Client - Recent transactions for the receiver wallet
//! ============================================================================
//! The payment confirmation flow only needs one capability from the chain:
//! "list recent incoming transactions for an address". The trait keeps the
//! flow testable; [`TonCenterClient`] is the production implementation
//! against a toncenter-style HTTP API.
//! ============================================================================

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::{PlatformError, Result};

/// One incoming transfer observed on the receiver wallet
#[derive(Debug, Clone)]
pub struct TonTransaction {
    /// On-chain transaction hash
    pub transaction_id: String,
    /// Sender address, if the message carries one
    pub source: Option<String>,
    /// Transfer value in nanoton
    pub value_nanoton: u64,
    /// Text comment attached to the transfer (the payment memo lives here)
    pub comment: Option<String>,
    /// Unix timestamp of the transaction
    pub timestamp: i64,
}

/// Chain-explorer interface consumed by the payment confirmation flow
#[async_trait]
pub trait TonExplorer: Send + Sync {
    /// List the most recent transactions for `address`, newest first,
    /// bounded by `limit`
    async fn recent_transactions(&self, address: &str, limit: u32) -> Result<Vec<TonTransaction>>;
}

/// HTTP client for a toncenter-style explorer API
pub struct TonCenterClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl TonCenterClient {
    pub fn new(base_url: &str, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }
}

#[async_trait]
impl TonExplorer for TonCenterClient {
    async fn recent_transactions(&self, address: &str, limit: u32) -> Result<Vec<TonTransaction>> {
        let url = format!(
            "{}/getTransactions?address={}&limit={}",
            self.base_url, address, limit
        );
        debug!("Explorer query: {}", url);

        let mut request = self.client.get(&url);
        if let Some(key) = &self.api_key {
            request = request.header("X-API-Key", key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PlatformError::external(format!("Failed to query explorer: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PlatformError::external(format!(
                "Explorer error {}: {}",
                status, body
            )));
        }

        let parsed: TonCenterResponse = response
            .json()
            .await
            .map_err(|e| PlatformError::external(format!("Failed to parse explorer response: {}", e)))?;

        if !parsed.ok {
            return Err(PlatformError::external("Explorer returned ok=false"));
        }

        Ok(parsed.result.into_iter().map(TonTransaction::from).collect())
    }
}

// ============================================================================
// toncenter API Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct TonCenterResponse {
    ok: bool,
    #[serde(default)]
    result: Vec<TonCenterTransaction>,
}

#[derive(Debug, Deserialize)]
struct TonCenterTransaction {
    transaction_id: TonCenterTxId,
    #[serde(default)]
    utime: i64,
    in_msg: Option<TonCenterMessage>,
}

#[derive(Debug, Deserialize)]
struct TonCenterTxId {
    hash: String,
}

#[derive(Debug, Deserialize)]
struct TonCenterMessage {
    #[serde(default)]
    source: String,
    #[serde(default)]
    value: String,
    message: Option<String>,
}

impl From<TonCenterTransaction> for TonTransaction {
    fn from(tx: TonCenterTransaction) -> Self {
        let (source, value_nanoton, comment) = match tx.in_msg {
            Some(msg) => (
                if msg.source.is_empty() { None } else { Some(msg.source) },
                msg.value.parse().unwrap_or(0),
                msg.message,
            ),
            None => (None, 0, None),
        };
        TonTransaction {
            transaction_id: tx.transaction_id.hash,
            source,
            value_nanoton,
            comment,
            timestamp: tx.utime,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_toncenter_payload() {
        let raw = serde_json::json!({
            "ok": true,
            "result": [
                {
                    "transaction_id": { "hash": "abc123", "lt": "1234567" },
                    "utime": 1_722_000_000,
                    "in_msg": {
                        "source": "EQSender",
                        "destination": "EQReceiver",
                        "value": "5000000000",
                        "message": "payment_id:feed-beef"
                    }
                },
                {
                    "transaction_id": { "hash": "def456" },
                    "utime": 1_721_999_000,
                    "in_msg": { "source": "", "value": "not-a-number", "message": null }
                }
            ]
        });

        let parsed: TonCenterResponse = serde_json::from_value(raw).unwrap();
        assert!(parsed.ok);

        let txs: Vec<TonTransaction> = parsed.result.into_iter().map(TonTransaction::from).collect();
        assert_eq!(txs[0].transaction_id, "abc123");
        assert_eq!(txs[0].value_nanoton, 5_000_000_000);
        assert_eq!(txs[0].comment.as_deref(), Some("payment_id:feed-beef"));
        assert_eq!(txs[0].source.as_deref(), Some("EQSender"));

        assert_eq!(txs[1].value_nanoton, 0);
        assert!(txs[1].comment.is_none());
        assert!(txs[1].source.is_none());
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = TonCenterClient::new("https://toncenter.com/api/v2/", None);
        assert_eq!(client.base_url, "https://toncenter.com/api/v2");
    }
}
