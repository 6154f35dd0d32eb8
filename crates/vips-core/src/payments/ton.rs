//! ============================================================================
//! TON Payment Flow - Intent creation and client-driven confirmation
//! ============================================================================
//! Initiation stores a pending intent and hands the miniapp a `ton://`
//! transfer URI whose text field carries the `payment_id:{id}` memo — the
//! wire contract the confirmation scan matches against, byte for byte.
//!
//! Confirmation is client-driven polling: each status check performs at
//! most one bounded explorer query. Completed intents short-circuit before
//! the explorer is touched, and settlement is a conditional update inside
//! one store transaction, so the ledger is credited at most once per
//! intent no matter how often the client polls.
//! ============================================================================

use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::db::types::PaymentIntent;
use crate::db::PlatformDb;
use crate::error::{PlatformError, Result};
use crate::payments::explorer::TonExplorer;
use crate::types::{ItemKind, PaymentStatus};

/// Nanoton per TON (the chain's smallest unit)
pub const NANOTON_PER_TON: u64 = 1_000_000_000;

/// Memo prefix correlating an on-chain transfer to a payment intent.
/// Must match the confirmation scan exactly.
pub const PAYMENT_MEMO_PREFIX: &str = "payment_id:";

/// Advisory expiry window for a payment intent. No sweep enforces it:
/// a transfer landing after this deadline still settles.
pub const PAYMENT_EXPIRY_SECS: i64 = 30 * 60;

/// How many recent wallet transactions each confirmation check scans
const CONFIRMATION_SCAN_LIMIT: u32 = 10;

/// The memo embedded in the transfer's text field
pub fn payment_memo(payment_id: &str) -> String {
    format!("{}{}", PAYMENT_MEMO_PREFIX, payment_id)
}

/// `ton://` transfer URI, also used directly as the QR payload
pub fn transfer_uri(receiver: &str, amount_nanoton: u64, memo: &str) -> String {
    format!("ton://transfer/{}?amount={}&text={}", receiver, amount_nanoton, memo)
}

/// What the miniapp needs to present a payment request
#[derive(Debug, Clone)]
pub struct PaymentInitiation {
    pub payment_id: String,
    pub ton_pay_url: String,
    pub qr_data: String,
    pub expires_at: i64,
}

/// TON payment initiation and confirmation
pub struct TonPaymentFlow {
    db: Arc<PlatformDb>,
    explorer: Arc<dyn TonExplorer>,
    receiver_wallet: String,
}

impl TonPaymentFlow {
    pub fn new(db: Arc<PlatformDb>, explorer: Arc<dyn TonExplorer>, receiver_wallet: impl Into<String>) -> Self {
        Self {
            db,
            explorer,
            receiver_wallet: receiver_wallet.into(),
        }
    }

    /// Create a pending payment intent and build the transfer URI
    pub fn initiate(
        &self,
        telegram_id: i64,
        amount_ton: f64,
        item_kind: ItemKind,
        item_id: &str,
    ) -> Result<PaymentInitiation> {
        if !(amount_ton > 0.0) || !amount_ton.is_finite() {
            return Err(PlatformError::validation(format!(
                "Payment amount must be positive, got {}",
                amount_ton
            )));
        }
        if self.receiver_wallet.is_empty() {
            return Err(PlatformError::validation("Receiver wallet is not configured"));
        }
        self.db
            .get_user(telegram_id)?
            .ok_or_else(|| PlatformError::not_found(format!("User not found: {}", telegram_id)))?;

        let now = chrono::Utc::now().timestamp();
        let payment = PaymentIntent {
            payment_id: Uuid::new_v4().to_string(),
            telegram_id,
            amount_ton,
            currency: "TON".to_string(),
            status: PaymentStatus::Pending,
            item_kind,
            item_id: item_id.to_string(),
            transaction_id: None,
            created_at: now,
            updated_at: now,
        };
        self.db.store_payment(&payment)?;

        let memo = payment_memo(&payment.payment_id);
        let amount_nanoton = (amount_ton * NANOTON_PER_TON as f64).round() as u64;
        let uri = transfer_uri(&self.receiver_wallet, amount_nanoton, &memo);

        info!(
            "Initiated payment {} for user {} ({} TON, {:?} {})",
            payment.payment_id, telegram_id, amount_ton, item_kind, item_id
        );

        Ok(PaymentInitiation {
            payment_id: payment.payment_id,
            qr_data: uri.clone(),
            ton_pay_url: uri,
            expires_at: now + PAYMENT_EXPIRY_SECS,
        })
    }

    /// Poll the confirmation state of a payment intent.
    /// Safe to call any number of times: a completed intent is returned
    /// without querying the explorer, and a pending one is settled at most
    /// once when a matching transfer shows up.
    pub async fn check_status(&self, payment_id: &str) -> Result<PaymentIntent> {
        let payment = self
            .db
            .get_payment(payment_id)?
            .ok_or_else(|| PlatformError::not_found(format!("Payment not found: {}", payment_id)))?;

        if payment.status == PaymentStatus::Completed {
            debug!("Payment {} already completed, skipping chain scan", payment_id);
            return Ok(payment);
        }

        let memo = payment_memo(payment_id);
        let transactions = self
            .explorer
            .recent_transactions(&self.receiver_wallet, CONFIRMATION_SCAN_LIMIT)
            .await?;

        let matched = transactions
            .iter()
            .find(|tx| tx.comment.as_deref().map_or(false, |c| c.contains(&memo)));

        match matched {
            Some(tx) => {
                debug!("Payment {} matched transaction {}", payment_id, tx.transaction_id);
                match self.db.settle_payment_if_pending(payment_id, &tx.transaction_id)? {
                    Some(settled) => Ok(settled),
                    // Another poll settled it between our read and the
                    // conditional update; the stored record is the truth
                    None => self.db.get_payment(payment_id)?.ok_or_else(|| {
                        PlatformError::not_found(format!("Payment not found: {}", payment_id))
                    }),
                }
            }
            None => {
                debug!("Payment {} still pending, no matching transfer", payment_id);
                Ok(payment)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::explorer::TonTransaction;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct MockExplorer {
        transactions: Mutex<Vec<TonTransaction>>,
        calls: AtomicUsize,
        fail: AtomicBool,
    }

    impl MockExplorer {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                transactions: Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
                fail: AtomicBool::new(false),
            })
        }

        fn push_transfer(&self, hash: &str, comment: &str) {
            self.transactions.lock().unwrap().push(TonTransaction {
                transaction_id: hash.to_string(),
                source: Some("EQSender".to_string()),
                value_nanoton: 5 * NANOTON_PER_TON,
                comment: Some(comment.to_string()),
                timestamp: chrono::Utc::now().timestamp(),
            });
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TonExplorer for MockExplorer {
        async fn recent_transactions(&self, _address: &str, limit: u32) -> crate::error::Result<Vec<TonTransaction>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(PlatformError::external("explorer unreachable"));
            }
            let transactions = self.transactions.lock().unwrap();
            Ok(transactions.iter().rev().take(limit as usize).cloned().collect())
        }
    }

    fn flow() -> (Arc<PlatformDb>, Arc<MockExplorer>, TonPaymentFlow) {
        let path = std::env::temp_dir().join(format!("vips-ton-test-{}.redb", Uuid::new_v4()));
        let db = Arc::new(PlatformDb::open(Some(path.to_str().unwrap())).unwrap());
        db.ensure_user(7, None).unwrap();
        let explorer = MockExplorer::new();
        let flow = TonPaymentFlow::new(db.clone(), explorer.clone(), "EQReceiverWallet");
        (db, explorer, flow)
    }

    #[test]
    fn test_initiate_builds_transfer_uri() {
        let (db, _explorer, flow) = flow();

        let initiation = flow.initiate(7, 5.0, ItemKind::Star, "star-pack").unwrap();
        let expected = format!(
            "ton://transfer/EQReceiverWallet?amount=5000000000&text=payment_id:{}",
            initiation.payment_id
        );
        assert_eq!(initiation.ton_pay_url, expected);
        assert_eq!(initiation.qr_data, expected);

        let stored = db.get_payment(&initiation.payment_id).unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Pending);
        assert_eq!(stored.amount_ton, 5.0);
        assert!(initiation.expires_at - stored.created_at == PAYMENT_EXPIRY_SECS);
    }

    #[test]
    fn test_initiate_converts_fractional_amounts() {
        let (db, _explorer, flow) = flow();
        let initiation = flow.initiate(7, 0.5, ItemKind::Content, "content-9").unwrap();
        assert!(initiation.ton_pay_url.contains("amount=500000000&"));
        assert!(db.get_payment(&initiation.payment_id).unwrap().is_some());
    }

    #[test]
    fn test_initiate_rejects_bad_amounts() {
        let (_db, _explorer, flow) = flow();
        for amount in [0.0, -1.0, f64::NAN] {
            let result = flow.initiate(7, amount, ItemKind::Star, "star");
            assert!(matches!(result, Err(PlatformError::Validation(_))), "amount {}", amount);
        }
    }

    #[test]
    fn test_initiate_unknown_user() {
        let (_db, _explorer, flow) = flow();
        let result = flow.initiate(999, 1.0, ItemKind::Star, "star");
        assert!(matches!(result, Err(PlatformError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_poll_stays_pending_without_match() {
        let (_db, explorer, flow) = flow();
        let initiation = flow.initiate(7, 5.0, ItemKind::Star, "star").unwrap();

        explorer.push_transfer("tx-other", "payment_id:someone-else");
        let status = flow.check_status(&initiation.payment_id).await.unwrap();
        assert_eq!(status.status, PaymentStatus::Pending);
        assert!(status.transaction_id.is_none());
    }

    #[tokio::test]
    async fn test_poll_settles_once_on_match() {
        let (db, explorer, flow) = flow();
        let initiation = flow.initiate(7, 5.0, ItemKind::Star, "star").unwrap();
        let memo = payment_memo(&initiation.payment_id);

        // No matching transfer yet
        let status = flow.check_status(&initiation.payment_id).await.unwrap();
        assert_eq!(status.status, PaymentStatus::Pending);

        // Transfer lands; next poll settles and credits
        explorer.push_transfer("tx-match", &memo);
        let status = flow.check_status(&initiation.payment_id).await.unwrap();
        assert_eq!(status.status, PaymentStatus::Completed);
        assert_eq!(status.transaction_id.as_deref(), Some("tx-match"));
        assert_eq!(db.get_user(7).unwrap().unwrap().stars, 5);

        // A third poll short-circuits: no chain query, no second credit
        let calls_before = explorer.call_count();
        let status = flow.check_status(&initiation.payment_id).await.unwrap();
        assert_eq!(status.status, PaymentStatus::Completed);
        assert_eq!(explorer.call_count(), calls_before);
        assert_eq!(db.get_user(7).unwrap().unwrap().stars, 5);
    }

    #[tokio::test]
    async fn test_memo_match_is_substring_of_comment() {
        let (_db, explorer, flow) = flow();
        let initiation = flow.initiate(7, 5.0, ItemKind::Star, "star").unwrap();
        let memo = payment_memo(&initiation.payment_id);

        // Wallets sometimes wrap the memo in extra text
        explorer.push_transfer("tx-wrapped", &format!("transfer for {} thanks", memo));
        let status = flow.check_status(&initiation.payment_id).await.unwrap();
        assert_eq!(status.status, PaymentStatus::Completed);
    }

    #[tokio::test]
    async fn test_explorer_failure_leaves_intent_pending() {
        let (db, explorer, flow) = flow();
        let initiation = flow.initiate(7, 5.0, ItemKind::Star, "star").unwrap();

        explorer.fail.store(true, Ordering::SeqCst);
        let result = flow.check_status(&initiation.payment_id).await;
        assert!(matches!(result, Err(PlatformError::ExternalService(_))));
        assert_eq!(
            db.get_payment(&initiation.payment_id).unwrap().unwrap().status,
            PaymentStatus::Pending
        );

        // The client's polling loop is the retry mechanism
        explorer.fail.store(false, Ordering::SeqCst);
        explorer.push_transfer("tx-late", &payment_memo(&initiation.payment_id));
        let status = flow.check_status(&initiation.payment_id).await.unwrap();
        assert_eq!(status.status, PaymentStatus::Completed);
    }

    #[tokio::test]
    async fn test_package_purchase_activates_subscription() {
        let (db, explorer, flow) = flow();
        db.store_package(&crate::db::types::VipPackage {
            package_id: "vip-30".to_string(),
            title: "VIP Aylık".to_string(),
            price_ton: 10.0,
            duration_days: 30,
        })
        .unwrap();

        let initiation = flow.initiate(7, 10.0, ItemKind::Package, "vip-30").unwrap();
        explorer.push_transfer("tx-vip", &payment_memo(&initiation.payment_id));

        let status = flow.check_status(&initiation.payment_id).await.unwrap();
        assert_eq!(status.status, PaymentStatus::Completed);

        let subs = db.list_subscriptions(Some(7)).unwrap();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].package_id, "vip-30");
    }

    #[tokio::test]
    async fn test_unknown_payment_is_not_found() {
        let (_db, _explorer, flow) = flow();
        let result = flow.check_status("missing").await;
        assert!(matches!(result, Err(PlatformError::NotFound(_))));
    }
}
