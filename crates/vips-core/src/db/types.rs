//! ============================================================================
//! Database Types - Serializable records for redb storage
//! ============================================================================

use serde::{Deserialize, Serialize};

use crate::types::{ItemKind, PaymentStatus, Reward, VerificationKind};

/// Task definition from the gamification catalog.
/// Seeded at startup; immutable at runtime except the `is_active` toggle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub id: u32,
    pub title: String,
    pub description: String,
    /// Human-readable reward line shown in the catalog
    pub reward_text: String,
    pub reward: Reward,
    /// Which external proof backs this task (informational)
    pub verification: VerificationKind,
    pub verification_required: bool,
    pub is_active: bool,
}

/// Per-(user, task) verification attempt.
/// At most one record ever exists per pair — the store key is the pair
/// itself, so a second attempt can only overwrite, never duplicate, and
/// the engine refuses to overwrite. Records are never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationAttempt {
    pub telegram_id: i64,
    pub task_id: u32,
    pub verification: VerificationKind,
    /// Client-supplied proof payload, stored as raw JSON text.
    /// Opaque to the engine; its shape varies per verification kind.
    pub data: String,
    pub requested_at: i64,
    pub verified: bool,
    pub completed_at: Option<i64>,
}

/// User ledger: XP, star balance, badges, and task bookkeeping.
/// Mutated only by the completion engine and the payment settlement path,
/// always inside a single write transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAccount {
    pub telegram_id: i64,
    pub username: Option<String>,
    pub xp: u64,
    pub stars: u64,
    /// Append-only set of badge labels
    pub badges: Vec<String>,
    /// Tasks whose reward has been issued (append-only set)
    pub completed_tasks: Vec<u32>,
    /// Tasks with an unresolved verification attempt
    pub pending_tasks: Vec<u32>,
    /// Content ids unlocked by direct purchase (append-only set)
    pub unlocked_content: Vec<String>,
    pub created_at: i64,
}

impl UserAccount {
    pub fn new(telegram_id: i64, username: Option<String>, now: i64) -> Self {
        Self {
            telegram_id,
            username,
            xp: 0,
            stars: 0,
            badges: Vec::new(),
            completed_tasks: Vec::new(),
            pending_tasks: Vec::new(),
            unlocked_content: Vec::new(),
            created_at: now,
        }
    }

    pub fn has_completed(&self, task_id: u32) -> bool {
        self.completed_tasks.contains(&task_id)
    }

    /// Idempotent insert into the completed set
    pub fn mark_completed(&mut self, task_id: u32) {
        if !self.completed_tasks.contains(&task_id) {
            self.completed_tasks.push(task_id);
        }
    }

    /// Idempotent insert into the pending set
    pub fn mark_pending(&mut self, task_id: u32) {
        if !self.pending_tasks.contains(&task_id) {
            self.pending_tasks.push(task_id);
        }
    }

    pub fn clear_pending(&mut self, task_id: u32) {
        self.pending_tasks.retain(|id| *id != task_id);
    }

    /// Set-semantics badge insert. Returns false if already held.
    pub fn grant_badge(&mut self, name: &str) -> bool {
        if self.badges.iter().any(|b| b == name) {
            return false;
        }
        self.badges.push(name.to_string());
        true
    }

    /// Set-semantics content unlock. Returns false if already unlocked.
    pub fn unlock_content(&mut self, content_id: &str) -> bool {
        if self.unlocked_content.iter().any(|c| c == content_id) {
            return false;
        }
        self.unlocked_content.push(content_id.to_string());
        true
    }
}

/// TON payment intent, correlated to an on-chain transfer by the
/// `payment_id:{id}` memo embedded in the payment URI.
/// Transitions pending → completed exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub payment_id: String,
    pub telegram_id: i64,
    pub amount_ton: f64,
    /// Fixed to "TON" in this flow
    pub currency: String,
    pub status: PaymentStatus,
    pub item_kind: ItemKind,
    pub item_id: String,
    /// Hash of the matched on-chain transaction, set at completion
    pub transaction_id: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Star withdrawal request. The balance is debited optimistically when the
/// record is created; reversal on operator rejection is a manual process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    pub withdrawal_id: String,
    pub telegram_id: i64,
    pub amount_stars: u64,
    pub wallet_address: String,
    pub status: String,
    pub created_at: i64,
}

/// VIP package offered by a creator. CRUD lives outside the core; records
/// are inserted by the operator CLI so package purchases can resolve a
/// subscription duration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VipPackage {
    pub package_id: String,
    pub title: String,
    pub price_ton: f64,
    pub duration_days: u32,
}

/// Active package subscription created by payment settlement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageSubscription {
    pub subscription_id: String,
    pub telegram_id: i64,
    pub package_id: String,
    pub purchased_at: i64,
    pub expires_at: i64,
}

/// Store statistics for the admin CLI
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub total_users: usize,
    pub total_tasks: usize,
    pub active_tasks: usize,
    pub unresolved_verifications: usize,
    pub pending_payments: usize,
    pub completed_payments: usize,
    pub total_withdrawals: usize,
    pub total_subscriptions: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completed_set_idempotent() {
        let mut user = UserAccount::new(7, None, 0);
        user.mark_completed(3);
        user.mark_completed(3);
        assert_eq!(user.completed_tasks, vec![3]);
    }

    #[test]
    fn test_pending_set_roundtrip() {
        let mut user = UserAccount::new(7, None, 0);
        user.mark_pending(3);
        user.mark_pending(3);
        assert_eq!(user.pending_tasks, vec![3]);
        user.clear_pending(3);
        assert!(user.pending_tasks.is_empty());
    }

    #[test]
    fn test_grant_badge_reports_duplicates() {
        let mut user = UserAccount::new(7, None, 0);
        assert!(user.grant_badge("Davetçi"));
        assert!(!user.grant_badge("Davetçi"));
        assert_eq!(user.badges.len(), 1);
    }

    #[test]
    fn test_unlock_content_set_semantics() {
        let mut user = UserAccount::new(7, None, 0);
        assert!(user.unlock_content("content-9"));
        assert!(!user.unlock_content("content-9"));
        assert_eq!(user.unlocked_content.len(), 1);
    }
}
