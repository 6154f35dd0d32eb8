// ============================================================================
// PlatformDb — Embedded Database (redb)
// ============================================================================
// Persistent storage for users, tasks, verifications, payments, withdrawals,
// packages, and subscriptions.
// Default path: ~/.onlyvips/platform.redb (override via ONLYVIPS_DB_PATH)
//
// Every check-and-mutate sequence (reward issuance, payment settlement,
// withdrawal debit) runs inside a single write transaction, so the ledger
// invariants hold even under concurrent requests.
// ============================================================================

pub mod types;

pub use types::{
    PackageSubscription, PaymentIntent, StoreStats, TaskDefinition, UserAccount,
    VerificationAttempt, VipPackage, WithdrawalRequest,
};

use redb::{Database, ReadableTable, TableDefinition};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{PlatformError, Result};
use crate::types::{ItemKind, PaymentStatus, Reward};

// Table definitions
const USERS: TableDefinition<i64, &[u8]> = TableDefinition::new("users");
const TASKS: TableDefinition<u32, &[u8]> = TableDefinition::new("tasks");
const VERIFICATIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("verifications");
const PAYMENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("payments");
const WITHDRAWALS: TableDefinition<&str, &[u8]> = TableDefinition::new("withdrawals");
const PACKAGES: TableDefinition<&str, &[u8]> = TableDefinition::new("packages");
const SUBSCRIPTIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("subscriptions");

/// Composite key for the verifications table: one record per (user, task)
fn verification_key(telegram_id: i64, task_id: u32) -> String {
    format!("{}:{}", telegram_id, task_id)
}

/// Embedded database for the OnlyVips platform core
pub struct PlatformDb {
    db: Database,
    path: PathBuf,
}

impl PlatformDb {
    /// Open (or create) the database at the given path.
    /// If `path` is None, uses ONLYVIPS_DB_PATH env var or
    /// ~/.onlyvips/platform.redb
    pub fn open(path: Option<&str>) -> Result<Self> {
        let db_path = if let Some(p) = path {
            PathBuf::from(p)
        } else if let Ok(env_path) = std::env::var("ONLYVIPS_DB_PATH") {
            PathBuf::from(env_path)
        } else {
            let home = dirs::home_dir()
                .ok_or_else(|| PlatformError::storage("Cannot determine home directory"))?;
            let data_dir = home.join(".onlyvips");
            std::fs::create_dir_all(&data_dir)
                .map_err(|e| PlatformError::storage(format!("Failed to create .onlyvips directory: {}", e)))?;
            data_dir.join("platform.redb")
        };

        info!("Opening database at: {}", db_path.display());

        let db = Database::create(&db_path)
            .map_err(|e| PlatformError::storage(format!("Failed to open database: {}", e)))?;

        // Ensure tables exist by doing a write transaction
        let write_txn = db
            .begin_write()
            .map_err(|e| PlatformError::storage(format!("Failed to begin write: {}", e)))?;
        {
            let _ = write_txn.open_table(USERS)
                .map_err(|e| PlatformError::storage(format!("Failed to create users table: {}", e)))?;
            let _ = write_txn.open_table(TASKS)
                .map_err(|e| PlatformError::storage(format!("Failed to create tasks table: {}", e)))?;
            let _ = write_txn.open_table(VERIFICATIONS)
                .map_err(|e| PlatformError::storage(format!("Failed to create verifications table: {}", e)))?;
            let _ = write_txn.open_table(PAYMENTS)
                .map_err(|e| PlatformError::storage(format!("Failed to create payments table: {}", e)))?;
            let _ = write_txn.open_table(WITHDRAWALS)
                .map_err(|e| PlatformError::storage(format!("Failed to create withdrawals table: {}", e)))?;
            let _ = write_txn.open_table(PACKAGES)
                .map_err(|e| PlatformError::storage(format!("Failed to create packages table: {}", e)))?;
            let _ = write_txn.open_table(SUBSCRIPTIONS)
                .map_err(|e| PlatformError::storage(format!("Failed to create subscriptions table: {}", e)))?;
        }
        write_txn.commit()
            .map_err(|e| PlatformError::storage(format!("Failed to commit init: {}", e)))?;

        info!("Database ready");

        Ok(Self { db, path: db_path })
    }

    /// Get the database file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    // ========================================================================
    // Task Catalog Operations
    // ========================================================================

    pub fn store_task(&self, task: &TaskDefinition) -> Result<()> {
        let value = bincode::serialize(task)
            .map_err(|e| PlatformError::storage(format!("Failed to serialize task: {}", e)))?;

        let write_txn = self.db.begin_write()
            .map_err(|e| PlatformError::storage(format!("Failed to begin write: {}", e)))?;
        {
            let mut table = write_txn.open_table(TASKS)
                .map_err(|e| PlatformError::storage(format!("Failed to open tasks table: {}", e)))?;
            table.insert(task.id, value.as_slice())
                .map_err(|e| PlatformError::storage(format!("Failed to insert task: {}", e)))?;
        }
        write_txn.commit()
            .map_err(|e| PlatformError::storage(format!("Failed to commit: {}", e)))?;

        debug!("Stored task {}", task.id);
        Ok(())
    }

    pub fn get_task(&self, task_id: u32) -> Result<Option<TaskDefinition>> {
        let read_txn = self.db.begin_read()
            .map_err(|e| PlatformError::storage(format!("Failed to begin read: {}", e)))?;
        let table = read_txn.open_table(TASKS)
            .map_err(|e| PlatformError::storage(format!("Failed to open tasks table: {}", e)))?;

        match table.get(task_id)
            .map_err(|e| PlatformError::storage(format!("Failed to get task: {}", e)))?
        {
            Some(value) => {
                let task: TaskDefinition = bincode::deserialize(value.value())
                    .map_err(|e| PlatformError::storage(format!("Failed to deserialize task: {}", e)))?;
                Ok(Some(task))
            }
            None => Ok(None),
        }
    }

    /// List all tasks, ordered by id
    pub fn list_tasks(&self) -> Result<Vec<TaskDefinition>> {
        let read_txn = self.db.begin_read()
            .map_err(|e| PlatformError::storage(format!("Failed to begin read: {}", e)))?;
        let table = read_txn.open_table(TASKS)
            .map_err(|e| PlatformError::storage(format!("Failed to open tasks table: {}", e)))?;

        let mut results = Vec::new();
        let iter = table.range::<u32>(..)
            .map_err(|e| PlatformError::storage(format!("Failed to iterate tasks: {}", e)))?;
        for entry in iter {
            let (_key, value) = entry
                .map_err(|e| PlatformError::storage(format!("Failed to read entry: {}", e)))?;
            let task: TaskDefinition = bincode::deserialize(value.value())
                .map_err(|e| PlatformError::storage(format!("Failed to deserialize task: {}", e)))?;
            results.push(task);
        }
        Ok(results)
    }

    /// Insert catalog entries that are not already present.
    /// Existing definitions are left untouched so operator toggles survive
    /// restarts. Returns the number of newly inserted tasks.
    pub fn seed_tasks(&self, catalog: &[TaskDefinition]) -> Result<usize> {
        let write_txn = self.db.begin_write()
            .map_err(|e| PlatformError::storage(format!("Failed to begin write: {}", e)))?;
        let mut inserted = 0;
        {
            let mut table = write_txn.open_table(TASKS)
                .map_err(|e| PlatformError::storage(format!("Failed to open tasks table: {}", e)))?;
            for task in catalog {
                let exists = table.get(task.id)
                    .map_err(|e| PlatformError::storage(format!("Failed to get task: {}", e)))?
                    .is_some();
                if exists {
                    continue;
                }
                let value = bincode::serialize(task)
                    .map_err(|e| PlatformError::storage(format!("Failed to serialize task: {}", e)))?;
                table.insert(task.id, value.as_slice())
                    .map_err(|e| PlatformError::storage(format!("Failed to insert task: {}", e)))?;
                inserted += 1;
            }
        }
        write_txn.commit()
            .map_err(|e| PlatformError::storage(format!("Failed to commit seed: {}", e)))?;

        if inserted > 0 {
            info!("Seeded {} catalog tasks", inserted);
        }
        Ok(inserted)
    }

    /// Operator toggle for task availability
    pub fn set_task_active(&self, task_id: u32, active: bool) -> Result<()> {
        let mut task = self
            .get_task(task_id)?
            .ok_or_else(|| PlatformError::not_found(format!("Task not found: {}", task_id)))?;

        task.is_active = active;
        self.store_task(&task)?;
        debug!("Set task {} active={}", task_id, active);
        Ok(())
    }

    // ========================================================================
    // User Operations
    // ========================================================================

    pub fn store_user(&self, user: &UserAccount) -> Result<()> {
        let value = bincode::serialize(user)
            .map_err(|e| PlatformError::storage(format!("Failed to serialize user: {}", e)))?;

        let write_txn = self.db.begin_write()
            .map_err(|e| PlatformError::storage(format!("Failed to begin write: {}", e)))?;
        {
            let mut table = write_txn.open_table(USERS)
                .map_err(|e| PlatformError::storage(format!("Failed to open users table: {}", e)))?;
            table.insert(user.telegram_id, value.as_slice())
                .map_err(|e| PlatformError::storage(format!("Failed to insert user: {}", e)))?;
        }
        write_txn.commit()
            .map_err(|e| PlatformError::storage(format!("Failed to commit: {}", e)))?;

        debug!("Stored user {}", user.telegram_id);
        Ok(())
    }

    pub fn get_user(&self, telegram_id: i64) -> Result<Option<UserAccount>> {
        let read_txn = self.db.begin_read()
            .map_err(|e| PlatformError::storage(format!("Failed to begin read: {}", e)))?;
        let table = read_txn.open_table(USERS)
            .map_err(|e| PlatformError::storage(format!("Failed to open users table: {}", e)))?;

        match table.get(telegram_id)
            .map_err(|e| PlatformError::storage(format!("Failed to get user: {}", e)))?
        {
            Some(value) => {
                let user: UserAccount = bincode::deserialize(value.value())
                    .map_err(|e| PlatformError::storage(format!("Failed to deserialize user: {}", e)))?;
                Ok(Some(user))
            }
            None => Ok(None),
        }
    }

    /// Fetch a user, creating a blank account on first contact
    pub fn ensure_user(&self, telegram_id: i64, username: Option<&str>) -> Result<UserAccount> {
        let write_txn = self.db.begin_write()
            .map_err(|e| PlatformError::storage(format!("Failed to begin write: {}", e)))?;
        let user;
        {
            let mut table = write_txn.open_table(USERS)
                .map_err(|e| PlatformError::storage(format!("Failed to open users table: {}", e)))?;
            let existing: Option<UserAccount> = match table.get(telegram_id)
                .map_err(|e| PlatformError::storage(format!("Failed to get user: {}", e)))?
            {
                Some(value) => Some(
                    bincode::deserialize(value.value())
                        .map_err(|e| PlatformError::storage(format!("Failed to deserialize user: {}", e)))?,
                ),
                None => None,
            };

            user = match existing {
                Some(u) => u,
                None => {
                    let fresh = UserAccount::new(
                        telegram_id,
                        username.map(|s| s.to_string()),
                        chrono::Utc::now().timestamp(),
                    );
                    let value = bincode::serialize(&fresh)
                        .map_err(|e| PlatformError::storage(format!("Failed to serialize user: {}", e)))?;
                    table.insert(telegram_id, value.as_slice())
                        .map_err(|e| PlatformError::storage(format!("Failed to insert user: {}", e)))?;
                    info!("Created user account {}", telegram_id);
                    fresh
                }
            };
        }
        write_txn.commit()
            .map_err(|e| PlatformError::storage(format!("Failed to commit: {}", e)))?;
        Ok(user)
    }

    // ========================================================================
    // Verification Operations
    // ========================================================================

    pub fn get_verification(
        &self,
        telegram_id: i64,
        task_id: u32,
    ) -> Result<Option<VerificationAttempt>> {
        let key = verification_key(telegram_id, task_id);

        let read_txn = self.db.begin_read()
            .map_err(|e| PlatformError::storage(format!("Failed to begin read: {}", e)))?;
        let table = read_txn.open_table(VERIFICATIONS)
            .map_err(|e| PlatformError::storage(format!("Failed to open verifications table: {}", e)))?;

        match table.get(key.as_str())
            .map_err(|e| PlatformError::storage(format!("Failed to get verification: {}", e)))?
        {
            Some(value) => {
                let attempt: VerificationAttempt = bincode::deserialize(value.value())
                    .map_err(|e| PlatformError::storage(format!("Failed to deserialize verification: {}", e)))?;
                Ok(Some(attempt))
            }
            None => Ok(None),
        }
    }

    /// Record a first verification attempt and add the task to the user's
    /// pending set, in one transaction. Returns false without touching
    /// anything if an attempt for this (user, task) pair already exists —
    /// repeated completion calls must never produce a second record.
    pub fn create_verification_if_absent(&self, attempt: &VerificationAttempt) -> Result<bool> {
        let key = verification_key(attempt.telegram_id, attempt.task_id);

        let write_txn = self.db.begin_write()
            .map_err(|e| PlatformError::storage(format!("Failed to begin write: {}", e)))?;
        let created;
        {
            let mut verifications = write_txn.open_table(VERIFICATIONS)
                .map_err(|e| PlatformError::storage(format!("Failed to open verifications table: {}", e)))?;
            let mut users = write_txn.open_table(USERS)
                .map_err(|e| PlatformError::storage(format!("Failed to open users table: {}", e)))?;

            let exists = verifications.get(key.as_str())
                .map_err(|e| PlatformError::storage(format!("Failed to get verification: {}", e)))?
                .is_some();

            if exists {
                created = false;
            } else {
                let mut user: UserAccount = match users.get(attempt.telegram_id)
                    .map_err(|e| PlatformError::storage(format!("Failed to get user: {}", e)))?
                {
                    Some(value) => bincode::deserialize(value.value())
                        .map_err(|e| PlatformError::storage(format!("Failed to deserialize user: {}", e)))?,
                    None => {
                        return Err(PlatformError::not_found(format!(
                            "User not found: {}",
                            attempt.telegram_id
                        )))
                    }
                };

                let value = bincode::serialize(attempt)
                    .map_err(|e| PlatformError::storage(format!("Failed to serialize verification: {}", e)))?;
                verifications.insert(key.as_str(), value.as_slice())
                    .map_err(|e| PlatformError::storage(format!("Failed to insert verification: {}", e)))?;

                user.mark_pending(attempt.task_id);
                let user_value = bincode::serialize(&user)
                    .map_err(|e| PlatformError::storage(format!("Failed to serialize user: {}", e)))?;
                users.insert(attempt.telegram_id, user_value.as_slice())
                    .map_err(|e| PlatformError::storage(format!("Failed to insert user: {}", e)))?;

                created = true;
            }
        }
        write_txn.commit()
            .map_err(|e| PlatformError::storage(format!("Failed to commit: {}", e)))?;

        if created {
            debug!(
                "Recorded verification attempt for user {} task {}",
                attempt.telegram_id, attempt.task_id
            );
        }
        Ok(created)
    }

    /// Admin override: flip the verified flag on a stored attempt.
    /// Does not touch the user ledger — reward issuance happens on the
    /// user's next completion call.
    pub fn set_verification_verified(
        &self,
        telegram_id: i64,
        task_id: u32,
        verified: bool,
    ) -> Result<VerificationAttempt> {
        let key = verification_key(telegram_id, task_id);

        let write_txn = self.db.begin_write()
            .map_err(|e| PlatformError::storage(format!("Failed to begin write: {}", e)))?;
        let attempt;
        {
            let mut table = write_txn.open_table(VERIFICATIONS)
                .map_err(|e| PlatformError::storage(format!("Failed to open verifications table: {}", e)))?;

            let mut current: VerificationAttempt = match table.get(key.as_str())
                .map_err(|e| PlatformError::storage(format!("Failed to get verification: {}", e)))?
            {
                Some(value) => bincode::deserialize(value.value())
                    .map_err(|e| PlatformError::storage(format!("Failed to deserialize verification: {}", e)))?,
                None => {
                    return Err(PlatformError::not_found(format!(
                        "Verification not found for user {} task {}",
                        telegram_id, task_id
                    )))
                }
            };

            current.verified = verified;
            current.completed_at = if verified {
                Some(chrono::Utc::now().timestamp())
            } else {
                None
            };

            let value = bincode::serialize(&current)
                .map_err(|e| PlatformError::storage(format!("Failed to serialize verification: {}", e)))?;
            table.insert(key.as_str(), value.as_slice())
                .map_err(|e| PlatformError::storage(format!("Failed to insert verification: {}", e)))?;
            attempt = current;
        }
        write_txn.commit()
            .map_err(|e| PlatformError::storage(format!("Failed to commit: {}", e)))?;

        info!(
            "Set verification user {} task {} verified={}",
            telegram_id, task_id, verified
        );
        Ok(attempt)
    }

    /// Unresolved attempts (not yet verified), newest first, capped
    pub fn list_unresolved_verifications(&self, limit: usize) -> Result<Vec<VerificationAttempt>> {
        let read_txn = self.db.begin_read()
            .map_err(|e| PlatformError::storage(format!("Failed to begin read: {}", e)))?;
        let table = read_txn.open_table(VERIFICATIONS)
            .map_err(|e| PlatformError::storage(format!("Failed to open verifications table: {}", e)))?;

        let mut results = Vec::new();
        let iter = table.range::<&str>(..)
            .map_err(|e| PlatformError::storage(format!("Failed to iterate verifications: {}", e)))?;
        for entry in iter {
            let (_key, value) = entry
                .map_err(|e| PlatformError::storage(format!("Failed to read entry: {}", e)))?;
            let attempt: VerificationAttempt = bincode::deserialize(value.value())
                .map_err(|e| PlatformError::storage(format!("Failed to deserialize verification: {}", e)))?;
            if !attempt.verified {
                results.push(attempt);
            }
        }

        results.sort_by(|a, b| b.requested_at.cmp(&a.requested_at));
        results.truncate(limit);
        Ok(results)
    }

    // ========================================================================
    // Reward Issuance (atomic)
    // ========================================================================

    /// Issue a task reward exactly once. In a single transaction: re-check
    /// the completed set, move the task from pending to completed, apply the
    /// ledger delta, and stamp the verification attempt's completion time if
    /// one exists. Returns None (and changes nothing) if the reward was
    /// already issued for this (user, task) pair.
    pub fn issue_reward_once(
        &self,
        telegram_id: i64,
        task_id: u32,
        reward: &Reward,
    ) -> Result<Option<(String, UserAccount)>> {
        let key = verification_key(telegram_id, task_id);

        let write_txn = self.db.begin_write()
            .map_err(|e| PlatformError::storage(format!("Failed to begin write: {}", e)))?;
        let outcome;
        {
            let mut users = write_txn.open_table(USERS)
                .map_err(|e| PlatformError::storage(format!("Failed to open users table: {}", e)))?;
            let mut verifications = write_txn.open_table(VERIFICATIONS)
                .map_err(|e| PlatformError::storage(format!("Failed to open verifications table: {}", e)))?;

            let mut user: UserAccount = match users.get(telegram_id)
                .map_err(|e| PlatformError::storage(format!("Failed to get user: {}", e)))?
            {
                Some(value) => bincode::deserialize(value.value())
                    .map_err(|e| PlatformError::storage(format!("Failed to deserialize user: {}", e)))?,
                None => {
                    return Err(PlatformError::not_found(format!(
                        "User not found: {}",
                        telegram_id
                    )))
                }
            };

            if user.has_completed(task_id) {
                outcome = None;
            } else {
                user.mark_completed(task_id);
                user.clear_pending(task_id);
                let message = reward.apply(&mut user);

                let user_value = bincode::serialize(&user)
                    .map_err(|e| PlatformError::storage(format!("Failed to serialize user: {}", e)))?;
                users.insert(telegram_id, user_value.as_slice())
                    .map_err(|e| PlatformError::storage(format!("Failed to insert user: {}", e)))?;

                // Stamp the attempt's resolution time when one exists
                let attempt: Option<VerificationAttempt> = match verifications.get(key.as_str())
                    .map_err(|e| PlatformError::storage(format!("Failed to get verification: {}", e)))?
                {
                    Some(value) => Some(
                        bincode::deserialize(value.value())
                            .map_err(|e| PlatformError::storage(format!("Failed to deserialize verification: {}", e)))?,
                    ),
                    None => None,
                };
                if let Some(mut attempt) = attempt {
                    attempt.completed_at = Some(chrono::Utc::now().timestamp());
                    let value = bincode::serialize(&attempt)
                        .map_err(|e| PlatformError::storage(format!("Failed to serialize verification: {}", e)))?;
                    verifications.insert(key.as_str(), value.as_slice())
                        .map_err(|e| PlatformError::storage(format!("Failed to insert verification: {}", e)))?;
                }

                outcome = Some((message, user));
            }
        }
        write_txn.commit()
            .map_err(|e| PlatformError::storage(format!("Failed to commit: {}", e)))?;

        if let Some((_, ref user)) = outcome {
            info!(
                "Issued reward for task {} to user {} (xp={}, stars={})",
                task_id, telegram_id, user.xp, user.stars
            );
        }
        Ok(outcome)
    }

    // ========================================================================
    // Payment Operations
    // ========================================================================

    pub fn store_payment(&self, payment: &PaymentIntent) -> Result<()> {
        let value = bincode::serialize(payment)
            .map_err(|e| PlatformError::storage(format!("Failed to serialize payment: {}", e)))?;

        let write_txn = self.db.begin_write()
            .map_err(|e| PlatformError::storage(format!("Failed to begin write: {}", e)))?;
        {
            let mut table = write_txn.open_table(PAYMENTS)
                .map_err(|e| PlatformError::storage(format!("Failed to open payments table: {}", e)))?;
            table.insert(payment.payment_id.as_str(), value.as_slice())
                .map_err(|e| PlatformError::storage(format!("Failed to insert payment: {}", e)))?;
        }
        write_txn.commit()
            .map_err(|e| PlatformError::storage(format!("Failed to commit: {}", e)))?;

        debug!("Stored payment {}", payment.payment_id);
        Ok(())
    }

    pub fn get_payment(&self, payment_id: &str) -> Result<Option<PaymentIntent>> {
        let read_txn = self.db.begin_read()
            .map_err(|e| PlatformError::storage(format!("Failed to begin read: {}", e)))?;
        let table = read_txn.open_table(PAYMENTS)
            .map_err(|e| PlatformError::storage(format!("Failed to open payments table: {}", e)))?;

        match table.get(payment_id)
            .map_err(|e| PlatformError::storage(format!("Failed to get payment: {}", e)))?
        {
            Some(value) => {
                let payment: PaymentIntent = bincode::deserialize(value.value())
                    .map_err(|e| PlatformError::storage(format!("Failed to deserialize payment: {}", e)))?;
                Ok(Some(payment))
            }
            None => Ok(None),
        }
    }

    pub fn list_payments(&self, status_filter: Option<PaymentStatus>) -> Result<Vec<PaymentIntent>> {
        let read_txn = self.db.begin_read()
            .map_err(|e| PlatformError::storage(format!("Failed to begin read: {}", e)))?;
        let table = read_txn.open_table(PAYMENTS)
            .map_err(|e| PlatformError::storage(format!("Failed to open payments table: {}", e)))?;

        let mut results = Vec::new();
        let iter = table.range::<&str>(..)
            .map_err(|e| PlatformError::storage(format!("Failed to iterate payments: {}", e)))?;
        for entry in iter {
            let (_key, value) = entry
                .map_err(|e| PlatformError::storage(format!("Failed to read entry: {}", e)))?;
            let payment: PaymentIntent = bincode::deserialize(value.value())
                .map_err(|e| PlatformError::storage(format!("Failed to deserialize payment: {}", e)))?;
            if let Some(filter) = status_filter {
                if payment.status == filter {
                    results.push(payment);
                }
            } else {
                results.push(payment);
            }
        }
        results.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(results)
    }

    /// Settle a payment intent: conditional pending→completed flip plus the
    /// purchased item's ledger effect, all in one transaction. Returns None
    /// (and changes nothing) if the intent is already completed — repeated
    /// polls must never credit twice.
    pub fn settle_payment_if_pending(
        &self,
        payment_id: &str,
        transaction_id: &str,
    ) -> Result<Option<PaymentIntent>> {
        let write_txn = self.db.begin_write()
            .map_err(|e| PlatformError::storage(format!("Failed to begin write: {}", e)))?;
        let outcome;
        {
            let mut payments = write_txn.open_table(PAYMENTS)
                .map_err(|e| PlatformError::storage(format!("Failed to open payments table: {}", e)))?;
            let mut users = write_txn.open_table(USERS)
                .map_err(|e| PlatformError::storage(format!("Failed to open users table: {}", e)))?;
            let packages = write_txn.open_table(PACKAGES)
                .map_err(|e| PlatformError::storage(format!("Failed to open packages table: {}", e)))?;
            let mut subscriptions = write_txn.open_table(SUBSCRIPTIONS)
                .map_err(|e| PlatformError::storage(format!("Failed to open subscriptions table: {}", e)))?;

            let mut payment: PaymentIntent = match payments.get(payment_id)
                .map_err(|e| PlatformError::storage(format!("Failed to get payment: {}", e)))?
            {
                Some(value) => bincode::deserialize(value.value())
                    .map_err(|e| PlatformError::storage(format!("Failed to deserialize payment: {}", e)))?,
                None => {
                    return Err(PlatformError::not_found(format!(
                        "Payment not found: {}",
                        payment_id
                    )))
                }
            };

            if payment.status == PaymentStatus::Completed {
                outcome = None;
            } else {
                let now = chrono::Utc::now().timestamp();
                payment.status = PaymentStatus::Completed;
                payment.transaction_id = Some(transaction_id.to_string());
                payment.updated_at = now;

                match payment.item_kind {
                    ItemKind::Star => {
                        let mut user: UserAccount = match users.get(payment.telegram_id)
                            .map_err(|e| PlatformError::storage(format!("Failed to get user: {}", e)))?
                        {
                            Some(value) => bincode::deserialize(value.value())
                                .map_err(|e| PlatformError::storage(format!("Failed to deserialize user: {}", e)))?,
                            None => {
                                return Err(PlatformError::not_found(format!(
                                    "User not found: {}",
                                    payment.telegram_id
                                )))
                            }
                        };
                        // Star purchases credit the raw amount units
                        user.stars += payment.amount_ton.round() as u64;
                        let value = bincode::serialize(&user)
                            .map_err(|e| PlatformError::storage(format!("Failed to serialize user: {}", e)))?;
                        users.insert(payment.telegram_id, value.as_slice())
                            .map_err(|e| PlatformError::storage(format!("Failed to insert user: {}", e)))?;
                    }
                    ItemKind::Package => {
                        let package: VipPackage = match packages.get(payment.item_id.as_str())
                            .map_err(|e| PlatformError::storage(format!("Failed to get package: {}", e)))?
                        {
                            Some(value) => bincode::deserialize(value.value())
                                .map_err(|e| PlatformError::storage(format!("Failed to deserialize package: {}", e)))?,
                            None => {
                                return Err(PlatformError::not_found(format!(
                                    "Package not found: {}",
                                    payment.item_id
                                )))
                            }
                        };
                        let subscription = PackageSubscription {
                            subscription_id: Uuid::new_v4().to_string(),
                            telegram_id: payment.telegram_id,
                            package_id: package.package_id.clone(),
                            purchased_at: now,
                            expires_at: now + i64::from(package.duration_days) * 86400,
                        };
                        let value = bincode::serialize(&subscription)
                            .map_err(|e| PlatformError::storage(format!("Failed to serialize subscription: {}", e)))?;
                        subscriptions.insert(subscription.subscription_id.as_str(), value.as_slice())
                            .map_err(|e| PlatformError::storage(format!("Failed to insert subscription: {}", e)))?;
                    }
                    ItemKind::Content => {
                        let mut user: UserAccount = match users.get(payment.telegram_id)
                            .map_err(|e| PlatformError::storage(format!("Failed to get user: {}", e)))?
                        {
                            Some(value) => bincode::deserialize(value.value())
                                .map_err(|e| PlatformError::storage(format!("Failed to deserialize user: {}", e)))?,
                            None => {
                                return Err(PlatformError::not_found(format!(
                                    "User not found: {}",
                                    payment.telegram_id
                                )))
                            }
                        };
                        user.unlock_content(&payment.item_id);
                        let value = bincode::serialize(&user)
                            .map_err(|e| PlatformError::storage(format!("Failed to serialize user: {}", e)))?;
                        users.insert(payment.telegram_id, value.as_slice())
                            .map_err(|e| PlatformError::storage(format!("Failed to insert user: {}", e)))?;
                    }
                }

                let payment_value = bincode::serialize(&payment)
                    .map_err(|e| PlatformError::storage(format!("Failed to serialize payment: {}", e)))?;
                payments.insert(payment_id, payment_value.as_slice())
                    .map_err(|e| PlatformError::storage(format!("Failed to insert payment: {}", e)))?;

                outcome = Some(payment);
            }
        }
        write_txn.commit()
            .map_err(|e| PlatformError::storage(format!("Failed to commit settle: {}", e)))?;

        if let Some(ref payment) = outcome {
            info!(
                "Settled payment {} for user {} ({:?} {})",
                payment.payment_id, payment.telegram_id, payment.item_kind, payment.item_id
            );
        }
        Ok(outcome)
    }

    // ========================================================================
    // Withdrawal Operations
    // ========================================================================

    /// Create a withdrawal request, debiting the star balance in the same
    /// transaction (optimistic deduction)
    pub fn create_withdrawal(
        &self,
        telegram_id: i64,
        amount_stars: u64,
        wallet_address: &str,
    ) -> Result<WithdrawalRequest> {
        let write_txn = self.db.begin_write()
            .map_err(|e| PlatformError::storage(format!("Failed to begin write: {}", e)))?;
        let request;
        {
            let mut users = write_txn.open_table(USERS)
                .map_err(|e| PlatformError::storage(format!("Failed to open users table: {}", e)))?;
            let mut withdrawals = write_txn.open_table(WITHDRAWALS)
                .map_err(|e| PlatformError::storage(format!("Failed to open withdrawals table: {}", e)))?;

            let mut user: UserAccount = match users.get(telegram_id)
                .map_err(|e| PlatformError::storage(format!("Failed to get user: {}", e)))?
            {
                Some(value) => bincode::deserialize(value.value())
                    .map_err(|e| PlatformError::storage(format!("Failed to deserialize user: {}", e)))?,
                None => {
                    return Err(PlatformError::not_found(format!(
                        "User not found: {}",
                        telegram_id
                    )))
                }
            };

            if user.stars < amount_stars {
                return Err(PlatformError::InsufficientBalance {
                    have: user.stars,
                    need: amount_stars,
                });
            }
            user.stars -= amount_stars;

            let user_value = bincode::serialize(&user)
                .map_err(|e| PlatformError::storage(format!("Failed to serialize user: {}", e)))?;
            users.insert(telegram_id, user_value.as_slice())
                .map_err(|e| PlatformError::storage(format!("Failed to insert user: {}", e)))?;

            let fresh = WithdrawalRequest {
                withdrawal_id: Uuid::new_v4().to_string(),
                telegram_id,
                amount_stars,
                wallet_address: wallet_address.to_string(),
                status: "pending".to_string(),
                created_at: chrono::Utc::now().timestamp(),
            };
            let value = bincode::serialize(&fresh)
                .map_err(|e| PlatformError::storage(format!("Failed to serialize withdrawal: {}", e)))?;
            withdrawals.insert(fresh.withdrawal_id.as_str(), value.as_slice())
                .map_err(|e| PlatformError::storage(format!("Failed to insert withdrawal: {}", e)))?;
            request = fresh;
        }
        write_txn.commit()
            .map_err(|e| PlatformError::storage(format!("Failed to commit withdrawal: {}", e)))?;

        info!(
            "Created withdrawal {} for user {} ({} stars)",
            request.withdrawal_id, telegram_id, amount_stars
        );
        Ok(request)
    }

    pub fn list_withdrawals(&self) -> Result<Vec<WithdrawalRequest>> {
        let read_txn = self.db.begin_read()
            .map_err(|e| PlatformError::storage(format!("Failed to begin read: {}", e)))?;
        let table = read_txn.open_table(WITHDRAWALS)
            .map_err(|e| PlatformError::storage(format!("Failed to open withdrawals table: {}", e)))?;

        let mut results = Vec::new();
        let iter = table.range::<&str>(..)
            .map_err(|e| PlatformError::storage(format!("Failed to iterate withdrawals: {}", e)))?;
        for entry in iter {
            let (_key, value) = entry
                .map_err(|e| PlatformError::storage(format!("Failed to read entry: {}", e)))?;
            let request: WithdrawalRequest = bincode::deserialize(value.value())
                .map_err(|e| PlatformError::storage(format!("Failed to deserialize withdrawal: {}", e)))?;
            results.push(request);
        }
        results.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(results)
    }

    // ========================================================================
    // Package & Subscription Operations
    // ========================================================================

    pub fn store_package(&self, package: &VipPackage) -> Result<()> {
        let value = bincode::serialize(package)
            .map_err(|e| PlatformError::storage(format!("Failed to serialize package: {}", e)))?;

        let write_txn = self.db.begin_write()
            .map_err(|e| PlatformError::storage(format!("Failed to begin write: {}", e)))?;
        {
            let mut table = write_txn.open_table(PACKAGES)
                .map_err(|e| PlatformError::storage(format!("Failed to open packages table: {}", e)))?;
            table.insert(package.package_id.as_str(), value.as_slice())
                .map_err(|e| PlatformError::storage(format!("Failed to insert package: {}", e)))?;
        }
        write_txn.commit()
            .map_err(|e| PlatformError::storage(format!("Failed to commit: {}", e)))?;

        debug!("Stored package {}", package.package_id);
        Ok(())
    }

    pub fn get_package(&self, package_id: &str) -> Result<Option<VipPackage>> {
        let read_txn = self.db.begin_read()
            .map_err(|e| PlatformError::storage(format!("Failed to begin read: {}", e)))?;
        let table = read_txn.open_table(PACKAGES)
            .map_err(|e| PlatformError::storage(format!("Failed to open packages table: {}", e)))?;

        match table.get(package_id)
            .map_err(|e| PlatformError::storage(format!("Failed to get package: {}", e)))?
        {
            Some(value) => {
                let package: VipPackage = bincode::deserialize(value.value())
                    .map_err(|e| PlatformError::storage(format!("Failed to deserialize package: {}", e)))?;
                Ok(Some(package))
            }
            None => Ok(None),
        }
    }

    pub fn list_subscriptions(&self, telegram_id: Option<i64>) -> Result<Vec<PackageSubscription>> {
        let read_txn = self.db.begin_read()
            .map_err(|e| PlatformError::storage(format!("Failed to begin read: {}", e)))?;
        let table = read_txn.open_table(SUBSCRIPTIONS)
            .map_err(|e| PlatformError::storage(format!("Failed to open subscriptions table: {}", e)))?;

        let mut results = Vec::new();
        let iter = table.range::<&str>(..)
            .map_err(|e| PlatformError::storage(format!("Failed to iterate subscriptions: {}", e)))?;
        for entry in iter {
            let (_key, value) = entry
                .map_err(|e| PlatformError::storage(format!("Failed to read entry: {}", e)))?;
            let subscription: PackageSubscription = bincode::deserialize(value.value())
                .map_err(|e| PlatformError::storage(format!("Failed to deserialize subscription: {}", e)))?;
            if let Some(filter) = telegram_id {
                if subscription.telegram_id == filter {
                    results.push(subscription);
                }
            } else {
                results.push(subscription);
            }
        }
        Ok(results)
    }

    // ========================================================================
    // Statistics
    // ========================================================================

    pub fn stats(&self) -> Result<StoreStats> {
        let read_txn = self.db.begin_read()
            .map_err(|e| PlatformError::storage(format!("Failed to begin read: {}", e)))?;

        let users = read_txn.open_table(USERS)
            .map_err(|e| PlatformError::storage(format!("Failed to open users table: {}", e)))?;
        let total_users = users.range::<i64>(..)
            .map_err(|e| PlatformError::storage(format!("Failed to iterate users: {}", e)))?
            .count();

        let tasks = self.list_tasks()?;
        let active_tasks = tasks.iter().filter(|t| t.is_active).count();

        let unresolved = self.list_unresolved_verifications(usize::MAX)?.len();

        let payments = self.list_payments(None)?;
        let pending_payments = payments
            .iter()
            .filter(|p| p.status == PaymentStatus::Pending)
            .count();
        let completed_payments = payments.len() - pending_payments;

        let total_withdrawals = self.list_withdrawals()?.len();
        let total_subscriptions = self.list_subscriptions(None)?.len();

        Ok(StoreStats {
            total_users,
            total_tasks: tasks.len(),
            active_tasks,
            unresolved_verifications: unresolved,
            pending_payments,
            completed_payments,
            total_withdrawals,
            total_subscriptions,
        })
    }
}
