//! ============================================================================
//! Completion Engine - Task verification workflow and reward issuance
//! ============================================================================
//! Orchestrates a completion attempt end to end:
//! - tasks without verification resolve immediately
//! - verification-required tasks record one attempt per (user, task) and
//!   wait for an admin decision (or the injected auto-verify policy)
//! - rewards are issued exactly once, inside a single store transaction
//!
//! The admin override only flips the verified flag; the reward is credited
//! on the user's next completion call. Clients are expected to re-invoke
//! completion after a pending response — polling, not push.
//! ============================================================================

use std::sync::Arc;
use tracing::{debug, info};

use crate::db::types::{TaskDefinition, VerificationAttempt};
use crate::db::PlatformDb;
use crate::error::{PlatformError, Result};
use crate::tasks::policy::AutoVerifyPolicy;
use crate::types::{CompletionOutcome, ProgressEvent, TaskProgress};

/// Cap for the admin's unresolved-verification listing
pub const UNRESOLVED_LIST_LIMIT: usize = 100;

/// Task completion engine
pub struct CompletionEngine {
    db: Arc<PlatformDb>,
    policy: Arc<dyn AutoVerifyPolicy>,
}

impl CompletionEngine {
    pub fn new(db: Arc<PlatformDb>, policy: Arc<dyn AutoVerifyPolicy>) -> Self {
        Self { db, policy }
    }

    /// Handle a completion attempt for (user, task).
    /// `data` is the client-supplied proof payload, stored opaquely on the
    /// verification attempt.
    pub fn complete(
        &self,
        telegram_id: i64,
        task_id: u32,
        data: serde_json::Value,
    ) -> Result<CompletionOutcome> {
        let task = self
            .db
            .get_task(task_id)?
            .filter(|t| t.is_active)
            .ok_or_else(|| PlatformError::not_found(format!("Task not found: {}", task_id)))?;

        let user = self
            .db
            .get_user(telegram_id)?
            .ok_or_else(|| PlatformError::not_found(format!("User not found: {}", telegram_id)))?;

        let attempt = self.db.get_verification(telegram_id, task_id)?;
        let progress = TaskProgress::derive(
            user.has_completed(task_id),
            attempt.as_ref().map(|a| a.verified),
        );
        debug!(
            "Completion attempt: user {} task {} progress {:?}",
            telegram_id, task_id, progress
        );

        match progress {
            TaskProgress::RewardIssued => Ok(CompletionOutcome::AlreadyCompleted { user }),

            _ if !task.verification_required => self.issue(telegram_id, &task),

            TaskProgress::Unrequested => {
                progress.advance(ProgressEvent::Request)?;

                let verified = self.policy.auto_verify(task_id);
                let fresh = VerificationAttempt {
                    telegram_id,
                    task_id,
                    verification: task.verification,
                    data: data.to_string(),
                    requested_at: chrono::Utc::now().timestamp(),
                    verified,
                    completed_at: None,
                };
                // A concurrent first attempt may have won the race; either
                // way exactly one record exists and the outcome is pending.
                let created = self.db.create_verification_if_absent(&fresh)?;
                if created && verified {
                    info!(
                        "Auto-verified attempt for user {} task {} (development policy)",
                        telegram_id, task_id
                    );
                }
                Ok(CompletionOutcome::Pending {
                    verification: task.verification,
                })
            }

            TaskProgress::PendingVerification => Ok(CompletionOutcome::Pending {
                verification: task.verification,
            }),

            TaskProgress::Verified => {
                progress.advance(ProgressEvent::Issue)?;
                self.issue(telegram_id, &task)
            }
        }
    }

    /// Admin override: confirm or revoke a stored verification attempt.
    /// Never touches the ledger or the task sets.
    pub fn set_verified(
        &self,
        telegram_id: i64,
        task_id: u32,
        verified: bool,
    ) -> Result<VerificationAttempt> {
        let user = self
            .db
            .get_user(telegram_id)?
            .ok_or_else(|| PlatformError::not_found(format!("User not found: {}", telegram_id)))?;
        let attempt = self.db.get_verification(telegram_id, task_id)?.ok_or_else(|| {
            PlatformError::not_found(format!(
                "Verification not found for user {} task {}",
                telegram_id, task_id
            ))
        })?;

        let progress = TaskProgress::derive(user.has_completed(task_id), Some(attempt.verified));
        let event = if verified {
            ProgressEvent::Approve
        } else {
            ProgressEvent::Reject
        };
        // Resolved attempts can no longer be flipped
        progress.advance(event)?;

        self.db.set_verification_verified(telegram_id, task_id, verified)
    }

    /// Unresolved attempts for the admin panel, newest first
    pub fn unresolved_verifications(&self) -> Result<Vec<VerificationAttempt>> {
        self.db.list_unresolved_verifications(UNRESOLVED_LIST_LIMIT)
    }

    /// Active catalog entries for the miniapp
    pub fn active_tasks(&self) -> Result<Vec<TaskDefinition>> {
        Ok(self.db.list_tasks()?.into_iter().filter(|t| t.is_active).collect())
    }

    fn issue(&self, telegram_id: i64, task: &TaskDefinition) -> Result<CompletionOutcome> {
        match self.db.issue_reward_once(telegram_id, task.id, &task.reward)? {
            Some((message, user)) => Ok(CompletionOutcome::Completed { message, user }),
            None => {
                // Lost a race with a concurrent completion of the same task
                let user = self.db.get_user(telegram_id)?.ok_or_else(|| {
                    PlatformError::not_found(format!("User not found: {}", telegram_id))
                })?;
                Ok(CompletionOutcome::AlreadyCompleted { user })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::catalog::default_catalog;
    use crate::tasks::policy::{AllowListAutoVerify, NoAutoVerify};
    use uuid::Uuid;

    fn engine_with_policy(policy: Arc<dyn AutoVerifyPolicy>) -> (Arc<PlatformDb>, CompletionEngine) {
        let path = std::env::temp_dir().join(format!("vips-engine-test-{}.redb", Uuid::new_v4()));
        let db = Arc::new(PlatformDb::open(Some(path.to_str().unwrap())).unwrap());
        db.seed_tasks(&default_catalog()).unwrap();
        db.ensure_user(7, Some("tester")).unwrap();
        let engine = CompletionEngine::new(db.clone(), policy);
        (db, engine)
    }

    fn engine() -> (Arc<PlatformDb>, CompletionEngine) {
        engine_with_policy(Arc::new(NoAutoVerify))
    }

    #[test]
    fn test_instant_task_rewards_once() {
        let (db, engine) = engine();

        // Task 2 needs no verification
        let outcome = engine.complete(7, 2, serde_json::json!({})).unwrap();
        match outcome {
            CompletionOutcome::Completed { message, user } => {
                assert_eq!(message, "+10 XP kazandın!");
                assert_eq!(user.xp, 10);
                assert_eq!(user.completed_tasks, vec![2]);
            }
            other => panic!("expected Completed, got {:?}", other),
        }

        // Repeat is a warning, ledger untouched
        let outcome = engine.complete(7, 2, serde_json::json!({})).unwrap();
        assert!(matches!(outcome, CompletionOutcome::AlreadyCompleted { .. }));
        assert_eq!(db.get_user(7).unwrap().unwrap().xp, 10);
    }

    #[test]
    fn test_unknown_task_is_not_found() {
        let (_db, engine) = engine();
        let result = engine.complete(7, 999, serde_json::json!({}));
        assert!(matches!(result, Err(PlatformError::NotFound(_))));
    }

    #[test]
    fn test_deactivated_task_is_not_found() {
        let (db, engine) = engine();
        db.set_task_active(2, false).unwrap();
        let result = engine.complete(7, 2, serde_json::json!({}));
        assert!(matches!(result, Err(PlatformError::NotFound(_))));
    }

    #[test]
    fn test_unknown_user_is_not_found() {
        let (_db, engine) = engine();
        let result = engine.complete(999, 2, serde_json::json!({}));
        assert!(matches!(result, Err(PlatformError::NotFound(_))));
    }

    #[test]
    fn test_repeated_attempts_store_one_record() {
        let (db, engine) = engine();

        for _ in 0..3 {
            let outcome = engine.complete(7, 3, serde_json::json!({"chat": "@onlyvips"})).unwrap();
            assert!(matches!(outcome, CompletionOutcome::Pending { .. }));
        }

        let attempt = db.get_verification(7, 3).unwrap().unwrap();
        assert!(!attempt.verified);
        assert_eq!(db.get_user(7).unwrap().unwrap().pending_tasks, vec![3]);
    }

    #[test]
    fn test_two_step_admin_reconciliation() {
        let (db, engine) = engine();

        // Step 1: attempt goes pending
        let outcome = engine.complete(7, 3, serde_json::json!({})).unwrap();
        match outcome {
            CompletionOutcome::Pending { verification } => {
                assert_eq!(verification.to_string(), "channel-join");
            }
            other => panic!("expected Pending, got {:?}", other),
        }
        assert_eq!(db.get_user(7).unwrap().unwrap().pending_tasks, vec![3]);

        // Admin confirms; the ledger is still untouched
        engine.set_verified(7, 3, true).unwrap();
        let user = db.get_user(7).unwrap().unwrap();
        assert_eq!(user.xp, 0);
        assert!(user.completed_tasks.is_empty());

        // Step 2: the next completion call issues the reward
        let outcome = engine.complete(7, 3, serde_json::json!({})).unwrap();
        match outcome {
            CompletionOutcome::Completed { user, .. } => {
                assert_eq!(user.xp, 20);
                assert_eq!(user.completed_tasks, vec![3]);
                assert!(user.pending_tasks.is_empty());
            }
            other => panic!("expected Completed, got {:?}", other),
        }

        // And only once
        let outcome = engine.complete(7, 3, serde_json::json!({})).unwrap();
        assert!(matches!(outcome, CompletionOutcome::AlreadyCompleted { .. }));
        assert_eq!(db.get_user(7).unwrap().unwrap().xp, 20);
    }

    #[test]
    fn test_badge_task_grants_single_badge() {
        let (db, engine) = engine();

        engine.complete(7, 1, serde_json::json!({"invited": 123})).unwrap();
        engine.set_verified(7, 1, true).unwrap();
        engine.complete(7, 1, serde_json::json!({})).unwrap();

        let user = db.get_user(7).unwrap().unwrap();
        assert_eq!(user.badges, vec!["Davetçi".to_string()]);

        // Even a direct second issuance attempt cannot duplicate the badge
        assert!(db
            .issue_reward_once(7, 1, &crate::types::Reward::Badge("Davetçi".to_string()))
            .unwrap()
            .is_none());
        assert_eq!(db.get_user(7).unwrap().unwrap().badges.len(), 1);
    }

    #[test]
    fn test_star_task_credits_balance() {
        let (db, engine) = engine();

        engine.complete(7, 4, serde_json::json!({})).unwrap();
        engine.set_verified(7, 4, true).unwrap();
        engine.complete(7, 4, serde_json::json!({})).unwrap();

        assert_eq!(db.get_user(7).unwrap().unwrap().stars, 5);
    }

    #[test]
    fn test_auto_verify_policy_skips_admin() {
        let (db, engine) = engine_with_policy(Arc::new(AllowListAutoVerify::new([3])));

        // First call records the attempt (already verified) and reports pending
        let outcome = engine.complete(7, 3, serde_json::json!({})).unwrap();
        assert!(matches!(outcome, CompletionOutcome::Pending { .. }));
        assert!(db.get_verification(7, 3).unwrap().unwrap().verified);

        // Second call resolves without any admin action
        let outcome = engine.complete(7, 3, serde_json::json!({})).unwrap();
        assert!(matches!(outcome, CompletionOutcome::Completed { .. }));
        assert_eq!(db.get_user(7).unwrap().unwrap().xp, 20);
    }

    #[test]
    fn test_auto_verify_ignores_other_tasks() {
        let (db, engine) = engine_with_policy(Arc::new(AllowListAutoVerify::new([3])));
        engine.complete(7, 4, serde_json::json!({})).unwrap();
        assert!(!db.get_verification(7, 4).unwrap().unwrap().verified);
    }

    #[test]
    fn test_admin_verify_without_attempt_is_not_found() {
        let (_db, engine) = engine();
        let result = engine.set_verified(7, 3, true);
        assert!(matches!(result, Err(PlatformError::NotFound(_))));
    }

    #[test]
    fn test_admin_revoke_returns_task_to_pending() {
        let (_db, engine) = engine();

        engine.complete(7, 3, serde_json::json!({})).unwrap();
        engine.set_verified(7, 3, true).unwrap();
        engine.set_verified(7, 3, false).unwrap();

        let outcome = engine.complete(7, 3, serde_json::json!({})).unwrap();
        assert!(matches!(outcome, CompletionOutcome::Pending { .. }));
    }

    #[test]
    fn test_admin_cannot_flip_resolved_attempt() {
        let (_db, engine) = engine();

        engine.complete(7, 3, serde_json::json!({})).unwrap();
        engine.set_verified(7, 3, true).unwrap();
        engine.complete(7, 3, serde_json::json!({})).unwrap();

        // The workflow is finished; further admin flips are rejected
        let result = engine.set_verified(7, 3, false);
        assert!(matches!(result, Err(PlatformError::Validation(_))));
    }

    #[test]
    fn test_unresolved_listing_feeds_admin_panel() {
        let (db, engine) = engine();
        db.ensure_user(8, None).unwrap();

        engine.complete(7, 3, serde_json::json!({})).unwrap();
        engine.complete(8, 4, serde_json::json!({})).unwrap();
        engine.set_verified(7, 3, true).unwrap();

        let unresolved = engine.unresolved_verifications().unwrap();
        assert_eq!(unresolved.len(), 1);
        assert_eq!(unresolved[0].telegram_id, 8);
    }

    #[test]
    fn test_active_tasks_hides_disabled() {
        let (db, engine) = engine();
        db.set_task_active(5, false).unwrap();
        let tasks = engine.active_tasks().unwrap();
        assert!(tasks.iter().all(|t| t.id != 5));
        assert_eq!(tasks.len(), default_catalog().len() - 1);
    }
}
