//! ============================================================================
//! Auto-Verify Policy - Development shortcut as an injected strategy
//! ============================================================================
//! In production every verification-required task waits for an admin
//! decision. Development and test configurations may inject an allow-list
//! policy that marks fresh attempts for selected task ids as verified
//! immediately, so the reward path can be exercised without an operator.
//! The policy is chosen at wiring time; production builds use [`NoAutoVerify`].
//! ============================================================================

use std::collections::HashSet;
use tracing::warn;

/// Strategy deciding whether a fresh verification attempt is confirmed
/// immediately instead of waiting for an admin
pub trait AutoVerifyPolicy: Send + Sync {
    fn auto_verify(&self, task_id: u32) -> bool;
}

/// Production policy: nothing is auto-verified
pub struct NoAutoVerify;

impl AutoVerifyPolicy for NoAutoVerify {
    fn auto_verify(&self, _task_id: u32) -> bool {
        false
    }
}

/// Development policy: attempts for allow-listed task ids are confirmed
/// on creation
pub struct AllowListAutoVerify {
    task_ids: HashSet<u32>,
}

impl AllowListAutoVerify {
    pub fn new(task_ids: impl IntoIterator<Item = u32>) -> Self {
        let task_ids: HashSet<u32> = task_ids.into_iter().collect();
        if !task_ids.is_empty() {
            warn!(
                "Auto-verify enabled for task ids {:?} — development configuration only",
                task_ids
            );
        }
        Self { task_ids }
    }
}

impl AutoVerifyPolicy for AllowListAutoVerify {
    fn auto_verify(&self, task_id: u32) -> bool {
        self.task_ids.contains(&task_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_auto_verify() {
        assert!(!NoAutoVerify.auto_verify(3));
    }

    #[test]
    fn test_allow_list() {
        let policy = AllowListAutoVerify::new([3, 4]);
        assert!(policy.auto_verify(3));
        assert!(policy.auto_verify(4));
        assert!(!policy.auto_verify(1));
    }

    #[test]
    fn test_empty_allow_list_behaves_like_production() {
        let policy = AllowListAutoVerify::new([]);
        assert!(!policy.auto_verify(3));
    }
}
