//! ============================================================================
//! Core Types - Rewards, verification tags, task progress state machine
//! ============================================================================
//! Domain enums shared by the completion engine, the payment flow, and the
//! HTTP/CLI surfaces.
//! ============================================================================

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::db::types::UserAccount;
use crate::error::{PlatformError, Result};

/// Reward attached to a task definition.
/// The value is interpreted per variant: XP and stars are numeric ledger
/// deltas, a badge is a named label inserted with set semantics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reward {
    Xp(u64),
    Stars(u64),
    Badge(String),
}

impl Reward {
    /// Apply this reward to a user's ledger and return the user-facing
    /// message. Badge grants are idempotent: granting a badge the user
    /// already holds leaves the set unchanged.
    ///
    /// Same reward, same effect — callers guarantee this runs at most once
    /// per (user, task) resolution.
    pub fn apply(&self, user: &mut UserAccount) -> String {
        match self {
            Reward::Xp(value) => {
                user.xp += value;
                format!("+{} XP kazandın!", value)
            }
            Reward::Stars(value) => {
                user.stars += value;
                format!("{} yıldız kazandın!", value)
            }
            Reward::Badge(name) => {
                user.grant_badge(name);
                format!("\"{}\" rozetini kazandın!", name)
            }
        }
    }

    /// Short description for catalog listings
    pub fn describe(&self) -> String {
        match self {
            Reward::Xp(value) => format!("{} XP", value),
            Reward::Stars(value) => format!("{} yıldız", value),
            Reward::Badge(name) => format!("\"{}\" rozeti", name),
        }
    }
}

/// External proof mechanism backing a verification-required task.
/// Informational tag only: the engine never interprets it, the miniapp
/// uses it to pick which instructions to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VerificationKind {
    ChannelJoin,
    ForwardMessage,
    Referral,
    ManualReview,
}

impl fmt::Display for VerificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            VerificationKind::ChannelJoin => "channel-join",
            VerificationKind::ForwardMessage => "forward-message",
            VerificationKind::Referral => "referral",
            VerificationKind::ManualReview => "manual-review",
        };
        write!(f, "{}", tag)
    }
}

/// What a payment intent purchases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Star,
    Package,
    Content,
}

/// Payment intent lifecycle. Completed is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentStatus::Pending => write!(f, "pending"),
            PaymentStatus::Completed => write!(f, "completed"),
        }
    }
}

/// Per-(user, task) progress through the verification workflow.
///
/// For verification-required tasks, RewardIssued is reachable only through
/// Verified. Tasks without verification skip the machine: they go straight
/// from Unrequested to RewardIssued via [`ProgressEvent::Issue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskProgress {
    Unrequested,
    PendingVerification,
    Verified,
    RewardIssued,
}

/// Events that move task progress forward (or back, for admin rejection)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressEvent {
    /// User submits a completion attempt for a verification-required task
    Request,
    /// Admin (or the dev auto-verify policy) confirms the proof
    Approve,
    /// Admin revokes a previously granted confirmation
    Reject,
    /// Reward issuance on resolution
    Issue,
}

impl TaskProgress {
    /// Derive the current progress from stored state.
    /// `verified` is the flag of the verification attempt, if one exists.
    pub fn derive(completed: bool, attempt_verified: Option<bool>) -> Self {
        if completed {
            return TaskProgress::RewardIssued;
        }
        match attempt_verified {
            Some(true) => TaskProgress::Verified,
            Some(false) => TaskProgress::PendingVerification,
            None => TaskProgress::Unrequested,
        }
    }

    /// The single transition function of the workflow. Invalid transitions
    /// (e.g. issuing a reward for an unverified attempt) are rejected.
    pub fn advance(self, event: ProgressEvent) -> Result<TaskProgress> {
        use ProgressEvent::*;
        use TaskProgress::*;

        match (self, event) {
            (Unrequested, Request) => Ok(PendingVerification),
            // Tasks without a verification step resolve immediately
            (Unrequested, Issue) => Ok(RewardIssued),
            (PendingVerification, Approve) => Ok(Verified),
            // Repeating an admin decision changes nothing
            (PendingVerification, Reject) => Ok(PendingVerification),
            (Verified, Approve) => Ok(Verified),
            (Verified, Reject) => Ok(PendingVerification),
            (Verified, Issue) => Ok(RewardIssued),
            (state, event) => Err(PlatformError::validation(format!(
                "invalid task progress transition: {:?} + {:?}",
                state, event
            ))),
        }
    }
}

/// Outcome of a completion attempt. The server translates these into the
/// structured `status` field the miniapp branches on.
#[derive(Debug, Clone)]
pub enum CompletionOutcome {
    /// Reward issued; carries the message and the updated user snapshot
    Completed { message: String, user: UserAccount },
    /// Attempt recorded (or already on file), awaiting confirmation
    Pending { verification: VerificationKind },
    /// Task was already completed earlier; nothing changed
    AlreadyCompleted { user: UserAccount },
}
