//! ============================================================================
//! VIPS-CORE: OnlyVips Platform Backend Logic
//! ============================================================================
//! This crate handles the platform's core workflows:
//! - Task completion engine with admin-reconciled verification
//! - TON payment intents with client-driven confirmation polling
//! - Star withdrawals with optimistic balance deduction
//! - Embedded redb store holding users, tasks, verifications, and payments
//! ============================================================================

pub mod config;
pub mod db;
pub mod error;
pub mod payments;
pub mod tasks;
pub mod types;

// Re-export main types for convenience
pub use config::PlatformConfig;
pub use db::PlatformDb;
pub use error::{PlatformError, Result};
pub use payments::{TonCenterClient, TonExplorer, TonPaymentFlow};
pub use tasks::CompletionEngine;
pub use types::*;
