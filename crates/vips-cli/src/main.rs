// ============================================================================
// vips-admin — CLI operations tool for the OnlyVips platform store
// ============================================================================
// Usage:
//   vips-admin stats                               Show store statistics
//   vips-admin seed-tasks                          Insert the launch catalog
//   vips-admin list-tasks                          List catalog entries
//   vips-admin set-task-active --id 3 --active false
//   vips-admin add-user --telegram-id 123 [--username name]
//   vips-admin list-verifications                  Unresolved attempts
//   vips-admin verify --user 123 --task 3 --verified true
//   vips-admin list-payments [--status pending]    Payment intents
//   vips-admin list-withdrawals                    Withdrawal queue
//   vips-admin add-package --id vip-30 --title "VIP Aylık" --price-ton 10 --duration-days 30
// ============================================================================

use std::sync::Arc;

use anyhow::Result;
use chrono::{TimeZone, Utc};
use clap::{Parser, Subcommand};

use vips_core::db::types::VipPackage;
use vips_core::tasks::{default_catalog, NoAutoVerify};
use vips_core::{CompletionEngine, PaymentStatus, PlatformDb};

/// OnlyVips platform operations tool
#[derive(Parser)]
#[command(name = "vips-admin", version, about = "Inspect and manage the OnlyVips platform store")]
struct Cli {
    /// Path to the database file (default: ~/.onlyvips/platform.redb)
    #[arg(long, global = true)]
    db_path: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show store statistics (users, tasks, verifications, payments)
    Stats,

    /// Insert launch catalog tasks that are not already present
    SeedTasks,

    /// List catalog entries
    ListTasks,

    /// Enable or disable a catalog task
    SetTaskActive {
        #[arg(long)]
        id: u32,
        #[arg(long)]
        active: bool,
    },

    /// Create a user account (mainly for test setups)
    AddUser {
        #[arg(long)]
        telegram_id: i64,
        #[arg(long)]
        username: Option<String>,
    },

    /// List unresolved verification attempts, newest first
    ListVerifications,

    /// Confirm or revoke a verification attempt
    Verify {
        /// Telegram id of the user
        #[arg(long)]
        user: i64,
        /// Task id of the attempt
        #[arg(long)]
        task: u32,
        #[arg(long)]
        verified: bool,
    },

    /// List payment intents
    ListPayments {
        /// Filter by status: pending, completed
        #[arg(long)]
        status: Option<String>,
    },

    /// List withdrawal requests
    ListWithdrawals,

    /// Register a VIP package so purchases can settle against it
    AddPackage {
        #[arg(long)]
        id: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        price_ton: f64,
        #[arg(long)]
        duration_days: u32,
    },
}

fn parse_status(s: &str) -> Result<PaymentStatus> {
    match s.to_lowercase().as_str() {
        "pending" => Ok(PaymentStatus::Pending),
        "completed" => Ok(PaymentStatus::Completed),
        _ => anyhow::bail!("Unknown status '{}'. Valid values: pending, completed", s),
    }
}

fn format_timestamp(ts: i64) -> String {
    Utc.timestamp_opt(ts, 0)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| format!("(invalid: {})", ts))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let db = Arc::new(PlatformDb::open(cli.db_path.as_deref())?);

    match cli.command {
        Commands::Stats => cmd_stats(&db),
        Commands::SeedTasks => cmd_seed_tasks(&db),
        Commands::ListTasks => cmd_list_tasks(&db),
        Commands::SetTaskActive { id, active } => {
            db.set_task_active(id, active)?;
            println!("Task {} active={}", id, active);
            Ok(())
        }
        Commands::AddUser { telegram_id, username } => {
            let user = db.ensure_user(telegram_id, username.as_deref())?;
            println!("User {} ready (created {})", user.telegram_id, format_timestamp(user.created_at));
            Ok(())
        }
        Commands::ListVerifications => cmd_list_verifications(&db),
        Commands::Verify { user, task, verified } => {
            let engine = CompletionEngine::new(db.clone(), Arc::new(NoAutoVerify));
            engine.set_verified(user, task, verified)?;
            println!("Verification for user {} task {} set to {}", user, task, verified);
            Ok(())
        }
        Commands::ListPayments { status } => cmd_list_payments(&db, status),
        Commands::ListWithdrawals => cmd_list_withdrawals(&db),
        Commands::AddPackage { id, title, price_ton, duration_days } => {
            db.store_package(&VipPackage {
                package_id: id.clone(),
                title,
                price_ton,
                duration_days,
            })?;
            println!("Package {} stored", id);
            Ok(())
        }
    }
}

fn cmd_stats(db: &PlatformDb) -> Result<()> {
    let stats = db.stats()?;

    println!("=== OnlyVips Platform Store Stats ===");
    println!("Database: {}", db.path().display());
    println!();
    println!("Users:         {}", stats.total_users);
    println!("Tasks:         {} ({} active)", stats.total_tasks, stats.active_tasks);
    println!("Unresolved:    {} verification attempts", stats.unresolved_verifications);
    println!("Payments:      {} pending, {} completed", stats.pending_payments, stats.completed_payments);
    println!("Withdrawals:   {}", stats.total_withdrawals);
    println!("Subscriptions: {}", stats.total_subscriptions);

    Ok(())
}

fn cmd_seed_tasks(db: &PlatformDb) -> Result<()> {
    let inserted = db.seed_tasks(&default_catalog())?;
    println!("Seeded {} new tasks", inserted);
    Ok(())
}

fn cmd_list_tasks(db: &PlatformDb) -> Result<()> {
    let tasks = db.list_tasks()?;
    if tasks.is_empty() {
        println!("No tasks in the catalog. Run seed-tasks first.");
        return Ok(());
    }

    for task in tasks {
        println!(
            "[{}] {} — {} ({}{}{})",
            task.id,
            task.title,
            task.reward.describe(),
            task.verification,
            if task.verification_required { ", verification required" } else { "" },
            if task.is_active { "" } else { ", INACTIVE" },
        );
    }
    Ok(())
}

fn cmd_list_verifications(db: &PlatformDb) -> Result<()> {
    let attempts = db.list_unresolved_verifications(100)?;
    if attempts.is_empty() {
        println!("No unresolved verification attempts.");
        return Ok(());
    }

    for attempt in attempts {
        println!(
            "user {} task {} ({}) requested {} | data: {}",
            attempt.telegram_id,
            attempt.task_id,
            attempt.verification,
            format_timestamp(attempt.requested_at),
            attempt.data,
        );
    }
    Ok(())
}

fn cmd_list_payments(db: &PlatformDb, status: Option<String>) -> Result<()> {
    let filter = status.as_deref().map(parse_status).transpose()?;
    let payments = db.list_payments(filter)?;
    if payments.is_empty() {
        println!("No payments found.");
        return Ok(());
    }

    for payment in payments {
        println!(
            "{} user {} {} TON {:?} {} [{}] {}",
            payment.payment_id,
            payment.telegram_id,
            payment.amount_ton,
            payment.item_kind,
            payment.item_id,
            payment.status,
            payment
                .transaction_id
                .as_deref()
                .map(|tx| format!("tx {}", tx))
                .unwrap_or_default(),
        );
    }
    Ok(())
}

fn cmd_list_withdrawals(db: &PlatformDb) -> Result<()> {
    let withdrawals = db.list_withdrawals()?;
    if withdrawals.is_empty() {
        println!("No withdrawal requests.");
        return Ok(());
    }

    for request in withdrawals {
        println!(
            "{} user {} {} stars -> {} [{}] {}",
            request.withdrawal_id,
            request.telegram_id,
            request.amount_stars,
            request.wallet_address,
            request.status,
            format_timestamp(request.created_at),
        );
    }
    Ok(())
}
