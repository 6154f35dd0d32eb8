// ============================================================================
// vips-server — OnlyVips platform API
// ============================================================================
// Serves the miniapp endpoints: task catalog + completion, admin
// verification, TON payment initiation/confirmation, star withdrawals.
// Identity arrives via gateway headers (see auth.rs); everything else is
// configured through the environment (see vips_core::config).
// ============================================================================

mod auth;
mod error;
mod routes;
mod state;

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::Result;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use vips_core::tasks::default_catalog;
use vips_core::{CompletionEngine, PlatformConfig, PlatformDb, TonCenterClient, TonPaymentFlow};

use crate::state::AppState;

#[actix_web::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = PlatformConfig::from_env();
    if config.receiver_wallet.is_empty() {
        warn!("TON_RECEIVER_WALLET is not set — payment initiation will be rejected");
    }

    let db = Arc::new(PlatformDb::open(config.db_path.as_deref())?);
    let seeded = db.seed_tasks(&default_catalog())?;
    if seeded > 0 {
        info!("Task catalog seeded ({} new tasks)", seeded);
    }

    let explorer = Arc::new(TonCenterClient::new(
        &config.explorer_base_url,
        config.explorer_api_key.clone(),
    ));

    let state = web::Data::new(AppState {
        engine: CompletionEngine::new(db.clone(), config.auto_verify_policy()),
        payments: TonPaymentFlow::new(db.clone(), explorer, config.receiver_wallet.clone()),
        db,
    });

    info!("Listening on {}", config.bind_addr);
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(Cors::permissive())
            .configure(routes::configure)
    })
    .bind(&config.bind_addr)?
    .run()
    .await?;

    Ok(())
}
