//! ============================================================================
//! Routes - HTTP surface of the platform core
//! ============================================================================

pub mod payments;
pub mod tasks;

use actix_web::{web, HttpResponse};

/// Register all routes on the app
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/tasks", web::get().to(tasks::list_tasks))
        .route("/tasks/complete", web::post().to(tasks::complete_task))
        .route("/tasks/admin/verify", web::post().to(tasks::admin_verify))
        .route(
            "/tasks/admin/verifications",
            web::get().to(tasks::admin_list_verifications),
        )
        .route("/payments/ton/initiate", web::post().to(payments::initiate))
        .route(
            "/payments/status/{payment_id}",
            web::get().to(payments::status),
        )
        .route("/payments/withdraw", web::post().to(payments::withdraw));
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}
