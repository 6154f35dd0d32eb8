//! ============================================================================
//! Payment Routes - TON initiation, confirmation polling, withdrawals
//! ============================================================================

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use vips_core::db::types::PaymentIntent;
use vips_core::payments::initiate_withdrawal;
use vips_core::ItemKind;

use crate::auth::Identity;
use crate::error::ApiError;
use crate::state::AppState;

/// Callers act on their own account; operators may act on any
fn check_actor(identity: &Identity, user_id: i64) -> Result<(), ApiError> {
    if identity.telegram_id == user_id || identity.is_admin {
        Ok(())
    } else {
        Err(ApiError::forbidden("Cannot act on another user's account"))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiatePaymentRequest {
    pub user_id: i64,
    pub amount: f64,
    pub item_type: ItemKind,
    pub item_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiatePaymentResponse {
    pub payment_id: String,
    pub ton_pay_url: String,
    pub qr_data: String,
    pub expires_at: i64,
}

/// POST /payments/ton/initiate
pub async fn initiate(
    identity: Identity,
    state: web::Data<AppState>,
    body: web::Json<InitiatePaymentRequest>,
) -> Result<HttpResponse, ApiError> {
    check_actor(&identity, body.user_id)?;
    let initiation =
        state
            .payments
            .initiate(body.user_id, body.amount, body.item_type, &body.item_id)?;
    Ok(HttpResponse::Ok().json(InitiatePaymentResponse {
        payment_id: initiation.payment_id,
        ton_pay_url: initiation.ton_pay_url,
        qr_data: initiation.qr_data,
        expires_at: initiation.expires_at,
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatusResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    pub updated_at: i64,
}

impl From<PaymentIntent> for PaymentStatusResponse {
    fn from(payment: PaymentIntent) -> Self {
        Self {
            status: payment.status.to_string(),
            transaction_id: payment.transaction_id,
            updated_at: payment.updated_at,
        }
    }
}

/// GET /payments/status/{payment_id}
pub async fn status(
    _identity: Identity,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let payment = state.payments.check_status(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(PaymentStatusResponse::from(payment)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawRequest {
    pub user_id: i64,
    pub amount: u64,
    pub wallet_address: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawResponse {
    pub withdrawal_id: String,
    pub status: String,
    pub created_at: i64,
}

/// POST /payments/withdraw
pub async fn withdraw(
    identity: Identity,
    state: web::Data<AppState>,
    body: web::Json<WithdrawRequest>,
) -> Result<HttpResponse, ApiError> {
    check_actor(&identity, body.user_id)?;
    let request = initiate_withdrawal(&state.db, body.user_id, body.amount, &body.wallet_address)?;
    Ok(HttpResponse::Ok().json(WithdrawResponse {
        withdrawal_id: request.withdrawal_id,
        status: request.status,
        created_at: request.created_at,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use vips_core::PaymentStatus;

    #[test]
    fn test_check_actor() {
        let user = Identity { telegram_id: 7, is_admin: false };
        assert!(check_actor(&user, 7).is_ok());
        assert!(check_actor(&user, 8).is_err());

        let admin = Identity { telegram_id: 1, is_admin: true };
        assert!(check_actor(&admin, 8).is_ok());
    }

    #[test]
    fn test_status_response_shape() {
        let now = 1_722_000_000;
        let payment = PaymentIntent {
            payment_id: "p-1".to_string(),
            telegram_id: 7,
            amount_ton: 5.0,
            currency: "TON".to_string(),
            status: PaymentStatus::Completed,
            item_kind: ItemKind::Star,
            item_id: "star".to_string(),
            transaction_id: Some("tx-1".to_string()),
            created_at: now,
            updated_at: now,
        };

        let response = PaymentStatusResponse::from(payment);
        assert_eq!(response.status, "completed");
        assert_eq!(response.transaction_id.as_deref(), Some("tx-1"));

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["transactionId"], "tx-1");
        assert_eq!(json["updatedAt"], now);
    }

    #[test]
    fn test_initiate_request_wire_names() {
        let body: InitiatePaymentRequest = serde_json::from_str(
            r#"{"userId": 7, "amount": 5.0, "itemType": "star", "itemId": "star-pack"}"#,
        )
        .unwrap();
        assert_eq!(body.user_id, 7);
        assert_eq!(body.item_type, ItemKind::Star);
    }
}
