//! ============================================================================
//! Task Routes - Catalog, completion, and admin verification
//! ============================================================================

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use vips_core::db::types::{TaskDefinition, UserAccount, VerificationAttempt};
use vips_core::CompletionOutcome;

use crate::auth::Identity;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteTaskRequest {
    pub task_id: u32,
    #[serde(default)]
    pub verification_data: serde_json::Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSnapshot {
    pub telegram_id: i64,
    pub xp: u64,
    pub stars: u64,
    pub badges: Vec<String>,
    pub completed_tasks: Vec<u32>,
    pub pending_tasks: Vec<u32>,
}

impl From<UserAccount> for UserSnapshot {
    fn from(user: UserAccount) -> Self {
        Self {
            telegram_id: user.telegram_id,
            xp: user.xp,
            stars: user.stars,
            badges: user.badges,
            completed_tasks: user.completed_tasks,
            pending_tasks: user.pending_tasks,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteTaskResponse {
    pub status: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserSnapshot>,
}

impl From<CompletionOutcome> for CompleteTaskResponse {
    fn from(outcome: CompletionOutcome) -> Self {
        match outcome {
            CompletionOutcome::Completed { message, user } => CompleteTaskResponse {
                status: "ok",
                message,
                verification_type: None,
                user: Some(user.into()),
            },
            CompletionOutcome::Pending { verification } => CompleteTaskResponse {
                status: "pending",
                message: "Görev doğrulaması bekleniyor.".to_string(),
                verification_type: Some(verification.to_string()),
                user: None,
            },
            CompletionOutcome::AlreadyCompleted { user } => CompleteTaskResponse {
                status: "warning",
                message: "Bu görevi zaten tamamladın.".to_string(),
                verification_type: None,
                user: Some(user.into()),
            },
        }
    }
}

/// POST /tasks/complete
pub async fn complete_task(
    identity: Identity,
    state: web::Data<AppState>,
    body: web::Json<CompleteTaskRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    let outcome = state
        .engine
        .complete(identity.telegram_id, body.task_id, body.verification_data)?;
    Ok(HttpResponse::Ok().json(CompleteTaskResponse::from(outcome)))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskView {
    pub id: u32,
    pub title: String,
    pub description: String,
    pub reward_text: String,
    pub verification_type: String,
    pub verification_required: bool,
}

impl From<TaskDefinition> for TaskView {
    fn from(task: TaskDefinition) -> Self {
        Self {
            id: task.id,
            title: task.title,
            description: task.description,
            reward_text: task.reward_text,
            verification_type: task.verification.to_string(),
            verification_required: task.verification_required,
        }
    }
}

/// GET /tasks — the active catalog for the miniapp
pub async fn list_tasks(
    _identity: Identity,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let tasks: Vec<TaskView> = state
        .engine
        .active_tasks()?
        .into_iter()
        .map(TaskView::from)
        .collect();
    Ok(HttpResponse::Ok().json(tasks))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminVerifyRequest {
    pub user_id: i64,
    pub task_id: u32,
    pub verified: bool,
}

/// POST /tasks/admin/verify
pub async fn admin_verify(
    identity: Identity,
    state: web::Data<AppState>,
    body: web::Json<AdminVerifyRequest>,
) -> Result<HttpResponse, ApiError> {
    identity.require_admin()?;
    state
        .engine
        .set_verified(body.user_id, body.task_id, body.verified)?;
    let message = if body.verified {
        "Doğrulama onaylandı."
    } else {
        "Doğrulama geri alındı."
    };
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "message": message,
    })))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationView {
    pub user_id: i64,
    pub task_id: u32,
    pub verification_type: String,
    pub data: serde_json::Value,
    pub requested_at: i64,
}

impl From<VerificationAttempt> for VerificationView {
    fn from(attempt: VerificationAttempt) -> Self {
        let data = serde_json::from_str(&attempt.data).unwrap_or(serde_json::Value::Null);
        Self {
            user_id: attempt.telegram_id,
            task_id: attempt.task_id,
            verification_type: attempt.verification.to_string(),
            data,
            requested_at: attempt.requested_at,
        }
    }
}

/// GET /tasks/admin/verifications — unresolved attempts, newest first
pub async fn admin_list_verifications(
    identity: Identity,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    identity.require_admin()?;
    let attempts: Vec<VerificationView> = state
        .engine
        .unresolved_verifications()?
        .into_iter()
        .map(VerificationView::from)
        .collect();
    Ok(HttpResponse::Ok().json(attempts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use vips_core::VerificationKind;

    fn user() -> UserAccount {
        let mut user = UserAccount::new(42, None, 0);
        user.xp = 20;
        user.completed_tasks.push(3);
        user
    }

    #[test]
    fn test_completed_outcome_maps_to_ok() {
        let response = CompleteTaskResponse::from(CompletionOutcome::Completed {
            message: "+20 XP kazandın!".to_string(),
            user: user(),
        });
        assert_eq!(response.status, "ok");
        assert_eq!(response.user.unwrap().completed_tasks, vec![3]);
        assert!(response.verification_type.is_none());
    }

    #[test]
    fn test_pending_outcome_names_verification_type() {
        let response = CompleteTaskResponse::from(CompletionOutcome::Pending {
            verification: VerificationKind::ChannelJoin,
        });
        assert_eq!(response.status, "pending");
        assert_eq!(response.verification_type.as_deref(), Some("channel-join"));
        assert!(response.user.is_none());
    }

    #[test]
    fn test_already_completed_maps_to_warning() {
        let response =
            CompleteTaskResponse::from(CompletionOutcome::AlreadyCompleted { user: user() });
        assert_eq!(response.status, "warning");
        assert!(response.user.is_some());
    }

    #[test]
    fn test_request_accepts_missing_verification_data() {
        let body: CompleteTaskRequest = serde_json::from_str(r#"{"taskId": 3}"#).unwrap();
        assert_eq!(body.task_id, 3);
        assert!(body.verification_data.is_null());
    }
}
