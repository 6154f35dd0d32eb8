//! ============================================================================
//! Identity Extraction - Trusted gateway headers
//! ============================================================================
//! Telegram identity verification and JWT handling live in the upstream
//! gateway. By the time a request reaches this service, the gateway has
//! already authenticated it and injected:
//!   X-Telegram-Id:    the caller's numeric Telegram id
//!   X-Telegram-Admin: "1"/"true" for operator accounts
//! Requests without an id header are rejected with 401.
//! ============================================================================

use actix_web::dev::Payload;
use actix_web::{FromRequest, HttpRequest};
use std::future::{ready, Ready};

use crate::error::ApiError;

pub const IDENTITY_HEADER: &str = "X-Telegram-Id";
pub const ADMIN_HEADER: &str = "X-Telegram-Admin";

/// Authenticated caller identity, as asserted by the gateway
#[derive(Debug, Clone, Copy)]
pub struct Identity {
    pub telegram_id: i64,
    pub is_admin: bool,
}

impl Identity {
    /// Guard for admin-only routes
    pub fn require_admin(&self) -> Result<(), ApiError> {
        if self.is_admin {
            Ok(())
        } else {
            Err(ApiError::forbidden("Admin access required"))
        }
    }

    fn from_http_request(req: &HttpRequest) -> Result<Self, ApiError> {
        let telegram_id = req
            .headers()
            .get(IDENTITY_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or_else(|| ApiError::unauthorized("Missing or invalid identity header"))?;

        let is_admin = req
            .headers()
            .get(ADMIN_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|s| s == "1" || s.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Ok(Identity {
            telegram_id,
            is_admin,
        })
    }
}

impl FromRequest for Identity {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(Identity::from_http_request(req))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn test_identity_from_headers() {
        let req = TestRequest::default()
            .insert_header((IDENTITY_HEADER, "42"))
            .to_http_request();
        let identity = Identity::from_http_request(&req).unwrap();
        assert_eq!(identity.telegram_id, 42);
        assert!(!identity.is_admin);
    }

    #[test]
    fn test_admin_flag_variants() {
        for value in ["1", "true", "TRUE"] {
            let req = TestRequest::default()
                .insert_header((IDENTITY_HEADER, "42"))
                .insert_header((ADMIN_HEADER, value))
                .to_http_request();
            assert!(Identity::from_http_request(&req).unwrap().is_admin);
        }

        let req = TestRequest::default()
            .insert_header((IDENTITY_HEADER, "42"))
            .insert_header((ADMIN_HEADER, "0"))
            .to_http_request();
        assert!(!Identity::from_http_request(&req).unwrap().is_admin);
    }

    #[test]
    fn test_missing_identity_rejected() {
        let req = TestRequest::default().to_http_request();
        assert!(Identity::from_http_request(&req).is_err());

        let req = TestRequest::default()
            .insert_header((IDENTITY_HEADER, "not-a-number"))
            .to_http_request();
        assert!(Identity::from_http_request(&req).is_err());
    }

    #[test]
    fn test_require_admin() {
        let admin = Identity { telegram_id: 1, is_admin: true };
        assert!(admin.require_admin().is_ok());

        let user = Identity { telegram_id: 2, is_admin: false };
        assert!(user.require_admin().is_err());
    }
}
