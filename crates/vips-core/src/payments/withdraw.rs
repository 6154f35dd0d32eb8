//! ============================================================================
//! Withdrawals - Star balance payout requests
//! ============================================================================
//! Withdrawals are optimistic: the star balance is debited the moment the
//! request is recorded, and operator rejection reverses it manually.
//! ============================================================================

use tracing::debug;

use crate::db::types::WithdrawalRequest;
use crate::db::PlatformDb;
use crate::error::{PlatformError, Result};

/// Length of a TON wallet address in its user-facing (friendly) form
const FRIENDLY_ADDRESS_LEN: usize = 48;

/// Shallow shape check for a TON friendly address: 48 characters from the
/// base64url alphabet. Real validation happens when the operator executes
/// the payout.
pub fn is_valid_ton_address(address: &str) -> bool {
    address.len() == FRIENDLY_ADDRESS_LEN
        && address
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Validate and record a withdrawal request, debiting the balance
pub fn initiate_withdrawal(
    db: &PlatformDb,
    telegram_id: i64,
    amount_stars: u64,
    wallet_address: &str,
) -> Result<WithdrawalRequest> {
    if amount_stars == 0 {
        return Err(PlatformError::validation("Withdrawal amount must be positive"));
    }
    if !is_valid_ton_address(wallet_address) {
        return Err(PlatformError::validation(format!(
            "Invalid TON wallet address: {}",
            wallet_address
        )));
    }

    debug!(
        "Withdrawal request: user {} amount {} to {}",
        telegram_id, amount_stars, wallet_address
    );
    db.create_withdrawal(telegram_id, amount_stars, wallet_address)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    const GOOD_ADDRESS: &str = "EQAbcdefghijklmnopqrstuvwxyz0123456789ABCDEFGHIJ";

    fn temp_db() -> PlatformDb {
        let path = std::env::temp_dir().join(format!("vips-withdraw-test-{}.redb", Uuid::new_v4()));
        PlatformDb::open(Some(path.to_str().unwrap())).unwrap()
    }

    #[test]
    fn test_address_shape() {
        assert!(is_valid_ton_address(GOOD_ADDRESS));
        assert!(is_valid_ton_address("UQ_-abcdefghijklmnopqrstuvwxyz0123456789ABCDEFGH"));
        assert!(!is_valid_ton_address("too-short"));
        assert!(!is_valid_ton_address(&format!("{}X", GOOD_ADDRESS)));
        assert!(!is_valid_ton_address("EQ!bcdefghijklmnopqrstuvwxyz0123456789ABCDEFGHIJ"));
    }

    #[test]
    fn test_withdrawal_happy_path() {
        let db = temp_db();
        let mut user = db.ensure_user(7, None).unwrap();
        user.stars = 40;
        db.store_user(&user).unwrap();

        let request = initiate_withdrawal(&db, 7, 25, GOOD_ADDRESS).unwrap();
        assert_eq!(request.status, "pending");
        assert_eq!(db.get_user(7).unwrap().unwrap().stars, 15);
    }

    #[test]
    fn test_zero_amount_rejected() {
        let db = temp_db();
        db.ensure_user(7, None).unwrap();
        let result = initiate_withdrawal(&db, 7, 0, GOOD_ADDRESS);
        assert!(matches!(result, Err(PlatformError::Validation(_))));
    }

    #[test]
    fn test_bad_address_rejected_before_debit() {
        let db = temp_db();
        let mut user = db.ensure_user(7, None).unwrap();
        user.stars = 40;
        db.store_user(&user).unwrap();

        let result = initiate_withdrawal(&db, 7, 10, "nope");
        assert!(matches!(result, Err(PlatformError::Validation(_))));
        assert_eq!(db.get_user(7).unwrap().unwrap().stars, 40);
    }

    #[test]
    fn test_overdraft_rejected() {
        let db = temp_db();
        db.ensure_user(7, None).unwrap();
        let result = initiate_withdrawal(&db, 7, 10, GOOD_ADDRESS);
        assert!(matches!(result, Err(PlatformError::InsufficientBalance { .. })));
    }
}
