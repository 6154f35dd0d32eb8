//! ============================================================================
//! Payments Module - TON purchases and star withdrawals
//! ============================================================================
//! - explorer: chain-explorer interface + toncenter HTTP client
//! - ton: payment intent initiation and confirmation polling
//! - withdraw: optimistic star payout requests
//! ============================================================================

pub mod explorer;
pub mod ton;
pub mod withdraw;

pub use explorer::{TonCenterClient, TonExplorer, TonTransaction};
pub use ton::{PaymentInitiation, TonPaymentFlow, NANOTON_PER_TON, PAYMENT_MEMO_PREFIX};
pub use withdraw::{initiate_withdrawal, is_valid_ton_address};
