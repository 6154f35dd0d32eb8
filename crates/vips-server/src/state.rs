//! Shared application state handed to every handler

use std::sync::Arc;
use vips_core::{CompletionEngine, PlatformDb, TonPaymentFlow};

pub struct AppState {
    pub db: Arc<PlatformDb>,
    pub engine: CompletionEngine,
    pub payments: TonPaymentFlow,
}
