use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::types::asset::AssetType;

pub mod loader;

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct LedgerConfig {
    /// Collateral tokens the ledger accepts, by symbol.
    pub supported_assets: Vec<AssetType>,
    /// Upper bound on a single deposit-verifier call, in milliseconds.
    pub verify_timeout_ms: u64,
    /// Attempts per balance update before a write conflict is surfaced.
    pub max_store_retries: u32,
}

impl LedgerConfig {
    pub fn is_supported(&self, asset: &AssetType) -> bool {
        self.supported_assets.contains(asset)
    }

    pub fn verify_timeout(&self) -> Duration {
        Duration::from_millis(self.verify_timeout_ms)
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig {
            supported_assets: vec![AssetType::new("SOL"), AssetType::new("USDC")],
            verify_timeout_ms: 10_000,
            max_store_retries: 5,
        }
    }
}
