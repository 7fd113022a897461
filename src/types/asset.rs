use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// A supported collateral token, identified by its uppercase symbol.
///
/// The supported set is configuration (`LedgerConfig::supported_assets`), not
/// a closed enum: listing a new collateral token must not require a code
/// change in the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct AssetType(String);

impl<'de> Deserialize<'de> for AssetType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(AssetType::new(&s))
    }
}

impl AssetType {
    pub fn new(symbol: &str) -> Self {
        AssetType(symbol.trim().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AssetType {
    fn from(s: &str) -> Self {
        AssetType::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_is_normalized() {
        assert_eq!(AssetType::new(" usdc "), AssetType::new("USDC"));
        assert_eq!(AssetType::new("sol").as_str(), "SOL");
    }
}
