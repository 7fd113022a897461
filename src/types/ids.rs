use uuid::Uuid;
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! define_id_type {
    ($name:ident) => {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                $name(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id_type!(UserId);
define_id_type!(WithdrawalId);
define_id_type!(EntryId);
define_id_type!(EventId);

impl UserId {
    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(UserId(Uuid::parse_str(s)?))
    }
}

/// External trade/order reference. Assigned by the trading engine, so it is an
/// opaque string rather than a UUID minted here.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TradeId(pub String);

impl TradeId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TradeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TradeId {
    fn from(s: &str) -> Self {
        TradeId(s.to_string())
    }
}

impl From<String> for TradeId {
    fn from(s: String) -> Self {
        TradeId(s)
    }
}
