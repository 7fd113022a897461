pub mod amount;
pub mod asset;
pub mod ids;
pub mod timestamp;
