pub mod asset;
pub mod error;
