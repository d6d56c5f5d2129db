//! Versioned asset storage on pluggable backends.
//!
//! Assets are addressed by an [`AssetKey`] (identifier, version, optional
//! variant suffix) or by a transient file name for staged uploads. Every
//! backend implements [`AssetStore`] and reports failures through the same
//! small [`ErrorKind`] vocabulary, so callers never see provider errors.

pub mod adapters;
pub mod cli;
pub mod config;
pub mod factory;
pub mod model;
pub mod util;

pub use adapters::AssetStore;
pub use config::StoreConfig;
pub use factory::create_store;
pub use model::{
    asset::{object_name, AssetKey, AssetRef},
    error::{AssetError, AssetResult, ErrorKind},
};
