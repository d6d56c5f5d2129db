use crate::model::error::{AssetError, AssetResult};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Provider {
    AWS,
    GCS,
    Folder,
    Memory,
}

impl Provider {
    pub fn is_remote(&self) -> bool {
        matches!(self, Provider::AWS | Provider::GCS)
    }
}

pub fn parse_provider_from_uri(store_uri: &str) -> AssetResult<Provider> {
    return if store_uri.starts_with("s3://") {
        Ok(Provider::AWS)
    } else if store_uri.starts_with("gs://") {
        Ok(Provider::GCS)
    } else if store_uri.starts_with("file://") {
        Ok(Provider::Folder)
    } else if store_uri.starts_with("memory://") {
        Ok(Provider::Memory)
    } else {
        Err(AssetError::Configuration {
            message: format!("failed to parse provider of: {}", store_uri),
            source: None,
        })
    };
}

/// Bucket name for object stores, directory path for folders.
pub fn parse_location_from_uri(store_uri: &str) -> &str {
    store_uri
        .split_once("://")
        .map(|(_, rest)| rest.trim_end_matches('/'))
        .unwrap_or("")
}
