use std::sync::Arc;

use tracing::info;

use crate::{
    adapters::{
        folder::FolderAssetStore,
        gcs::GoogleCloudAssetStore,
        memory::MemoryAssetStore,
        s3::{S3AssetStore, S3Options},
        AssetStore,
    },
    config::StoreConfig,
    model::error::AssetResult,
    util::uri::Provider,
};

/// Builds the store selected by `config`. Nothing is contacted until
/// `initialize` is called on the result.
pub fn create_store(config: &StoreConfig) -> AssetResult<Arc<dyn AssetStore>> {
    info!(provider = ?config.provider, location = %config.location, "creating asset store");

    let store: Arc<dyn AssetStore> = match config.provider {
        Provider::GCS => Arc::new(
            GoogleCloudAssetStore::new(&config.location)?
                .with_public_base_url(config.public_base_url.clone()),
        ),
        Provider::AWS => Arc::new(S3AssetStore::new(
            &config.location,
            S3Options {
                endpoint: config.endpoint.clone(),
                public_base_url: config.public_base_url.clone(),
            },
        )?),
        Provider::Folder => Arc::new(
            FolderAssetStore::new(&config.location)?
                .with_public_base_url(config.public_base_url.clone()),
        ),
        Provider::Memory => Arc::new(MemoryAssetStore::new()),
    };

    Ok(store)
}
