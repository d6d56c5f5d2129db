use std::{
    collections::{hash_map::Entry, HashMap},
    sync::Mutex,
};

use async_trait::async_trait;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::OnceCell,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, Instrument};

use crate::{
    adapters::{self, AssetStore},
    model::{
        asset::{AssetKey, AssetRef},
        error::{AssetError, AssetResult},
    },
    util::cancel::run_cancellable,
};

type Objects = Mutex<HashMap<String, Vec<u8>>>;

/// Process-local store, mostly for tests and single-node development setups.
#[derive(Default)]
pub struct MemoryAssetStore {
    objects: OnceCell<Objects>,
}

impl MemoryAssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn objects(&self) -> AssetResult<&Objects> {
        self.objects.get().ok_or_else(AssetError::not_initialized)
    }

    /// Inserts `data` at `object`, refusing to replace an existing entry
    /// unless `overwrite` is set.
    fn store(objects: &Objects, object: &str, data: Vec<u8>, overwrite: bool) -> AssetResult<()> {
        let mut objects = Self::lock(objects, object)?;

        match objects.entry(object.to_string()) {
            Entry::Occupied(_) if !overwrite => Err(AssetError::AlreadyExists {
                subject: object.to_string(),
                source: None,
            }),
            Entry::Occupied(mut entry) => {
                entry.insert(data);
                Ok(())
            }
            Entry::Vacant(entry) => {
                entry.insert(data);
                Ok(())
            }
        }
    }

    fn lock<'a>(objects: &'a Objects, subject: &str) -> AssetResult<std::sync::MutexGuard<'a, HashMap<String, Vec<u8>>>> {
        objects
            .lock()
            .map_err(|err| AssetError::transport(subject, err.to_string()))
    }
}

#[async_trait]
impl AssetStore for MemoryAssetStore {
    async fn initialize(&self, _ct: &CancellationToken) -> AssetResult<()> {
        info!(context = "initialize", "called");
        self.objects
            .get_or_init(|| async { Mutex::new(HashMap::new()) })
            .await;

        Ok(())
    }

    async fn upload(
        &self,
        target: &AssetRef,
        data: &mut (dyn AsyncRead + Send + Unpin),
        overwrite: bool,
        ct: &CancellationToken,
    ) -> AssetResult<()> {
        let object = target.object_name();
        let span = info_span!("upload", context = "upload", object = %object, overwrite);

        async {
            info!("called");
            let objects = self.objects()?;
            let res = match run_cancellable(ct, &object, adapters::read_payload(data, &object)).await {
                Err(err) => Err(err),
                Ok(payload) => Self::store(objects, &object, payload, overwrite),
            };

            if let Err(err) = &res {
                error!(error_message=%err, error_group="upload");
            }

            res
        }
        .instrument(span)
        .await
    }

    async fn download(
        &self,
        source: &AssetRef,
        destination: &mut (dyn AsyncWrite + Send + Unpin),
        ct: &CancellationToken,
    ) -> AssetResult<()> {
        let object = source.object_name();
        let span = info_span!("download", context = "download", object = %object);

        async {
            info!("called");
            let objects = self.objects()?;

            let bytes = Self::lock(objects, &object)?.get(&object).cloned();
            let res = match bytes {
                None => Err(AssetError::NotFound {
                    subject: source.to_string(),
                    source: None,
                }),
                Some(bytes) => {
                    run_cancellable(ct, &object, adapters::write_payload(destination, &bytes, &object))
                        .await
                }
            };

            if let Err(err) = &res {
                error!(error_message=%err, error_group="download");
            }

            res
        }
        .instrument(span)
        .await
    }

    async fn copy(
        &self,
        source_file_name: &str,
        destination: &AssetKey,
        ct: &CancellationToken,
    ) -> AssetResult<()> {
        let object = destination.object_name();
        let span = info_span!("copy", context = "copy", source = source_file_name, object = %object);

        async {
            info!("called");
            let objects = self.objects()?;
            if ct.is_cancelled() {
                return Err(AssetError::Cancelled { subject: object });
            }

            let bytes = Self::lock(objects, &object)?.get(source_file_name).cloned();
            let res = match bytes {
                None => Err(AssetError::NotFound {
                    subject: source_file_name.to_string(),
                    source: None,
                }),
                Some(bytes) => Self::store(objects, &object, bytes, false),
            };

            if let Err(err) = &res {
                error!(error_message=%err, error_group="copy");
            }

            res
        }
        .instrument(span)
        .await
    }

    async fn delete(&self, target: &AssetRef, ct: &CancellationToken) -> AssetResult<()> {
        let object = target.object_name();
        let span = info_span!("delete", context = "delete", object = %object);

        async {
            info!("called");
            let objects = self.objects()?;
            if ct.is_cancelled() {
                return Err(AssetError::Cancelled { subject: object.clone() });
            }

            Self::lock(objects, &object)?.remove(&object);

            Ok(())
        }
        .instrument(span)
        .await
    }

    fn public_url(&self, _key: &AssetKey) -> AssetResult<Option<String>> {
        self.objects()?;

        Ok(None)
    }
}
