use async_trait::async_trait;
use futures::{FutureExt, StreamExt};
use google_cloud_storage::{
    client::{Client, ClientConfig},
    http::{
        buckets::get::GetBucketRequest,
        objects::{
            copy::CopyObjectRequest,
            delete::DeleteObjectRequest,
            download::Range,
            get::GetObjectRequest,
            upload::{Media, UploadObjectRequest, UploadType},
        },
    },
};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::OnceCell,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, Instrument};

use crate::{
    adapters::{self, AssetStore, Connector},
    model::{
        asset::{AssetKey, AssetRef},
        error::{AssetError, AssetResult, Disposition, ErrorKind, ProviderFailure, StoreOperation},
    },
    util::cancel::run_cancellable,
};

const CONTENT_TYPE: &str = "application/octet-stream";

/// `ifGenerationMatch=0`: only write when no live generation exists.
const IF_NOT_EXISTS: Option<i64> = Some(0);

/// The slice of the Cloud Storage JSON API the asset store needs.
#[async_trait]
pub trait GcsClient: Send + Sync {
    async fn get_bucket(&self, bucket: &str) -> Result<(), ProviderFailure>;

    async fn upload_object(
        &self,
        bucket: &str,
        object: &str,
        data: Vec<u8>,
        if_generation_match: Option<i64>,
    ) -> Result<(), ProviderFailure>;

    /// Writes the object into `destination` as its chunks arrive.
    async fn download_object(
        &self,
        bucket: &str,
        object: &str,
        destination: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<(), ProviderFailure>;

    async fn copy_object(
        &self,
        bucket: &str,
        source: &str,
        destination: &str,
        if_generation_match: Option<i64>,
    ) -> Result<(), ProviderFailure>;

    async fn delete_object(&self, bucket: &str, object: &str) -> Result<(), ProviderFailure>;
}

#[async_trait]
impl GcsClient for Client {
    async fn get_bucket(&self, bucket: &str) -> Result<(), ProviderFailure> {
        let req = GetBucketRequest {
            bucket: bucket.to_string(),
            ..Default::default()
        };

        (**self).get_bucket(&req).await.map_err(provider_failure)?;

        Ok(())
    }

    async fn upload_object(
        &self,
        bucket: &str,
        object: &str,
        data: Vec<u8>,
        if_generation_match: Option<i64>,
    ) -> Result<(), ProviderFailure> {
        let req = UploadObjectRequest {
            bucket: bucket.to_string(),
            if_generation_match,
            ..Default::default()
        };

        let mut media = Media::new(object.to_string());
        media.content_type = CONTENT_TYPE.into();

        (**self)
            .upload_object(&req, data, &UploadType::Simple(media))
            .await
            .map_err(provider_failure)?;

        Ok(())
    }

    async fn download_object(
        &self,
        bucket: &str,
        object: &str,
        destination: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<(), ProviderFailure> {
        let req = GetObjectRequest {
            bucket: bucket.to_string(),
            object: object.to_string(),
            ..Default::default()
        };

        let stream = (**self)
            .download_streamed_object(&req, &Range::default())
            .await
            .map_err(provider_failure)?;
        let mut stream = Box::pin(stream);

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(provider_failure)?;
            adapters::write_chunk(destination, &chunk).await?;
        }

        Ok(())
    }

    async fn copy_object(
        &self,
        bucket: &str,
        source: &str,
        destination: &str,
        if_generation_match: Option<i64>,
    ) -> Result<(), ProviderFailure> {
        let req = CopyObjectRequest {
            source_bucket: bucket.to_string(),
            source_object: source.to_string(),
            destination_bucket: bucket.to_string(),
            destination_object: destination.to_string(),
            if_generation_match,
            ..Default::default()
        };

        (**self).copy_object(&req).await.map_err(provider_failure)?;

        Ok(())
    }

    async fn delete_object(&self, bucket: &str, object: &str) -> Result<(), ProviderFailure> {
        let req = DeleteObjectRequest {
            bucket: bucket.to_string(),
            object: object.to_string(),
            ..Default::default()
        };

        (**self).delete_object(&req).await.map_err(provider_failure)
    }
}

fn provider_failure(err: google_cloud_storage::http::Error) -> ProviderFailure {
    match &err {
        google_cloud_storage::http::Error::Response(resp) => {
            ProviderFailure::status(resp.code, err.to_string())
        }
        _ => ProviderFailure::transport(err.to_string()),
    }
}

/// Maps a Cloud Storage failure to what the store reports for `operation`.
pub fn classify(operation: StoreOperation, status: Option<u16>) -> Disposition {
    match (operation, status) {
        (StoreOperation::Initialize, _) => Disposition::Fail(ErrorKind::ConfigurationFailure),
        (StoreOperation::Upload | StoreOperation::Copy, Some(412)) => {
            Disposition::Fail(ErrorKind::AlreadyExists)
        }
        (StoreOperation::Download | StoreOperation::Copy, Some(404)) => {
            Disposition::Fail(ErrorKind::NotFound)
        }
        (StoreOperation::Delete, Some(404)) => Disposition::Succeed,
        _ => Disposition::Fail(ErrorKind::TransportFailure),
    }
}

/// Asset store on a single Google Cloud Storage bucket.
///
/// Conditional writes use generation preconditions, so concurrent writers of
/// the same object are arbitrated by Cloud Storage itself.
pub struct GoogleCloudAssetStore<C = Client> {
    bucket_name: String,
    public_base_url: Option<String>,
    connector: Connector<C>,
    client: OnceCell<C>,
}

impl GoogleCloudAssetStore<Client> {
    /// Store authenticating with ambient credentials at `initialize` time.
    pub fn new(bucket_name: &str) -> AssetResult<Self> {
        let connector: Connector<Client> = Box::new(|| {
            async {
                let config = ClientConfig::default()
                    .with_auth()
                    .await
                    .map_err(|err| ProviderFailure::transport(err.to_string()))?;

                Ok(Client::new(config))
            }
            .boxed()
        });

        Self::with_connector(bucket_name, connector)
    }
}

impl<C: GcsClient> GoogleCloudAssetStore<C> {
    pub fn with_connector(bucket_name: &str, connector: Connector<C>) -> AssetResult<Self> {
        if bucket_name.is_empty() {
            return Err(AssetError::InvalidArgument(
                "bucket name must not be empty".to_string(),
            ));
        }

        Ok(Self {
            bucket_name: bucket_name.to_string(),
            public_base_url: None,
            connector,
            client: OnceCell::new(),
        })
    }

    pub fn with_public_base_url(mut self, public_base_url: Option<String>) -> Self {
        self.public_base_url = public_base_url;
        self
    }

    pub fn bucket_name(&self) -> &str {
        &self.bucket_name
    }

    fn client(&self) -> AssetResult<&C> {
        self.client.get().ok_or_else(AssetError::not_initialized)
    }

    async fn upload_core(&self, object: &str, data: Vec<u8>, overwrite: bool) -> AssetResult<()> {
        let client = self.client()?;
        let precondition = if overwrite { None } else { IF_NOT_EXISTS };

        match client
            .upload_object(&self.bucket_name, object, data, precondition)
            .await
        {
            Err(failure) => match classify(StoreOperation::Upload, failure.status) {
                Disposition::Succeed => Ok(()),
                Disposition::Fail(kind) => Err(AssetError::classified(kind, object, failure)),
            },
            Ok(_) => Ok(()),
        }
    }
}

#[async_trait]
impl<C: GcsClient + 'static> AssetStore for GoogleCloudAssetStore<C> {
    async fn initialize(&self, ct: &CancellationToken) -> AssetResult<()> {
        let span = info_span!("initialize", context = "initialize", bucket = %self.bucket_name);

        async {
            info!("called");

            let init = self.client.get_or_try_init(|| async {
                let client = (self.connector)().await.map_err(|failure| {
                    AssetError::configuration(
                        format!("cannot create google cloud client for bucket '{}'", self.bucket_name),
                        failure,
                    )
                })?;

                if let Err(failure) = client.get_bucket(&self.bucket_name).await {
                    let kind = match classify(StoreOperation::Initialize, failure.status) {
                        Disposition::Fail(kind) => kind,
                        Disposition::Succeed => ErrorKind::ConfigurationFailure,
                    };

                    return Err(AssetError::classified(
                        kind,
                        format!("cannot connect to google cloud bucket '{}'", self.bucket_name),
                        failure,
                    ));
                }

                Ok(client)
            });

            match run_cancellable(ct, &self.bucket_name, init).await {
                Err(err) => {
                    error!(error_message=%err, error_group="initialize");
                    Err(err)
                }
                Ok(_) => Ok(()),
            }
        }
        .instrument(span)
        .await
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
            self.client()?;

            let res = run_cancellable(ct, &object, async {
                let payload = adapters::read_payload(data, &object).await?;
                self.upload_core(&object, payload, overwrite).await
            })
            .await;

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
            let client = self.client()?;

            let res = run_cancellable(ct, &object, async {
                if let Err(failure) = client.download_object(&self.bucket_name, &object, destination).await {
                    return match classify(StoreOperation::Download, failure.status) {
                        Disposition::Fail(ErrorKind::NotFound) => Err(AssetError::classified(
                            ErrorKind::NotFound,
                            source.to_string(),
                            failure,
                        )),
                        Disposition::Fail(kind) => {
                            Err(AssetError::classified(kind, object.as_str(), failure))
                        }
                        Disposition::Succeed => Ok(()),
                    };
                }

                adapters::flush(destination, &object).await
            })
            .await;

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
            let client = self.client()?;

            let res = run_cancellable(ct, &object, async {
                match client
                    .copy_object(&self.bucket_name, source_file_name, &object, IF_NOT_EXISTS)
                    .await
                {
                    Err(failure) => match classify(StoreOperation::Copy, failure.status) {
                        Disposition::Fail(ErrorKind::NotFound) => Err(AssetError::classified(
                            ErrorKind::NotFound,
                            source_file_name,
                            failure,
                        )),
                        Disposition::Fail(kind) => {
                            Err(AssetError::classified(kind, object.as_str(), failure))
                        }
                        Disposition::Succeed => Ok(()),
                    },
                    Ok(_) => Ok(()),
                }
            })
            .await;

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
            let client = self.client()?;

            let res = run_cancellable(ct, &object, async {
                match client.delete_object(&self.bucket_name, &object).await {
                    Err(failure) => match classify(StoreOperation::Delete, failure.status) {
                        Disposition::Succeed => {
                            info!("object already absent");
                            Ok(())
                        }
                        Disposition::Fail(kind) => {
                            Err(AssetError::classified(kind, object.as_str(), failure))
                        }
                    },
                    Ok(_) => Ok(()),
                }
            })
            .await;

            if let Err(err) = &res {
                error!(error_message=%err, error_group="delete");
            }

            res
        }
        .instrument(span)
        .await
    }

    fn public_url(&self, key: &AssetKey) -> AssetResult<Option<String>> {
        self.client()?;

        Ok(adapters::public_url_for(self.public_base_url.as_deref(), &key.object_name()))
    }
}
