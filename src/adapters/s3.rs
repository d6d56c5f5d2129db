use async_trait::async_trait;
use aws_sdk_s3::{
    error::{DisplayErrorContext, SdkError},
    primitives::ByteStream,
};
use futures::FutureExt;
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

/// The slice of the S3 API the asset store needs.
#[async_trait]
pub trait S3Client: Send + Sync {
    async fn head_bucket(&self, bucket: &str) -> Result<(), ProviderFailure>;

    /// With `if_none_match` the request carries `If-None-Match: *`.
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        if_none_match: bool,
    ) -> Result<(), ProviderFailure>;

    /// Writes the object into `destination` as its chunks arrive.
    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        destination: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<(), ProviderFailure>;

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), ProviderFailure>;
}

#[async_trait]
impl S3Client for aws_sdk_s3::Client {
    async fn head_bucket(&self, bucket: &str) -> Result<(), ProviderFailure> {
        aws_sdk_s3::Client::head_bucket(self)
            .bucket(bucket)
            .send()
            .await
            .map_err(provider_failure)?;

        Ok(())
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        if_none_match: bool,
    ) -> Result<(), ProviderFailure> {
        let mut req = aws_sdk_s3::Client::put_object(self)
            .bucket(bucket)
            .key(key)
            .content_type(CONTENT_TYPE)
            .body(ByteStream::from(data));

        if if_none_match {
            req = req.if_none_match("*");
        }

        req.send().await.map_err(provider_failure)?;

        Ok(())
    }

    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        destination: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<(), ProviderFailure> {
        let mut o = aws_sdk_s3::Client::get_object(self)
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(provider_failure)?;

        while let Some(chunk) = o.body.next().await {
            let chunk = chunk
                .map_err(|err| ProviderFailure::transport(format!("failed to read body: {}", err)))?;
            adapters::write_chunk(destination, &chunk).await?;
        }

        Ok(())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), ProviderFailure> {
        aws_sdk_s3::Client::delete_object(self)
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(provider_failure)?;

        Ok(())
    }
}

fn provider_failure<E>(err: SdkError<E>) -> ProviderFailure
where
    E: std::error::Error + Send + Sync + 'static,
{
    let status = err.raw_response().map(|resp| resp.status().as_u16());

    ProviderFailure {
        status,
        message: DisplayErrorContext(&err).to_string(),
    }
}

/// Maps an S3 failure to what the store reports for `operation`.
///
/// 409 (`ConditionalRequestConflict`) means a competing conditional write was
/// still in flight; it stays a transport failure so the caller can retry.
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

/// `endpoint` points the client at an S3-compatible service instead of AWS.
#[derive(Clone, Debug, Default)]
pub struct S3Options {
    pub endpoint: Option<String>,
    pub public_base_url: Option<String>,
}

/// Asset store on a single S3 (or S3-compatible) bucket.
pub struct S3AssetStore<C = aws_sdk_s3::Client> {
    bucket_name: String,
    public_base_url: Option<String>,
    connector: Connector<C>,
    client: OnceCell<C>,
}

impl S3AssetStore<aws_sdk_s3::Client> {
    /// Store resolving credentials and region from the environment at
    /// `initialize` time.
    pub fn new(bucket_name: &str, options: S3Options) -> AssetResult<Self> {
        let endpoint = options.endpoint.clone();
        let connector: Connector<aws_sdk_s3::Client> = Box::new(move || {
            let endpoint = endpoint.clone();
            async move {
                let config = aws_config::load_from_env().await;
                let mut builder = aws_sdk_s3::config::Builder::from(&config);

                if let Some(endpoint) = endpoint {
                    builder = builder.endpoint_url(endpoint).force_path_style(true);
                }

                Ok(aws_sdk_s3::Client::from_conf(builder.build()))
            }
            .boxed()
        });

        Ok(Self::with_connector(bucket_name, connector)?.with_public_base_url(options.public_base_url))
    }
}

impl<C: S3Client> S3AssetStore<C> {
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

    fn client(&self) -> AssetResult<&C> {
        self.client.get().ok_or_else(AssetError::not_initialized)
    }

    fn fail(operation: StoreOperation, subject: &str, failure: ProviderFailure) -> AssetResult<()> {
        match classify(operation, failure.status) {
            Disposition::Succeed => Ok(()),
            Disposition::Fail(kind) => Err(AssetError::classified(kind, subject, failure)),
        }
    }
}

#[async_trait]
impl<C: S3Client + 'static> AssetStore for S3AssetStore<C> {
    async fn initialize(&self, ct: &CancellationToken) -> AssetResult<()> {
        let span = info_span!("initialize", context = "initialize", bucket = %self.bucket_name);

        async {
            info!("called");

            let init = self.client.get_or_try_init(|| async {
                let client = (self.connector)().await.map_err(|failure| {
                    AssetError::configuration(
                        format!("cannot create s3 client for bucket '{}'", self.bucket_name),
                        failure,
                    )
                })?;

                if let Err(failure) = client.head_bucket(&self.bucket_name).await {
                    let kind = match classify(StoreOperation::Initialize, failure.status) {
                        Disposition::Fail(kind) => kind,
                        Disposition::Succeed => ErrorKind::ConfigurationFailure,
                    };

                    return Err(AssetError::classified(
                        kind,
                        format!("cannot connect to s3 bucket '{}'", self.bucket_name),
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
        let key = target.object_name();
        let span = info_span!("upload", context = "upload", object = %key, overwrite);

        async {
            info!("called");
            let client = self.client()?;

            let res = run_cancellable(ct, &key, async {
                let payload = adapters::read_payload(data, &key).await?;

                match client
                    .put_object(&self.bucket_name, &key, payload, !overwrite)
                    .await
                {
                    Err(failure) => Self::fail(StoreOperation::Upload, &key, failure),
                    Ok(_) => Ok(()),
                }
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
        let key = source.object_name();
        let span = info_span!("download", context = "download", object = %key);

        async {
            info!("called");
            let client = self.client()?;

            let res = run_cancellable(ct, &key, async {
                if let Err(failure) = client.get_object(&self.bucket_name, &key, destination).await {
                    return Self::fail(StoreOperation::Download, &source.to_string(), failure);
                }

                adapters::flush(destination, &key).await
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
        let key = destination.object_name();
        let span = info_span!("copy", context = "copy", source = source_file_name, object = %key);

        async {
            info!("called");
            let client = self.client()?;

            // CopyObject has no If-None-Match, so the copy is a read of the
            // source followed by a conditional put of the destination.
            let res = run_cancellable(ct, &key, async {
                let mut bytes: Vec<u8> = Vec::new();
                if let Err(failure) = client.get_object(&self.bucket_name, source_file_name, &mut bytes).await {
                    return Self::fail(StoreOperation::Copy, source_file_name, failure);
                }

                match client.put_object(&self.bucket_name, &key, bytes, true).await {
                    Err(failure) => Self::fail(StoreOperation::Copy, &key, failure),
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
        let key = target.object_name();
        let span = info_span!("delete", context = "delete", object = %key);

        async {
            info!("called");
            let client = self.client()?;

            let res = run_cancellable(ct, &key, async {
                match client.delete_object(&self.bucket_name, &key).await {
                    Err(failure) => Self::fail(StoreOperation::Delete, &key, failure),
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
