use async_trait::async_trait;
use futures::future::BoxFuture;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::model::{
    asset::{AssetKey, AssetRef},
    error::{AssetError, AssetResult, ProviderFailure},
};

#[cfg(test)]
pub mod contract;
pub mod folder;
pub mod gcs;
pub mod memory;
#[cfg(test)]
pub mod mock;
pub mod s3;

/// Creates the backend client during `initialize`.
pub type Connector<C> = Box<dyn Fn() -> BoxFuture<'static, Result<C, ProviderFailure>> + Send + Sync>;

/// Characters that cannot appear verbatim in a URL path segment.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Storage for versioned asset blobs.
///
/// Every operation except `initialize` fails with a configuration failure
/// until `initialize` has completed successfully.
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Creates the store connection and probes it. Runs at most once.
    async fn initialize(&self, ct: &CancellationToken) -> AssetResult<()>;

    /// Writes `data` to `target`.
    ///
    /// Without `overwrite` the write only succeeds if nothing is stored at
    /// `target` yet, otherwise it fails with `AlreadyExists` and the stored
    /// object is left untouched.
    async fn upload(
        &self,
        target: &AssetRef,
        data: &mut (dyn AsyncRead + Send + Unpin),
        overwrite: bool,
        ct: &CancellationToken,
    ) -> AssetResult<()>;

    async fn download(
        &self,
        source: &AssetRef,
        destination: &mut (dyn AsyncWrite + Send + Unpin),
        ct: &CancellationToken,
    ) -> AssetResult<()>;

    /// Promotes the transient file `source_file_name` to `destination`.
    async fn copy(
        &self,
        source_file_name: &str,
        destination: &AssetKey,
        ct: &CancellationToken,
    ) -> AssetResult<()>;

    /// Deleting a missing object succeeds.
    async fn delete(&self, target: &AssetRef, ct: &CancellationToken) -> AssetResult<()>;

    /// `None` when the backend cannot serve the object directly.
    fn public_url(&self, key: &AssetKey) -> AssetResult<Option<String>>;
}

pub(crate) async fn read_payload(
    data: &mut (dyn AsyncRead + Send + Unpin),
    subject: &str,
) -> AssetResult<Vec<u8>> {
    let mut buf = Vec::new();
    data.read_to_end(&mut buf)
        .await
        .map_err(|err| AssetError::transport(subject, err))?;

    Ok(buf)
}

pub(crate) async fn write_payload(
    destination: &mut (dyn AsyncWrite + Send + Unpin),
    bytes: &[u8],
    subject: &str,
) -> AssetResult<()> {
    destination
        .write_all(bytes)
        .await
        .map_err(|err| AssetError::transport(subject, err))?;

    flush(destination, subject).await
}

/// Used by clients that stream a download into the caller's writer.
pub(crate) async fn write_chunk(
    destination: &mut (dyn AsyncWrite + Send + Unpin),
    chunk: &[u8],
) -> Result<(), ProviderFailure> {
    destination
        .write_all(chunk)
        .await
        .map_err(|err| ProviderFailure::transport(format!("cannot write downloaded data: {}", err)))
}

pub(crate) async fn flush(
    destination: &mut (dyn AsyncWrite + Send + Unpin),
    subject: &str,
) -> AssetResult<()> {
    destination
        .flush()
        .await
        .map_err(|err| AssetError::transport(subject, err))
}

/// `stored_name` is the name the backend keeps the object under; it is
/// escaped so that the server decodes the path back to exactly that name.
pub(crate) fn public_url_for(base_url: Option<&str>, stored_name: &str) -> Option<String> {
    base_url.map(|base| {
        format!(
            "{}/{}",
            base.trim_end_matches('/'),
            utf8_percent_encode(stored_name, PATH_SEGMENT)
        )
    })
}
