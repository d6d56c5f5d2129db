use std::{
    io,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use tempfile::NamedTempFile;
use tokio::{
    fs,
    io::{AsyncRead, AsyncWrite, AsyncWriteExt},
    sync::OnceCell,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, Instrument};

use crate::{
    adapters::{self, AssetStore},
    model::{
        asset::{AssetKey, AssetRef},
        error::{AssetError, AssetResult, Disposition, ErrorKind, StoreOperation},
    },
    util::cancel::run_cancellable,
};

const FILE_NAME: &AsciiSet = &CONTROLS.add(b'/').add(b'\\').add(b'%');
const TEMP_PREFIX: &str = ".upload-";

/// Maps a filesystem error to what the store reports for `operation`.
pub fn classify(operation: StoreOperation, kind: io::ErrorKind) -> Disposition {
    match (operation, kind) {
        (StoreOperation::Initialize, _) => Disposition::Fail(ErrorKind::ConfigurationFailure),
        (StoreOperation::Upload | StoreOperation::Copy, io::ErrorKind::AlreadyExists) => {
            Disposition::Fail(ErrorKind::AlreadyExists)
        }
        (StoreOperation::Download | StoreOperation::Copy, io::ErrorKind::NotFound) => {
            Disposition::Fail(ErrorKind::NotFound)
        }
        (StoreOperation::Delete, io::ErrorKind::NotFound) => Disposition::Succeed,
        _ => Disposition::Fail(ErrorKind::TransportFailure),
    }
}

fn fail(operation: StoreOperation, subject: &str, err: io::Error) -> AssetResult<()> {
    match classify(operation, err.kind()) {
        Disposition::Succeed => Ok(()),
        Disposition::Fail(kind) => Err(AssetError::classified(kind, subject, err)),
    }
}

/// File name for an object key; never contains a separator and never starts
/// with a dot, so it cannot leave the root or collide with temporary files.
pub fn file_name(object: &str) -> String {
    let name = utf8_percent_encode(object, FILE_NAME).to_string();

    match name.strip_prefix('.') {
        Some(rest) => format!("%2E{}", rest),
        None => name,
    }
}

/// Asset store on a local directory or a mounted network share.
///
/// Objects are written to a temporary file first and published with an
/// atomic rename, or a no-clobber link when overwriting is not allowed.
pub struct FolderAssetStore {
    path: PathBuf,
    public_base_url: Option<String>,
    root: OnceCell<PathBuf>,
}

impl FolderAssetStore {
    pub fn new(path: impl Into<PathBuf>) -> AssetResult<Self> {
        let path = path.into();
        if path.as_os_str().is_empty() {
            return Err(AssetError::InvalidArgument(
                "folder path must not be empty".to_string(),
            ));
        }

        Ok(Self {
            path,
            public_base_url: None,
            root: OnceCell::new(),
        })
    }

    pub fn with_public_base_url(mut self, public_base_url: Option<String>) -> Self {
        self.public_base_url = public_base_url;
        self
    }

    fn root(&self) -> AssetResult<&Path> {
        self.root
            .get()
            .map(|root| root.as_path())
            .ok_or_else(AssetError::not_initialized)
    }

    fn object_path(&self, object: &str) -> AssetResult<PathBuf> {
        Ok(self.root()?.join(file_name(object)))
    }

    async fn open_root(&self) -> AssetResult<PathBuf> {
        let display = self.path.display().to_string();
        let configuration = |err: io::Error| {
            AssetError::configuration(format!("cannot use asset folder '{}'", display), err)
        };

        fs::create_dir_all(&self.path).await.map_err(configuration)?;
        let root = fs::canonicalize(&self.path).await.map_err(configuration)?;

        let probe = root.clone();
        tokio::task::spawn_blocking(move || tempfile::tempfile_in(probe).map(|_| ()))
            .await
            .map_err(|err| configuration(io::Error::other(err)))?
            .map_err(configuration)?;

        Ok(root)
    }
}

/// Streams `reader` into a fresh temporary file inside `root` and publishes
/// it at `path`.
async fn publish(
    root: &Path,
    path: PathBuf,
    overwrite: bool,
    reader: &mut (dyn AsyncRead + Send + Unpin),
) -> io::Result<()> {
    let dir = root.to_path_buf();
    let tmp = tokio::task::spawn_blocking(move || {
        tempfile::Builder::new().prefix(TEMP_PREFIX).tempfile_in(dir)
    })
    .await
    .map_err(io::Error::other)??;

    let mut file = fs::File::from_std(tmp.reopen()?);
    tokio::io::copy(reader, &mut file).await?;
    file.flush().await?;
    file.sync_all().await?;
    drop(file);

    tokio::task::spawn_blocking(move || persist(tmp, &path, overwrite))
        .await
        .map_err(io::Error::other)?
}

fn persist(tmp: NamedTempFile, path: &Path, overwrite: bool) -> io::Result<()> {
    let res = if overwrite {
        tmp.persist(path)
    } else {
        tmp.persist_noclobber(path)
    };

    res.map(|_| ()).map_err(|err| err.error)
}

#[async_trait]
impl AssetStore for FolderAssetStore {
    async fn initialize(&self, ct: &CancellationToken) -> AssetResult<()> {
        let span = info_span!("initialize", context = "initialize", path = %self.path.display());

        async {
            info!("called");

            let init = self.root.get_or_try_init(|| self.open_root());
            match run_cancellable(ct, &self.path.display().to_string(), init).await {
                Err(err) => {
                    error!(error_message=%err, error_group="initialize");
                    Err(err)
                }
                Ok(root) => {
                    info!(root = %root.display(), "folder ready");
                    Ok(())
                }
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
            let root = self.root()?;
            let path = self.object_path(&object)?;

            let res = run_cancellable(ct, &object, async {
                match publish(root, path, overwrite, data).await {
                    Err(err) => fail(StoreOperation::Upload, &object, err),
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
        let object = source.object_name();
        let span = info_span!("download", context = "download", object = %object);

        async {
            info!("called");
            let path = self.object_path(&object)?;

            let res = run_cancellable(ct, &object, async {
                let mut file = match fs::File::open(&path).await {
                    Err(err) => return fail(StoreOperation::Download, &source.to_string(), err),
                    Ok(file) => file,
                };

                tokio::io::copy(&mut file, &mut *destination)
                    .await
                    .map_err(|err| AssetError::transport(object.as_str(), err))?;
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
            let root = self.root()?;
            let source_path = self.object_path(source_file_name)?;
            let path = self.object_path(&object)?;

            let res = run_cancellable(ct, &object, async {
                let mut source = match fs::File::open(&source_path).await {
                    Err(err) => return fail(StoreOperation::Copy, source_file_name, err),
                    Ok(file) => file,
                };

                match publish(root, path, false, &mut source).await {
                    Err(err) => fail(StoreOperation::Copy, &object, err),
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
            let path = self.object_path(&object)?;

            let res = run_cancellable(ct, &object, async {
                match fs::remove_file(&path).await {
                    Err(err) => fail(StoreOperation::Delete, &object, err),
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
        self.root()?;

        Ok(adapters::public_url_for(
            self.public_base_url.as_deref(),
            &file_name(&key.object_name()),
        ))
    }
}
