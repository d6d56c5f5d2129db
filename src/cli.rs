use std::{
    io,
    path::{Path, PathBuf},
};

use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{
    adapters::AssetStore,
    config::{self, StoreConfig},
    model::{
        asset::{AssetKey, AssetRef},
        error::{AssetError, AssetResult},
    },
};

const STDIO: &str = "-";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    Check,
    Upload {
        target: AssetRef,
        input: PathBuf,
        overwrite: bool,
    },
    Download {
        source: AssetRef,
        output: PathBuf,
    },
    Copy {
        source: String,
        destination: AssetKey,
    },
    Delete {
        target: AssetRef,
    },
    Url {
        key: AssetKey,
    },
}

fn key_args(with_name: bool) -> Vec<Arg> {
    let mut args = vec![
        Arg::new("id").long("id").help("asset identifier"),
        Arg::new("version")
            .long("version")
            .help("asset version")
            .value_parser(value_parser!(u64)),
        Arg::new("suffix").long("suffix").help("variant suffix, e.g. a thumbnail size"),
    ];

    if with_name {
        args.push(
            Arg::new("name")
                .long("name")
                .help("transient file name instead of an asset key")
                .conflicts_with_all(["id", "version", "suffix"]),
        );
    }

    args
}

pub fn command() -> Command {
    Command::new("assetstore")
        .about("Stores versioned asset files in a bucket or folder")
        .args(config::args())
        .subcommand_required(true)
        .subcommand(Command::new("check").about("initialize the store and exit"))
        .subcommand(
            Command::new("upload")
                .about("upload a file")
                .args(key_args(true))
                .arg(Arg::new("FILE").required(true).help("input file, - for stdin"))
                .arg(
                    Arg::new("overwrite")
                        .long("overwrite")
                        .action(ArgAction::SetTrue)
                        .help("replace an existing object"),
                ),
        )
        .subcommand(
            Command::new("download")
                .about("download an object")
                .args(key_args(true))
                .arg(Arg::new("FILE").required(true).help("output file, - for stdout")),
        )
        .subcommand(
            Command::new("copy")
                .about("promote a transient file to an asset")
                .args(key_args(false))
                .arg(Arg::new("SOURCE").required(true).help("transient file name")),
        )
        .subcommand(
            Command::new("delete")
                .about("delete an object")
                .args(key_args(true)),
        )
        .subcommand(
            Command::new("url")
                .about("print the public url of an asset")
                .args(key_args(false)),
        )
}

fn asset_key(matches: &ArgMatches) -> AssetResult<AssetKey> {
    let id = matches
        .get_one::<String>("id")
        .ok_or_else(|| AssetError::InvalidArgument("--id is required".to_string()))?;
    let version = matches
        .get_one::<u64>("version")
        .ok_or_else(|| AssetError::InvalidArgument("--version is required".to_string()))?;
    let suffix = matches.get_one::<String>("suffix").map(|s| s.as_str());

    AssetKey::new(id, *version, suffix)
}

fn asset_ref(matches: &ArgMatches) -> AssetResult<AssetRef> {
    match matches.get_one::<String>("name") {
        Some(name) => AssetRef::file(name),
        None => Ok(AssetRef::from(asset_key(matches)?)),
    }
}

fn path(matches: &ArgMatches, id: &str) -> AssetResult<PathBuf> {
    matches
        .get_one::<String>(id)
        .map(PathBuf::from)
        .ok_or_else(|| AssetError::InvalidArgument(format!("{} is required", id)))
}

pub fn parse(matches: &ArgMatches) -> AssetResult<(StoreConfig, Action)> {
    let config = StoreConfig::from_matches(matches)?;

    let action = match matches.subcommand() {
        Some(("check", _)) => Action::Check,
        Some(("upload", sub)) => Action::Upload {
            target: asset_ref(sub)?,
            input: path(sub, "FILE")?,
            overwrite: sub.get_flag("overwrite"),
        },
        Some(("download", sub)) => Action::Download {
            source: asset_ref(sub)?,
            output: path(sub, "FILE")?,
        },
        Some(("copy", sub)) => Action::Copy {
            source: sub
                .get_one::<String>("SOURCE")
                .cloned()
                .ok_or_else(|| AssetError::InvalidArgument("SOURCE is required".to_string()))?,
            destination: asset_key(sub)?,
        },
        Some(("delete", sub)) => Action::Delete {
            target: asset_ref(sub)?,
        },
        Some(("url", sub)) => Action::Url {
            key: asset_key(sub)?,
        },
        _ => {
            return Err(AssetError::InvalidArgument(
                "unknown or missing command".to_string(),
            ))
        }
    };

    Ok((config, action))
}

async fn open_input(input: &Path) -> AssetResult<Box<dyn AsyncRead + Send + Unpin>> {
    if input == Path::new(STDIO) {
        return Ok(Box::new(tokio::io::stdin()));
    }

    let file = tokio::fs::File::open(input)
        .await
        .map_err(|err| AssetError::InvalidArgument(format!("cannot open {}: {}", input.display(), err)))?;

    Ok(Box::new(file))
}

fn cannot_create(output: &Path, err: io::Error) -> AssetError {
    AssetError::InvalidArgument(format!("cannot create {}: {}", output.display(), err))
}

/// Downloads into a temporary file next to `output` and moves it into place
/// once the whole object has arrived, so a failed download leaves `output`
/// as it was.
async fn download_to_file(
    store: &dyn AssetStore,
    source: &AssetRef,
    output: &Path,
    ct: &CancellationToken,
) -> AssetResult<()> {
    let dir = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let staged = tempfile::Builder::new()
        .prefix(".download-")
        .tempfile_in(dir)
        .map_err(|err| cannot_create(output, err))?;
    let mut file = tokio::fs::File::from_std(staged.reopen().map_err(|err| cannot_create(output, err))?);

    store.download(source, &mut file, ct).await?;
    drop(file);

    staged
        .persist(output)
        .map_err(|err| cannot_create(output, err.error))?;

    Ok(())
}

/// Runs `action` against an initialized store.
pub async fn run(store: &dyn AssetStore, action: Action, ct: &CancellationToken) -> AssetResult<()> {
    match action {
        Action::Check => {
            info!("store is reachable");
        }
        Action::Upload {
            target,
            input,
            overwrite,
        } => {
            let mut reader = open_input(&input).await?;
            store.upload(&target, &mut *reader, overwrite, ct).await?;
            info!(target = %target, "uploaded");
        }
        Action::Download { source, output } => {
            if output == Path::new(STDIO) {
                store.download(&source, &mut tokio::io::stdout(), ct).await?;
            } else {
                download_to_file(store, &source, &output, ct).await?;
            }
        }
        Action::Copy {
            source,
            destination,
        } => {
            store.copy(&source, &destination, ct).await?;
            info!(source = %source, destination = %destination, "copied");
        }
        Action::Delete { target } => {
            store.delete(&target, ct).await?;
            info!(target = %target, "deleted");
        }
        Action::Url { key } => match store.public_url(&key)? {
            Some(url) => println!("{}", url),
            None => info!(key = %key, "public urls are not supported by this store"),
        },
    }

    Ok(())
}
