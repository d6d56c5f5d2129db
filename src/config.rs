use clap::{Arg, ArgMatches};

use crate::{
    model::error::{AssetError, AssetResult},
    util::uri::{self, Provider},
};

pub const STORE_URI_ENV: &str = "ASSET_STORE_URI";
pub const ENDPOINT_ENV: &str = "ASSET_STORE_ENDPOINT";
pub const PUBLIC_URL_ENV: &str = "ASSET_STORE_PUBLIC_URL";

/// Which backend to use and where its data lives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreConfig {
    pub provider: Provider,
    /// Bucket name for object stores, directory for folders, empty for memory.
    pub location: String,
    /// S3-compatible endpoint; ignored by other providers.
    pub endpoint: Option<String>,
    pub public_base_url: Option<String>,
}

impl StoreConfig {
    pub fn from_uri(store_uri: &str) -> AssetResult<Self> {
        let provider = uri::parse_provider_from_uri(store_uri)?;
        let location = uri::parse_location_from_uri(store_uri).to_string();

        if provider != Provider::Memory && location.is_empty() {
            return Err(AssetError::Configuration {
                message: format!("missing bucket or path in: {}", store_uri),
                source: None,
            });
        }

        Ok(Self {
            provider,
            location,
            endpoint: None,
            public_base_url: None,
        })
    }

    pub fn with_endpoint(mut self, endpoint: Option<String>) -> Self {
        self.endpoint = endpoint.filter(|e| !e.is_empty());
        self
    }

    pub fn with_public_base_url(mut self, public_base_url: Option<String>) -> Self {
        self.public_base_url = public_base_url.filter(|u| !u.is_empty());
        self
    }

    /// Reads the arguments declared by [`args`].
    pub fn from_matches(matches: &ArgMatches) -> AssetResult<Self> {
        let store_uri = matches.get_one::<String>("STORE_URI").ok_or_else(|| {
            AssetError::Configuration {
                message: format!("no store uri given and {} is not set", STORE_URI_ENV),
                source: None,
            }
        })?;

        Ok(Self::from_uri(store_uri)?
            .with_endpoint(matches.get_one::<String>("endpoint").cloned())
            .with_public_base_url(matches.get_one::<String>("public-base-url").cloned()))
    }
}

pub fn args() -> Vec<Arg> {
    vec![
        Arg::new("STORE_URI")
            .help("gs://bucket, s3://bucket, file:///path or memory://")
            .env(STORE_URI_ENV)
            .required(true)
            .index(1),
        Arg::new("endpoint")
            .long("endpoint")
            .help("endpoint of an S3-compatible service")
            .env(ENDPOINT_ENV)
            .global(true),
        Arg::new("public-base-url")
            .long("public-base-url")
            .help("base url objects are publicly served from")
            .env(PUBLIC_URL_ENV)
            .global(true),
    ]
}
