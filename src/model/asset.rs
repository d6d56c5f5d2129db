use std::fmt;

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};

use crate::model::error::{AssetError, AssetResult};

pub const DELIMITER: char = '_';

// `%` is escaped as well, so an escaped `_` can never be confused with a
// literal "%5F" in the input.
const KEY_PART: &AsciiSet = &CONTROLS.add(b'_').add(b'%');

/// Logical identity of a stored blob.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AssetKey {
    identifier: String,
    version: u64,
    suffix: Option<String>,
}

impl AssetKey {
    pub fn new(identifier: &str, version: u64, suffix: Option<&str>) -> AssetResult<Self> {
        if identifier.is_empty() {
            return Err(AssetError::InvalidArgument(
                "asset identifier must not be empty".to_string(),
            ));
        }

        Ok(Self {
            identifier: identifier.to_string(),
            version,
            suffix: suffix.filter(|s| !s.is_empty()).map(|s| s.to_string()),
        })
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn suffix(&self) -> Option<&str> {
        self.suffix.as_deref()
    }

    pub fn object_name(&self) -> String {
        object_name(&self.identifier, self.version, self.suffix.as_deref())
    }
}

impl fmt::Display for AssetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "id={}, version={}", self.identifier, self.version)?;
        if let Some(suffix) = &self.suffix {
            write!(f, ", suffix={}", suffix)?;
        }

        Ok(())
    }
}

/// Either a versioned asset or a transient file that is not bound to one yet.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum AssetRef {
    Asset(AssetKey),
    File(String),
}

impl AssetRef {
    pub fn file(name: &str) -> AssetResult<Self> {
        if name.is_empty() {
            return Err(AssetError::InvalidArgument(
                "file name must not be empty".to_string(),
            ));
        }

        Ok(AssetRef::File(name.to_string()))
    }

    /// Backend-neutral object key. Transient names are used verbatim.
    pub fn object_name(&self) -> String {
        match self {
            AssetRef::Asset(key) => key.object_name(),
            AssetRef::File(name) => name.clone(),
        }
    }
}

impl From<AssetKey> for AssetRef {
    fn from(key: AssetKey) -> Self {
        AssetRef::Asset(key)
    }
}

impl fmt::Display for AssetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetRef::Asset(key) => key.fmt(f),
            AssetRef::File(name) => write!(f, "file={}", name),
        }
    }
}

/// Joins `identifier`, `version` and `suffix` with `_`, skipping empty parts.
pub fn object_name(identifier: &str, version: u64, suffix: Option<&str>) -> String {
    let version = version.to_string();
    let identifier = escape_part(identifier);
    let suffix = suffix.map(escape_part).unwrap_or_default();

    let parts = [identifier.as_str(), version.as_str(), suffix.as_str()];

    return parts
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(&DELIMITER.to_string());
}

fn escape_part(part: &str) -> String {
    utf8_percent_encode(part, KEY_PART).to_string()
}
