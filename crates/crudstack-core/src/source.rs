//! Artifact locations: local files staged at deploy time, and the object
//! store URIs they land at.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{ComposeError, ComposeResult};
use crate::names;

/// Object store location: `s3://bucket/key`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct S3Uri {
    pub bucket: String,
    pub key: String,
}

impl S3Uri {
    pub fn new(bucket: &str, key: &str) -> ComposeResult<Self> {
        names::validate_bucket_name(bucket)?;
        names::validate_object_key(key)?;
        Ok(S3Uri {
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }
}

impl fmt::Display for S3Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

/// Where an artifact named in `stack.toml` lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetSource {
    /// Local file or directory: `file:///abs/path`, `./rel`, `/abs` or a bare relative path.
    Local { path: PathBuf },
    /// Already in an object store: `s3://bucket/key`.
    S3(S3Uri),
}

impl AssetSource {
    pub fn parse(uri: &str) -> ComposeResult<Self> {
        if let Some(rest) = uri.strip_prefix("s3://") {
            let (bucket, key) = rest
                .split_once('/')
                .ok_or_else(|| ComposeError::MissingArtifact(uri.to_string()))?;
            return Ok(AssetSource::S3(S3Uri::new(bucket, key)?));
        }
        if let Some(path) = uri.strip_prefix("file://") {
            return Ok(AssetSource::Local { path: PathBuf::from(path) });
        }
        if uri.is_empty() || uri.contains("://") {
            return Err(ComposeError::MissingArtifact(uri.to_string()));
        }
        Ok(AssetSource::Local { path: PathBuf::from(uri) })
    }

    /// Resolve a local path against `base`; absolute paths and object store
    /// URIs are returned unchanged.
    pub fn relative_to(self, base: &Path) -> Self {
        match self {
            AssetSource::Local { path } if path.is_relative() => AssetSource::Local {
                path: base.join(path),
            },
            other => other,
        }
    }

    /// The local path, or `MissingArtifact` when the source is remote.
    pub fn local_path(&self) -> ComposeResult<&Path> {
        match self {
            AssetSource::Local { path } => Ok(path),
            AssetSource::S3(uri) => Err(ComposeError::MissingArtifact(format!(
                "{uri} is remote; a local artifact is required"
            ))),
        }
    }

    pub fn scheme(&self) -> &'static str {
        match self {
            AssetSource::Local { .. } => "file",
            AssetSource::S3(_) => "s3",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_s3() {
        let src = AssetSource::parse("s3://bcol-cert-bucket-pocapirud/mfjimene.com.cer").unwrap();
        assert_eq!(src.scheme(), "s3");
        assert!(src.local_path().is_err());
    }

    #[test]
    fn test_parse_local_relative() {
        let src = AssetSource::parse("certs/mfjimene.com.cer").unwrap();
        assert_eq!(src.scheme(), "file");
        let resolved = src.relative_to(Path::new("/srv/stack"));
        assert_eq!(
            resolved.local_path().unwrap(),
            Path::new("/srv/stack/certs/mfjimene.com.cer")
        );
    }

    #[test]
    fn test_parse_file_uri_is_absolute() {
        let src = AssetSource::parse("file:///etc/certs/ca.pem")
            .unwrap()
            .relative_to(Path::new("/ignored"));
        assert_eq!(src.local_path().unwrap(), Path::new("/etc/certs/ca.pem"));
    }

    #[test]
    fn test_parse_unsupported_scheme() {
        assert!(AssetSource::parse("https://example.com/ca.pem").is_err());
        assert!(AssetSource::parse("s3://bucket-only").is_err());
    }

    #[test]
    fn test_s3_uri_display() {
        let uri = S3Uri::new("bcol-cert-bucket-pocapirud", "mfjimene.com.cer").unwrap();
        assert_eq!(uri.to_string(), "s3://bcol-cert-bucket-pocapirud/mfjimene.com.cer");
    }
}
