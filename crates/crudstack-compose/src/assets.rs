//! Build-time artifact resolution.
//!
//! Handler entry points must resolve to a module inside the packaged code
//! asset, and the mTLS trust bundle must be a readable PEM file holding at
//! least one certificate. Both are fingerprinted with SHA-256 so the
//! rendered template changes exactly when the artifact bytes change.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use crudstack_core::{ComposeError, ComposeResult, EntryPoint, Runtime};
use sha2::{Digest, Sha256};
use tracing::debug;
use walkdir::WalkDir;

/// A resolved handler code asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeAsset {
    /// Directory that gets packaged.
    pub path: PathBuf,
    /// Handler module file, relative to `path`.
    pub handler_file: PathBuf,
    /// Hex SHA-256 over the directory contents.
    pub sha256: String,
}

impl CodeAsset {
    /// Object key the packaged asset is uploaded under.
    pub fn object_key(&self) -> String {
        format!("assets/{}.zip", self.sha256)
    }
}

/// A PEM client-certificate bundle used as an mTLS trust anchor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustBundle {
    pub path: PathBuf,
    pub bytes: Vec<u8>,
    pub certificates: usize,
    pub sha256: String,
}

impl TrustBundle {
    /// Parse `bytes` as PEM; the bundle must carry certificates only.
    pub fn from_pem(path: &Path, bytes: Vec<u8>) -> ComposeResult<Self> {
        let invalid = |reason: String| ComposeError::InvalidTrustBundle {
            path: path.display().to_string(),
            reason,
        };

        let mut reader = bytes.as_slice();
        let mut certificates = 0;
        for item in rustls_pemfile::read_all(&mut reader) {
            match item.map_err(|e| invalid(e.to_string()))? {
                rustls_pemfile::Item::X509Certificate(_) => certificates += 1,
                rustls_pemfile::Item::Pkcs1Key(_)
                | rustls_pemfile::Item::Pkcs8Key(_)
                | rustls_pemfile::Item::Sec1Key(_) => {
                    return Err(invalid("bundle contains private key material".to_string()));
                }
                _ => {}
            }
        }
        if certificates == 0 {
            return Err(invalid("no PEM certificates found".to_string()));
        }

        let sha256 = hex::encode(Sha256::digest(&bytes));
        Ok(TrustBundle {
            path: path.to_path_buf(),
            bytes,
            certificates,
            sha256,
        })
    }
}

/// Resolves artifacts named by declarations.
pub trait ArtifactResolver {
    /// Find the module for `entry` inside `asset` and fingerprint the asset.
    fn resolve_code(&self, asset: &Path, entry: &EntryPoint, runtime: &Runtime) -> ComposeResult<CodeAsset>;

    /// Load and validate the PEM trust bundle at `path`.
    fn load_trust_bundle(&self, path: &Path) -> ComposeResult<TrustBundle>;
}

/// Hash `(relative path, contents)` pairs in the order given.
fn digest_entries<'a>(entries: impl IntoIterator<Item = (String, &'a [u8])>) -> String {
    let mut hasher = Sha256::new();
    for (rel, contents) in entries {
        hasher.update(rel.as_bytes());
        hasher.update([0u8]);
        hasher.update((contents.len() as u64).to_le_bytes());
        hasher.update(contents);
    }
    hex::encode(hasher.finalize())
}

fn candidate_files(entry: &EntryPoint, runtime: &Runtime) -> impl Iterator<Item = PathBuf> {
    let module = entry.module.clone();
    runtime
        .handler_extensions()
        .iter()
        .map(move |ext| PathBuf::from(format!("{module}.{ext}")))
}

fn io_error(path: &Path, source: io::Error) -> ComposeError {
    if source.kind() == io::ErrorKind::NotFound {
        ComposeError::MissingArtifact(path.display().to_string())
    } else {
        ComposeError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Resolves artifacts on the local filesystem.
#[derive(Debug, Default, Clone)]
pub struct FsResolver;

impl FsResolver {
    /// SHA-256 over every file under `dir`, visited in sorted order.
    pub fn fingerprint_dir(dir: &Path) -> ComposeResult<String> {
        let mut files = Vec::new();
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry.map_err(|e| io_error(dir, io::Error::from(e)))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(dir)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .replace('\\', "/");
            let contents = std::fs::read(entry.path()).map_err(|e| io_error(entry.path(), e))?;
            files.push((rel, contents));
        }
        Ok(digest_entries(
            files.iter().map(|(rel, contents)| (rel.clone(), contents.as_slice())),
        ))
    }
}

impl ArtifactResolver for FsResolver {
    fn resolve_code(&self, asset: &Path, entry: &EntryPoint, runtime: &Runtime) -> ComposeResult<CodeAsset> {
        if !asset.is_dir() {
            return Err(ComposeError::MissingArtifact(asset.display().to_string()));
        }
        let handler_file = candidate_files(entry, runtime)
            .find(|rel| asset.join(rel).is_file())
            .ok_or_else(|| ComposeError::UnresolvedEntryPoint {
                entry: entry.to_string(),
                asset: asset.display().to_string(),
            })?;
        let sha256 = Self::fingerprint_dir(asset)?;
        debug!(asset = %asset.display(), handler = %handler_file.display(), %sha256, "resolved code asset");
        Ok(CodeAsset {
            path: asset.to_path_buf(),
            handler_file,
            sha256,
        })
    }

    fn load_trust_bundle(&self, path: &Path) -> ComposeResult<TrustBundle> {
        if !path.is_file() {
            return Err(ComposeError::MissingArtifact(path.display().to_string()));
        }
        let bytes = std::fs::read(path).map_err(|e| io_error(path, e))?;
        TrustBundle::from_pem(path, bytes)
    }
}

/// Resolves artifacts from an in-memory file map (for testing).
#[derive(Debug, Default, Clone)]
pub struct InMemoryResolver {
    files: BTreeMap<PathBuf, Vec<u8>>,
}

impl InMemoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) -> Self {
        self.files.insert(path.into(), contents.into());
        self
    }

    fn under<'a>(&'a self, dir: &'a Path) -> impl Iterator<Item = (&'a PathBuf, &'a Vec<u8>)> + 'a {
        self.files.iter().filter(move |(path, _)| path.starts_with(dir))
    }
}

impl ArtifactResolver for InMemoryResolver {
    fn resolve_code(&self, asset: &Path, entry: &EntryPoint, runtime: &Runtime) -> ComposeResult<CodeAsset> {
        if self.under(asset).next().is_none() {
            return Err(ComposeError::MissingArtifact(asset.display().to_string()));
        }
        let handler_file = candidate_files(entry, runtime)
            .find(|rel| self.files.contains_key(&asset.join(rel)))
            .ok_or_else(|| ComposeError::UnresolvedEntryPoint {
                entry: entry.to_string(),
                asset: asset.display().to_string(),
            })?;
        let sha256 = digest_entries(self.under(asset).map(|(path, contents)| {
            let rel = path.strip_prefix(asset).unwrap_or(path).to_string_lossy().into_owned();
            (rel, contents.as_slice())
        }));
        Ok(CodeAsset {
            path: asset.to_path_buf(),
            handler_file,
            sha256,
        })
    }

    fn load_trust_bundle(&self, path: &Path) -> ComposeResult<TrustBundle> {
        let bytes = self
            .files
            .get(path)
            .ok_or_else(|| ComposeError::MissingArtifact(path.display().to_string()))?;
        TrustBundle::from_pem(path, bytes.clone())
    }
}
