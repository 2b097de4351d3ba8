//! Maps catalog records to files under the media root.

use crate::{errors::LocalMissing, models::asset::AssetRecord};
use std::{
    io::{self, ErrorKind},
    path::{Component, Path, PathBuf},
};
use tokio::fs::{self, File};

/// Local counterpart of an [`AssetRecord`]. Its content hash is computed by
/// the transfer worker when the body is read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalAsset {
    pub path: PathBuf,
    pub size: u64,
}

#[derive(Clone, Debug)]
pub struct LocalResolver {
    /// Canonical media root.
    root: PathBuf,
}

impl LocalResolver {
    /// Fails if the root does not exist; a missing media root is a setup error,
    /// not a per-asset one.
    pub fn new(root: impl AsRef<Path>) -> io::Result<Self> {
        let root = std::fs::canonicalize(root)?;
        if !root.is_dir() {
            return Err(io::Error::new(
                ErrorKind::NotADirectory,
                format!("media root {} is not a directory", root.display()),
            ));
        }
        Ok(Self { root })
    }

    #[cfg(test)]
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn resolve(&self, record: &AssetRecord) -> Result<LocalAsset, LocalMissing> {
        let relative = Self::relative_path(&record.path)
            .ok_or_else(|| LocalMissing::OutsideRoot(record.path.clone()))?;
        let joined = self.root.join(relative);

        let path = fs::canonicalize(&joined).await.map_err(|err| match err.kind() {
            ErrorKind::NotFound => LocalMissing::NotFound(joined.clone()),
            _ => LocalMissing::Unreadable {
                path: joined.clone(),
                source: err,
            },
        })?;

        // symlinks may still point outside the tree
        if !path.starts_with(&self.root) {
            return Err(LocalMissing::OutsideRoot(record.path.clone()));
        }

        let meta = fs::metadata(&path)
            .await
            .map_err(|source| LocalMissing::Unreadable {
                path: path.clone(),
                source,
            })?;
        if !meta.is_file() {
            return Err(LocalMissing::NotAFile(path));
        }

        File::open(&path)
            .await
            .map_err(|source| LocalMissing::Unreadable {
                path: path.clone(),
                source,
            })?;

        Ok(LocalAsset {
            path,
            size: meta.len(),
        })
    }

    /// Only plain relative components are accepted; `..`, roots and drive
    /// prefixes are rejected outright.
    fn relative_path(raw: &str) -> Option<PathBuf> {
        let mut out = PathBuf::new();
        for component in Path::new(raw).components() {
            match component {
                Component::Normal(part) => out.push(part),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
            }
        }
        (!out.as_os_str().is_empty()).then_some(out)
    }
}
