//! Error types shared across the migration pipeline.
//!
//! Only [`CatalogError`] is allowed to escape the driver. Everything else is
//! folded into a per-asset [`TransferOutcome`](crate::models::outcome::TransferOutcome).

use std::{io, path::PathBuf};
use thiserror::Error;

/// The catalog query could not be executed or produced rows of the wrong shape.
///
/// Fatal for the whole job: without a trustworthy record set nothing can be
/// migrated safely.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog unavailable: {0}")]
    Unavailable(#[from] sqlx::Error),
}

/// Why a record could not be mapped to a readable local file.
#[derive(Debug, Error)]
pub enum LocalMissing {
    #[error("path `{0}` is empty or escapes the media root")]
    OutsideRoot(String),
    #[error("`{}` does not exist", .0.display())]
    NotFound(PathBuf),
    #[error("`{}` is not a regular file", .0.display())]
    NotAFile(PathBuf),
    #[error("`{}` is unreadable: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Failures talking to the destination bucket.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Network, auth or backend I/O failure. Always treated as transient.
    #[error("s3://{bucket}/{key} unavailable: {source}")]
    Unavailable {
        bucket: String,
        key: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The backend received a body whose digest does not match `Content-MD5`.
    #[error("s3://{bucket}/{key} rejected body: digest mismatch")]
    DigestMismatch { bucket: String, key: String },

    /// The key can never be stored by this backend.
    #[error("s3://{bucket}/{key} is not a valid object key")]
    InvalidKey { bucket: String, key: String },
}

impl RemoteError {
    pub fn unavailable(
        bucket: &str,
        key: &str,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Unavailable {
            bucket: bucket.to_string(),
            key: key.to_string(),
            source: source.into(),
        }
    }
}

pub type RemoteResult<T> = Result<T, RemoteError>;
