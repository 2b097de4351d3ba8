//! A media asset as recorded by the application, and where it lands in the bucket.

use serde::Serialize;
use sqlx::FromRow;
use std::fmt;

/// One row of the media catalog.
///
/// A read-only snapshot taken when the job starts. Downstream components
/// borrow it and never mutate it.
#[derive(Serialize, Clone, FromRow, Debug, PartialEq, Eq)]
pub struct AssetRecord {
    /// Stable identifier of the media item (primary key in the catalog).
    pub id: i64,

    /// Storage path relative to the media root, `/`-separated.
    pub path: String,

    /// Hex digest recorded by the application, if any (SHA-256 or MD5).
    pub checksum: Option<String>,
}

impl AssetRecord {
    /// MIME type derived from the file extension of `path`.
    pub fn content_type(&self) -> &'static str {
        let ext = self
            .path
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase());

        match ext.as_deref() {
            Some("png") => "image/png",
            Some("jpg" | "jpeg") => "image/jpeg",
            Some("gif") => "image/gif",
            Some("webp") => "image/webp",
            _ => "application/octet-stream",
        }
    }
}

/// Destination object identity: bucket name plus object key.
///
/// A pure function of the record; has no lifecycle of its own.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RemoteKey {
    pub bucket: String,
    pub key: String,
}

impl RemoteKey {
    /// Derive the key for `record`, joining an optional prefix with the
    /// record's relative path.
    pub fn for_record(bucket: &str, prefix: &str, record: &AssetRecord) -> Self {
        let path = record.path.replace('\\', "/");
        let path = path.trim_start_matches("./").trim_start_matches('/');
        let prefix = prefix.trim_matches('/');

        let key = if prefix.is_empty() {
            path.to_string()
        } else {
            format!("{prefix}/{path}")
        };

        Self {
            bucket: bucket.to_string(),
            key,
        }
    }
}

impl fmt::Display for RemoteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(path: &str) -> AssetRecord {
        AssetRecord {
            id: 1,
            path: path.to_string(),
            checksum: None,
        }
    }

    #[test]
    fn key_is_relative_path_under_prefix() {
        let key = RemoteKey::for_record("media", "submissions/", &record("ab/cd/ef/abcdef.png"));
        assert_eq!(key.key, "submissions/ab/cd/ef/abcdef.png");
        assert_eq!(key.to_string(), "s3://media/submissions/ab/cd/ef/abcdef.png");
    }

    #[test]
    fn key_strips_leading_separators() {
        let key = RemoteKey::for_record("media", "", &record("./a.png"));
        assert_eq!(key.key, "a.png");

        let key = RemoteKey::for_record("media", "", &record("/b.png"));
        assert_eq!(key.key, "b.png");
    }

    #[test]
    fn content_type_follows_extension() {
        assert_eq!(record("x.PNG").content_type(), "image/png");
        assert_eq!(record("x.jpg").content_type(), "image/jpeg");
        assert_eq!(record("x.webp").content_type(), "image/webp");
        assert_eq!(record("x.swf").content_type(), "application/octet-stream");
        assert_eq!(record("noext").content_type(), "application/octet-stream");
    }
}
