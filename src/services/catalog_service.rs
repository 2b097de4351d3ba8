//! Streams media records out of the application database.

use crate::{errors::CatalogError, models::asset::AssetRecord};
use futures::{Stream, StreamExt};
use sqlx::AnyPool;

/// Reads the application's `media` table. Files live in a content-addressed
/// layout, `ab/cd/ef/abcdef....png`, so the path is derived from the SHA-256
/// the application recorded for each item.
///
/// Works on both PostgreSQL and SQLite.
pub const DEFAULT_CATALOG_QUERY: &str = "\
SELECT CAST(mediaid AS BIGINT) AS id,
       substr(sha256, 1, 2) || '/' || substr(sha256, 3, 2) || '/' || substr(sha256, 5, 2)
           || '/' || sha256 || '.' || file_type AS path,
       sha256 AS checksum
FROM media
ORDER BY mediaid";

/// Forward-only reader over the asset catalog.
///
/// The query must return `id` (integer), `path` (text) and `checksum`
/// (nullable text), in a stable order.
#[derive(Clone)]
pub struct CatalogReader {
    pool: AnyPool,
    query: String,
}

impl CatalogReader {
    pub fn new(pool: AnyPool, query: impl Into<String>) -> Self {
        Self {
            pool,
            query: query.into(),
        }
    }

    /// Rows are streamed from the server, never buffered as a whole.
    pub fn records(&self) -> impl Stream<Item = Result<AssetRecord, CatalogError>> + Send + '_ {
        sqlx::query_as::<_, AssetRecord>(&self.query)
            .fetch(&self.pool)
            .map(|row| row.map_err(CatalogError::from))
    }
}
