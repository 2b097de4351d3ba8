//! Preflight checks run with `--check`.
//!
//! 1. The catalog database answers `SELECT 1`.
//! 2. The media root is a listable directory.
//! 3. A metadata probe against the bucket succeeds (object presence is irrelevant).

use crate::{models::asset::RemoteKey, services::object_store::ObjectStore};
use serde::Serialize;
use sqlx::AnyPool;
use std::{fmt, path::Path};
use tokio::fs;

const PROBE_KEY: &str = ".media-migrate-preflight";

#[derive(Serialize, Debug)]
pub struct CheckStatus {
    pub name: &'static str,
    pub ok: bool,
    pub error: Option<String>,
}

#[derive(Serialize, Debug)]
pub struct PreflightReport {
    pub status: &'static str,
    pub checks: Vec<CheckStatus>,
}

impl PreflightReport {
    pub fn is_ok(&self) -> bool {
        self.checks.iter().all(|c| c.ok)
    }
}

impl fmt::Display for PreflightReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for check in &self.checks {
            match &check.error {
                None => writeln!(f, "{:<10} ok", check.name)?,
                Some(err) => writeln!(f, "{:<10} FAILED: {err}", check.name)?,
            }
        }
        write!(f, "preflight {}", self.status)
    }
}

fn status(name: &'static str, result: Result<(), String>) -> CheckStatus {
    CheckStatus {
        name,
        ok: result.is_ok(),
        error: result.err(),
    }
}

pub async fn run(
    pool: &AnyPool,
    media_root: &Path,
    store: &dyn ObjectStore,
    bucket: &str,
) -> PreflightReport {
    let database = sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map(|_| ())
        .map_err(|e| format!("error: {e}"));

    let media = match fs::read_dir(media_root).await {
        Ok(_) => Ok(()),
        Err(e) => Err(format!("could not list {}: {e}", media_root.display())),
    };

    let probe_key = RemoteKey {
        bucket: bucket.to_string(),
        key: PROBE_KEY.to_string(),
    };
    let bucket_check = store
        .head(&probe_key)
        .await
        .map(|_| ())
        .map_err(|e| e.to_string());

    let checks = vec![
        status("database", database),
        status("media", media),
        status("bucket", bucket_check),
    ];
    let ok = checks.iter().all(|c| c.ok);

    PreflightReport {
        status: if ok { "ok" } else { "error" },
        checks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::MemoryStore;
    use sqlx::any::AnyPoolOptions;

    async fn memory_pool() -> AnyPool {
        sqlx::any::install_default_drivers();
        AnyPoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn all_checks_pass() {
        let tmp = tempfile::tempdir().unwrap();
        let pool = memory_pool().await;
        let store = MemoryStore::default();

        let report = run(&pool, tmp.path(), &store, "media").await;

        assert!(report.is_ok(), "{report}");
        assert_eq!(report.status, "ok");
    }

    #[tokio::test]
    async fn failing_checks_are_reported_individually() {
        let tmp = tempfile::tempdir().unwrap();
        let pool = memory_pool().await;
        let store = MemoryStore::default();
        store.fail_next_heads(1);

        let report = run(&pool, &tmp.path().join("missing"), &store, "media").await;

        assert!(!report.is_ok());
        let failed: Vec<_> = report.checks.iter().filter(|c| !c.ok).map(|c| c.name).collect();
        assert_eq!(failed, vec!["media", "bucket"]);
    }
}
