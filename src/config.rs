use crate::services::{catalog_service::DEFAULT_CATALOG_QUERY, migration_driver::RetryPolicy};
use anyhow::{Context, Result, bail};
use clap::Parser;
use serde::Deserialize;
use std::{env, fmt, io::ErrorKind, path::PathBuf, str::FromStr, time::Duration};

const DEFAULT_CREDENTIALS_FILE: &str = "/run/secrets/bucket-credentials.json";
const DEFAULT_CONCURRENCY: usize = 8;

/// Centralized job configuration.
/// Built once at startup from environment variables and CLI arguments, then
/// passed by reference; nothing reads the environment after this.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub media_root: PathBuf,
    pub database_url: String,
    pub bucket: String,
    /// When set, objects go to a directory-backed bucket instead of S3.
    pub bucket_dir: Option<PathBuf>,
    pub credentials_file: PathBuf,
    pub key_prefix: String,
    pub catalog_query: String,
    pub concurrency: usize,
    pub retry: RetryPolicy,
}

/// What to do once configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunMode {
    pub check: bool,
    pub json: bool,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(
    author,
    version,
    about = "Copy media assets referenced by the catalog database into an object-storage bucket"
)]
pub struct Args {
    /// Root of the local media tree (overrides MEDIA_ROOT)
    #[arg(long)]
    pub media_root: Option<PathBuf>,

    /// Catalog database URL (overrides SQLALCHEMY_URL / DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Destination bucket (overrides BUCKET_NAME)
    #[arg(long)]
    pub bucket: Option<String>,

    /// Store objects under this directory instead of S3 (overrides BUCKET_DIR)
    #[arg(long)]
    pub bucket_dir: Option<PathBuf>,

    /// Bucket credential file (overrides BUCKET_CREDENTIALS_FILE)
    #[arg(long)]
    pub credentials_file: Option<PathBuf>,

    /// Prefix prepended to every object key (overrides KEY_PREFIX)
    #[arg(long)]
    pub key_prefix: Option<String>,

    /// SQL returning `id, path, checksum` rows (overrides CATALOG_QUERY)
    #[arg(long)]
    pub catalog_query: Option<String>,

    /// Concurrent transfer slots (overrides CONCURRENCY)
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Attempts per asset, including the first (overrides MAX_ATTEMPTS)
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Initial retry backoff in milliseconds (overrides RETRY_BASE_DELAY_MS)
    #[arg(long)]
    pub retry_base_delay_ms: Option<u64>,

    /// Retry backoff cap in milliseconds (overrides RETRY_MAX_DELAY_MS)
    #[arg(long)]
    pub retry_max_delay_ms: Option<u64>,

    /// Print the final summary as JSON
    #[arg(long)]
    pub json: bool,

    /// Run preflight checks and exit
    #[arg(long)]
    pub check: bool,
}

/// Contents of the mounted credential file.
#[derive(Deserialize, Clone)]
pub struct BucketCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
}

impl fmt::Debug for BucketCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BucketCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("region", &self.region)
            .field("endpoint_url", &self.endpoint_url)
            .finish()
    }
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and run mode.
    pub fn from_env_and_args() -> Result<(Self, RunMode)> {
        Self::from_args(Args::parse(), |name| env::var(name).ok())
    }

    /// Merge `args` over the variables `lookup` resolves. CLI wins.
    pub fn from_args(args: Args, lookup: impl Fn(&str) -> Option<String>) -> Result<(Self, RunMode)> {
        let media_root = args
            .media_root
            .or_else(|| lookup("MEDIA_ROOT").map(PathBuf::from))
            .context("MEDIA_ROOT is not set (or pass --media-root)")?;
        let database_url = args
            .database_url
            .or_else(|| lookup("SQLALCHEMY_URL"))
            .or_else(|| lookup("DATABASE_URL"))
            .context("SQLALCHEMY_URL is not set (or pass --database-url)")?;
        let bucket = args
            .bucket
            .or_else(|| lookup("BUCKET_NAME"))
            .context("BUCKET_NAME is not set (or pass --bucket)")?;

        let concurrency = match args.concurrency {
            Some(n) => n,
            None => parse_var(&lookup, "CONCURRENCY", DEFAULT_CONCURRENCY)?,
        };
        if concurrency == 0 {
            bail!("concurrency must be at least 1");
        }

        let defaults = RetryPolicy::default();
        let max_attempts = match args.max_attempts {
            Some(n) => n,
            None => parse_var(&lookup, "MAX_ATTEMPTS", defaults.max_attempts)?,
        };
        if max_attempts == 0 {
            bail!("max attempts must be at least 1");
        }
        let base_ms = match args.retry_base_delay_ms {
            Some(ms) => ms,
            None => parse_var(&lookup, "RETRY_BASE_DELAY_MS", defaults.base_delay.as_millis() as u64)?,
        };
        let max_ms = match args.retry_max_delay_ms {
            Some(ms) => ms,
            None => parse_var(&lookup, "RETRY_MAX_DELAY_MS", defaults.max_delay.as_millis() as u64)?,
        };

        let cfg = Self {
            media_root,
            database_url,
            bucket,
            bucket_dir: args
                .bucket_dir
                .or_else(|| lookup("BUCKET_DIR").map(PathBuf::from)),
            credentials_file: args
                .credentials_file
                .or_else(|| lookup("BUCKET_CREDENTIALS_FILE").map(PathBuf::from))
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CREDENTIALS_FILE)),
            key_prefix: args
                .key_prefix
                .or_else(|| lookup("KEY_PREFIX"))
                .unwrap_or_default(),
            catalog_query: args
                .catalog_query
                .or_else(|| lookup("CATALOG_QUERY"))
                .unwrap_or_else(|| DEFAULT_CATALOG_QUERY.to_string()),
            concurrency,
            retry: RetryPolicy {
                max_attempts,
                base_delay: Duration::from_millis(base_ms),
                max_delay: Duration::from_millis(max_ms.max(base_ms)),
            },
        };

        let mode = RunMode {
            check: args.check,
            json: args.json,
        };
        Ok((cfg, mode))
    }

    /// One connection per worker slot plus one for the catalog cursor.
    pub fn pool_size(&self) -> u32 {
        u32::try_from(self.concurrency).unwrap_or(u32::MAX - 1) + 1
    }

    /// Read the mounted credential file. `None` when it is not mounted, in
    /// which case the default AWS provider chain applies.
    pub fn load_credentials(&self) -> Result<Option<BucketCredentials>> {
        let path = &self.credentials_file;
        match std::fs::read(path) {
            Ok(raw) => serde_json::from_slice(&raw)
                .with_context(|| format!("parsing credential file {}", path.display()))
                .map(Some),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| format!("reading credential file {}", path.display())),
        }
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .with_context(|| format!("parsing {name} value `{value}`")),
        None => Ok(default),
    }
}
