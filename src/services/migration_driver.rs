//! Bounded-concurrency orchestration and retry policy.
//!
//! Records are pulled from the catalog only when one of the `concurrency`
//! slots is free (`buffer_unordered`), so at most that many assets are being
//! probed or uploaded at any moment. Outcomes are folded into the report by
//! the single collecting loop in [`MigrationDriver::run`].

use crate::{
    errors::CatalogError,
    models::{
        asset::{AssetRecord, RemoteKey},
        outcome::{AssetOutcome, FailureReason, SkipReason, TransferOutcome},
        report::MigrationReport,
    },
    services::{
        checksum::ExpectedChecksum,
        existence_oracle::{ExistenceOracle, Presence},
        local_resolver::LocalResolver,
        transfer_worker::{TransferWorker, classify},
    },
};
use futures::{Stream, StreamExt, future::Either, pin_mut};
use std::{collections::HashSet, future::Future, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Exponential backoff with a cap.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay after failed attempt number `attempt` (1-based): base, 2×base, 4×base…
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

pub struct MigrationDriver {
    resolver: LocalResolver,
    oracle: ExistenceOracle,
    worker: TransferWorker,
    bucket: String,
    key_prefix: String,
    concurrency: usize,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl MigrationDriver {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        resolver: LocalResolver,
        oracle: ExistenceOracle,
        worker: TransferWorker,
        bucket: impl Into<String>,
        key_prefix: impl Into<String>,
        concurrency: usize,
        retry: RetryPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            resolver,
            oracle,
            worker,
            bucket: bucket.into(),
            key_prefix: key_prefix.into(),
            concurrency: concurrency.max(1),
            retry,
            cancel,
        }
    }

    /// Migrate every record the stream yields.
    ///
    /// Only a catalog failure aborts the run; every per-asset problem ends up
    /// as a `Failed` entry in the report.
    pub async fn run<S>(&self, records: S) -> Result<MigrationReport, CatalogError>
    where
        S: Stream<Item = Result<AssetRecord, CatalogError>>,
    {
        let mut report = MigrationReport::start();
        let mut seen: HashSet<RemoteKey> = HashSet::new();

        info!(
            bucket = %self.bucket,
            concurrency = self.concurrency,
            max_attempts = self.retry.max_attempts,
            "starting migration"
        );

        // Key derivation and duplicate detection happen here, in catalog
        // order, before a record takes a slot.
        let outcomes = records
            .take_until(self.cancel.clone().cancelled_owned())
            .map(|item| {
                let job = item.map(|record| {
                    let key = RemoteKey::for_record(&self.bucket, &self.key_prefix, &record);
                    let duplicate = !seen.insert(key.clone());
                    (record, key, duplicate)
                });
                async move {
                    let (record, key, duplicate) = job?;
                    Ok::<_, CatalogError>(self.migrate(record, key, duplicate).await)
                }
            })
            .buffer_unordered(self.concurrency);
        pin_mut!(outcomes);

        while let Some(result) = outcomes.next().await {
            let outcome = result.inspect_err(|err| error!("aborting migration: {err}"))?;
            match &outcome.outcome {
                TransferOutcome::Failed(reason) => warn!(
                    asset_id = outcome.id,
                    key = %outcome.key,
                    attempts = outcome.attempts,
                    "asset failed: {reason}"
                ),
                other => debug!(asset_id = outcome.id, key = %outcome.key, "{other:?}"),
            }
            report.record(&outcome);
        }

        if self.cancel.is_cancelled() {
            warn!("migration interrupted; remaining catalog records were not processed");
            report.mark_interrupted();
        }

        let report = report.finish();
        info!(
            uploaded = report.uploaded,
            skipped = report.skipped,
            failed = report.failed,
            "migration finished"
        );
        Ok(report)
    }

    async fn migrate(&self, record: AssetRecord, key: RemoteKey, duplicate: bool) -> AssetOutcome {
        let finish = |outcome, attempts| AssetOutcome {
            id: record.id,
            key: key.key.clone(),
            outcome,
            attempts,
        };

        if duplicate {
            return finish(
                TransferOutcome::Failed(FailureReason::DuplicateKey(key.to_string())),
                0,
            );
        }

        let local = match self.resolver.resolve(&record).await {
            Ok(local) => local,
            Err(missing) => {
                return finish(
                    TransferOutcome::Failed(FailureReason::MissingSource(missing.to_string())),
                    0,
                );
            }
        };

        let expected = record.checksum.as_deref().map(ExpectedChecksum::parse);

        let (record_ref, local_ref, key_ref) = (&record, &local, &key);
        let expected_ref = expected.as_ref();

        let probe = self
            .with_retries(record.id, move |_| async move {
                self.oracle
                    .probe(key_ref, expected_ref, local_ref.size)
                    .await
                    .map_err(classify)
            })
            .await;
        match probe {
            (Ok(Presence::Present(meta)), _) => {
                debug!(asset_id = record.id, %key, size = meta.size, "already present");
                return finish(TransferOutcome::Skipped(SkipReason::AlreadyPresent), 0);
            }
            (Ok(Presence::Stale(meta)), _) => {
                debug!(
                    asset_id = record.id,
                    %key,
                    remote_size = meta.size,
                    remote_sha256 = meta.sha256.as_deref().unwrap_or("-"),
                    "replacing stale object"
                );
            }
            (Ok(Presence::Absent), _) => {}
            (Err(reason), _) => return finish(TransferOutcome::Failed(reason), 0),
        }

        let (result, attempts) = self
            .with_retries(record.id, move |_| async move {
                match self.worker.transfer(record_ref, local_ref, key_ref).await {
                    TransferOutcome::Failed(reason) => Err(reason),
                    other => Ok(other),
                }
            })
            .await;

        let outcome = result.unwrap_or_else(TransferOutcome::Failed);
        finish(outcome, attempts)
    }

    /// Run `op` until it succeeds, fails permanently or runs out of attempts.
    /// Returns the final result and how many attempts were made.
    async fn with_retries<T, F, Fut>(&self, asset_id: i64, mut op: F) -> (Result<T, FailureReason>, u32)
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, FailureReason>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let reason = match op(attempt).await {
                Ok(value) => return (Ok(value), attempt),
                Err(reason) => reason,
            };

            if !reason.is_retryable() || attempt >= self.retry.max_attempts {
                return (Err(reason), attempt);
            }

            let delay = self.retry.delay_after(attempt);
            warn!(
                asset_id,
                attempt,
                max_attempts = self.retry.max_attempts,
                "{reason}; retrying in {delay:.1?}"
            );

            let sleep = tokio::time::sleep(delay);
            let cancelled = self.cancel.cancelled();
            pin_mut!(sleep, cancelled);
            if let Either::Right(_) = futures::future::select(sleep, cancelled).await {
                return (Err(reason), attempt);
            }
        }
    }
}
