//! Aggregated result of one migration run.

use super::outcome::{AssetOutcome, TransferOutcome};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{fmt, process::ExitCode};

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct FailedAsset {
    pub id: i64,
    pub key: String,
    pub kind: &'static str,
    pub reason: String,
}

/// Counts and failures collected by the driver.
///
/// Only the driver's collecting loop mutates the report, so no locking is
/// involved.
#[derive(Serialize, Clone, Debug)]
pub struct MigrationReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub uploaded: u64,
    pub skipped: u64,
    pub failed: u64,
    /// Set when the run stopped pulling records early (interrupt).
    pub interrupted: bool,
    pub failures: Vec<FailedAsset>,
}

impl MigrationReport {
    pub fn start() -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            uploaded: 0,
            skipped: 0,
            failed: 0,
            interrupted: false,
            failures: Vec::new(),
        }
    }

    pub fn record(&mut self, outcome: &AssetOutcome) {
        match &outcome.outcome {
            TransferOutcome::Uploaded => self.uploaded += 1,
            TransferOutcome::Skipped(_) => self.skipped += 1,
            TransferOutcome::Failed(reason) => {
                self.failed += 1;
                self.failures.push(FailedAsset {
                    id: outcome.id,
                    key: outcome.key.clone(),
                    kind: reason.kind(),
                    reason: reason.to_string(),
                });
            }
        }
    }

    pub fn mark_interrupted(&mut self) {
        self.interrupted = true;
    }

    /// Stamp the finish time and put failures in a stable order so the
    /// report does not depend on completion order.
    pub fn finish(mut self) -> Self {
        self.failures
            .sort_by(|a, b| a.id.cmp(&b.id).then_with(|| a.key.cmp(&b.key)));
        self.finished_at = Some(Utc::now());
        self
    }

    pub fn total(&self) -> u64 {
        self.uploaded + self.skipped + self.failed
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0 && !self.interrupted
    }

    pub fn exit_code(&self) -> ExitCode {
        if self.is_success() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        }
    }
}

impl fmt::Display for MigrationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} assets: {} uploaded, {} skipped, {} failed",
            self.total(),
            self.uploaded,
            self.skipped,
            self.failed
        )?;
        if self.interrupted {
            writeln!(f, "run interrupted before the catalog was exhausted")?;
        }
        for failure in &self.failures {
            writeln!(f, "  FAILED id={} key={} {}", failure.id, failure.key, failure.reason)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::outcome::{FailureReason, SkipReason};

    fn outcome(id: i64, outcome: TransferOutcome) -> AssetOutcome {
        AssetOutcome {
            id,
            key: format!("{id}.png"),
            outcome,
            attempts: 1,
        }
    }

    #[test]
    fn failures_are_sorted_by_id() {
        let mut report = MigrationReport::start();
        report.record(&outcome(
            9,
            TransferOutcome::Failed(FailureReason::Transient("x".into())),
        ));
        report.record(&outcome(2, TransferOutcome::Uploaded));
        report.record(&outcome(
            3,
            TransferOutcome::Failed(FailureReason::MissingSource("y".into())),
        ));
        report.record(&outcome(4, TransferOutcome::Skipped(SkipReason::AlreadyPresent)));
        let report = report.finish();

        assert_eq!(report.total(), 4);
        assert_eq!((report.uploaded, report.skipped, report.failed), (1, 1, 2));
        let ids: Vec<_> = report.failures.iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![3, 9]);
        assert!(!report.is_success());
    }

    #[test]
    fn clean_run_succeeds_and_interrupt_does_not() {
        let mut report = MigrationReport::start();
        report.record(&outcome(1, TransferOutcome::Uploaded));
        assert!(report.clone().finish().is_success());

        report.mark_interrupted();
        assert!(!report.finish().is_success());
    }

    #[test]
    fn summary_lists_failed_ids() {
        let mut report = MigrationReport::start();
        report.record(&outcome(1, TransferOutcome::Uploaded));
        report.record(&outcome(
            2,
            TransferOutcome::Failed(FailureReason::MissingSource("gone".into())),
        ));
        let text = report.finish().to_string();

        assert!(text.contains("2 assets: 1 uploaded, 0 skipped, 1 failed"));
        assert!(text.contains("FAILED id=2 key=2.png missing-source: gone"));
        assert!(!text.contains("id=1"));
    }

    #[test]
    fn json_summary_has_counts_and_failures() {
        let mut report = MigrationReport::start();
        report.record(&outcome(
            5,
            TransferOutcome::Failed(FailureReason::DuplicateKey("s3://b/5.png".into())),
        ));
        let json = serde_json::to_value(report.finish()).unwrap();

        assert_eq!(json["failed"], 1);
        assert_eq!(json["failures"][0]["id"], 5);
        assert_eq!(json["failures"][0]["kind"], "duplicate-key");
    }
}
