//! Per-asset results produced by the transfer pipeline.

use serde::Serialize;
use thiserror::Error;

/// Result of migrating one asset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransferOutcome {
    Skipped(SkipReason),
    Uploaded,
    Failed(FailureReason),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    /// A matching object already exists under the destination key.
    AlreadyPresent,
}

/// Why an asset ended up `Failed`.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum FailureReason {
    #[error("missing-source: {0}")]
    MissingSource(String),

    #[error("checksum-mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("upload-unverified: {0}")]
    UploadUnverified(String),

    #[error("transient: {0}")]
    Transient(String),

    #[error("duplicate-key: {0}")]
    DuplicateKey(String),

    #[error("rejected: {0}")]
    Rejected(String),

    #[error("cancelled before upload")]
    Cancelled,
}

impl FailureReason {
    /// Transient and unverified failures are worth another attempt; the rest
    /// describe a defect that retrying cannot fix.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::UploadUnverified(_))
    }

    /// Short machine-readable tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingSource(_) => "missing-source",
            Self::ChecksumMismatch { .. } => "checksum-mismatch",
            Self::UploadUnverified(_) => "upload-unverified",
            Self::Transient(_) => "transient",
            Self::DuplicateKey(_) => "duplicate-key",
            Self::Rejected(_) => "rejected",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Final outcome for one catalog record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssetOutcome {
    pub id: i64,
    pub key: String,
    pub outcome: TransferOutcome,
    /// Number of transfer attempts made (0 when no upload was tried).
    pub attempts: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_and_unverified_are_retryable() {
        assert!(FailureReason::Transient("timeout".into()).is_retryable());
        assert!(FailureReason::UploadUnverified("size".into()).is_retryable());
        assert!(!FailureReason::MissingSource("gone".into()).is_retryable());
        assert!(
            !FailureReason::ChecksumMismatch {
                expected: "a".into(),
                actual: "b".into(),
            }
            .is_retryable()
        );
        assert!(!FailureReason::DuplicateKey("k".into()).is_retryable());
        assert!(!FailureReason::Cancelled.is_retryable());
    }

    #[test]
    fn display_leads_with_kind() {
        let reason = FailureReason::MissingSource("`/m/b.png` does not exist".into());
        assert!(reason.to_string().starts_with(reason.kind()));
    }
}
