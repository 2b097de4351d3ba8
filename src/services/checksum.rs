//! Content digests for local files and the expected checksum recorded in the catalog.

use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::io;

/// MD5 and SHA-256 of one file body, computed in a single pass.
///
/// MD5 feeds `Content-MD5` and the S3 `ETag` comparison; SHA-256 is what the
/// application records.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentDigests {
    pub size: u64,
    pub md5: [u8; 16],
    pub sha256: [u8; 32],
}

impl ContentDigests {
    pub fn compute(body: &[u8]) -> Self {
        Self {
            size: body.len() as u64,
            md5: md5::compute(body).0,
            sha256: Sha256::digest(body).into(),
        }
    }

    /// Hash on the blocking pool; bodies can be large.
    pub async fn compute_blocking(body: Bytes) -> io::Result<Self> {
        tokio::task::spawn_blocking(move || Self::compute(&body))
            .await
            .map_err(io::Error::other)
    }

    pub fn md5_hex(&self) -> String {
        hex::encode(self.md5)
    }

    pub fn sha256_hex(&self) -> String {
        hex::encode(self.sha256)
    }

    /// Base64 MD5, as sent in the `Content-MD5` header.
    pub fn content_md5(&self) -> String {
        general_purpose::STANDARD.encode(self.md5)
    }

    /// Compare against a catalog checksum. Returns the local digest that was
    /// compared on mismatch.
    pub fn verify(&self, expected: &ExpectedChecksum) -> Result<(), String> {
        let actual = match expected {
            ExpectedChecksum::Sha256(_) => self.sha256_hex(),
            ExpectedChecksum::Md5(_) => self.md5_hex(),
            ExpectedChecksum::Unrecognized(_) => self.sha256_hex(),
        };
        match expected {
            ExpectedChecksum::Sha256(hex) | ExpectedChecksum::Md5(hex) if *hex == actual => Ok(()),
            _ => Err(actual),
        }
    }
}

/// A checksum as stored in the catalog, classified by its length.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExpectedChecksum {
    Sha256(String),
    Md5(String),
    /// Neither 64 nor 32 hex digits. Never matches anything.
    Unrecognized(String),
}

impl ExpectedChecksum {
    pub fn parse(raw: &str) -> Self {
        let value = raw.trim().to_ascii_lowercase();
        let is_hex = value.bytes().all(|b| b.is_ascii_hexdigit());
        match value.len() {
            64 if is_hex => Self::Sha256(value),
            32 if is_hex => Self::Md5(value),
            _ => Self::Unrecognized(raw.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Sha256(v) | Self::Md5(v) | Self::Unrecognized(v) => v,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELLO_SHA256: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";
    const HELLO_MD5: &str = "5d41402abc4b2a76b9719d911017c592";

    #[test]
    fn digests_match_known_values() {
        let digests = ContentDigests::compute(b"hello");
        assert_eq!(digests.size, 5);
        assert_eq!(digests.sha256_hex(), HELLO_SHA256);
        assert_eq!(digests.md5_hex(), HELLO_MD5);
        assert_eq!(digests.content_md5(), "XUFAKrxLKna5cZ2REBfFkg==");
    }

    #[test]
    fn expected_checksum_is_classified_by_length() {
        assert_eq!(
            ExpectedChecksum::parse(&HELLO_SHA256.to_uppercase()),
            ExpectedChecksum::Sha256(HELLO_SHA256.into())
        );
        assert_eq!(
            ExpectedChecksum::parse(HELLO_MD5),
            ExpectedChecksum::Md5(HELLO_MD5.into())
        );
        assert_eq!(
            ExpectedChecksum::parse("h1"),
            ExpectedChecksum::Unrecognized("h1".into())
        );
    }

    #[test]
    fn verify_compares_the_matching_algorithm() {
        let digests = ContentDigests::compute(b"hello");
        assert!(digests.verify(&ExpectedChecksum::parse(HELLO_SHA256)).is_ok());
        assert!(digests.verify(&ExpectedChecksum::parse(HELLO_MD5)).is_ok());

        let other = ContentDigests::compute(b"world");
        assert_eq!(
            other.verify(&ExpectedChecksum::parse(HELLO_SHA256)),
            Err(other.sha256_hex())
        );
        assert!(digests.verify(&ExpectedChecksum::parse("h1")).is_err());
    }
}
