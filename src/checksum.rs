//! Streaming content digests for post-transfer verification.
//!
//! The data provider publishes MD5 sums; SHA-256 is accepted as well and
//! selected by prefix (`sha256:`) or by digest length (64 hex characters).

use std::fmt;
use std::path::Path;
use std::sync::LazyLock;

use md5::Md5;
use regex::Regex;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tracing::{debug, instrument};

/// Read block size while hashing.
const DIGEST_BLOCK_SIZE: usize = 64 * 1024;

#[allow(clippy::expect_used)]
static HEX_DIGEST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[0-9a-fA-F]{32}|[0-9a-fA-F]{64})$").expect("hex digest regex is valid") // Static pattern, safe to panic
});

/// Supported digest algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChecksumAlgorithm {
    /// MD5 (32 hex characters).
    Md5,
    /// SHA-256 (64 hex characters).
    Sha256,
}

impl ChecksumAlgorithm {
    /// Length of the hex digest this algorithm produces.
    #[must_use]
    pub fn hex_len(self) -> usize {
        match self {
            Self::Md5 => 32,
            Self::Sha256 => 64,
        }
    }

    fn from_hex_len(len: usize) -> Option<Self> {
        match len {
            32 => Some(Self::Md5),
            64 => Some(Self::Sha256),
            _ => None,
        }
    }
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Md5 => write!(f, "md5"),
            Self::Sha256 => write!(f, "sha256"),
        }
    }
}

/// Rejected checksum text.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChecksumParseError {
    /// Not a 32- or 64-character hex string.
    #[error("'{0}' is not an MD5 or SHA-256 hex digest")]
    NotHex(String),

    /// Prefix names an algorithm whose digest length does not match.
    #[error("{algorithm} digest must be {expected} hex characters, got {actual}")]
    WrongLength {
        /// Algorithm named by the prefix.
        algorithm: ChecksumAlgorithm,
        /// Required length.
        expected: usize,
        /// Length supplied.
        actual: usize,
    },
}

/// Expected digest of a file, stored lowercase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedChecksum {
    algorithm: ChecksumAlgorithm,
    value: String,
}

impl ExpectedChecksum {
    /// Expected MD5 digest.
    ///
    /// # Errors
    ///
    /// Returns [`ChecksumParseError`] unless `hex` is 32 hex characters.
    pub fn md5(hex: &str) -> Result<Self, ChecksumParseError> {
        Self::parse(&format!("md5:{hex}"))
    }

    /// Parses `HEX`, `md5:HEX` or `sha256:HEX`.
    ///
    /// Without a prefix the algorithm follows from the length.
    ///
    /// # Errors
    ///
    /// Returns [`ChecksumParseError`] when the text is not a valid digest.
    pub fn parse(text: &str) -> Result<Self, ChecksumParseError> {
        let text = text.trim();
        let (prefixed, hex) = match text.split_once(':') {
            Some((name, hex)) if name.eq_ignore_ascii_case("md5") => {
                (Some(ChecksumAlgorithm::Md5), hex)
            }
            Some((name, hex)) if name.eq_ignore_ascii_case("sha256") => {
                (Some(ChecksumAlgorithm::Sha256), hex)
            }
            _ => (None, text),
        };

        if !HEX_DIGEST.is_match(hex) {
            return Err(ChecksumParseError::NotHex(text.to_string()));
        }
        let inferred = ChecksumAlgorithm::from_hex_len(hex.len())
            .ok_or_else(|| ChecksumParseError::NotHex(text.to_string()))?;
        match prefixed {
            Some(algorithm) if algorithm != inferred => {
                return Err(ChecksumParseError::WrongLength {
                    algorithm,
                    expected: algorithm.hex_len(),
                    actual: hex.len(),
                });
            }
            _ => {}
        }

        Ok(Self {
            algorithm: inferred,
            value: hex.to_ascii_lowercase(),
        })
    }

    /// Algorithm to digest with.
    #[must_use]
    pub fn algorithm(&self) -> ChecksumAlgorithm {
        self.algorithm
    }

    /// Lowercase hex digest.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Case-insensitive comparison against a computed hex digest.
    #[must_use]
    pub fn matches_hex(&self, actual: &str) -> bool {
        self.value.eq_ignore_ascii_case(actual)
    }
}

impl fmt::Display for ExpectedChecksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.value)
    }
}

/// Computes file digests block by block.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChecksumVerifier;

impl ChecksumVerifier {
    /// Hex digest of the file at `path`.
    ///
    /// Reads in fixed-size blocks; memory use does not grow with file size.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the file cannot be opened or read.
    #[instrument(level = "debug", skip(self), fields(path = %path.display()))]
    pub async fn digest(
        &self,
        path: &Path,
        algorithm: ChecksumAlgorithm,
    ) -> std::io::Result<String> {
        let digest = match algorithm {
            ChecksumAlgorithm::Md5 => hash_file::<Md5>(path).await?,
            ChecksumAlgorithm::Sha256 => hash_file::<Sha256>(path).await?,
        };
        debug!(%algorithm, digest = %digest, "computed digest");
        Ok(digest)
    }

    /// Returns true when the file at `path` has the `expected` digest.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the file cannot be read.
    pub async fn matches(&self, path: &Path, expected: &ExpectedChecksum) -> std::io::Result<bool> {
        let actual = self.digest(path, expected.algorithm()).await?;
        Ok(expected.matches_hex(&actual))
    }
}

async fn hash_file<D: Digest>(path: &Path) -> std::io::Result<String> {
    let mut file = File::open(path).await?;
    let mut buffer = vec![0u8; DIGEST_BLOCK_SIZE];
    let mut hasher = D::new();
    loop {
        let n = file.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    const EMPTY_MD5: &str = "d41d8cd98f00b204e9800998ecf8427e";

    fn file_with(contents: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, contents).unwrap();
        file
    }

    #[tokio::test]
    async fn test_md5_digest() {
        let file = file_with(b"Hello, World!");
        let digest = ChecksumVerifier
            .digest(file.path(), ChecksumAlgorithm::Md5)
            .await
            .unwrap();
        assert_eq!(digest, "65a8e27d8879283831b664bd8b7f0ad4");
    }

    #[tokio::test]
    async fn test_sha256_digest() {
        let file = file_with(b"Hello, World!");
        let digest = ChecksumVerifier
            .digest(file.path(), ChecksumAlgorithm::Sha256)
            .await
            .unwrap();
        assert_eq!(
            digest,
            "dffd6021bb2bd5b0af676290809ec3a53191dd81c7f70a4b28688a362182986f"
        );
    }

    #[tokio::test]
    async fn test_empty_file_md5() {
        let file = file_with(b"");
        let digest = ChecksumVerifier
            .digest(file.path(), ChecksumAlgorithm::Md5)
            .await
            .unwrap();
        assert_eq!(digest, EMPTY_MD5);
    }

    #[tokio::test]
    async fn test_digest_spanning_multiple_blocks() {
        let contents = vec![7u8; DIGEST_BLOCK_SIZE * 2 + 17];
        let file = file_with(&contents);
        let streamed = ChecksumVerifier
            .digest(file.path(), ChecksumAlgorithm::Sha256)
            .await
            .unwrap();
        assert_eq!(streamed, hex::encode(Sha256::digest(&contents)));
    }

    #[tokio::test]
    async fn test_matches_is_case_insensitive() {
        let file = file_with(b"Hello, World!");
        let expected = ExpectedChecksum::parse("65A8E27D8879283831B664BD8B7F0AD4").unwrap();
        assert!(ChecksumVerifier.matches(file.path(), &expected).await.unwrap());

        let wrong = ExpectedChecksum::md5(EMPTY_MD5).unwrap();
        assert!(!ChecksumVerifier.matches(file.path(), &wrong).await.unwrap());
    }

    #[tokio::test]
    async fn test_digest_missing_file_errors() {
        let result = ChecksumVerifier
            .digest(Path::new("/nonexistent/file.bin"), ChecksumAlgorithm::Md5)
            .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_infers_algorithm_from_length() {
        let md5 = ExpectedChecksum::parse(EMPTY_MD5).unwrap();
        assert_eq!(md5.algorithm(), ChecksumAlgorithm::Md5);

        let sha = ExpectedChecksum::parse(&"a".repeat(64)).unwrap();
        assert_eq!(sha.algorithm(), ChecksumAlgorithm::Sha256);
    }

    #[test]
    fn test_parse_prefixed_and_lowercases() {
        let md5 = ExpectedChecksum::parse("MD5:D41D8CD98F00B204E9800998ECF8427E").unwrap();
        assert_eq!(md5.value(), EMPTY_MD5);
        assert_eq!(md5.to_string(), format!("md5:{EMPTY_MD5}"));
    }

    #[test]
    fn test_parse_rejects_invalid() {
        assert!(matches!(
            ExpectedChecksum::parse("not-a-digest"),
            Err(ChecksumParseError::NotHex(_))
        ));
        assert!(ExpectedChecksum::parse(&"a".repeat(40)).is_err());
        assert_eq!(
            ExpectedChecksum::parse(&format!("sha256:{EMPTY_MD5}")),
            Err(ChecksumParseError::WrongLength {
                algorithm: ChecksumAlgorithm::Sha256,
                expected: 64,
                actual: 32,
            })
        );
    }
}
