//! Base quality compression policies
//!
//! This module provides the policies used to store per-base quality strings.
//! Qualities can be kept verbatim, collapsed into eight representative bins,
//! or dropped entirely. The policy is fixed per dataset and recorded in the
//! file header.

use std::fmt;
use std::str::FromStr;

use crate::error::{CodecError, HeaderError, Result};

/// The ASCII offset of Phred+33 encoded quality scores
pub const PHRED_OFFSET: u8 = 33;

/// Stored byte marking a record whose quality string was `*`
///
/// This is never a valid Phred+33 character.
pub const MISSING_QUALITY: u8 = 0xFF;

/// The representative quality of each bin
pub const BIN_VALUES: [u8; 8] = [1, 6, 15, 22, 27, 33, 37, 40];

/// Sentinel produced when no quality data is available
pub const NO_QUALITY: &[u8] = b"*";

/// Collapses a Phred score into its bin representative
///
/// Scores below 1 fall into the lowest bin and scores of 40 or above into the highest.
#[must_use]
pub const fn bin_quality(phred: u8) -> u8 {
    match phred {
        0..=1 => 1,
        2..=9 => 6,
        10..=19 => 15,
        20..=24 => 22,
        25..=29 => 27,
        30..=34 => 33,
        35..=39 => 37,
        _ => 40,
    }
}

/// Policy for storing base quality strings
///
/// The default policy is `Phred33`, which keeps the quality string unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum QualityPolicy {
    /// Store the Phred+33 bytes unchanged (default policy)
    #[default]
    Phred33,

    /// Store the bin representative of each score (lossy)
    Binned,

    /// Store nothing
    Dropped,
}
impl QualityPolicy {
    /// Returns the code stored in the file header for this policy
    #[must_use]
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Phred33 => 0,
            Self::Binned => 1,
            Self::Dropped => 2,
        }
    }

    /// Builds a policy from its header code
    pub fn from_u8(code: u8) -> Result<Self> {
        match code {
            0 => Ok(Self::Phred33),
            1 => Ok(Self::Binned),
            2 => Ok(Self::Dropped),
            _ => Err(HeaderError::InvalidQualityPolicy(code).into()),
        }
    }

    /// Returns the number of stored bytes for a sequence of `len` bases
    #[must_use]
    pub fn stored_len(self, len: usize) -> usize {
        match self {
            Self::Dropped => 0,
            _ => len,
        }
    }

    /// Encodes a Phred+33 quality string under this policy
    ///
    /// The output buffer is cleared first. `Dropped` leaves it empty.
    ///
    /// # Arguments
    ///
    /// * `qual` - The Phred+33 quality string
    /// * `output` - The buffer receiving the stored bytes
    ///
    /// # Examples
    ///
    /// ```
    /// # use binram::QualityPolicy;
    /// let mut stored = Vec::new();
    /// QualityPolicy::Binned.encode(b"#5I", &mut stored);
    /// assert_eq!(stored, vec![6, 22, 40]);
    /// ```
    pub fn encode(&self, qual: &[u8], output: &mut Vec<u8>) {
        output.clear();
        match self {
            Self::Phred33 => output.extend_from_slice(qual),
            Self::Binned => output.extend(
                qual.iter()
                    .map(|q| bin_quality(q.saturating_sub(PHRED_OFFSET))),
            ),
            Self::Dropped => {}
        }
    }

    /// Fills the output with the stored form of a missing (`*`) quality string
    pub fn encode_missing(&self, len: usize, output: &mut Vec<u8>) {
        output.clear();
        output.resize(self.stored_len(len), MISSING_QUALITY);
    }

    /// Decodes stored bytes back into a Phred+33 quality string
    ///
    /// The output buffer is cleared first.
    ///
    /// * `None` (the quality column was not loaded) decodes to an empty string.
    /// * `Dropped`, an empty stored slice, or a missing-quality marker decode to `*`.
    /// * `Binned` decodes to the bin representatives, not the original scores.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - If decoding was successful
    /// * `Err(Error)` - If fewer than `len` bytes are stored
    pub fn decode(&self, stored: Option<&[u8]>, len: usize, output: &mut Vec<u8>) -> Result<()> {
        output.clear();
        let Some(stored) = stored else {
            return Ok(());
        };
        if matches!(self, Self::Dropped) || stored.first().is_none_or(|q| *q == MISSING_QUALITY) {
            output.extend_from_slice(NO_QUALITY);
            return Ok(());
        }
        if stored.len() < len {
            return Err(CodecError::TruncatedQuality {
                expected: len,
                actual: stored.len(),
            }
            .into());
        }
        match self {
            Self::Phred33 => output.extend_from_slice(&stored[..len]),
            Self::Binned => output.extend(
                stored[..len]
                    .iter()
                    .map(|q| q.saturating_add(PHRED_OFFSET)),
            ),
            Self::Dropped => {}
        }
        Ok(())
    }
}
impl fmt::Display for QualityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Phred33 => "phred33",
            Self::Binned => "binned",
            Self::Dropped => "drop",
        };
        write!(f, "{name}")
    }
}
impl FromStr for QualityPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "phred33" | "phred" | "verbatim" => Ok(Self::Phred33),
            "binned" | "bin" | "illumina" => Ok(Self::Binned),
            "drop" | "dropped" | "none" => Ok(Self::Dropped),
            other => Err(format!("unknown quality policy: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    use super::*;

    fn decode_to_vec(policy: QualityPolicy, stored: Option<&[u8]>, len: usize) -> Vec<u8> {
        let mut output = Vec::new();
        policy.decode(stored, len, &mut output).unwrap();
        output
    }

    // ==================== Basic Policy Tests ====================

    #[test]
    fn test_default_policy() {
        assert_eq!(QualityPolicy::default(), QualityPolicy::Phred33);
    }

    #[test]
    fn test_header_code_roundtrip() {
        for policy in [
            QualityPolicy::Phred33,
            QualityPolicy::Binned,
            QualityPolicy::Dropped,
        ] {
            assert_eq!(QualityPolicy::from_u8(policy.as_u8()).unwrap(), policy);
        }
        assert!(QualityPolicy::from_u8(3).is_err());
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!("binned".parse::<QualityPolicy>(), Ok(QualityPolicy::Binned));
        assert_eq!("DROP".parse::<QualityPolicy>(), Ok(QualityPolicy::Dropped));
        assert!("lossy".parse::<QualityPolicy>().is_err());
    }

    // ==================== Phred33 Tests ====================

    #[test]
    fn test_phred33_roundtrip() {
        let mut rng = SmallRng::seed_from_u64(42);
        let qual: Vec<u8> = (0..151).map(|_| rng.random_range(b'!'..=b'~')).collect();
        let mut stored = Vec::new();
        QualityPolicy::Phred33.encode(&qual, &mut stored);
        assert_eq!(stored, qual);
        assert_eq!(
            decode_to_vec(QualityPolicy::Phred33, Some(&stored), qual.len()),
            qual
        );
    }

    #[test]
    fn test_truncated_storage_is_an_error() {
        let mut output = Vec::new();
        let result = QualityPolicy::Phred33.decode(Some(b"II"), 4, &mut output);
        assert!(result.is_err());
    }

    // ==================== Binned Tests ====================

    #[test]
    fn test_bin_boundaries() {
        let expected = [
            (1, 1),
            (2, 6),
            (9, 6),
            (10, 15),
            (19, 15),
            (20, 22),
            (24, 22),
            (25, 27),
            (29, 27),
            (30, 33),
            (34, 33),
            (35, 37),
            (39, 37),
            (40, 40),
            (41, 40),
            (93, 40),
        ];
        for (phred, bin) in expected {
            assert_eq!(bin_quality(phred), bin, "phred {phred}");
        }
    }

    #[test]
    fn test_bins_drawn_from_fixed_set() {
        for byte in 0..=u8::MAX {
            let mut stored = Vec::new();
            QualityPolicy::Binned.encode(&[byte], &mut stored);
            assert!(BIN_VALUES.contains(&stored[0]), "byte {byte}");

            // same input, same bucket
            let mut again = Vec::new();
            QualityPolicy::Binned.encode(&[byte], &mut again);
            assert_eq!(stored, again);
        }
    }

    #[test]
    fn test_binned_decode_adds_offset() {
        let mut stored = Vec::new();
        QualityPolicy::Binned.encode(b"\"5?I", &mut stored);
        assert_eq!(stored, vec![1, 22, 33, 40]);
        assert_eq!(
            decode_to_vec(QualityPolicy::Binned, Some(&stored), 4),
            b"\"7BI"
        );
    }

    // ==================== Dropped Tests ====================

    #[test]
    fn test_dropped_stores_nothing() {
        let mut stored = vec![1, 2, 3];
        QualityPolicy::Dropped.encode(b"IIIIIIII", &mut stored);
        assert!(stored.is_empty());
    }

    #[test]
    fn test_dropped_always_decodes_to_sentinel() {
        for len in [0, 1, 100] {
            assert_eq!(
                decode_to_vec(QualityPolicy::Dropped, Some(&[]), len),
                NO_QUALITY
            );
        }
        // whatever happens to be stored
        assert_eq!(
            decode_to_vec(QualityPolicy::Dropped, Some(b"IIII"), 4),
            NO_QUALITY
        );
    }

    // ==================== Sentinel Tests ====================

    #[test]
    fn test_unloaded_column_decodes_to_empty() {
        for policy in [
            QualityPolicy::Phred33,
            QualityPolicy::Binned,
            QualityPolicy::Dropped,
        ] {
            assert!(decode_to_vec(policy, None, 10).is_empty());
        }
    }

    #[test]
    fn test_missing_quality_marker() {
        let mut stored = Vec::new();
        QualityPolicy::Phred33.encode_missing(5, &mut stored);
        assert_eq!(stored, vec![MISSING_QUALITY; 5]);
        assert_eq!(
            decode_to_vec(QualityPolicy::Phred33, Some(&stored), 5),
            NO_QUALITY
        );

        QualityPolicy::Dropped.encode_missing(5, &mut stored);
        assert!(stored.is_empty());
    }

    #[test]
    fn test_buffer_cleared_before_encoding() {
        let mut stored = vec![b'X', b'Y', b'Z'];
        QualityPolicy::Phred33.encode(b"II", &mut stored);
        assert_eq!(stored, b"II");
    }
}
