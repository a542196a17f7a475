//! Part decomposition.

use serde::{Deserialize, Serialize};

use crate::error::{OosError, OosResult};
use crate::object::ByteRange;

/// Smallest accepted part size (100 KiB).
pub const MIN_PART_SIZE: u64 = 100 * 1024;

/// Largest accepted part size (5 GiB).
pub const MAX_PART_SIZE: u64 = 5 * 1024 * 1024 * 1024;

/// Largest number of parts in one multipart session.
pub const MAX_PART_COUNT: u64 = 10_000;

/// One contiguous byte range of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferPart {
    /// 1-based part number.
    pub number: u32,
    /// First byte.
    pub start: u64,
    /// Last byte, inclusive.
    pub end: u64,
}

impl TransferPart {
    /// Number of bytes in the part.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.end - self.start + 1
    }

    /// The part as a byte range.
    #[must_use]
    pub fn range(&self) -> ByteRange {
        ByteRange::new(self.start, self.end)
    }
}

/// Check a part size against the service limits.
pub fn validate_part_size(part_size: u64) -> OosResult<()> {
    if !(MIN_PART_SIZE..=MAX_PART_SIZE).contains(&part_size) {
        return Err(OosError::InvalidParameter(format!(
            "part size {part_size} is outside [{MIN_PART_SIZE}, {MAX_PART_SIZE}]"
        )));
    }
    Ok(())
}

/// Split `size` bytes into parts of `part_size`.
///
/// Part `i` covers `[(i-1)*part_size, min(i*part_size, size) - 1]`. An empty
/// source yields no parts.
///
/// # Examples
///
/// ```
/// use oos_core::transfer::part::split_parts;
///
/// let parts = split_parts(1_048_576, 262_144).unwrap();
/// assert_eq!(parts.len(), 4);
/// assert_eq!((parts[2].start, parts[2].end), (524_288, 786_431));
/// ```
pub fn split_parts(size: u64, part_size: u64) -> OosResult<Vec<TransferPart>> {
    validate_part_size(part_size)?;

    let count = size.div_ceil(part_size);
    if count > MAX_PART_COUNT {
        return Err(OosError::InvalidParameter(format!(
            "{count} parts of {part_size} bytes exceed the limit of {MAX_PART_COUNT}"
        )));
    }

    let parts = (0..count)
        .map(|i| TransferPart {
            // count <= MAX_PART_COUNT, so the number fits in u32.
            number: u32::try_from(i + 1).unwrap_or(u32::MAX),
            start: i * part_size,
            end: ((i + 1) * part_size).min(size) - 1,
        })
        .collect();
    Ok(parts)
}

/// Total number of bytes covered by `parts`.
#[must_use]
pub fn total_size(parts: &[TransferPart]) -> u64 {
    parts.iter().map(TransferPart::size).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_split_evenly_divisible_size() {
        let parts = split_parts(1_048_576, 262_144).unwrap();
        assert_eq!(parts.len(), 4);
        assert_eq!(
            parts[2],
            TransferPart {
                number: 3,
                start: 524_288,
                end: 786_431
            }
        );
        assert_eq!(parts[3].end, 1_048_575);
        assert_eq!(total_size(&parts), 1_048_576);
    }

    #[test]
    fn test_should_shorten_last_part() {
        let parts = split_parts(250 * 1024, MIN_PART_SIZE).unwrap();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[2].size(), 50 * 1024);
        assert!(parts.windows(2).all(|w| w[1].start == w[0].end + 1));
    }

    #[test]
    fn test_should_yield_no_parts_for_empty_source() {
        assert!(split_parts(0, MIN_PART_SIZE).unwrap().is_empty());
    }

    #[test]
    fn test_should_reject_part_size_outside_limits() {
        assert!(split_parts(1024, MIN_PART_SIZE - 1).is_err());
        assert!(split_parts(1024, MAX_PART_SIZE + 1).is_err());
    }

    #[test]
    fn test_should_reject_too_many_parts() {
        let err = split_parts(MIN_PART_SIZE * 10_001, MIN_PART_SIZE).unwrap_err();
        assert!(err.is_parameter_error());
        assert_eq!(split_parts(MIN_PART_SIZE * 10_000, MIN_PART_SIZE).unwrap().len(), 10_000);
    }
}
