//! Segment header layout and write-version protocol

use crate::error::{ShmError, ShmResult};
use static_assertions::const_assert_eq;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tb::consts::CACHE_LINE_SIZE;

/// Magic bytes identifying a tensorbus segment: `"TBUS_SEG"`.
pub const TENSORBUS_SHM_MAGIC: [u8; 8] = *b"TBUS_SEG";

/// Size of the header preceding the data section.
pub const HEADER_SIZE: usize = std::mem::size_of::<SegmentHeader>();

/// Segment header, one cache line.
///
/// `version` uses the odd/even protocol:
/// - Odd = write in progress (reader must retry)
/// - Even = committed
#[repr(C, align(64))]
pub struct SegmentHeader {
    /// Magic bytes: must be `TENSORBUS_SHM_MAGIC`.
    pub magic: [u8; 8],
    /// Write version.
    pub version: AtomicU64,
    /// Writer process ID.
    pub writer_pid: u32,
    _reserved: u32,
    /// Data section size in bytes.
    pub data_size: u64,
    /// Creation timestamp (ns since epoch).
    pub created_ts: u64,
    /// Last write timestamp (ns since epoch).
    pub last_write_ts: AtomicU64,
    _padding: [u8; 16],
}

const_assert_eq!(std::mem::size_of::<SegmentHeader>(), CACHE_LINE_SIZE);
const_assert_eq!(std::mem::align_of::<SegmentHeader>(), CACHE_LINE_SIZE);

impl SegmentHeader {
    /// Create new segment header
    pub fn new(data_size: usize, writer_pid: u32) -> Self {
        let now = now_ns();
        Self {
            magic: TENSORBUS_SHM_MAGIC,
            version: AtomicU64::new(0),
            writer_pid,
            _reserved: 0,
            data_size: data_size as u64,
            created_ts: now,
            last_write_ts: AtomicU64::new(now),
            _padding: [0; 16],
        }
    }

    /// Validate magic and that the file can hold the declared data section
    pub fn validate(&self, name: &str, mapped_len: usize) -> ShmResult<()> {
        if self.magic != TENSORBUS_SHM_MAGIC {
            return Err(ShmError::InvalidHeader {
                name: name.to_string(),
                reason: "bad magic".to_string(),
            });
        }
        if HEADER_SIZE + self.data_size as usize > mapped_len {
            return Err(ShmError::InvalidHeader {
                name: name.to_string(),
                reason: format!(
                    "data size {} exceeds mapped length {}",
                    self.data_size, mapped_len
                ),
            });
        }
        Ok(())
    }

    /// Current write version
    pub fn current_version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Mark a write in progress; returns the odd version
    pub(crate) fn begin_write(&self) -> u64 {
        let next = self.version.load(Ordering::Acquire) + 1;
        self.version.store(next, Ordering::Release);
        next
    }

    /// Commit a write; returns the even version
    pub(crate) fn end_write(&self) -> u64 {
        let next = self.version.load(Ordering::Acquire) + 1;
        self.version.store(next, Ordering::Release);
        self.last_write_ts.store(now_ns(), Ordering::Release);
        next
    }
}

/// Even versions are committed
pub fn is_stable(version: u64) -> bool {
    version % 2 == 0
}

fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_is_one_cache_line() {
        assert_eq!(HEADER_SIZE, 64);
    }

    #[test]
    fn test_header_validation() {
        let header = SegmentHeader::new(128, 42);
        assert!(header.validate("seg", HEADER_SIZE + 128).is_ok());
        assert!(matches!(
            header.validate("seg", HEADER_SIZE + 127),
            Err(ShmError::InvalidHeader { .. })
        ));

        let mut bad = SegmentHeader::new(0, 42);
        bad.magic[0] = b'X';
        assert!(bad.validate("seg", HEADER_SIZE).is_err());
    }

    #[test]
    fn write_protocol_alternates_parity() {
        let header = SegmentHeader::new(0, 1);
        assert!(is_stable(header.current_version()));
        assert!(!is_stable(header.begin_write()));
        assert_eq!(header.end_write(), 2);
        assert!(is_stable(header.current_version()));
    }
}
