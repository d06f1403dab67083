//! Segment writer and reader

use crate::allocator::SegmentRefs;
use crate::error::{ShmError, ShmResult};
use crate::header::{HEADER_SIZE, SegmentHeader, is_stable};
use crate::platform::{attach_segment_mmap, create_segment_mmap, get_current_pid};
use memmap2::{Mmap, MmapMut};
use std::path::{Path, PathBuf};
use std::sync::atomic::{Ordering, fence};
use tb::consts::SHM_MAX_SIZE;

const MAX_READ_RETRIES: usize = 10;

/// Single writer with exclusive ownership of a segment file.
///
/// The file is removed when the writer is dropped.
pub struct ShmSegment {
    refs: SegmentRefs,
    path: PathBuf,
    data_size: usize,
    mmap: MmapMut,
}

impl ShmSegment {
    /// Create the segment file `dir/{segment_ref}` holding `data_size` bytes
    pub fn create(dir: &Path, refs: SegmentRefs, data_size: usize) -> ShmResult<Self> {
        if data_size > SHM_MAX_SIZE {
            return Err(ShmError::InvalidSize {
                size: data_size,
                capacity: SHM_MAX_SIZE,
            });
        }

        let path = dir.join(&refs.segment_ref);
        let mut mmap = create_segment_mmap(&path, HEADER_SIZE + data_size)?;

        unsafe {
            std::ptr::write(
                mmap.as_mut_ptr() as *mut SegmentHeader,
                SegmentHeader::new(data_size, get_current_pid()),
            );
        }

        // Header must be visible before anyone maps the file
        fence(Ordering::Release);

        Ok(Self {
            refs,
            path,
            data_size,
            mmap,
        })
    }

    /// Replace the whole data section; `bytes` must match its size exactly
    pub fn write(&mut self, bytes: &[u8]) -> ShmResult<u64> {
        if bytes.len() != self.data_size {
            return Err(ShmError::InvalidSize {
                size: bytes.len(),
                capacity: self.data_size,
            });
        }

        let header_ptr = self.mmap.as_ptr() as *const SegmentHeader;
        let data_ptr = unsafe { self.mmap.as_mut_ptr().add(HEADER_SIZE) };

        unsafe { (*header_ptr).begin_write() };
        fence(Ordering::Release);

        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), data_ptr, bytes.len());
        }

        fence(Ordering::Release);
        Ok(unsafe { (*header_ptr).end_write() })
    }

    /// Copy of the data section
    pub fn contents(&self) -> Vec<u8> {
        self.mmap[HEADER_SIZE..HEADER_SIZE + self.data_size].to_vec()
    }

    /// Segment header
    pub fn header(&self) -> &SegmentHeader {
        unsafe { &*(self.mmap.as_ptr() as *const SegmentHeader) }
    }

    /// References addressing this segment
    pub fn refs(&self) -> &SegmentRefs {
        &self.refs
    }

    /// Path of the segment file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Data section size
    pub fn data_size(&self) -> usize {
        self.data_size
    }
}

impl Drop for ShmSegment {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
        let _ = std::fs::remove_file(crate::discovery::meta_path(&self.path));
        tracing::debug!(segment = %self.refs.segment_ref, "segment removed");
    }
}

/// Read-only mapping of a segment created by another allocator.
pub struct SegmentView {
    name: String,
    mmap: Mmap,
    data_size: usize,
    last_seen_version: u64,
    read_buffer: Vec<u8>,
}

impl SegmentView {
    /// Attach to `dir/{segment_ref}`.
    ///
    /// The segment reference must belong to the named manager.
    pub fn attach(dir: &Path, refs: &SegmentRefs) -> ShmResult<Self> {
        if !refs.is_owned_by_manager() {
            return Err(ShmError::NotFound {
                name: format!("{} (manager {})", refs.segment_ref, refs.manager_ref),
            });
        }
        Self::attach_path(&dir.join(&refs.segment_ref))
    }

    /// Attach to a segment file by path
    pub fn attach_path(path: &Path) -> ShmResult<Self> {
        let name = path.display().to_string();
        let mmap = attach_segment_mmap(path)?;
        if mmap.len() < HEADER_SIZE {
            return Err(ShmError::InvalidHeader {
                name,
                reason: format!("file holds {} bytes, header needs {HEADER_SIZE}", mmap.len()),
            });
        }

        let header = unsafe { &*(mmap.as_ptr() as *const SegmentHeader) };
        header.validate(&name, mmap.len())?;
        let data_size = header.data_size as usize;
        let last_seen_version = header.current_version();

        Ok(Self {
            name,
            mmap,
            data_size,
            last_seen_version,
            read_buffer: Vec::with_capacity(data_size),
        })
    }

    /// Read the data section, retrying while a write is in progress
    pub fn read(&mut self) -> ShmResult<&[u8]> {
        let header = unsafe { &*(self.mmap.as_ptr() as *const SegmentHeader) };
        let data = &self.mmap[HEADER_SIZE..HEADER_SIZE + self.data_size];

        for _attempt in 0..MAX_READ_RETRIES {
            let version_before = header.current_version();
            if !is_stable(version_before) {
                std::thread::yield_now();
                continue;
            }

            fence(Ordering::Acquire);
            self.read_buffer.clear();
            self.read_buffer.extend_from_slice(data);
            fence(Ordering::Acquire);

            let version_after = header.current_version();
            if version_before == version_after {
                self.last_seen_version = version_after;
                return Ok(&self.read_buffer);
            }

            std::thread::yield_now();
        }

        Err(ShmError::VersionConflict)
    }

    /// Version observed by the last successful read (or attach)
    pub fn version(&self) -> u64 {
        self.last_seen_version
    }

    /// Check if a committed write happened since the last read
    pub fn has_changed(&self) -> bool {
        let header = unsafe { &*(self.mmap.as_ptr() as *const SegmentHeader) };
        let current = header.current_version();
        current != self.last_seen_version && is_stable(current)
    }

    /// Writer process ID recorded in the header
    pub fn writer_pid(&self) -> u32 {
        unsafe { (*(self.mmap.as_ptr() as *const SegmentHeader)).writer_pid }
    }

    /// Segment name (file path)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Data section size
    pub fn data_size(&self) -> usize {
        self.data_size
    }
}
