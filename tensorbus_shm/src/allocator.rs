//! Segment allocator: places byte buffers into shared memory

use crate::discovery::{SegmentInfo, meta_path};
use crate::error::{ShmError, ShmResult};
use crate::platform::get_current_pid;
use crate::segment::ShmSegment;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::time::SystemTime;
use tb::config::ShmConfig;

/// Opaque pair addressing one shared memory segment
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SegmentRefs {
    /// Owning allocator (`{prefix}_{pid}`)
    pub manager_ref: String,
    /// Segment file name (`{manager_ref}_{seq}`)
    pub segment_ref: String,
}

impl SegmentRefs {
    /// Pair two references
    pub fn new(manager_ref: String, segment_ref: String) -> Self {
        Self {
            manager_ref,
            segment_ref,
        }
    }

    /// Whether the segment name was issued by the named manager
    pub fn is_owned_by_manager(&self) -> bool {
        self.segment_ref
            .strip_prefix(self.manager_ref.as_str())
            .is_some_and(|rest| rest.starts_with('_'))
    }
}

/// Facility that exports buffers into shared memory.
///
/// The tensor store only talks to this trait, so tests and alternative
/// backends can stand in for the file-backed [`ShmAllocator`].
pub trait SegmentAllocator: Send {
    /// Copy `bytes` into a fresh segment and return its references
    fn share(&mut self, bytes: &[u8]) -> ShmResult<SegmentRefs>;

    /// Overwrite the contents of an existing segment in place
    fn copy_into(&mut self, refs: &SegmentRefs, bytes: &[u8]) -> ShmResult<()>;

    /// Current contents of a segment this allocator owns
    fn read(&self, refs: &SegmentRefs) -> ShmResult<Vec<u8>>;

    /// Destroy a segment; its references become invalid for every process
    fn release(&mut self, refs: &SegmentRefs) -> ShmResult<()>;
}

/// File-backed allocator owning every segment it shared.
///
/// Segments live as long as the allocator (or until released).
pub struct ShmAllocator {
    config: ShmConfig,
    manager_ref: String,
    writer_pid: u32,
    next_seq: u64,
    segments: HashMap<String, ShmSegment>,
}

impl ShmAllocator {
    /// Create an allocator for this process
    pub fn new(config: ShmConfig) -> Self {
        let writer_pid = get_current_pid();
        let manager_ref = format!("{}_{}", config.prefix, writer_pid);
        Self {
            config,
            manager_ref,
            writer_pid,
            next_seq: 0,
            segments: HashMap::new(),
        }
    }

    /// Manager reference stamped on every segment
    pub fn manager_ref(&self) -> &str {
        &self.manager_ref
    }

    /// Directory segments are created in
    pub fn dir(&self) -> &Path {
        &self.config.dir
    }

    /// Number of live segments
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Whether no segment is live
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    fn next_refs(&mut self) -> SegmentRefs {
        loop {
            let segment_ref = format!("{}_{}", self.manager_ref, self.next_seq);
            self.next_seq += 1;
            // a crashed process with a recycled pid may have left files behind
            if !self.config.dir.join(&segment_ref).exists() {
                return SegmentRefs::new(self.manager_ref.clone(), segment_ref);
            }
        }
    }

    fn owned(&self, refs: &SegmentRefs) -> ShmResult<&ShmSegment> {
        if refs.manager_ref != self.manager_ref {
            return Err(ShmError::NotShared {
                segment: refs.segment_ref.clone(),
            });
        }
        self.segments
            .get(&refs.segment_ref)
            .ok_or_else(|| ShmError::NotShared {
                segment: refs.segment_ref.clone(),
            })
    }

    fn write_metadata(&self, segment: &ShmSegment) -> ShmResult<()> {
        let info = SegmentInfo {
            manager_ref: self.manager_ref.clone(),
            segment_ref: segment.refs().segment_ref.clone(),
            size: segment.data_size(),
            writer_pid: self.writer_pid,
            created_at: SystemTime::now(),
        };
        let json = serde_json::to_string_pretty(&info)?;

        let mut file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .mode(0o600)
            .open(meta_path(segment.path()))?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

impl SegmentAllocator for ShmAllocator {
    fn share(&mut self, bytes: &[u8]) -> ShmResult<SegmentRefs> {
        let refs = self.next_refs();
        let mut segment = ShmSegment::create(&self.config.dir, refs.clone(), bytes.len())?;
        segment.write(bytes)?;
        self.write_metadata(&segment)?;

        tracing::info!(
            segment = %refs.segment_ref,
            size = bytes.len(),
            "exported shared memory segment"
        );
        self.segments.insert(refs.segment_ref.clone(), segment);
        Ok(refs)
    }

    fn copy_into(&mut self, refs: &SegmentRefs, bytes: &[u8]) -> ShmResult<()> {
        self.owned(refs)?;
        let segment = self
            .segments
            .get_mut(&refs.segment_ref)
            .ok_or_else(|| ShmError::NotShared {
                segment: refs.segment_ref.clone(),
            })?;
        let version = segment.write(bytes)?;
        tracing::trace!(segment = %refs.segment_ref, version, "segment updated in place");
        Ok(())
    }

    fn read(&self, refs: &SegmentRefs) -> ShmResult<Vec<u8>> {
        Ok(self.owned(refs)?.contents())
    }

    fn release(&mut self, refs: &SegmentRefs) -> ShmResult<()> {
        self.owned(refs)?;
        self.segments.remove(&refs.segment_ref);
        Ok(())
    }
}
