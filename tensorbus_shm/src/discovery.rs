//! Segment discovery and orphan cleanup

use crate::error::{ShmError, ShmResult};
use crate::platform::is_process_alive;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

const META_SUFFIX: &str = ".meta";

/// Metadata sidecar written next to each segment file
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SegmentInfo {
    /// Owning allocator
    pub manager_ref: String,
    /// Segment file name
    pub segment_ref: String,
    /// Data section size in bytes
    pub size: usize,
    /// Writer process ID
    pub writer_pid: u32,
    /// Creation timestamp
    pub created_at: SystemTime,
}

/// Discovered segment with liveness of its writer
#[derive(Debug, Clone, Serialize)]
pub struct SegmentStatus {
    /// Sidecar metadata
    pub info: SegmentInfo,
    /// Whether the writer process still runs
    pub writer_alive: bool,
    /// Whether the segment file itself exists
    pub file_present: bool,
}

/// Path of the metadata sidecar of a segment file
pub fn meta_path(segment_path: &Path) -> PathBuf {
    let mut name = segment_path.as_os_str().to_owned();
    name.push(META_SUFFIX);
    PathBuf::from(name)
}

/// Scans a segment directory for sidecars with a given prefix
pub struct SegmentDiscovery {
    dir: PathBuf,
    prefix: String,
}

impl SegmentDiscovery {
    /// Create discovery over `dir` for files starting with `prefix`
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }

    /// List all segments, newest first
    pub fn list(&self) -> ShmResult<Vec<SegmentStatus>> {
        let mut segments = Vec::new();
        if !self.dir.exists() {
            return Ok(segments);
        }

        for entry in std::fs::read_dir(&self.dir)?.flatten() {
            let Ok(file_name) = entry.file_name().into_string() else {
                continue;
            };
            if !file_name.starts_with(&self.prefix) || !file_name.ends_with(META_SUFFIX) {
                continue;
            }

            match Self::parse_meta(&entry.path()) {
                Ok(info) => {
                    let file_present = self.dir.join(&info.segment_ref).exists();
                    let writer_alive = is_process_alive(info.writer_pid);
                    segments.push(SegmentStatus {
                        info,
                        writer_alive,
                        file_present,
                    });
                }
                Err(e) => tracing::warn!(file = %file_name, "skipping unreadable metadata: {e}"),
            }
        }

        segments.sort_by(|a, b| b.info.created_at.cmp(&a.info.created_at));
        Ok(segments)
    }

    /// Find a segment by its segment reference
    pub fn find(&self, segment_ref: &str) -> ShmResult<Option<SegmentStatus>> {
        Ok(self
            .list()?
            .into_iter()
            .find(|s| s.info.segment_ref == segment_ref))
    }

    /// Remove segments whose writer is dead; returns how many were removed
    pub fn cleanup_orphaned(&self) -> ShmResult<usize> {
        let mut cleaned = 0;
        for status in self.list()? {
            if status.writer_alive {
                continue;
            }
            tracing::warn!(
                segment = %status.info.segment_ref,
                pid = status.info.writer_pid,
                "cleaning up orphaned segment"
            );
            let path = self.dir.join(&status.info.segment_ref);
            if status.file_present {
                std::fs::remove_file(&path)?;
            }
            std::fs::remove_file(meta_path(&path))?;
            cleaned += 1;
        }
        Ok(cleaned)
    }

    fn parse_meta(path: &Path) -> ShmResult<SegmentInfo> {
        let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ShmError::NotFound {
                name: path.display().to_string(),
            },
            _ => ShmError::Io { source: e },
        })?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::{SegmentAllocator, ShmAllocator};
    use tb::config::ShmConfig;

    #[test]
    fn test_meta_path_appends_suffix() {
        assert_eq!(
            meta_path(Path::new("/dev/shm/tb_1_0")),
            PathBuf::from("/dev/shm/tb_1_0.meta")
        );
    }

    #[test]
    fn test_list_finds_live_segments() {
        let dir = tempfile::tempdir().unwrap();
        let mut alloc = ShmAllocator::new(ShmConfig {
            dir: dir.path().to_path_buf(),
            prefix: "disc".to_string(),
        });
        let refs = alloc.share(&[0; 32]).unwrap();

        let discovery = SegmentDiscovery::new(dir.path(), "disc");
        let found = discovery.find(&refs.segment_ref).unwrap().unwrap();
        assert_eq!(found.info.size, 32);
        assert_eq!(found.info.manager_ref, refs.manager_ref);
        assert!(found.writer_alive);
        assert!(found.file_present);

        assert!(SegmentDiscovery::new(dir.path(), "other").list().unwrap().is_empty());
    }

    #[test]
    fn test_cleanup_removes_only_orphans() {
        let dir = tempfile::tempdir().unwrap();
        let mut alloc = ShmAllocator::new(ShmConfig {
            dir: dir.path().to_path_buf(),
            prefix: "orph".to_string(),
        });
        let live = alloc.share(&[1]).unwrap();

        let dead = SegmentInfo {
            manager_ref: "orph_2000000000".to_string(),
            segment_ref: "orph_2000000000_0".to_string(),
            size: 1,
            writer_pid: 2_000_000_000,
            created_at: SystemTime::now(),
        };
        let dead_path = dir.path().join(&dead.segment_ref);
        std::fs::write(&dead_path, [0u8; 65]).unwrap();
        std::fs::write(meta_path(&dead_path), serde_json::to_string(&dead).unwrap()).unwrap();

        let discovery = SegmentDiscovery::new(dir.path(), "orph");
        assert_eq!(discovery.list().unwrap().len(), 2);
        assert_eq!(discovery.cleanup_orphaned().unwrap(), 1);
        assert!(!dead_path.exists());
        assert!(dir.path().join(&live.segment_ref).exists());
        assert_eq!(discovery.list().unwrap().len(), 1);
    }

    #[test]
    fn test_missing_dir_lists_nothing() {
        let discovery = SegmentDiscovery::new("/nonexistent/tensorbus", "tb");
        assert!(discovery.list().unwrap().is_empty());
    }
}
