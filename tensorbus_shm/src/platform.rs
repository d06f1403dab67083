//! Linux-specific segment file operations

use crate::error::{ShmError, ShmResult};
use memmap2::{Mmap, MmapMut, MmapOptions};
use nix::unistd::getpid;
use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

/// Create a segment file of `size` bytes and map it read/write.
///
/// Fails with `AlreadyExists` rather than reusing a file another writer owns.
pub fn create_segment_mmap(path: &Path, size: usize) -> ShmResult<MmapMut> {
    let file = OpenOptions::new()
        .create_new(true)
        .read(true)
        .write(true)
        .mode(0o600) // Owner read/write only
        .open(path)
        .map_err(|e| match e.kind() {
            ErrorKind::AlreadyExists => ShmError::AlreadyExists {
                name: path.display().to_string(),
            },
            _ => ShmError::Io { source: e },
        })?;

    file.set_len(size as u64)?;

    let mmap = unsafe { MmapOptions::new().populate().map_mut(&file)? };
    Ok(mmap)
}

/// Map an existing segment file read-only.
pub fn attach_segment_mmap(path: &Path) -> ShmResult<Mmap> {
    let file = OpenOptions::new().read(true).open(path).map_err(|e| {
        match e.kind() {
            ErrorKind::NotFound => ShmError::NotFound {
                name: path.display().to_string(),
            },
            _ => ShmError::Io { source: e },
        }
    })?;

    let mmap = unsafe { MmapOptions::new().map(&file)? };
    Ok(mmap)
}

/// Check if process is alive using kill(pid, 0)
pub fn is_process_alive(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    if pid == 0 || pid > i32::MAX as u32 {
        return false;
    }

    match kill(Pid::from_raw(pid as i32), None) {
        Ok(_) => true,
        Err(nix::Error::ESRCH) => false, // No such process
        Err(nix::Error::EPERM) => true,  // Exists, owned by someone else
        Err(_) => false,
    }
}

/// Get current process ID
pub fn get_current_pid() -> u32 {
    getpid().as_raw() as u32
}
