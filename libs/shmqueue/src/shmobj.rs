//! Thin wrappers around `shm_open`/`mmap`/`munmap`/`shm_unlink`, shared by
//! the worker-queue segment and by each per-request data object (spec.md
//! §4.7).

use std::ffi::CString;
use std::num::NonZeroUsize;
use std::os::unix::io::RawFd;

use nix::fcntl::OFlag;
use nix::sys::mman::{mmap, munmap, shm_open, shm_unlink, MapFlags, ProtFlags};
use nix::sys::stat::{fstat, Mode};
use nix::unistd::ftruncate;

use crate::error::ShmQueueError;

/// Create a named shared-memory object, size it to `len` bytes, and return
/// its file descriptor.
///
/// `excl`: pass `true` for a one-time segment that must not already exist
/// (the worker-queue segment itself, created exactly once); pass `false`
/// for an object whose name may be reused across calls (a per-request
/// object at a salted-but-stable `derive_shm_name` slot, spec.md §4.7 —
/// reusing the name on every resubmission of that slot must not fail with
/// `EEXIST`, it should just tolerate and resize any stale bytes left
/// behind by a prior cycle).
pub fn create_sized(name: &str, len: usize, excl: bool) -> Result<RawFd, ShmQueueError> {
    let cname = CString::new(name).map_err(|_| ShmQueueError::InvalidName(name.to_string()))?;
    let mut oflags = OFlag::O_CREAT | OFlag::O_RDWR;
    if excl {
        oflags |= OFlag::O_EXCL;
    }
    let fd = shm_open(cname.as_c_str(), oflags, Mode::S_IRUSR | Mode::S_IWUSR)
        .map_err(|e| ShmQueueError::Shm(name.to_string(), e))?;

    if let Err(e) = ftruncate(fd, len as i64) {
        let _ = shm_unlink(cname.as_c_str());
        let _ = nix::unistd::close(fd);
        return Err(ShmQueueError::Shm(name.to_string(), e));
    }

    Ok(fd)
}

/// Open an existing named shared-memory object for read/write.
pub fn open_existing(name: &str) -> Result<RawFd, ShmQueueError> {
    let cname = CString::new(name).map_err(|_| ShmQueueError::InvalidName(name.to_string()))?;
    shm_open(cname.as_c_str(), OFlag::O_RDWR, Mode::empty()).map_err(|e| {
        if e == nix::Error::ENOENT {
            ShmQueueError::NotFound(name.to_string())
        } else {
            ShmQueueError::Shm(name.to_string(), e)
        }
    })
}

/// Query the current size of an already-open shared-memory fd.
pub fn size_of(fd: RawFd) -> Result<usize, ShmQueueError> {
    let st = fstat(fd).map_err(|e| ShmQueueError::Shm("<fd>".to_string(), e))?;
    Ok(st.st_size as usize)
}

/// Map `len` bytes of `fd` read/write, shared across processes.
///
/// # Safety
/// Caller must ensure `fd` refers to an object at least `len` bytes long
/// and that the returned pointer is interpreted with a layout both sides
/// of the mapping agree on.
pub unsafe fn map_rw(fd: RawFd, len: usize) -> Result<*mut u8, ShmQueueError> {
    let len = NonZeroUsize::new(len).ok_or(ShmQueueError::ZeroLengthMapping)?;
    let ptr = mmap(
        None,
        len,
        ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
        MapFlags::MAP_SHARED,
        fd,
        0,
    )
    .map_err(|e| ShmQueueError::Shm("<fd>".to_string(), e))?;
    Ok(ptr as *mut u8)
}

/// # Safety
/// `ptr`/`len` must be a mapping previously returned by [`map_rw`] with
/// the same length, not already unmapped.
pub unsafe fn unmap(ptr: *mut u8, len: usize) {
    if len > 0 {
        let _ = munmap(ptr as *mut core::ffi::c_void, len);
    }
}

pub fn unlink(name: &str) -> Result<(), ShmQueueError> {
    let cname = CString::new(name).map_err(|_| ShmQueueError::InvalidName(name.to_string()))?;
    shm_unlink(cname.as_c_str()).map_err(|e| ShmQueueError::Shm(name.to_string(), e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_map_write_reopen_read() {
        let name = format!("/shmqueue-test-{}", std::process::id());
        let fd = create_sized(&name, 4096, true).unwrap();
        unsafe {
            let ptr = map_rw(fd, 4096).unwrap();
            *ptr = 0xab;
            unmap(ptr, 4096);
        }
        nix::unistd::close(fd).unwrap();

        let fd2 = open_existing(&name).unwrap();
        assert_eq!(size_of(fd2).unwrap(), 4096);
        unsafe {
            let ptr = map_rw(fd2, 4096).unwrap();
            assert_eq!(*ptr, 0xab);
            unmap(ptr, 4096);
        }
        nix::unistd::close(fd2).unwrap();
        unlink(&name).unwrap();
    }
}
