//! Physical block address (LBA) hints via `FS_IOC_FIEMAP`, used to batch
//! and reorder reads for rotational media (spec.md §4.4, §9).
//!
//! A failure here is never fatal to a request: the caller falls back to
//! submitting the read unordered.

use std::os::unix::io::RawFd;

const FIEMAP_FLAG_SYNC: u32 = 0x0000_0001;

#[repr(C)]
#[derive(Clone, Copy)]
struct FiemapExtent {
    fe_logical: u64,
    fe_physical: u64,
    fe_length: u64,
    fe_reserved64: [u64; 2],
    fe_flags: u32,
    fe_reserved: [u32; 3],
}

#[repr(C)]
struct Fiemap {
    fm_start: u64,
    fm_length: u64,
    fm_flags: u32,
    fm_mapped_extents: u32,
    fm_extent_count: u32,
    fm_reserved: u32,
    fm_extents: [FiemapExtent; 1],
}

nix::ioctl_readwrite!(fiemap_ioctl, b'f', 11, Fiemap);

/// Physical byte offset of the first extent backing `fd`, if the
/// underlying filesystem supports `FIEMAP` and the file has at least one
/// mapped extent. Returns `None` on any failure rather than propagating
/// an error, per the non-fatal contract above.
pub fn first_extent_physical_offset(fd: RawFd) -> Option<u64> {
    let mut req = Fiemap {
        fm_start: 0,
        fm_length: u64::MAX,
        fm_flags: FIEMAP_FLAG_SYNC,
        fm_mapped_extents: 0,
        fm_extent_count: 1,
        fm_reserved: 0,
        fm_extents: [FiemapExtent {
            fe_logical: 0,
            fe_physical: 0,
            fe_length: 0,
            fe_reserved64: [0; 2],
            fe_flags: 0,
            fe_reserved: [0; 3],
        }],
    };

    let rc = unsafe { fiemap_ioctl(fd, &mut req as *mut Fiemap) };
    match rc {
        Ok(_) if req.fm_mapped_extents >= 1 => Some(req.fm_extents[0].fe_physical),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::io::AsRawFd;

    #[test]
    fn missing_support_returns_none_not_panic() {
        // /dev/null doesn't support FIEMAP; this must degrade gracefully.
        let f = std::fs::File::open("/dev/null").unwrap();
        assert_eq!(first_extent_physical_offset(f.as_raw_fd()), None);
    }

    #[test]
    fn regular_file_does_not_panic() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"hello").unwrap();
        f.flush().unwrap();
        // Result depends on the host filesystem; just must not panic.
        let _ = first_extent_physical_offset(f.as_file().as_raw_fd());
    }
}
