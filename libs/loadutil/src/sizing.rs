//! Query the byte length of a file or block device, the two storage kinds
//! the loader is expected to read from (spec.md §4.3, §6).

use std::os::unix::io::RawFd;

use nix::sys::stat::{fstat, SFlag};

nix::ioctl_read!(blkgetsize64, 0x12, 114, u64);

/// The size, in bytes, the loader should read for an already-open fd:
/// `st_size` for a regular file, or the device's reported capacity for a
/// block device (whose `st_size` is usually 0).
pub fn query_size(fd: RawFd) -> Result<u64, nix::Error> {
    let st = fstat(fd)?;
    let mode = SFlag::from_bits_truncate(st.st_mode);

    if mode.contains(SFlag::S_IFBLK) {
        let mut size: u64 = 0;
        unsafe { blkgetsize64(fd, &mut size as *mut u64)? };
        Ok(size)
    } else {
        Ok(st.st_size as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::io::AsRawFd;

    #[test]
    fn regular_file_reports_st_size() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(&[0u8; 12345]).unwrap();
        f.flush().unwrap();
        let size = query_size(f.as_file().as_raw_fd()).unwrap();
        assert_eq!(size, 12345);
    }
}
