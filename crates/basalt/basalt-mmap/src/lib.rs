use memmap2::MmapMut;
use std::{
    fs::{File, OpenOptions},
    io,
    path::Path,
};

/// A regular file mapped read-write for its whole length.
///
/// Every access goes through the raw pointer; the mapping's length is the
/// file's length at open time and never changes afterwards.
#[derive(Debug)]
pub struct MmapFileMut {
    /// File handle kept alive to maintain the memory map validity
    _file: File,
    /// Memory-mapped region providing mutable access to file contents
    mmap: MmapMut,
}

impl MmapFileMut {
    /// Create a new file of exactly `size_bytes` zero bytes and map it
    /// read-write.
    ///
    /// Fails if the path already exists: a live channel file must never be
    /// truncated while a peer may have it mapped.
    pub fn create_rw<P: AsRef<Path>>(path: P, size_bytes: u64) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create_new(true)
            .read(true)
            .write(true)
            .open(path)?;
        file.set_len(size_bytes)?;

        let mmap = unsafe { MmapMut::map_mut(&file)? };
        Ok(Self { _file: file, mmap })
    }

    /// Open an existing file and map its current length read-write.
    pub fn open_rw<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;

        let mmap = unsafe { MmapMut::map_mut(&file)? };

        Ok(Self { _file: file, mmap })
    }

    /// Map `path` read-write, first creating it as `size_bytes` zero bytes
    /// if it does not exist. An existing file is mapped at whatever length
    /// it already has.
    pub fn open_or_create<P: AsRef<Path>>(path: P, size_bytes: u64) -> io::Result<Self> {
        if path.as_ref().exists() {
            Self::open_rw(path)
        } else {
            Self::create_rw(path, size_bytes)
        }
    }

    /// Return raw pointer to start of memory mapped file data
    #[inline]
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.mmap.as_mut_ptr()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.mmap.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn scratch_path(tag: &str) -> PathBuf {
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("basalt_mmap_{tag}_{ts}"))
    }

    #[test]
    fn mmap_roundtrip_bytes() {
        let path = scratch_path("roundtrip");
        let size = 4096;

        {
            let mut mm = MmapFileMut::create_rw(&path, size).unwrap();
            unsafe {
                let p = mm.as_mut_ptr();
                *p.add(0) = 0xAB;
                *p.add(size as usize - 1) = 0xCD;
            }
        }
        {
            let mut mm = MmapFileMut::open_rw(&path).unwrap();
            assert_eq!(mm.len(), size as usize);
            unsafe {
                let p = mm.as_mut_ptr();
                assert_eq!(*p.add(0), 0xAB);
                assert_eq!(*p.add(size as usize - 1), 0xCD);
            }
        }

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn open_or_create_sizes_a_fresh_file() {
        let path = scratch_path("fresh");

        let mm = MmapFileMut::open_or_create(&path, 128).unwrap();
        assert_eq!(mm.len(), 128);
        assert_eq!(fs::metadata(&path).unwrap().len(), 128);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn open_or_create_keeps_an_existing_file() {
        let path = scratch_path("existing");

        {
            let mut mm = MmapFileMut::create_rw(&path, 64).unwrap();
            unsafe { *mm.as_mut_ptr() = 0x7F };
        }

        // A second open with a different size must not resize or clear.
        let mut mm = MmapFileMut::open_or_create(&path, 4096).unwrap();
        assert_eq!(mm.len(), 64);
        unsafe { assert_eq!(*mm.as_mut_ptr(), 0x7F) };

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn create_rw_refuses_an_existing_file() {
        let path = scratch_path("refuse");

        let _mm = MmapFileMut::create_rw(&path, 64).unwrap();
        assert!(MmapFileMut::create_rw(&path, 64).is_err());

        let _ = fs::remove_file(&path);
    }
}
