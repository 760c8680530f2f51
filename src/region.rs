//! Raw memory regions shared between client and driver.
//!
//! [`Region`] is an unowned view over mapped bytes. Backings come in two
//! flavors: [`HeapRegion`] (aligned heap memory, used by tests) and
//! [`FileRegion`] (a file-backed `MAP_SHARED` mapping, used for the control
//! file and log files).

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, AtomicU64};

/// An unowned view over a contiguous run of mapped bytes.
///
/// The backing (heap allocation or mmap) must outlive every `Region` derived
/// from it; holders keep the backing alive through an `Arc` to its owner.
#[derive(Debug, Clone, Copy)]
pub struct Region {
    ptr: *mut u8,
    len: usize,
}

// Safety: a Region is a dumb pointer/length pair over shared memory. All
// cross-thread access goes through atomics or externally serialized writes.
unsafe impl Send for Region {}
unsafe impl Sync for Region {}

impl Region {
    /// # Safety
    ///
    /// `ptr` must be valid for reads and writes of `len` bytes for as long as
    /// any copy of the returned `Region` is in use.
    pub unsafe fn from_raw(ptr: *mut u8, len: usize) -> Self {
        Region { ptr, len }
    }

    #[inline]
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// A sub-view of this region. Panics if the range is out of bounds.
    pub fn subregion(&self, offset: usize, len: usize) -> Region {
        assert!(
            offset.checked_add(len).is_some_and(|end| end <= self.len),
            "subregion out of bounds: offset={offset} len={len} region_len={}",
            self.len
        );
        Region {
            ptr: unsafe { self.ptr.add(offset) },
            len,
        }
    }

    /// Borrow `len` bytes at `offset`.
    ///
    /// # Safety
    ///
    /// The caller must ensure no concurrent writer touches this range.
    pub unsafe fn bytes(&self, offset: usize, len: usize) -> &[u8] {
        assert!(offset + len <= self.len, "read out of bounds");
        unsafe { std::slice::from_raw_parts(self.ptr.add(offset), len) }
    }

    /// Borrow `len` bytes at `offset`, mutably.
    ///
    /// # Safety
    ///
    /// The caller must ensure this range is not accessed concurrently.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn bytes_mut(&self, offset: usize, len: usize) -> &mut [u8] {
        assert!(offset + len <= self.len, "write out of bounds");
        unsafe { std::slice::from_raw_parts_mut(self.ptr.add(offset), len) }
    }

    /// View an `AtomicU64` embedded at `offset`. Panics if `offset` is not
    /// 8-byte aligned or out of bounds.
    pub fn atomic_u64_at(&self, offset: usize) -> &AtomicU64 {
        assert!(offset + 8 <= self.len, "atomic out of bounds");
        let ptr = unsafe { self.ptr.add(offset) };
        assert!(ptr as usize % 8 == 0, "atomic not 8-byte aligned");
        unsafe { &*(ptr as *const AtomicU64) }
    }

    /// View an `AtomicI64` embedded at `offset`. Panics if `offset` is not
    /// 8-byte aligned or out of bounds.
    pub fn atomic_i64_at(&self, offset: usize) -> &AtomicI64 {
        assert!(offset + 8 <= self.len, "atomic out of bounds");
        let ptr = unsafe { self.ptr.add(offset) };
        assert!(ptr as usize % 8 == 0, "atomic not 8-byte aligned");
        unsafe { &*(ptr as *const AtomicI64) }
    }
}

/// Cache-line-aligned, zeroed heap memory. Backs control-file and ring tests.
pub struct HeapRegion {
    ptr: *mut u8,
    layout: std::alloc::Layout,
}

// Safety: the allocation lives until drop; access discipline is the Region's.
unsafe impl Send for HeapRegion {}
unsafe impl Sync for HeapRegion {}

impl HeapRegion {
    /// Allocate `len` zeroed bytes with 64-byte alignment.
    pub fn new_zeroed(len: usize) -> Self {
        assert!(len > 0, "len must be > 0");
        let layout = std::alloc::Layout::from_size_align(len, 64).expect("bad layout");
        let ptr = unsafe { std::alloc::alloc_zeroed(layout) };
        assert!(!ptr.is_null(), "allocation failed");
        HeapRegion { ptr, layout }
    }

    pub fn region(&self) -> Region {
        unsafe { Region::from_raw(self.ptr, self.layout.size()) }
    }
}

impl Drop for HeapRegion {
    fn drop(&mut self) {
        unsafe { std::alloc::dealloc(self.ptr, self.layout) }
    }
}

/// File-backed memory-mapped region shared across processes.
pub struct FileRegion {
    ptr: *mut u8,
    len: usize,
    /// Kept open to maintain the mapping
    #[allow(dead_code)]
    file: File,
    path: PathBuf,
    /// Whether this region owns the file (delete on drop)
    owns_file: bool,
}

impl FileRegion {
    /// Create the file, truncate it to `size`, and map it with `MAP_SHARED`.
    ///
    /// The file is created with permissions 0600. The creator owns the file
    /// and unlinks it on drop.
    pub fn create(path: &Path, size: usize) -> io::Result<Self> {
        if size == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "size must be > 0",
            ));
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
        file.set_len(size as u64)?;

        let ptr = Self::map(&file, size)?;

        Ok(Self {
            ptr,
            len: size,
            file,
            path: path.to_path_buf(),
            owns_file: true,
        })
    }

    /// Map an existing file with `MAP_SHARED`. The file size determines the
    /// mapping size. Attached regions do not unlink the file on drop.
    pub fn attach(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;

        let size = file.metadata()?.len() as usize;
        if size == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "mapped file is empty",
            ));
        }

        let ptr = Self::map(&file, size)?;

        Ok(Self {
            ptr,
            len: size,
            file,
            path: path.to_path_buf(),
            owns_file: false,
        })
    }

    fn map(file: &File, size: usize) -> io::Result<*mut u8> {
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                file.as_raw_fd(),
                0,
            )
        };

        if ptr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        Ok(ptr as *mut u8)
    }

    #[inline]
    pub fn region(&self) -> Region {
        unsafe { Region::from_raw(self.ptr, self.len) }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release ownership of the file: it will not be unlinked on drop.
    pub fn release_ownership(&mut self) {
        self.owns_file = false;
    }
}

impl Drop for FileRegion {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.ptr as *mut libc::c_void, self.len);
        }

        if self.owns_file {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

// Safety: the mapping stays valid for the lifetime of FileRegion and the
// underlying memory is shared by design.
unsafe impl Send for FileRegion {}
unsafe impl Sync for FileRegion {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    #[test]
    fn create_and_attach_share_memory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.map");

        let owner = FileRegion::create(&path, 4096).unwrap();
        assert_eq!(owner.len(), 4096);
        assert!(path.exists());

        owner.region().atomic_u64_at(64).store(0x42, Ordering::Release);

        let attached = FileRegion::attach(&path).unwrap();
        assert_eq!(attached.len(), 4096);
        assert_eq!(attached.region().atomic_u64_at(64).load(Ordering::Acquire), 0x42);
    }

    #[test]
    fn owner_unlinks_on_drop_attached_does_not() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cleanup.map");

        let owner = FileRegion::create(&path, 1024).unwrap();

        {
            let _attached = FileRegion::attach(&path).unwrap();
        }
        assert!(path.exists());

        drop(owner);
        assert!(!path.exists());
    }

    #[test]
    fn create_sets_restrictive_permissions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("perms.map");

        let _region = FileRegion::create(&path, 1024).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }

    #[test]
    fn zero_size_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(FileRegion::create(&dir.path().join("zero.map"), 0).is_err());
    }

    #[test]
    fn attach_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(FileRegion::attach(&dir.path().join("missing.map")).is_err());
    }

    #[test]
    fn heap_region_is_zeroed_and_aligned() {
        let heap = HeapRegion::new_zeroed(256);
        let region = heap.region();
        assert_eq!(region.as_ptr() as usize % 64, 0);
        assert_eq!(unsafe { region.bytes(0, 256) }, &[0u8; 256][..]);
    }

    #[test]
    fn subregion_bounds() {
        let heap = HeapRegion::new_zeroed(128);
        let region = heap.region();
        let sub = region.subregion(64, 64);
        assert_eq!(sub.len(), 64);
    }

    #[test]
    #[should_panic(expected = "subregion out of bounds")]
    fn subregion_overflow_panics() {
        let heap = HeapRegion::new_zeroed(128);
        heap.region().subregion(64, 128);
    }
}
