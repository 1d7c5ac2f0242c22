use crate::error::{AllocError, ErrorKind};
use crate::intent::{Access, Intent, OpenFlags};
use std::ffi::CString;
use std::mem::{ManuallyDrop, MaybeUninit};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd};
use std::ptr::{self, NonNull};

/// Permissions given to a newly created segment: owner read/write only.
pub const SEGMENT_MODE: libc::mode_t = 0o600;

/// A shared memory segment mapped into this process.
///
/// The mapping and the descriptor are released independently: the mapping is
/// unmapped when [`Mapping`] is dropped, the descriptor closed when its
/// [`OwnedFd`] is. Closing the descriptor early does not affect the mapping.
/// The segment name is never unlinked.
#[derive(Debug)]
pub struct Segment {
    mapping: Mapping,
    fd: OwnedFd,
}

impl Segment {
    pub fn mapping(&self) -> &Mapping {
        &self.mapping
    }

    pub fn into_parts(self) -> (Mapping, OwnedFd) {
        (self.mapping, self.fd)
    }
}

impl AsFd for Segment {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

#[derive(Debug)]
pub struct Mapping {
    ptr: NonNull<u8>,
    len: usize,
}

// A plain address range; what is stored behind it and how it is shared is up to the caller.
unsafe impl Send for Mapping {}
unsafe impl Sync for Mapping {}

impl Mapping {
    pub fn as_ptr<T>(&self) -> *mut T {
        self.ptr.as_ptr().cast()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Gives up ownership without unmapping; the caller becomes responsible for `munmap`.
    pub fn into_raw(self) -> (NonNull<u8>, usize) {
        let this = ManuallyDrop::new(self);
        (this.ptr, this.len)
    }

    /// # Safety
    ///
    /// `ptr` and `len` must describe a live mapping that nothing else will unmap.
    pub unsafe fn from_raw(ptr: NonNull<u8>, len: usize) -> Mapping {
        Mapping { ptr, len }
    }
}

impl Drop for Mapping {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.ptr.as_ptr().cast(), self.len);
        }
    }
}

/// Opens or creates the shared memory segment `name` and maps it.
///
/// With [`Intent::create`] the segment is created if missing and resized to
/// `size` bytes. With [`Intent::attach`] it must already exist, `size` is
/// ignored and the whole segment is mapped at its current length.
///
/// `shm_open` is called without `O_EXCL`, so a create caller cannot tell a
/// segment it just created from one that already existed under `name`; it
/// resizes either way. Callers sharing a name should agree on the size.
///
/// On error nothing stays open, except that a segment created before a failed
/// resize keeps its name. Failures are only reported through the returned
/// error; a successful mapping is logged at debug level.
pub fn alloc(name: &str, size: usize, intent: Intent) -> Result<Segment, AllocError> {
    let segment = try_alloc(name, size, intent)?;
    log::debug!(
        "mapped shared memory {name}: {} bytes, {:?}",
        segment.mapping.len,
        intent
    );
    Ok(segment)
}

/// [`alloc`] for callers holding raw [`OpenFlags`].
///
/// Flags that do not name exactly one access mode fail as [`ErrorKind::Open`]
/// with `EINVAL`, before the segment is touched.
pub fn alloc_with_flags(
    name: &str,
    size: usize,
    flags: OpenFlags,
) -> Result<Segment, AllocError> {
    let intent = Intent::try_from(flags)
        .map_err(|_| AllocError::from_errno(ErrorKind::Open, libc::EINVAL))?;
    alloc(name, size, intent)
}

fn try_alloc(name: &str, size: usize, intent: Intent) -> Result<Segment, AllocError> {
    let fd = open(name, intent)?;
    let len = if intent.creates() {
        resize(&fd, size)?;
        size
    } else {
        current_size(&fd)?
    };
    let mapping = map(&fd, len, intent.access())?;
    Ok(Segment { mapping, fd })
}

fn open(name: &str, intent: Intent) -> Result<OwnedFd, AllocError> {
    let name =
        CString::new(name).map_err(|_| AllocError::from_errno(ErrorKind::Open, libc::EINVAL))?;
    let fd = unsafe {
        libc::shm_open(
            name.as_ptr(),
            intent.oflag(),
            libc::c_uint::from(SEGMENT_MODE),
        )
    };
    if fd < 0 {
        return Err(AllocError::last_os_error(ErrorKind::Open));
    }
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

fn resize(fd: &OwnedFd, size: usize) -> Result<(), AllocError> {
    let len = libc::off_t::try_from(size)
        .map_err(|_| AllocError::from_errno(ErrorKind::Resize, libc::EFBIG))?;
    if unsafe { libc::ftruncate(fd.as_raw_fd(), len) } < 0 {
        return Err(AllocError::last_os_error(ErrorKind::Resize));
    }
    Ok(())
}

fn current_size(fd: &OwnedFd) -> Result<usize, AllocError> {
    let mut stat = MaybeUninit::<libc::stat>::uninit();
    if unsafe { libc::fstat(fd.as_raw_fd(), stat.as_mut_ptr()) } < 0 {
        return Err(AllocError::last_os_error(ErrorKind::Open));
    }
    let stat = unsafe { stat.assume_init() };
    usize::try_from(stat.st_size)
        .map_err(|_| AllocError::from_errno(ErrorKind::Open, libc::EOVERFLOW))
}

fn map(fd: &OwnedFd, len: usize, access: Access) -> Result<Mapping, AllocError> {
    let memory = unsafe {
        libc::mmap(
            ptr::null_mut(),
            len,
            access.protection(),
            libc::MAP_SHARED,
            fd.as_raw_fd(),
            0,
        )
    };
    if memory == libc::MAP_FAILED {
        return Err(AllocError::last_os_error(ErrorKind::Map));
    }
    let ptr = NonNull::new(memory.cast::<u8>())
        .ok_or_else(|| AllocError::from_errno(ErrorKind::Map, libc::EFAULT))?;
    Ok(Mapping { ptr, len })
}
