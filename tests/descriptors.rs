//! Failed allocations must not leave descriptors behind.
//!
//! Kept to a single test so nothing else in this binary opens or closes
//! descriptors while they are being counted.
#![cfg(target_os = "linux")]

use shmalloc::{Access, ErrorKind, Intent};
use std::ffi::CString;
use std::fs;

fn open_descriptors() -> usize {
    fs::read_dir("/proc/self/fd").unwrap().count()
}

fn segment_exists(name: &str) -> bool {
    let name = CString::new(name).unwrap();
    let fd = unsafe { libc::shm_open(name.as_ptr(), libc::O_RDONLY, 0) };
    if fd < 0 {
        return false;
    }
    unsafe { libc::close(fd) };
    true
}

fn unlink(name: &str) {
    let name = CString::new(name).unwrap();
    unsafe { libc::shm_unlink(name.as_ptr()) };
}

#[test]
fn failures_release_descriptors() {
    let name = format!("/shmalloc-fd-{:016x}", rand::random::<u64>());
    let baseline = open_descriptors();

    let err = shmalloc::alloc(&name, 4096, Intent::attach(Access::ReadWrite)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Open);
    assert_eq!(open_descriptors(), baseline);

    let err = shmalloc::alloc(&name, 4096, Intent::create(Access::ReadOnly)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Resize);
    assert_eq!(open_descriptors(), baseline);
    assert!(segment_exists(&name));
    unlink(&name);

    let err = shmalloc::alloc(&name, 0, Intent::create(Access::ReadWrite)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Map);
    assert_eq!(open_descriptors(), baseline);
    unlink(&name);

    let segment = shmalloc::alloc(&name, 4096, Intent::create(Access::ReadWrite)).unwrap();
    assert_eq!(open_descriptors(), baseline + 1);
    let (mapping, fd) = segment.into_parts();
    drop(fd);
    assert_eq!(open_descriptors(), baseline);
    drop(mapping);
    unlink(&name);
}
