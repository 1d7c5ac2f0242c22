//! Several callers creating the same segment at once.
#![cfg(unix)]

use shmalloc::{Access, Intent};
use std::ffi::CString;
use std::sync::Barrier;
use std::thread;

const CREATORS: usize = 16;

struct Name(String);

impl Drop for Name {
    fn drop(&mut self) {
        let name = CString::new(self.0.as_str()).unwrap();
        unsafe { libc::shm_unlink(name.as_ptr()) };
    }
}

#[test]
fn concurrent_creators_share_one_segment() {
    let name = Name(format!("/shmalloc-race-{:016x}", rand::random::<u64>()));
    let start = Barrier::new(CREATORS);
    let written = Barrier::new(CREATORS);

    thread::scope(|scope| {
        for i in 0..CREATORS {
            let (name, start, written) = (&name.0, &start, &written);
            scope.spawn(move || {
                start.wait();
                let segment =
                    shmalloc::alloc(name, 4096, Intent::create(Access::ReadWrite)).unwrap();
                assert_eq!(segment.mapping().len(), 4096);

                let base = segment.mapping().as_ptr::<u8>();
                unsafe { base.add(i).write_volatile(i as u8 + 1) };
                // every creator keeps its mapping until all have written
                written.wait();
                for j in 0..CREATORS {
                    let value = unsafe { base.add(j).read_volatile() };
                    assert_eq!(value, j as u8 + 1, "creator {i} reading slot {j}");
                }
            });
        }
    });

    let attached = shmalloc::alloc(&name.0, 1, Intent::attach(Access::ReadOnly)).unwrap();
    assert_eq!(attached.mapping().len(), 4096);
    let base = attached.mapping().as_ptr::<u8>();
    for j in 0..CREATORS {
        assert_eq!(unsafe { base.add(j).read_volatile() }, j as u8 + 1);
    }
}
