//! Create or attach to a POSIX named shared memory segment and map it in one call.
//!
//! ```no_run
//! use shmalloc::{Access, Intent};
//!
//! let segment = shmalloc::alloc("/demo", 4096, Intent::create(Access::ReadWrite))
//!     .map_err(|err| err.describe("/demo", 4096).unwrap_or_else(|err| err.to_string()))?;
//! unsafe { segment.mapping().as_ptr::<u8>().write(1) };
//!
//! // Another process attaches by name; the size argument is ignored.
//! let attached = shmalloc::alloc("/demo", 0, Intent::attach(Access::ReadOnly)).unwrap();
//! assert_eq!(attached.mapping().len(), 4096);
//! # Ok::<(), String>(())
//! ```
#![cfg(unix)]

mod error;
mod intent;
mod shm;

pub use error::{AllocError, DiagnosticUnavailable, ErrorKind, describe};
pub use intent::{Access, Intent, InvalidIntent, OpenFlags};
pub use shm::{Mapping, SEGMENT_MODE, Segment, alloc, alloc_with_flags};
