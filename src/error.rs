use std::ffi::CStr;
use std::fmt::{self, Display, Formatter, Write};
use std::io;
use thiserror::Error;

/// The step of [`alloc`](crate::alloc) that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Open,
    Resize,
    Map,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorKind::Open => "open",
            ErrorKind::Resize => "resize",
            ErrorKind::Map => "mmap",
        })
    }
}

/// A failed allocation, together with the OS error recorded when it failed.
#[derive(Debug, Error)]
#[error("could not {kind} shared memory segment: {source}")]
pub struct AllocError {
    kind: ErrorKind,
    source: io::Error,
}

impl AllocError {
    pub fn new(kind: ErrorKind, source: io::Error) -> AllocError {
        AllocError { kind, source }
    }

    /// Must be called right after the failing call, before anything else can touch `errno`.
    pub(crate) fn last_os_error(kind: ErrorKind) -> AllocError {
        AllocError::new(kind, io::Error::last_os_error())
    }

    pub(crate) fn from_errno(kind: ErrorKind, errno: libc::c_int) -> AllocError {
        AllocError::new(kind, io::Error::from_raw_os_error(errno))
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn os_error(&self) -> &io::Error {
        &self.source
    }

    /// One-line diagnostic naming the failed step, the segment and, for a resize, the size.
    pub fn describe(&self, name: &str, size: usize) -> Result<String, DiagnosticUnavailable> {
        let reason = OsErrorText::new(&self.source);
        match self.kind {
            ErrorKind::Open => format_message(format_args!("Could not open {name}: {reason}")),
            ErrorKind::Resize => format_message(format_args!(
                "Could not resize {name} to {size}: {reason}"
            )),
            ErrorKind::Map => format_message(format_args!("Could not mmap {name}: {reason}")),
        }
    }
}

/// The diagnostic text could not be built, because memory for it could not be reserved.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("not enough memory to format a shared memory diagnostic")]
pub struct DiagnosticUnavailable;

/// Describes the outcome of an [`alloc`](crate::alloc) call; `Ok(None)` when there is nothing to report.
pub fn describe<T>(
    outcome: &Result<T, AllocError>,
    name: &str,
    size: usize,
) -> Result<Option<String>, DiagnosticUnavailable> {
    match outcome {
        Ok(_) => Ok(None),
        Err(err) => err.describe(name, size).map(Some),
    }
}

// Sizes the message first so the only allocation is a fallible reservation.
fn format_message(args: fmt::Arguments<'_>) -> Result<String, DiagnosticUnavailable> {
    struct Measure(usize);

    impl Write for Measure {
        fn write_str(&mut self, s: &str) -> fmt::Result {
            self.0 += s.len();
            Ok(())
        }
    }

    let mut measure = Measure(0);
    measure.write_fmt(args).map_err(|_| DiagnosticUnavailable)?;

    let mut message = String::new();
    message
        .try_reserve_exact(measure.0)
        .map_err(|_| DiagnosticUnavailable)?;
    message.write_fmt(args).map_err(|_| DiagnosticUnavailable)?;
    Ok(message)
}

const OS_ERROR_TEXT_LEN: usize = 128;

/// `strerror_r` into a stack buffer; io::Error's own Display allocates.
struct OsErrorText<'a> {
    error: &'a io::Error,
    buf: [u8; OS_ERROR_TEXT_LEN],
}

impl<'a> OsErrorText<'a> {
    fn new(error: &'a io::Error) -> OsErrorText<'a> {
        let mut buf = [0u8; OS_ERROR_TEXT_LEN];
        if let Some(code) = error.raw_os_error() {
            let ret = unsafe { libc::strerror_r(code, buf.as_mut_ptr().cast(), buf.len()) };
            if ret != 0 {
                buf[0] = 0;
            }
            // strerror_r may fill the whole buffer on truncation
            buf[OS_ERROR_TEXT_LEN - 1] = 0;
        }
        OsErrorText { error, buf }
    }
}

impl Display for OsErrorText<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let Some(code) = self.error.raw_os_error() else {
            return Display::fmt(self.error, f);
        };
        let text = CStr::from_bytes_until_nul(&self.buf)
            .ok()
            .and_then(|text| text.to_str().ok())
            .filter(|text| !text.is_empty())
            .unwrap_or("Unknown error");
        write!(f, "{text} (os error {code})")
    }
}
