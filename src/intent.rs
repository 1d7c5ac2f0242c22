use bitflags::bitflags;
use thiserror::Error;

bitflags! {
    /// Raw open flags, as a caller coming from `O_CREAT | O_RDWR` style code would pass them.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OpenFlags: u8 {
        const CREATE = 1 << 0;
        const READ_WRITE = 1 << 1;
        const READ_ONLY = 1 << 2;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    ReadOnly,
    ReadWrite,
}

impl Access {
    fn open_mode(self) -> libc::c_int {
        match self {
            Access::ReadOnly => libc::O_RDONLY,
            Access::ReadWrite => libc::O_RDWR,
        }
    }

    pub(crate) fn protection(self) -> libc::c_int {
        match self {
            Access::ReadOnly => libc::PROT_READ,
            Access::ReadWrite => libc::PROT_READ | libc::PROT_WRITE,
        }
    }
}

/// What [`alloc`](crate::alloc) should do with a segment name.
///
/// Unlike [`OpenFlags`], an `Intent` always names exactly one access mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Intent {
    create: bool,
    access: Access,
}

impl Intent {
    /// Create the segment if it is missing and size it to the requested length.
    pub const fn create(access: Access) -> Intent {
        Intent {
            create: true,
            access,
        }
    }

    /// Attach to an existing segment, mapping it at its current size.
    pub const fn attach(access: Access) -> Intent {
        Intent {
            create: false,
            access,
        }
    }

    pub fn creates(&self) -> bool {
        self.create
    }

    pub fn access(&self) -> Access {
        self.access
    }

    pub(crate) fn oflag(&self) -> libc::c_int {
        let create = if self.create { libc::O_CREAT } else { 0 };
        create | self.access.open_mode()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("open flags {0:?} must contain exactly one of READ_WRITE or READ_ONLY")]
pub struct InvalidIntent(pub OpenFlags);

impl TryFrom<OpenFlags> for Intent {
    type Error = InvalidIntent;

    fn try_from(flags: OpenFlags) -> Result<Intent, InvalidIntent> {
        let access = match (
            flags.contains(OpenFlags::READ_WRITE),
            flags.contains(OpenFlags::READ_ONLY),
        ) {
            (true, false) => Access::ReadWrite,
            (false, true) => Access::ReadOnly,
            _ => return Err(InvalidIntent(flags)),
        };
        Ok(Intent {
            create: flags.contains(OpenFlags::CREATE),
            access,
        })
    }
}

impl From<Intent> for OpenFlags {
    fn from(intent: Intent) -> OpenFlags {
        let mut flags = match intent.access {
            Access::ReadOnly => OpenFlags::READ_ONLY,
            Access::ReadWrite => OpenFlags::READ_WRITE,
        };
        flags.set(OpenFlags::CREATE, intent.create);
        flags
    }
}
