// SPDX-License-Identifier: MPL-2.0

//! The per-process file table and the file-oriented syscalls that drive it.
//!
//! [`open_file`] is component A of the core (one kernel-side open
//! instance), [`file_table`] is component B+C (the per-process descriptor
//! table plus stdio bootstrap), and [`syscalls`] is component D.

pub mod file_table;
pub mod open_file;
pub mod syscalls;

pub use file_table::{FileDesc, FileTable};
pub use open_file::OpenFile;

/// Bound on the number of descriptors a single process may hold open.
/// Spec mandates `OPEN_MAX >= 64`; indices `[0, OPEN_MAX)` are the valid
/// file-descriptor range, outside of which every lookup fails `EBADF`.
pub const OPEN_MAX: usize = 64;

static_assertions::const_assert!(OPEN_MAX >= 64);

bitflags::bitflags! {
    /// The raw `open` flags word, as accepted at the syscall boundary.
    pub struct OpenFlags: u32 {
        const O_RDONLY = 0x0000;
        const O_WRONLY = 0x0001;
        const O_RDWR   = 0x0002;
        const O_CREAT  = 0x0004;
        const O_EXCL   = 0x0008;
        const O_TRUNC  = 0x0010;
        const O_APPEND = 0x0020;
    }
}

pub const O_RDONLY: u32 = OpenFlags::O_RDONLY.bits();
pub const O_WRONLY: u32 = OpenFlags::O_WRONLY.bits();
pub const O_RDWR: u32 = OpenFlags::O_RDWR.bits();
pub const O_CREAT: u32 = OpenFlags::O_CREAT.bits();
pub const O_EXCL: u32 = OpenFlags::O_EXCL.bits();
pub const O_TRUNC: u32 = OpenFlags::O_TRUNC.bits();
pub const O_APPEND: u32 = OpenFlags::O_APPEND.bits();

/// `SEEK_SET` / `SEEK_CUR` / `SEEK_END`, as accepted by `lseek`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Whence {
    Set = 0,
    Cur = 1,
    End = 2,
}

impl Whence {
    pub fn from_raw(raw: i32) -> crate::prelude::Result<Self> {
        match raw {
            0 => Ok(Whence::Set),
            1 => Ok(Whence::Cur),
            2 => Ok(Whence::End),
            _ => crate::return_errno_with_message!(crate::error::Errno::EINVAL, "bad whence"),
        }
    }
}

/// The access-mode bits of an [`OpenFlags`] value, mutually exclusive.
pub const O_ACCMODE: u32 = OpenFlags::O_WRONLY.bits() | OpenFlags::O_RDWR.bits();

/// Validates that `flags` is one of the accepted combinations; anything
/// else is `EINVAL` at the syscall boundary before the VFS ever sees it.
pub fn validate_open_flags(flags: OpenFlags) -> crate::prelude::Result<()> {
    use crate::error::Errno;

    let accmode = flags.bits() & O_ACCMODE;
    if accmode == O_ACCMODE {
        // O_WRONLY | O_RDWR set together names neither read-only, write-only,
        // nor read-write; reject outright.
        crate::return_errno_with_message!(Errno::EINVAL, "ambiguous access mode");
    }

    if flags.contains(OpenFlags::O_TRUNC) && accmode == OpenFlags::O_WRONLY.bits() {
        // O_WRONLY|O_TRUNC alone (without O_CREAT) is not an accepted
        // combination; reject the write-only+truncate-without-create case.
        if !flags.contains(OpenFlags::O_CREAT) {
            crate::return_errno_with_message!(Errno::EINVAL, "truncate without create");
        }
    }

    if flags.contains(OpenFlags::O_APPEND) && accmode == OpenFlags::O_RDONLY.bits() {
        crate::return_errno_with_message!(Errno::EINVAL, "append on a read-only open");
    }

    Ok(())
}
