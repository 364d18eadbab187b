// SPDX-License-Identifier: MPL-2.0

//! Component A: the kernel-side open-file instance.

use crate::collab::Vnode;
use crate::fs::OpenFlags;
use crate::prelude::*;

/// One open instance of a vnode: a shared vnode handle, the access-mode
/// flags it was opened with, a seek offset, and the lock serializing
/// mutation of both. Multiple file-descriptor slots — across `dup2`, across
/// `fork` — may hold an `Arc<OpenFile>` pointing at the same instance; that
/// sharing is the entire point.
///
/// `vnode` and `flags` never change after construction, so they need no
/// lock of their own; `offset` does, and `inner` is exactly that lock.
pub struct OpenFile {
    vnode: Arc<dyn Vnode>,
    flags: OpenFlags,
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for OpenFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenFile").field("flags", &self.flags).finish()
    }
}

struct Inner {
    offset: i64,
}

impl OpenFile {
    /// `openfile_init`. `offset` starts at 0; callers implementing
    /// `O_APPEND` overwrite it via [`OpenFile::set_offset`] before the
    /// file table becomes visible to other threads.
    pub fn new(vnode: Arc<dyn Vnode>, flags: OpenFlags) -> Arc<Self> {
        Arc::new(Self {
            vnode,
            flags,
            inner: Mutex::new(Inner { offset: 0 }),
        })
    }

    pub fn vnode(&self) -> &Arc<dyn Vnode> {
        &self.vnode
    }

    pub fn flags(&self) -> OpenFlags {
        self.flags
    }

    fn access_mode(&self) -> u32 {
        self.flags.bits() & crate::fs::O_ACCMODE
    }

    pub fn readable(&self) -> bool {
        self.access_mode() != crate::fs::O_WRONLY
    }

    pub fn writable(&self) -> bool {
        self.access_mode() != crate::fs::O_RDONLY
    }

    pub fn offset(&self) -> i64 {
        self.inner.lock().unwrap().offset
    }

    pub fn set_offset(&self, offset: i64) {
        debug_assert!(offset >= 0);
        self.inner.lock().unwrap().offset = offset;
    }

    /// Reads at most `buf.len()` bytes from the current offset, advancing
    /// it by the number of bytes actually transferred. Holds the instance
    /// lock for the full read-modify-offset sequence, which is what makes
    /// concurrent reads/writes on a shared descriptor serialize (§5).
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        if !self.readable() {
            return_errno_with_message!(Errno::EBADF, "file not opened for reading");
        }
        let mut inner = self.inner.lock().unwrap();
        let n = self.vnode.read(inner.offset, buf)?;
        inner.offset += n as i64;
        Ok(n)
    }

    /// Symmetric to [`OpenFile::read`].
    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        if !self.writable() {
            return_errno_with_message!(Errno::EBADF, "file not opened for writing");
        }
        let mut inner = self.inner.lock().unwrap();
        let n = self.vnode.write(inner.offset, buf)?;
        inner.offset += n as i64;
        Ok(n)
    }

    /// `sys_lseek`'s core: computes, validates, and commits a new offset
    /// under the instance lock, returning it.
    pub fn seek(&self, pos: i64, whence: crate::fs::Whence) -> Result<i64> {
        use crate::fs::Whence;

        if !self.vnode.is_seekable() {
            return_errno_with_message!(Errno::ESPIPE, "vnode is not seekable");
        }

        let mut inner = self.inner.lock().unwrap();
        let new_offset = match whence {
            Whence::Set => pos,
            Whence::Cur => inner.offset.checked_add(pos).ok_or(Error::with_message(
                Errno::EINVAL,
                "seek offset overflow",
            ))?,
            Whence::End => {
                let size = self.vnode.size()? as i64;
                size.checked_add(pos).ok_or(Error::with_message(
                    Errno::EINVAL,
                    "seek offset overflow",
                ))?
            }
        };

        if new_offset < 0 {
            return_errno_with_message!(Errno::EINVAL, "negative resulting offset");
        }

        inner.offset = new_offset;
        Ok(new_offset)
    }
}
