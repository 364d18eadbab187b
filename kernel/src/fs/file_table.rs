// SPDX-License-Identifier: MPL-2.0

//! Component B+C: the per-process file-descriptor table and stdio
//! bootstrap.

use crate::collab::Vfs;
use crate::fs::{OpenFile, OpenFlags, OPEN_MAX};
use crate::prelude::*;

pub type FileDesc = i32;

/// A fixed-capacity array of optional [`OpenFile`] references, indexed by
/// file descriptor. The table lock protects slot membership only — which
/// indices are occupied and what sits in them — never the contents of an
/// `OpenFile`, which has its own lock. Lock discipline:
/// table lock before `OpenFile` lock, never the reverse.
pub struct FileTable {
    slots: Mutex<Vec<Option<Arc<OpenFile>>>>,
}

impl FileTable {
    /// `filetable_init`: a fresh table with every slot empty.
    pub fn new() -> Arc<Self> {
        let mut slots = Vec::with_capacity(OPEN_MAX);
        slots.resize_with(OPEN_MAX, || None);
        Arc::new(Self {
            slots: Mutex::new(slots),
        })
    }

    /// `init_stdio`: opens `"con:"` three times — read-only, write-only,
    /// write-only — and installs the results at fds 0, 1, 2. Any VFS
    /// failure propagates without partially populating the table (the
    /// first failure short-circuits, leaving a table with too-few slots
    /// filled, which the caller must treat as fatal to process creation).
    pub fn bootstrap_stdio(self: &Arc<Self>, vfs: &dyn Vfs) -> Result<()> {
        let stdin = vfs.open("con:", crate::fs::O_RDONLY, 0)?;
        let stdout = vfs.open("con:", crate::fs::O_WRONLY, 0)?;
        let stderr = vfs.open("con:", crate::fs::O_WRONLY, 0)?;

        let mut slots = self.slots.lock().unwrap();
        slots[0] = Some(OpenFile::new(stdin, OpenFlags::O_RDONLY));
        slots[1] = Some(OpenFile::new(stdout, OpenFlags::O_WRONLY));
        slots[2] = Some(OpenFile::new(stderr, OpenFlags::O_WRONLY));
        Ok(())
    }

    fn check_range(fd: FileDesc) -> Result<usize> {
        if fd < 0 || fd as usize >= OPEN_MAX {
            return_errno_with_message!(Errno::EBADF, "fd out of range");
        }
        Ok(fd as usize)
    }

    /// `filetable_get`. Resolves `fd` to the `OpenFile` it names.
    pub fn get(&self, fd: FileDesc) -> Result<Arc<OpenFile>> {
        let idx = Self::check_range(fd)?;
        self.slots.lock().unwrap()[idx]
            .clone()
            .ok_or(Error::with_message(Errno::EBADF, "fd not open"))
    }

    /// `filetable_add`. Fails `EBADF` if the slot is already occupied;
    /// callers that intend to overwrite must [`FileTable::remove`] first.
    /// `dup2` does not go through this path — see [`FileTable::dup2`].
    pub fn insert_at(&self, fd: FileDesc, of: Arc<OpenFile>) -> Result<()> {
        let idx = Self::check_range(fd)?;
        let mut slots = self.slots.lock().unwrap();
        if slots[idx].is_some() {
            return_errno_with_message!(Errno::EBADF, "fd already in use");
        }
        slots[idx] = Some(of);
        Ok(())
    }

    /// `filetable_add_generic`. Installs `of` at the lowest unused fd `>=
    /// 3` (0, 1, 2 are reserved for stdio by convention, not by this
    /// function's enforcement) and returns that fd.
    pub fn insert_lowest(&self, of: Arc<OpenFile>) -> Result<FileDesc> {
        let mut slots = self.slots.lock().unwrap();
        let idx = slots
            .iter()
            .enumerate()
            .skip(3)
            .find(|(_, slot)| slot.is_none())
            .map(|(idx, _)| idx)
            .ok_or(Error::with_message(Errno::EMFILE, "file table full"))?;
        slots[idx] = Some(of);
        Ok(idx as FileDesc)
    }

    /// `filetable_remove`. Clears the slot without touching the vnode;
    /// the caller decides whether this removal was the last reference and
    /// is responsible for calling `vfs_close` if so.
    pub fn remove(&self, fd: FileDesc) -> Result<Arc<OpenFile>> {
        let idx = Self::check_range(fd)?;
        let mut slots = self.slots.lock().unwrap();
        slots[idx]
            .take()
            .ok_or(Error::with_message(Errno::EBADF, "fd not open"))
    }

    /// `sys_dup2`'s atomic core. Validates `newfd`'s range before touching
    /// any state, then resolves `oldfd`, evicts whatever previously sat at
    /// `newfd`, and installs `oldfd`'s `OpenFile` there — all under one
    /// lock acquisition, so a concurrent `close`/`dup2` racing on either fd
    /// cannot interleave with this one. Returns the installed `OpenFile`
    /// and whatever was evicted from `newfd`, if anything; the caller is
    /// responsible for the vnode refcount bump and for closing the evicted
    /// file.
    pub fn dup2(&self, oldfd: FileDesc, newfd: FileDesc) -> Result<(Arc<OpenFile>, Option<Arc<OpenFile>>)> {
        let new_idx = Self::check_range(newfd)?;
        let old_idx = Self::check_range(oldfd)?;
        let mut slots = self.slots.lock().unwrap();
        let of = slots[old_idx]
            .clone()
            .ok_or(Error::with_message(Errno::EBADF, "fd not open"))?;
        let previous = slots[new_idx].take();
        slots[new_idx] = Some(of.clone());
        Ok((of, previous))
    }

    /// `copy_filetable`. A shallow, reference-sharing copy: both tables
    /// now point at the same `OpenFile` instances and therefore share
    /// their offsets and locks. This is the POSIX `fork` contract
    /// This is the POSIX `fork` contract.
    pub fn copy(&self) -> Arc<Self> {
        let slots = self.slots.lock().unwrap().clone();
        Arc::new(Self {
            slots: Mutex::new(slots),
        })
    }

    /// Number of slots occupied, used by tests asserting table-size
    /// invariants after close/dup2 sequences.
    pub fn occupied_count(&self) -> usize {
        self.slots.lock().unwrap().iter().filter(|s| s.is_some()).count()
    }
}
