// SPDX-License-Identifier: MPL-2.0

//! Component D: the file syscalls. Each takes the invoking
//! [`Process`](crate::process::Process) plus the user-memory copy
//! primitive that stands in for the trapframe's implicit address space,
//! and drives [`OpenFile`]/[`FileTable`] and the [`Vfs`] collaborator.

use crate::collab::{UserMemory, Vfs};
use crate::fs::{file_table::FileDesc, open_file::OpenFile, OpenFlags, Whence};
use crate::prelude::*;
use crate::process::Process;

/// Longest path a filename argument may occupy in user memory.
pub const PATH_MAX: usize = 1024;

/// `sys_open`. Copies `filename` in from user space, asks the VFS to open
/// it, wraps the result in a fresh [`OpenFile`], and installs it at the
/// lowest free descriptor `>= 3`.
pub fn open(
    process: &Process,
    vfs: &dyn Vfs,
    user_mem: &dyn UserMemory,
    filename_ptr: u64,
    raw_flags: u32,
) -> Result<FileDesc> {
    let flags = OpenFlags::from_bits(raw_flags)
        .ok_or(Error::with_message(Errno::EINVAL, "unrecognized open flags"))?;
    crate::fs::validate_open_flags(flags)?;

    let filename = user_mem.copy_in_cstring(filename_ptr, PATH_MAX)?;
    let vnode = vfs.open(&filename, flags.bits(), 0o664)?;
    let of = OpenFile::new(vnode, flags);

    if flags.contains(OpenFlags::O_APPEND) {
        let size = of.vnode().size()?;
        of.set_offset(size as i64);
    }

    match process.file_table().insert_lowest(of.clone()) {
        Ok(fd) => Ok(fd),
        Err(err) => {
            // Unwind: the vnode was opened but never installed anywhere.
            vfs.close(of.vnode());
            Err(err)
        }
    }
}

/// `sys_close`. Idempotent-safe: a second close on the same fd sees an
/// empty slot and returns `EBADF`.
pub fn close(process: &Process, vfs: &dyn Vfs, fd: FileDesc) -> Result<()> {
    let of = process.file_table().remove(fd)?;
    vfs.close(of.vnode());
    Ok(())
}

/// `sys_read`.
pub fn read(
    process: &Process,
    user_mem: &dyn UserMemory,
    fd: FileDesc,
    buf_ptr: u64,
    count: usize,
) -> Result<usize> {
    let of = process.file_table().get(fd)?;
    let mut buf = vec![0u8; count];
    let n = of.read(&mut buf)?;
    user_mem.copy_out(buf_ptr, &buf[..n])?;
    Ok(n)
}

/// `sys_write`.
pub fn write(
    process: &Process,
    user_mem: &dyn UserMemory,
    fd: FileDesc,
    buf_ptr: u64,
    count: usize,
) -> Result<usize> {
    let of = process.file_table().get(fd)?;
    let buf = user_mem.copy_in(buf_ptr, count)?;
    of.write(&buf)
}

/// `sys_lseek`.
pub fn lseek(process: &Process, fd: FileDesc, pos: i64, whence: Whence) -> Result<i64> {
    let of = process.file_table().get(fd)?;
    of.seek(pos, whence)
}

/// `sys_dup2`. `oldfd == newfd` is a documented no-op returning `newfd`
/// unchanged; otherwise the lookup, eviction, and install happen as one
/// atomic [`FileTable::dup2`] call, so `newfd`'s range is checked before
/// anything is mutated and no concurrent `close`/`dup2` can interleave.
pub fn dup2(process: &Process, vfs: &dyn Vfs, oldfd: FileDesc, newfd: FileDesc) -> Result<FileDesc> {
    if oldfd == newfd {
        // Still validate that oldfd names something open, per POSIX.
        process.file_table().get(oldfd)?;
        return Ok(newfd);
    }

    let (of, previous) = process.file_table().dup2(oldfd, newfd)?;
    of.vnode().incref();
    if let Some(previous) = previous {
        vfs.close(previous.vnode());
    }
    Ok(newfd)
}

/// `sys_chdir`.
pub fn chdir(process: &Process, vfs: &dyn Vfs, user_mem: &dyn UserMemory, path_ptr: u64) -> Result<()> {
    let path = user_mem.copy_in_cstring(path_ptr, PATH_MAX)?;
    let new_cwd = vfs.chdir(&process.cwd(), &path)?;
    process.set_cwd(new_cwd);
    Ok(())
}

/// `sys___getcwd`.
pub fn getcwd(
    process: &Process,
    vfs: &dyn Vfs,
    user_mem: &dyn UserMemory,
    buf_ptr: u64,
    buf_len: usize,
) -> Result<usize> {
    let cwd = process.cwd();
    let rendered = vfs.getcwd(&cwd)?;
    let bytes = rendered.as_bytes();
    let n = bytes.len().min(buf_len);
    user_mem.copy_out(buf_ptr, &bytes[..n])?;
    Ok(n)
}
