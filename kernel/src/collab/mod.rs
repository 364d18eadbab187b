// SPDX-License-Identifier: MPL-2.0

//! Contracts for the subsystems this crate treats as external collaborators:
//! the VFS, the address-space manager, the thread scheduler, and the
//! user-memory copy primitive a trap-frame dispatcher relies on. None of
//! these are implemented here in earnest — [`mem`] provides hosted test
//! doubles so the syscall layer can be exercised without a real kernel
//! underneath it.

pub mod mem;

use crate::prelude::*;

/// A VFS-level handle for an open filesystem object. Opaque to the syscall
/// layer beyond the operations below; the VFS owns the real refcounting.
/// The `Any` upcast exists only so that a concrete `Vfs` implementation can
/// recover its own vnode type from the trait object it handed out.
pub trait Vnode: Send + Sync + std::any::Any {
    fn as_any(&self) -> &dyn std::any::Any;

    /// `VOP_READ`. Reads at most `buf.len()` bytes starting at `offset`,
    /// returning the number of bytes actually transferred.
    fn read(&self, offset: i64, buf: &mut [u8]) -> Result<usize>;

    /// `VOP_WRITE`. Symmetric to `read`.
    fn write(&self, offset: i64, buf: &[u8]) -> Result<usize>;

    /// `VOP_STAT(..).size`. The current end-of-file offset.
    fn size(&self) -> Result<u64>;

    /// `VOP_ISSEEKABLE`.
    fn is_seekable(&self) -> bool;

    /// `VOP_INCREF`. Bumps the VFS-side reference count without going
    /// through `vfs_open` again, used by `dup2` when aliasing into an
    /// occupied slot.
    fn incref(&self);
}

/// The virtual filesystem the syscall layer opens, closes, and navigates
/// through. Mirrors `vfs_open` / `vfs_close` / `vfs_chdir` / `vfs_getcwd`.
pub trait Vfs: Send + Sync {
    /// `vfs_open`. `flags` is the raw open-flags word validated by the
    /// caller; `mode` is passed through unused beyond bookkeeping, since
    /// permission enforcement is out of scope.
    fn open(&self, path: &str, flags: u32, mode: u32) -> Result<Arc<dyn Vnode>>;

    /// `vfs_close`. Decrements the vnode's reference count, reclaiming the
    /// underlying object on the last release.
    fn close(&self, vnode: &Arc<dyn Vnode>);

    /// `vfs_chdir`. Resolves `path` relative to `from` and returns the
    /// vnode of the new working directory; does not mutate caller state.
    fn chdir(&self, from: &Arc<dyn Vnode>, path: &str) -> Result<Arc<dyn Vnode>>;

    /// `vfs_getcwd`. Renders the absolute path naming `cwd`.
    fn getcwd(&self, cwd: &Arc<dyn Vnode>) -> Result<String>;
}

/// An opaque per-process address-space handle. The syscall layer never
/// looks inside one; it only asks the [`AddressSpaceManager`] to create,
/// copy, or populate them.
pub trait AddressSpace: Send + Sync {}

/// `as_create` / `as_copy` / `as_define_stack` / `load_elf`. `as_activate`
/// and `as_deactivate` name a real MMU context switch that has no
/// counterpart in a hosted process model, so they are not part of this
/// contract; see DESIGN.md.
pub trait AddressSpaceManager: Send + Sync {
    fn create(&self) -> Result<Box<dyn AddressSpace>>;

    /// `as_copy`. A deep copy of the user memory `src` describes.
    fn copy(&self, src: &dyn AddressSpace) -> Result<Box<dyn AddressSpace>>;

    /// `as_define_stack`. Returns the initial user stack pointer (the
    /// high end of the stack region; callers lay argc/argv out downward
    /// from it).
    fn define_stack(&self, space: &mut dyn AddressSpace) -> Result<u64>;

    /// `load_elf`. Loads the program image named by `vnode` into `space`,
    /// returning its entry point.
    fn load_elf(&self, space: &mut dyn AddressSpace, vnode: &Arc<dyn Vnode>) -> Result<u64>;
}

/// `thread_fork`. Spawns a kernel thread that will carry a freshly forked
/// or exec'd process into user mode. The closure passed to `spawn` stands
/// in for the `(entry, data)` pair of the real contract; the scheduler
/// guarantees it runs exactly once, on some thread, after `spawn` returns
/// successfully.
pub trait ThreadScheduler: Send + Sync {
    fn spawn(&self, name: &str, entry: Box<dyn FnOnce() + Send>) -> Result<()>;
}

/// The user-to-kernel copy primitive the dispatcher uses to read syscall
/// arguments that don't fit in registers and to land results back in user
/// buffers. Stands in for the trap-frame's implicit address space plus
/// `copyin`/`copyout`/`copyinstr`.
pub trait UserMemory: Send + Sync {
    /// Copies `len` bytes starting at `vaddr` into the kernel.
    fn copy_in(&self, vaddr: u64, len: usize) -> Result<Vec<u8>>;

    /// Copies `data` out to `vaddr`.
    fn copy_out(&self, vaddr: u64, data: &[u8]) -> Result<()>;

    /// Copies a NUL-terminated string starting at `vaddr`, bounded by
    /// `max_len` (path-max style bound). `EFAULT` on a bad pointer,
    /// `ENAMETOOLONG` if no NUL is found within the bound.
    fn copy_in_cstring(&self, vaddr: u64, max_len: usize) -> Result<String>;

    /// Copies a NUL-terminated vector of NUL-terminated strings (`argv`
    /// shape): a run of pointer-sized words terminated by a null pointer,
    /// each pointing at a C string.
    fn copy_in_cstring_vec(&self, vaddr: u64, max_count: usize) -> Result<Vec<String>>;

    /// Produces the child's view of user memory for `fork`. Stands in for
    /// what a real `as_copy` would imply for the flat `copyin`/`copyout`
    /// primitive: a deep, independent copy so that parent and child pages
    /// diverge from the moment of fork, exactly as address-space copying
    /// does for every other part of the process image.
    fn fork_copy(&self) -> Arc<dyn UserMemory>;
}
