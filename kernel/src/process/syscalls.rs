// SPDX-License-Identifier: MPL-2.0

//! Component F: the process syscalls — `getpid`, `fork`, `_exit`,
//! `waitpid`, `execv`.

use crate::collab::{AddressSpaceManager, ThreadScheduler, UserMemory, Vfs};
use crate::fs::syscalls::PATH_MAX;
use crate::prelude::*;
use crate::process::{Pid, Process, ProcessTable};
use crate::syscall::TrapFrame;

/// `sys_getpid`.
pub fn getpid(process: &Process) -> Pid {
    process.pid()
}

/// Longest argv vector `execv` will copy in before giving up with `E2BIG`.
const MAX_ARGV: usize = 64;

/// `sys_fork`. Follows an ordered sequence of allocations; each step's
/// allocation is unwound if a later one fails.
pub fn fork(
    parent: &Arc<Process>,
    process_table: &ProcessTable,
    as_mgr: &dyn AddressSpaceManager,
    scheduler: &dyn ThreadScheduler,
    trapframe: &TrapFrame,
) -> Result<Pid> {
    let child_as = parent.with_address_space(|space| as_mgr.copy(space))?;
    let child_file_table = parent.file_table().copy();
    let parent_cwd = parent.cwd();
    let child_user_memory = parent.user_memory().fork_copy();
    let parent_pid = parent.pid();
    let parent_name = parent.name().to_string();

    let child = process_table.allocate(move |pid| {
        Process::new(
            pid,
            parent_pid,
            parent_name,
            child_as,
            child_file_table,
            parent_cwd,
            child_user_memory,
        )
    })?;
    // Only bump the vnode refcount once the child is actually live — an
    // `ENPROC` from `allocate` must leave the parent's cwd refcount
    // untouched.
    child.cwd().incref();
    let child_pid = child.pid();

    // Clone the trap frame on the kernel heap; in the clone, the child
    // observes retval=0, err_flag=0, and a PC advanced past the syscall
    // (matching the clone's retval and advancing past the syscall).
    let mut child_tf = trapframe.clone();
    child_tf.v0 = 0;
    child_tf.v1 = 0;
    child_tf.a3 = 0;
    child_tf.epc = child_tf.epc.wrapping_add(4);

    // Ownership of the cloned trap frame transfers to the new thread the
    // instant `spawn` succeeds; on failure, this closure is simply never
    // run and `child_tf` drops with it.
    let handoff: Box<dyn FnOnce() + Send> = Box::new(move || {
        let _owned_by_new_thread = child_tf;
    });

    if let Err(err) = scheduler.spawn(&format!("pid-{child_pid}"), handoff) {
        process_table.release(child_pid);
        return Err(err);
    }

    Ok(child_pid)
}

/// `sys_exit`. Latches the exit state and wakes waiters; the process
/// descriptor remains a zombie until a `waitpid` reaps it.
pub fn exit(process: &Process, status: i32) {
    process.set_exited(status);
}

/// `sys_waitpid`. `options` must be 0 — no `WNOHANG`/`WUNTRACED` support.
pub fn waitpid(
    parent: &Process,
    process_table: &ProcessTable,
    user_mem: &dyn UserMemory,
    pid: Pid,
    status_ptr: u64,
    options: u32,
) -> Result<Pid> {
    if options != 0 {
        return_errno_with_message!(Errno::EINVAL, "waitpid options not supported");
    }
    process_table.validity_check(pid, parent.pid())?;
    let child = process_table.lookup(pid)?;

    let status = child.wait_for_exit();
    user_mem.copy_out(status_ptr, &status.to_le_bytes())?;
    process_table.release(pid);
    Ok(pid)
}

/// The address and argument-count a successful `execv` hands the
/// dispatcher to resume execution at, in place of the normal
/// `(retval, err_flag)` epilogue — `execv` does not return through the
/// usual path on success.
pub struct ExecImage {
    pub entry_point: u64,
    pub stack_pointer: u64,
    pub argc: usize,
}

/// `sys_execv`. On any failure before the address-space swap commits, the
/// process's previous address space is left untouched — `exec` releases
/// all refs belonging to the outgoing address space only once the new one
/// has loaded successfully.
pub fn execv(
    process: &Process,
    vfs: &dyn Vfs,
    as_mgr: &dyn AddressSpaceManager,
    user_mem: &dyn UserMemory,
    path_ptr: u64,
    argv_ptr: u64,
) -> Result<ExecImage> {
    let path = user_mem.copy_in_cstring(path_ptr, PATH_MAX)?;
    let argv = user_mem.copy_in_cstring_vec(argv_ptr, MAX_ARGV)?;

    let vnode = vfs.open(&path, crate::fs::O_RDONLY, 0)?;

    let mut new_as = match as_mgr.create() {
        Ok(space) => space,
        Err(err) => {
            vfs.close(&vnode);
            return Err(err);
        }
    };

    let entry_point = match as_mgr.load_elf(new_as.as_mut(), &vnode) {
        Ok(entry) => entry,
        Err(err) => {
            vfs.close(&vnode);
            return Err(err);
        }
    };

    let stack_top = match as_mgr.define_stack(new_as.as_mut()) {
        Ok(sp) => sp,
        Err(err) => {
            vfs.close(&vnode);
            return Err(err);
        }
    };

    // Commit: swap in the new address space. The outgoing one (and
    // everything it referenced) is dropped here, releasing its refs.
    let _outgoing = process.replace_address_space(new_as);
    vfs.close(&vnode);

    let argc = argv.len();
    let stack_pointer = layout_argv(user_mem, stack_top, &argv)?;

    Ok(ExecImage {
        entry_point,
        stack_pointer,
        argc,
    })
}

/// Lays `argv` out on the user stack below `stack_top`: each string packed
/// downward, then the pointer vector (NULL-terminated) below that, word
/// aligned — the conventional argc/argv stack shape `enter_new_process`
/// expects.
fn layout_argv(user_mem: &dyn UserMemory, stack_top: u64, argv: &[String]) -> Result<u64> {
    let mut cursor = stack_top;
    let mut ptrs = Vec::with_capacity(argv.len());

    for arg in argv {
        let bytes = arg.as_bytes();
        cursor -= (bytes.len() + 1) as u64;
        cursor &= !0x3;
        user_mem.copy_out(cursor, bytes)?;
        user_mem.copy_out(cursor + bytes.len() as u64, &[0u8])?;
        ptrs.push(cursor);
    }

    let vector_bytes = ((ptrs.len() + 1) * 8) as u64;
    cursor &= !0x7;
    cursor -= vector_bytes;

    for (i, ptr) in ptrs.iter().enumerate() {
        user_mem.copy_out(cursor + (i as u64) * 8, &ptr.to_le_bytes())?;
    }
    user_mem.copy_out(cursor + vector_bytes - 8, &0u64.to_le_bytes())?;

    Ok(cursor)
}
