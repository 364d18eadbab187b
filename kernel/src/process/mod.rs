// SPDX-License-Identifier: MPL-2.0

//! The process descriptor, the process table, and the process syscalls
//! that drive fork/exit/waitpid/exec.

pub mod process_table;
pub mod syscalls;

pub use process_table::ProcessTable;

use crate::collab::{AddressSpace, UserMemory, Vnode};
use crate::fs::FileTable;
use crate::prelude::*;

pub type Pid = u32;

/// `0` is reserved; PIDs live in `[1, MAX_PROC_NUM)`.
pub const MAX_PROC_NUM: Pid = 200;

static_assertions::const_assert!(MAX_PROC_NUM > 1);

/// `new -> live -> zombie -> reaped`. `reaped` has no representation here:
/// a reaped process is simply absent from the [`ProcessTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Live,
    Zombie,
}

struct ExitState {
    state: ProcessState,
    exit_code: i32,
}

/// One process descriptor. `pid`, `parent_pid`, and `name`
/// are immutable after creation; `address_space`, `file_table`, and `cwd`
/// change only at exec (address space, cwd) or never (file table, which is
/// replaced wholesale, never mutated, at fork). `exit` packages the
/// latching exit condition: `_exit` sets the flag and broadcasts,
/// `waitpid` loops on it under the same lock.
pub struct Process {
    pid: Pid,
    parent_pid: Pid,
    name: String,
    address_space: Mutex<Box<dyn AddressSpace>>,
    file_table: Arc<FileTable>,
    cwd: Mutex<Arc<dyn Vnode>>,
    user_memory: Arc<dyn UserMemory>,
    exit: Mutex<ExitState>,
    exit_cv: Condvar,
}

impl std::fmt::Debug for Process {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Process")
            .field("pid", &self.pid)
            .field("parent_pid", &self.parent_pid)
            .field("name", &self.name)
            .finish()
    }
}

impl Process {
    pub fn new(
        pid: Pid,
        parent_pid: Pid,
        name: String,
        address_space: Box<dyn AddressSpace>,
        file_table: Arc<FileTable>,
        cwd: Arc<dyn Vnode>,
        user_memory: Arc<dyn UserMemory>,
    ) -> Arc<Self> {
        Arc::new(Self {
            pid,
            parent_pid,
            name,
            address_space: Mutex::new(address_space),
            file_table,
            cwd: Mutex::new(cwd),
            user_memory,
            exit: Mutex::new(ExitState {
                state: ProcessState::Live,
                exit_code: 0,
            }),
            exit_cv: Condvar::new(),
        })
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn parent_pid(&self) -> Pid {
        self.parent_pid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn file_table(&self) -> &Arc<FileTable> {
        &self.file_table
    }

    pub fn user_memory(&self) -> &Arc<dyn UserMemory> {
        &self.user_memory
    }

    pub fn cwd(&self) -> Arc<dyn Vnode> {
        self.cwd.lock().unwrap().clone()
    }

    pub fn set_cwd(&self, vnode: Arc<dyn Vnode>) {
        *self.cwd.lock().unwrap() = vnode;
    }

    pub fn with_address_space<R>(&self, f: impl FnOnce(&mut dyn AddressSpace) -> R) -> R {
        f(self.address_space.lock().unwrap().as_mut())
    }

    pub fn replace_address_space(&self, new: Box<dyn AddressSpace>) -> Box<dyn AddressSpace> {
        std::mem::replace(&mut *self.address_space.lock().unwrap(), new)
    }

    pub fn is_zombie(&self) -> bool {
        self.exit.lock().unwrap().state == ProcessState::Zombie
    }

    /// `sys_exit`'s core: latches the exit state and wakes every waiter.
    /// Does not touch the process table; reaping is the waiter's job
    /// (`thread_exit` never returns in the source this is modeled on, so
    /// the `proc_destroy` call following it there is dead code).
    pub fn set_exited(&self, status: i32) {
        let mut exit = self.exit.lock().unwrap();
        exit.state = ProcessState::Zombie;
        exit.exit_code = status;
        self.exit_cv.notify_all();
    }

    /// Blocks until this process has exited, returning its exit code.
    /// Safe for more than one waiter to call concurrently; every one
    /// wakes and observes the same latched code.
    pub fn wait_for_exit(&self) -> i32 {
        let mut exit = self.exit.lock().unwrap();
        while exit.state != ProcessState::Zombie {
            exit = self.exit_cv.wait(exit).unwrap();
        }
        exit.exit_code
    }
}
