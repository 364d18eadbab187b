// SPDX-License-Identifier: MPL-2.0

//! Component E: the process table — a bounded array of live processes
//! keyed by PID, with PID allocation/recycling under a single lock.

use crate::prelude::*;
use crate::process::{Pid, Process, MAX_PROC_NUM};

pub struct ProcessTable {
    inner: Mutex<Inner>,
}

struct Inner {
    slots: Vec<Option<Arc<Process>>>,
    next_pid: Pid,
}

impl ProcessTable {
    pub fn new() -> Arc<Self> {
        let mut slots = Vec::with_capacity(MAX_PROC_NUM as usize);
        slots.resize_with(MAX_PROC_NUM as usize, || None);
        Arc::new(Self {
            inner: Mutex::new(Inner { slots, next_pid: 1 }),
        })
    }

    /// `assign_pid` + table install. Scans forward from `next_pid`,
    /// wrapping at `MAX_PROC_NUM`, and installs `build(pid)`'s result at
    /// the first empty slot found. `pid == 0` is never assigned — it is
    /// reserved to name "no parent" for the initial process.
    pub fn allocate(&self, build: impl FnOnce(Pid) -> Arc<Process>) -> Result<Arc<Process>> {
        let mut inner = self.inner.lock().unwrap();
        let start = inner.next_pid;
        let mut candidate = start;
        loop {
            let idx = candidate as usize;
            if inner.slots[idx].is_none() {
                let process = build(candidate);
                inner.slots[idx] = Some(process.clone());
                inner.next_pid = if candidate + 1 >= MAX_PROC_NUM {
                    1
                } else {
                    candidate + 1
                };
                return Ok(process);
            }
            candidate = if candidate + 1 >= MAX_PROC_NUM { 1 } else { candidate + 1 };
            if candidate == start {
                return_errno_with_message!(Errno::ENPROC, "process table full");
            }
        }
    }

    /// `free_pid`. Removes a reaped zombie's slot, allowing its PID to be
    /// recycled. Callers must only call this after `waitpid` has copied
    /// out the exit status.
    pub fn release(&self, pid: Pid) {
        let idx = pid as usize;
        self.inner.lock().unwrap().slots[idx] = None;
    }

    pub fn lookup(&self, pid: Pid) -> Result<Arc<Process>> {
        let idx = pid as usize;
        if idx == 0 || idx >= MAX_PROC_NUM as usize {
            return_errno_with_message!(Errno::ESRCH, "pid out of range");
        }
        self.inner.lock().unwrap().slots[idx]
            .clone()
            .ok_or(Error::with_message(Errno::ESRCH, "no such process"))
    }

    /// `validity_check_pid`. A waiter must verify that `pid` names a live
    /// table entry and that `waiter` is its parent before blocking on it.
    pub fn validity_check(&self, pid: Pid, waiter: Pid) -> Result<()> {
        if pid == 0 || pid as usize >= MAX_PROC_NUM as usize {
            return_errno_with_message!(Errno::EINVAL, "pid out of range");
        }
        let target = self
            .inner
            .lock()
            .unwrap()
            .slots[pid as usize]
            .clone()
            .ok_or(Error::with_message(Errno::ESRCH, "no such process"))?;
        if target.parent_pid() != waiter {
            return_errno_with_message!(Errno::ECHILD, "not a child of the caller");
        }
        Ok(())
    }
}
