// SPDX-License-Identifier: MPL-2.0

//! Component G: the syscall dispatcher. Decodes a [`TrapFrame`], routes to
//! [`crate::fs::syscalls`] or [`crate::process::syscalls`], and encodes the
//! outcome back into the frame following the register convention in
//! [`abi`].

pub mod abi;

use std::sync::Arc;

use crate::collab::{AddressSpaceManager, ThreadScheduler, UserMemory, Vfs};
use crate::error::Errno;
use crate::fs::{syscalls as fs_syscalls, Whence};
use crate::process::{syscalls as process_syscalls, Process, ProcessTable};

pub use abi::Reg64;

/// The subset of a MIPS trap frame this dispatcher inspects: the six
/// general-purpose argument/return registers, the stack pointer, and the
/// exception PC. `v0` carries the call number on entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrapFrame {
    pub v0: u32,
    pub v1: u32,
    pub a0: u32,
    pub a1: u32,
    pub a2: u32,
    pub a3: u32,
    pub sp: u32,
    pub epc: u32,
}

/// Call numbers for the mandated set. `Reboot` and `Time` are recognized —
/// a dispatch on them does not fall into the "unknown call number" branch —
/// but neither has a handler in this core; both always yield `ENOSYS`,
/// distinguished in logs from a genuinely unrecognized number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum SyscallNo {
    Reboot = 0,
    Time = 1,
    Open = 2,
    Close = 3,
    Read = 4,
    Write = 5,
    Lseek = 6,
    Dup2 = 7,
    Chdir = 8,
    Getcwd = 9,
    Getpid = 10,
    Fork = 11,
    Exit = 12,
    Waitpid = 13,
    Execv = 14,
}

impl SyscallNo {
    fn from_raw(raw: u32) -> Option<Self> {
        use SyscallNo::*;
        Some(match raw {
            0 => Reboot,
            1 => Time,
            2 => Open,
            3 => Close,
            4 => Read,
            5 => Write,
            6 => Lseek,
            7 => Dup2,
            8 => Chdir,
            9 => Getcwd,
            10 => Getpid,
            11 => Fork,
            12 => Exit,
            13 => Waitpid,
            14 => Execv,
            _ => return None,
        })
    }
}

/// Everything the dispatcher needs beyond the process making the call: the
/// collaborators it threads through to the D/F handlers.
pub struct Collaborators<'a> {
    pub vfs: &'a dyn Vfs,
    pub as_mgr: &'a dyn AddressSpaceManager,
    pub scheduler: &'a dyn ThreadScheduler,
    pub process_table: &'a ProcessTable,
}

/// Decodes `tf.v0` as a call number, dispatches, and writes the outcome
/// back into `tf` per the `(v0, v1, a3)` convention — except on a
/// successful `execv`, which hands back an [`process_syscalls::ExecImage`]
/// instead of advancing through the normal epilogue, matching that it
/// "does not return" to the calling frame on success.
pub fn dispatch(
    tf: &mut TrapFrame,
    process: &Arc<Process>,
    collab: &Collaborators<'_>,
) -> Option<process_syscalls::ExecImage> {
    let user_mem = process.user_memory().clone();
    let callno = tf.v0;

    let outcome = match SyscallNo::from_raw(callno) {
        None => {
            log::warn!("unknown syscall number {callno}");
            Err(Errno::ENOSYS.into())
        }
        Some(SyscallNo::Reboot) | Some(SyscallNo::Time) => {
            log::debug!("syscall {callno} recognized but not implemented in this core");
            Err(Errno::ENOSYS.into())
        }
        Some(SyscallNo::Open) => fs_syscalls::open(process, collab.vfs, user_mem.as_ref(), tf.a0 as u64, tf.a1)
            .map(|fd| Outcome::Single(fd as i64)),
        Some(SyscallNo::Close) => {
            fs_syscalls::close(process, collab.vfs, tf.a0 as i32).map(|()| Outcome::Single(0))
        }
        Some(SyscallNo::Read) => fs_syscalls::read(process, user_mem.as_ref(), tf.a0 as i32, tf.a1 as u64, tf.a2 as usize)
            .map(|n| Outcome::Single(n as i64)),
        Some(SyscallNo::Write) => fs_syscalls::write(process, user_mem.as_ref(), tf.a0 as i32, tf.a1 as u64, tf.a2 as usize)
            .map(|n| Outcome::Single(n as i64)),
        Some(SyscallNo::Lseek) => {
            let pos = Reg64::from_pair(tf.a2, tf.a3);
            let whence_raw = read_stack_word(user_mem.as_ref(), tf.sp);
            whence_raw
                .and_then(|raw| Whence::from_raw(raw as i32))
                .and_then(|whence| fs_syscalls::lseek(process, tf.a0 as i32, pos, whence))
                .map(Outcome::Wide)
        }
        Some(SyscallNo::Dup2) => fs_syscalls::dup2(process, collab.vfs, tf.a0 as i32, tf.a1 as i32)
            .map(|fd| Outcome::Single(fd as i64)),
        Some(SyscallNo::Chdir) => {
            fs_syscalls::chdir(process, collab.vfs, user_mem.as_ref(), tf.a0 as u64).map(|()| Outcome::Single(0))
        }
        Some(SyscallNo::Getcwd) => {
            fs_syscalls::getcwd(process, collab.vfs, user_mem.as_ref(), tf.a0 as u64, tf.a1 as usize)
                .map(|n| Outcome::Single(n as i64))
        }
        Some(SyscallNo::Getpid) => Ok(Outcome::Single(process_syscalls::getpid(process) as i64)),
        Some(SyscallNo::Fork) => process_syscalls::fork(process, collab.process_table, collab.as_mgr, collab.scheduler, tf)
            .map(|pid| Outcome::Single(pid as i64)),
        Some(SyscallNo::Exit) => {
            process_syscalls::exit(process, tf.a0 as i32);
            Ok(Outcome::Single(0))
        }
        Some(SyscallNo::Waitpid) => process_syscalls::waitpid(
            process,
            collab.process_table,
            user_mem.as_ref(),
            tf.a0,
            tf.a1 as u64,
            tf.a2,
        )
        .map(|pid| Outcome::Single(pid as i64)),
        Some(SyscallNo::Execv) => {
            match process_syscalls::execv(
                process,
                collab.vfs,
                collab.as_mgr,
                user_mem.as_ref(),
                tf.a0 as u64,
                tf.a1 as u64,
            ) {
                Ok(image) => return Some(image),
                Err(err) => Err(err),
            }
        }
    };

    write_back(tf, outcome);
    None
}

enum Outcome {
    Single(i64),
    Wide(i64),
}

fn write_back(tf: &mut TrapFrame, outcome: crate::prelude::Result<Outcome>) {
    match outcome {
        Ok(Outcome::Single(value)) => {
            tf.v0 = value as u32;
            tf.v1 = 0;
            tf.a3 = 0;
        }
        Ok(Outcome::Wide(value)) => {
            let (high, low) = Reg64::into_pair(value);
            tf.v0 = high;
            tf.v1 = low;
            tf.a3 = 0;
        }
        Err(err) => {
            tf.v0 = err.error() as i32 as u32;
            tf.v1 = 0;
            tf.a3 = 1;
        }
    }
    tf.epc = tf.epc.wrapping_add(4);
}

/// Reads the one stack-spilled argument this dispatcher needs (`lseek`'s
/// `whence`), at `sp + 16` as the calling convention places excess
/// arguments past the register-save area.
fn read_stack_word(user_mem: &dyn UserMemory, sp: u32) -> crate::prelude::Result<u32> {
    let bytes = user_mem.copy_in(sp as u64 + 16, 4)?;
    Ok(u32::from_le_bytes(bytes.try_into().unwrap()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::mem::{FlatUserMemory, InMemoryVfs, InlineScheduler, NullAddressSpaceManager};
    use crate::fs::{FileTable, OpenFlags};

    fn new_process(vfs: &Arc<InMemoryVfs>) -> Arc<Process> {
        let file_table = FileTable::new();
        file_table.bootstrap_stdio(vfs.as_ref()).unwrap();
        Process::new(
            1,
            0,
            "init".to_string(),
            Box::new(crate::collab::mem::NullAddressSpace),
            file_table,
            vfs.root(),
            Arc::new(FlatUserMemory::new(FlatUserMemory::TEST_SIZE)),
        )
    }

    fn frame(v0: u32, a0: u32, a1: u32, a2: u32, a3: u32) -> TrapFrame {
        TrapFrame {
            v0,
            v1: 0,
            a0,
            a1,
            a2,
            a3,
            sp: 0,
            epc: 0x4000_0000,
        }
    }

    #[test]
    fn unknown_call_number_is_enosys() {
        let vfs = InMemoryVfs::new();
        let process = new_process(&vfs);
        let table = ProcessTable::new();
        let asm = NullAddressSpaceManager;
        let scheduler = InlineScheduler;
        let collab = Collaborators {
            vfs: vfs.as_ref(),
            as_mgr: &asm,
            scheduler: &scheduler,
            process_table: table.as_ref(),
        };
        let mut tf = frame(999, 0, 0, 0, 0);
        let result = dispatch(&mut tf, &process, &collab);
        assert!(result.is_none());
        assert_eq!(tf.v0, Errno::ENOSYS as i32 as u32);
        assert_eq!(tf.a3, 1);
        assert_eq!(tf.epc, 0x4000_0004);
    }

    #[test]
    fn getpid_round_trips_through_dispatch() {
        let vfs = InMemoryVfs::new();
        let process = new_process(&vfs);
        let table = ProcessTable::new();
        let asm = NullAddressSpaceManager;
        let scheduler = InlineScheduler;
        let collab = Collaborators {
            vfs: vfs.as_ref(),
            as_mgr: &asm,
            scheduler: &scheduler,
            process_table: table.as_ref(),
        };
        let mut tf = frame(SyscallNo::Getpid as u32, 0, 0, 0, 0);
        dispatch(&mut tf, &process, &collab);
        assert_eq!(tf.v0, 1);
        assert_eq!(tf.a3, 0);
    }

    #[test]
    fn lseek_reads_whence_from_stack_and_returns_wide_value() {
        let vfs = InMemoryVfs::new();
        let process = new_process(&vfs);
        let vnode = vfs.open("f", OpenFlags::O_RDWR.bits() | crate::fs::O_CREAT, 0).unwrap();
        let of = crate::fs::OpenFile::new(vnode, OpenFlags::O_RDWR);
        of.write(b"0123456789").unwrap();
        let fd = process.file_table().insert_lowest(of).unwrap();

        let user_mem = process.user_memory().clone();
        // whence = SEEK_SET, spilled at sp+16
        user_mem.copy_out(0x100 + 16, &0u32.to_le_bytes()).unwrap();

        let table = ProcessTable::new();
        let asm = NullAddressSpaceManager;
        let scheduler = InlineScheduler;
        let collab = Collaborators {
            vfs: vfs.as_ref(),
            as_mgr: &asm,
            scheduler: &scheduler,
            process_table: table.as_ref(),
        };

        let (high, low) = Reg64::into_pair(3);
        let mut tf = frame(SyscallNo::Lseek as u32, fd as u32, 0, high, low);
        tf.sp = 0x100;
        dispatch(&mut tf, &process, &collab);
        assert_eq!(tf.a3, 0);
        assert_eq!(Reg64::from_pair(tf.v0, tf.v1), 3);
    }
}
