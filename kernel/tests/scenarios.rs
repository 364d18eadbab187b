// SPDX-License-Identifier: MPL-2.0

//! End-to-end scenarios driving the syscall dispatcher against the hosted
//! collaborators, mirroring the literal walkthroughs this core is meant to
//! satisfy: a write/read round trip, three-way lseek, dup2 aliasing,
//! chdir/getcwd, fork/waitpid, and exec replacing the process image.

use std::sync::Arc;

use kcore::collab::mem::{FlatUserMemory, InMemoryVfs, InlineScheduler, NullAddressSpaceManager};
use kcore::fs::{FileTable, OpenFlags};
use kcore::process::{Process, ProcessTable};
use kcore::syscall::{dispatch, Collaborators, Reg64, SyscallNo, TrapFrame};

const WRITEBUF: &[u8] = b"Twiddle dee dee, Twiddle dum dum.......\n";

fn boot_process(vfs: &Arc<InMemoryVfs>) -> Arc<Process> {
    let file_table = FileTable::new();
    file_table.bootstrap_stdio(vfs.as_ref()).unwrap();
    Process::new(
        1,
        0,
        "init".to_string(),
        Box::new(kcore::collab::mem::NullAddressSpace),
        file_table,
        vfs.root(),
        Arc::new(FlatUserMemory::new(FlatUserMemory::TEST_SIZE)),
    )
}

fn frame(sysno: SyscallNo, a0: u32, a1: u32, a2: u32, a3: u32) -> TrapFrame {
    TrapFrame {
        v0: sysno as u32,
        v1: 0,
        a0,
        a1,
        a2,
        a3,
        sp: 0,
        epc: 0x4000_0000,
    }
}

struct Harness {
    vfs: Arc<InMemoryVfs>,
    as_mgr: NullAddressSpaceManager,
    scheduler: InlineScheduler,
    process_table: Arc<ProcessTable>,
}

impl Harness {
    fn new() -> Self {
        Self {
            vfs: InMemoryVfs::new(),
            as_mgr: NullAddressSpaceManager,
            scheduler: InlineScheduler,
            process_table: ProcessTable::new(),
        }
    }

    fn collab(&self) -> Collaborators<'_> {
        Collaborators {
            vfs: self.vfs.as_ref(),
            as_mgr: &self.as_mgr,
            scheduler: &self.scheduler,
            process_table: self.process_table.as_ref(),
        }
    }

    fn run(&self, process: &Arc<Process>, mut tf: TrapFrame) -> TrapFrame {
        let collab = self.collab();
        let image = dispatch(&mut tf, process, &collab);
        assert!(image.is_none(), "unexpected execv image in a non-exec call");
        tf
    }
}

fn write_cstring(process: &Process, vaddr: u64, s: &[u8]) -> u64 {
    process.user_memory().copy_out(vaddr, s).unwrap();
    vaddr
}

#[test]
fn s1_write_read_round_trip() {
    let h = Harness::new();
    let process = boot_process(&h.vfs);

    let path_ptr = write_cstring(&process, 0x100, b"testfile\0");
    let tf = frame(
        SyscallNo::Open,
        path_ptr as u32,
        (OpenFlags::O_WRONLY | OpenFlags::O_CREAT | OpenFlags::O_TRUNC).bits(),
        0,
        0,
    );
    let tf = h.run(&process, tf);
    assert_eq!(tf.a3, 0);
    let fd = tf.v0;

    process.user_memory().copy_out(0x200, WRITEBUF).unwrap();
    let tf = frame(SyscallNo::Write, fd, 0x200, WRITEBUF.len() as u32, 0);
    let tf = h.run(&process, tf);
    assert_eq!(tf.a3, 0);
    assert_eq!(tf.v0 as usize, WRITEBUF.len());

    let tf = frame(SyscallNo::Close, fd, 0, 0, 0);
    let tf = h.run(&process, tf);
    assert_eq!(tf.a3, 0);

    let path_ptr = write_cstring(&process, 0x100, b"testfile\0");
    let tf = frame(SyscallNo::Open, path_ptr as u32, OpenFlags::O_RDONLY.bits(), 0, 0);
    let tf = h.run(&process, tf);
    assert_eq!(tf.a3, 0);
    let fd = tf.v0;

    let tf = frame(SyscallNo::Read, fd, 0x300, WRITEBUF.len() as u32, 0);
    let tf = h.run(&process, tf);
    assert_eq!(tf.a3, 0);
    assert_eq!(tf.v0 as usize, WRITEBUF.len());
    assert_eq!(process.user_memory().copy_in(0x300, WRITEBUF.len()).unwrap(), WRITEBUF);
}

#[test]
fn s2_lseek_three_way() {
    let h = Harness::new();
    let process = boot_process(&h.vfs);

    let line_a = b"OS-PROJECT-SEEK_CUR\n";
    let line_b = b"OS-PROJECT-SEEK_SET\n";
    let line_c = b"OS-PROJECT-SEEK_END\n";
    assert_eq!(line_a.len(), 20);

    let path_ptr = write_cstring(&process, 0x100, b"seekfile\0");
    let tf = frame(
        SyscallNo::Open,
        path_ptr as u32,
        (OpenFlags::O_WRONLY | OpenFlags::O_CREAT | OpenFlags::O_TRUNC).bits(),
        0,
        0,
    );
    let tf = h.run(&process, tf);
    let fd = tf.v0;

    let write_chunk = |data: &[u8]| {
        process.user_memory().copy_out(0x200, data).unwrap();
        let tf = frame(SyscallNo::Write, fd, 0x200, data.len() as u32, 0);
        let tf = h.run(&process, tf);
        assert_eq!(tf.a3, 0);
    };

    write_chunk(line_a);
    for _ in 0..5 {
        write_chunk(WRITEBUF);
    }
    write_chunk(line_b);
    for _ in 0..6 {
        write_chunk(WRITEBUF);
    }
    write_chunk(line_c);

    let tf = frame(SyscallNo::Close, fd, 0, 0, 0);
    h.run(&process, tf);

    let path_ptr = write_cstring(&process, 0x100, b"seekfile\0");
    let tf = frame(SyscallNo::Open, path_ptr as u32, OpenFlags::O_RDONLY.bits(), 0, 0);
    let tf = h.run(&process, tf);
    let fd = tf.v0;

    let seek_and_read = |pos: i64, whence: u32, expected: &[u8]| {
        let (high, low) = Reg64::into_pair(pos);
        let sp = 0x500u32;
        process.user_memory().copy_out(sp as u64 + 16, &whence.to_le_bytes()).unwrap();
        let mut tf = frame(SyscallNo::Lseek, fd, 0, high, low);
        tf.sp = sp;
        let tf = h.run(&process, tf);
        assert_eq!(tf.a3, 0);

        let tf = frame(SyscallNo::Read, fd, 0x600, expected.len() as u32, 0);
        let tf = h.run(&process, tf);
        assert_eq!(tf.a3, 0);
        assert_eq!(tf.v0 as usize, expected.len());
        assert_eq!(process.user_memory().copy_in(0x600, expected.len()).unwrap(), expected);
    };

    seek_and_read(20 + 40 * 5, 0, line_b);
    seek_and_read(-(2 * 20 + 40 * 5), 1, line_a);
    seek_and_read(-20, 2, line_c);
}

#[test]
fn s3_dup2_aliasing() {
    let h = Harness::new();
    let process = boot_process(&h.vfs);

    let path_ptr = write_cstring(&process, 0x100, b"f\0");
    let tf = frame(
        SyscallNo::Open,
        path_ptr as u32,
        (OpenFlags::O_RDWR | OpenFlags::O_CREAT | OpenFlags::O_TRUNC).bits(),
        0,
        0,
    );
    let tf = h.run(&process, tf);
    let fd = tf.v0;
    assert_eq!(fd, 3);

    let tf = frame(SyscallNo::Dup2, fd, 4, 0, 0);
    let tf = h.run(&process, tf);
    assert_eq!(tf.a3, 0);
    assert_eq!(tf.v0, 4);

    process.user_memory().copy_out(0x200, WRITEBUF).unwrap();
    let tf = frame(SyscallNo::Write, fd, 0x200, WRITEBUF.len() as u32, 0);
    let tf = h.run(&process, tf);
    assert_eq!(tf.v0 as usize, WRITEBUF.len());

    let (high, low) = Reg64::into_pair(-(WRITEBUF.len() as i64));
    let sp = 0x500u32;
    process.user_memory().copy_out(sp as u64 + 16, &2u32.to_le_bytes()).unwrap();
    let mut tf = frame(SyscallNo::Lseek, fd, 0, high, low);
    tf.sp = sp;
    let tf = h.run(&process, tf);
    assert_eq!(tf.a3, 0);

    let tf = frame(SyscallNo::Read, 3, 0x300, WRITEBUF.len() as u32, 0);
    let tf = h.run(&process, tf);
    assert_eq!(tf.v0 as usize, WRITEBUF.len());
    assert_eq!(process.user_memory().copy_in(0x300, WRITEBUF.len()).unwrap(), WRITEBUF);

    let tf = frame(SyscallNo::Dup2, fd, fd, 0, 0);
    let tf = h.run(&process, tf);
    assert_eq!(tf.a3, 0);
    assert_eq!(tf.v0, fd);
}

#[test]
fn s4_chdir_getcwd() {
    let h = Harness::new();
    h.vfs.seed_file("include/err.h", &[7u8; 2000]);
    let process = boot_process(&h.vfs);

    let tf = frame(SyscallNo::Getcwd, 0x100, 64, 0, 0);
    let tf = h.run(&process, tf);
    assert_eq!(tf.a3, 0);
    let n = tf.v0 as usize;
    let cwd = String::from_utf8(process.user_memory().copy_in(0x100, n).unwrap()).unwrap();
    assert_eq!(cwd, "emu0:");

    let path_ptr = write_cstring(&process, 0x200, b"include\0");
    let tf = frame(SyscallNo::Chdir, path_ptr as u32, 0, 0, 0);
    let tf = h.run(&process, tf);
    assert_eq!(tf.a3, 0);

    let path_ptr = write_cstring(&process, 0x200, b"err.h\0");
    let tf = frame(SyscallNo::Open, path_ptr as u32, OpenFlags::O_RDONLY.bits(), 0, 0);
    let tf = h.run(&process, tf);
    assert_eq!(tf.a3, 0);
    let fd_inner = tf.v0;

    let tf = frame(SyscallNo::Read, fd_inner, 0x1000, 2000, 0);
    let tf = h.run(&process, tf);
    assert_eq!(tf.v0, 2000);
    let from_inner = process.user_memory().copy_in(0x1000, 2000).unwrap();

    let path_ptr = write_cstring(&process, 0x200, b"..\0");
    let tf = frame(SyscallNo::Chdir, path_ptr as u32, 0, 0, 0);
    h.run(&process, tf);

    let path_ptr = write_cstring(&process, 0x200, b"include/err.h\0");
    let tf = frame(SyscallNo::Open, path_ptr as u32, OpenFlags::O_RDONLY.bits(), 0, 0);
    let tf = h.run(&process, tf);
    assert_eq!(tf.a3, 0);
    let fd_outer = tf.v0;

    let tf = frame(SyscallNo::Read, fd_outer, 0x2000, 2000, 0);
    let tf = h.run(&process, tf);
    assert_eq!(tf.v0, 2000);
    let from_outer = process.user_memory().copy_in(0x2000, 2000).unwrap();

    assert_eq!(from_inner, from_outer);
}

#[test]
fn s5_fork_waitpid() {
    let h = Harness::new();
    let parent = boot_process(&h.vfs);

    let tf = frame(SyscallNo::Fork, 0, 0, 0, 0);
    let tf = h.run(&parent, tf);
    assert_eq!(tf.a3, 0);
    let child_pid = tf.v0;
    let child = h.process_table.lookup(child_pid).unwrap();

    let path_ptr = write_cstring(&child, 0x100, b"childfile\0");
    let tf = frame(
        SyscallNo::Open,
        path_ptr as u32,
        (OpenFlags::O_WRONLY | OpenFlags::O_CREAT | OpenFlags::O_TRUNC).bits(),
        0,
        0,
    );
    let tf = h.run(&child, tf);
    assert_eq!(tf.a3, 0);
    let fd = tf.v0;

    child.user_memory().copy_out(0x200, WRITEBUF).unwrap();
    let tf = frame(SyscallNo::Write, fd, 0x200, WRITEBUF.len() as u32, 0);
    h.run(&child, tf);

    let tf = frame(SyscallNo::Exit, 0, 0, 0, 0);
    h.run(&child, tf);

    let tf = frame(SyscallNo::Waitpid, child_pid, 0x300, 0, 0);
    let tf = h.run(&parent, tf);
    assert_eq!(tf.a3, 0);
    assert_eq!(tf.v0, child_pid);
    let status = i32::from_le_bytes(parent.user_memory().copy_in(0x300, 4).unwrap().try_into().unwrap());
    assert_eq!(status, 0);

    let path_ptr = write_cstring(&parent, 0x400, b"childfile\0");
    let tf = frame(SyscallNo::Open, path_ptr as u32, OpenFlags::O_RDONLY.bits(), 0, 0);
    let tf = h.run(&parent, tf);
    let fd = tf.v0;
    let tf = frame(SyscallNo::Read, fd, 0x500, WRITEBUF.len() as u32, 0);
    let tf = h.run(&parent, tf);
    assert_eq!(tf.v0 as usize, WRITEBUF.len());
    assert_eq!(parent.user_memory().copy_in(0x500, WRITEBUF.len()).unwrap(), WRITEBUF);
}

#[test]
fn s6_execv_replaces_image() {
    let h = Harness::new();
    h.vfs.seed_file("testbin/short_filetest", b"#! elf placeholder");
    let process = boot_process(&h.vfs);

    let path_ptr = write_cstring(&process, 0x100, b"testbin/short_filetest\0");
    // argv = [NULL]: an empty argument vector.
    process.user_memory().copy_out(0x200, &0u64.to_le_bytes()).unwrap();

    let mut tf = frame(SyscallNo::Execv, path_ptr as u32, 0x200, 0, 0);
    let collab = h.collab();
    let image = dispatch(&mut tf, &process, &collab).expect("successful execv returns an image");

    assert_eq!(image.argc, 0);
    assert_eq!(image.entry_point, 0x0040_0000);
    assert!(image.stack_pointer < FlatUserMemory::TEST_STACK_TOP);
}
