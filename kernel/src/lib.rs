// SPDX-License-Identifier: MPL-2.0

//! A hosted, testable reimplementation of a teaching kernel's
//! process/file-oriented syscall core: the per-process file table and
//! open-file layer, the process table and fork/exit/waitpid lifecycle, and
//! the syscall dispatcher tying them together. The VFS, address-space
//! manager, thread scheduler, and user-memory copy primitive this core
//! relies on are modeled as traits in [`collab`], with hosted in-memory
//! implementations in [`collab::mem`] standing in for a real kernel's MMU
//! and filesystem underneath.

pub mod collab;
pub mod error;
pub mod fs;
pub mod prelude;
pub mod process;
pub mod syscall;
