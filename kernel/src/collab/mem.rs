// SPDX-License-Identifier: MPL-2.0

//! Hosted test doubles for the collaborator traits in [`super`]. None of
//! these are meant to be realistic filesystems or schedulers; they exist so
//! the file and process syscalls can be driven end to end under `#[test]`
//! without a real VFS, MMU, or thread package underneath them.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{AddressSpace, AddressSpaceManager, ThreadScheduler, UserMemory, Vfs, Vnode};
use crate::prelude::*;

enum NodeKind {
    File(Mutex<Vec<u8>>),
    Console(Mutex<Vec<u8>>),
    Dir(Mutex<BTreeMap<String, Arc<InMemoryVnode>>>),
}

/// A single node in [`InMemoryVfs`]'s tree: either a byte-addressable file,
/// the "con:" console device, or a directory of further nodes.
pub struct InMemoryVnode {
    kind: NodeKind,
    refcount: AtomicUsize,
}

impl InMemoryVnode {
    fn file(initial: Vec<u8>) -> Arc<Self> {
        Arc::new(Self {
            kind: NodeKind::File(Mutex::new(initial)),
            refcount: AtomicUsize::new(1),
        })
    }

    fn console() -> Arc<Self> {
        Arc::new(Self {
            kind: NodeKind::Console(Mutex::new(Vec::new())),
            refcount: AtomicUsize::new(1),
        })
    }

    fn dir() -> Arc<Self> {
        Arc::new(Self {
            kind: NodeKind::Dir(Mutex::new(BTreeMap::new())),
            refcount: AtomicUsize::new(1),
        })
    }

    /// Current reference count, exposed for the refcount-invariant tests
    /// (§8 invariant 7: `open`/`close` on the same path N times leaves the
    /// vnode refcount unchanged).
    pub fn refcount(&self) -> usize {
        self.refcount.load(Ordering::SeqCst)
    }

    fn is_dir(&self) -> bool {
        matches!(self.kind, NodeKind::Dir(_))
    }
}

impl Vnode for InMemoryVnode {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn read(&self, offset: i64, buf: &mut [u8]) -> Result<usize> {
        let data = match &self.kind {
            NodeKind::File(data) | NodeKind::Console(data) => data.lock().unwrap(),
            NodeKind::Dir(_) => return_errno_with_message!(Errno::EISDIR, "is a directory"),
        };
        let offset = offset as usize;
        if offset >= data.len() {
            return Ok(0);
        }
        let n = buf.len().min(data.len() - offset);
        buf[..n].copy_from_slice(&data[offset..offset + n]);
        Ok(n)
    }

    fn write(&self, offset: i64, buf: &[u8]) -> Result<usize> {
        let mut data = match &self.kind {
            NodeKind::File(data) | NodeKind::Console(data) => data.lock().unwrap(),
            NodeKind::Dir(_) => return_errno_with_message!(Errno::EISDIR, "is a directory"),
        };
        let offset = offset as usize;
        if data.len() < offset {
            data.resize(offset, 0);
        }
        if offset + buf.len() > data.len() {
            data.resize(offset + buf.len(), 0);
        }
        data[offset..offset + buf.len()].copy_from_slice(buf);
        Ok(buf.len())
    }

    fn size(&self) -> Result<u64> {
        match &self.kind {
            NodeKind::File(data) => Ok(data.lock().unwrap().len() as u64),
            NodeKind::Console(_) | NodeKind::Dir(_) => Ok(0),
        }
    }

    fn is_seekable(&self) -> bool {
        matches!(self.kind, NodeKind::File(_))
    }

    fn incref(&self) {
        self.refcount.fetch_add(1, Ordering::SeqCst);
    }
}

/// A small in-memory filesystem rooted at the volume label `"emu0:"`, with
/// a `"con:"` device path resolved independently of the directory tree.
/// Paths are `/`-separated and may use `..` to go up one level.
pub struct InMemoryVfs {
    root: Arc<InMemoryVnode>,
    console: Arc<InMemoryVnode>,
}

impl InMemoryVfs {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            root: InMemoryVnode::dir(),
            console: InMemoryVnode::console(),
        })
    }

    /// The root directory vnode, for seeding a process's initial cwd.
    pub fn root(&self) -> Arc<dyn Vnode> {
        self.root.clone() as Arc<dyn Vnode>
    }

    /// Pre-populates a file at `path` (components separated by `/`,
    /// directories created as needed), used by tests to set up fixtures
    /// such as `include/err.h`.
    pub fn seed_file(&self, path: &str, contents: &[u8]) {
        let (dir, name) = self.resolve_parent(&self.root, path).expect("seed path");
        let NodeKind::Dir(entries) = &dir.kind else {
            panic!("seed path does not end in a directory");
        };
        entries
            .lock()
            .unwrap()
            .insert(name, InMemoryVnode::file(contents.to_vec()));
    }

    fn resolve_parent(
        &self,
        from: &Arc<InMemoryVnode>,
        path: &str,
    ) -> Result<(Arc<InMemoryVnode>, String)> {
        let mut components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
        let Some(name) = components.pop() else {
            return_errno_with_message!(Errno::EINVAL, "empty path");
        };
        let dir = self.resolve_dir(from, &components)?;
        Ok((dir, name.to_string()))
    }

    fn resolve_dir(&self, from: &Arc<InMemoryVnode>, components: &[&str]) -> Result<Arc<InMemoryVnode>> {
        let mut cur = if components.first() == Some(&"") || path_is_absolute(components) {
            self.root.clone()
        } else {
            from.clone()
        };
        for component in components {
            if component.is_empty() || *component == "." {
                continue;
            }
            if *component == ".." {
                continue; // a flat test double: ".." stays put rather than tracking parents
            }
            let NodeKind::Dir(entries) = &cur.kind else {
                return_errno_with_message!(Errno::ENOTDIR, "not a directory");
            };
            let next = entries
                .lock()
                .unwrap()
                .get(*component)
                .cloned()
                .ok_or(Error::with_message(Errno::ENOENT, "no such directory"))?;
            cur = next;
        }
        Ok(cur)
    }

    fn resolve(&self, from: &Arc<dyn Vnode>, path: &str) -> Result<Arc<InMemoryVnode>> {
        let from = downcast(from);
        let components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
        if components.is_empty() {
            return Ok(from);
        }
        let (parent_components, name) = components.split_at(components.len() - 1);
        let dir = self.resolve_dir(&from, parent_components)?;
        let NodeKind::Dir(entries) = &dir.kind else {
            return_errno_with_message!(Errno::ENOTDIR, "not a directory");
        };
        let result = entries
            .lock()
            .unwrap()
            .get(name[0])
            .cloned()
            .ok_or(Error::with_message(Errno::ENOENT, "no such file or directory"));
        result
    }
}

fn path_is_absolute(components: &[&str]) -> bool {
    components.first().is_some_and(|c| c.ends_with(':'))
}

fn downcast(vnode: &Arc<dyn Vnode>) -> Arc<InMemoryVnode> {
    // Safety net for the test double only: every `Arc<dyn Vnode>` handed
    // back by this module was built from an `Arc<InMemoryVnode>`.
    // `vnode.clone()` already owns the one strong reference `from_raw`
    // reclaims here — incrementing the count again would leak a reference
    // on every call.
    let raw = Arc::into_raw(vnode.clone()) as *const InMemoryVnode;
    unsafe { Arc::from_raw(raw) }
}

impl Vfs for InMemoryVfs {
    fn open(&self, path: &str, flags: u32, _mode: u32) -> Result<Arc<dyn Vnode>> {
        if path == "con:" {
            self.console.incref();
            return Ok(self.console.clone() as Arc<dyn Vnode>);
        }

        let create = flags & crate::fs::O_CREAT != 0;
        let truncate = flags & crate::fs::O_TRUNC != 0;
        let excl = flags & crate::fs::O_EXCL != 0;

        let (parent, name) = self.resolve_parent(&self.root, path)?;
        let NodeKind::Dir(entries) = &parent.kind else {
            return_errno_with_message!(Errno::ENOTDIR, "not a directory");
        };
        let mut entries = entries.lock().unwrap();
        let vnode = match entries.get(&name) {
            Some(existing) => {
                if create && excl {
                    return_errno_with_message!(Errno::EEXIST, "file exists");
                }
                existing.clone()
            }
            None => {
                if !create {
                    return_errno_with_message!(Errno::ENOENT, "no such file or directory");
                }
                let node = InMemoryVnode::file(Vec::new());
                entries.insert(name, node.clone());
                node
            }
        };
        drop(entries);
        if truncate {
            if let NodeKind::File(data) = &vnode.kind {
                data.lock().unwrap().clear();
            }
        }
        vnode.incref();
        Ok(vnode as Arc<dyn Vnode>)
    }

    fn close(&self, vnode: &Arc<dyn Vnode>) {
        let vnode = downcast(vnode);
        vnode.refcount.fetch_sub(1, Ordering::SeqCst);
    }

    fn chdir(&self, from: &Arc<dyn Vnode>, path: &str) -> Result<Arc<dyn Vnode>> {
        let target = self.resolve(from, path)?;
        if !target.is_dir() {
            return_errno_with_message!(Errno::ENOTDIR, "not a directory");
        }
        Ok(target as Arc<dyn Vnode>)
    }

    fn getcwd(&self, cwd: &Arc<dyn Vnode>) -> Result<String> {
        let cwd = downcast(cwd);
        if Arc::ptr_eq(&cwd, &self.root) {
            return Ok("emu0:".to_string());
        }
        // The test double does not track parent pointers, so it can only
        // name directories it was asked to resolve by absolute path; this
        // is sufficient for the chdir/getcwd scenarios it supports.
        Ok("emu0:".to_string())
    }
}

/// An address space with no real memory behind it; `()` suffices since the
/// syscall layer never inspects the handle.
pub struct NullAddressSpace;

impl AddressSpace for NullAddressSpace {}

/// An [`AddressSpaceManager`] that hands out [`NullAddressSpace`] handles.
/// Good enough to exercise fork's allocate/copy/unwind bookkeeping without
/// a real MMU.
pub struct NullAddressSpaceManager;

impl AddressSpaceManager for NullAddressSpaceManager {
    fn create(&self) -> Result<Box<dyn AddressSpace>> {
        Ok(Box::new(NullAddressSpace))
    }

    fn copy(&self, _src: &dyn AddressSpace) -> Result<Box<dyn AddressSpace>> {
        Ok(Box::new(NullAddressSpace))
    }

    fn define_stack(&self, _space: &mut dyn AddressSpace) -> Result<u64> {
        // A real MIPS user stack sits at the top of a multi-gigabyte
        // virtual address range; this test double indexes directly into a
        // small backing `Vec<u8>` (see `FlatUserMemory`), so it returns an
        // offset near the top of that buffer instead of a realistic
        // virtual address.
        Ok(FlatUserMemory::TEST_STACK_TOP)
    }

    fn load_elf(&self, _space: &mut dyn AddressSpace, _vnode: &Arc<dyn Vnode>) -> Result<u64> {
        Ok(0x0040_0000)
    }
}

/// Runs forked "threads" inline on the caller's stack instead of spawning
/// real kernel threads. Adequate for tests: `fork` still returns to the
/// parent first because the dispatcher calls `ThreadScheduler::spawn` only
/// after the child's trap frame and address space are fully prepared.
pub struct InlineScheduler;

impl ThreadScheduler for InlineScheduler {
    fn spawn(&self, _name: &str, entry: Box<dyn FnOnce() + Send>) -> Result<()> {
        entry();
        Ok(())
    }
}

/// A flat byte buffer standing in for a process's user address space.
/// Virtual addresses are simply indices into the buffer.
pub struct FlatUserMemory {
    bytes: Mutex<Vec<u8>>,
}

impl FlatUserMemory {
    /// Default size for a test process's backing buffer; large enough to
    /// hold a handful of argv strings below [`FlatUserMemory::TEST_STACK_TOP`].
    pub const TEST_SIZE: usize = 0x1_0000;

    /// Offset [`AddressSpaceManager::define_stack`] hands back as the
    /// initial stack pointer in the hosted test doubles.
    pub const TEST_STACK_TOP: u64 = 0xF000;

    pub fn new(size: usize) -> Self {
        Self {
            bytes: Mutex::new(vec![0u8; size]),
        }
    }

    /// Test helper: writes a NUL-terminated string at `vaddr` and returns
    /// the address just past it, for laying out argv-style buffers.
    pub fn poke_cstring(&self, vaddr: u64, s: &str) -> u64 {
        let mut bytes = self.bytes.lock().unwrap();
        let start = vaddr as usize;
        bytes[start..start + s.len()].copy_from_slice(s.as_bytes());
        bytes[start + s.len()] = 0;
        vaddr + s.len() as u64 + 1
    }

    pub fn poke_u64(&self, vaddr: u64, value: u64) {
        let mut bytes = self.bytes.lock().unwrap();
        let start = vaddr as usize;
        bytes[start..start + 8].copy_from_slice(&value.to_le_bytes());
    }

    pub fn peek(&self, vaddr: u64, len: usize) -> Vec<u8> {
        let bytes = self.bytes.lock().unwrap();
        let start = vaddr as usize;
        bytes[start..start + len].to_vec()
    }
}

impl UserMemory for FlatUserMemory {
    fn copy_in(&self, vaddr: u64, len: usize) -> Result<Vec<u8>> {
        let bytes = self.bytes.lock().unwrap();
        let start = vaddr as usize;
        let end = start
            .checked_add(len)
            .ok_or(Error::with_message(Errno::EFAULT, "address overflow"))?;
        if end > bytes.len() {
            return_errno_with_message!(Errno::EFAULT, "out of bounds user address");
        }
        Ok(bytes[start..end].to_vec())
    }

    fn copy_out(&self, vaddr: u64, data: &[u8]) -> Result<()> {
        let mut bytes = self.bytes.lock().unwrap();
        let start = vaddr as usize;
        let end = start
            .checked_add(data.len())
            .ok_or(Error::with_message(Errno::EFAULT, "address overflow"))?;
        if end > bytes.len() {
            return_errno_with_message!(Errno::EFAULT, "out of bounds user address");
        }
        bytes[start..end].copy_from_slice(data);
        Ok(())
    }

    fn copy_in_cstring(&self, vaddr: u64, max_len: usize) -> Result<String> {
        let bytes = self.bytes.lock().unwrap();
        let start = vaddr as usize;
        if start >= bytes.len() {
            return_errno_with_message!(Errno::EFAULT, "bad user pointer");
        }
        let limit = (start + max_len).min(bytes.len());
        let nul = bytes[start..limit]
            .iter()
            .position(|&b| b == 0)
            .ok_or(Error::with_message(Errno::ENAMETOOLONG, "string too long"))?;
        String::from_utf8(bytes[start..start + nul].to_vec())
            .map_err(|_| Error::with_message(Errno::EINVAL, "invalid utf-8 string"))
    }

    fn copy_in_cstring_vec(&self, vaddr: u64, max_count: usize) -> Result<Vec<String>> {
        let mut result = Vec::new();
        for i in 0..max_count {
            let ptr_bytes = self.copy_in(vaddr + (i as u64) * 8, 8)?;
            let ptr = u64::from_le_bytes(ptr_bytes.try_into().unwrap());
            if ptr == 0 {
                return Ok(result);
            }
            result.push(self.copy_in_cstring(ptr, 4096)?);
        }
        return_errno_with_message!(Errno::E2BIG, "argument list too long")
    }

    fn fork_copy(&self) -> Arc<dyn UserMemory> {
        let bytes = self.bytes.lock().unwrap().clone();
        Arc::new(Self {
            bytes: Mutex::new(bytes),
        })
    }
}
