//! In-memory VFS tree rooted at `/`.
//!
//! Claudia has no block device, so its tree is simpler than a classic
//! on-disk inode/block/buffer-cache filesystem and fully in-memory: nodes
//! live in a single arena allocated from the kernel heap, directories hold a
//! `Vec` of child handles, and regular files hold their content directly in
//! a `Vec<u8>` capped at `MAX_FILE_SIZE`. SimpleFS (`fs.rs`) only ever
//! populates this tree once, at boot, from the embedded initrd.

use crate::errno::{KResult, KernelError};
use crate::param::MAX_FILE_SIZE;
use crate::spinlock::Spinlock;
use alloc::string::String;
use alloc::vec::Vec;

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct VNodeRef(pub usize);

impl VNodeRef {
    pub const NONE: VNodeRef = VNodeRef(usize::MAX);

    pub fn is_none(&self) -> bool {
        *self == VNodeRef::NONE
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum VNodeKind {
    Directory,
    Regular,
}

pub struct VNode {
    pub name: String,
    pub kind: VNodeKind,
    pub parent: VNodeRef,
    pub children: Vec<VNodeRef>,
    pub data: Vec<u8>,
}

struct Tree {
    nodes: Vec<VNode>,
    root: VNodeRef,
}

static LOCK: Spinlock = Spinlock::new("vfs");
static mut TREE: Option<Tree> = None;

fn tree() -> &'static mut Tree {
    unsafe { TREE.as_mut().expect("vfs not initialized") }
}

/// Creates the root directory. Must run once, before `SimpleFS` population
/// or `user_init`.
pub fn init() {
    LOCK.acquire();
    unsafe {
        TREE = Some(Tree {
            nodes: Vec::new(),
            root: VNodeRef::NONE,
        });
        let t = TREE.as_mut().unwrap();
        t.nodes.push(VNode {
            name: String::from("/"),
            kind: VNodeKind::Directory,
            parent: VNodeRef::NONE,
            children: Vec::new(),
            data: Vec::new(),
        });
        t.root = VNodeRef(0);
    }
    LOCK.release();
}

pub fn root() -> VNodeRef {
    tree().root
}

fn node(v: VNodeRef) -> &'static mut VNode {
    &mut tree().nodes[v.0]
}

fn find_child(parent: VNodeRef, name: &str) -> Option<VNodeRef> {
    node(parent).children.iter().copied().find(|&c| node(c).name == name)
}

/// Splits `path` on `/` and descends from `cwd` (relative) or the root
/// (absolute).
pub fn resolve_path(path: &str, cwd: VNodeRef) -> KResult<VNodeRef> {
    LOCK.acquire();
    let r = resolve_path_locked(path, cwd);
    LOCK.release();
    r
}

fn resolve_path_locked(path: &str, cwd: VNodeRef) -> KResult<VNodeRef> {
    if path.is_empty() {
        return Err(KernelError::Enoent);
    }
    let mut cur = if path.starts_with('/') { tree().root } else { cwd };
    for comp in path.split('/').filter(|s| !s.is_empty()) {
        if comp == "." {
            continue;
        }
        if node(cur).kind != VNodeKind::Directory {
            return Err(KernelError::Enotdir);
        }
        if comp == ".." {
            cur = if node(cur).parent.is_none() { cur } else { node(cur).parent };
            continue;
        }
        cur = find_child(cur, comp).ok_or(KernelError::Enoent)?;
    }
    Ok(cur)
}

/// Resolves the parent directory and final component name of `path`,
/// without requiring the final component to already exist - used by
/// `create_file`/`create_directory`/`unlink`.
fn resolve_parent(path: &str, cwd: VNodeRef) -> KResult<(VNodeRef, String)> {
    let (parent_part, name) = match path.rsplit_once('/') {
        Some((p, n)) => (p, n),
        None => ("", path),
    };
    if name.is_empty() || name == "." || name == ".." {
        return Err(KernelError::Einval);
    }
    let parent_path = if parent_part.is_empty() {
        if path.starts_with('/') {
            "/"
        } else {
            "."
        }
    } else {
        parent_part
    };
    let parent = resolve_path_locked(parent_path, cwd)?;
    Ok((parent, String::from(name)))
}

fn new_node(kind: VNodeKind, parent: VNodeRef, name: String) -> VNodeRef {
    let t = tree();
    let idx = t.nodes.len();
    t.nodes.push(VNode {
        name,
        kind,
        parent,
        children: Vec::new(),
        data: Vec::new(),
    });
    VNodeRef(idx)
}

pub fn create_file(path: &str, cwd: VNodeRef) -> KResult<VNodeRef> {
    LOCK.acquire();
    let r = create_locked(path, cwd, VNodeKind::Regular);
    LOCK.release();
    r
}

pub fn create_directory(path: &str, cwd: VNodeRef) -> KResult<VNodeRef> {
    LOCK.acquire();
    let r = create_locked(path, cwd, VNodeKind::Directory);
    LOCK.release();
    r
}

fn create_locked(path: &str, cwd: VNodeRef, kind: VNodeKind) -> KResult<VNodeRef> {
    let (parent, name) = resolve_parent(path, cwd)?;
    if node(parent).kind != VNodeKind::Directory {
        return Err(KernelError::Enotdir);
    }
    if find_child(parent, &name).is_some() {
        return Err(KernelError::Eexist);
    }
    let child = new_node(kind, parent, name);
    node(parent).children.push(child);
    Ok(child)
}

/// Removes `path`. Refuses non-empty directories unless `remove_dir` and
/// the directory is empty.
pub fn unlink(path: &str, cwd: VNodeRef, remove_dir: bool) -> KResult<()> {
    LOCK.acquire();
    let (parent, name) = match resolve_parent(path, cwd) {
        Ok(v) => v,
        Err(e) => {
            LOCK.release();
            return Err(e);
        }
    };
    let target = match find_child(parent, &name) {
        Some(v) => v,
        None => {
            LOCK.release();
            return Err(KernelError::Enoent);
        }
    };
    let n = node(target);
    if n.kind == VNodeKind::Directory {
        if !remove_dir {
            LOCK.release();
            return Err(KernelError::Eisdir);
        }
        if !n.children.is_empty() {
            LOCK.release();
            return Err(KernelError::Enotempty);
        }
    }
    node(parent).children.retain(|&c| c != target);
    LOCK.release();
    Ok(())
}

pub fn kind(v: VNodeRef) -> VNodeKind {
    LOCK.acquire();
    let k = node(v).kind;
    LOCK.release();
    k
}

pub fn size(v: VNodeRef) -> usize {
    LOCK.acquire();
    let s = node(v).data.len();
    LOCK.release();
    s
}

pub fn read(v: VNodeRef, offset: usize, buf: &mut [u8]) -> KResult<usize> {
    LOCK.acquire();
    let n = node(v);
    if n.kind != VNodeKind::Regular {
        LOCK.release();
        return Err(KernelError::Eisdir);
    }
    if offset >= n.data.len() {
        LOCK.release();
        return Ok(0);
    }
    let avail = n.data.len() - offset;
    let count = avail.min(buf.len());
    buf[..count].copy_from_slice(&n.data[offset..offset + count]);
    LOCK.release();
    Ok(count)
}

/// Writes `buf` at `offset`, growing the backing buffer as needed. Returns
/// `ENOSPC` once the write would exceed `MAX_FILE_SIZE`.
pub fn write(v: VNodeRef, offset: usize, buf: &[u8]) -> KResult<usize> {
    LOCK.acquire();
    let n = node(v);
    if n.kind != VNodeKind::Regular {
        LOCK.release();
        return Err(KernelError::Eisdir);
    }
    if offset >= MAX_FILE_SIZE {
        LOCK.release();
        return Err(KernelError::Enospc);
    }
    let end = (offset + buf.len()).min(MAX_FILE_SIZE);
    let count = end - offset;
    if end > n.data.len() {
        n.data.resize(end, 0);
    }
    n.data[offset..end].copy_from_slice(&buf[..count]);
    LOCK.release();
    Ok(count)
}

pub fn truncate(v: VNodeRef) {
    LOCK.acquire();
    node(v).data.clear();
    LOCK.release();
}

pub fn name_of(v: VNodeRef) -> String {
    LOCK.acquire();
    let s = node(v).name.clone();
    LOCK.release();
    s
}

/// Reconstructs `v`'s absolute path by walking parent links to the root.
/// The root itself prints as `/`.
pub fn absolute_path(v: VNodeRef) -> String {
    LOCK.acquire();
    let mut parts = Vec::new();
    let mut cur = v;
    while !node(cur).parent.is_none() {
        parts.push(node(cur).name.clone());
        cur = node(cur).parent;
    }
    LOCK.release();
    if parts.is_empty() {
        return String::from("/");
    }
    parts.reverse();
    let mut out = String::new();
    for p in parts {
        out.push('/');
        out.push_str(&p);
    }
    out
}

#[cfg(all(test, feature = "std-test"))]
mod tests {
    use super::*;

    fn fresh() {
        init();
    }

    #[test]
    fn create_and_resolve_nested_path() {
        fresh();
        let r = root();
        create_directory("/bin", r).unwrap();
        let bin = resolve_path("/bin", r).unwrap();
        create_file("/bin/sh", r).unwrap();
        let sh = resolve_path("/bin/sh", r).unwrap();
        assert_eq!(node(sh).parent, bin);
    }

    #[test]
    fn create_existing_name_is_eexist() {
        fresh();
        let r = root();
        create_directory("/etc", r).unwrap();
        assert_eq!(create_directory("/etc", r).unwrap_err(), KernelError::Eexist);
    }

    #[test]
    fn unlink_refuses_nonempty_directory_without_flag() {
        fresh();
        let r = root();
        create_directory("/d", r).unwrap();
        create_file("/d/f", r).unwrap();
        assert_eq!(unlink("/d", r, true).unwrap_err(), KernelError::Enotempty);
        unlink("/d/f", r, false).unwrap();
        unlink("/d", r, true).unwrap();
    }

    #[test]
    fn resolve_empty_path_is_enoent() {
        fresh();
        let r = root();
        assert_eq!(resolve_path("", r).unwrap_err(), KernelError::Enoent);
    }

    #[test]
    fn write_past_capacity_is_enospc() {
        fresh();
        let r = root();
        let f = create_file("/big", r).unwrap();
        let buf = [0u8; 16];
        assert_eq!(write(f, MAX_FILE_SIZE, &buf).unwrap_err(), KernelError::Enospc);
    }
}
