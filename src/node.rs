//! Inode representation and allocation.

use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;

use crate::constants::{S_IFDIR, S_IFLNK, S_IFMT, S_IFREG};
use crate::meta::Metadata;
use crate::names::NameMap;
use crate::resolver::FileSystemResolver;

/// Process-global device id allocator. Roots minted by different
/// filesystems never share a device, so shadow identity checks across
/// filesystems stay meaningful.
static DEV_COUNT: AtomicU64 = AtomicU64::new(0);
/// Process-global inode number allocator.
static INO_COUNT: AtomicU64 = AtomicU64::new(0);

pub(crate) fn next_dev() -> u64 {
    DEV_COUNT.fetch_add(1, Ordering::Relaxed) + 1
}

fn next_ino() -> u64 {
    INO_COUNT.fetch_add(1, Ordering::Relaxed) + 1
}

/// Index of an inode in its owning filesystem's arena.
///
/// The inner field is private: ids are minted only by [`Arena::insert`],
/// so holding a `NodeId` implies the node exists in some arena. Ids are
/// never reused; a dead inode is merely unreachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct NodeId(u32);

/// Arena of inodes owned by one filesystem.
#[derive(Default)]
pub(crate) struct Arena {
    nodes: Vec<Node>,
}

impl Arena {
    pub fn insert(&mut self, node: Node) -> NodeId {
        #[expect(
            clippy::cast_possible_truncation,
            reason = "an arena never holds more than u32::MAX inodes"
        )]
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0 as usize]
    }
}

/// An inode: shared stat header plus a kind-specific payload.
pub(crate) struct Node {
    pub dev: u64,
    pub ino: u64,
    pub mode: u32,
    pub nlink: u64,
    pub atime_ms: i64,
    pub mtime_ms: i64,
    pub ctime_ms: i64,
    pub birthtime_ms: i64,
    /// Lazily allocated metadata map; falls back to the shadow source's.
    pub meta: Option<Metadata>,
    /// The node in the shadowed filesystem this one was materialized
    /// from. A back reference, never ownership.
    pub shadow: Option<NodeId>,
    pub kind: NodeKind,
}

pub(crate) enum NodeKind {
    File { content: FileContent },
    Dir { links: LazyLinks, source: Option<MountPoint> },
    Symlink { target: String },
}

/// The authoritative source of a file's bytes. Exactly one state holds
/// at any time; lazy states collapse to `Buffer` on first read.
pub(crate) enum FileContent {
    Buffer(Bytes),
    Lazy {
        source: String,
        resolver: Rc<dyn FileSystemResolver>,
        size: u64,
    },
    FromShadow,
}

/// Directory children: either not yet built, or the materialized map.
pub(crate) enum LazyLinks {
    Pending,
    Ready(NameMap),
}

/// An unexpanded external source attached to a directory.
pub(crate) struct MountPoint {
    pub source: String,
    pub resolver: Rc<dyn FileSystemResolver>,
}

impl fmt::Debug for MountPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountPoint")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

impl NodeKind {
    fn type_bits(&self) -> u32 {
        match self {
            Self::File { .. } => S_IFREG,
            Self::Dir { .. } => S_IFDIR,
            Self::Symlink { .. } => S_IFLNK,
        }
    }
}

impl Node {
    /// Creates a detached inode. `nlink` stays zero until a name links
    /// it; the permission bits have the conventional `0o022` umask
    /// applied.
    pub fn mknod(dev: u64, mode: u32, time_ms: i64, kind: NodeKind) -> Self {
        Self {
            dev,
            ino: next_ino(),
            mode: (mode & 0o7777 & !0o022) | kind.type_bits(),
            nlink: 0,
            atime_ms: time_ms,
            mtime_ms: time_ms,
            ctime_ms: time_ms,
            birthtime_ms: time_ms,
            meta: None,
            shadow: None,
            kind,
        }
    }

    pub fn is_file(&self) -> bool {
        self.mode & S_IFMT == S_IFREG
    }

    pub fn is_directory(&self) -> bool {
        self.mode & S_IFMT == S_IFDIR
    }

    pub fn is_symlink(&self) -> bool {
        self.mode & S_IFMT == S_IFLNK
    }
}
