//! The virtual filesystem: inode graph, path walker, and POSIX-style
//! operations.
//!
//! Everything lives in process memory. A [`FileSystem`] owns an arena of
//! inodes reached through a root name map keyed by whole roots (`/`,
//! `c:/`); non-root entries are reached only through their parent
//! directory's links. Directory children, file buffers, the root map,
//! and shadow inodes are all materialized on first demand.
//!
//! A frozen filesystem (see [`FileSystem::make_readonly`]) rejects every
//! mutation and can be cheaply forked with [`FileSystem::shadow`]: the
//! fork copies inodes from its base on first traversal and never writes
//! back. Lazy materialization still caches into a frozen base; that is
//! cache population, not observable mutation.
//!
//! All operations are synchronous and single-threaded. Resolver and
//! clock callbacks run inside an operation and must not re-enter the
//! same filesystem.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::Rc;

use bytes::Bytes;
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::apply::FileSet;
use crate::clock::Clock;
use crate::constants::{S_IFDIR, S_IFMT, S_IFREG};
use crate::error::{ErrorCode, IoError, Result};
use crate::meta::Metadata;
use crate::names::NameMap;
use crate::node::{self, Arena, FileContent, LazyLinks, MountPoint, Node, NodeId, NodeKind};
use crate::path::{self, ValidationFlags};
use crate::resolver::{FileSystemResolver, ResolverStats};
use crate::stats::Stats;

/// Maximum number of symlink expansions a single walk may perform.
const MAX_LINK_DEPTH: u32 = 40;

/// Options accepted by [`FileSystem::new`].
#[derive(Default)]
pub struct FileSystemOptions {
    /// Compare names case-insensitively.
    pub ignore_case: bool,
    /// Initial working directory. Validated absolute and created
    /// (including ancestors) before anything else.
    pub cwd: Option<String>,
    /// Initial time source.
    pub time: Option<Clock>,
    /// Initial tree, applied as by [`FileSystem::apply`].
    pub files: Option<FileSet>,
    /// Seed entries for the filesystem-level metadata map.
    pub meta: Option<Vec<(String, serde_json::Value)>>,
}

/// An in-memory hierarchical filesystem with POSIX-style semantics.
pub struct FileSystem {
    ignore_case: bool,
    shadow_root: Option<Rc<FileSystem>>,
    state: RefCell<State>,
}

struct State {
    readonly: bool,
    cwd: String,
    dir_stack: Vec<String>,
    clock: Clock,
    arena: Arena,
    root: LazyLinks,
    /// Source ino → local shadow inode. Asking for the shadow of the
    /// same source twice must return the same inode.
    shadows: FxHashMap<u64, NodeId>,
    meta: Option<Metadata>,
}

/// Outcome of resolving an absolute path, component by component.
///
/// `node` may be absent while `parent` is present: the path's final
/// component does not exist but its directory does. Creating callers
/// (`mkdir`, `write_file`, `rename`, …) rely on that partial result.
struct WalkResult {
    realpath: String,
    basename: String,
    parent: Option<NodeId>,
    node: Option<NodeId>,
}

/// Header copy used when mirroring an inode across filesystems.
struct NodeSeed {
    dev: u64,
    ino: u64,
    mode: u32,
    nlink: u64,
    atime_ms: i64,
    mtime_ms: i64,
    ctime_ms: i64,
    birthtime_ms: i64,
    kind: SeedKind,
}

enum SeedKind {
    File,
    Dir,
    Symlink(String),
}

impl FileSystem {
    /// Creates a filesystem from `options`.
    pub fn new(options: FileSystemOptions) -> Result<Self> {
        let fs = Self {
            ignore_case: options.ignore_case,
            shadow_root: None,
            state: RefCell::new(State {
                readonly: false,
                cwd: String::new(),
                dir_stack: Vec::new(),
                clock: options.time.unwrap_or_default(),
                arena: Arena::default(),
                root: LazyLinks::Pending,
                shadows: FxHashMap::default(),
                meta: None,
            }),
        };
        if let Some(entries) = options.meta {
            let meta = fs.meta();
            for (key, value) in entries {
                meta.set(key, value);
            }
        }
        if let Some(cwd) = options.cwd {
            let cwd = path::validate(&cwd, ValidationFlags::ABSOLUTE)?;
            fs.mkdirp_sync(&cwd)?;
            fs.state.borrow_mut().cwd = cwd;
        }
        if let Some(files) = options.files {
            fs.apply_base(&files, String::new())?;
        }
        Ok(fs)
    }

    /// Whether names compare case-insensitively.
    #[must_use]
    pub fn ignore_case(&self) -> bool {
        self.ignore_case
    }

    /// Compares two names with this filesystem's comparator.
    #[must_use]
    pub fn compare_names(&self, a: &str, b: &str) -> Ordering {
        if self.ignore_case {
            path::compare_case_insensitive(a, b)
        } else {
            path::compare_case_sensitive(a, b)
        }
    }

    /// Whether this filesystem rejects mutation.
    #[must_use]
    pub fn is_readonly(&self) -> bool {
        self.state.borrow().readonly
    }

    /// Irreversibly freezes the filesystem. Every later mutation fails
    /// `EROFS` (clock replacement fails `EPERM`).
    pub fn make_readonly(&self) {
        self.state.borrow_mut().readonly = true;
    }

    /// The read-only filesystem this one layers over, if any.
    #[must_use]
    pub fn shadow_root(&self) -> Option<&Rc<FileSystem>> {
        self.shadow_root.as_ref()
    }

    /// Creates a mutable filesystem layered over this frozen one, with
    /// the same case sensitivity. The fork starts out observably equal
    /// to its base; inodes are copied over on first traversal and
    /// mutations never propagate back.
    ///
    /// # Panics
    ///
    /// Panics if this filesystem is not read-only.
    #[must_use]
    pub fn shadow(self: &Rc<Self>) -> FileSystem {
        self.shadow_with(self.ignore_case)
    }

    /// Like [`shadow`](Self::shadow) with an explicit case sensitivity.
    /// The fork's comparator is authoritative for names it materializes.
    ///
    /// # Panics
    ///
    /// Panics if this filesystem is not read-only, or if `ignore_case`
    /// asks for a case-insensitive view over a case-sensitive base.
    #[must_use]
    pub fn shadow_with(self: &Rc<Self>, ignore_case: bool) -> FileSystem {
        assert!(self.is_readonly(), "cannot shadow a mutable file system");
        assert!(
            !ignore_case || self.ignore_case,
            "cannot create a case-insensitive file system over a case-sensitive one"
        );
        let st = self.state.borrow();
        FileSystem {
            ignore_case,
            shadow_root: Some(Rc::clone(self)),
            state: RefCell::new(State {
                readonly: false,
                cwd: st.cwd.clone(),
                dir_stack: Vec::new(),
                clock: st.clock.clone(),
                arena: Arena::default(),
                root: LazyLinks::Pending,
                shadows: FxHashMap::default(),
                meta: None,
            }),
        }
    }

    /// The current time in milliseconds, read from the configured clock.
    #[must_use]
    pub fn time(&self) -> i64 {
        let clock = self.state.borrow().clock.clone();
        clock.now()
    }

    /// Replaces the time source. Fails `EPERM` on a frozen filesystem.
    pub fn set_time(&self, clock: impl Into<Clock>) -> Result<()> {
        let mut st = self.state.borrow_mut();
        if st.readonly {
            return Err(IoError::new(ErrorCode::EPERM));
        }
        st.clock = clock.into();
        Ok(())
    }

    /// The filesystem-level metadata map. On a fork, misses fall back to
    /// the base filesystem's map.
    #[must_use]
    pub fn meta(&self) -> Metadata {
        let mut st = self.state.borrow_mut();
        if let Some(meta) = &st.meta {
            return meta.clone();
        }
        let parent = self.shadow_root.as_ref().map(|base| base.meta());
        let meta = Metadata::with_parent(parent);
        st.meta = Some(meta.clone());
        meta
    }

    /// The current working directory.
    ///
    /// # Panics
    ///
    /// Panics if no working directory has been set.
    #[must_use]
    pub fn cwd(&self) -> String {
        let st = self.state.borrow();
        assert!(
            !st.cwd.is_empty(),
            "the current working directory has not been set"
        );
        st.cwd.clone()
    }

    /// Changes the working directory. The target must resolve to an
    /// existing directory.
    pub fn chdir(&self, path: &str) -> Result<()> {
        let mut st = self.state.borrow_mut();
        if st.readonly {
            return Err(IoError::new(ErrorCode::EROFS));
        }
        let resolved = self.resolve_path(&st, path)?;
        self.chdir_in(&mut st, &resolved)
    }

    /// Pushes the working directory onto the directory stack and, when
    /// `path` is given, changes to it.
    pub fn pushd(&self, path: Option<&str>) -> Result<()> {
        let mut st = self.state.borrow_mut();
        if st.readonly {
            return Err(IoError::new(ErrorCode::EROFS));
        }
        let resolved = match path {
            Some(p) => Some(self.resolve_path(&st, p)?),
            None => None,
        };
        if !st.cwd.is_empty() {
            let cwd = st.cwd.clone();
            st.dir_stack.push(cwd);
        }
        if let Some(p) = resolved {
            if p != st.cwd {
                self.chdir_in(&mut st, &p)?;
            }
        }
        Ok(())
    }

    /// Pops the directory stack and changes to the popped directory.
    /// An empty stack is not an error.
    pub fn popd(&self) -> Result<()> {
        let mut st = self.state.borrow_mut();
        if st.readonly {
            return Err(IoError::new(ErrorCode::EROFS));
        }
        if let Some(path) = st.dir_stack.pop() {
            self.chdir_in(&mut st, &path)?;
        }
        Ok(())
    }

    /// Attributes of the entry at `path`, following symlinks.
    pub fn stat_sync(&self, path: &str) -> Result<Stats> {
        let mut st = self.state.borrow_mut();
        let resolved = self.resolve_path(&st, path)?;
        let wr = self.walk(&mut st, &resolved, false)?;
        let node = wr
            .node
            .ok_or_else(|| IoError::with_path(ErrorCode::ENOENT, &resolved))?;
        Ok(self.stats_of(&st, node))
    }

    /// Attributes of the entry at `path`, without dereferencing a final
    /// symlink.
    pub fn lstat_sync(&self, path: &str) -> Result<Stats> {
        let mut st = self.state.borrow_mut();
        let resolved = self.resolve_path(&st, path)?;
        let wr = self.walk(&mut st, &resolved, true)?;
        let node = wr
            .node
            .ok_or_else(|| IoError::with_path(ErrorCode::ENOENT, &resolved))?;
        Ok(self.stats_of(&st, node))
    }

    /// Names in the directory at `path`, in comparator order.
    pub fn readdir_sync(&self, path: &str) -> Result<Vec<String>> {
        let mut st = self.state.borrow_mut();
        let resolved = self.resolve_path(&st, path)?;
        let wr = self.walk(&mut st, &resolved, false)?;
        let node = wr
            .node
            .ok_or_else(|| IoError::with_path(ErrorCode::ENOENT, &resolved))?;
        if !st.arena.node(node).is_directory() {
            return Err(IoError::with_path(ErrorCode::ENOTDIR, &resolved));
        }
        self.ensure_links(&mut st, node)?;
        let NodeKind::Dir {
            links: LazyLinks::Ready(map),
            ..
        } = &st.arena.node(node).kind
        else {
            unreachable!("links are materialized above");
        };
        Ok(map.names().map(str::to_string).collect())
    }

    /// Creates a directory at `path`. Fails `EEXIST` when any entry is
    /// already there.
    pub fn mkdir_sync(&self, path: &str) -> Result<()> {
        let mut st = self.state.borrow_mut();
        if st.readonly {
            return Err(IoError::with_path(ErrorCode::EROFS, path));
        }
        let resolved = self.resolve_path(&st, path)?;
        let wr = self.walk(&mut st, &resolved, true)?;
        if wr.node.is_some() {
            return Err(IoError::with_path(ErrorCode::EEXIST, &resolved));
        }
        let time = st.clock.clone().now();
        let dev = match wr.parent {
            Some(p) => st.arena.node(p).dev,
            None => node::next_dev(),
        };
        let id = st.arena.insert(Node::mknod(
            dev,
            0o777,
            time,
            NodeKind::Dir {
                links: LazyLinks::Pending,
                source: None,
            },
        ));
        self.add_link(&mut st, wr.parent, &wr.basename, id, time)
    }

    /// Creates `path` and any missing ancestors. An existing entry at
    /// `path` is left alone.
    pub fn mkdirp_sync(&self, path: &str) -> Result<()> {
        let resolved = {
            let st = self.state.borrow();
            self.resolve_path(&st, path)?
        };
        match self.mkdir_sync(&resolved) {
            Ok(()) => Ok(()),
            Err(e) if e.code == ErrorCode::EEXIST => Ok(()),
            Err(e) if e.code == ErrorCode::ENOENT => {
                let parent = path::dirname(&resolved);
                if parent == resolved {
                    return Err(e);
                }
                self.mkdirp_sync(&parent)?;
                self.mkdir_sync(&resolved)
            }
            Err(e) => Err(e),
        }
    }

    /// Removes the directory at `path`. Roots cannot be removed.
    pub fn rmdir_sync(&self, path: &str) -> Result<()> {
        let mut st = self.state.borrow_mut();
        if st.readonly {
            return Err(IoError::with_path(ErrorCode::EROFS, path));
        }
        let resolved = self.resolve_path(&st, path)?;
        let wr = self.walk(&mut st, &resolved, true)?;
        if wr.parent.is_none() {
            return Err(IoError::with_path(ErrorCode::EPERM, &resolved));
        }
        let node = match wr.node {
            Some(id) if st.arena.node(id).is_directory() => id,
            _ => return Err(IoError::with_path(ErrorCode::ENOTDIR, &resolved)),
        };
        self.ensure_links(&mut st, node)?;
        let NodeKind::Dir {
            links: LazyLinks::Ready(map),
            ..
        } = &st.arena.node(node).kind
        else {
            unreachable!("links are materialized above");
        };
        if !map.is_empty() {
            return Err(IoError::with_path(ErrorCode::ENOTEMPTY, &resolved));
        }
        let time = st.clock.clone().now();
        self.remove_link(&mut st, wr.parent, &wr.basename, node, time)
    }

    /// Attaches the inode at `oldpath` under `newpath` as well,
    /// incrementing its link count. Directories cannot be hard-linked.
    pub fn link_sync(&self, oldpath: &str, newpath: &str) -> Result<()> {
        let mut st = self.state.borrow_mut();
        if st.readonly {
            return Err(IoError::with_path(ErrorCode::EROFS, newpath));
        }
        let old_resolved = self.resolve_path(&st, oldpath)?;
        let old = self.walk(&mut st, &old_resolved, false)?;
        let node = old
            .node
            .ok_or_else(|| IoError::with_path(ErrorCode::ENOENT, &old_resolved))?;
        if st.arena.node(node).is_directory() {
            return Err(IoError::with_path(ErrorCode::EPERM, &old_resolved));
        }
        let new_resolved = self.resolve_path(&st, newpath)?;
        let new = self.walk(&mut st, &new_resolved, true)?;
        if new.parent.is_none() {
            return Err(IoError::with_path(ErrorCode::EPERM, &new_resolved));
        }
        if new.node.is_some() {
            return Err(IoError::with_path(ErrorCode::EEXIST, &new_resolved));
        }
        let time = st.clock.clone().now();
        self.add_link(&mut st, new.parent, &new.basename, node, time)
    }

    /// Detaches the non-directory entry at `path`.
    pub fn unlink_sync(&self, path: &str) -> Result<()> {
        let mut st = self.state.borrow_mut();
        if st.readonly {
            return Err(IoError::with_path(ErrorCode::EROFS, path));
        }
        let resolved = self.resolve_path(&st, path)?;
        let wr = self.walk(&mut st, &resolved, true)?;
        if wr.parent.is_none() {
            return Err(IoError::with_path(ErrorCode::EPERM, &resolved));
        }
        let node = wr
            .node
            .ok_or_else(|| IoError::with_path(ErrorCode::ENOENT, &resolved))?;
        if st.arena.node(node).is_directory() {
            return Err(IoError::with_path(ErrorCode::EISDIR, &resolved));
        }
        let time = st.clock.clone().now();
        self.remove_link(&mut st, wr.parent, &wr.basename, node, time)
    }

    /// Moves the entry at `oldpath` to `newpath`. An existing target is
    /// replaced when it is of the same kind (a directory target must be
    /// empty). Neither endpoint may be a root. The moved inode keeps its
    /// identity.
    pub fn rename_sync(&self, oldpath: &str, newpath: &str) -> Result<()> {
        let mut st = self.state.borrow_mut();
        if st.readonly {
            return Err(IoError::with_path(ErrorCode::EROFS, newpath));
        }
        let old_resolved = self.resolve_path(&st, oldpath)?;
        let old = self.walk(&mut st, &old_resolved, true)?;
        if old.parent.is_none() {
            return Err(IoError::with_path(ErrorCode::EPERM, &old_resolved));
        }
        let node = old
            .node
            .ok_or_else(|| IoError::with_path(ErrorCode::ENOENT, &old_resolved))?;
        let new_resolved = self.resolve_path(&st, newpath)?;
        let new = self.walk(&mut st, &new_resolved, true)?;
        if new.parent.is_none() {
            return Err(IoError::with_path(ErrorCode::EPERM, &new_resolved));
        }
        let time = st.clock.clone().now();
        if let Some(existing) = new.node {
            if st.arena.node(node).is_directory() {
                if !st.arena.node(existing).is_directory() {
                    return Err(IoError::with_path(ErrorCode::ENOTDIR, &new_resolved));
                }
                self.ensure_links(&mut st, existing)?;
                let NodeKind::Dir {
                    links: LazyLinks::Ready(map),
                    ..
                } = &st.arena.node(existing).kind
                else {
                    unreachable!("links are materialized above");
                };
                if !map.is_empty() {
                    return Err(IoError::with_path(ErrorCode::ENOTEMPTY, &new_resolved));
                }
            } else if st.arena.node(existing).is_directory() {
                return Err(IoError::with_path(ErrorCode::EISDIR, &new_resolved));
            }
            self.remove_link(&mut st, new.parent, &new.basename, existing, time)?;
        }
        self.replace_link(&mut st, &old, &new, node, time)
    }

    /// Creates a symbolic link at `linkpath` whose text is `target`.
    /// The text is validated relative-or-absolute and stored verbatim.
    pub fn symlink_sync(&self, target: &str, linkpath: &str) -> Result<()> {
        let mut st = self.state.borrow_mut();
        if st.readonly {
            return Err(IoError::with_path(ErrorCode::EROFS, linkpath));
        }
        let resolved = self.resolve_path(&st, linkpath)?;
        let wr = self.walk(&mut st, &resolved, true)?;
        if wr.parent.is_none() {
            return Err(IoError::with_path(ErrorCode::EPERM, &resolved));
        }
        if wr.node.is_some() {
            return Err(IoError::with_path(ErrorCode::EEXIST, &resolved));
        }
        let target = path::validate(target, ValidationFlags::RELATIVE_OR_ABSOLUTE)?;
        let time = st.clock.clone().now();
        let dev = match wr.parent {
            Some(p) => st.arena.node(p).dev,
            None => node::next_dev(),
        };
        let id = st
            .arena
            .insert(Node::mknod(dev, 0o666, time, NodeKind::Symlink { target }));
        self.add_link(&mut st, wr.parent, &wr.basename, id, time)
    }

    /// The stored text of the symbolic link at `path`.
    pub fn readlink_sync(&self, path: &str) -> Result<String> {
        let mut st = self.state.borrow_mut();
        let resolved = self.resolve_path(&st, path)?;
        let wr = self.walk(&mut st, &resolved, true)?;
        let node = wr
            .node
            .ok_or_else(|| IoError::with_path(ErrorCode::ENOENT, &resolved))?;
        match &st.arena.node(node).kind {
            NodeKind::Symlink { target } => Ok(target.clone()),
            _ => Err(IoError::with_path(ErrorCode::EINVAL, &resolved)),
        }
    }

    /// The path of `path` with every intermediate symlink resolved.
    pub fn realpath_sync(&self, path: &str) -> Result<String> {
        let mut st = self.state.borrow_mut();
        let resolved = self.resolve_path(&st, path)?;
        let wr = self.walk(&mut st, &resolved, false)?;
        if wr.node.is_none() {
            return Err(IoError::with_path(ErrorCode::ENOENT, &resolved));
        }
        Ok(wr.realpath)
    }

    /// The contents of the file at `path`. The returned handle is
    /// immutable; retaining it cannot alter stored content.
    pub fn read_file_sync(&self, path: &str) -> Result<Bytes> {
        let mut st = self.state.borrow_mut();
        let resolved = self.resolve_path(&st, path)?;
        let wr = self.walk(&mut st, &resolved, false)?;
        let node = wr
            .node
            .ok_or_else(|| IoError::with_path(ErrorCode::ENOENT, &resolved))?;
        if st.arena.node(node).is_directory() {
            return Err(IoError::with_path(ErrorCode::EISDIR, &resolved));
        }
        if !st.arena.node(node).is_file() {
            return Err(IoError::with_path(ErrorCode::EBADF, &resolved));
        }
        self.node_buffer(&mut st, node)
    }

    /// The contents of the file at `path`, decoded as UTF-8. Fails
    /// `EINVAL` on invalid UTF-8.
    pub fn read_file_string(&self, path: &str) -> Result<String> {
        let data = self.read_file_sync(path)?;
        String::from_utf8(data.to_vec())
            .map_err(|_| IoError::with_path(ErrorCode::EINVAL, path))
    }

    /// Writes a fresh copy of `data` to the file at `path`, creating it
    /// if absent. String content is written as its UTF-8 bytes.
    pub fn write_file_sync(&self, path: &str, data: impl AsRef<[u8]>) -> Result<()> {
        let mut st = self.state.borrow_mut();
        if st.readonly {
            return Err(IoError::with_path(ErrorCode::EROFS, path));
        }
        let resolved = self.resolve_path(&st, path)?;
        let wr = self.walk(&mut st, &resolved, false)?;
        if wr.parent.is_none() {
            return Err(IoError::with_path(ErrorCode::EPERM, &resolved));
        }
        let time = st.clock.clone().now();
        let node = match wr.node {
            Some(id) => id,
            None => {
                let dev = wr.parent.map_or_else(node::next_dev, |p| st.arena.node(p).dev);
                let id = st.arena.insert(Node::mknod(
                    dev,
                    0o666,
                    time,
                    NodeKind::File {
                        content: FileContent::Buffer(Bytes::new()),
                    },
                ));
                self.add_link(&mut st, wr.parent, &wr.basename, id, time)?;
                id
            }
        };
        if st.arena.node(node).is_directory() {
            return Err(IoError::with_path(ErrorCode::EISDIR, &resolved));
        }
        if !st.arena.node(node).is_file() {
            return Err(IoError::with_path(ErrorCode::EBADF, &resolved));
        }
        let n = st.arena.node_mut(node);
        let NodeKind::File { content } = &mut n.kind else {
            unreachable!("checked to be a file above");
        };
        *content = FileContent::Buffer(Bytes::copy_from_slice(data.as_ref()));
        n.mtime_ms = time;
        n.ctime_ms = time;
        Ok(())
    }

    /// Mounts the external `source` at `target`; children are produced
    /// on first access by `resolver` and never refreshed.
    pub fn mount_sync(
        &self,
        source: &str,
        target: &str,
        resolver: Rc<dyn FileSystemResolver>,
    ) -> Result<()> {
        let mut st = self.state.borrow_mut();
        if st.readonly {
            return Err(IoError::with_path(ErrorCode::EROFS, target));
        }
        let source = path::validate(source, ValidationFlags::ABSOLUTE)?;
        let resolved = self.resolve_path(&st, target)?;
        let wr = self.walk(&mut st, &resolved, true)?;
        if wr.node.is_some() {
            return Err(IoError::with_path(ErrorCode::EEXIST, &resolved));
        }
        debug!(source = %source, target = %resolved, "mounting external source");
        let time = st.clock.clone().now();
        let dev = match wr.parent {
            Some(p) => st.arena.node(p).dev,
            None => node::next_dev(),
        };
        let id = st.arena.insert(Node::mknod(
            dev,
            0o777,
            time,
            NodeKind::Dir {
                links: LazyLinks::Pending,
                source: Some(MountPoint { source, resolver }),
            },
        ));
        self.add_link(&mut st, wr.parent, &wr.basename, id, time)
    }

    /// The metadata map attached to the inode at `path`, lazily created
    /// with the shadow source's map as its fallback. Handing out the
    /// mutable handle counts as mutation, so a frozen filesystem fails
    /// `EROFS`.
    pub fn filemeta(&self, path: &str) -> Result<Metadata> {
        let mut st = self.state.borrow_mut();
        if st.readonly {
            return Err(IoError::with_path(ErrorCode::EROFS, path));
        }
        let resolved = self.resolve_path(&st, path)?;
        let wr = self.walk(&mut st, &resolved, false)?;
        let node = wr
            .node
            .ok_or_else(|| IoError::with_path(ErrorCode::ENOENT, &resolved))?;
        Ok(self.node_meta(&mut st, node))
    }

    /// Whether `path` resolves to an existing entry.
    #[must_use]
    pub fn exists_sync(&self, path: &str) -> bool {
        let mut st = self.state.borrow_mut();
        let Ok(resolved) = self.resolve_path(&st, path) else {
            return false;
        };
        matches!(
            self.walk(&mut st, &resolved, false),
            Ok(WalkResult { node: Some(_), .. })
        )
    }

    /// Whether `path` resolves to a regular file.
    #[must_use]
    pub fn file_exists_sync(&self, path: &str) -> bool {
        self.stat_sync(path).is_ok_and(|s| s.is_file())
    }

    /// Whether `path` resolves to a directory.
    #[must_use]
    pub fn directory_exists_sync(&self, path: &str) -> bool {
        self.stat_sync(path).is_ok_and(|s| s.is_directory())
    }

    /// Removes `path` and, for a directory, everything beneath it.
    /// A missing target completes without error.
    pub fn rimraf_sync(&self, path: &str) -> Result<()> {
        match self.lstat_sync(path) {
            Err(e) if e.code == ErrorCode::ENOENT => Ok(()),
            Err(e) => Err(e),
            Ok(stats) if stats.is_directory() => {
                for name in self.readdir_sync(path)? {
                    self.rimraf_sync(&path::combine(path, &name))?;
                }
                self.rmdir_sync(path)
            }
            Ok(_) => self.unlink_sync(path),
        }
    }

    // ---- resolution and walking ------------------------------------

    fn resolve_path(&self, st: &State, path: &str) -> Result<String> {
        if st.cwd.is_empty() {
            let path = path::validate(path, ValidationFlags::ABSOLUTE)?;
            Ok(path::normalize(&path))
        } else {
            let path = path::validate(path, ValidationFlags::RELATIVE_OR_ABSOLUTE)?;
            Ok(path::resolve(&st.cwd, &path))
        }
    }

    pub(crate) fn resolve_in(&self, path: &str) -> Result<String> {
        let st = self.state.borrow();
        self.resolve_path(&st, path)
    }

    pub(crate) fn base_dir(&self) -> String {
        self.state.borrow().cwd.clone()
    }

    /// Resolves an absolute, normalized path component by component,
    /// splicing symlink targets in as they are encountered.
    fn walk(&self, st: &mut State, path: &str, no_follow: bool) -> Result<WalkResult> {
        let mut components = path::parse(path);
        let mut parent: Option<NodeId> = None;
        let mut step = 0usize;
        let mut depth = 0u32;
        loop {
            if depth >= MAX_LINK_DEPTH {
                debug!(path, "walk exceeded the symlink depth budget");
                return Err(IoError::with_path(ErrorCode::ELOOP, path));
            }
            let basename = components[step].clone();
            let node = self.lookup_child(st, parent, &basename)?;
            let last = step + 1 == components.len();
            let is_symlink = node.is_some_and(|id| st.arena.node(id).is_symlink());
            if last && (no_follow || !is_symlink) {
                return Ok(WalkResult {
                    realpath: path::format(&components),
                    basename,
                    parent,
                    node,
                });
            }
            let Some(id) = node else {
                return Err(IoError::with_path(ErrorCode::ENOENT, path));
            };
            match &st.arena.node(id).kind {
                NodeKind::Symlink { target } => {
                    let target = target.clone();
                    let prefix = path::format(&components[..step]);
                    let spliced = path::resolve(&prefix, &target);
                    trace!(link = %path::format(&components[..=step]), target = %spliced, "following symlink");
                    let mut next = path::parse(&spliced);
                    next.extend_from_slice(&components[step + 1..]);
                    components = next;
                    parent = None;
                    step = 0;
                    depth += 1;
                }
                NodeKind::Dir { .. } => {
                    parent = Some(id);
                    step += 1;
                }
                NodeKind::File { .. } => {
                    return Err(IoError::with_path(ErrorCode::ENOTDIR, path));
                }
            }
        }
    }

    fn lookup_child(
        &self,
        st: &mut State,
        parent: Option<NodeId>,
        name: &str,
    ) -> Result<Option<NodeId>> {
        match parent {
            None => {
                self.ensure_root(st)?;
                let LazyLinks::Ready(map) = &st.root else {
                    unreachable!("root links are materialized above");
                };
                Ok(map.get(name))
            }
            Some(p) => {
                self.ensure_links(st, p)?;
                let NodeKind::Dir {
                    links: LazyLinks::Ready(map),
                    ..
                } = &st.arena.node(p).kind
                else {
                    unreachable!("links are materialized above");
                };
                Ok(map.get(name))
            }
        }
    }

    // ---- link bookkeeping ------------------------------------------

    fn with_links_mut<R>(
        &self,
        st: &mut State,
        parent: Option<NodeId>,
        f: impl FnOnce(&mut NameMap) -> R,
    ) -> Result<R> {
        match parent {
            None => {
                self.ensure_root(st)?;
                let LazyLinks::Ready(map) = &mut st.root else {
                    unreachable!("root links are materialized above");
                };
                Ok(f(map))
            }
            Some(p) => {
                self.ensure_links(st, p)?;
                let NodeKind::Dir {
                    links: LazyLinks::Ready(map),
                    ..
                } = &mut st.arena.node_mut(p).kind
                else {
                    unreachable!("links are materialized above");
                };
                Ok(f(map))
            }
        }
    }

    fn add_link(
        &self,
        st: &mut State,
        parent: Option<NodeId>,
        name: &str,
        node: NodeId,
        time: i64,
    ) -> Result<()> {
        self.with_links_mut(st, parent, |map| map.set(name, node))?;
        let n = st.arena.node_mut(node);
        n.nlink += 1;
        n.ctime_ms = time;
        if let Some(p) = parent {
            st.arena.node_mut(p).mtime_ms = time;
        }
        Ok(())
    }

    fn remove_link(
        &self,
        st: &mut State,
        parent: Option<NodeId>,
        name: &str,
        node: NodeId,
        time: i64,
    ) -> Result<()> {
        self.with_links_mut(st, parent, |map| map.delete(name))?;
        let n = st.arena.node_mut(node);
        n.nlink = n.nlink.saturating_sub(1);
        n.ctime_ms = time;
        if let Some(p) = parent {
            st.arena.node_mut(p).mtime_ms = time;
        }
        Ok(())
    }

    /// Moves `node` from one name to another. A same-parent rename is an
    /// in-place key change that leaves `nlink` untouched.
    fn replace_link(
        &self,
        st: &mut State,
        old: &WalkResult,
        new: &WalkResult,
        node: NodeId,
        time: i64,
    ) -> Result<()> {
        if old.parent == new.parent {
            self.with_links_mut(st, old.parent, |map| {
                map.delete(&old.basename);
                map.set(&new.basename, node);
            })?;
            if let Some(p) = old.parent {
                st.arena.node_mut(p).mtime_ms = time;
            }
            Ok(())
        } else {
            self.remove_link(st, old.parent, &old.basename, node, time)?;
            self.add_link(st, new.parent, &new.basename, node, time)
        }
    }

    // ---- lazy materialization --------------------------------------

    fn ensure_root(&self, st: &mut State) -> Result<()> {
        if matches!(st.root, LazyLinks::Ready(_)) {
            return Ok(());
        }
        let mut map = NameMap::new(self.ignore_case);
        if let Some(base) = &self.shadow_root {
            for (name, source) in base.links_snapshot_root()? {
                let id = self.shadow_node(st, base, source);
                map.set(&name, id);
            }
        }
        st.root = LazyLinks::Ready(map);
        Ok(())
    }

    /// Materializes the children of the directory at `id`: from its
    /// mount source (one-shot), from its shadow source, or empty.
    fn ensure_links(&self, st: &mut State, id: NodeId) -> Result<()> {
        {
            let NodeKind::Dir { links, .. } = &st.arena.node(id).kind else {
                return Err(IoError::new(ErrorCode::ENOTDIR));
            };
            if matches!(links, LazyLinks::Ready(_)) {
                return Ok(());
            }
        }
        let mount = {
            let NodeKind::Dir { source, .. } = &mut st.arena.node_mut(id).kind else {
                unreachable!("checked to be a directory above");
            };
            source.take()
        };
        let mut map = NameMap::new(self.ignore_case);
        if let Some(mp) = mount {
            debug!(source = %mp.source, "expanding mounted directory");
            let dev = st.arena.node(id).dev;
            let time = st.clock.clone().now();
            for name in mp.resolver.readdir_sync(&mp.source)? {
                let child_path = path::combine(&mp.source, &name);
                let rs = mp.resolver.stat_sync(&child_path)?;
                let child = match rs.mode & S_IFMT {
                    S_IFDIR => Node::mknod(
                        dev,
                        0o777,
                        time,
                        NodeKind::Dir {
                            links: LazyLinks::Pending,
                            source: Some(MountPoint {
                                source: child_path,
                                resolver: Rc::clone(&mp.resolver),
                            }),
                        },
                    ),
                    S_IFREG => Node::mknod(
                        dev,
                        0o666,
                        time,
                        NodeKind::File {
                            content: FileContent::Lazy {
                                source: child_path,
                                resolver: Rc::clone(&mp.resolver),
                                size: rs.size,
                            },
                        },
                    ),
                    _ => continue,
                };
                let cid = st.arena.insert(child);
                map.set(&name, cid);
                let c = st.arena.node_mut(cid);
                c.nlink += 1;
                c.ctime_ms = time;
                st.arena.node_mut(id).mtime_ms = time;
            }
        } else if let (Some(base), Some(source)) = (&self.shadow_root, st.arena.node(id).shadow) {
            for (name, src_child) in base.links_snapshot(source)? {
                let cid = self.shadow_node(st, base, src_child);
                map.set(&name, cid);
            }
        }
        let NodeKind::Dir { links, .. } = &mut st.arena.node_mut(id).kind else {
            unreachable!("checked to be a directory above");
        };
        *links = LazyLinks::Ready(map);
        Ok(())
    }

    /// Mirrors `source` (an inode of `base`) into this filesystem,
    /// deduplicated through the shadow table.
    fn shadow_node(&self, st: &mut State, base: &Rc<FileSystem>, source: NodeId) -> NodeId {
        let seed = base.node_seed(source);
        if let Some(&existing) = st.shadows.get(&seed.ino) {
            return existing;
        }
        let kind = match seed.kind {
            SeedKind::File => NodeKind::File {
                content: FileContent::FromShadow,
            },
            SeedKind::Dir => NodeKind::Dir {
                links: LazyLinks::Pending,
                source: None,
            },
            SeedKind::Symlink(target) => NodeKind::Symlink { target },
        };
        let id = st.arena.insert(Node {
            dev: seed.dev,
            ino: seed.ino,
            mode: seed.mode,
            nlink: seed.nlink,
            atime_ms: seed.atime_ms,
            mtime_ms: seed.mtime_ms,
            ctime_ms: seed.ctime_ms,
            birthtime_ms: seed.birthtime_ms,
            meta: None,
            shadow: Some(source),
            kind,
        });
        st.shadows.insert(seed.ino, id);
        trace!(ino = seed.ino, "materialized shadow inode");
        id
    }

    fn node_seed(&self, id: NodeId) -> NodeSeed {
        let st = self.state.borrow();
        let n = st.arena.node(id);
        NodeSeed {
            dev: n.dev,
            ino: n.ino,
            mode: n.mode,
            nlink: n.nlink,
            atime_ms: n.atime_ms,
            mtime_ms: n.mtime_ms,
            ctime_ms: n.ctime_ms,
            birthtime_ms: n.birthtime_ms,
            kind: match &n.kind {
                NodeKind::File { .. } => SeedKind::File,
                NodeKind::Dir { .. } => SeedKind::Dir,
                NodeKind::Symlink { target } => SeedKind::Symlink(target.clone()),
            },
        }
    }

    fn links_snapshot_root(&self) -> Result<Vec<(String, NodeId)>> {
        let mut st = self.state.borrow_mut();
        self.ensure_root(&mut st)?;
        let LazyLinks::Ready(map) = &st.root else {
            unreachable!("root links are materialized above");
        };
        Ok(map.iter().map(|(n, id)| (n.to_string(), id)).collect())
    }

    fn links_snapshot(&self, id: NodeId) -> Result<Vec<(String, NodeId)>> {
        let mut st = self.state.borrow_mut();
        self.ensure_links(&mut st, id)?;
        let NodeKind::Dir {
            links: LazyLinks::Ready(map),
            ..
        } = &st.arena.node(id).kind
        else {
            unreachable!("links are materialized above");
        };
        Ok(map.iter().map(|(n, id)| (n.to_string(), id)).collect())
    }

    // ---- content and attributes ------------------------------------

    /// The bytes of the file at `id`, loading through the resolver or
    /// the shadow source on first access.
    fn node_buffer(&self, st: &mut State, id: NodeId) -> Result<Bytes> {
        enum Pending {
            Ready(Bytes),
            Fetch(String, Rc<dyn FileSystemResolver>),
            Shadow(NodeId),
        }
        let pending = {
            let n = st.arena.node(id);
            let NodeKind::File { content } = &n.kind else {
                return Err(IoError::new(ErrorCode::EBADF));
            };
            match content {
                FileContent::Buffer(b) => Pending::Ready(b.clone()),
                FileContent::Lazy {
                    source, resolver, ..
                } => Pending::Fetch(source.clone(), Rc::clone(resolver)),
                FileContent::FromShadow => match n.shadow {
                    Some(s) => Pending::Shadow(s),
                    None => Pending::Ready(Bytes::new()),
                },
            }
        };
        let data = match pending {
            Pending::Ready(b) => return Ok(b),
            Pending::Fetch(source, resolver) => {
                let data = resolver.read_file_sync(&source)?;
                trace!(source = %source, len = data.len(), "materialized file contents");
                data
            }
            Pending::Shadow(s) => match &self.shadow_root {
                Some(base) => base.buffer_snapshot(s)?,
                None => Bytes::new(),
            },
        };
        let NodeKind::File { content } = &mut st.arena.node_mut(id).kind else {
            unreachable!("checked to be a file above");
        };
        *content = FileContent::Buffer(data.clone());
        Ok(data)
    }

    fn buffer_snapshot(&self, id: NodeId) -> Result<Bytes> {
        let mut st = self.state.borrow_mut();
        self.node_buffer(&mut st, id)
    }

    /// Size without forcing content: a lazy file keeps the resolver's
    /// stat size, a shadow file asks its source.
    fn node_size(&self, st: &State, id: NodeId) -> u64 {
        let n = st.arena.node(id);
        match &n.kind {
            NodeKind::File { content } => match content {
                FileContent::Buffer(b) => b.len() as u64,
                FileContent::Lazy { size, .. } => *size,
                FileContent::FromShadow => match (&self.shadow_root, n.shadow) {
                    (Some(base), Some(s)) => base.size_snapshot(s),
                    _ => 0,
                },
            },
            NodeKind::Symlink { target } => target.len() as u64,
            NodeKind::Dir { .. } => 0,
        }
    }

    fn size_snapshot(&self, id: NodeId) -> u64 {
        let st = self.state.borrow();
        self.node_size(&st, id)
    }

    fn stats_of(&self, st: &State, id: NodeId) -> Stats {
        let size = self.node_size(st, id);
        let n = st.arena.node(id);
        Stats {
            dev: n.dev,
            ino: n.ino,
            mode: n.mode,
            nlink: n.nlink,
            uid: 0,
            gid: 0,
            rdev: 0,
            size,
            blksize: 4096,
            blocks: 0,
            atime_ms: n.atime_ms,
            mtime_ms: n.mtime_ms,
            ctime_ms: n.ctime_ms,
            birthtime_ms: n.birthtime_ms,
        }
    }

    fn node_meta(&self, st: &mut State, id: NodeId) -> Metadata {
        if let Some(meta) = &st.arena.node(id).meta {
            return meta.clone();
        }
        let parent = match (&self.shadow_root, st.arena.node(id).shadow) {
            (Some(base), Some(s)) => Some(base.meta_snapshot(s)),
            _ => None,
        };
        let meta = Metadata::with_parent(parent);
        st.arena.node_mut(id).meta = Some(meta.clone());
        meta
    }

    fn meta_snapshot(&self, id: NodeId) -> Metadata {
        let mut st = self.state.borrow_mut();
        self.node_meta(&mut st, id)
    }

    fn chdir_in(&self, st: &mut State, path: &str) -> Result<()> {
        let wr = self.walk(st, path, false)?;
        let node = wr
            .node
            .ok_or_else(|| IoError::with_path(ErrorCode::ENOENT, path))?;
        if !st.arena.node(node).is_directory() {
            return Err(IoError::with_path(ErrorCode::ENOTDIR, path));
        }
        st.cwd = path.to_string();
        Ok(())
    }
}

/// One filesystem can serve as the external source of another's mounts.
impl FileSystemResolver for FileSystem {
    fn stat_sync(&self, path: &str) -> Result<ResolverStats> {
        let stats = FileSystem::stat_sync(self, path)?;
        Ok(ResolverStats {
            mode: stats.mode,
            size: stats.size,
        })
    }

    fn readdir_sync(&self, path: &str) -> Result<Vec<String>> {
        FileSystem::readdir_sync(self, path)
    }

    fn read_file_sync(&self, path: &str) -> Result<Bytes> {
        FileSystem::read_file_sync(self, path)
    }
}
