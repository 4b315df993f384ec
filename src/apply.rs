//! Declarative population of a filesystem from a tree literal.

use std::fmt;
use std::rc::Rc;

use bytes::Bytes;
use hashlink::LinkedHashMap;
use serde_json::Value;

use crate::error::{ErrorCode, IoError, Result};
use crate::fs::FileSystem;
use crate::path::{self, ValidationFlags};
use crate::resolver::FileSystemResolver;

/// An ordered tree literal consumed by [`FileSystem::apply`].
///
/// Keys are path fragments, resolved against the enclosing directory or,
/// at the top level, against the filesystem's working directory. Entry
/// order is preserved; deferred links, symlinks, and mounts are applied
/// in discovery order.
#[derive(Clone, Default)]
pub struct FileSet {
    entries: LinkedHashMap<String, FileSetEntry>,
}

impl FileSet {
    /// An empty literal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry, builder style.
    #[must_use]
    pub fn entry(mut self, path: impl Into<String>, entry: impl Into<FileSetEntry>) -> Self {
        self.insert(path, entry);
        self
    }

    /// Adds an entry in place.
    pub fn insert(&mut self, path: impl Into<String>, entry: impl Into<FileSetEntry>) {
        self.entries.insert(path.into(), entry.into());
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FileSetEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl fmt::Debug for FileSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(k, v)| (k, v.tag())))
            .finish()
    }
}

/// One value in a [`FileSet`] literal.
#[derive(Clone)]
pub enum FileSetEntry {
    /// A directory with nested entries.
    Directory {
        /// Entries created beneath this directory.
        files: FileSet,
        /// Metadata attached to the directory's inode.
        meta: Vec<(String, Value)>,
    },
    /// A regular file.
    File {
        /// The file's bytes.
        data: Bytes,
        /// Metadata attached to the file's inode.
        meta: Vec<(String, Value)>,
    },
    /// A hard link to an existing path, applied after all content
    /// exists. The path is resolved against the link's own directory.
    Link {
        /// Path of the inode to attach.
        path: String,
    },
    /// A symbolic link, applied after all content exists.
    Symlink {
        /// The stored link text.
        target: String,
        /// Metadata attached to the symlink's inode.
        meta: Vec<(String, Value)>,
    },
    /// A lazily expanded external source, applied after all content
    /// exists.
    Mount {
        /// Absolute path within the resolver's namespace.
        source: String,
        /// The resolver producing children and file bytes.
        resolver: Rc<dyn FileSystemResolver>,
        /// Metadata attached to the mount directory's inode.
        meta: Vec<(String, Value)>,
    },
    /// Removes whatever is at the path, recursively; missing targets are
    /// fine.
    Rimraf,
}

impl FileSetEntry {
    /// A file entry from anything byte-like.
    pub fn file(data: impl AsRef<[u8]>) -> Self {
        Self::File {
            data: Bytes::copy_from_slice(data.as_ref()),
            meta: Vec::new(),
        }
    }

    /// A directory entry with nested contents.
    #[must_use]
    pub fn directory(files: FileSet) -> Self {
        Self::Directory {
            files,
            meta: Vec::new(),
        }
    }

    /// A hard-link entry.
    pub fn link(path: impl Into<String>) -> Self {
        Self::Link { path: path.into() }
    }

    /// A symbolic-link entry.
    pub fn symlink(target: impl Into<String>) -> Self {
        Self::Symlink {
            target: target.into(),
            meta: Vec::new(),
        }
    }

    /// A mount entry.
    pub fn mount(source: impl Into<String>, resolver: Rc<dyn FileSystemResolver>) -> Self {
        Self::Mount {
            source: source.into(),
            resolver,
            meta: Vec::new(),
        }
    }

    /// Attaches a metadata entry where the variant supports one.
    #[must_use]
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        match &mut self {
            Self::Directory { meta, .. }
            | Self::File { meta, .. }
            | Self::Symlink { meta, .. }
            | Self::Mount { meta, .. } => meta.push((key.into(), value.into())),
            Self::Link { .. } | Self::Rimraf => {}
        }
        self
    }

    fn tag(&self) -> &'static str {
        match self {
            Self::Directory { .. } => "directory",
            Self::File { .. } => "file",
            Self::Link { .. } => "link",
            Self::Symlink { .. } => "symlink",
            Self::Mount { .. } => "mount",
            Self::Rimraf => "rimraf",
        }
    }
}

impl From<&str> for FileSetEntry {
    fn from(data: &str) -> Self {
        Self::file(data)
    }
}

impl From<String> for FileSetEntry {
    fn from(data: String) -> Self {
        Self::File {
            data: Bytes::from(data),
            meta: Vec::new(),
        }
    }
}

impl From<&[u8]> for FileSetEntry {
    fn from(data: &[u8]) -> Self {
        Self::file(data)
    }
}

impl From<Vec<u8>> for FileSetEntry {
    fn from(data: Vec<u8>) -> Self {
        Self::File {
            data: Bytes::from(data),
            meta: Vec::new(),
        }
    }
}

impl From<Bytes> for FileSetEntry {
    fn from(data: Bytes) -> Self {
        Self::File {
            data,
            meta: Vec::new(),
        }
    }
}

impl From<FileSet> for FileSetEntry {
    fn from(files: FileSet) -> Self {
        Self::directory(files)
    }
}

enum Deferred {
    Link {
        source: String,
    },
    Symlink {
        target: String,
        meta: Vec<(String, Value)>,
    },
    Mount {
        source: String,
        resolver: Rc<dyn FileSystemResolver>,
        meta: Vec<(String, Value)>,
    },
}

impl FileSystem {
    /// Populates the filesystem from `files`.
    ///
    /// Directories and file content are created in a first pass; hard
    /// links, symbolic links, and mounts are applied in a second pass in
    /// discovery order, so their targets are resolvable regardless of
    /// where they appear in the literal.
    ///
    /// # Panics
    ///
    /// Panics when a root is given a file, hard link, symbolic link, or
    /// deletion. Those shapes are bugs in the literal, not runtime
    /// conditions, and are never reported as an [`IoError`].
    pub fn apply(&self, files: &FileSet) -> Result<()> {
        let base = self.base_dir();
        self.apply_base(files, base)
    }

    pub(crate) fn apply_base(&self, files: &FileSet, base: String) -> Result<()> {
        if self.is_readonly() {
            return Err(IoError::new(ErrorCode::EROFS));
        }
        let mut deferred = Vec::new();
        self.apply_worker(files, None, &mut deferred)?;
        for (path, op) in deferred {
            let parent = path::dirname(&path);
            self.mkdirp_sync(&parent)?;
            match op {
                Deferred::Link { source } => {
                    assert!(parent != path, "Roots cannot be hard links.");
                    let source = path::resolve(&parent, &source);
                    self.link_sync(&source, &path)?;
                }
                Deferred::Symlink { target, meta } => {
                    assert!(parent != path, "Roots cannot be symbolic links.");
                    let target = path::resolve(&base, &target);
                    self.symlink_sync(&target, &path)?;
                    self.apply_meta(&path, &meta)?;
                }
                Deferred::Mount {
                    source,
                    resolver,
                    meta,
                } => {
                    self.mount_sync(&source, &path, resolver)?;
                    self.apply_meta(&path, &meta)?;
                }
            }
        }
        Ok(())
    }

    fn apply_worker(
        &self,
        files: &FileSet,
        dirname: Option<&str>,
        deferred: &mut Vec<(String, Deferred)>,
    ) -> Result<()> {
        for (key, value) in files.iter() {
            let resolved = match dirname {
                Some(d) => path::resolve(d, key),
                None => self.resolve_in(key)?,
            };
            let resolved = path::validate(&resolved, ValidationFlags::ABSOLUTE)?;
            match value {
                FileSetEntry::Rimraf => {
                    assert!(
                        path::dirname(&resolved) != resolved,
                        "Roots cannot be deleted."
                    );
                    self.rimraf_sync(&resolved)?;
                }
                FileSetEntry::File { data, meta } => {
                    assert!(
                        path::dirname(&resolved) != resolved,
                        "Roots cannot be files."
                    );
                    self.mkdirp_sync(&path::dirname(&resolved))?;
                    self.write_file_sync(&resolved, data)?;
                    self.apply_meta(&resolved, meta)?;
                }
                FileSetEntry::Directory { files, meta } => {
                    self.mkdirp_sync(&resolved)?;
                    self.apply_meta(&resolved, meta)?;
                    self.apply_worker(files, Some(&resolved), deferred)?;
                }
                FileSetEntry::Link { path } => {
                    deferred.push((resolved, Deferred::Link { source: path.clone() }));
                }
                FileSetEntry::Symlink { target, meta } => {
                    deferred.push((
                        resolved,
                        Deferred::Symlink {
                            target: target.clone(),
                            meta: meta.clone(),
                        },
                    ));
                }
                FileSetEntry::Mount {
                    source,
                    resolver,
                    meta,
                } => {
                    deferred.push((
                        resolved,
                        Deferred::Mount {
                            source: source.clone(),
                            resolver: Rc::clone(resolver),
                            meta: meta.clone(),
                        },
                    ));
                }
            }
        }
        Ok(())
    }

    fn apply_meta(&self, path: &str, meta: &[(String, Value)]) -> Result<()> {
        if meta.is_empty() {
            return Ok(());
        }
        let map = self.filemeta(path)?;
        for (key, value) in meta {
            map.set(key.clone(), value.clone());
        }
        Ok(())
    }
}
