#![allow(dead_code, missing_docs, clippy::unwrap_used)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use bytes::Bytes;

use shadowfs::constants::{S_IFDIR, S_IFREG};
use shadowfs::{
    Clock, ErrorCode, FileSystem, FileSystemOptions, FileSystemResolver, IoError, ResolverStats,
    Result,
};

/// A fresh case-sensitive filesystem rooted at `/` with a fixed clock.
pub fn fresh_fs() -> FileSystem {
    FileSystem::new(FileSystemOptions {
        cwd: Some("/".to_string()),
        time: Some(Clock::Fixed(1_000)),
        ..Default::default()
    })
    .unwrap()
}

/// Like [`fresh_fs`] but comparing names case-insensitively.
pub fn fresh_fs_ignore_case() -> FileSystem {
    FileSystem::new(FileSystemOptions {
        ignore_case: true,
        cwd: Some("/".to_string()),
        time: Some(Clock::Fixed(1_000)),
        ..Default::default()
    })
    .unwrap()
}

/// An in-memory resolver that records every call it receives.
///
/// Build the namespace with [`dir`](Self::dir) and [`file`](Self::file),
/// hand an `Rc` to `mount_sync`, and assert on the recorded call paths
/// afterwards.
#[derive(Default)]
pub struct CountingResolver {
    dirs: HashMap<String, Vec<String>>,
    files: HashMap<String, Bytes>,
    pub stat_calls: RefCell<Vec<String>>,
    pub readdir_calls: RefCell<Vec<String>>,
    pub read_file_calls: RefCell<Vec<String>>,
}

impl CountingResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a directory and its child names.
    pub fn dir(mut self, path: &str, children: &[&str]) -> Self {
        self.dirs.insert(
            path.to_string(),
            children.iter().map(|c| (*c).to_string()).collect(),
        );
        self
    }

    /// Registers a file and its contents.
    pub fn file(mut self, path: &str, data: &[u8]) -> Self {
        self.files
            .insert(path.to_string(), Bytes::copy_from_slice(data));
        self
    }

    pub fn read_file_count(&self, path: &str) -> usize {
        self.read_file_calls
            .borrow()
            .iter()
            .filter(|p| p.as_str() == path)
            .count()
    }
}

impl FileSystemResolver for CountingResolver {
    fn stat_sync(&self, path: &str) -> Result<ResolverStats> {
        self.stat_calls.borrow_mut().push(path.to_string());
        if self.dirs.contains_key(path) {
            return Ok(ResolverStats {
                mode: S_IFDIR | 0o777,
                size: 0,
            });
        }
        if let Some(data) = self.files.get(path) {
            return Ok(ResolverStats {
                mode: S_IFREG | 0o666,
                size: data.len() as u64,
            });
        }
        Err(IoError::with_path(ErrorCode::ENOENT, path))
    }

    fn readdir_sync(&self, path: &str) -> Result<Vec<String>> {
        self.readdir_calls.borrow_mut().push(path.to_string());
        self.dirs
            .get(path)
            .cloned()
            .ok_or_else(|| IoError::with_path(ErrorCode::ENOENT, path))
    }

    fn read_file_sync(&self, path: &str) -> Result<Bytes> {
        self.read_file_calls.borrow_mut().push(path.to_string());
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| IoError::with_path(ErrorCode::ENOENT, path))
    }
}

/// Shorthand for asserting on an operation's error code.
pub fn code_of<T: std::fmt::Debug>(result: Result<T>) -> ErrorCode {
    result.unwrap_err().code
}

/// Wraps a populated, frozen filesystem in an `Rc` ready for shadowing.
pub fn frozen(fs: FileSystem) -> Rc<FileSystem> {
    fs.make_readonly();
    Rc::new(fs)
}
