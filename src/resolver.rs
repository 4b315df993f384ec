//! External content sources for mounted directories.

use bytes::Bytes;

use crate::error::Result;

/// Attributes a resolver reports for one of its paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolverStats {
    /// Permission bits plus the file-type field; the type bits decide
    /// whether a child materializes as a directory or a regular file.
    pub mode: u32,
    /// Size in bytes, recorded on file inodes before their content is
    /// loaded.
    pub size: u64,
}

/// A synchronous source of externally stored files and directories.
///
/// A mounted directory holds a `(source, resolver)` pair; child entries
/// and file bytes are pulled through these methods on first access and
/// never again. Implementations must not call back into the filesystem
/// the mount lives in.
pub trait FileSystemResolver {
    /// Attributes of `path`.
    fn stat_sync(&self, path: &str) -> Result<ResolverStats>;

    /// Child names of the directory at `path`.
    fn readdir_sync(&self, path: &str) -> Result<Vec<String>>;

    /// Contents of the file at `path`.
    fn read_file_sync(&self, path: &str) -> Result<Bytes>;
}
