//! Read-only stat snapshots.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::constants::{
    S_IFBLK, S_IFCHR, S_IFDIR, S_IFIFO, S_IFLNK, S_IFMT, S_IFREG, S_IFSOCK,
};

/// Snapshot of an inode's attributes at the time of a `stat` call.
///
/// `uid`, `gid`, and `rdev` are always zero, `blksize` is 4096 and
/// `blocks` zero — the filesystem stores modes but does not model
/// ownership or block allocation. Timestamps are milliseconds since the
/// Unix epoch; the method accessors convert to [`SystemTime`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    /// Device id of the filesystem root this inode belongs to.
    pub dev: u64,
    /// Inode number, globally monotonic.
    pub ino: u64,
    /// Permission bits plus the file-type field.
    pub mode: u32,
    /// Number of directory entries referring to this inode.
    pub nlink: u64,
    /// Always 0.
    pub uid: u32,
    /// Always 0.
    pub gid: u32,
    /// Always 0.
    pub rdev: u64,
    /// File size in bytes; symlink target length; 0 for directories.
    pub size: u64,
    /// Always 4096.
    pub blksize: u32,
    /// Always 0.
    pub blocks: u64,
    /// Access time in milliseconds.
    pub atime_ms: i64,
    /// Modification time in milliseconds.
    pub mtime_ms: i64,
    /// Change time in milliseconds.
    pub ctime_ms: i64,
    /// Creation time in milliseconds.
    pub birthtime_ms: i64,
}

impl Stats {
    /// Access time.
    #[must_use]
    pub fn atime(&self) -> SystemTime {
        ms_to_system_time(self.atime_ms)
    }

    /// Modification time.
    #[must_use]
    pub fn mtime(&self) -> SystemTime {
        ms_to_system_time(self.mtime_ms)
    }

    /// Change time.
    #[must_use]
    pub fn ctime(&self) -> SystemTime {
        ms_to_system_time(self.ctime_ms)
    }

    /// Creation time.
    #[must_use]
    pub fn birthtime(&self) -> SystemTime {
        ms_to_system_time(self.birthtime_ms)
    }

    /// Whether this is a regular file.
    #[must_use]
    pub fn is_file(&self) -> bool {
        self.mode & S_IFMT == S_IFREG
    }

    /// Whether this is a directory.
    #[must_use]
    pub fn is_directory(&self) -> bool {
        self.mode & S_IFMT == S_IFDIR
    }

    /// Whether this is a symbolic link.
    #[must_use]
    pub fn is_symbolic_link(&self) -> bool {
        self.mode & S_IFMT == S_IFLNK
    }

    /// Whether this is a block device.
    #[must_use]
    pub fn is_block_device(&self) -> bool {
        self.mode & S_IFMT == S_IFBLK
    }

    /// Whether this is a character device.
    #[must_use]
    pub fn is_character_device(&self) -> bool {
        self.mode & S_IFMT == S_IFCHR
    }

    /// Whether this is a FIFO.
    #[must_use]
    pub fn is_fifo(&self) -> bool {
        self.mode & S_IFMT == S_IFIFO
    }

    /// Whether this is a socket.
    #[must_use]
    pub fn is_socket(&self) -> bool {
        self.mode & S_IFMT == S_IFSOCK
    }
}

#[expect(
    clippy::cast_sign_loss,
    reason = "the sign is matched on before each cast"
)]
fn ms_to_system_time(ms: i64) -> SystemTime {
    if ms >= 0 {
        UNIX_EPOCH + Duration::from_millis(ms as u64)
    } else {
        UNIX_EPOCH - Duration::from_millis((-ms) as u64)
    }
}
