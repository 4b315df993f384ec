//! The error type shared by every filesystem operation.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, IoError>;

/// POSIX-style error codes.
///
/// Every runtime failure carries exactly one of these; callers are
/// expected to match on the code, never on message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[expect(
    clippy::upper_case_acronyms,
    reason = "errno spellings are canonical"
)]
pub enum ErrorCode {
    /// Access denied.
    #[error("access denied")]
    EACCES,
    /// Input/output error.
    #[error("input/output error")]
    EIO,
    /// No such file or directory.
    #[error("no such file or directory")]
    ENOENT,
    /// File already exists.
    #[error("file already exists")]
    EEXIST,
    /// Too many levels of symbolic links.
    #[error("too many levels of symbolic links")]
    ELOOP,
    /// Not a directory.
    #[error("not a directory")]
    ENOTDIR,
    /// Is a directory.
    #[error("is a directory")]
    EISDIR,
    /// Bad file descriptor.
    #[error("bad file descriptor")]
    EBADF,
    /// Invalid argument.
    #[error("invalid argument")]
    EINVAL,
    /// Directory not empty.
    #[error("directory not empty")]
    ENOTEMPTY,
    /// Operation not permitted.
    #[error("operation not permitted")]
    EPERM,
    /// Read-only file system.
    #[error("read-only file system")]
    EROFS,
}

/// Error raised by filesystem operations.
///
/// The message is derived from [`code`](Self::code); `path` is best-effort
/// context and carries no semantic weight.
#[derive(Debug, Clone)]
pub struct IoError {
    /// The code identifying the failure.
    pub code: ErrorCode,
    /// The path the failing operation was resolving, when known.
    pub path: Option<String>,
}

impl IoError {
    /// An error with no path context.
    #[must_use]
    pub fn new(code: ErrorCode) -> Self {
        Self { code, path: None }
    }

    /// An error annotated with the path being resolved.
    #[must_use]
    pub fn with_path(code: ErrorCode, path: impl Into<String>) -> Self {
        Self {
            code,
            path: Some(path.into()),
        }
    }
}

impl From<ErrorCode> for IoError {
    fn from(code: ErrorCode) -> Self {
        Self::new(code)
    }
}

impl std::fmt::Display for IoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.code, self.code)?;
        if let Some(path) = &self.path {
            write!(f, " '{path}'")?;
        }
        Ok(())
    }
}

impl std::error::Error for IoError {}
