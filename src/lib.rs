//! An in-memory, POSIX-semantics virtual file system with a configurable
//! clock.
//!
//! `shadowfs` is a deterministic test substrate: it behaves like a
//! hierarchical file system with inodes, directories, regular files,
//! hard links, symbolic links, and mounted external sources, but stores
//! everything in process memory. Two features make it cheap to reuse
//! across tests:
//!
//! - **Shadow layering.** A frozen filesystem can be forked with
//!   [`FileSystem::shadow`]; the fork materializes inodes copy-on-read
//!   and never writes back, so one expensive fixture serves many
//!   mutating tests.
//! - **Lazy mounts.** A directory can be backed by a
//!   [`FileSystemResolver`]; children and file bytes are pulled on first
//!   access and never again.
//!
//! ```
//! use shadowfs::{Clock, FileSystem, FileSystemOptions};
//!
//! let fs = FileSystem::new(FileSystemOptions {
//!     cwd: Some("/".to_string()),
//!     time: Some(Clock::Fixed(0)),
//!     ..Default::default()
//! })?;
//! fs.mkdir_sync("/a")?;
//! fs.write_file_sync("/a/b.txt", "hi")?;
//! assert_eq!(fs.read_file_string("/a/b.txt")?, "hi");
//! assert_eq!(fs.readdir_sync("/a")?, ["b.txt"]);
//! # Ok::<(), shadowfs::IoError>(())
//! ```
//!
//! Everything is synchronous and single-threaded: operations complete
//! before the next begins, `readdir` order is the comparator order, and
//! with a fixed clock an identical mutation sequence produces an
//! identical filesystem.

pub mod apply;
pub mod clock;
pub mod constants;
pub mod error;
pub mod fs;
pub mod meta;
mod names;
mod node;
pub mod path;
pub mod resolver;
pub mod scan;
pub mod stats;

pub use apply::{FileSet, FileSetEntry};
pub use clock::Clock;
pub use error::{ErrorCode, IoError, Result};
pub use fs::{FileSystem, FileSystemOptions};
pub use meta::Metadata;
pub use resolver::{FileSystemResolver, ResolverStats};
pub use scan::{Axis, Traversal};
pub use stats::Stats;
