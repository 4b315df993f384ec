//! Path algebra for the virtual filesystem.
//!
//! Paths are plain strings with `/` separators (backslashes are folded to
//! `/` on entry). A path either is relative or carries a root: the posix
//! root `/` or a DOS drive root (`c:/`, `c:`). Parsing collapses `.` and
//! `..` textually; `..` never climbs past a root.

use std::cmp::Ordering;

use bitflags::bitflags;

use crate::error::{ErrorCode, IoError, Result};

/// The canonical separator.
pub const SEP: char = '/';

bitflags! {
    /// Constraints applied by [`validate`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ValidationFlags: u32 {
        /// The path must carry a root.
        const ABSOLUTE = 1 << 0;
        /// The path must not carry a root.
        const RELATIVE = 1 << 1;
        /// Either form is accepted.
        const RELATIVE_OR_ABSOLUTE = Self::ABSOLUTE.bits() | Self::RELATIVE.bits();
    }
}

fn normalize_separators(path: &str) -> String {
    path.replace('\\', "/")
}

/// Length in bytes of the root component, or 0 for a relative path.
fn root_length(path: &str) -> usize {
    let bytes = path.as_bytes();
    if bytes.first() == Some(&b'/') {
        return 1;
    }
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        return if bytes.get(2) == Some(&b'/') { 3 } else { 2 };
    }
    0
}

/// Whether `path` carries a root.
#[must_use]
pub fn is_absolute(path: &str) -> bool {
    root_length(path) > 0
}

/// Whether `path` is exactly a root (`/`, `c:/`, `c:`).
#[must_use]
pub fn is_root(path: &str) -> bool {
    let len = root_length(path);
    len > 0 && len == path.len()
}

/// Splits `path` into its root (empty for a relative path) followed by
/// its names, with `.` and `..` collapsed.
///
/// `..` at a root is clamped there; a relative path keeps leading `..`
/// components so that later resolution can still climb.
#[must_use]
pub fn parse(path: &str) -> Vec<String> {
    let path = normalize_separators(path);
    let root_len = root_length(&path);
    let mut components = vec![path[..root_len].to_string()];
    for name in path[root_len..].split(SEP) {
        match name {
            "" | "." => {}
            ".." => match components.last().map(String::as_str) {
                Some("..") => components.push("..".to_string()),
                _ if components.len() > 1 => {
                    components.pop();
                }
                _ if root_len == 0 => components.push("..".to_string()),
                _ => {}
            },
            _ => components.push(name.to_string()),
        }
    }
    components
}

/// Reassembles components produced by [`parse`].
#[must_use]
pub fn format(components: &[String]) -> String {
    match components.split_first() {
        None => String::new(),
        Some((root, names)) => format!("{root}{}", names.join("/")),
    }
}

/// [`parse`] followed by [`format`]: separators unified, `.`/`..`
/// collapsed, trailing separators removed.
#[must_use]
pub fn normalize(path: &str) -> String {
    format(&parse(path))
}

/// Joins `name` onto `path`. An absolute `name` wins outright.
#[must_use]
pub fn combine(path: &str, name: &str) -> String {
    if name.is_empty() {
        return path.to_string();
    }
    if path.is_empty() || is_absolute(name) {
        return name.to_string();
    }
    if path.ends_with(SEP) {
        format!("{path}{name}")
    } else {
        format!("{path}/{name}")
    }
}

/// Joins `path` onto `base` and normalizes the result.
#[must_use]
pub fn resolve(base: &str, path: &str) -> String {
    normalize(&combine(base, path))
}

/// The directory portion of `path`. The dirname of a root is the root
/// itself; the dirname of a bare name is the empty string.
#[must_use]
pub fn dirname(path: &str) -> String {
    let mut components = parse(path);
    if components.len() <= 1 {
        return components.pop().unwrap_or_default();
    }
    components.pop();
    format(&components)
}

/// The final name of `path`, or the empty string for a root.
#[must_use]
pub fn basename(path: &str) -> String {
    let mut components = parse(path);
    if components.len() <= 1 {
        return String::new();
    }
    components.pop().unwrap_or_default()
}

/// Appends a separator unless one is already present.
#[must_use]
pub fn add_trailing_separator(path: &str) -> String {
    if path.is_empty() || path.ends_with(SEP) {
        path.to_string()
    } else {
        format!("{path}/")
    }
}

/// Checks `path` against `flags` and returns it with separators unified
/// and trailing separators trimmed back to the root.
///
/// Fails `EINVAL` for an empty path or an absoluteness mismatch. Unlike
/// [`normalize`], the component text is kept verbatim — symlink targets
/// pass through here and must round-trip exactly.
pub fn validate(path: &str, flags: ValidationFlags) -> Result<String> {
    if path.is_empty() {
        return Err(IoError::new(ErrorCode::EINVAL));
    }
    let mut path = normalize_separators(path);
    let root_len = root_length(&path);
    let required = if root_len > 0 {
        ValidationFlags::ABSOLUTE
    } else {
        ValidationFlags::RELATIVE
    };
    if !flags.contains(required) {
        return Err(IoError::with_path(ErrorCode::EINVAL, path));
    }
    while path.len() > root_len.max(1) && path.ends_with(SEP) {
        path.pop();
    }
    Ok(path)
}

/// Byte-order comparison, the case-sensitive comparator.
#[must_use]
pub fn compare_case_sensitive(a: &str, b: &str) -> Ordering {
    a.cmp(b)
}

/// Locale-independent ASCII-folded comparison, the case-insensitive
/// comparator.
#[must_use]
pub fn compare_case_insensitive(a: &str, b: &str) -> Ordering {
    a.bytes()
        .map(|b| b.to_ascii_lowercase())
        .cmp(b.bytes().map(|b| b.to_ascii_lowercase()))
}
