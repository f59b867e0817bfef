//! # Version Gate
//!
//! Decides whether a cached module satisfies a requested version. This is
//! the single check that prevents redundant reloads while still catching
//! same-version content changes.

use std::cmp::Ordering;
use std::fmt;

/// `major.minor.patch`, with any pre-release or build suffix ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SemVer {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl SemVer {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse `"1.2.3"`, `"v1.2.3"` or `"1.2.3-beta.1+build"`.
    ///
    /// Returns `None` for anything without exactly three numeric parts.
    pub fn parse(input: &str) -> Option<Self> {
        let trimmed = input.trim();
        let trimmed = trimmed
            .strip_prefix('v')
            .or_else(|| trimmed.strip_prefix('V'))
            .unwrap_or(trimmed);
        let core = trimmed
            .split(|c: char| c == '-' || c == '+')
            .next()
            .unwrap_or_default();

        let mut parts = core.split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next()?.parse().ok()?;
        let patch = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self::new(major, minor, patch))
    }
}

impl fmt::Display for SemVer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Whether a cached `(version, hash)` must be replaced to satisfy a request.
///
/// - requested version newer than cached ⇒ `true`
/// - requested version older ⇒ `false`
/// - equal versions ⇒ `true` only if both hashes are present and differ
/// - either version malformed ⇒ raw string inequality, then the hash rule
pub fn needs_update(
    cached_version: &str,
    cached_hash: Option<&str>,
    requested_version: &str,
    requested_hash: Option<&str>,
) -> bool {
    let ordering = match (SemVer::parse(requested_version), SemVer::parse(cached_version)) {
        (Some(requested), Some(cached)) => requested.cmp(&cached),
        _ if requested_version != cached_version => return true,
        _ => Ordering::Equal,
    };

    match ordering {
        Ordering::Greater => true,
        Ordering::Less => false,
        Ordering::Equal => matches!(
            (cached_hash, requested_hash),
            (Some(cached), Some(requested)) if cached != requested
        ),
    }
}

/// Major-version compatibility of two schema tags.
pub fn same_major(stored: &str, running: &str) -> bool {
    match (SemVer::parse(stored), SemVer::parse(running)) {
        (Some(a), Some(b)) => a.major == b.major,
        _ => stored == running,
    }
}
