//! Identifier derivation and materialized path construction.
//!
//! # Responsibility
//! - Derive deterministic container ids from creation attributes.
//! - Build and match separator-delimited materialized paths.
//!
//! # Invariants
//! - Ids are 64 lowercase hex chars, so they never contain [`PATH_SEPARATOR`].
//! - A child path is always `parent_path + PATH_SEPARATOR + child_id`.
//! - Subtree membership is `path == prefix || path.starts_with(prefix + SEP)`,
//!   never a bare string prefix.

use crate::model::container::ContainerId;
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Separator between path segments. Disjoint from the hex id alphabet.
pub const PATH_SEPARATOR: char = '$';

/// Successor of [`PATH_SEPARATOR`] in byte order.
const SUBTREE_BOUND: char = '%';

static LAST_CREATION_NS: AtomicI64 = AtomicI64::new(0);

static CONTAINER_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9a-f]{64}$").expect("valid container id regex"));

/// Ordered creation attributes fingerprinted into a container id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreationAttrs<'a> {
    pub name: &'a str,
    /// Empty for a root container.
    pub parent_id: &'a str,
    pub owner: &'a str,
    /// Epoch nanoseconds; must be captured fresh for every attempt.
    pub timestamp_ns: i64,
}

/// Derives a container id: SHA-256 over length-prefixed ordered attributes.
///
/// Pure: the same attributes always yield the same id.
pub fn derive_id(attrs: &CreationAttrs<'_>) -> ContainerId {
    let mut hasher = Sha256::new();
    for field in [attrs.name, attrs.parent_id, attrs.owner] {
        hasher.update((field.len() as u64).to_be_bytes());
        hasher.update(field.as_bytes());
    }
    hasher.update(attrs.timestamp_ns.to_be_bytes());
    format!("{:x}", hasher.finalize())
}

/// Returns `parent_path + SEP + id`, or just `id` for a root.
pub fn build_path(parent_path: Option<&str>, id: &str) -> String {
    match parent_path {
        Some(parent_path) => format!("{parent_path}{PATH_SEPARATOR}{id}"),
        None => id.to_string(),
    }
}

/// Exclusive upper bound of the subtree key range `[path, bound)`.
///
/// `%` sorts right after `$` and below every hex digit, so the range holds
/// `path` itself and exactly the paths that continue with `$`. Lets SQLite
/// answer subtree queries with a range search on the path index.
pub fn subtree_upper_bound(path: &str) -> String {
    format!("{path}{SUBTREE_BOUND}")
}

/// Returns whether `candidate` is `root_path` itself or lies beneath it.
pub fn is_in_subtree(root_path: &str, candidate: &str) -> bool {
    candidate == root_path
        || candidate
            .strip_prefix(root_path)
            .is_some_and(|rest| rest.starts_with(PATH_SEPARATOR))
}

/// Returns whether `value` has the shape of a derived container id.
pub fn is_valid_container_id(value: &str) -> bool {
    CONTAINER_ID_RE.is_match(value)
}

/// Current time in epoch nanoseconds.
pub fn now_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos() as i64)
        .unwrap_or_default()
}

/// Returns a creation timestamp strictly greater than any handed out before
/// in this process, so coarse clocks never repeat an id input.
pub fn next_creation_timestamp() -> i64 {
    let now = now_nanos();
    let previous = LAST_CREATION_NS
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
            Some(now.max(last + 1))
        })
        .unwrap_or(now);
    now.max(previous + 1)
}
