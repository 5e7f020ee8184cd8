//! Path remapping between a source root and a destination root
//!
//! Provides [`RemapRule`] for translating server-relative paths from one
//! site hierarchy into another, including promotion of a nested child to a
//! new top-level root ("flattening").
//!
//! # Examples
//! - `/sites/Teams/Audit/MAPS/Docs` under `/sites/Teams/Audit/MAPS` → `/sites/MAPS/Docs`
//! - `https://host/sites/A/x` under `/sites/A` → `/sites/B/x`

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Path separator for server-relative paths
pub const SEPARATOR: char = '/';

/// Strip any `scheme://host` prefix, leaving the server-relative part.
///
/// A bare host (`https://host`) yields an empty string.
#[must_use]
pub fn strip_host(url: &str) -> &str {
    match url.find("://") {
        Some(idx) => {
            let after_scheme = &url[idx + 3..];
            after_scheme
                .find(SEPARATOR)
                .map_or("", |slash| &after_scheme[slash..])
        }
        None => url,
    }
}

/// Host-stripped path with trailing separators removed.
///
/// The tenant root (`/`) trims to the empty string.
#[inline]
#[must_use]
pub fn trimmed(url: &str) -> &str {
    strip_host(url).trim_end_matches(SEPARATOR)
}

/// Canonical display form of a path: host-stripped, no trailing separator,
/// and `/` for the tenant root.
#[must_use]
pub fn normalize(url: &str) -> String {
    display(trimmed(url))
}

fn display(path: &str) -> String {
    if path.is_empty() {
        SEPARATOR.to_string()
    } else {
        path.to_string()
    }
}

/// Result of remapping one path
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Remapped {
    /// Path was inside the source subtree and now points into the destination
    Mapped(String),
    /// Path was outside the source subtree and is returned unchanged
    Unmapped(String),
}

impl Remapped {
    /// Mapped path, or `None` when unmapped
    #[inline]
    #[must_use]
    pub fn mapped(self) -> Option<String> {
        match self {
            Self::Mapped(p) => Some(p),
            Self::Unmapped(_) => None,
        }
    }
}

/// Translate `path` from under `source_root` to under `dest_root`.
///
/// Paths outside the source subtree come back as [`Remapped::Unmapped`]; the
/// caller decides whether that is worth a warning.
#[must_use]
pub fn remap(path: &str, source_root: &str, dest_root: &str) -> Remapped {
    let path = trimmed(path);
    let source = trimmed(source_root);
    let dest = trimmed(dest_root);

    if path == source {
        return Remapped::Mapped(display(dest));
    }

    match path.strip_prefix(source) {
        Some(rest) if rest.starts_with(SEPARATOR) => Remapped::Mapped(format!("{dest}{rest}")),
        _ => Remapped::Unmapped(display(path)),
    }
}

/// A fixed (source root, destination root) pair
///
/// Roots are stored in canonical form, so trailing-slash and host variants
/// of the same root produce equal rules.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemapRule {
    source_root: String,
    dest_root: String,
}

impl RemapRule {
    /// Create a rule from two roots (URLs or server-relative paths)
    #[must_use]
    pub fn new(source_root: &str, dest_root: &str) -> Self {
        Self {
            source_root: normalize(source_root),
            dest_root: normalize(dest_root),
        }
    }

    /// Source root in canonical form
    #[inline]
    #[must_use]
    pub fn source_root(&self) -> &str {
        &self.source_root
    }

    /// Destination root in canonical form
    #[inline]
    #[must_use]
    pub fn dest_root(&self) -> &str {
        &self.dest_root
    }

    /// Apply the rule to a path
    #[inline]
    #[must_use]
    pub fn remap(&self, path: &str) -> Remapped {
        remap(path, &self.source_root, &self.dest_root)
    }
}

impl Display for RemapRule {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source_root, self.dest_root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn strip_host_variants() {
        assert_eq!(strip_host("https://contoso.example.com/sites/A"), "/sites/A");
        assert_eq!(strip_host("https://contoso.example.com"), "");
        assert_eq!(strip_host("/sites/A"), "/sites/A");
    }

    #[test]
    fn remap_root_itself() {
        assert_eq!(
            remap("/sites/A", "/sites/A", "/sites/B"),
            Remapped::Mapped("/sites/B".to_string())
        );
    }

    #[test]
    fn remap_flattened_child() {
        let out = remap(
            "/sites/Teams/Audit/NPSG/MAPS/ProjectA",
            "/sites/Teams/Audit/NPSG/MAPS",
            "/sites/MAPS",
        );
        assert_eq!(out, Remapped::Mapped("/sites/MAPS/ProjectA".to_string()));
    }

    #[test]
    fn remap_ignores_sibling_with_shared_prefix() {
        let out = remap("/sites/AB/x", "/sites/A", "/sites/B");
        assert_eq!(out, Remapped::Unmapped("/sites/AB/x".to_string()));
    }

    #[test]
    fn remap_strips_hosts_on_all_inputs() {
        let out = remap(
            "https://tenant.example.com/sites/A/Lists/Tasks/",
            "https://tenant.example.com/sites/A/",
            "https://other.example.com/sites/B",
        );
        assert_eq!(out, Remapped::Mapped("/sites/B/Lists/Tasks".to_string()));
    }

    #[test]
    fn remap_from_tenant_root() {
        let out = remap("/sites/A", "/", "/archive");
        assert_eq!(out, Remapped::Mapped("/archive/sites/A".to_string()));
    }

    #[test]
    fn rule_normalizes_roots() {
        let a = RemapRule::new("https://h/sites/A/", "/sites/B//");
        let b = RemapRule::new("/sites/A", "/sites/B");
        assert_eq!(a, b);
        assert_eq!(a.remap("/sites/A/Docs").mapped(), Some("/sites/B/Docs".to_string()));
        assert_eq!(a.remap("/sites/C").mapped(), None);
    }

    fn segment() -> impl Strategy<Value = String> {
        "[A-Za-z0-9_ ]{1,8}"
    }

    fn root() -> impl Strategy<Value = String> {
        prop::collection::vec(segment(), 1..4).prop_map(|segs| format!("/{}", segs.join("/")))
    }

    proptest! {
        #[test]
        fn prop_root_maps_to_dest(a in root(), b in root()) {
            prop_assert_eq!(remap(&a, &a, &b), Remapped::Mapped(b.clone()));
        }

        #[test]
        fn prop_child_keeps_suffix(a in root(), b in root(), x in segment()) {
            let child = format!("{a}/{x}");
            prop_assert_eq!(remap(&child, &a, &b), Remapped::Mapped(format!("{b}/{x}")));
        }

        #[test]
        fn prop_trailing_slashes_do_not_matter(
            a in root(),
            b in root(),
            x in segment(),
            pad_a in 0usize..3,
            pad_b in 0usize..3,
        ) {
            let child = format!("{a}/{x}");
            let a_slashed = format!("{a}{}", "/".repeat(pad_a));
            let b_slashed = format!("{b}{}", "/".repeat(pad_b));
            prop_assert_eq!(remap(&child, &a_slashed, &b_slashed), remap(&child, &a, &b));
        }
    }
}
