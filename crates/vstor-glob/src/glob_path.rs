//! Path-aware glob patterns with globstar (`**`) support.
//!
//! A `GlobPath` splits a pattern on `/` and matches it component by
//! component against a path:
//!
//! - `/src/**/*.rs` matches `/src/a.rs` and `/src/x/y/a.rs`
//! - `/src/**` matches `/src` itself and everything beneath it
//! - `/a/**/z` matches `/a/z` and `/a/b/c/z`
//!
//! Wildcards never match a leading `.` in a component unless dot-matching
//! is requested or the pattern component itself starts with a dot.

use std::path::{Component, Path, PathBuf};

use thiserror::Error;

use crate::pattern::ComponentPattern;

/// Errors when parsing glob patterns.
#[derive(Debug, Clone, Error)]
pub enum PatternError {
    #[error("empty pattern")]
    Empty,
    #[error("invalid pattern: {0}")]
    Invalid(String),
}

/// One `/`-separated piece of a path pattern.
#[derive(Debug, Clone)]
pub enum PathSegment {
    /// Component matched exactly, escapes already removed.
    Literal(String),
    /// Component containing wildcards, classes or braces.
    Pattern(ComponentPattern),
    /// Zero or more whole components.
    Globstar,
}

/// A compiled path pattern.
///
/// ```
/// use std::path::Path;
/// use vstor_glob::GlobPath;
///
/// let pattern = GlobPath::new("/project/**/*.rs").unwrap();
/// assert!(pattern.matches(Path::new("/project/main.rs")));
/// assert!(pattern.matches(Path::new("/project/src/lib/utils.rs")));
/// assert!(!pattern.matches(Path::new("/project/README.md")));
/// ```
#[derive(Debug, Clone)]
pub struct GlobPath {
    source: String,
    segments: Vec<PathSegment>,
    anchored: bool,
}

impl GlobPath {
    /// Parse a pattern. Backslashes are kept as escapes, so callers on
    /// Windows should hand in `/`-separated patterns.
    pub fn new(pattern: &str) -> Result<Self, PatternError> {
        if pattern.is_empty() {
            return Err(PatternError::Empty);
        }
        if pattern.starts_with('!') {
            return Err(PatternError::Invalid(format!(
                "negation belongs to a pattern set: {pattern}"
            )));
        }

        let anchored = pattern.starts_with('/');
        let mut segments = Vec::new();

        for part in pattern.split('/').filter(|p| !p.is_empty()) {
            if part == "**" {
                if !matches!(segments.last(), Some(PathSegment::Globstar)) {
                    segments.push(PathSegment::Globstar);
                }
                continue;
            }
            let compiled = ComponentPattern::new(part);
            match compiled.literal_text() {
                Some(text) => segments.push(PathSegment::Literal(text)),
                None => segments.push(PathSegment::Pattern(compiled)),
            }
        }

        Ok(GlobPath {
            source: pattern.to_string(),
            segments,
            anchored,
        })
    }

    /// The pattern text this was parsed from.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// True if the pattern starts with `/`.
    pub fn is_anchored(&self) -> bool {
        self.anchored
    }

    /// True if every segment is a literal.
    pub fn is_literal(&self) -> bool {
        self.segments
            .iter()
            .all(|s| matches!(s, PathSegment::Literal(_)))
    }

    /// True if the pattern contains `**` anywhere.
    pub fn has_globstar(&self) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, PathSegment::Globstar))
    }

    /// Number of components a match has, if the pattern has no globstar.
    pub fn fixed_depth(&self) -> Option<usize> {
        if self.has_globstar() {
            None
        } else {
            Some(self.segments.len())
        }
    }

    /// The leading literal directories, where a walk should start.
    ///
    /// ```
    /// use std::path::PathBuf;
    /// use vstor_glob::GlobPath;
    ///
    /// let pattern = GlobPath::new("/srv/app/**/*.json").unwrap();
    /// assert_eq!(pattern.static_prefix(), PathBuf::from("/srv/app"));
    /// ```
    pub fn static_prefix(&self) -> PathBuf {
        let mut prefix = if self.anchored {
            PathBuf::from("/")
        } else {
            PathBuf::new()
        };
        for segment in &self.segments {
            match segment {
                PathSegment::Literal(s) => prefix.push(s),
                _ => break,
            }
        }
        prefix
    }

    /// Match with default options (no dot-matching).
    pub fn matches(&self, path: &Path) -> bool {
        self.matches_with(path, false)
    }

    /// Match, optionally letting wildcards match leading dots.
    pub fn matches_with(&self, path: &Path, dot: bool) -> bool {
        if self.anchored && !path.has_root() {
            return false;
        }
        let components = path_components(path);
        let names: Vec<&str> = components.iter().map(String::as_str).collect();
        match_segments(&self.segments, &names, dot)
    }
}

/// Split a path into plain component names, dropping the root marker.
pub(crate) fn path_components(path: &Path) -> Vec<String> {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            Component::Prefix(p) => Some(p.as_os_str().to_string_lossy().into_owned()),
            _ => None,
        })
        .collect()
}

fn match_segments(segments: &[PathSegment], names: &[&str], dot: bool) -> bool {
    let Some((segment, rest)) = segments.split_first() else {
        return names.is_empty();
    };

    match segment {
        PathSegment::Globstar => {
            for skip in 0..=names.len() {
                if match_segments(rest, &names[skip..], dot) {
                    return true;
                }
                // Globstar never descends through hidden components
                if skip < names.len() && !dot && names[skip].starts_with('.') {
                    return false;
                }
            }
            false
        }
        PathSegment::Literal(lit) => match names.split_first() {
            Some((name, tail)) => name == lit && match_segments(rest, tail, dot),
            None => false,
        },
        PathSegment::Pattern(pat) => match names.split_first() {
            Some((name, tail)) => {
                if !dot && name.starts_with('.') && !pat.starts_with_dot() {
                    return false;
                }
                pat.matches(name) && match_segments(rest, tail, dot)
            }
            None => false,
        },
    }
}
