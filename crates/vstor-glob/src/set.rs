//! Ordered multi-pattern matching with `!` negation.
//!
//! Patterns are applied in order: a positive pattern that matches selects
//! the path, a later negated pattern that matches deselects it again.
//! A set with no positive patterns matches nothing.

use std::path::Path;

use crate::glob_path::{GlobPath, PatternError};

#[derive(Debug, Clone)]
struct SetEntry {
    negated: bool,
    glob: GlobPath,
}

/// A compiled list of patterns, tested together.
///
/// ```
/// use std::path::Path;
/// use vstor_glob::PatternSet;
///
/// let set = PatternSet::new(["/tpl/**", "!/tpl/**/*.bak"]).unwrap();
/// assert!(set.matches(Path::new("/tpl/index.html")));
/// assert!(!set.matches(Path::new("/tpl/old/index.bak")));
/// ```
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    entries: Vec<SetEntry>,
    dot: bool,
}

impl PatternSet {
    pub fn new<I, S>(patterns: I) -> Result<Self, PatternError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = PatternSet::default();
        for pattern in patterns {
            set.push(pattern.as_ref())?;
        }
        Ok(set)
    }

    /// Let wildcards match components that start with `.`.
    pub fn with_dot(mut self, dot: bool) -> Self {
        self.dot = dot;
        self
    }

    /// Append a pattern. A leading `!` makes it an exclusion.
    pub fn push(&mut self, pattern: &str) -> Result<(), PatternError> {
        let (negated, body) = match pattern.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, pattern),
        };
        self.entries.push(SetEntry {
            negated,
            glob: GlobPath::new(body)?,
        });
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dot(&self) -> bool {
        self.dot
    }

    /// The non-negated patterns, in insertion order.
    pub fn positives(&self) -> impl Iterator<Item = &GlobPath> {
        self.entries.iter().filter(|e| !e.negated).map(|e| &e.glob)
    }

    pub fn matches(&self, path: &Path) -> bool {
        let mut selected = false;
        for entry in &self.entries {
            if entry.negated == selected && entry.glob.matches_with(path, self.dot) {
                selected = !entry.negated;
            }
        }
        selected
    }
}
