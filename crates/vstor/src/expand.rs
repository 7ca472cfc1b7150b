//! Turning source inputs into glob patterns and concrete paths.
//!
//! Expansion combines two views: matches on disk, and records that exist
//! only in the store. Records staged for deletion are hidden from both.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use vstor_glob::{EntryTypes, PatternSet, WalkOptions, WalkerError, contains_glob};

use crate::disk::DiskWalker;
use crate::error::{StoreError, StoreResult};
use crate::resolve::{common_root, key_string, root_candidate};
use crate::vstor::VStor;

/// One or more raw source paths or patterns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sources {
    One(String),
    Many(Vec<String>),
}

impl Sources {
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        let items: &[String] = match self {
            Sources::One(s) => std::slice::from_ref(s),
            Sources::Many(v) => v,
        };
        items.iter().map(String::as_str)
    }
}

impl From<&str> for Sources {
    fn from(s: &str) -> Self {
        Sources::One(s.to_string())
    }
}

impl From<String> for Sources {
    fn from(s: String) -> Self {
        Sources::One(s)
    }
}

impl From<&String> for Sources {
    fn from(s: &String) -> Self {
        Sources::One(s.clone())
    }
}

impl From<&Path> for Sources {
    fn from(p: &Path) -> Self {
        Sources::One(key_string(p))
    }
}

impl From<PathBuf> for Sources {
    fn from(p: PathBuf) -> Self {
        Sources::One(key_string(&p))
    }
}

impl From<&PathBuf> for Sources {
    fn from(p: &PathBuf) -> Self {
        Sources::One(key_string(p))
    }
}

impl From<Vec<String>> for Sources {
    fn from(v: Vec<String>) -> Self {
        Sources::Many(v)
    }
}

impl From<Vec<&str>> for Sources {
    fn from(v: Vec<&str>) -> Self {
        Sources::Many(v.into_iter().map(str::to_string).collect())
    }
}

impl From<&[&str]> for Sources {
    fn from(v: &[&str]) -> Self {
        Sources::Many(v.iter().map(|s| s.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for Sources {
    fn from(v: [&str; N]) -> Self {
        Sources::Many(v.iter().map(|s| s.to_string()).collect())
    }
}

/// Resolved patterns produced by [`VStor::globify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Globbed {
    Single(String),
    Many(Vec<String>),
}

impl Globbed {
    pub fn patterns(&self) -> &[String] {
        match self {
            Globbed::Single(s) => std::slice::from_ref(s),
            Globbed::Many(v) => v,
        }
    }

    /// A single concrete path, if that is all this is.
    pub fn literal(&self) -> Option<&str> {
        match self {
            Globbed::Single(s) if !contains_glob(s) && !s.starts_with('!') => Some(s),
            _ => None,
        }
    }

    /// Whether this selects a tree rather than one file.
    pub fn is_tree(&self) -> bool {
        self.literal().is_none()
    }
}

/// Options for glob expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobOptions {
    /// Match files only.
    pub nodir: bool,
    /// Let wildcards match names starting with `.`.
    pub dot: bool,
}

impl Default for GlobOptions {
    fn default() -> Self {
        Self {
            nodir: true,
            dot: false,
        }
    }
}

impl GlobOptions {
    /// Match directories as well as files.
    pub fn with_dirs() -> Self {
        Self {
            nodir: false,
            ..Self::default()
        }
    }

    pub fn with_dot(mut self, dot: bool) -> Self {
        self.dot = dot;
        self
    }
}

impl VStor {
    /// Convert source inputs to absolute glob patterns.
    ///
    /// A glob stays as is. An existing or staged file is itself, a
    /// directory becomes `dir/**`, and a path that exists nowhere becomes
    /// both `path` and `path/**` so it matches either shape once staged.
    /// A leading `!` is kept on negated inputs.
    pub fn globify(&self, sources: impl Into<Sources>) -> StoreResult<Globbed> {
        match sources.into() {
            Sources::One(raw) => {
                let mut patterns = self.globify_one(&raw)?;
                if patterns.len() == 1 {
                    Ok(Globbed::Single(patterns.remove(0)))
                } else {
                    Ok(Globbed::Many(patterns))
                }
            }
            Sources::Many(list) => {
                let mut patterns = Vec::new();
                for raw in &list {
                    patterns.extend(self.globify_one(raw)?);
                }
                Ok(Globbed::Many(patterns))
            }
        }
    }

    fn globify_one(&self, raw: &str) -> StoreResult<Vec<String>> {
        if raw.starts_with('!') {
            return Ok(vec![self.inner.resolver.resolve_pattern(raw)]);
        }

        let key = self.resolve_key(raw);
        let key_str = key_string(&key);
        if contains_glob(&key_str) {
            return Ok(vec![key_str]);
        }

        match self.disk().stat(&key) {
            Err(_) if self.get_live(&key) => Ok(vec![key_str]),
            Err(_) => {
                let tree = format!("{}/**", key_str.trim_end_matches('/'));
                Ok(vec![key_str, tree])
            }
            Ok(stat) if stat.is_file() => Ok(vec![key_str]),
            Ok(stat) if stat.is_dir() => {
                Ok(vec![format!("{}/**", key_str.trim_end_matches('/'))])
            }
            Ok(_) => Err(StoreError::InvalidPathKind { path: key }),
        }
    }

    /// Concrete paths matched by `globbed`: disk matches first, then
    /// store-only records, without duplicates.
    pub(crate) fn expand(&self, globbed: &Globbed, options: GlobOptions) -> StoreResult<Vec<PathBuf>> {
        let set = PatternSet::new(globbed.patterns())?.with_dot(options.dot);
        let walk = WalkOptions {
            max_depth: None,
            entry_types: if options.nodir {
                EntryTypes::files_only()
            } else {
                EntryTypes::all()
            },
            include_hidden: options.dot,
            on_error: Some(Arc::new(|path: &Path, err: &WalkerError| {
                tracing::debug!(path = %path.display(), "skipping unreadable directory: {}", err);
            })),
        };

        let on_disk = vstor_glob::expand(&DiskWalker(self.disk()), &set, &walk);

        let store = self.store_read();
        let mut seen = HashSet::new();
        let mut paths = Vec::new();

        for path in on_disk {
            let staged_delete = store.get(&path).is_some_and(|h| h.read().is_deleted());
            if !staged_delete && seen.insert(path.clone()) {
                paths.push(path);
            }
        }
        store.each(|handle| {
            if handle.read().is_live() && set.matches(handle.path()) && seen.insert(handle.path().to_path_buf()) {
                paths.push(handle.path().to_path_buf());
            }
        });

        tracing::trace!(patterns = ?globbed.patterns(), matches = paths.len(), "expanded sources");
        Ok(paths)
    }

    /// Deepest directory shared by the non-negated inputs.
    pub(crate) fn source_root(&self, sources: &Sources) -> StoreResult<String> {
        let candidates: Vec<String> = sources
            .iter()
            .filter(|raw| !raw.starts_with('!'))
            .map(|raw| {
                let key = self.resolve_key(raw);
                let is_file = self.get_live(&key)
                    || self.disk().stat(&key).is_ok_and(|s| s.is_file());
                root_candidate(&key_string(&key), is_file)
            })
            .collect();
        common_root(&candidates)
    }

    /// Whether a live record is already stored at `key`, without loading.
    pub(crate) fn get_live(&self, key: &Path) -> bool {
        self.store_read()
            .get(key)
            .is_some_and(|h| h.read().is_live())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;

    fn store() -> VStor {
        VStor::new(StoreConfig::new().with_base_path("/nonexistent-vstor-base")).unwrap()
    }

    #[test]
    fn missing_path_becomes_file_or_tree() {
        let store = store();
        assert_eq!(
            store.globify("out").unwrap(),
            Globbed::Many(vec![
                "/nonexistent-vstor-base/out".into(),
                "/nonexistent-vstor-base/out/**".into(),
            ])
        );
    }

    #[test]
    fn globs_and_staged_keys_stay_single() {
        let store = store();
        let globbed = store.globify("src/*.rs").unwrap();
        assert_eq!(globbed, Globbed::Single("/nonexistent-vstor-base/src/*.rs".into()));
        assert!(globbed.is_tree());

        store.write("staged.txt", "x").unwrap();
        let globbed = store.globify("staged.txt").unwrap();
        assert_eq!(globbed.literal(), Some("/nonexistent-vstor-base/staged.txt"));
        assert!(!globbed.is_tree());
    }

    #[test]
    fn lists_keep_negations() {
        let store = store();
        let globbed = store.globify(["a/*.txt", "!a/skip.txt"]).unwrap();
        assert_eq!(
            globbed.patterns(),
            &[
                "/nonexistent-vstor-base/a/*.txt".to_string(),
                "!/nonexistent-vstor-base/a/skip.txt".to_string(),
            ]
        );
    }

    #[test]
    fn expansion_sees_store_only_records() {
        let store = store();
        store.write("docs/a.md", "a").unwrap();
        store.write("docs/b.txt", "b").unwrap();
        store.write("docs/c.md", "c").unwrap();
        store.remove("docs/c.md").unwrap();

        let globbed = store.globify("docs/*.md").unwrap();
        let found = store.expand(&globbed, GlobOptions::default()).unwrap();
        assert_eq!(found, vec![PathBuf::from("/nonexistent-vstor-base/docs/a.md")]);
    }

    #[test]
    fn source_root_uses_parents_of_files() {
        let store = store();
        store.write("a/one.txt", "1").unwrap();
        store.write("a/b/two.txt", "2").unwrap();
        let root = store
            .source_root(&Sources::from(vec!["a/one.txt", "a/b/two.txt", "!a/x"]))
            .unwrap();
        assert_eq!(root, "/nonexistent-vstor-base/a");
    }
}
