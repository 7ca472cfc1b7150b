//! Directory walking and pattern expansion, generic over `WalkerFs`.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::set::PatternSet;
use crate::{WalkerDirEntry, WalkerError, WalkerFs};

/// Types of entries to include in walk results.
#[derive(Debug, Clone, Copy, Default)]
pub struct EntryTypes {
    pub files: bool,
    pub dirs: bool,
}

impl EntryTypes {
    pub fn files_only() -> Self {
        Self {
            files: true,
            dirs: false,
        }
    }

    pub fn all() -> Self {
        Self {
            files: true,
            dirs: true,
        }
    }
}

/// Callback for non-fatal errors such as unreadable directories.
pub type ErrorCallback = Arc<dyn Fn(&Path, &WalkerError) + Send + Sync>;

/// Options for walking and expansion.
#[derive(Clone)]
pub struct WalkOptions {
    /// Maximum depth below the root (None = unlimited).
    pub max_depth: Option<usize>,
    pub entry_types: EntryTypes,
    /// Descend into and yield entries whose name starts with `.`.
    pub include_hidden: bool,
    /// Called for unreadable directories. Errors are skipped either way.
    pub on_error: Option<ErrorCallback>,
}

impl fmt::Debug for WalkOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalkOptions")
            .field("max_depth", &self.max_depth)
            .field("entry_types", &self.entry_types)
            .field("include_hidden", &self.include_hidden)
            .field("on_error", &self.on_error.as_ref().map(|_| "..."))
            .finish()
    }
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            max_depth: None,
            entry_types: EntryTypes::files_only(),
            include_hidden: false,
            on_error: None,
        }
    }
}

/// Depth-first walker yielding absolute paths in sorted order.
pub struct FileWalker<'a, F: WalkerFs> {
    fs: &'a F,
    root: PathBuf,
    patterns: Option<&'a PatternSet>,
    options: WalkOptions,
}

impl<'a, F: WalkerFs> FileWalker<'a, F> {
    pub fn new(fs: &'a F, root: impl AsRef<Path>) -> Self {
        Self {
            fs,
            root: root.as_ref().to_path_buf(),
            patterns: None,
            options: WalkOptions::default(),
        }
    }

    /// Only yield paths selected by this set. Paths are tested whole,
    /// so the set should hold absolute patterns when the root is absolute.
    pub fn with_patterns(mut self, patterns: &'a PatternSet) -> Self {
        self.patterns = Some(patterns);
        self
    }

    pub fn with_options(mut self, options: WalkOptions) -> Self {
        self.options = options;
        self
    }

    /// Collect all matching descendants of the root. The root itself is
    /// never yielded.
    pub fn collect(self) -> Vec<PathBuf> {
        let mut results = Vec::new();
        let mut stack = vec![(self.root.clone(), 0usize)];

        while let Some((dir, depth)) = stack.pop() {
            if let Some(max) = self.options.max_depth
                && depth >= max
            {
                continue;
            }

            let entries = match self.fs.list_dir(&dir) {
                Ok(entries) => entries,
                Err(err) => {
                    if let Some(ref cb) = self.options.on_error {
                        cb(&dir, &err);
                    }
                    continue;
                }
            };

            let mut entries: Vec<(String, bool, bool)> = entries
                .into_iter()
                .map(|e| (e.name().to_string(), e.is_dir(), e.is_symlink()))
                .collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));

            let mut subdirs = Vec::new();
            for (name, is_dir, is_symlink) in entries {
                if !self.options.include_hidden && name.starts_with('.') {
                    continue;
                }
                let full_path = dir.join(&name);

                if is_dir && !is_symlink {
                    if self.options.entry_types.dirs && self.selected(&full_path) {
                        results.push(full_path.clone());
                    }
                    subdirs.push((full_path, depth + 1));
                } else if self.options.entry_types.files && self.selected(&full_path) {
                    // Symlinked directories are yielded as leaves, never followed
                    results.push(full_path);
                }
            }

            // Reverse so the alphabetically-first directory pops first
            subdirs.reverse();
            stack.extend(subdirs);
        }

        results
    }

    fn selected(&self, path: &Path) -> bool {
        self.patterns.is_none_or(|set| set.matches(path))
    }
}

/// Expand a pattern set against a filesystem.
///
/// Each positive pattern is walked from its static prefix; every candidate
/// is then tested against the whole set, so negations apply across
/// patterns. Results keep pattern order, then walk order, without
/// duplicates. A pattern's own root directory is included when it matches
/// and directories are requested.
pub fn expand<F: WalkerFs>(fs: &F, set: &PatternSet, options: &WalkOptions) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    let mut results = Vec::new();
    let mut push = |path: PathBuf, results: &mut Vec<PathBuf>| {
        if seen.insert(path.clone()) {
            results.push(path);
        }
    };

    for glob in set.positives() {
        let root = glob.static_prefix();

        if glob.is_literal() {
            let wanted = (options.entry_types.files && fs.is_file(&root))
                || (options.entry_types.dirs && fs.is_dir(&root));
            if wanted && set.matches(&root) {
                push(root, &mut results);
            }
            continue;
        }

        if !fs.is_dir(&root) {
            continue;
        }
        if options.entry_types.dirs && set.matches(&root) {
            push(root.clone(), &mut results);
        }

        let mut walk_options = options.clone();
        if let Some(depth) = glob.fixed_depth() {
            let root_depth = crate::glob_path::path_components(&root).len();
            walk_options.max_depth = Some(depth.saturating_sub(root_depth));
        }

        let found = FileWalker::new(fs, &root)
            .with_patterns(set)
            .with_options(walk_options)
            .collect();
        for path in found {
            push(path, &mut results);
        }
    }

    tracing::trace!(patterns = set.positives().count(), matches = results.len(), "expanded pattern set");
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, BTreeSet};

    struct MemEntry {
        name: String,
        is_dir: bool,
    }

    impl WalkerDirEntry for MemEntry {
        fn name(&self) -> &str {
            &self.name
        }
        fn is_dir(&self) -> bool {
            self.is_dir
        }
        fn is_file(&self) -> bool {
            !self.is_dir
        }
        fn is_symlink(&self) -> bool {
            false
        }
    }

    /// Tree of absolute paths; directories are implied by file parents.
    #[derive(Default)]
    struct MemoryFs {
        files: BTreeMap<PathBuf, ()>,
        dirs: BTreeSet<PathBuf>,
    }

    impl MemoryFs {
        fn with_files(paths: &[&str]) -> Self {
            let mut fs = MemoryFs::default();
            fs.dirs.insert(PathBuf::from("/"));
            for p in paths {
                let path = PathBuf::from(p);
                let mut parent = path.parent();
                while let Some(dir) = parent {
                    fs.dirs.insert(dir.to_path_buf());
                    parent = dir.parent();
                }
                fs.files.insert(path, ());
            }
            fs
        }
    }

    impl WalkerFs for MemoryFs {
        type DirEntry = MemEntry;

        fn list_dir(&self, path: &Path) -> Result<Vec<MemEntry>, WalkerError> {
            if !self.dirs.contains(path) {
                return Err(WalkerError::NotFound(path.display().to_string()));
            }
            let files = self.files.keys().map(|p| (p, false));
            let dirs = self.dirs.iter().map(|p| (p, true));
            Ok(files
                .chain(dirs)
                .filter(|(p, _)| p.parent() == Some(path))
                .map(|(p, is_dir)| MemEntry {
                    name: p.file_name().unwrap().to_string_lossy().into_owned(),
                    is_dir,
                })
                .collect())
        }

        fn is_dir(&self, path: &Path) -> bool {
            self.dirs.contains(path)
        }

        fn is_file(&self, path: &Path) -> bool {
            self.files.contains_key(path)
        }
    }

    fn sample() -> MemoryFs {
        MemoryFs::with_files(&[
            "/p/a.txt",
            "/p/b.rs",
            "/p/sub/c.txt",
            "/p/sub/deep/d.txt",
            "/p/.hidden/e.txt",
            "/q/z.txt",
        ])
    }

    fn strs(paths: &[PathBuf]) -> Vec<String> {
        paths.iter().map(|p| p.display().to_string()).collect()
    }

    #[test]
    fn walk_is_sorted_depth_first() {
        let fs = sample();
        let found = FileWalker::new(&fs, "/p").collect();
        assert_eq!(
            strs(&found),
            vec!["/p/a.txt", "/p/b.rs", "/p/sub/c.txt", "/p/sub/deep/d.txt"]
        );
    }

    #[test]
    fn walk_includes_hidden_when_asked() {
        let fs = sample();
        let found = FileWalker::new(&fs, "/p")
            .with_options(WalkOptions {
                include_hidden: true,
                ..Default::default()
            })
            .collect();
        assert!(found.contains(&PathBuf::from("/p/.hidden/e.txt")));
    }

    #[test]
    fn walk_reports_unreadable_root() {
        let fs = sample();
        let errors = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = errors.clone();
        let found = FileWalker::new(&fs, "/missing")
            .with_options(WalkOptions {
                on_error: Some(Arc::new(move |p: &Path, _: &WalkerError| {
                    sink.lock().unwrap().push(p.to_path_buf());
                })),
                ..Default::default()
            })
            .collect();
        assert!(found.is_empty());
        assert_eq!(errors.lock().unwrap().len(), 1);
    }

    #[test]
    fn expand_tree_files_only() {
        let fs = sample();
        let set = PatternSet::new(["/p/**"]).unwrap();
        let found = expand(&fs, &set, &WalkOptions::default());
        assert_eq!(
            strs(&found),
            vec!["/p/a.txt", "/p/b.rs", "/p/sub/c.txt", "/p/sub/deep/d.txt"]
        );
    }

    #[test]
    fn expand_tree_with_dirs_includes_root() {
        let fs = sample();
        let set = PatternSet::new(["/p/sub/**"]).unwrap();
        let options = WalkOptions {
            entry_types: EntryTypes::all(),
            ..Default::default()
        };
        let found = expand(&fs, &set, &options);
        assert_eq!(
            strs(&found),
            vec!["/p/sub", "/p/sub/c.txt", "/p/sub/deep", "/p/sub/deep/d.txt"]
        );
    }

    #[test]
    fn expand_single_level_wildcard_stays_shallow() {
        let fs = sample();
        let set = PatternSet::new(["/p/*.txt"]).unwrap();
        let found = expand(&fs, &set, &WalkOptions::default());
        assert_eq!(strs(&found), vec!["/p/a.txt"]);
    }

    #[test]
    fn expand_literal_and_missing() {
        let fs = sample();
        let set = PatternSet::new(["/q/z.txt", "/nope.txt", "/nope.txt/**"]).unwrap();
        let found = expand(&fs, &set, &WalkOptions::default());
        assert_eq!(strs(&found), vec!["/q/z.txt"]);
    }

    #[test]
    fn expand_applies_negation_and_dedups() {
        let fs = sample();
        let set = PatternSet::new(["/p/**/*.txt", "/p/**", "!/p/sub/**"]).unwrap();
        let found = expand(&fs, &set, &WalkOptions::default());
        assert_eq!(strs(&found), vec!["/p/a.txt", "/p/b.rs"]);
    }
}
