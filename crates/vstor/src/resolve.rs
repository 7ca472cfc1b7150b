//! Path resolution: raw paths to absolute store keys.
//!
//! Normalization is lexical. Symlinks are not followed and the path does
//! not need to exist.

use std::path::{Component, Path, PathBuf};

use vstor_glob::{GlobPath, contains_glob};

use crate::error::{StoreError, StoreResult};

/// Resolves raw paths against a base directory.
#[derive(Debug, Clone)]
pub struct PathResolver {
    cwd: PathBuf,
    base: PathBuf,
}

impl PathResolver {
    /// `base` may be relative, in which case it resolves against `cwd`.
    pub fn new(cwd: impl Into<PathBuf>, base: Option<&Path>) -> Self {
        let cwd = normalize(&cwd.into());
        let base = match base {
            Some(base) => normalize(&cwd.join(base)),
            None => cwd.clone(),
        };
        Self { cwd, base }
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Absolute, normalized key for `raw`. An empty path is the base.
    pub fn resolve_key(&self, raw: impl AsRef<Path>) -> PathBuf {
        normalize(&self.base.join(raw.as_ref()))
    }

    /// Resolve a pattern string, keeping a leading `!`.
    pub fn resolve_pattern(&self, raw: &str) -> String {
        match raw.strip_prefix('!') {
            Some(rest) => format!("!{}", key_string(&self.resolve_key(rest))),
            None => key_string(&self.resolve_key(raw)),
        }
    }
}

/// Lexically normalize a path: drop `.`, apply `..`, never climb above
/// the root.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(prefix) => out.push(prefix.as_os_str()),
            Component::RootDir => out.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if out.file_name().is_some() {
                    out.pop();
                }
            }
            Component::Normal(part) => out.push(part),
        }
    }
    out
}

/// The string form of a key, as used in glob patterns.
pub fn key_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn is_rooted(path: &str) -> bool {
    let bytes = path.as_bytes();
    let drive = bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':';
    let rest = if drive { &path[2..] } else { path };
    rest.starts_with('/') || rest.starts_with('\\')
}

/// The directory a source input contributes to the common root: its glob
/// prefix, or the parent of a concrete file.
pub(crate) fn root_candidate(key: &str, is_file: bool) -> String {
    if contains_glob(key)
        && let Ok(glob) = GlobPath::new(key)
    {
        return key_string(&glob.static_prefix());
    }
    if is_file && let Some(parent) = Path::new(key).parent() {
        return key_string(parent);
    }
    key.to_string()
}

/// Longest shared directory prefix of absolute paths.
///
/// Paths are split on runs of `/` or `\`. Returns `/` when only the
/// filesystem root is shared.
pub fn common_root<S: AsRef<str>>(paths: &[S]) -> StoreResult<String> {
    let mut prefix: Option<Vec<&str>> = None;

    for path in paths {
        let path = path.as_ref();
        if !is_rooted(path) {
            return Err(StoreError::AmbiguousRoot {
                path: path.to_string(),
                reason: "not an absolute path",
            });
        }
        let parts: Vec<&str> = path
            .split(['/', '\\'])
            .enumerate()
            .filter(|(i, part)| *i == 0 || !part.is_empty())
            .map(|(_, part)| part)
            .collect();

        prefix = Some(match prefix {
            None => parts,
            Some(current) => current
                .iter()
                .zip(&parts)
                .take_while(|(a, b)| a == b)
                .map(|(a, _)| *a)
                .collect(),
        });
    }

    let prefix = prefix.unwrap_or_default();
    match prefix.as_slice() {
        [] => Err(StoreError::AmbiguousRoot {
            path: paths
                .iter()
                .map(|p| p.as_ref())
                .collect::<Vec<_>>()
                .join(", "),
            reason: "inputs share no root",
        }),
        [""] => Ok("/".to_string()),
        parts => Ok(parts.join("/")),
    }
}
