//! Store configuration.
//!
//! Built in code or loaded from a TOML file:
//!
//! ```toml
//! base_path = "site"
//! json_spacer = 4        # or "\t"
//! save_on_exit = true
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// JSON indentation never exceeds this many characters.
const MAX_INDENT: usize = 10;

/// Indentation used when writing structured documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonSpacer {
    /// A number of spaces. Zero writes compact JSON.
    Width(usize),
    /// A literal indent string such as `"\t"`. Empty writes compact JSON.
    Literal(String),
}

impl Default for JsonSpacer {
    fn default() -> Self {
        JsonSpacer::Width(2)
    }
}

impl JsonSpacer {
    /// The indent string, or `None` for compact output.
    pub fn indent(&self) -> Option<String> {
        match self {
            JsonSpacer::Width(0) => None,
            JsonSpacer::Width(n) => Some(" ".repeat((*n).min(MAX_INDENT))),
            JsonSpacer::Literal(s) if s.is_empty() => None,
            JsonSpacer::Literal(s) => Some(s.chars().take(MAX_INDENT).collect()),
        }
    }
}

/// What the store does when the host calls `shutdown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitPolicy {
    /// Return immediately.
    None,
    /// Wait for in-flight flushes to drain.
    Wait,
    /// Start one final flush, then wait for everything to drain.
    SaveAndWait,
}

/// Construction-time options for a store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Root that relative keys resolve against. Relative values resolve
    /// against the process working directory. Defaults to the working
    /// directory itself.
    #[serde(default)]
    pub base_path: Option<PathBuf>,

    /// Indentation for structured-document writes.
    #[serde(default)]
    pub json_spacer: JsonSpacer,

    /// Flush once more on shutdown. Implies `wait_on_exit`.
    #[serde(default)]
    pub save_on_exit: bool,

    /// Block shutdown until pending flushes drain.
    #[serde(default)]
    pub wait_on_exit: bool,
}

impl StoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_path(mut self, base: impl Into<PathBuf>) -> Self {
        self.base_path = Some(base.into());
        self
    }

    pub fn with_json_spacer(mut self, spacer: JsonSpacer) -> Self {
        self.json_spacer = spacer;
        self
    }

    pub fn with_save_on_exit(mut self, enabled: bool) -> Self {
        self.save_on_exit = enabled;
        self
    }

    pub fn with_wait_on_exit(mut self, enabled: bool) -> Self {
        self.wait_on_exit = enabled;
        self
    }

    /// Load configuration from a TOML file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read store config from {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse store config from {}", path.display()))
    }

    /// Check the options and fill in implied settings.
    pub fn validated(mut self) -> StoreResult<Self> {
        if let JsonSpacer::Literal(s) = &self.json_spacer
            && !s.chars().all(char::is_whitespace)
        {
            return Err(StoreError::Config(format!(
                "json_spacer must be whitespace, got {s:?}"
            )));
        }
        if self.save_on_exit {
            self.wait_on_exit = true;
        }
        Ok(self)
    }

    pub fn exit_policy(&self) -> ExitPolicy {
        if self.save_on_exit {
            ExitPolicy::SaveAndWait
        } else if self.wait_on_exit {
            ExitPolicy::Wait
        } else {
            ExitPolicy::None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.base_path, None);
        assert_eq!(config.json_spacer, JsonSpacer::Width(2));
        assert_eq!(config.exit_policy(), ExitPolicy::None);
    }

    #[test]
    fn save_on_exit_forces_wait() {
        let config = StoreConfig::new().with_save_on_exit(true).validated().unwrap();
        assert!(config.wait_on_exit);
        assert_eq!(config.exit_policy(), ExitPolicy::SaveAndWait);

        let config = StoreConfig::new().with_wait_on_exit(true).validated().unwrap();
        assert_eq!(config.exit_policy(), ExitPolicy::Wait);
    }

    #[test]
    fn spacer_indent() {
        assert_eq!(JsonSpacer::Width(0).indent(), None);
        assert_eq!(JsonSpacer::Width(4).indent().as_deref(), Some("    "));
        assert_eq!(JsonSpacer::Width(40).indent().map(|s| s.len()), Some(10));
        assert_eq!(JsonSpacer::Literal("\t".into()).indent().as_deref(), Some("\t"));
        assert_eq!(JsonSpacer::Literal(String::new()).indent(), None);
    }

    #[test]
    fn rejects_non_whitespace_spacer() {
        let err = StoreConfig::new()
            .with_json_spacer(JsonSpacer::Literal("--".into()))
            .validated()
            .unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));
    }

    #[test]
    fn parses_toml() {
        let config: StoreConfig = toml::from_str(
            r#"
            base_path = "site"
            json_spacer = "\t"
            save_on_exit = true
            "#,
        )
        .unwrap();
        assert_eq!(config.base_path, Some(PathBuf::from("site")));
        assert_eq!(config.json_spacer, JsonSpacer::Literal("\t".into()));
        assert!(config.save_on_exit);
        assert!(!config.wait_on_exit);

        let config: StoreConfig = toml::from_str("json_spacer = 4").unwrap();
        assert_eq!(config.json_spacer, JsonSpacer::Width(4));
    }
}
