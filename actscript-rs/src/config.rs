//! Engine configuration loaded from `engine.toml`.
//!
//! | Key | Default | Meaning |
//! |-----|---------|---------|
//! | `cache_capacity` | `256` | parsed expressions kept per context (`0` disables the cache) |
//! | `max_call_depth` | `256` | call stack frames before a runtime fault |
//! | `verbose_errors` | `false` | include the call-stack trace in error reports |
//! | `default_isolation` | `"default"` | isolation used by `Call` when none is given |
//! | `max_loop_iterations` | `0` | `While` iteration guard (`0` = unlimited) |
//!
//! Unknown keys are rejected so that typos surface early.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::Deserialize;
use thiserror::Error;

use crate::engine::CallIsolation;

// ── Public API ────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub cache_capacity: usize,
    pub max_call_depth: usize,
    pub verbose_errors: bool,
    pub default_isolation: CallIsolation,
    pub max_loop_iterations: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            cache_capacity: 256,
            max_call_depth: 256,
            verbose_errors: false,
            default_isolation: CallIsolation::Default,
            max_loop_iterations: 0,
        }
    }
}

impl EngineConfig {
    /// `<config dir>/actscript/engine.toml`, if a home directory is known.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "actscript").map(|d| d.config_dir().join("engine.toml"))
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Load a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })?;
        Self::from_toml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source,
        })
    }

    /// Load the file at [`default_path`](Self::default_path), falling back
    /// to defaults when it is missing.  A file that exists but does not
    /// parse is still an error.
    pub fn load_or_default() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) if path.is_file() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_file_gives_defaults() {
        assert_eq!(EngineConfig::from_toml("").unwrap(), EngineConfig::default());
    }

    #[test]
    fn partial_override() {
        let cfg = EngineConfig::from_toml(
            "cache_capacity = 0\nverbose_errors = true\ndefault_isolation = \"high\"\n",
        )
        .unwrap();
        assert_eq!(cfg.cache_capacity, 0);
        assert!(cfg.verbose_errors);
        assert_eq!(cfg.default_isolation, CallIsolation::High);
        assert_eq!(cfg.max_call_depth, 256);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(EngineConfig::from_toml("cache_size = 3").is_err());
    }

    #[test]
    fn load_reports_path() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "max_call_depth = \"deep\"").unwrap();
        let err = EngineConfig::load(f.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains(&f.path().display().to_string()));

        let missing = f.path().with_extension("missing");
        assert!(matches!(EngineConfig::load(&missing), Err(ConfigError::Io { .. })));
    }
}
