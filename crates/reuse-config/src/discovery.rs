//! Finding, reading and writing config files.
//!
//! Two files are consulted, later ones overriding earlier ones section by
//! section:
//! 1. `config.toml` in the user config directory (`$REUSE_CONFIG_DIR`, or
//!    `reuse/` under the platform config directory)
//! 2. `reuse.toml` in the project directory
//!
//! A relative `[persistence] path` is anchored to the directory of the file
//! that set it, so a project file saying `path = "state/sessions.json"`
//! points into the project no matter where the process was started.

use std::fs;
use std::path::{Path, PathBuf};

use crate::{ConfigError, Result, ReuseConfig};

const PROJECT_FILE: &str = "reuse.toml";
const USER_FILE: &str = "config.toml";
const USER_DIR_NAME: &str = "reuse";
const USER_DIR_ENV: &str = "REUSE_CONFIG_DIR";

/// Directories searched for config files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigPaths {
    /// Holds `config.toml`. `None` skips the user layer.
    pub user_dir: Option<PathBuf>,
    /// Holds `reuse.toml`. `None` skips the project layer.
    pub project_dir: Option<PathBuf>,
}

impl ConfigPaths {
    /// The user config directory and the current working directory.
    pub fn discover() -> Self {
        Self {
            user_dir: user_config_dir(),
            project_dir: Some(PathBuf::from(".")),
        }
    }

    /// Replace the user config directory.
    pub fn with_user_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.user_dir = Some(dir.into());
        self
    }

    /// Replace the project directory.
    pub fn with_project_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.project_dir = Some(dir.into());
        self
    }

    /// Candidate files, lowest precedence first.
    pub fn candidates(&self) -> Vec<PathBuf> {
        let user = self.user_dir.as_ref().map(|d| d.join(USER_FILE));
        let project = self.project_dir.as_ref().map(|d| d.join(PROJECT_FILE));
        user.into_iter().chain(project).collect()
    }

    /// Read and merge every candidate that exists.
    ///
    /// Never fails: a file that can't be read or parsed is reported in
    /// [`LoadedConfig::warnings`] and the remaining layers still apply.
    pub fn load(&self) -> LoadedConfig {
        let mut loaded = LoadedConfig::default();

        for path in self.candidates().into_iter().filter(|p| p.is_file()) {
            match load_config_file(&path) {
                Ok(layer) => {
                    loaded.config.merge(layer);
                    loaded.files.push(path);
                }
                Err(e) => loaded.warnings.push(format!("Skipped {}: {e}", path.display())),
            }
        }

        if loaded.config.store.as_ref().is_some_and(|s| s.ttl_secs == 0) {
            loaded
                .warnings
                .push("[store] ttl_secs = 0 expires every session as soon as it is stored".into());
        }
        loaded
    }
}

/// Merged configuration and how it was assembled.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadedConfig {
    pub config: ReuseConfig,

    /// Files that contributed, lowest precedence first.
    pub files: Vec<PathBuf>,

    /// Unusable files and suspicious values.
    pub warnings: Vec<String>,
}

/// Load from the default locations. Shorthand for `ConfigPaths::discover().load()`.
pub fn load_config() -> LoadedConfig {
    ConfigPaths::discover().load()
}

/// Read a single config file, anchoring relative paths to its directory.
pub fn load_config_file(path: &Path) -> Result<ReuseConfig> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
        path: path.display().to_string(),
        source,
    })?;
    let mut config = ReuseConfig::from_toml(&text)?;
    if let Some(base) = path.parent() {
        anchor_persistence_path(&mut config, base);
    }
    Ok(config)
}

/// Write `config` to `path`, creating missing parent directories.
pub fn save_config(config: &ReuseConfig, path: &Path) -> Result<()> {
    let write_error = |at: &Path, source| ConfigError::WriteFile {
        path: at.display().to_string(),
        source,
    };

    let text = config.to_toml()?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| write_error(parent, e))?;
    }
    fs::write(path, text).map_err(|e| write_error(path, e))
}

/// `$REUSE_CONFIG_DIR` when set and non-empty, else `reuse/` under the
/// platform config directory.
pub fn user_config_dir() -> Option<PathBuf> {
    match std::env::var_os(USER_DIR_ENV) {
        Some(dir) if !dir.is_empty() => Some(PathBuf::from(dir)),
        _ => dirs::config_dir().map(|d| d.join(USER_DIR_NAME)),
    }
}

fn anchor_persistence_path(config: &mut ReuseConfig, base: &Path) {
    if let Some(path) = config
        .persistence
        .as_mut()
        .and_then(|p| p.path.as_mut())
        .filter(|p| p.is_relative())
    {
        *path = base.join(&*path);
    }
}
