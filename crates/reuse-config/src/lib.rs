//! Configuration system for the reuse session store.
//!
//! Provides TOML-based configuration with:
//! - Store tuning (`[store]`: TTL, undecodable-entry policy)
//! - Persistence location (`[persistence]`: snapshot file path)
//! - Config file layering (user config + project-local overrides), with
//!   relative paths anchored to the file that set them

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    ConfigPaths, LoadedConfig, load_config, load_config_file, save_config, user_config_dir,
};
pub use error::{ConfigError, Result};
pub use types::*;
