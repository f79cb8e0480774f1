//! Index configuration.
//!
//! [`IndexConfig`] is layered from built-in defaults, an optional TOML file,
//! and `EMBER_*` environment variables (e.g. `EMBER_CHECK_LEVEL=4`).
//! Command-line flags are applied on top by the binary.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use ember_core::constants::{
    DEFAULT_CHECK_DEPTH, DEFAULT_CHECK_LEVEL, DEFAULT_DB_CACHE_MB, MAX_CHECK_LEVEL, NetworkType,
};
use ember_core::error::EmberError;

use crate::loader::LoadMode;
use crate::verify::VerifyOptions;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "EMBER";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Root directory. Defaults to `<platform data dir>/ember/<network>`.
    pub data_dir: Option<PathBuf>,
    pub network: NetworkType,
    /// Engine block cache in MiB.
    pub db_cache_mb: usize,
    pub check_level: u8,
    /// Blocks to verify back from the tip. Zero checks the whole chain.
    pub check_depth: u64,
    /// Wipe an outdated store instead of refusing to open it.
    pub migrate_schema: bool,
    pub load_mode: LoadMode,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            network: NetworkType::default(),
            db_cache_mb: DEFAULT_DB_CACHE_MB,
            check_level: DEFAULT_CHECK_LEVEL,
            check_depth: DEFAULT_CHECK_DEPTH,
            migrate_schema: true,
            load_mode: LoadMode::default(),
        }
    }
}

impl IndexConfig {
    /// Load defaults, then `file` if it exists, then the environment.
    pub fn load(file: Option<&Path>) -> Result<Self, EmberError> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .and_then(|c| c.try_deserialize::<Self>())
            .map(Self::clamped)
            .map_err(|e| EmberError::Config(e.to_string()))
    }

    /// Clamp out-of-range values.
    pub fn clamped(mut self) -> Self {
        self.check_level = self.check_level.min(MAX_CHECK_LEVEL);
        self
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("ember")
                .join(self.network.data_dir_suffix())
        })
    }

    /// Path to the transaction database.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir().join("txleveldb")
    }

    /// Directory holding the `blkNNNN.dat` files.
    pub fn blocks_dir(&self) -> PathBuf {
        self.data_dir()
    }

    pub fn verify_options(&self) -> VerifyOptions {
        VerifyOptions::new(self.check_level, self.check_depth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults() {
        let cfg = IndexConfig::default();
        assert_eq!(cfg.db_cache_mb, 25);
        assert_eq!(cfg.check_level, 1);
        assert_eq!(cfg.check_depth, 2500);
        assert!(cfg.migrate_schema);
        assert_eq!(cfg.load_mode, LoadMode::Full);
    }

    #[test]
    fn default_data_dir_is_per_network() {
        let cfg = IndexConfig {
            network: NetworkType::Testnet,
            ..IndexConfig::default()
        };
        assert!(cfg.data_dir().ends_with("ember/testnet"));
        assert!(cfg.db_path().ends_with("testnet/txleveldb"));
    }

    #[test]
    fn explicit_data_dir_wins() {
        let cfg = IndexConfig {
            data_dir: Some(PathBuf::from("/tmp/ember-x")),
            ..IndexConfig::default()
        };
        assert_eq!(cfg.blocks_dir(), PathBuf::from("/tmp/ember-x"));
        assert_eq!(cfg.db_path(), PathBuf::from("/tmp/ember-x/txleveldb"));
    }

    #[test]
    fn loads_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ember.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "network = \"regtest\"\ncheck_level = 9\ncheck_depth = 0\nload_mode = \"checkpoint_window\""
        )
        .unwrap();

        let cfg = IndexConfig::load(Some(&path)).unwrap();
        assert_eq!(cfg.network, NetworkType::Regtest);
        assert_eq!(cfg.check_level, MAX_CHECK_LEVEL);
        assert_eq!(cfg.check_depth, 0);
        assert_eq!(cfg.load_mode, LoadMode::CheckpointWindow);
        assert_eq!(cfg.db_cache_mb, 25);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = IndexConfig::load(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(cfg.check_depth, IndexConfig::default().check_depth);
    }
}
