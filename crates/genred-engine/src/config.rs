//! Engine configuration.
//!
//! Loaded from TOML, every field optional:
//!
//! ```toml
//! backend = "tiled1d"
//! workers = 4
//! cache_plans = true
//!
//! [tiles]
//! block_rows = 64
//! block_cols = 256
//! dense_max_elements = 16384
//!
//! [gradient_check]
//! epsilon = 1e-6
//! rtol = 1e-4
//! atol = 1e-6
//! ```
//!
//! [`EngineConfig::load_default`] reads the file named by `GENRED_CONFIG`
//! when set and then applies a `GENRED_BACKEND` override.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::dispatch::{BackendMode, TileSizes};
use crate::error::{ReductionError, ReductionResult};
use crate::gradient_check::GradientCheckConfig;

pub const CONFIG_ENV: &str = "GENRED_CONFIG";
pub const BACKEND_ENV: &str = "GENRED_BACKEND";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Backend used when a call does not request one
    pub backend: BackendMode,

    /// Worker threads for the tiled backends (None = rayon default)
    pub workers: Option<usize>,

    /// Keep compiled plans between calls
    pub cache_plans: bool,

    pub tiles: TileSizes,

    pub gradient_check: GradientCheckConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend: BackendMode::Auto,
            workers: None,
            cache_plans: true,
            tiles: TileSizes::default(),
            gradient_check: GradientCheckConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(text: &str) -> ReductionResult<Self> {
        toml::from_str(text).map_err(|e| ReductionError::config(e.to_string()))
    }

    pub fn to_toml_string(&self) -> ReductionResult<String> {
        toml::to_string_pretty(self).map_err(|e| ReductionError::config(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> ReductionResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| ReductionError::config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> ReductionResult<()> {
        let path = path.as_ref();
        fs::write(path, self.to_toml_string()?)
            .map_err(|e| ReductionError::config(format!("{}: {}", path.display(), e)))
    }

    /// Defaults, then the `GENRED_CONFIG` file, then `GENRED_BACKEND`.
    pub fn load_default() -> ReductionResult<Self> {
        let mut config = match std::env::var(CONFIG_ENV) {
            Ok(path) if !path.is_empty() => Self::load(path)?,
            _ => Self::default(),
        };
        if let Ok(backend) = std::env::var(BACKEND_ENV) {
            config.backend = backend.parse()?;
        }
        Ok(config)
    }

    pub fn with_backend(mut self, backend: BackendMode) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_tiles(mut self, block_rows: usize, block_cols: usize) -> Self {
        self.tiles.block_rows = block_rows.max(1);
        self.tiles.block_cols = block_cols.max(1);
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers.max(1));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_defaults_from_empty_toml() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_partial_toml() {
        let config = EngineConfig::from_toml_str(
            r#"
            backend = "tiled2d"
            [tiles]
            block_cols = 32
            "#,
        )
        .unwrap();
        assert_eq!(config.backend, BackendMode::Tiled2D);
        assert_eq!(config.tiles.block_cols, 32);
        assert_eq!(config.tiles.block_rows, TileSizes::default().block_rows);
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = EngineConfig::default()
            .with_backend(BackendMode::DenseFallback)
            .with_tiles(8, 16)
            .with_workers(2);
        let text = config.to_toml_string().unwrap();
        assert_eq!(EngineConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            EngineConfig::from_toml_str("backend = \"warp\""),
            Err(ReductionError::Config(_))
        ));
    }

    #[test]
    fn test_save_and_load() {
        let path = env::temp_dir().join(format!("genred-config-{}.toml", std::process::id()));
        let config = EngineConfig::default().with_tiles(4, 4);
        config.save(&path).unwrap();
        assert_eq!(EngineConfig::load(&path).unwrap(), config);
        let _ = fs::remove_file(&path);
    }
}
