//! Screening configuration.
//!
//! Handles loading, validating, and merging `config.toml`. Stock defaults are
//! the base layer; the user's file only needs the keys it overrides.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [models]
//! validity = "models/validity.json"   # Retina / non-retina scorer weights
//! severity = "models/severity.json"   # Five-stage severity scorer weights
//!
//! [processing]
//! max_processes = 4                    # Max parallel workers (omit for auto = CPU cores)
//!
//! [output]
//! dir = "screening"                    # Where reports and mask PNGs go
//! cache = true                         # Reuse results for unchanged images
//! ```
//!
//! Relative paths are resolved against the directory holding the config
//! file, so a config can travel with its weights.
//!
//! ## What is not configurable
//!
//! The retina acceptance threshold, normalization constants, tensor sizes
//! and every segmentation threshold and kernel are fixed in code. They define
//! what a result means; changing them would make reports incomparable.
//!
//! Unknown keys are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Configuration loaded from `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScreenConfig {
    /// Scorer weight files.
    pub models: ModelsConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
    /// Report, mask and cache location.
    pub output: OutputConfig,
}

impl ScreenConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.models.validity.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "models.validity must not be empty".into(),
            ));
        }
        if self.models.severity.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "models.severity must not be empty".into(),
            ));
        }
        if self.output.dir.as_os_str().is_empty() {
            return Err(ConfigError::Validation("output.dir must not be empty".into()));
        }
        if self.processing.max_processes == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_processes must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Make relative paths relative to `base` instead of the working directory.
    pub fn resolve_paths(mut self, base: &Path) -> Self {
        let resolve = |p: PathBuf| if p.is_relative() { base.join(p) } else { p };
        self.models.validity = resolve(self.models.validity);
        self.models.severity = resolve(self.models.severity);
        self.output.dir = resolve(self.output.dir);
        self
    }
}

/// Scorer weight files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelsConfig {
    pub validity: PathBuf,
    pub severity: PathBuf,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            validity: PathBuf::from("models/validity.json"),
            severity: PathBuf::from("models/severity.json"),
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel screening workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.min(cores)).unwrap_or(cores)
}

/// Output settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub dir: PathBuf,
    pub cache: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("screening"),
            cache: true,
        }
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(ScreenConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
/// Returns `Err` if the file exists but contains invalid TOML.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<ScreenConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: ScreenConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from a `config.toml` path.
///
/// A missing file yields the stock defaults, relative to the working
/// directory. Otherwise user values are merged on top of the defaults,
/// unknown keys are rejected, the result is validated, and relative paths
/// are anchored at the file's directory.
pub fn load_config(path: &Path) -> Result<ScreenConfig, ConfigError> {
    let base = stock_defaults_value();
    let overlay = load_raw_config(path)?;
    let found = overlay.is_some();
    let config = resolve_config(base, overlay)?;
    match path.parent() {
        Some(dir) if found => Ok(config.resolve_paths(dir)),
        _ => Ok(config),
    }
}

/// Returns a fully-commented stock `config.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Fundus Screen Configuration
# ===========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# Relative paths are resolved against the directory containing this file.
# Unknown keys will cause an error.
#
# Decision thresholds and segmentation parameters are fixed and cannot be
# set here.

# ---------------------------------------------------------------------------
# Scorer weights
# ---------------------------------------------------------------------------
[models]
# Two-class retina / non-retina scorer. Input: 224x224 normalized tensor.
validity = "models/validity.json"

# Five-class DR severity scorer. Input: 512x512 center-cropped tensor.
severity = "models/severity.json"

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel screening workers.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4

# ---------------------------------------------------------------------------
# Output
# ---------------------------------------------------------------------------
[output]
# Directory for report.json, lesion mask PNGs and the result cache.
dir = "screening"

# Reuse earlier results for images whose pixels and scorer weights are
# unchanged. Pass --no-cache to override for a single run.
cache = true
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_values() {
        let config = ScreenConfig::default();
        assert_eq!(config.models.validity, PathBuf::from("models/validity.json"));
        assert_eq!(config.models.severity, PathBuf::from("models/severity.json"));
        assert_eq!(config.output.dir, PathBuf::from("screening"));
        assert!(config.output.cache);
        assert_eq!(config.processing.max_processes, None);
    }

    #[test]
    fn parse_partial_config() {
        let toml = r#"
[output]
cache = false
"#;
        let config: ScreenConfig = toml::from_str(toml).unwrap();
        assert!(!config.output.cache);
        // Default values preserved
        assert_eq!(config.output.dir, PathBuf::from("screening"));
        assert_eq!(config.models, ModelsConfig::default());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let toml = r#"
[models]
validity = "v.json"
threshold = 0.7
"#;
        assert!(toml::from_str::<ScreenConfig>(toml).is_err());
    }

    #[test]
    fn unknown_sections_are_rejected() {
        let toml = r#"
[segmentation]
exudate_threshold = 150
"#;
        assert!(toml::from_str::<ScreenConfig>(toml).is_err());
    }

    // =========================================================================
    // load_config tests
    // =========================================================================

    #[test]
    fn load_config_returns_default_when_no_file() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(&tmp.path().join("config.toml")).unwrap();
        assert_eq!(config, ScreenConfig::default());
    }

    #[test]
    fn load_config_resolves_relative_paths_against_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(
            &path,
            r#"
[models]
severity = "weights/sev.json"
"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.models.severity, tmp.path().join("weights/sev.json"));
        assert_eq!(config.models.validity, tmp.path().join("models/validity.json"));
        assert_eq!(config.output.dir, tmp.path().join("screening"));
    }

    #[test]
    fn load_config_keeps_absolute_paths() {
        let tmp = TempDir::new().unwrap();
        let abs = tmp.path().join("elsewhere/out");
        let path = tmp.path().join("config.toml");
        fs::write(
            &path,
            format!("[output]\ndir = {:?}\n", abs.to_string_lossy()),
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.output.dir, abs);
    }

    #[test]
    fn load_config_invalid_toml() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(&path, "this is not [valid toml").unwrap();
        assert!(matches!(load_config(&path), Err(ConfigError::Toml(_))));
    }

    #[test]
    fn load_config_rejects_zero_workers() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(&path, "[processing]\nmax_processes = 0\n").unwrap();
        assert!(matches!(
            load_config(&path),
            Err(ConfigError::Validation(_))
        ));
    }

    // =========================================================================
    // merge_toml tests
    // =========================================================================

    #[test]
    fn merge_overlay_replaces_leaf_and_keeps_siblings() {
        let base = stock_defaults_value();
        let overlay: toml::Value = toml::from_str("[output]\ncache = false\n").unwrap();
        let merged = merge_toml(base, overlay);
        let output = merged.get("output").unwrap();
        assert_eq!(output.get("cache").unwrap().as_bool(), Some(false));
        assert_eq!(output.get("dir").unwrap().as_str(), Some("screening"));
    }

    #[test]
    fn merge_adds_keys_missing_from_base() {
        let base = stock_defaults_value();
        let overlay: toml::Value = toml::from_str("[processing]\nmax_processes = 2\n").unwrap();
        let merged = merge_toml(base, overlay);
        assert_eq!(
            merged
                .get("processing")
                .unwrap()
                .get("max_processes")
                .unwrap()
                .as_integer(),
            Some(2)
        );
    }

    #[test]
    fn resolve_config_with_no_overlay() {
        let config = resolve_config(stock_defaults_value(), None).unwrap();
        assert_eq!(config, ScreenConfig::default());
    }

    #[test]
    fn resolve_config_rejects_empty_model_path() {
        let overlay: toml::Value = toml::from_str("[models]\nvalidity = \"\"\n").unwrap();
        let result = resolve_config(stock_defaults_value(), Some(overlay));
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    // =========================================================================
    // effective_threads tests
    // =========================================================================

    #[test]
    fn effective_threads_clamps_to_cores() {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let config = ProcessingConfig {
            max_processes: Some(cores + 100),
        };
        assert_eq!(effective_threads(&config), cores);
        assert_eq!(effective_threads(&ProcessingConfig::default()), cores);
        let one = ProcessingConfig {
            max_processes: Some(1),
        };
        assert_eq!(effective_threads(&one), 1);
    }

    // =========================================================================
    // stock_config_toml tests
    // =========================================================================

    #[test]
    fn stock_config_toml_is_valid_toml() {
        let content = stock_config_toml();
        let _: toml::Value = toml::from_str(content).expect("stock config must be valid TOML");
    }

    #[test]
    fn stock_config_toml_roundtrips_to_defaults() {
        let config: ScreenConfig = toml::from_str(stock_config_toml()).unwrap();
        assert_eq!(config, ScreenConfig::default());
    }

    #[test]
    fn stock_config_toml_contains_all_sections() {
        let content = stock_config_toml();
        assert!(content.contains("[models]"));
        assert!(content.contains("[processing]"));
        assert!(content.contains("[output]"));
    }

    #[test]
    fn stock_defaults_value_has_all_sections() {
        let val = stock_defaults_value();
        assert!(val.is_table());
        assert!(val.get("models").is_some());
        assert!(val.get("processing").is_some());
        assert!(val.get("output").is_some());
    }
}
