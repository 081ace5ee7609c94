mod circular_detection;
mod merging;

use super::Config;
use crate::core::{IndicatorError, Result};
use circular_detection::CircularDetector;
use merging::merge_toml_configs;
use std::{
    fs,
    path::{Path, PathBuf},
};
use toml::Value;
use tracing::{debug, instrument};

impl Config {
    /// Loads the configuration at `path`, or the defaults if it does not exist.
    ///
    /// # Errors
    ///
    /// See [`Config::load_with_imports`]
    #[instrument]
    pub fn load(path: &Path) -> Result<Config> {
        if !path.exists() {
            debug!("No configuration file, using defaults");
            return Ok(Config::default());
        }
        Self::load_with_imports(path)
    }

    /// Loads a configuration file with support for importing other TOML files
    ///
    /// Imports are listed as `imports = ["@base", "@media/players"]`; paths
    /// are relative to the importing file and default to a `.toml`
    /// extension. Imported values are merged beneath the importing file,
    /// whose own values win on conflict.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The configuration file cannot be read
    /// - The TOML content is invalid
    /// - Any imported files cannot be loaded
    /// - The merged configuration is invalid
    /// - Circular imports are detected
    pub fn load_with_imports(path: &Path) -> Result<Config> {
        let canonical_path = path.canonicalize().map_err(|e| IndicatorError::IoError {
            path: path.to_path_buf(),
            details: format!("Failed to resolve path: {e}"),
        })?;

        let mut detector = CircularDetector::new();
        let merged = Self::load_file_with_tracking(&canonical_path, &mut detector)?;
        merged
            .try_into()
            .map_err(|e| IndicatorError::ConfigValidation {
                component: "config parsing".to_string(),
                details: format!("Configuration validation failed: {e}"),
            })
    }

    fn load_file_with_tracking(path: &Path, detector: &mut CircularDetector) -> Result<Value> {
        detector.detect_circular_import(path)?;
        detector.push_to_chain(path);

        let result = Self::load_toml_file_with_imports(path, detector);
        detector.pop_from_chain();
        result
    }

    fn load_toml_file_with_imports(path: &Path, detector: &mut CircularDetector) -> Result<Value> {
        let content = fs::read_to_string(path).map_err(|e| IndicatorError::import(e, path))?;
        let main_value: Value =
            toml::from_str(&content).map_err(|e| IndicatorError::toml_parse(e, Some(path)))?;

        let imported = extract_import_paths(&main_value)
            .iter()
            .map(|import_path| {
                let resolved = resolve_import_path(path, import_path)?;
                let canonical = resolved
                    .canonicalize()
                    .map_err(|e| IndicatorError::import(e, &resolved))?;
                Self::load_file_with_tracking(&canonical, detector)
            })
            .collect::<Result<Vec<Value>>>()?;

        Ok(merge_toml_configs(imported, strip_imports(main_value)))
    }
}

fn extract_import_paths(value: &Value) -> Vec<String> {
    let Some(Value::Array(imports)) = value.get("imports") else {
        return Vec::new();
    };
    imports
        .iter()
        .filter_map(Value::as_str)
        .filter_map(|import| import.strip_prefix('@'))
        .map(str::to_owned)
        .collect()
}

fn strip_imports(mut value: Value) -> Value {
    if let Value::Table(table) = &mut value {
        table.remove("imports");
    }
    value
}

fn resolve_import_path(base_path: &Path, import_path: &str) -> Result<PathBuf> {
    let parent_dir = base_path
        .parent()
        .ok_or_else(|| IndicatorError::ImportError {
            path: base_path.to_path_buf(),
            details: "Invalid base path - no parent directory".to_string(),
        })?;

    let mut import_path_buf = PathBuf::from(import_path);
    if import_path_buf.extension().is_none() {
        import_path_buf.set_extension("toml");
    }

    Ok(parent_dir.join(import_path_buf))
}
