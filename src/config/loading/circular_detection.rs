use crate::core::{IndicatorError, Result};
use std::path::{Path, PathBuf};

/// Tracks the chain of files currently being imported
pub struct CircularDetector {
    import_chain: Vec<PathBuf>,
}

impl CircularDetector {
    pub fn new() -> Self {
        Self {
            import_chain: Vec::new(),
        }
    }

    /// Fails if `path` is already being imported further up the chain
    pub fn detect_circular_import(&self, path: &Path) -> Result<()> {
        if !self.import_chain.iter().any(|seen| seen == path) {
            return Ok(());
        }

        let file_name = |p: &Path| {
            p.file_name()
                .unwrap_or(p.as_os_str())
                .to_string_lossy()
                .to_string()
        };
        let chain: Vec<String> = self.import_chain.iter().map(|p| file_name(p)).collect();

        Err(IndicatorError::ConfigValidation {
            component: "import system".to_string(),
            details: format!(
                "Circular import detected: {} -> {}",
                chain.join(" -> "),
                file_name(path)
            ),
        })
    }

    pub fn push_to_chain(&mut self, path: &Path) {
        self.import_chain.push(path.to_path_buf());
    }

    pub fn pop_from_chain(&mut self) {
        self.import_chain.pop();
    }
}
