//! Serializable diff configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{MinerError, Result};

/// Similarity thresholds used by entity matching, refactoring detection and
/// tree matching. All ratios are in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Minimum composite score for pairing two operations.
    pub operation_match: f64,
    /// Minimum score for pairing two classes.
    pub class_match: f64,
    /// Minimum score for pairing two attributes.
    pub attribute_match: f64,
    /// Body similarity above which a method rename is reported as pure.
    pub rename_body: f64,
    /// Share of an extracted/inlined body that must reappear in the caller.
    pub extract_overlap: f64,
    /// Share of each merged method's statements found in the merge target.
    pub merge_fraction: f64,
    /// Share of the merge target covered by the merged methods when no
    /// discriminator parameter was added.
    pub merge_coverage: f64,
    /// Share of the split method covered by the split targets.
    pub split_coverage: f64,
    /// Minimum Dice coefficient in the bottom-up tree matching phase.
    pub dice: f64,
    /// Smallest subtree height considered in the top-down phase.
    pub min_height: usize,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            operation_match: 0.75,
            class_match: 0.5,
            attribute_match: 0.6,
            rename_body: 0.8,
            extract_overlap: 0.5,
            merge_fraction: 0.6,
            merge_coverage: 0.8,
            split_coverage: 0.5,
            dice: 0.5,
            min_height: 2,
        }
    }
}

impl Thresholds {
    /// Clamp every ratio into `[0, 1]` and the height to at least 1.
    pub fn clamped(mut self) -> Self {
        for value in [
            &mut self.operation_match,
            &mut self.class_match,
            &mut self.attribute_match,
            &mut self.rename_body,
            &mut self.extract_overlap,
            &mut self.merge_fraction,
            &mut self.merge_coverage,
            &mut self.split_coverage,
            &mut self.dice,
        ] {
            *value = value.clamp(0.0, 1.0);
        }
        self.min_height = self.min_height.max(1);
        self
    }
}

/// Configuration for one diff computation.
///
/// Can be saved to and loaded from YAML or JSON files.
///
/// # Example YAML
///
/// ```yaml
/// extensions:
///   - java
/// exclude_patterns:
///   - "**/generated/**"
/// thresholds:
///   operation_match: 0.7
///   dice: 0.4
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffConfig {
    /// File extensions to load (e.g. `["java", "py"]`).
    pub extensions: Vec<String>,

    /// Glob patterns to exclude when loading snapshots.
    pub exclude_patterns: Vec<String>,

    /// Similarity thresholds.
    pub thresholds: Thresholds,

    /// Compute per-file tree diffs on the rayon pool.
    pub parallel: bool,
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            extensions: vec!["java".to_string(), "py".to_string()],
            exclude_patterns: vec!["**/.git/**".to_string(), "**/target/**".to_string()],
            thresholds: Thresholds::default(),
            parallel: true,
        }
    }
}

impl DiffConfig {
    /// Create a configuration with default thresholds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set target extensions.
    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions;
        self
    }

    /// Set exclude patterns.
    pub fn with_exclude_patterns(mut self, patterns: Vec<String>) -> Self {
        self.exclude_patterns = patterns;
        self
    }

    /// Replace all thresholds.
    pub fn with_thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = thresholds.clamped();
        self
    }

    /// Set the operation match threshold (0.0 - 1.0).
    pub fn operation_threshold(mut self, threshold: f64) -> Self {
        self.thresholds.operation_match = threshold.clamp(0.0, 1.0);
        self
    }

    /// Set the bottom-up Dice threshold (0.0 - 1.0).
    pub fn dice_threshold(mut self, threshold: f64) -> Self {
        self.thresholds.dice = threshold.clamp(0.0, 1.0);
        self
    }

    /// Run per-file diffing sequentially.
    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }

    /// Load config from a YAML file.
    pub fn from_yaml(path: impl AsRef<Path>) -> Result<Self> {
        let content = read(path.as_ref())?;
        let config: Self = serde_yaml::from_str(&content).map_err(|e| {
            MinerError::InvalidConfig(format!("Failed to parse YAML config: {}", e))
        })?;
        Ok(config.normalized())
    }

    /// Load config from a JSON file.
    pub fn from_json(path: impl AsRef<Path>) -> Result<Self> {
        let content = read(path.as_ref())?;
        let config: Self = serde_json::from_str(&content).map_err(|e| {
            MinerError::InvalidConfig(format!("Failed to parse JSON config: {}", e))
        })?;
        Ok(config.normalized())
    }

    /// Load config from a file, picking the format from its extension.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(path),
            Some("yaml" | "yml") => Self::from_yaml(path),
            _ => Err(MinerError::InvalidConfig(format!(
                "Unknown config format: {}",
                path.display()
            ))),
        }
    }

    /// Save config to a YAML file.
    pub fn to_yaml(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_yaml::to_string(self).map_err(|e| {
            MinerError::InvalidConfig(format!("Failed to serialize config: {}", e))
        })?;
        write(path.as_ref(), content)
    }

    /// Save config to a JSON file.
    pub fn to_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            MinerError::InvalidConfig(format!("Failed to serialize config: {}", e))
        })?;
        write(path.as_ref(), content)
    }

    fn normalized(mut self) -> Self {
        self.thresholds = self.thresholds.clamped();
        self
    }
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| {
        MinerError::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to read config file: {}", e),
        ))
    })
}

fn write(path: &Path, content: String) -> Result<()> {
    std::fs::write(path, content).map_err(|e| {
        MinerError::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to write config file: {}", e),
        ))
    })
}
