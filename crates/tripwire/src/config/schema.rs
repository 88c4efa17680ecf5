use serde::{Deserialize, Serialize};

use crate::detection::{DetectionOptions, KindWeights};
use crate::diff::DEFAULT_MAX_CELLS;
use crate::encoder::EncoderOptions;
use crate::interview::DEFAULT_VERDICT_MARKER;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default = "default_storage_directory")]
    pub storage_directory: String,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub diff: DiffConfig,
    #[serde(default)]
    pub encoder: EncoderOptions,
    #[serde(default)]
    pub suggestion: SuggestionConfig,
    #[serde(default)]
    pub interview: InterviewConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            database_path: default_database_path(),
            storage_directory: default_storage_directory(),
            detection: DetectionConfig::default(),
            diff: DiffConfig::default(),
            encoder: EncoderOptions::default(),
            suggestion: SuggestionConfig::default(),
            interview: InterviewConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

/// `<data dir>/tripwire`, falling back to `~/.local/share/tripwire`.
fn data_directory() -> std::path::PathBuf {
    dirs::data_dir()
        .or_else(|| dirs::home_dir().map(|p| p.join(".local").join("share")))
        .unwrap_or_else(std::env::temp_dir)
        .join("tripwire")
}

fn default_database_path() -> String {
    data_directory()
        .join("tripwire.db")
        .to_string_lossy()
        .to_string()
}

fn default_storage_directory() -> String {
    data_directory()
        .join("documents")
        .to_string_lossy()
        .to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Scores strictly above this trigger the interview.
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default = "default_true")]
    pub fuzzy: bool,
    #[serde(default)]
    pub weights: KindWeights,
}

fn default_threshold() -> f64 {
    0.5
}

fn default_true() -> bool {
    true
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            fuzzy: true,
            weights: KindWeights::default(),
        }
    }
}

impl DetectionConfig {
    pub fn options(&self) -> DetectionOptions {
        DetectionOptions {
            weights: self.weights.clone(),
            fuzzy: self.fuzzy,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffConfig {
    /// Upper bound on alignment table cells before diffing is refused.
    #[serde(default = "default_max_cells")]
    pub max_cells: usize,
}

fn default_max_cells() -> usize {
    DEFAULT_MAX_CELLS
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            max_cells: default_max_cells(),
        }
    }
}

/// Suggestion service. Without an endpoint the offline pattern suggester
/// is used.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestionConfig {
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_key_file: Option<String>,
    #[serde(default)]
    pub api_key_env_var: Option<String>,
    #[serde(default = "default_suggestion_timeout")]
    pub timeout_secs: u64,
    /// Cap on changes made by the offline suggester.
    #[serde(default = "default_max_traps")]
    pub max_traps: usize,
}

fn default_suggestion_timeout() -> u64 {
    30
}

fn default_max_traps() -> usize {
    crate::ai::DEFAULT_MAX_TRAPS
}

impl Default for SuggestionConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            api_key_file: None,
            api_key_env_var: None,
            timeout_secs: default_suggestion_timeout(),
            max_traps: default_max_traps(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterviewConfig {
    #[serde(default = "default_verdict_marker")]
    pub verdict_marker: String,
}

fn default_verdict_marker() -> String {
    DEFAULT_VERDICT_MARKER.to_string()
}

impl Default for InterviewConfig {
    fn default() -> Self {
        Self {
            verdict_marker: default_verdict_marker(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// How long a running suggestion or document stage is owned by its
    /// caller. A stage still running after this is treated as abandoned.
    #[serde(default = "default_stage_lease_secs")]
    pub stage_lease_secs: u64,
}

fn default_stage_lease_secs() -> u64 {
    600
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stage_lease_secs: default_stage_lease_secs(),
        }
    }
}

impl PipelineConfig {
    pub fn stage_lease(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.stage_lease_secs.min(u64::from(u32::MAX)) as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_fills_defaults() {
        let config: Config = serde_json::from_str(r#"{ "version": "1.0" }"#).unwrap();
        assert_eq!(config.detection.threshold, 0.5);
        assert!(config.detection.fuzzy);
        assert_eq!(config.detection.weights, KindWeights::default());
        assert_eq!(config.diff.max_cells, DEFAULT_MAX_CELLS);
        assert_eq!(config.encoder, EncoderOptions::default());
        assert!(config.suggestion.endpoint.is_none());
        assert_eq!(config.interview.verdict_marker, "VERDICT:");
        assert!(config.database_path.ends_with("tripwire.db"));
        assert_eq!(config.pipeline.stage_lease_secs, 600);
    }

    #[test]
    fn test_partial_weights_keep_other_defaults() {
        let config: Config = serde_json::from_str(
            r#"{ "version": "1.0", "detection": { "weights": { "punctuation": 0.0 } } }"#,
        )
        .unwrap();
        assert_eq!(config.detection.weights.punctuation, 0.0);
        assert_eq!(config.detection.weights.number, 1.0);
    }
}
