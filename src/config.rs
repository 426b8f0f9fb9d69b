//! Runner configuration that can be kept in a JSON file.
//!
//! Every field is optional in the file; missing ones take the [`Runner`] defaults.
//!
//! ```json
//! {
//!   "mode": { "parallel": { "threads": 4, "partitions": 8 } },
//!   "batch_size": 64,
//!   "late_data": "fail",
//!   "on_stop": "discard"
//! }
//! ```

use crate::error::{FlowError, Result};
use crate::runner::{ExecMode, Runner, StopPolicy};
use crate::watermark::LateDataPolicy;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub mode: ExecMode,
    pub batch_size: usize,
    pub late_data: LateDataPolicy,
    pub on_stop: StopPolicy,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        let runner = Runner::default();
        Self {
            mode: runner.mode,
            batch_size: runner.batch_size,
            late_data: runner.late_data,
            on_stop: runner.on_stop,
        }
    }
}

impl RunnerConfig {
    /// # Errors
    /// [`FlowError::ConfigLoad`] for malformed JSON, [`FlowError::InvalidConfig`]
    /// for out-of-range values.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .context("parse runner configuration")
            .map_err(FlowError::ConfigLoad)?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    /// As [`from_json_str`](Self::from_json_str), plus unreadable files.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("read {}", path.display()))
            .map_err(FlowError::ConfigLoad)?;
        Self::from_json_str(&content)
    }

    /// # Errors
    /// If the file cannot be written.
    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content).with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }

    /// # Errors
    /// [`FlowError::InvalidConfig`] for a zero batch size, partition or thread count.
    pub fn validate(&self) -> Result<()> {
        self.to_runner().validate()
    }

    fn to_runner(&self) -> Runner {
        Runner {
            mode: self.mode,
            batch_size: self.batch_size,
            late_data: self.late_data,
            on_stop: self.on_stop,
            ..Runner::default()
        }
    }

    /// A runner with these settings and no stop handle or metrics attached.
    pub fn into_runner(self) -> Runner {
        self.to_runner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_fields_take_defaults() {
        let config = RunnerConfig::from_json_str("{}").unwrap();
        assert_eq!(config, RunnerConfig::default());
        assert_eq!(config.mode, ExecMode::Sequential);
        assert_eq!(config.batch_size, 1);
    }

    #[test]
    fn parses_parallel_mode_and_policies() {
        let config = RunnerConfig::from_json_str(
            r#"{"mode": {"parallel": {"threads": 2, "partitions": 8}},
                "batch_size": 16, "late_data": "fail", "on_stop": "discard"}"#,
        )
        .unwrap();
        assert_eq!(
            config.mode,
            ExecMode::Parallel {
                threads: Some(2),
                partitions: Some(8)
            }
        );
        let runner = config.into_runner();
        assert_eq!(runner.partitions(), 8);
        assert_eq!(runner.late_data, LateDataPolicy::Fail);
        assert_eq!(runner.on_stop, StopPolicy::Discard);
    }

    #[test]
    fn zero_batch_size_is_invalid() {
        let err = RunnerConfig::from_json_str(r#"{"batch_size": 0}"#).unwrap_err();
        assert!(matches!(err, FlowError::InvalidConfig(_)));
    }

    #[test]
    fn malformed_json_is_a_load_error() {
        let err = RunnerConfig::from_json_str("{batch_size").unwrap_err();
        assert!(matches!(err, FlowError::ConfigLoad(_)));
    }

    #[test]
    fn save_then_load_from_file() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("runner.json");
        let config = RunnerConfig {
            batch_size: 32,
            ..RunnerConfig::default()
        };
        config.save(&path)?;
        assert_eq!(RunnerConfig::from_json_file(&path)?, config);
        Ok(())
    }
}
