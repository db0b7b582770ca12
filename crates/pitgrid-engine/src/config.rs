//! Pipeline configuration.

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use pitgrid_core::{CoreError, Metric, PartitionStrategy};

use crate::error::EngineError;

/// How grids are cut into chunks before ray tracing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitMode {
    /// Balance chunks across `cpu_count`, bounded below by `min_sensor_count`.
    #[default]
    Balanced,
    /// Chunks of at most `sensor_count` sensors.
    Fixed,
}

impl SplitMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Balanced => "balanced",
            Self::Fixed => "fixed",
        }
    }
}

impl std::fmt::Display for SplitMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SplitMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "balanced" => Ok(Self::Balanced),
            "fixed" => Ok(Self::Fixed),
            _ => Err(CoreError::InvalidConfig(format!(
                "unknown split mode '{}', expected balanced or fixed",
                s
            ))),
        }
    }
}

/// Pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Maximum number of concurrently running tasks and chunks.
    pub cpu_count: usize,

    /// CPUs consumed by one chunk when balancing.
    pub cpus_per_unit: usize,

    /// Minimum sensors per chunk; takes precedence over `cpu_count`.
    pub min_sensor_count: usize,

    /// Maximum sensors per chunk in fixed split mode.
    pub sensor_count: usize,

    /// Chunk sizing mode.
    pub split: SplitMode,

    /// Photometric metric to compute.
    pub metric: Metric,

    /// Grid identifier or glob pattern passed to the model translator.
    pub grid_filter: String,

    /// Ray tracing parameters, passed through untouched.
    pub radiance_parameters: String,

    /// Export a visualization artifact after restructuring.
    pub visualize: bool,

    /// External simulation command.
    pub tool: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cpu_count: 50,
            cpus_per_unit: 1,
            min_sensor_count: 500,
            sensor_count: 200,
            split: SplitMode::Balanced,
            metric: Metric::Illuminance,
            grid_filter: "*".to_string(),
            radiance_parameters: "-ab 2 -aa 0.1 -ad 2048 -ar 64".to_string(),
            visualize: true,
            tool: "honeybee-radiance".to_string(),
        }
    }
}

impl Config {
    /// Load a JSON config file. Missing fields keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, EngineError> {
        let text = std::fs::read_to_string(path).map_err(|e| EngineError::io(path, e))?;
        serde_json::from_str(&text).map_err(|e| EngineError::json(path, e))
    }

    /// Partition strategy selected by this configuration.
    pub fn partition_strategy(&self) -> PartitionStrategy {
        match self.split {
            SplitMode::Balanced => {
                PartitionStrategy::balanced(self.cpu_count, self.cpus_per_unit, self.min_sensor_count)
            }
            SplitMode::Fixed => PartitionStrategy::FixedSize {
                max_items: self.sensor_count,
            },
        }
    }

    /// Fail fast on out-of-range values before any work starts.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.cpu_count < 1 {
            return Err(CoreError::InvalidConfig("cpu_count must be at least 1".into()));
        }
        if self.grid_filter.trim().is_empty() {
            return Err(CoreError::InvalidConfig("grid_filter must not be empty".into()));
        }
        if self.tool.trim().is_empty() {
            return Err(CoreError::InvalidConfig("tool must not be empty".into()));
        }
        PartitionStrategy::balanced(self.cpu_count, self.cpus_per_unit, self.min_sensor_count)
            .validate()?;
        PartitionStrategy::FixedSize {
            max_items: self.sensor_count,
        }
        .validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_split_mode() {
        assert_eq!("fixed".parse::<SplitMode>().unwrap(), SplitMode::Fixed);
        assert_eq!(" Balanced ".parse::<SplitMode>().unwrap(), SplitMode::Balanced);
        assert_eq!(SplitMode::Fixed.to_string(), "fixed");
        assert!(matches!(
            "even".parse::<SplitMode>(),
            Err(CoreError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.cpu_count, 50);
        assert_eq!(config.min_sensor_count, 500);
        assert_eq!(config.metric, Metric::Illuminance);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"cpu_count": 8, "metric": "irradiance", "split": "fixed"}"#)
                .unwrap();
        assert_eq!(config.cpu_count, 8);
        assert_eq!(config.metric, Metric::Irradiance);
        assert_eq!(config.min_sensor_count, 500);
        assert_eq!(
            config.partition_strategy(),
            PartitionStrategy::FixedSize { max_items: 200 }
        );
    }

    #[test]
    fn test_validate_rejects_zero_counts() {
        let config = Config {
            cpu_count: 0,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(CoreError::InvalidConfig(_))));

        let config = Config {
            min_sensor_count: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_metric_in_file_is_rejected() {
        let result = serde_json::from_str::<Config>(r#"{"metric": "lumens"}"#);
        assert!(result.is_err());
    }
}
