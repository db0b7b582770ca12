//! Photometric metric selection.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// The photometric quantity a simulation computes per sensor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    #[default]
    Illuminance,
    Irradiance,
    Luminance,
    Radiance,
}

impl Metric {
    /// All supported metrics.
    pub const ALL: [Metric; 4] = [
        Metric::Illuminance,
        Metric::Irradiance,
        Metric::Luminance,
        Metric::Radiance,
    ];

    /// Name as understood by the external tools.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Illuminance => "illuminance",
            Self::Irradiance => "irradiance",
            Self::Luminance => "luminance",
            Self::Radiance => "radiance",
        }
    }

    /// SI unit of result values.
    pub fn unit(&self) -> &'static str {
        match self {
            Self::Illuminance => "lux",
            Self::Irradiance => "W/m2",
            Self::Luminance => "cd/m2",
            Self::Radiance => "W/m2-sr",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == needle)
            .ok_or_else(|| CoreError::InvalidMetric(s.to_string()))
    }
}
