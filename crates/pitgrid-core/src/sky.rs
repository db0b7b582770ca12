//! Sky specification strings.
//!
//! A sky string is either a minimal altitude/azimuth form
//! (`cie -alt 71.6 -az 185.2 -type 0`) or a time and location form
//! (`climate-based 21 Jun 12:00 -lat 41.78 -lon -87.75 -tz 5 -dni 800 -dhi 120`).
//! Only the structure is checked here; the sky generator interprets it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Family of sky described by a sky string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkyKind {
    Cie,
    ClimateBased,
    Irradiance,
    Illuminance,
}

impl SkyKind {
    fn from_token(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "cie" => Some(Self::Cie),
            "climate-based" => Some(Self::ClimateBased),
            "irradiance" => Some(Self::Irradiance),
            "illuminance" => Some(Self::Illuminance),
            _ => None,
        }
    }
}

/// Flags whose value must be numeric.
const NUMERIC_FLAGS: &[&str] = &["-alt", "-az", "-lat", "-lon", "-tz", "-dni", "-dhi", "-type"];

/// A validated sky specification. The original text is kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkySpec {
    kind: SkyKind,
    raw: String,
}

impl SkySpec {
    /// Sky family.
    pub fn kind(&self) -> SkyKind {
        self.kind
    }

    /// The sky string exactly as supplied.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whitespace separated arguments for the sky generator.
    pub fn args(&self) -> impl Iterator<Item = &str> {
        self.raw.split_whitespace()
    }
}

impl FromStr for SkySpec {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| CoreError::InvalidSky {
            sky: s.to_string(),
            reason: reason.to_string(),
        };

        let tokens: Vec<&str> = s.split_whitespace().collect();
        let first = tokens.first().ok_or_else(|| invalid("empty sky string"))?;
        let kind = SkyKind::from_token(first).ok_or_else(|| {
            invalid("expected one of: cie, climate-based, irradiance, illuminance")
        })?;

        let mut has_alt = false;
        let mut has_az = false;
        let mut iter = tokens.iter().skip(1);
        while let Some(token) = iter.next() {
            if !NUMERIC_FLAGS.contains(token) {
                continue;
            }
            let value = iter
                .next()
                .ok_or_else(|| invalid(&format!("flag {} is missing a value", token)))?;
            if value.parse::<f64>().is_err() {
                return Err(invalid(&format!("flag {} expects a number, got '{}'", token, value)));
            }
            match *token {
                "-alt" => has_alt = true,
                "-az" => has_az = true,
                _ => {}
            }
        }

        if has_alt != has_az {
            return Err(invalid("altitude and azimuth must be given together"));
        }

        Ok(Self {
            kind,
            raw: s.trim().to_string(),
        })
    }
}

impl fmt::Display for SkySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_cie_sky() {
        let sky: SkySpec = "cie -alt 71.6 -az 185.2 -type 0".parse().unwrap();
        assert_eq!(sky.kind(), SkyKind::Cie);
        assert_eq!(sky.args().count(), 7);
    }

    #[test]
    fn test_climate_based_sky() {
        let sky: SkySpec = "climate-based 21 Jun 12:00 -lat 41.78 -lon -87.75 -tz 5 -dni 800 -dhi 120"
            .parse()
            .unwrap();
        assert_eq!(sky.kind(), SkyKind::ClimateBased);
        assert!(sky.as_str().starts_with("climate-based 21 Jun"));
    }

    #[test]
    fn test_rejects_unknown_kind() {
        assert!(matches!(
            "sunny -alt 10 -az 10".parse::<SkySpec>(),
            Err(CoreError::InvalidSky { .. })
        ));
        assert!("".parse::<SkySpec>().is_err());
    }

    #[test]
    fn test_rejects_half_minimal_form() {
        assert!("cie -alt 71.6".parse::<SkySpec>().is_err());
    }

    #[test]
    fn test_rejects_non_numeric_flag() {
        assert!("cie -alt high -az 10".parse::<SkySpec>().is_err());
        assert!("cie -alt 10 -az".parse::<SkySpec>().is_err());
    }
}
