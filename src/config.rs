//! Run configuration.
//!
//! Everything the pipeline needs to know that is not in the data itself is collected in a
//! [`PreprocessConfig`] and handed to [`Preprocessor`](crate::Preprocessor) explicitly. A config
//! is usually read from a TOML file, every section and key is optional and falls back to the
//! values used for the EC-Earth runs.
//!
//! ```toml
//! variant = "era5"
//! start_date = "2013-05-01"
//! end_date = "2013-05-03"
//!
//! [time]
//! divt = 24
//! count_time = 4
//! timestep = 21600.0
//!
//! [levels]
//! n_levels = 40
//! ```
use crate::error::{PreprocessError, Result};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};
use strum_macros::{EnumIter, IntoStaticStr};

/// Which reanalysis product the raw data comes from.
///
/// Both compute the same fluxes, storages and vertical transport, they differ in how the column
/// is put onto the levels used for the vertical integration.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter, IntoStaticStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab_case")]
pub enum Variant {
    /// Interpolate every column onto a fixed ladder of target levels with the boundary spliced
    /// in.
    EcEarth,
    /// Insert the boundary as an extra level and integrate between the midpoints of the
    /// assembled column.
    Era5,
}

impl Default for Variant {
    fn default() -> Self {
        Variant::EcEarth
    }
}

/// Time axis settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimeConfig {
    /// Number of refined steps each native interval is divided into.
    pub divt: usize,
    /// Number of native intervals in a day for winds and humidity.
    pub count_time: usize,
    /// Length of a native interval in seconds.
    pub timestep: f64,
}

impl Default for TimeConfig {
    fn default() -> Self {
        TimeConfig {
            divt: 24,
            count_time: 4,
            timestep: 6.0 * 3600.0,
        }
    }
}

impl TimeConfig {
    /// Length of a refined step in seconds.
    pub fn refined_step(&self) -> f64 {
        self.timestep / self.divt as f64
    }

    /// Number of refined flux steps in a day.
    pub fn refined_count(&self) -> usize {
        self.count_time * self.divt
    }
}

/// Vertical level settings, pressures are in Pa.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LevelConfig {
    /// Number of evenly spaced target levels between `pressure_top` and the surface.
    pub n_levels: usize,
    /// Pressure of the highest evenly spaced target level.
    pub pressure_top: f64,
    /// Pressure assigned to the synthetic level added above the highest model level.
    pub top_sentinel: f64,
    /// Model levels closer than this to the surface pressure are masked out.
    pub surface_margin: f64,
}

impl Default for LevelConfig {
    fn default() -> Self {
        LevelConfig {
            n_levels: 40,
            pressure_top: 20_000.0,
            top_sentinel: 0.0,
            surface_margin: 1_000.0,
        }
    }
}

/// Coefficients of the affine map from surface pressure to boundary pressure.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BoundaryConfig {
    /// Multiplies the surface pressure.
    pub slope: f64,
    /// Added after scaling, in Pa.
    pub intercept: f64,
}

impl Default for BoundaryConfig {
    fn default() -> Self {
        // Roughly model level 47 of the EC-Earth hybrid coordinate.
        BoundaryConfig {
            slope: 0.72878581,
            intercept: 7438.803223,
        }
    }
}

impl BoundaryConfig {
    /// Boundary pressure for a surface pressure.
    #[inline]
    pub fn boundary_pressure(&self, surface_pressure: f64) -> f64 {
        self.slope * surface_pressure + self.intercept
    }
}

/// Fraction of a storage that may be moved out in one refined step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StabilityConfig {
    /// Applied to the horizontal fluxes of each layer.
    pub horizontal: f64,
    /// Applied to the flux between the layers.
    pub vertical: f64,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        StabilityConfig {
            horizontal: 0.5,
            vertical: 0.25,
        }
    }
}

/// Complete configuration of a preprocessing run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PreprocessConfig {
    /// Which path the column takes onto integration levels.
    pub variant: Variant,
    /// First day to process.
    pub start_date: NaiveDate,
    /// First day not to process.
    pub end_date: NaiveDate,
    /// Time axis settings.
    pub time: TimeConfig,
    /// Vertical level settings.
    pub levels: LevelConfig,
    /// Boundary between the upper and lower layer.
    pub boundary: BoundaryConfig,
    /// Stability limits.
    pub stability: StabilityConfig,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        let start_date = NaiveDate::from_ymd_opt(2000, 1, 1).unwrap_or(NaiveDate::MIN);
        PreprocessConfig {
            variant: Variant::default(),
            start_date,
            end_date: start_date + Duration::days(1),
            time: TimeConfig::default(),
            levels: LevelConfig::default(),
            boundary: BoundaryConfig::default(),
            stability: StabilityConfig::default(),
        }
    }
}

impl PreprocessConfig {
    /// Parse and validate a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: PreprocessConfig =
            toml::from_str(text).map_err(|err| PreprocessError::ConfigParse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|err| PreprocessError::ConfigParse(format!("{}: {}", path.display(), err)))?;
        Self::from_toml_str(&text)
    }

    /// Check that every value is usable.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(PreprocessError::InvalidConfig(msg.to_owned()));

        if self.time.divt == 0 {
            return invalid("time.divt must be at least 1");
        }
        if self.time.count_time == 0 {
            return invalid("time.count_time must be at least 1");
        }
        if !(self.time.timestep > 0.0) {
            return invalid("time.timestep must be positive");
        }
        if self.levels.n_levels < 2 {
            return invalid("levels.n_levels must be at least 2");
        }
        if !(self.levels.top_sentinel >= 0.0 && self.levels.top_sentinel < self.levels.pressure_top)
        {
            return invalid("levels.top_sentinel must be non-negative and below levels.pressure_top");
        }
        if !(self.levels.surface_margin >= 0.0) {
            return invalid("levels.surface_margin must be non-negative");
        }
        if !(self.boundary.slope > 0.0 && self.boundary.slope < 1.0) {
            return invalid("boundary.slope must be between 0 and 1");
        }
        for (name, ratio) in [
            ("stability.horizontal", self.stability.horizontal),
            ("stability.vertical", self.stability.vertical),
        ]
        .iter()
        {
            if !(*ratio > 0.0 && *ratio <= 1.0) {
                return Err(PreprocessError::InvalidConfig(format!(
                    "{} must be in (0, 1]",
                    name
                )));
            }
        }
        if self.end_date < self.start_date {
            return invalid("end_date is before start_date");
        }

        Ok(())
    }

    /// The calendar days to process, `end_date` excluded.
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end_date;
        self.start_date.iter_days().take_while(move |d| *d < end)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_defaults_are_valid() {
        assert!(PreprocessConfig::default().validate().is_ok());
        assert_eq!(PreprocessConfig::default().dates().count(), 1);
    }

    #[test]
    fn test_parse_partial_toml() {
        let config = PreprocessConfig::from_toml_str(
            r#"
            variant = "era5"
            start_date = "2013-05-01"
            end_date = "2013-05-04"

            [time]
            divt = 12

            [stability]
            vertical = 0.2
            "#,
        )
        .unwrap();

        assert_eq!(config.variant, Variant::Era5);
        assert_eq!(config.time.divt, 12);
        assert_eq!(config.time.count_time, 4);
        assert_eq!(config.stability.horizontal, 0.5);
        assert_eq!(config.stability.vertical, 0.2);
        assert_eq!(config.levels, LevelConfig::default());

        let dates: Vec<_> = config.dates().collect();
        assert_eq!(dates.len(), 3);
        assert_eq!(dates[2], NaiveDate::from_ymd_opt(2013, 5, 3).unwrap());
    }

    #[test]
    fn test_rejects_bad_values() {
        let bad = PreprocessConfig::from_toml_str("[time]\ndivt = 0\n");
        assert!(matches!(bad, Err(PreprocessError::InvalidConfig(_))));

        let bad = PreprocessConfig::from_toml_str("[stability]\nhorizontal = 1.5\n");
        assert!(matches!(bad, Err(PreprocessError::InvalidConfig(_))));

        let bad = PreprocessConfig::from_toml_str("[time]\nunknown_key = 3\n");
        assert!(matches!(bad, Err(PreprocessError::ConfigParse(_))));
    }

    #[test]
    fn test_variant_names() {
        let names: Vec<&'static str> = Variant::iter().map(|v| v.into()).collect();
        assert_eq!(names, vec!["ec-earth", "era5"]);
    }

    #[test]
    fn test_boundary_pressure() {
        let bnd = BoundaryConfig::default();
        let p = bnd.boundary_pressure(100_000.0);
        assert!((p - 80_317.384223).abs() < 1.0e-6);
    }
}
