//! Error types for the moisture-layers crate.
use chrono::NaiveDate;
use thiserror::Error;

/// Error type for the crate.
#[derive(Clone, PartialEq, Debug, Error)]
pub enum PreprocessError {
    /// A field required finite values but contained NaN or infinity.
    #[error("non-finite values in {variable}")]
    NonFinite {
        /// Name of the offending variable.
        variable: &'static str,
    },
    /// A field that must be strictly positive, such as a pressure, held zero or a negative value.
    #[error("non-positive values in {variable}")]
    NonPositive {
        /// Name of the offending variable.
        variable: &'static str,
    },
    /// A pressure profile was not strictly increasing along the level axis.
    #[error("{variable} is not strictly increasing along the level axis at (time={time}, lat={lat}, lon={lon})")]
    NonMonotonic {
        /// Name of the offending variable.
        variable: &'static str,
        /// Time index of the column.
        time: usize,
        /// Latitude index of the column.
        lat: usize,
        /// Longitude index of the column.
        lon: usize,
    },
    /// A target pressure fell outside the pressure span of the column it was interpolated in,
    /// it would have been extrapolation.
    #[error(
        "{variable}: target pressure {target} Pa is outside the column range [{min}, {max}] Pa \
         at (time={time}, lat={lat}, lon={lon})"
    )]
    InterpolationDomain {
        /// Name of the variable being interpolated.
        variable: &'static str,
        /// Time index of the column.
        time: usize,
        /// Latitude index of the column.
        lat: usize,
        /// Longitude index of the column.
        lon: usize,
        /// The requested pressure.
        target: f64,
        /// Lowest valid pressure in the column.
        min: f64,
        /// Highest valid pressure in the column.
        max: f64,
    },
    /// A column had fewer than two valid levels, so nothing can be interpolated.
    #[error("fewer than two valid levels at (time={time}, lat={lat}, lon={lon})")]
    EmptyColumn {
        /// Time index of the column.
        time: usize,
        /// Latitude index of the column.
        lat: usize,
        /// Longitude index of the column.
        lon: usize,
    },
    /// The boundary pressure did not lie between the top of the level ladder and the surface.
    #[error("boundary pressure outside the level ladder at (time={time}, lat={lat}, lon={lon})")]
    InvalidBoundary {
        /// Time index of the column.
        time: usize,
        /// Latitude index of the column.
        lat: usize,
        /// Longitude index of the column.
        lon: usize,
    },
    /// Near surface humidity could not be derived from dew point and pressure.
    #[error("unable to derive specific humidity from {variable}")]
    InvalidHumidity {
        /// Name of the offending variable.
        variable: &'static str,
    },
    /// Two co-required grids do not have the dimensions they should.
    #[error("{variable} has shape {found:?}, expected {expected:?}")]
    ShapeMismatch {
        /// Name of the offending variable.
        variable: &'static str,
        /// The shape that was required.
        expected: Vec<usize>,
        /// The shape that was found.
        found: Vec<usize>,
    },
    /// A configuration value is out of range or inconsistent with the data.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The configuration file could not be read or parsed.
    #[error("unable to parse configuration: {0}")]
    ConfigParse(String),
    /// The collaborator providing raw data for a day failed.
    #[error("unable to load input: {0}")]
    Source(String),
    /// The collaborator persisting output for a day failed.
    #[error("unable to store output: {0}")]
    Sink(String),
    /// Processing a particular day failed.
    #[error("{date}: {source}")]
    Day {
        /// The day being processed.
        date: NaiveDate,
        /// What went wrong.
        #[source]
        source: Box<PreprocessError>,
    },
}

impl PreprocessError {
    /// Attach the day being processed to an error.
    pub fn for_day(self, date: NaiveDate) -> Self {
        match self {
            already @ PreprocessError::Day { .. } => already,
            other => PreprocessError::Day {
                date,
                source: Box::new(other),
            },
        }
    }

    /// True for errors caused by the data, as opposed to configuration or collaborators.
    pub fn is_data_quality(&self) -> bool {
        use PreprocessError::*;

        match self {
            NonFinite { .. }
            | NonPositive { .. }
            | NonMonotonic { .. }
            | InterpolationDomain { .. }
            | EmptyColumn { .. }
            | InvalidBoundary { .. }
            | InvalidHumidity { .. } => true,
            Day { source, .. } => source.is_data_quality(),
            _ => false,
        }
    }
}

/// Shorthand for results.
pub type Result<T> = ::std::result::Result<T, PreprocessError>;
