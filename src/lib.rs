#![warn(missing_docs)]
//! Reduce reanalysis winds and humidity to the two layer moisture fluxes and storages used by
//! moisture tracking models.
//!
//! For every day the raw data goes through these stages:
//!  1. [`build_columns`] completes every column with a surface and a top of the atmosphere level.
//!  2. [`integration_levels`] puts the columns on levels that include the boundary between the
//!     upper and the lower layer.
//!  3. [`integrate_layers`] integrates fluxes and storages over both layers.
//!  4. [`refine_layer`] cuts every native time step into shorter refined steps.
//!  5. [`stabilize_horizontal`] limits the horizontal fluxes so no step can drain a layer.
//!  6. [`solve_vertical_flux`] finds the flux between the layers that closes the water budget.
//!
//! [`Preprocessor`] runs all of them for a day, or for every configured day.
//!
//! ```
//! # use moisture_layers::doctest;
//! use moisture_layers::Preprocessor;
//!
//! let config = doctest::test_config();
//! let geometry = doctest::test_geometry().unwrap();
//! let preprocessor = Preprocessor::new(config.clone(), geometry).unwrap();
//!
//! // No sources, no sinks and no convergence, so nothing moves between the layers.
//! let day = doctest::calm_day(&config);
//! let output = preprocessor.process_day(config.start_date, &day).unwrap();
//! assert!(output.vertical.iter().all(|&f| f == 0.0));
//! ```

//
// API
//
pub use crate::{
    column::{build_columns, Columns, RawProfiles, SurfaceFields, ValidColumn},
    config::{
        BoundaryConfig, LevelConfig, PreprocessConfig, StabilityConfig, TimeConfig, Variant,
    },
    error::{PreprocessError, Result},
    grid::{GridGeometry, HorizontalShape, DENSITY_WATER, G},
    interpolation::{interpolate_column, linear_interpolate, InterpolationKind, Pchip},
    layers::{
        evaporation_precipitation, integrate_layers, EvapPrecip, EvapPrecipInput,
        LayerIntegrals, LayerState,
    },
    levels::{
        assembled_levels, integration_levels, interpolate_to_targets, target_levels,
        LevelProfiles,
    },
    pipeline::{DayInput, DayOutput, DaySource, OutputField, OutputSink, Preprocessor, RunSummary},
    refine::{
        flux_to_volume, refine_evaporation_precipitation, refine_flux, refine_layer,
        refine_storage, spread_accumulation,
    },
    stability::{limit_exchange, limit_horizontal, stabilize_horizontal},
    surface::{boundary_pressure, specific_humidity_from_dew_point, surface_pressure_from_log},
    vertical::{
        layer_tendencies, net_inflow, solve_vertical_flux, stabilize_vertical, vertical_flux_raw,
        VerticalFlux,
    },
};

/// Named axes and shape checks for gridded fields.
pub mod grid;

// Needed for doc tests, integration tests and benches, not part of the stable API.
#[doc(hidden)]
pub mod doctest;

//
// Internal use only
//
mod column;
mod config;
mod error;
mod interpolation;
mod layers;
mod levels;
mod pipeline;
mod refine;
mod stability;
mod surface;
mod utility;
mod vertical;
