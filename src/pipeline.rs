//! Run all stages for one day, and the loop over days.
//!
//! Reading the raw data and writing the results are left to the caller, through the
//! [`DaySource`] and [`OutputSink`] traits. A [`Preprocessor`] holds everything that stays the
//! same from day to day, the configuration and the grid geometry, and carries no other state.
//! Days are independent. A day that fails is reported and the run moves on to the next one.
use crate::{
    column::{build_columns, RawProfiles, SurfaceFields},
    config::PreprocessConfig,
    error::{PreprocessError, Result},
    grid::{expect_shape3, GridGeometry},
    layers::{evaporation_precipitation, integrate_layers, EvapPrecipInput, LayerState},
    levels::integration_levels,
    refine::{refine_evaporation_precipitation, refine_layer},
    stability::stabilize_horizontal,
    vertical::solve_vertical_flux,
};
use chrono::NaiveDate;
use ndarray::Array3;
use strum_macros::{EnumIter, IntoStaticStr};

/// Everything read from the raw data for one day.
#[derive(Debug, Clone)]
pub struct DayInput {
    /// Winds and humidity on model levels, `count_time + 1` samples.
    pub profiles: RawProfiles,
    /// Near surface fields, `count_time + 1` samples.
    pub surface: SurfaceFields,
    /// Accumulated evaporation and precipitation.
    pub evap_precip: EvapPrecipInput,
}

/// The fields handed to the tracking model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum OutputField {
    /// Eastward flux in the upper layer.
    FaEUpper,
    /// Northward flux in the upper layer.
    FaNUpper,
    /// Eastward flux in the lower layer.
    FaELower,
    /// Northward flux in the lower layer.
    FaNLower,
    /// Water in the upper layer.
    WUpper,
    /// Water in the lower layer.
    WLower,
    /// Flux between the layers, positive downward.
    FaVert,
    /// Evaporation.
    Evap,
    /// Precipitation.
    Precip,
}

impl OutputField {
    /// Name of the time dimension the field lives on.
    ///
    /// Fluxes live on `time`, one value per refined step. Storages live on `time2` with one more
    /// value, at the instants bounding the steps.
    pub fn time_dimension(self) -> &'static str {
        match self {
            OutputField::WUpper | OutputField::WLower => "time2",
            _ => "time",
        }
    }

    /// Name of the field.
    pub fn name(self) -> &'static str {
        self.into()
    }
}

/// Results for one day, all volumes in m3 on the refined time axis.
#[derive(Debug, Clone)]
pub struct DayOutput {
    /// The day these results are for.
    pub date: NaiveDate,
    /// Stabilized fluxes and storage of the upper layer.
    pub upper: LayerState,
    /// Stabilized fluxes and storage of the lower layer.
    pub lower: LayerState,
    /// Stabilized flux between the layers, positive downward.
    pub vertical: Array3<f64>,
    /// Evaporation per refined step.
    pub evaporation: Array3<f64>,
    /// Precipitation per refined step.
    pub precipitation: Array3<f64>,
    /// Largest relative mismatch between the column storage and the two layers.
    pub conservation_error: f64,
}

impl DayOutput {
    /// Look up a field by name.
    pub fn field(&self, field: OutputField) -> &Array3<f64> {
        use OutputField::*;

        match field {
            FaEUpper => &self.upper.fx,
            FaNUpper => &self.upper.fy,
            FaELower => &self.lower.fx,
            FaNLower => &self.lower.fy,
            WUpper => &self.upper.storage,
            WLower => &self.lower.storage,
            FaVert => &self.vertical,
            Evap => &self.evaporation,
            Precip => &self.precipitation,
        }
    }
}

/// Where the raw data for a day comes from.
pub trait DaySource {
    /// Load everything needed to process `date`.
    fn load_day(&mut self, date: NaiveDate) -> Result<DayInput>;
}

/// Where the results for a day go.
pub trait OutputSink {
    /// Store the results of one day.
    fn write_day(&mut self, output: &DayOutput) -> Result<()>;
}

/// What happened during a run over several days.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    /// Days processed and stored, in order.
    pub processed: Vec<NaiveDate>,
    /// Days that failed, each error names its day.
    pub failed: Vec<PreprocessError>,
}

impl RunSummary {
    /// True if every day was processed.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Turns raw reanalysis days into two layer fluxes and storages.
#[derive(Debug, Clone)]
pub struct Preprocessor {
    config: PreprocessConfig,
    geometry: GridGeometry,
}

impl Preprocessor {
    /// Create a preprocessor, fails if the configuration is invalid.
    pub fn new(config: PreprocessConfig, geometry: GridGeometry) -> Result<Self> {
        config.validate()?;
        Ok(Preprocessor { config, geometry })
    }

    /// The configuration in use.
    pub fn config(&self) -> &PreprocessConfig {
        &self.config
    }

    /// The grid geometry in use.
    pub fn geometry(&self) -> &GridGeometry {
        &self.geometry
    }

    /// Process a single day.
    ///
    /// Any error is returned wrapped in [`PreprocessError::Day`].
    pub fn process_day(&self, date: NaiveDate, input: &DayInput) -> Result<DayOutput> {
        self.process(date, input).map_err(|err| err.for_day(date))
    }

    fn process(&self, date: NaiveDate, input: &DayInput) -> Result<DayOutput> {
        let config = &self.config;
        let geometry = &self.geometry;

        expect_shape3(
            "sp",
            &input.surface.sp,
            config.time.count_time + 1,
            geometry.shape(),
        )?;

        let columns = build_columns(&input.profiles, &input.surface, config)?;
        log::debug!(
            "{}: {} levels per column including synthetic levels",
            date,
            columns.nlev()
        );

        let profiles = integration_levels(&columns, config)?;
        drop(columns);

        let integrals = integrate_layers(&profiles, geometry)?;
        drop(profiles);
        let conservation_error = integrals.conservation_error();

        let upper = self.refine_and_stabilize(&integrals.upper)?;
        let lower = self.refine_and_stabilize(&integrals.lower)?;

        let evap_precip = evaporation_precipitation(&input.evap_precip, geometry)?;
        let evap_precip = refine_evaporation_precipitation(&evap_precip, &config.time)?;

        let vertical =
            solve_vertical_flux(&upper, &lower, &evap_precip, config.stability.vertical)?;

        Ok(DayOutput {
            date,
            upper,
            lower,
            vertical: vertical.stable,
            evaporation: evap_precip.evaporation,
            precipitation: evap_precip.precipitation,
            conservation_error,
        })
    }

    fn refine_and_stabilize(&self, native: &LayerState) -> Result<LayerState> {
        let refined = refine_layer(native, &self.geometry, &self.config.time)?;
        let (fx, fy) = stabilize_horizontal(
            refined.fx.view(),
            refined.fy.view(),
            refined.storage.view(),
            self.config.stability.horizontal,
        )?;

        Ok(LayerState {
            fx,
            fy,
            storage: refined.storage,
        })
    }

    /// Process every configured day, loading from `source` and storing into `sink`.
    ///
    /// A failing day does not stop the run, it is logged and recorded in the summary.
    pub fn run<S, O>(&self, source: &mut S, sink: &mut O) -> RunSummary
    where
        S: DaySource + ?Sized,
        O: OutputSink + ?Sized,
    {
        let mut summary = RunSummary::default();

        for date in self.config.dates() {
            let result = source
                .load_day(date)
                .and_then(|input| self.process_day(date, &input))
                .and_then(|output| sink.write_day(&output))
                .map_err(|err| err.for_day(date));

            match result {
                Ok(()) => {
                    log::info!("{}: done", date);
                    summary.processed.push(date);
                }
                Err(err) => {
                    log::error!("{}", err);
                    summary.failed.push(err);
                }
            }
        }

        summary
    }
}
