//! The flux between the upper and the lower layer.
//!
//! Nothing in the raw data says how much water crosses the boundary between the layers. It is
//! whatever closes the water budget of both layers. For every refined step `t` and cell the
//! tendency of each layer is
//!
//! ```text
//!     T_lower = inflow_lower + E - P W_lower / W
//!     T_upper = inflow_upper     - P W_upper / W
//! ```
//!
//! with the precipitation shared by the storages at the start of the step. The residual
//! `r = W[t + 1] - W[t] - T` of each layer is what the budget cannot explain. The vertical flux
//! `F` (positive downward) moves water between the layers so both are left with the same
//! residual relative to their storage at the end of the step:
//!
//! ```text
//!     F = r_lower - W_lower / W (r_lower + r_upper)
//! ```
//!
//! Longitude wraps around, latitude does not. The first and last latitude rows have no
//! neighbour on one side, so their budget cannot be closed. Their residuals are zero and so is
//! their vertical flux.
use crate::{
    error::{PreprocessError, Result},
    grid::{LAT, LON, TIME},
    layers::{EvapPrecip, LayerState},
    stability::limit_exchange,
    utility::ratio_or_zero,
};
use ndarray::{s, Array3, ArrayView3, Zip};

/// Vertical flux between the layers (m3 per refined step), positive downward.
#[derive(Debug, Clone, PartialEq)]
pub struct VerticalFlux {
    /// The flux that closes the budget of both layers exactly.
    pub raw: Array3<f64>,
    /// The raw flux limited so it can never drain either layer.
    pub stable: Array3<f64>,
}

/// Net horizontal inflow into every cell for one layer.
///
/// Fluxes at the cell edges are the mean of the two cells sharing the edge. Latitude rows are
/// ordered north to south, a positive northward flux enters a cell through its southern edge.
pub fn net_inflow(fx: ArrayView3<f64>, fy: ArrayView3<f64>) -> Array3<f64> {
    let (ntime, nlat, nlon) = fx.dim();
    let mut inflow = Array3::<f64>::zeros((ntime, nlat, nlon));
    if nlat < 3 {
        return inflow;
    }

    for t in 0..ntime {
        for i in 1..nlat - 1 {
            for j in 0..nlon {
                let east = (j + 1) % nlon;
                let west = (j + nlon - 1) % nlon;

                let east_edge = 0.5 * (fx[[t, i, j]] + fx[[t, i, east]]);
                let west_edge = 0.5 * (fx[[t, i, west]] + fx[[t, i, j]]);
                let north_edge = 0.5 * (fy[[t, i - 1, j]] + fy[[t, i, j]]);
                let south_edge = 0.5 * (fy[[t, i, j]] + fy[[t, i + 1, j]]);

                inflow[[t, i, j]] = (west_edge - east_edge) + (south_edge - north_edge);
            }
        }
    }

    inflow
}

/// Tendencies of the upper and the lower layer from horizontal transport, evaporation and
/// precipitation.
pub fn layer_tendencies(
    upper: &LayerState,
    lower: &LayerState,
    evap_precip: &EvapPrecip,
) -> Result<(Array3<f64>, Array3<f64>)> {
    check_refined_shapes(upper, lower, evap_precip)?;

    let nsteps = upper.fx.len_of(TIME);
    let mut tendency_upper = net_inflow(upper.fx.view(), upper.fy.view());
    let mut tendency_lower = net_inflow(lower.fx.view(), lower.fy.view());

    Zip::from(&mut tendency_upper)
        .and(&mut tendency_lower)
        .and(upper.storage.slice(s![..nsteps, .., ..]))
        .and(lower.storage.slice(s![..nsteps, .., ..]))
        .and(&evap_precip.evaporation)
        .and(&evap_precip.precipitation)
        .for_each(|t_up, t_low, &w_up, &w_low, &e, &p| {
            let w = w_up + w_low;
            *t_up -= p * ratio_or_zero(w_up, w);
            *t_low += e - p * ratio_or_zero(w_low, w);
        });

    Ok((tendency_upper, tendency_lower))
}

/// Flux between the layers that leaves both with the same residual relative to their storage.
///
/// `w_upper` and `w_lower` are the storages at the end of each step.
pub fn vertical_flux_raw(
    residual_upper: ArrayView3<f64>,
    residual_lower: ArrayView3<f64>,
    w_upper: ArrayView3<f64>,
    w_lower: ArrayView3<f64>,
) -> Array3<f64> {
    let mut flux = Array3::<f64>::zeros(residual_lower.raw_dim());
    Zip::from(&mut flux)
        .and(&residual_upper)
        .and(&residual_lower)
        .and(&w_upper)
        .and(&w_lower)
        .for_each(|f, &r_up, &r_low, &w_up, &w_low| {
            *f = r_low - ratio_or_zero(w_low, w_up + w_low) * (r_low + r_up);
        });
    flux
}

/// Limit the vertical flux to `ratio` times the smaller storage of the two layers.
pub fn stabilize_vertical(
    raw: ArrayView3<f64>,
    w_upper: ArrayView3<f64>,
    w_lower: ArrayView3<f64>,
    ratio: f64,
) -> Array3<f64> {
    let mut stable = Array3::<f64>::zeros(raw.raw_dim());
    Zip::from(&mut stable)
        .and(&raw)
        .and(&w_upper)
        .and(&w_lower)
        .for_each(|out, &f, &w_up, &w_low| *out = limit_exchange(f, w_up, w_low, ratio));
    stable
}

/// Solve for the vertical flux of every refined step.
///
/// Layers must be refined: fluxes and evaporation/precipitation as volumes per step, the storages
/// with one more sample than the fluxes.
pub fn solve_vertical_flux(
    upper: &LayerState,
    lower: &LayerState,
    evap_precip: &EvapPrecip,
    ratio: f64,
) -> Result<VerticalFlux> {
    let (tendency_upper, tendency_lower) = layer_tendencies(upper, lower, evap_precip)?;

    let nsteps = upper.fx.len_of(TIME);
    let residual = |state: &LayerState, tendency: &Array3<f64>| {
        &state.storage.slice(s![1.., .., ..]) - &state.storage.slice(s![..nsteps, .., ..]) - tendency
    };
    let mut residual_upper = residual(upper, &tendency_upper);
    let mut residual_lower = residual(lower, &tendency_lower);
    clear_edge_rows(&mut residual_upper);
    clear_edge_rows(&mut residual_lower);

    let w_upper_end = upper.storage.slice(s![1.., .., ..]);
    let w_lower_end = lower.storage.slice(s![1.., .., ..]);

    let raw = vertical_flux_raw(
        residual_upper.view(),
        residual_lower.view(),
        w_upper_end,
        w_lower_end,
    );
    let stable = stabilize_vertical(raw.view(), w_upper_end, w_lower_end, ratio);

    log::debug!(
        "vertical flux over {} steps, largest raw {:e}",
        nsteps,
        raw.iter().fold(0.0f64, |acc, f| acc.max(f.abs()))
    );

    Ok(VerticalFlux { raw, stable })
}

// Zero the first and last latitude rows, every row when there is no interior.
fn clear_edge_rows(field: &mut Array3<f64>) {
    let nlat = field.len_of(LAT);
    if nlat < 3 {
        field.fill(0.0);
    } else {
        field.slice_mut(s![.., 0, ..]).fill(0.0);
        field.slice_mut(s![.., nlat - 1, ..]).fill(0.0);
    }
}

fn check_refined_shapes(
    upper: &LayerState,
    lower: &LayerState,
    evap_precip: &EvapPrecip,
) -> Result<()> {
    let flux_shape = upper.fx.shape().to_vec();
    let mut storage_shape = flux_shape.clone();
    storage_shape[0] += 1;

    let checks: [(&'static str, &Array3<f64>, &Vec<usize>); 8] = [
        ("fx_upper", &upper.fx, &flux_shape),
        ("fy_upper", &upper.fy, &flux_shape),
        ("fx_lower", &lower.fx, &flux_shape),
        ("fy_lower", &lower.fy, &flux_shape),
        ("evap", &evap_precip.evaporation, &flux_shape),
        ("precip", &evap_precip.precipitation, &flux_shape),
        ("w_upper", &upper.storage, &storage_shape),
        ("w_lower", &lower.storage, &storage_shape),
    ];

    for (variable, field, expected) in checks.iter() {
        if field.shape() != expected.as_slice() {
            return Err(PreprocessError::ShapeMismatch {
                variable: *variable,
                expected: expected.to_vec(),
                found: field.shape().to_vec(),
            });
        }
    }

    if flux_shape[LAT.index()] == 0 || flux_shape[LON.index()] == 0 {
        return Err(PreprocessError::InvalidConfig(
            "grid needs at least one latitude row and one longitude".to_owned(),
        ));
    }

    Ok(())
}
