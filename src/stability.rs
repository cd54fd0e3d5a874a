//! Limit fluxes so no refined step can drain a storage.
//!
//! During one refined step the fluxes out of a cell may move at most `ratio` times the water the
//! layer holds at the start of the step. The allowance is shared between the eastward and the
//! northward flux in proportion to their magnitudes. Fluxes only ever shrink and keep their sign.
use crate::{
    error::{PreprocessError, Result},
    grid::TIME,
    utility::{nan_to_zero, ratio_or_zero},
};
use ndarray::{s, Array3, ArrayView3, Zip};

/// Limit one horizontal flux component given the magnitude of the other one.
#[inline]
pub fn limit_horizontal(flux: f64, other: f64, storage: f64, ratio: f64) -> f64 {
    let share = ratio_or_zero(flux.abs(), flux.abs() + other.abs());
    let allowed = (ratio * storage * share).max(0.0);
    nan_to_zero(flux.signum() * flux.abs().min(allowed))
}

/// Limit a single flux to `ratio` times the smaller of two storages.
#[inline]
pub fn limit_exchange(flux: f64, storage_a: f64, storage_b: f64, ratio: f64) -> f64 {
    let allowed = (ratio * storage_a.min(storage_b)).max(0.0);
    nan_to_zero(flux.signum() * flux.abs().min(allowed))
}

/// Stabilize the horizontal fluxes of one layer.
///
/// `storage` must have one more sample than the fluxes, flux step `t` is limited by
/// `storage[t]`.
pub fn stabilize_horizontal(
    fx: ArrayView3<f64>,
    fy: ArrayView3<f64>,
    storage: ArrayView3<f64>,
    ratio: f64,
) -> Result<(Array3<f64>, Array3<f64>)> {
    let nsteps = fx.len_of(TIME);
    if fy.shape() != fx.shape() {
        return Err(PreprocessError::ShapeMismatch {
            variable: "fy",
            expected: fx.shape().to_vec(),
            found: fy.shape().to_vec(),
        });
    }
    let mut expected = fx.shape().to_vec();
    expected[0] += 1;
    if storage.shape() != expected.as_slice() {
        return Err(PreprocessError::ShapeMismatch {
            variable: "storage",
            expected,
            found: storage.shape().to_vec(),
        });
    }

    let start_of_step = storage.slice(s![..nsteps, .., ..]);
    let mut fx_stable = Array3::<f64>::zeros(fx.raw_dim());
    let mut fy_stable = Array3::<f64>::zeros(fy.raw_dim());

    Zip::from(&mut fx_stable)
        .and(&mut fy_stable)
        .and(&fx)
        .and(&fy)
        .and(&start_of_step)
        .for_each(|fx_out, fy_out, &fx, &fy, &w| {
            *fx_out = limit_horizontal(fx, fy, w, ratio);
            *fy_out = limit_horizontal(fy, fx, w, ratio);
        });

    Ok((fx_stable, fy_stable))
}
