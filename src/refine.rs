//! Refine the time axis.
//!
//! Winds and humidity arrive every `timestep` seconds, `count_time` intervals a day, sampled at
//! both ends of every interval (so `count_time + 1` samples). The tracking model needs much
//! shorter steps for stability, each native interval is cut into `divt` refined steps.
//!
//! Sample `s = k * divt + r` of a refined field lies on the straight line between native samples
//! `k` and `k + 1` at `r / divt` of the way. Storages get one extra sample at the very end, equal
//! to the last native sample. Fluxes are rates, a constant flux stays the same constant.
//!
//! Accumulated evaporation and precipitation are spread evenly over the refined steps each
//! accumulation period covers, which keeps the daily totals exact.
use crate::{
    config::TimeConfig,
    error::{PreprocessError, Result},
    grid::{expect_shape3, GridGeometry, DENSITY_WATER, TIME},
    layers::{EvapPrecip, LayerState},
};
use ndarray::{s, Array3, ArrayView3, Zip};

/// Storage at `divt * (n - 1) + 1` instants from `n` native instants.
pub fn refine_storage(native: ArrayView3<f64>, divt: usize) -> Result<Array3<f64>> {
    let inner = refine_linear(native, divt)?;
    let intervals = native.len_of(TIME) - 1;
    let (_, nlat, nlon) = native.dim();

    let mut refined = Array3::<f64>::zeros((intervals * divt + 1, nlat, nlon));
    refined
        .slice_mut(s![..intervals * divt, .., ..])
        .assign(&inner);
    refined
        .slice_mut(s![intervals * divt, .., ..])
        .assign(&native.slice(s![intervals, .., ..]));

    Ok(refined)
}

/// Flux at `divt * (n - 1)` steps from `n` native instants.
pub fn refine_flux(native: ArrayView3<f64>, divt: usize) -> Result<Array3<f64>> {
    refine_linear(native, divt)
}

fn refine_linear(native: ArrayView3<f64>, divt: usize) -> Result<Array3<f64>> {
    let (ntime, nlat, nlon) = native.dim();
    if ntime < 2 {
        return Err(PreprocessError::ShapeMismatch {
            variable: "time",
            expected: vec![2, nlat, nlon],
            found: vec![ntime, nlat, nlon],
        });
    }
    if divt == 0 {
        return Err(PreprocessError::InvalidConfig(
            "time.divt must be at least 1".to_owned(),
        ));
    }

    let mut refined = Array3::<f64>::zeros(((ntime - 1) * divt, nlat, nlon));
    for (s_idx, mut step) in refined.outer_iter_mut().enumerate() {
        let k = s_idx / divt;
        let frac = (s_idx % divt) as f64 / divt as f64;
        let x0 = native.index_axis(TIME, k);
        let x1 = native.index_axis(TIME, k + 1);
        Zip::from(&mut step)
            .and(&x0)
            .and(&x1)
            .for_each(|out, &x0, &x1| *out = x0 + frac * (x1 - x0));
    }

    Ok(refined)
}

/// Spread accumulations evenly over `refined_count` steps.
///
/// Every native sample is divided equally among the `refined_count / n` refined steps it covers,
/// which must be a whole number.
pub fn spread_accumulation(native: ArrayView3<f64>, refined_count: usize) -> Result<Array3<f64>> {
    let (ntime, nlat, nlon) = native.dim();
    if ntime == 0 || refined_count % ntime != 0 {
        return Err(PreprocessError::InvalidConfig(format!(
            "{} evaporation/precipitation samples cannot be spread over {} steps",
            ntime, refined_count
        )));
    }
    let factor = refined_count / ntime;

    let mut refined = Array3::<f64>::zeros((refined_count, nlat, nlon));
    for (s_idx, mut step) in refined.outer_iter_mut().enumerate() {
        step.assign(&native.index_axis(TIME, s_idx / factor));
        step.mapv_inplace(|v| v / factor as f64);
    }

    Ok(refined)
}

/// Refine evaporation and precipitation volumes onto the refined flux steps.
pub fn refine_evaporation_precipitation(
    native: &EvapPrecip,
    time: &TimeConfig,
) -> Result<EvapPrecip> {
    let refined_count = time.refined_count();
    Ok(EvapPrecip {
        evaporation: spread_accumulation(native.evaporation.view(), refined_count)?,
        precipitation: spread_accumulation(native.precipitation.view(), refined_count)?,
    })
}

/// Turn refined flux rates (kg m-1 s-1) into volumes of water crossing the cell edges per refined
/// step (m3).
pub fn flux_to_volume(
    fx: &mut Array3<f64>,
    fy: &mut Array3<f64>,
    geometry: &GridGeometry,
    time: &TimeConfig,
) -> Result<()> {
    let ntime = fx.len_of(TIME);
    let shape = geometry.shape();
    expect_shape3("fx", fx, ntime, shape)?;
    expect_shape3("fy", fy, ntime, shape)?;

    let dt = time.refined_step();
    let ew = geometry.ew_edge_length();
    fx.mapv_inplace(|f| f * dt * ew / DENSITY_WATER);
    for (i, &ns) in geometry.ns_edge_length().iter().enumerate() {
        fy.slice_mut(s![.., i, ..])
            .mapv_inplace(|f| f * dt * ns / DENSITY_WATER);
    }

    Ok(())
}

/// Refine a layer onto the refined time axis and express its fluxes as volumes per step.
///
/// The native layer must have `count_time + 1` samples.
pub fn refine_layer(
    native: &LayerState,
    geometry: &GridGeometry,
    time: &TimeConfig,
) -> Result<LayerState> {
    let ntime = time.count_time + 1;
    let shape = geometry.shape();
    expect_shape3("fx", &native.fx, ntime, shape)?;
    expect_shape3("fy", &native.fy, ntime, shape)?;
    expect_shape3("storage", &native.storage, ntime, shape)?;

    let mut fx = refine_flux(native.fx.view(), time.divt)?;
    let mut fy = refine_flux(native.fy.view(), time.divt)?;
    flux_to_volume(&mut fx, &mut fy, geometry, time)?;

    Ok(LayerState {
        fx,
        fy,
        storage: refine_storage(native.storage.view(), time.divt)?,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::utility::test_tools::approx_equal;
    use ndarray::{arr1, Array1, Axis};

    fn ramp(ntime: usize) -> Array3<f64> {
        Array3::from_shape_fn((ntime, 3, 2), |(t, i, j)| {
            10.0 + 3.0 * t as f64 + i as f64 - j as f64
        })
    }

    #[test]
    fn test_constant_flux_stays_constant() {
        let native = Array3::from_elem((5, 3, 2), 7.5);
        for divt in 1..6 {
            let refined = refine_flux(native.view(), divt).unwrap();
            assert_eq!(refined.dim(), (4 * divt, 3, 2));
            assert!(refined.iter().all(|&f| f == 7.5));
        }
    }

    #[test]
    fn test_linear_field_stays_on_the_line() {
        let native = ramp(5);
        let divt = 4;
        let refined = refine_storage(native.view(), divt).unwrap();
        assert_eq!(refined.dim(), (17, 3, 2));

        for ((s_idx, i, j), &val) in refined.indexed_iter() {
            let t = s_idx as f64 / divt as f64;
            let expected = 10.0 + 3.0 * t + i as f64 - j as f64;
            assert!(approx_equal(val, expected, 1.0e-12));
        }

        // The end is exact, not interpolated
        assert_eq!(
            refined.index_axis(Axis(0), 16),
            native.index_axis(Axis(0), 4)
        );
    }

    #[test]
    fn test_single_sample_fails() {
        let native = Array3::<f64>::zeros((1, 3, 2));
        assert!(refine_flux(native.view(), 4).is_err());
    }

    #[test]
    fn test_spread_accumulation_conserves_totals() {
        let native = ramp(8);
        let refined = spread_accumulation(native.view(), 96).unwrap();
        assert_eq!(refined.dim(), (96, 3, 2));

        let before = native.sum_axis(Axis(0));
        let after = refined.sum_axis(Axis(0));
        for (&b, &a) in before.iter().zip(after.iter()) {
            assert!(approx_equal(a, b, 1.0e-9));
        }
        assert_eq!(refined[[0, 0, 0]], 10.0 / 12.0);
        assert_eq!(refined[[11, 0, 0]], 10.0 / 12.0);
        assert_eq!(refined[[12, 0, 0]], 13.0 / 12.0);

        assert!(matches!(
            spread_accumulation(native.view(), 90),
            Err(PreprocessError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_refine_layer_volumes() {
        let geometry =
            GridGeometry::new(arr1(&[1.0, 1.0, 1.0]), 2000.0, arr1(&[100.0, 200.0, 300.0]), 2)
                .unwrap();
        let time = TimeConfig {
            divt: 6,
            count_time: 4,
            timestep: 3600.0,
        };
        let native = LayerState {
            fx: Array3::from_elem((5, 3, 2), 1.0),
            fy: Array3::from_elem((5, 3, 2), 1.0),
            storage: Array3::from_elem((5, 3, 2), 4.0),
        };

        let refined = refine_layer(&native, &geometry, &time).unwrap();
        assert_eq!(refined.fx.dim(), (24, 3, 2));
        assert_eq!(refined.storage.dim(), (25, 3, 2));

        // 600 s per refined step
        assert!(refined.fx.iter().all(|&f| approx_equal(f, 600.0 * 2000.0 / 1000.0, 1.0e-9)));
        let ns: Array1<f64> = arr1(&[100.0, 200.0, 300.0]);
        for ((_, i, _), &f) in refined.fy.indexed_iter() {
            assert!(approx_equal(f, 600.0 * ns[i] / 1000.0, 1.0e-9));
        }

        let short = LayerState {
            fx: Array3::from_elem((4, 3, 2), 1.0),
            fy: Array3::from_elem((4, 3, 2), 1.0),
            storage: Array3::from_elem((4, 3, 2), 4.0),
        };
        assert!(matches!(
            refine_layer(&short, &geometry, &time),
            Err(PreprocessError::ShapeMismatch { .. })
        ));
    }
}
