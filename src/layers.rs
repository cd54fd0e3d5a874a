//! Vertically integrated moisture fluxes and storages of the two layers.
//!
//! The integration levels from [`integration_levels`](crate::integration_levels) bound a stack of
//! sub layers. Each sub layer carries the mean of its bounding levels, and
//!
//! ```text
//!     Fx = uq dp / g        (kg m-1 s-1)
//!     Fy = vq dp / g        (kg m-1 s-1)
//!     W  = q  dp / g  A / rho_w   (m3)
//! ```
//!
//! Sub layers above the boundary pressure add to the upper layer, the rest to the lower layer.
use crate::{
    error::{PreprocessError, Result},
    grid::{expect_finite, expect_shape3, expect_shape4, GridGeometry, DENSITY_WATER, G},
    levels::LevelProfiles,
};
use itertools::izip;
use ndarray::{s, Array3, Array4, ArrayView3, Zip};

/// Horizontal fluxes and storage of one layer, all (time, lat, lon).
///
/// Native integrals have the same number of samples for all three fields. After refinement the
/// storage has one more sample than the fluxes, the storage is sampled at the instants bounding
/// each flux step.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerState {
    /// Eastward moisture flux.
    pub fx: Array3<f64>,
    /// Northward moisture flux.
    pub fy: Array3<f64>,
    /// Water content (m3).
    pub storage: Array3<f64>,
}

impl LayerState {
    fn zeros(dims: (usize, usize, usize)) -> Self {
        LayerState {
            fx: Array3::zeros(dims),
            fy: Array3::zeros(dims),
            storage: Array3::zeros(dims),
        }
    }
}

/// Result of the vertical integration.
#[derive(Debug, Clone)]
pub struct LayerIntegrals {
    /// Everything at lower pressure than the boundary.
    pub upper: LayerState,
    /// Everything between the boundary and the surface.
    pub lower: LayerState,
    /// Column water content integrated without the split (m3).
    pub total_storage: Array3<f64>,
}

impl LayerIntegrals {
    /// Largest relative difference between the column storage and the sum of both layers.
    ///
    /// Columns without any water are compared in absolute terms.
    pub fn conservation_error(&self) -> f64 {
        izip!(
            &self.total_storage,
            &self.upper.storage,
            &self.lower.storage
        )
        .map(|(&total, &upper, &lower)| {
            let diff = (total - upper - lower).abs();
            if total.abs() > 0.0 {
                diff / total.abs()
            } else {
                diff
            }
        })
        .fold(0.0, f64::max)
    }
}

/// Integrate the profiles over both layers.
pub fn integrate_layers(
    profiles: &LevelProfiles,
    geometry: &GridGeometry,
) -> Result<LayerIntegrals> {
    let (ntime, nlev, nlat, nlon) = profiles.pressure.dim();
    let shape = geometry.shape();
    expect_shape4("pressure", &profiles.pressure, ntime, nlev, shape)?;
    expect_shape4("uq", &profiles.uq, ntime, nlev, shape)?;
    expect_shape4("vq", &profiles.vq, ntime, nlev, shape)?;
    expect_shape4("q", &profiles.q, ntime, nlev, shape)?;
    expect_shape3("boundary_pressure", &profiles.boundary_pressure, ntime, shape)?;
    expect_finite("uq", &profiles.uq)?;
    expect_finite("vq", &profiles.vq)?;
    expect_finite("q", &profiles.q)?;

    let dims = (ntime, nlat, nlon);
    let mut upper = LayerState::zeros(dims);
    let mut lower = LayerState::zeros(dims);
    let mut total_storage = Array3::<f64>::zeros(dims);

    let p = &profiles.pressure;
    let sub_layer_tops = p.slice(s![.., ..nlev.saturating_sub(1), .., ..]);
    for ((t, k, i, j), &p0) in sub_layer_tops.indexed_iter() {
        let p1 = p[[t, k + 1, i, j]];
        let mean = |field: &Array4<f64>| 0.5 * (field[[t, k, i, j]] + field[[t, k + 1, i, j]]);

        // A locally inverted profile must not produce negative water.
        let dp = (p1 - p0).max(0.0);
        let p_mid = 0.5 * (p0 + p1);

        let w = mean(&profiles.q) * dp / G;
        total_storage[[t, i, j]] += w;

        let layer = if p_mid < profiles.boundary_pressure[[t, i, j]] {
            &mut upper
        } else {
            &mut lower
        };
        layer.fx[[t, i, j]] += mean(&profiles.uq) * dp / G;
        layer.fy[[t, i, j]] += mean(&profiles.vq) * dp / G;
        layer.storage[[t, i, j]] += w;
    }

    // kg m-2 to m3
    to_volume(&mut upper.storage, geometry);
    to_volume(&mut lower.storage, geometry);
    to_volume(&mut total_storage, geometry);

    let integrals = LayerIntegrals {
        upper,
        lower,
        total_storage,
    };

    let err = integrals.conservation_error();
    if err > 1.0e-6 {
        log::warn!(
            "layer storages differ from the column storage by {:e} (relative)",
            err
        );
    }

    Ok(integrals)
}

// Multiply a depth of water in kg m-2 by the cell area and divide by the water density.
fn to_volume(field: &mut Array3<f64>, geometry: &GridGeometry) {
    for (i, &area) in geometry.area().iter().enumerate() {
        field
            .slice_mut(s![.., i, ..])
            .mapv_inplace(|w| w * area / DENSITY_WATER);
    }
}

/// Evaporation and precipitation as read from the raw data, both (time, lat, lon) in m of water
/// per native interval, downward positive.
///
/// Evaporation follows the reanalysis convention, negative values evaporate.
#[derive(Debug, Clone)]
pub struct EvapPrecipInput {
    /// Accumulated evaporation (m).
    pub evaporation: Array3<f64>,
    /// Accumulated total precipitation (m).
    pub precipitation: Array3<f64>,
}

impl EvapPrecipInput {
    /// Build the input from total precipitation split into its convective and large scale parts.
    pub fn precip_from_components(
        evaporation: Array3<f64>,
        convective: ArrayView3<f64>,
        large_scale: ArrayView3<f64>,
    ) -> Result<Self> {
        if convective.shape() != large_scale.shape() {
            return Err(PreprocessError::ShapeMismatch {
                variable: "lsp",
                expected: convective.shape().to_vec(),
                found: large_scale.shape().to_vec(),
            });
        }
        let precipitation = &convective + &large_scale;

        Ok(EvapPrecipInput {
            evaporation,
            precipitation,
        })
    }

    /// Number of native samples.
    pub fn ntime(&self) -> usize {
        self.precipitation.shape()[0]
    }
}

/// Evaporation and precipitation volumes (m3), both non-negative.
#[derive(Debug, Clone, PartialEq)]
pub struct EvapPrecip {
    /// Water entering the lower layer from the surface.
    pub evaporation: Array3<f64>,
    /// Water leaving the atmosphere.
    pub precipitation: Array3<f64>,
}

/// Repair the sign convention of evaporation and precipitation and convert both to volumes.
///
/// Positive evaporation in the raw data is condensation onto the surface and counts as
/// precipitation.
pub fn evaporation_precipitation(
    input: &EvapPrecipInput,
    geometry: &GridGeometry,
) -> Result<EvapPrecip> {
    let ntime = input.ntime();
    let shape = geometry.shape();
    expect_shape3("tp", &input.precipitation, ntime, shape)?;
    expect_shape3("e", &input.evaporation, ntime, shape)?;
    expect_finite("tp", &input.precipitation)?;
    expect_finite("e", &input.evaporation)?;

    let mut precipitation = Array3::<f64>::zeros(input.precipitation.raw_dim());
    let mut evaporation = Array3::<f64>::zeros(input.evaporation.raw_dim());
    Zip::from(&mut precipitation)
        .and(&mut evaporation)
        .and(&input.precipitation)
        .and(&input.evaporation)
        .for_each(|p_out, e_out, &p, &e| {
            *p_out = (p + e.max(0.0)).max(0.0);
            *e_out = e.min(0.0).abs();
        });

    for (i, &area) in geometry.area().iter().enumerate() {
        precipitation.slice_mut(s![.., i, ..]).mapv_inplace(|p| p * area);
        evaporation.slice_mut(s![.., i, ..]).mapv_inplace(|e| e * area);
    }

    Ok(EvapPrecip {
        evaporation,
        precipitation,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::utility::test_tools::approx_equal;
    use ndarray::{arr1, Array1, Array3, Array4};

    fn geometry(nlat: usize, nlon: usize) -> GridGeometry {
        GridGeometry::new(
            Array1::from_elem(nlat, 2.0e6),
            1000.0,
            Array1::from_elem(nlat, 1000.0),
            nlon,
        )
        .unwrap()
    }

    // Four levels 0, 40_000, 80_000 (boundary), 100_000 Pa.
    fn profiles() -> LevelProfiles {
        let levels = arr1(&[0.0, 40_000.0, 80_000.0, 100_000.0]);
        let q_lvl = arr1(&[0.0, 0.002, 0.006, 0.01]);
        let dims = (2, 4, 3, 2);
        let pressure = Array4::from_shape_fn(dims, |(_, k, _, _)| levels[k]);
        let q = Array4::from_shape_fn(dims, |(_, k, _, _)| q_lvl[k]);
        let uq = q.mapv(|q| 5.0 * q);
        let vq = q.mapv(|q| -2.0 * q);

        LevelProfiles {
            pressure,
            uq,
            vq,
            q,
            surface_pressure: Array3::from_elem((2, 3, 2), 100_000.0),
            boundary_pressure: Array3::from_elem((2, 3, 2), 80_000.0),
        }
    }

    #[test]
    fn test_layer_split() {
        let geom = geometry(3, 2);
        let ints = integrate_layers(&profiles(), &geom).unwrap();

        // Upper: 0.001 * 40_000 + 0.004 * 40_000, lower: 0.008 * 20_000
        let upper_w = (40.0 + 160.0) / G * 2.0e6 / DENSITY_WATER;
        let lower_w = 160.0 / G * 2.0e6 / DENSITY_WATER;

        for &w in &ints.upper.storage {
            assert!(approx_equal(w, upper_w, 1.0e-9));
        }
        for &w in &ints.lower.storage {
            assert!(approx_equal(w, lower_w, 1.0e-9));
        }
        for &fx in &ints.upper.fx {
            assert!(approx_equal(fx, 5.0 * 200.0 / G, 1.0e-9));
        }
        for &fy in &ints.lower.fy {
            assert!(approx_equal(fy, -2.0 * 160.0 / G, 1.0e-9));
        }
        assert!(ints.conservation_error() < 1.0e-12);
    }

    #[test]
    fn test_inverted_levels_add_nothing() {
        let mut prof = profiles();
        // Swap two levels in one column
        prof.pressure[[0, 1, 0, 0]] = 90_000.0;
        let ints = integrate_layers(&prof, &geometry(3, 2)).unwrap();

        assert!(ints.upper.storage.iter().all(|&w| w >= 0.0));
        assert!(ints.lower.storage.iter().all(|&w| w >= 0.0));
        assert!(ints.conservation_error() < 1.0e-12);
    }

    #[test]
    fn test_shape_mismatch() {
        let err = integrate_layers(&profiles(), &geometry(4, 2));
        assert!(matches!(err, Err(PreprocessError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_evaporation_precipitation() {
        let geom = geometry(3, 1);
        let e = Array3::from_shape_vec((1, 3, 1), vec![-0.002, 0.001, 0.003]).unwrap();
        let p = Array3::from_shape_vec((1, 3, 1), vec![0.004, 0.0, -0.005]).unwrap();
        let ep = evaporation_precipitation(
            &EvapPrecipInput {
                evaporation: e,
                precipitation: p,
            },
            &geom,
        )
        .unwrap();

        let area = 2.0e6;
        assert!(approx_equal(ep.evaporation[[0, 0, 0]], 0.002 * area, 1.0e-9));
        assert_eq!(ep.evaporation[[0, 1, 0]], 0.0);
        assert!(approx_equal(ep.precipitation[[0, 0, 0]], 0.004 * area, 1.0e-9));
        assert!(approx_equal(ep.precipitation[[0, 1, 0]], 0.001 * area, 1.0e-9));
        // Never negative
        assert_eq!(ep.precipitation[[0, 2, 0]], 0.0);
    }

    #[test]
    fn test_precip_components() {
        let e = Array3::<f64>::zeros((2, 3, 1));
        let cp = Array3::from_elem((2, 3, 1), 0.001);
        let lsp = Array3::from_elem((2, 3, 1), 0.002);
        let input = EvapPrecipInput::precip_from_components(e, cp.view(), lsp.view()).unwrap();
        assert!(input.precipitation.iter().all(|&p| approx_equal(p, 0.003, 1.0e-15)));

        let bad = Array3::from_elem((1, 3, 1), 0.002);
        let e = Array3::<f64>::zeros((2, 3, 1));
        assert!(EvapPrecipInput::precip_from_components(e, cp.view(), bad.view()).is_err());
    }
}
