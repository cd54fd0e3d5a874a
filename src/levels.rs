//! Put assembled columns onto the levels used for vertical integration.
//!
//! There are two ways to get there:
//!   - [`interpolate_to_targets`] fits a curve through the valid levels of every column and
//!     evaluates it on a regular ladder of pressures from [`target_levels`] that has the
//!     boundary pressure spliced in. Moisture transport (wind times humidity) uses a shape
//!     preserving cubic, humidity a straight line.
//!   - [`assembled_levels`] uses the valid levels of the column itself. This requires the
//!     boundary to already be one of the levels.
//!
//! Either way the result is a set of [`LevelProfiles`] whose consecutive levels bound the sub
//! layers that get integrated. Columns with fewer valid levels than the array holds are padded
//! at the surface end with zero thickness levels.
use crate::{
    column::{Columns, ValidColumn},
    config::{LevelConfig, PreprocessConfig, Variant},
    error::{PreprocessError, Result},
    grid::{expect_shape3, expect_shape4, HorizontalShape, LEVEL},
    interpolation::{interpolate_column, InterpolationKind},
};
use itertools::izip;
use ndarray::{s, Array3, Array4, ArrayView3};

/// Moisture transport and humidity on integration levels, all (time, level, lat, lon) with
/// pressure increasing along the level axis.
#[derive(Debug, Clone)]
pub struct LevelProfiles {
    /// Pressure (Pa).
    pub pressure: Array4<f64>,
    /// Eastward wind times specific humidity (m/s).
    pub uq: Array4<f64>,
    /// Northward wind times specific humidity (m/s).
    pub vq: Array4<f64>,
    /// Specific humidity (kg/kg).
    pub q: Array4<f64>,
    /// Surface pressure (Pa), (time, lat, lon).
    pub surface_pressure: Array3<f64>,
    /// Boundary pressure (Pa), (time, lat, lon).
    pub boundary_pressure: Array3<f64>,
}

/// Put the columns on integration levels the way the configured variant does.
pub fn integration_levels(columns: &Columns, config: &PreprocessConfig) -> Result<LevelProfiles> {
    match config.variant {
        Variant::EcEarth => {
            let targets = target_levels(
                columns.surface_pressure.view(),
                columns.boundary_pressure.view(),
                &config.levels,
            )?;
            interpolate_to_targets(columns, &targets)
        }
        Variant::Era5 => assembled_levels(columns),
    }
}

/// Build the target pressure levels for every column.
///
/// `n_levels` levels are spaced evenly from `pressure_top` down to the surface. The boundary
/// pressure is inserted where it belongs by value, and the top sentinel pressure is added above
/// everything so the integration reaches the top of the atmosphere. The result has
/// `n_levels + 2` levels, increasing in pressure.
pub fn target_levels(
    sp: ArrayView3<f64>,
    p_boundary: ArrayView3<f64>,
    levels: &LevelConfig,
) -> Result<Array4<f64>> {
    let (ntime, nlat, nlon) = sp.dim();
    expect_shape3("boundary_pressure", &p_boundary, ntime, HorizontalShape { nlat, nlon })?;

    let n = levels.n_levels;
    if n < 2 {
        return Err(PreprocessError::InvalidConfig(
            "levels.n_levels must be at least 2".to_owned(),
        ));
    }
    let top = levels.pressure_top;
    let mut targets = Array4::<f64>::zeros((ntime, n + 2, nlat, nlon));
    let mut ladder: Vec<f64> = Vec::with_capacity(n + 2);

    for ((t, i, j), &sfc) in sp.indexed_iter() {
        let pb = p_boundary[[t, i, j]];
        if !(pb > top && pb < sfc) {
            return Err(PreprocessError::InvalidBoundary {
                time: t,
                lat: i,
                lon: j,
            });
        }

        let dp = (sfc - top) / (n - 1) as f64;

        ladder.clear();
        ladder.push(levels.top_sentinel);
        ladder.extend((0..n).rev().map(|k| sfc - dp * k as f64));

        // The boundary pushes every level at higher pressure one slot towards the surface.
        let pos = ladder.iter().position(|&p| p >= pb).unwrap_or(ladder.len());
        ladder.insert(pos, pb);

        for (dst, &p) in izip!(targets.slice_mut(s![t, .., i, j]), &ladder) {
            *dst = p;
        }
    }

    Ok(targets)
}

/// Interpolate the columns onto target pressures from [`target_levels`].
///
/// Every target must lie within the valid pressure range of its column, otherwise this fails
/// with [`PreprocessError::InterpolationDomain`] rather than extrapolate.
pub fn interpolate_to_targets(columns: &Columns, targets: &Array4<f64>) -> Result<LevelProfiles> {
    let ntime = columns.ntime();
    let shape = columns.horizontal_shape();
    let ntarget = targets.len_of(LEVEL);
    expect_shape4("target_levels", targets, ntime, ntarget, shape)?;

    let dims = targets.raw_dim();
    let mut uq_out = Array4::<f64>::zeros(dims.clone());
    let mut vq_out = Array4::<f64>::zeros(dims.clone());
    let mut q_out = Array4::<f64>::zeros(dims);

    let mut col = ValidColumn::default();
    let mut uq: Vec<f64> = Vec::with_capacity(columns.nlev());
    let mut vq: Vec<f64> = Vec::with_capacity(columns.nlev());
    let mut tgt: Vec<f64> = vec![0.0; ntarget];
    let mut out: Vec<f64> = vec![0.0; ntarget];

    for t in 0..ntime {
        for i in 0..shape.nlat {
            for j in 0..shape.nlon {
                columns.fill_valid_column(t, i, j, &mut col);
                if col.pressure.len() < 2 {
                    return Err(PreprocessError::EmptyColumn {
                        time: t,
                        lat: i,
                        lon: j,
                    });
                }

                uq.clear();
                uq.extend(izip!(&col.u, &col.q).map(|(u, q)| u * q));
                vq.clear();
                vq.extend(izip!(&col.v, &col.q).map(|(v, q)| v * q));

                for (dst, &p) in izip!(tgt.iter_mut(), targets.slice(s![t, .., i, j])) {
                    *dst = p;
                }

                use InterpolationKind::*;
                let at = (t, i, j);
                interpolate_column(ShapePreserving, "uq", at, &col.pressure, &uq, &tgt, &mut out)?;
                write_column(&mut uq_out, t, i, j, &out);
                interpolate_column(ShapePreserving, "vq", at, &col.pressure, &vq, &tgt, &mut out)?;
                write_column(&mut vq_out, t, i, j, &out);
                interpolate_column(Linear, "q", at, &col.pressure, &col.q, &tgt, &mut out)?;
                write_column(&mut q_out, t, i, j, &out);
            }
        }
    }

    Ok(LevelProfiles {
        pressure: targets.clone(),
        uq: uq_out,
        vq: vq_out,
        q: q_out,
        surface_pressure: columns.surface_pressure.clone(),
        boundary_pressure: columns.boundary_pressure.clone(),
    })
}

/// Use the valid levels of the assembled columns as the integration levels.
pub fn assembled_levels(columns: &Columns) -> Result<LevelProfiles> {
    let ntime = columns.ntime();
    let shape = columns.horizontal_shape();
    let dims = columns.pressure.raw_dim();

    let mut pressure = Array4::<f64>::zeros(dims.clone());
    let mut uq = Array4::<f64>::zeros(dims.clone());
    let mut vq = Array4::<f64>::zeros(dims.clone());
    let mut q = Array4::<f64>::zeros(dims);

    let mut col = ValidColumn::default();
    for t in 0..ntime {
        for i in 0..shape.nlat {
            for j in 0..shape.nlon {
                columns.fill_valid_column(t, i, j, &mut col);
                let n_valid = col.pressure.len();
                if n_valid < 2 {
                    return Err(PreprocessError::EmptyColumn {
                        time: t,
                        lat: i,
                        lon: j,
                    });
                }

                // Pad with copies of the surface level, zero thickness adds nothing.
                for k in 0..columns.nlev() {
                    let src = k.min(n_valid - 1);
                    pressure[[t, k, i, j]] = col.pressure[src];
                    uq[[t, k, i, j]] = col.u[src] * col.q[src];
                    vq[[t, k, i, j]] = col.v[src] * col.q[src];
                    q[[t, k, i, j]] = col.q[src];
                }
            }
        }
    }

    Ok(LevelProfiles {
        pressure,
        uq,
        vq,
        q,
        surface_pressure: columns.surface_pressure.clone(),
        boundary_pressure: columns.boundary_pressure.clone(),
    })
}

fn write_column(field: &mut Array4<f64>, t: usize, i: usize, j: usize, values: &[f64]) {
    for (dst, &val) in izip!(field.slice_mut(s![t, .., i, j]), values) {
        *dst = val;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        column::{build_columns, RawProfiles, SurfaceFields},
        utility::test_tools::approx_equal,
    };
    use itertools::Itertools;
    use ndarray::{arr1, Array3};

    fn config(variant: Variant, n_levels: usize) -> PreprocessConfig {
        let mut config = PreprocessConfig::default();
        config.variant = variant;
        config.levels.n_levels = n_levels;
        config
    }

    // Humidity and winds linear in pressure, 1 time x 1 x 2 grid.
    fn make_columns(variant: Variant) -> Columns {
        let levels = arr1(&[30_000.0, 60_000.0, 90_000.0]);
        let mut u = Array4::<f64>::zeros((1, 3, 1, 2));
        let mut v = Array4::<f64>::zeros((1, 3, 1, 2));
        let mut q = Array4::<f64>::zeros((1, 3, 1, 2));
        for (k, &p) in levels.iter().enumerate() {
            u.slice_mut(s![.., k, .., ..]).fill(8.0);
            v.slice_mut(s![.., k, .., ..]).fill(-2.0);
            q.slice_mut(s![.., k, .., ..]).fill(1.0e-7 * p);
        }
        let sp = Array3::from_elem((1, 1, 2), 100_000.0);
        let sfc = SurfaceFields {
            u10: Array3::from_elem((1, 1, 2), 8.0),
            v10: Array3::from_elem((1, 1, 2), -2.0),
            q2m: Array3::from_elem((1, 1, 2), 0.01),
            sp,
        };
        let raw = RawProfiles { levels, u, v, q };

        build_columns(&raw, &sfc, &config(variant, 5)).unwrap()
    }

    #[test]
    fn test_target_levels_include_boundary() {
        let sp = Array3::from_elem((1, 1, 1), 100_000.0);
        let pb = Array3::from_elem((1, 1, 1), 85_000.0);
        let cfg = config(Variant::EcEarth, 5);

        let targets = target_levels(sp.view(), pb.view(), &cfg.levels).unwrap();
        let col: Vec<f64> = targets.slice(s![0, .., 0, 0]).to_vec();

        assert_eq!(col.len(), 7);
        assert_eq!(col, vec![0.0, 20_000.0, 40_000.0, 60_000.0, 80_000.0, 85_000.0, 100_000.0]);
    }

    #[test]
    fn test_target_levels_monotonic() {
        let sp = Array3::from_shape_fn((2, 3, 4), |(t, i, j)| {
            90_000.0 + 1000.0 * (t + i + j) as f64
        });
        let cfg = config(Variant::EcEarth, 40);
        let pb = sp.mapv(|p| cfg.boundary.boundary_pressure(p));
        let targets = target_levels(sp.view(), pb.view(), &cfg.levels).unwrap();

        assert_eq!(targets.shape(), &[2, 42, 3, 4]);
        for ((t, i, j), &sfc) in sp.indexed_iter() {
            let col = targets.slice(s![t, .., i, j]);
            assert!(col.iter().tuple_windows::<(_, _)>().all(|(a, b)| b > a));
            assert!(col.iter().any(|&p| p == pb[[t, i, j]]));
            assert_eq!(col[col.len() - 1], sfc);
        }
    }

    #[test]
    fn test_boundary_outside_ladder_fails() {
        let sp = Array3::from_elem((1, 1, 1), 100_000.0);
        let pb = Array3::from_elem((1, 1, 1), 10_000.0);
        let cfg = config(Variant::EcEarth, 5);

        assert_eq!(
            target_levels(sp.view(), pb.view(), &cfg.levels).unwrap_err(),
            PreprocessError::InvalidBoundary {
                time: 0,
                lat: 0,
                lon: 0
            }
        );
    }

    #[test]
    fn test_interpolation_to_targets() {
        let cols = make_columns(Variant::EcEarth);
        let cfg = config(Variant::EcEarth, 5);
        let profiles = integration_levels(&cols, &cfg).unwrap();

        assert_eq!(profiles.pressure.shape(), &[1, 7, 1, 2]);
        for (&p, &q, &uq) in izip!(
            profiles.pressure.slice(s![0, .., 0, 1]),
            profiles.q.slice(s![0, .., 0, 1]),
            profiles.uq.slice(s![0, .., 0, 1])
        ) {
            assert!(q >= 0.0);
            if p <= 90_000.0 && p >= 30_000.0 {
                assert!(approx_equal(q, 1.0e-7 * p, 1.0e-12));
                assert!(approx_equal(uq, 8.0 * 1.0e-7 * p, 1.0e-10));
            }
        }
        // Top of the atmosphere is dry
        assert_eq!(profiles.q[[0, 0, 0, 1]], 0.0);
    }

    #[test]
    fn test_extrapolation_is_an_error() {
        let mut cols = make_columns(Variant::EcEarth);
        // Drop the top sentinel so the top target is outside the column
        cols.valid.slice_mut(s![.., 0, .., ..]).fill(false);
        let cfg = config(Variant::EcEarth, 5);

        match integration_levels(&cols, &cfg) {
            Err(PreprocessError::InterpolationDomain {
                variable,
                time,
                lat,
                lon,
                target,
                min,
                ..
            }) => {
                assert_eq!(variable, "uq");
                assert_eq!((time, lat, lon), (0, 0, 0));
                assert_eq!(target, 0.0);
                assert_eq!(min, 30_000.0);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_assembled_levels_pad_at_surface() {
        let cols = make_columns(Variant::Era5);
        let profiles = integration_levels(&cols, &config(Variant::Era5, 5)).unwrap();

        // 3 model levels + surface + top + boundary
        assert_eq!(profiles.pressure.shape(), &[1, 6, 1, 2]);
        let p: Vec<f64> = profiles.pressure.slice(s![0, .., 0, 0]).to_vec();
        let pb = cols.boundary_pressure[[0, 0, 0]];
        assert_eq!(p, vec![0.0, 30_000.0, 60_000.0, pb, 90_000.0, 100_000.0]);

        assert_eq!(profiles.uq[[0, 5, 0, 0]], 8.0 * 0.01);
    }
}
