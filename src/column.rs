//! Assemble complete vertical columns from model level and surface data.
//!
//! Model level data stops somewhere above the ground and says nothing about the top of the
//! atmosphere. Each column gets two synthetic levels:
//!   - a surface level at the true surface pressure carrying the 10 m wind and 2 m humidity,
//!   - a top level at a near zero sentinel pressure that repeats the wind of the highest model
//!     level and is completely dry.
//!
//! Model levels within a small margin of the surface (or below it) are marked invalid, they add
//! no information and make the cubic interpolation later on wiggle. Invalid levels stay in the
//! arrays, a boolean mask of the same shape says which ones to use. Nothing downstream mutates
//! the columns, they read the mask.
//!
//! For the ERA5 variant the boundary pressure is inserted as one more level with values
//! interpolated linearly at that pressure. Every column is sorted so pressure increases along
//! the level axis, top of the atmosphere first.
use crate::{
    config::{PreprocessConfig, Variant},
    error::{PreprocessError, Result},
    grid::{expect_finite, expect_shape3, expect_shape4, HorizontalShape, LEVEL},
    interpolation::linear_interpolate,
    surface::boundary_pressure,
};
use itertools::{izip, Itertools};
use ndarray::{s, Array1, Array3, Array4};
use std::cmp::Ordering;

/// Wind and humidity on the model's pressure levels.
#[derive(Debug, Clone)]
pub struct RawProfiles {
    /// Pressure of each model level in Pa, in any order.
    pub levels: Array1<f64>,
    /// Eastward wind (m/s), (time, level, lat, lon).
    pub u: Array4<f64>,
    /// Northward wind (m/s), (time, level, lat, lon).
    pub v: Array4<f64>,
    /// Specific humidity (kg/kg), (time, level, lat, lon).
    pub q: Array4<f64>,
}

/// Near surface counterparts of the profiles, all (time, lat, lon).
#[derive(Debug, Clone)]
pub struct SurfaceFields {
    /// Surface pressure (Pa).
    pub sp: Array3<f64>,
    /// 10 m eastward wind (m/s).
    pub u10: Array3<f64>,
    /// 10 m northward wind (m/s).
    pub v10: Array3<f64>,
    /// 2 m specific humidity (kg/kg).
    pub q2m: Array3<f64>,
}

/// Complete columns sorted by increasing pressure, all (time, level, lat, lon).
#[derive(Debug, Clone)]
pub struct Columns {
    /// Pressure (Pa).
    pub pressure: Array4<f64>,
    /// Eastward wind (m/s).
    pub u: Array4<f64>,
    /// Northward wind (m/s).
    pub v: Array4<f64>,
    /// Specific humidity (kg/kg).
    pub q: Array4<f64>,
    /// Which levels hold usable data.
    pub valid: Array4<bool>,
    /// Surface pressure (Pa), (time, lat, lon).
    pub surface_pressure: Array3<f64>,
    /// Pressure of the boundary between the upper and lower layer (Pa), (time, lat, lon).
    pub boundary_pressure: Array3<f64>,
}

/// The valid part of a single column, pressure strictly increasing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidColumn {
    /// Pressure (Pa).
    pub pressure: Vec<f64>,
    /// Eastward wind (m/s).
    pub u: Vec<f64>,
    /// Northward wind (m/s).
    pub v: Vec<f64>,
    /// Specific humidity (kg/kg).
    pub q: Vec<f64>,
}

impl Columns {
    /// Number of time steps.
    pub fn ntime(&self) -> usize {
        self.pressure.shape()[0]
    }

    /// Number of levels in every column, valid or not.
    pub fn nlev(&self) -> usize {
        self.pressure.len_of(LEVEL)
    }

    /// Size of the horizontal grid.
    pub fn horizontal_shape(&self) -> HorizontalShape {
        let shape = self.pressure.shape();
        HorizontalShape {
            nlat: shape[2],
            nlon: shape[3],
        }
    }

    /// Copy out the valid levels of the column at (time, lat, lon).
    pub fn valid_column(&self, t: usize, i: usize, j: usize) -> ValidColumn {
        let mut col = ValidColumn::default();
        self.fill_valid_column(t, i, j, &mut col);
        col
    }

    pub(crate) fn fill_valid_column(&self, t: usize, i: usize, j: usize, col: &mut ValidColumn) {
        col.pressure.clear();
        col.u.clear();
        col.v.clear();
        col.q.clear();

        for (&ok, &p, &u, &v, &q) in izip!(
            self.valid.slice(s![t, .., i, j]),
            self.pressure.slice(s![t, .., i, j]),
            self.u.slice(s![t, .., i, j]),
            self.v.slice(s![t, .., i, j]),
            self.q.slice(s![t, .., i, j])
        ) {
            if ok {
                col.pressure.push(p);
                col.u.push(u);
                col.v.push(v);
                col.q.push(q);
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct LevelSample {
    pressure: f64,
    u: f64,
    v: f64,
    q: f64,
    valid: bool,
}

/// Assemble the columns for one day.
pub fn build_columns(
    profiles: &RawProfiles,
    surface: &SurfaceFields,
    config: &PreprocessConfig,
) -> Result<Columns> {
    let (ntime, nlev, nlat, nlon) = profiles.u.dim();
    let shape = HorizontalShape { nlat, nlon };

    if profiles.levels.len() != nlev {
        return Err(PreprocessError::ShapeMismatch {
            variable: "levels",
            expected: vec![nlev],
            found: vec![profiles.levels.len()],
        });
    }
    if nlev == 0 {
        return Err(PreprocessError::InvalidConfig(
            "no model levels in the input".to_owned(),
        ));
    }
    expect_shape4("v", &profiles.v, ntime, nlev, shape)?;
    expect_shape4("q", &profiles.q, ntime, nlev, shape)?;
    expect_shape3("sp", &surface.sp, ntime, shape)?;
    expect_shape3("u10", &surface.u10, ntime, shape)?;
    expect_shape3("v10", &surface.v10, ntime, shape)?;
    expect_shape3("q2m", &surface.q2m, ntime, shape)?;

    expect_finite("levels", &profiles.levels)?;
    expect_finite("u", &profiles.u)?;
    expect_finite("v", &profiles.v)?;
    expect_finite("q", &profiles.q)?;
    expect_finite("u10", &surface.u10)?;
    expect_finite("v10", &surface.v10)?;
    expect_finite("q2m", &surface.q2m)?;

    let p_boundary = boundary_pressure(surface.sp.view(), &config.boundary)?;

    let insert_boundary = config.variant == Variant::Era5;
    let ncol = nlev + 2 + if insert_boundary { 1 } else { 0 };

    let top_model_level = profiles
        .levels
        .iter()
        .position_min_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal))
        .unwrap_or(0);

    let dims = (ntime, ncol, nlat, nlon);
    let mut pressure = Array4::<f64>::zeros(dims);
    let mut u = Array4::<f64>::zeros(dims);
    let mut v = Array4::<f64>::zeros(dims);
    let mut q = Array4::<f64>::zeros(dims);
    let mut valid = Array4::<bool>::from_elem(dims, false);

    let margin = config.levels.surface_margin;
    let mut column: Vec<LevelSample> = Vec::with_capacity(ncol);

    for ((t, i, j), &sp) in surface.sp.indexed_iter() {
        column.clear();

        // Model levels, masked close to and below the surface
        column.extend(profiles.levels.iter().enumerate().map(|(k, &p)| LevelSample {
            pressure: p,
            u: profiles.u[[t, k, i, j]],
            v: profiles.v[[t, k, i, j]],
            q: profiles.q[[t, k, i, j]],
            valid: p <= sp - margin,
        }));

        // Surface
        column.push(LevelSample {
            pressure: sp,
            u: surface.u10[[t, i, j]],
            v: surface.v10[[t, i, j]],
            q: surface.q2m[[t, i, j]],
            valid: true,
        });

        // Top of the atmosphere, dry
        column.push(LevelSample {
            pressure: config.levels.top_sentinel,
            u: profiles.u[[t, top_model_level, i, j]],
            v: profiles.v[[t, top_model_level, i, j]],
            q: 0.0,
            valid: true,
        });

        sort_by_pressure(&mut column);

        if insert_boundary {
            let boundary = interpolate_level(&column, p_boundary[[t, i, j]], (t, i, j))?;
            column.push(boundary);
            sort_by_pressure(&mut column);
        }

        check_strictly_increasing(&column, t, i, j)?;

        for (k, lvl) in column.iter().enumerate() {
            pressure[[t, k, i, j]] = lvl.pressure;
            u[[t, k, i, j]] = lvl.u;
            v[[t, k, i, j]] = lvl.v;
            q[[t, k, i, j]] = lvl.q;
            valid[[t, k, i, j]] = lvl.valid;
        }
    }

    Ok(Columns {
        pressure,
        u,
        v,
        q,
        valid,
        surface_pressure: surface.sp.clone(),
        boundary_pressure: p_boundary,
    })
}

fn sort_by_pressure(column: &mut [LevelSample]) {
    // All pressures were checked finite, so the fallback ordering is never used.
    column.sort_by(|a, b| {
        a.pressure
            .partial_cmp(&b.pressure)
            .unwrap_or(Ordering::Equal)
    });
}

// Linear interpolation of every variable at `target_p` using only valid levels.
fn interpolate_level(
    column: &[LevelSample],
    target_p: f64,
    (time, lat, lon): (usize, usize, usize),
) -> Result<LevelSample> {
    let valid: Vec<&LevelSample> = column.iter().filter(|lvl| lvl.valid).collect();
    let p: Vec<f64> = valid.iter().map(|lvl| lvl.pressure).collect();

    let interp = |variable: &'static str, ys: Vec<f64>| {
        linear_interpolate(&p, &ys, target_p)
            .into_option()
            .ok_or(PreprocessError::InterpolationDomain {
                variable,
                time,
                lat,
                lon,
                target: target_p,
                min: p.first().cloned().unwrap_or(std::f64::NAN),
                max: p.last().cloned().unwrap_or(std::f64::NAN),
            })
    };

    Ok(LevelSample {
        pressure: target_p,
        u: interp("u", valid.iter().map(|lvl| lvl.u).collect())?,
        v: interp("v", valid.iter().map(|lvl| lvl.v).collect())?,
        q: interp("q", valid.iter().map(|lvl| lvl.q).collect())?,
        valid: true,
    })
}

fn check_strictly_increasing(column: &[LevelSample], t: usize, i: usize, j: usize) -> Result<()> {
    let increasing = column
        .iter()
        .filter(|lvl| lvl.valid)
        .tuple_windows::<(_, _)>()
        .all(|(below, above)| above.pressure > below.pressure);

    if increasing {
        Ok(())
    } else {
        Err(PreprocessError::NonMonotonic {
            variable: "pressure",
            time: t,
            lat: i,
            lon: j,
        })
    }
}
