//! Synthetic days for documentation examples, tests and benchmarks.
use crate::{
    column::{RawProfiles, SurfaceFields},
    config::PreprocessConfig,
    error::Result,
    grid::GridGeometry,
    layers::EvapPrecipInput,
    pipeline::DayInput,
};
use chrono::NaiveDate;
use ndarray::{arr1, Array1, Array3, Array4};

const DEGREE: f64 = 111_000.0;

/// Configuration with short refinement so tests stay fast.
pub fn test_config() -> PreprocessConfig {
    let mut config = PreprocessConfig::default();
    config.start_date = NaiveDate::from_ymd_opt(2013, 5, 1).unwrap_or(config.start_date);
    config.end_date = NaiveDate::from_ymd_opt(2013, 5, 3).unwrap_or(config.end_date);
    config.time.divt = 4;
    config.levels.n_levels = 10;
    config
}

/// A 2x2 one degree grid.
pub fn test_geometry() -> Result<GridGeometry> {
    grid_geometry(2, 2)
}

/// A one degree grid of `nlat` rows centred on the equator and `nlon` columns.
pub fn grid_geometry(nlat: usize, nlon: usize) -> Result<GridGeometry> {
    let lats: Array1<f64> = Array1::from_shape_fn(nlat, |i| {
        (nlat as f64 - 1.0) / 2.0 - i as f64
    });
    let cos_lat = lats.mapv(|lat| lat.to_radians().cos());
    let area = cos_lat.mapv(|c| DEGREE * DEGREE * c);
    let ns_edge_length = cos_lat.mapv(|c| DEGREE * c);

    GridGeometry::new(area, DEGREE, ns_edge_length, nlon)
}

/// A day without any water source or sink: winds, humidity and pressure are the same in every
/// cell and at every time and nothing evaporates or rains out, on the 2x2 test grid.
pub fn calm_day(config: &PreprocessConfig) -> DayInput {
    let ntime = config.time.count_time + 1;
    let dims3 = (ntime, 2, 2);
    let dims4 = (ntime, 3, 2, 2);

    let levels = arr1(&[85_000.0, 50_000.0, 30_000.0]);
    let q_levels = [0.008, 0.003, 0.001];

    DayInput {
        profiles: RawProfiles {
            levels,
            u: Array4::from_elem(dims4, 10.0),
            v: Array4::from_elem(dims4, -5.0),
            q: Array4::from_shape_fn(dims4, |(_, k, _, _)| q_levels[k]),
        },
        surface: SurfaceFields {
            sp: Array3::from_elem(dims3, 100_000.0),
            u10: Array3::from_elem(dims3, 5.0),
            v10: Array3::from_elem(dims3, -2.0),
            q2m: Array3::from_elem(dims3, 0.01),
        },
        evap_precip: EvapPrecipInput {
            evaporation: Array3::zeros((config.time.count_time, 2, 2)),
            precipitation: Array3::zeros((config.time.count_time, 2, 2)),
        },
    }
}

/// A day with winds, humidity, surface pressure, evaporation and precipitation varying in space
/// and time, on a grid of `nlat` by `nlon` cells with `nlev` model levels.
pub fn windy_day(config: &PreprocessConfig, nlat: usize, nlon: usize, nlev: usize) -> DayInput {
    let ntime = config.time.count_time + 1;
    let dims3 = (ntime, nlat, nlon);
    let dims4 = (ntime, nlev, nlat, nlon);

    // Model levels from 95_000 Pa up to 10_000 Pa
    let levels = Array1::from_shape_fn(nlev, |k| {
        95_000.0 - 85_000.0 * k as f64 / (nlev.max(2) - 1) as f64
    });
    let wave = |t: usize, i: usize, j: usize| {
        (0.7 * t as f64 + 0.9 * i as f64 + 1.3 * j as f64).sin()
    };

    let u = Array4::from_shape_fn(dims4, |(t, k, i, j)| 8.0 + 6.0 * wave(t, i + k, j));
    let v = Array4::from_shape_fn(dims4, |(t, k, i, j)| -3.0 + 5.0 * wave(t + k, j, i));
    let q = Array4::from_shape_fn(dims4, |(t, k, i, j)| {
        let p = levels[k];
        (0.012 * p / 100_000.0) * (1.0 + 0.2 * wave(t, i, j + k))
    });

    let sp = Array3::from_shape_fn(dims3, |(t, i, j)| 99_000.0 + 1_500.0 * wave(t, j, i));
    let u10 = Array3::from_shape_fn(dims3, |(t, i, j)| 4.0 + 2.0 * wave(t, i, j));
    let v10 = Array3::from_shape_fn(dims3, |(t, i, j)| -1.0 + 2.0 * wave(t, j, i));
    let q2m = Array3::from_shape_fn(dims3, |(t, i, j)| 0.012 * (1.0 + 0.2 * wave(t, i, j)));

    let nep = config.time.count_time;
    let evaporation =
        Array3::from_shape_fn((nep, nlat, nlon), |(t, i, j)| -0.0004 * (1.0 + wave(t, i, j)));
    let precipitation =
        Array3::from_shape_fn((nep, nlat, nlon), |(t, i, j)| 0.001 * (1.0 + wave(t, j, i)));

    DayInput {
        profiles: RawProfiles { levels, u, v, q },
        surface: SurfaceFields { sp, u10, v10, q2m },
        evap_precip: EvapPrecipInput {
            evaporation,
            precipitation,
        },
    }
}
