//! Surface fields derived from the raw data: surface pressure, the boundary between the two
//! layers, and near surface humidity.
use crate::{
    config::BoundaryConfig,
    error::{PreprocessError, Result},
    grid::expect_finite,
};
use metfor::{Celsius, HectoPascal, Kelvin};
use ndarray::{Array3, ArrayView3, Zip};

/// Surface pressure in Pa from its natural logarithm, as EC-Earth stores it.
pub fn surface_pressure_from_log(ln_sp: ArrayView3<f64>) -> Result<Array3<f64>> {
    expect_finite("lnsp", &ln_sp)?;
    Ok(ln_sp.mapv(f64::exp))
}

/// Pressure separating the upper and lower layer for every column, in Pa.
///
/// Fails if the surface pressure contains non-finite or non-positive values, such a column has
/// no usable profile.
pub fn boundary_pressure(sp: ArrayView3<f64>, boundary: &BoundaryConfig) -> Result<Array3<f64>> {
    expect_finite("sp", &sp)?;
    if sp.iter().any(|&p| p <= 0.0) {
        return Err(PreprocessError::NonPositive { variable: "sp" });
    }
    Ok(sp.mapv(|p| boundary.boundary_pressure(p)))
}

/// Specific humidity (kg/kg) at 2 m from the 2 m dew point (K) and surface pressure (Pa).
pub fn specific_humidity_from_dew_point(
    d2m: ArrayView3<f64>,
    sp: ArrayView3<f64>,
) -> Result<Array3<f64>> {
    if d2m.shape() != sp.shape() {
        return Err(PreprocessError::ShapeMismatch {
            variable: "d2m",
            expected: sp.shape().to_vec(),
            found: d2m.shape().to_vec(),
        });
    }
    expect_finite("d2m", &d2m)?;
    expect_finite("sp", &sp)?;

    let mut q = Array3::<f64>::zeros(sp.raw_dim());
    let mut failed = false;
    Zip::from(&mut q)
        .and(&d2m)
        .and(&sp)
        .for_each(|q, &dp, &p| {
            let dp = Celsius::from(Kelvin(dp));
            let p = HectoPascal(p / 100.0);
            match metfor::specific_humidity(dp, p) {
                Some(sh) => *q = sh,
                None => failed = true,
            }
        });

    if failed {
        Err(PreprocessError::InvalidHumidity { variable: "d2m" })
    } else {
        Ok(q)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::utility::test_tools::approx_equal;
    use ndarray::Array3;

    #[test]
    fn test_log_surface_pressure() {
        let ln_sp = Array3::from_elem((2, 3, 4), 100_000.0f64.ln());
        let sp = surface_pressure_from_log(ln_sp.view()).unwrap();
        assert!(sp.iter().all(|&p| approx_equal(p, 100_000.0, 1.0e-6)));
    }

    #[test]
    fn test_boundary_pressure_rejects_bad_surface() {
        let mut sp = Array3::from_elem((2, 3, 4), 100_000.0);
        let bnd = boundary_pressure(sp.view(), &BoundaryConfig::default()).unwrap();
        assert!(bnd.iter().all(|&p| p < 100_000.0 && p > 70_000.0));

        sp[[1, 1, 1]] = 0.0;
        assert_eq!(
            boundary_pressure(sp.view(), &BoundaryConfig::default()),
            Err(PreprocessError::NonPositive { variable: "sp" })
        );

        sp[[1, 1, 1]] = f64::NAN;
        assert_eq!(
            boundary_pressure(sp.view(), &BoundaryConfig::default()),
            Err(PreprocessError::NonFinite { variable: "sp" })
        );
    }

    #[test]
    fn test_humidity_from_dew_point() {
        let sp = Array3::from_elem((1, 2, 2), 100_000.0);
        let cold = Array3::from_elem((1, 2, 2), 263.15);
        let warm = Array3::from_elem((1, 2, 2), 293.15);

        let q_cold = specific_humidity_from_dew_point(cold.view(), sp.view()).unwrap();
        let q_warm = specific_humidity_from_dew_point(warm.view(), sp.view()).unwrap();

        for (&c, &w) in q_cold.iter().zip(q_warm.iter()) {
            assert!(c > 0.0);
            assert!(w > c);
            // About 14.7 g/kg for a 20C dew point at 1000 hPa.
            assert!(w > 0.012 && w < 0.017);
        }
    }
}
