//! Grid dimensions and the static geometry of the grid cells.
//!
//! Every gridded field in this crate is indexed (time, level, lat, lon) or (time, lat, lon), in
//! that order. Rather than relying on that order silently, stages check the shapes of what they
//! receive with the helpers here and fail with [`PreprocessError::ShapeMismatch`].
use crate::error::{PreprocessError, Result};
use ndarray::{Array1, ArrayBase, Axis, Data, Dimension, Ix3, Ix4};

/// Gravitational acceleration (m s-2).
pub const G: f64 = 9.80665;

/// Density of liquid water (kg m-3).
pub const DENSITY_WATER: f64 = 1000.0;

/// Time axis of every field.
pub const TIME: Axis = Axis(0);
/// Level axis of (time, level, lat, lon) fields.
pub const LEVEL: Axis = Axis(1);
/// Latitude axis of (time, lat, lon) fields.
pub const LAT: Axis = Axis(1);
/// Longitude axis of (time, lat, lon) fields.
pub const LON: Axis = Axis(2);

/// Horizontal size of the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HorizontalShape {
    /// Number of latitude rows.
    pub nlat: usize,
    /// Number of longitude columns.
    pub nlon: usize,
}

/// Check a (time, lat, lon) field against the shape it must have.
pub fn expect_shape3<S>(
    variable: &'static str,
    field: &ArrayBase<S, Ix3>,
    ntime: usize,
    shape: HorizontalShape,
) -> Result<()>
where
    S: Data<Elem = f64>,
{
    expect_dims(variable, field, &[ntime, shape.nlat, shape.nlon])
}

/// Check a (time, level, lat, lon) field against the shape it must have.
pub fn expect_shape4<S>(
    variable: &'static str,
    field: &ArrayBase<S, Ix4>,
    ntime: usize,
    nlev: usize,
    shape: HorizontalShape,
) -> Result<()>
where
    S: Data,
{
    expect_dims(variable, field, &[ntime, nlev, shape.nlat, shape.nlon])
}

fn expect_dims<S, D>(variable: &'static str, field: &ArrayBase<S, D>, expected: &[usize]) -> Result<()>
where
    S: Data,
    D: Dimension,
{
    if field.shape() == expected {
        Ok(())
    } else {
        Err(PreprocessError::ShapeMismatch {
            variable,
            expected: expected.to_vec(),
            found: field.shape().to_vec(),
        })
    }
}

/// Fail if any value in the field is NaN or infinite.
pub fn expect_finite<S, D>(variable: &'static str, field: &ArrayBase<S, D>) -> Result<()>
where
    S: Data<Elem = f64>,
    D: Dimension,
{
    if field.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(PreprocessError::NonFinite { variable })
    }
}

/// Areas and edge lengths of the grid cells.
///
/// These only depend on latitude for a regular latitude-longitude grid and are computed once per
/// run by whoever reads the grid. Rows are ordered north to south.
#[derive(Debug, Clone, PartialEq)]
pub struct GridGeometry {
    area: Array1<f64>,
    ew_edge_length: f64,
    ns_edge_length: Array1<f64>,
    nlon: usize,
}

impl GridGeometry {
    /// Create the geometry of a grid.
    ///
    /// The first and last latitude rows are edge rows without a neighbour on one side. They see
    /// no horizontal inflow and get no vertical flux, so a grid needs at least three rows for
    /// anything to move between the layers.
    ///
    /// - `area` is the cell area in m² for each latitude row.
    /// - `ew_edge_length` is the length in m of the cell edges crossed by eastward transport.
    /// - `ns_edge_length` is the length in m of the cell edges crossed by northward transport,
    ///   taken halfway between the northern and southern edge of each row.
    pub fn new(
        area: Array1<f64>,
        ew_edge_length: f64,
        ns_edge_length: Array1<f64>,
        nlon: usize,
    ) -> Result<Self> {
        if ns_edge_length.len() != area.len() {
            return Err(PreprocessError::ShapeMismatch {
                variable: "ns_edge_length",
                expected: vec![area.len()],
                found: vec![ns_edge_length.len()],
            });
        }
        if area.is_empty() || nlon == 0 {
            return Err(PreprocessError::InvalidConfig(
                "grid needs at least one latitude row and one longitude".to_owned(),
            ));
        }
        expect_finite("area", &area)?;
        expect_finite("ns_edge_length", &ns_edge_length)?;
        if !ew_edge_length.is_finite() {
            return Err(PreprocessError::NonFinite {
                variable: "ew_edge_length",
            });
        }

        Ok(GridGeometry {
            area,
            ew_edge_length,
            ns_edge_length,
            nlon,
        })
    }

    /// The size of the grid.
    pub fn shape(&self) -> HorizontalShape {
        HorizontalShape {
            nlat: self.area.len(),
            nlon: self.nlon,
        }
    }

    /// Cell area in m² per latitude row.
    pub fn area(&self) -> &Array1<f64> {
        &self.area
    }

    /// Length of the edges crossed by eastward transport, in m.
    pub fn ew_edge_length(&self) -> f64 {
        self.ew_edge_length
    }

    /// Length of the edges crossed by northward transport per latitude row, in m.
    pub fn ns_edge_length(&self) -> &Array1<f64> {
        &self.ns_edge_length
    }
}
