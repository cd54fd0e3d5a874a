//! One dimensional interpolation along a single column.
//!
//! Columns are given as parallel slices of pressure and value with the pressure strictly
//! increasing. Nothing here extrapolates, a target outside the span of the column is an error
//! (or a missing value from the lower level functions).
use crate::error::{PreprocessError, Result};
use itertools::{izip, Itertools};
use optional::{none, some, Optioned};
use strum_macros::{EnumIter, IntoStaticStr};

/// The curve fitted through the points of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, IntoStaticStr)]
pub enum InterpolationKind {
    /// Straight lines between neighbouring points.
    Linear,
    /// Monotone piecewise cubic Hermite curve. It never overshoots the data, so a product like
    /// wind times humidity cannot change sign between two points that agree in sign.
    ShapePreserving,
}

/// Interpolate values given two parallel vectors of data and a target value.
///
/// Assumes that xs is monotonic.
#[inline]
pub fn linear_interpolate(xs: &[f64], ys: &[f64], target_x: f64) -> Optioned<f64> {
    debug_assert_eq!(xs.len(), ys.len());

    enum BracketType {
        Bracket((f64, f64), (f64, f64)),
        EndEqual((f64, f64)),
    }

    let make_bracket = |pnt_0: (f64, f64), pnt_1: (f64, f64)| -> Option<BracketType> {
        let (x0, _) = pnt_0;
        let (x1, _) = pnt_1;

        if (x0 < target_x && x1 > target_x) || (x0 > target_x && x1 < target_x) {
            Some(BracketType::Bracket(pnt_0, pnt_1))
        } else if x0 == target_x {
            Some(BracketType::EndEqual(pnt_0))
        } else if x1 == target_x {
            Some(BracketType::EndEqual(pnt_1))
        } else {
            None
        }
    };

    let value_opt = izip!(xs, ys)
        .map(|(&x, &y)| (x, y))
        // Look at them in pairs.
        .tuple_windows::<(_, _)>()
        // Make a bracket and filter out all levels the don't create a bracket.
        .filter_map(|(pnt_0, pnt_1)| make_bracket(pnt_0, pnt_1))
        // Get the first one that brackets the target value
        .next()
        .map(|val| match val {
            BracketType::Bracket((x0, y0), (x1, y1)) => linear_interp(target_x, x0, x1, y0, y1),
            BracketType::EndEqual((_, y)) => y,
        });

    Optioned::from(value_opt)
}

#[inline]
pub(crate) fn linear_interp(x_val: f64, x1: f64, x2: f64, y1: f64, y2: f64) -> f64 {
    debug_assert_ne!(x1, x2);

    let run = x2 - x1;
    let rise = y2 - y1;
    let dx = x_val - x1;

    y1 + dx * (rise / run)
}

/// A monotone piecewise cubic Hermite interpolant (Fritsch-Carlson slopes).
#[derive(Debug, Clone)]
pub struct Pchip<'a> {
    xs: &'a [f64],
    ys: &'a [f64],
    slopes: Vec<f64>,
}

impl<'a> Pchip<'a> {
    /// Fit the curve. `xs` must be strictly increasing and have at least two points.
    pub fn new(xs: &'a [f64], ys: &'a [f64]) -> Option<Self> {
        if xs.len() < 2 || xs.len() != ys.len() {
            return None;
        }

        let h: Vec<f64> = xs.iter().tuple_windows::<(_, _)>().map(|(x0, x1)| x1 - x0).collect();
        if h.iter().any(|&h| !(h > 0.0)) {
            return None;
        }
        let delta: Vec<f64> = izip!(ys.iter().tuple_windows::<(_, _)>(), &h)
            .map(|((y0, y1), h)| (y1 - y0) / h)
            .collect();

        let n = xs.len();
        let mut slopes = vec![0.0; n];

        if n == 2 {
            slopes[0] = delta[0];
            slopes[1] = delta[0];
            return Some(Pchip { xs, ys, slopes });
        }

        for k in 1..n - 1 {
            let (d0, d1) = (delta[k - 1], delta[k]);
            if d0 * d1 > 0.0 {
                // Weighted harmonic mean
                let w1 = 2.0 * h[k] + h[k - 1];
                let w2 = h[k] + 2.0 * h[k - 1];
                slopes[k] = (w1 + w2) / (w1 / d0 + w2 / d1);
            }
        }

        slopes[0] = end_slope(h[0], h[1], delta[0], delta[1]);
        slopes[n - 1] = end_slope(h[n - 2], h[n - 3], delta[n - 2], delta[n - 3]);

        Some(Pchip { xs, ys, slopes })
    }

    /// Evaluate the curve, missing if `x` is outside the fitted points.
    pub fn evaluate(&self, x: f64) -> Optioned<f64> {
        let n = self.xs.len();
        if !(x >= self.xs[0] && x <= self.xs[n - 1]) {
            return none();
        }

        // Index of the interval containing x
        let k = match self.xs.iter().position(|&xk| xk > x) {
            Some(0) => 0,
            Some(i) => i - 1,
            None => n - 2,
        };

        let h = self.xs[k + 1] - self.xs[k];
        let t = (x - self.xs[k]) / h;
        let t2 = t * t;
        let t3 = t2 * t;

        let h00 = 2.0 * t3 - 3.0 * t2 + 1.0;
        let h10 = t3 - 2.0 * t2 + t;
        let h01 = -2.0 * t3 + 3.0 * t2;
        let h11 = t3 - t2;

        some(
            h00 * self.ys[k]
                + h10 * h * self.slopes[k]
                + h01 * self.ys[k + 1]
                + h11 * h * self.slopes[k + 1],
        )
    }
}

// Three point estimate of the slope at an end point, limited so the curve stays monotone.
fn end_slope(h0: f64, h1: f64, delta0: f64, delta1: f64) -> f64 {
    let d = ((2.0 * h0 + h1) * delta0 - h0 * delta1) / (h0 + h1);

    if d.signum() != delta0.signum() || delta0 == 0.0 {
        0.0
    } else if delta0.signum() != delta1.signum() && d.abs() > 3.0 * delta0.abs() {
        3.0 * delta0
    } else {
        d
    }
}

/// Interpolate one column onto a set of target pressures.
///
/// `xs` must be strictly increasing. Every target must lie within `[xs[0], xs[last]]`,
/// otherwise this fails with [`PreprocessError::InterpolationDomain`] naming `variable` and the
/// `(time, lat, lon)` position of the column.
pub fn interpolate_column(
    kind: InterpolationKind,
    variable: &'static str,
    (time, lat, lon): (usize, usize, usize),
    xs: &[f64],
    ys: &[f64],
    targets: &[f64],
    out: &mut [f64],
) -> Result<()> {
    debug_assert_eq!(targets.len(), out.len());

    let (min, max) = match (xs.first(), xs.last()) {
        (Some(&min), Some(&max)) if xs.len() >= 2 => (min, max),
        _ => (std::f64::NAN, std::f64::NAN),
    };
    let domain_error = |target| PreprocessError::InterpolationDomain {
        variable,
        time,
        lat,
        lon,
        target,
        min,
        max,
    };
    if xs.len() < 2 {
        return Err(domain_error(
            targets.first().cloned().unwrap_or(std::f64::NAN),
        ));
    }

    match kind {
        InterpolationKind::Linear => {
            for (tgt, val) in izip!(targets, out) {
                *val = linear_interpolate(xs, ys, *tgt)
                    .into_option()
                    .ok_or_else(|| domain_error(*tgt))?;
            }
        }
        InterpolationKind::ShapePreserving => {
            let curve = Pchip::new(xs, ys).ok_or_else(|| domain_error(std::f64::NAN))?;
            for (tgt, val) in izip!(targets, out) {
                *val = curve
                    .evaluate(*tgt)
                    .into_option()
                    .ok_or_else(|| domain_error(*tgt))?;
            }
        }
    }

    Ok(())
}
