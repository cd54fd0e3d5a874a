//! Small numeric helpers shared by the stages.

/// Replace NaN with zero, leaving every other value alone.
///
/// Ratios like `|Fx| / (|Fx| + |Fy|)` are 0/0 when there is no transport at all, in that case
/// there is nothing to move and zero is the answer.
#[inline]
pub(crate) fn nan_to_zero(val: f64) -> f64 {
    if val.is_nan() {
        0.0
    } else {
        val
    }
}

/// `num / den`, or zero when the denominator is zero.
#[inline]
pub(crate) fn ratio_or_zero(num: f64, den: f64) -> f64 {
    if den == 0.0 {
        0.0
    } else {
        nan_to_zero(num / den)
    }
}

#[cfg(test)]
pub mod test_tools {
    pub fn approx_equal(val1: f64, val2: f64, eps: f64) -> bool {
        assert!(eps > 0.0);

        (val1 - val2).abs() < eps
    }
}
