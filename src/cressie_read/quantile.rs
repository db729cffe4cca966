//! Upper quantiles of the F distribution.
//!
//! The interval threshold is the upper-`alpha` quantile of F(1, n). It is
//! found by bracketing and bisecting the survival function, written as a
//! regularized incomplete beta of `dfd / (dfd + dfn·x)` so the far tail keeps
//! its relative precision. That matters when the total count is below 1 and
//! the quantile runs to 1e24 and beyond.

use statrs::function::beta::checked_beta_reg;

use crate::error::{OpeError, Result};

const MAX_BISECTIONS: usize = 200;

/// The `x` with `P(F(dfn, dfd) > x) = alpha`.
///
/// # Errors
///
/// Fails when `alpha` is outside `(0, 1)` or the degrees of freedom are not
/// positive and finite.
pub fn f_upper_quantile(alpha: f64, dfn: f64, dfd: f64) -> Result<f64> {
    if alpha.is_nan() || alpha <= 0.0 || alpha >= 1.0 {
        return Err(OpeError::InvalidAlpha(alpha));
    }
    if !(dfn.is_finite() && dfn > 0.0 && dfd.is_finite() && dfd > 0.0) {
        return Err(OpeError::Quantile(format!(
            "invalid degrees of freedom F({dfn}, {dfd})"
        )));
    }
    let sf = |x: f64| f_survival(dfn, dfd, x);

    let mut lo = 0.0_f64;
    let mut hi = 4.0_f64;
    while sf(hi)? > alpha {
        lo = hi;
        hi *= 2.0;
        if !hi.is_finite() {
            return Err(OpeError::Quantile(format!(
                "no finite upper {alpha} quantile for F({dfn}, {dfd})"
            )));
        }
    }

    for _ in 0..MAX_BISECTIONS {
        let mid = 0.5 * (lo + hi);
        if mid <= lo || mid >= hi {
            break;
        }
        if sf(mid)? > alpha {
            lo = mid;
        } else {
            hi = mid;
        }
    }

    Ok(0.5 * (lo + hi))
}

/// `P(F(dfn, dfd) > x)` as `I_{dfd / (dfd + dfn·x)}(dfd / 2, dfn / 2)`.
fn f_survival(dfn: f64, dfd: f64, x: f64) -> Result<f64> {
    let t = dfd / (dfd + dfn * x);
    checked_beta_reg(dfd / 2.0, dfn / 2.0, t).map_err(|e| OpeError::Quantile(e.to_string()))
}
