/*
    Nyx, blazing fast astrodynamics
    Copyright (C) 2018-onwards Christopher Rabotin <christopher.rabotin@gmail.com>

    This program is free software: you can redistribute it and/or modify
    it under the terms of the GNU Affero General Public License as published
    by the Free Software Foundation, either version 3 of the License, or
    (at your option) any later version.

    This program is distributed in the hope that it will be useful,
    but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
    GNU Affero General Public License for more details.

    You should have received a copy of the GNU Affero General Public License
    along with this program.  If not, see <https://www.gnu.org/licenses/>.
*/

use crate::linalg::DMatrix;
use std::f64::consts::TAU;

/// Returns the provided angle in radians bounded between 0 and 2 pi.
pub fn between_0_tau(angle_rad: f64) -> f64 {
    let mut bounded = angle_rad % TAU;
    if bounded < 0.0 {
        bounded += TAU;
    }
    bounded
}

/// Wraps a periodic value into `[min_value, min_value + period)`.
/// A value landing exactly on the upper bound maps back onto the lower bound.
pub fn wrap_periodic(value: f64, period: f64, min_value: f64) -> f64 {
    let mut wrapped = value % period;
    if wrapped < min_value {
        wrapped += period;
    }
    if wrapped >= min_value + period {
        wrapped -= period;
    }
    wrapped
}

/// Returns whether the provided square matrix is symmetric to within the provided absolute tolerance.
pub fn is_symmetric(m: &DMatrix<f64>, tol: f64) -> bool {
    if !m.is_square() {
        return false;
    }
    for i in 0..m.nrows() {
        for j in 0..i {
            if (m[(i, j)] - m[(j, i)]).abs() > tol {
                return false;
            }
        }
    }
    true
}

/// Returns the correlation matrix of the provided covariance. Rows with a non-positive variance are left at zero.
pub fn correlation(covar: &DMatrix<f64>) -> DMatrix<f64> {
    let n = covar.nrows();
    let mut corr = DMatrix::zeros(n, n);
    for i in 0..n {
        for j in 0..n {
            let denom = (covar[(i, i)] * covar[(j, j)]).sqrt();
            if denom > 0.0 {
                corr[(i, j)] = covar[(i, j)] / denom;
            }
        }
    }
    corr
}

#[cfg(test)]
mod ut_utils {
    use super::*;

    #[test]
    fn tau_bounds() {
        assert!((between_0_tau(-1.0) - (TAU - 1.0)).abs() < 1e-15);
    }

    #[test]
    fn wrap_law() {
        assert_eq!(wrap_periodic(360.0, 360.0, 0.0), 0.0);
        assert_eq!(wrap_periodic(-0.5, 360.0, 0.0), 359.5);
        assert_eq!(wrap_periodic(180.0, 360.0, -180.0), -180.0);
        assert_eq!(wrap_periodic(-180.0, 360.0, -180.0), -180.0);
        assert_eq!(wrap_periodic(725.0, 360.0, 0.0), 5.0);
        for i in -2000..2000 {
            let raw = i as f64 * 0.731;
            let wrapped = wrap_periodic(raw, 360.0, 0.0);
            assert!((0.0..360.0).contains(&wrapped), "{raw} -> {wrapped}");
            let wrapped = wrap_periodic(raw, 360.0, -180.0);
            assert!((-180.0..180.0).contains(&wrapped), "{raw} -> {wrapped}");
        }
    }

    #[test]
    fn symmetry_and_correlation() {
        let m = DMatrix::from_row_slice(2, 2, &[4.0, 1.0, 1.0, 9.0]);
        assert!(is_symmetric(&m, 0.0));
        let corr = correlation(&m);
        assert_eq!(corr[(0, 0)], 1.0);
        assert!((corr[(0, 1)] - 1.0 / 6.0).abs() < 1e-15);
        let asym = DMatrix::from_row_slice(2, 2, &[4.0, 1.0, 1.1, 9.0]);
        assert!(!is_symmetric(&asym, 1e-3));
    }
}
