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

use crate::io::{ConfigError, InvalidConfigSnafu};
use crate::linalg::{DMatrix, DVector};
use serde_derive::{Deserialize, Serialize};
use snafu::prelude::*;
use std::fmt;
use std::str::FromStr;

/// Relative tolerance on the Cholesky pivots
const CHOLESKY_EPSILON: f64 = 1e-8;

#[derive(Debug, PartialEq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum InversionError {
    #[snafu(display("matrix is empty"))]
    EmptyMatrix,
    #[snafu(display("matrix is {rows}x{cols} and not square"))]
    NotSquare { rows: usize, cols: usize },
    #[snafu(display("packed length {len} is not a triangular number"))]
    PackedLength { len: usize },
    #[snafu(display("upper left element is zero"))]
    ZeroLeadingElement,
    #[snafu(display("Schur complement of row {row} is zero"))]
    ZeroSchurPivot { row: usize },
    #[snafu(display("Cholesky pivot of row {row} is negative ({pivot:e})"))]
    NegativePivot { row: usize, pivot: f64 },
    #[snafu(display("diagonal element of row {row} is zero"))]
    ZeroDiagonal { row: usize },
    #[snafu(display("matrix is singular"))]
    Singular,
}

/// A symmetric matrix stored as its upper triangle, packed row by row.
///
/// Element (i, j) with i <= j is at `i*n - i*(i-1)/2 + (j - i)`.
#[derive(Clone, Debug, PartialEq)]
pub struct SymmetricPackedMatrix {
    n: usize,
    data: Vec<f64>,
}

impl SymmetricPackedMatrix {
    pub fn zeros(n: usize) -> Self {
        Self {
            n,
            data: vec![0.0; n * (n + 1) / 2],
        }
    }

    /// Packs the upper triangle of a square matrix. The lower triangle is ignored.
    pub fn from_dmatrix(m: &DMatrix<f64>) -> Result<Self, InversionError> {
        ensure!(!m.is_empty(), EmptyMatrixSnafu);
        ensure!(
            m.is_square(),
            NotSquareSnafu {
                rows: m.nrows(),
                cols: m.ncols()
            }
        );
        let n = m.nrows();
        let mut data = Vec::with_capacity(n * (n + 1) / 2);
        for i in 0..n {
            for j in i..n {
                data.push(m[(i, j)]);
            }
        }
        Ok(Self { n, data })
    }

    /// Builds a packed matrix from its raw storage, recovering the dimension from the length
    pub fn from_packed(data: Vec<f64>) -> Result<Self, InversionError> {
        let len = data.len();
        ensure!(len > 0, EmptyMatrixSnafu);
        let n = Self::dimension(len).context(PackedLengthSnafu { len })?;
        Ok(Self { n, data })
    }

    /// Dimension of a packed matrix of the provided length, if it is a triangular number
    pub fn dimension(len: usize) -> Option<usize> {
        let n = (((1 + 8 * len) as f64).sqrt() - 1.0) / 2.0;
        let n = n.round() as usize;
        (n * (n + 1) / 2 == len).then_some(n)
    }

    pub fn index(&self, i: usize, j: usize) -> usize {
        let (i, j) = if i <= j { (i, j) } else { (j, i) };
        i * self.n - i * i.saturating_sub(1) / 2 + (j - i)
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[self.index(i, j)]
    }

    pub fn set(&mut self, i: usize, j: usize, value: f64) {
        let idx = self.index(i, j);
        self.data[idx] = value;
    }

    pub fn nrows(&self) -> usize {
        self.n
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn to_dmatrix(&self) -> DMatrix<f64> {
        DMatrix::from_fn(self.n, self.n, |i, j| self.get(i, j))
    }
}

/// Inverts the information matrix of the estimator.
pub trait InversionStrategy {
    fn name(&self) -> &'static str;

    fn invert(&self, matrix: &DMatrix<f64>) -> Result<DMatrix<f64>, InversionError>;
}

/// Dense inversion with nalgebra
#[derive(Copy, Clone, Debug, Default)]
pub struct DirectInversion;

impl InversionStrategy for DirectInversion {
    fn name(&self) -> &'static str {
        "Internal"
    }

    fn invert(&self, matrix: &DMatrix<f64>) -> Result<DMatrix<f64>, InversionError> {
        ensure!(!matrix.is_empty(), EmptyMatrixSnafu);
        ensure!(
            matrix.is_square(),
            NotSquareSnafu {
                rows: matrix.nrows(),
                cols: matrix.ncols()
            }
        );
        matrix.clone().try_inverse().context(SingularSnafu)
    }
}

/// Recursive bordering: the inverse of the leading (k+1)x(k+1) block is built from the inverse
/// of the leading k x k block and the Schur complement of the new row.
#[derive(Copy, Clone, Debug, Default)]
pub struct SchurInversion;

impl SchurInversion {
    pub fn invert_packed(
        &self,
        packed: &SymmetricPackedMatrix,
    ) -> Result<SymmetricPackedMatrix, InversionError> {
        let n = packed.nrows();
        let a00 = packed.get(0, 0);
        ensure!(a00 != 0.0, ZeroLeadingElementSnafu);

        let mut inv = DMatrix::from_element(1, 1, 1.0 / a00);
        for k in 1..n {
            let b = DVector::from_fn(k, |i, _| packed.get(i, k));
            let delta = &inv * &b;
            let w = packed.get(k, k) - b.dot(&delta);
            ensure!(w != 0.0, ZeroSchurPivotSnafu { row: k });
            let s = 1.0 / w;

            let mut next = DMatrix::zeros(k + 1, k + 1);
            next.view_mut((0, 0), (k, k))
                .copy_from(&(&inv + &delta * delta.transpose() * s));
            for i in 0..k {
                next[(i, k)] = -delta[i] * s;
                next[(k, i)] = -delta[i] * s;
            }
            next[(k, k)] = s;
            inv = next;
        }

        SymmetricPackedMatrix::from_dmatrix(&inv)
    }
}

impl InversionStrategy for SchurInversion {
    fn name(&self) -> &'static str {
        "Schur"
    }

    fn invert(&self, matrix: &DMatrix<f64>) -> Result<DMatrix<f64>, InversionError> {
        let packed = SymmetricPackedMatrix::from_dmatrix(matrix)?;
        Ok(self.invert_packed(&packed)?.to_dmatrix())
    }
}

/// Factorizes the matrix as RᵀR with R upper triangular, inverts R, and forms R⁻¹R⁻ᵀ, all in
/// packed storage.
#[derive(Copy, Clone, Debug, Default)]
pub struct CholeskyInversion;

impl CholeskyInversion {
    /// Computes the packed upper triangular factor R of A = RᵀR.
    ///
    /// A positive pivot within `epsilon * |a_kk|` of zero is replaced by the square root of that
    /// tolerance. A zero pivot means the matrix is singular and a negative one that it is not
    /// positive definite: both fail.
    pub fn factorize(
        &self,
        packed: &SymmetricPackedMatrix,
    ) -> Result<SymmetricPackedMatrix, InversionError> {
        let n = packed.nrows();
        let mut r = packed.clone();
        for k in 0..n {
            let tolerance = (CHOLESKY_EPSILON * packed.get(k, k)).abs();
            let mut inv_pivot = 0.0;
            for i in k..n {
                let dot: f64 = (0..k).map(|l| r.get(l, k) * r.get(l, i)).sum();
                let dsum = packed.get(k, i) - dot;
                if i > k {
                    r.set(k, i, dsum * inv_pivot);
                } else if dsum > tolerance {
                    let pivot = dsum.sqrt();
                    r.set(k, k, pivot);
                    inv_pivot = 1.0 / pivot;
                } else if dsum > 0.0 {
                    let pivot = tolerance.sqrt();
                    warn!("Cholesky pivot of row {k} is {dsum:e}, regularized to {pivot:e}");
                    r.set(k, k, pivot);
                    inv_pivot = 1.0 / pivot;
                } else if dsum == 0.0 {
                    return Err(InversionError::ZeroDiagonal { row: k });
                } else {
                    return Err(InversionError::NegativePivot { row: k, pivot: dsum });
                }
            }
        }
        Ok(r)
    }

    pub fn invert_packed(
        &self,
        packed: &SymmetricPackedMatrix,
    ) -> Result<SymmetricPackedMatrix, InversionError> {
        let n = packed.nrows();
        let mut r = self.factorize(packed)?;

        // Invert R in place, from the last row up: row i of R⁻¹ only needs the rows below it
        let mut row = vec![0.0; n];
        for i in (0..n).rev() {
            let din = 1.0 / r.get(i, i);
            row[i] = din;
            for j in i + 1..n {
                let work: f64 = (i + 1..=j).map(|k| r.get(i, k) * r.get(k, j)).sum();
                row[j] = -din * work;
            }
            for (j, value) in row.iter().enumerate().skip(i) {
                r.set(i, j, *value);
            }
        }

        // A⁻¹ = R⁻¹ R⁻ᵀ
        let mut inv = SymmetricPackedMatrix::zeros(n);
        for i in 0..n {
            for j in i..n {
                let work: f64 = (j..n).map(|k| r.get(i, k) * r.get(j, k)).sum();
                inv.set(i, j, work);
            }
        }
        Ok(inv)
    }
}

impl InversionStrategy for CholeskyInversion {
    fn name(&self) -> &'static str {
        "Cholesky"
    }

    fn invert(&self, matrix: &DMatrix<f64>) -> Result<DMatrix<f64>, InversionError> {
        let packed = SymmetricPackedMatrix::from_dmatrix(matrix)?;
        Ok(self.invert_packed(&packed)?.to_dmatrix())
    }
}

/// Selects the inversion strategy of the information matrix.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum InversionAlgorithm {
    /// Dense inversion
    #[default]
    Internal,
    Schur,
    Cholesky,
}

impl InversionAlgorithm {
    pub fn strategy(self) -> Box<dyn InversionStrategy> {
        match self {
            Self::Internal => Box::new(DirectInversion),
            Self::Schur => Box::new(SchurInversion),
            Self::Cholesky => Box::new(CholeskyInversion),
        }
    }

    pub fn invert(self, matrix: &DMatrix<f64>) -> Result<DMatrix<f64>, InversionError> {
        self.strategy().invert(matrix)
    }
}

impl fmt::Display for InversionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.strategy().name())
    }
}

impl FromStr for InversionAlgorithm {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Internal" => Ok(Self::Internal),
            "Schur" => Ok(Self::Schur),
            "Cholesky" => Ok(Self::Cholesky),
            _ => InvalidConfigSnafu {
                msg: format!(
                    "the value \"{s}\" is not allowed for the InversionAlgorithm; allowed values are \"Internal\", \"Schur\" and \"Cholesky\""
                ),
            }
            .fail(),
        }
    }
}

#[cfg(test)]
mod ut_inversion {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::Rng;
    use rand_pcg::Pcg64Mcg;
    use rstest::*;

    #[test]
    fn packed_layout() {
        let m = DMatrix::from_row_slice(3, 3, &[1.0, 2.0, 3.0, 2.0, 4.0, 5.0, 3.0, 5.0, 6.0]);
        let packed = SymmetricPackedMatrix::from_dmatrix(&m).unwrap();
        assert_eq!(packed.as_slice(), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(packed.index(1, 2), 4);
        assert_eq!(packed.index(2, 1), 4);
        assert_eq!(packed.index(2, 2), 5);
        assert_eq!(packed.to_dmatrix(), m);
        assert_eq!(SymmetricPackedMatrix::dimension(10), Some(4));
        assert_eq!(SymmetricPackedMatrix::dimension(7), None);
        assert_eq!(
            SymmetricPackedMatrix::from_packed(vec![1.0; 7]),
            Err(InversionError::PackedLength { len: 7 })
        );
        assert_eq!(
            SymmetricPackedMatrix::from_packed(vec![1.0; 6]).unwrap().nrows(),
            3
        );
    }

    #[rstest]
    #[case(InversionAlgorithm::Internal)]
    #[case(InversionAlgorithm::Schur)]
    #[case(InversionAlgorithm::Cholesky)]
    fn two_by_two(#[case] algo: InversionAlgorithm) {
        let info = DMatrix::from_row_slice(2, 2, &[2.0, 1.0, 1.0, 2.0]);
        let cov = algo.invert(&info).unwrap();
        let expected = DMatrix::from_row_slice(2, 2, &[2.0, -1.0, -1.0, 2.0]) / 3.0;
        assert_abs_diff_eq!(cov, expected, epsilon = 1e-14);
    }

    fn random_spd(rng: &mut Pcg64Mcg, n: usize) -> DMatrix<f64> {
        let a = DMatrix::from_fn(n, n, |_, _| rng.gen_range(-1.0..1.0));
        &a * a.transpose() + DMatrix::identity(n, n) * n as f64
    }

    #[rstest]
    fn agree_with_direct_inverse(#[values(2, 3, 4, 5, 6, 7, 8, 9, 10)] n: usize) {
        let mut rng = Pcg64Mcg::new(n as u128);
        let spd = random_spd(&mut rng, n);
        let direct = DirectInversion.invert(&spd).unwrap();
        let schur = SchurInversion.invert(&spd).unwrap();
        let chol = CholeskyInversion.invert(&spd).unwrap();
        assert_abs_diff_eq!(schur, direct, epsilon = 1e-9);
        assert_abs_diff_eq!(chol, direct, epsilon = 1e-9);
    }

    #[test]
    fn failures() {
        let empty = DMatrix::<f64>::zeros(0, 0);
        for algo in [
            InversionAlgorithm::Internal,
            InversionAlgorithm::Schur,
            InversionAlgorithm::Cholesky,
        ] {
            assert_eq!(algo.invert(&empty), Err(InversionError::EmptyMatrix));
            assert_eq!(
                algo.invert(&DMatrix::zeros(2, 3)),
                Err(InversionError::NotSquare { rows: 2, cols: 3 })
            );
        }

        let zero_lead = DMatrix::from_row_slice(2, 2, &[0.0, 1.0, 1.0, 2.0]);
        assert_eq!(
            SchurInversion.invert(&zero_lead),
            Err(InversionError::ZeroLeadingElement)
        );
        assert_eq!(
            CholeskyInversion.invert(&zero_lead),
            Err(InversionError::ZeroDiagonal { row: 0 })
        );

        let rank_one = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 1.0]);
        assert_eq!(
            SchurInversion.invert(&rank_one),
            Err(InversionError::ZeroSchurPivot { row: 1 })
        );
        assert_eq!(DirectInversion.invert(&rank_one), Err(InversionError::Singular));
        assert_eq!(
            CholeskyInversion.invert(&rank_one),
            Err(InversionError::ZeroDiagonal { row: 1 })
        );

        let singular =
            DMatrix::from_row_slice(3, 3, &[1.0, 2.0, 3.0, 2.0, 4.0, 6.0, 3.0, 6.0, 9.0]);
        assert_eq!(DirectInversion.invert(&singular), Err(InversionError::Singular));
        assert_eq!(
            CholeskyInversion.invert(&singular),
            Err(InversionError::ZeroDiagonal { row: 1 })
        );

        // A positive pivot within the tolerance is regularized
        let marginal = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 1.0 + 1e-12]);
        let cov = CholeskyInversion.invert(&marginal).unwrap();
        assert!(cov.iter().all(|v| v.is_finite()));
        assert_abs_diff_eq!(cov[(1, 1)], 1e8, epsilon = 1.0);

        let indefinite = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 1.0]);
        assert!(matches!(
            CholeskyInversion.invert(&indefinite),
            Err(InversionError::NegativePivot { row: 1, .. })
        ));
    }

    #[test]
    fn algorithm_names() {
        assert_eq!("Schur".parse::<InversionAlgorithm>().unwrap(), InversionAlgorithm::Schur);
        assert_eq!(format!("{}", InversionAlgorithm::Cholesky), "Cholesky");
        assert_eq!(format!("{}", InversionAlgorithm::default()), "Internal");
        assert!("QR".parse::<InversionAlgorithm>().is_err());
    }
}
