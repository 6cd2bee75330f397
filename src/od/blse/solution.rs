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

use super::{ConvergenceStatus, InversionAlgorithm, PassStatistics, RmsHistory};
use crate::linalg::{DMatrix, DVector};
use crate::od::estimate::keplerian::KEPLERIAN_LABELS;
use crate::od::estimate::{SolveFor, StateElement};
use crate::time::Epoch;
use std::collections::BTreeMap;
use std::fmt;

/// Result of a batch least squares run
#[derive(Clone, Debug, PartialEq)]
pub struct BatchSolution {
    pub estimator: String,
    /// Estimation epoch
    pub epoch: Epoch,
    pub state_map: Vec<StateElement>,
    pub initial_state: DVector<f64>,
    pub estimated_state: DVector<f64>,
    /// Covariance of the last pass, inverse of its information matrix
    pub covariance: DMatrix<f64>,
    pub correlation: DMatrix<f64>,
    /// Covariance with each spacecraft Cartesian state expressed in Keplerian elements, if convertible
    pub keplerian_covariance: Option<DMatrix<f64>>,
    pub iterations: usize,
    /// Weighted RMS of each iteration
    pub rms_history: Vec<f64>,
    pub rms: RmsHistory,
    pub status: ConvergenceStatus,
    pub reason: String,
    pub statistics: PassStatistics,
    pub inversion: InversionAlgorithm,
    /// Residuals of the last pass per measurement model, as (epoch, O-C)
    pub residuals: BTreeMap<String, Vec<(Epoch, f64)>>,
}

impl BatchSolution {
    pub fn converged(&self) -> bool {
        self.status.is_converged()
    }

    /// One sigma uncertainty of each element of the state
    pub fn sigmas(&self) -> DVector<f64> {
        DVector::from_iterator(
            self.covariance.nrows(),
            self.covariance.diagonal().iter().map(|v| v.abs().sqrt()),
        )
    }

    /// Total state correction from the initial state
    pub fn total_correction(&self) -> DVector<f64> {
        &self.estimated_state - &self.initial_state
    }

    fn label(&self, i: usize, keplerian: bool) -> String {
        match self.state_map.get(i) {
            Some(elem) if keplerian && elem.element == SolveFor::CartesianState => {
                let k = elem.subelement.saturating_sub(1).min(5);
                format!("{}.{}", elem.object, KEPLERIAN_LABELS[k])
            }
            Some(elem) => elem.to_string(),
            None => format!("#{i}"),
        }
    }
}

fn write_matrix(
    f: &mut fmt::Formatter<'_>,
    title: &str,
    m: &DMatrix<f64>,
    label: impl Fn(usize) -> String,
) -> fmt::Result {
    writeln!(f, "{title}")?;
    for i in 0..m.nrows() {
        write!(f, "  {:<20}", label(i))?;
        for j in 0..m.ncols() {
            write!(f, " {:>14.6e}", m[(i, j)])?;
        }
        writeln!(f)?;
    }
    Ok(())
}

impl fmt::Display for BatchSolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Estimator: {}", self.estimator)?;
        writeln!(f, "Status: {}", self.status)?;
        if !self.reason.is_empty() {
            write!(f, "{}", self.reason)?;
        }
        writeln!(f, "Iterations: {}", self.iterations)?;
        writeln!(
            f,
            "Weighted RMS: {:.6e} (predicted {:.6e}, best {:.6e})",
            self.rms.new, self.rms.predicted, self.rms.best
        )?;
        writeln!(f, "Inversion: {}", self.inversion)?;
        writeln!(f, "Estimation epoch: {}", self.epoch)?;
        writeln!(
            f,
            "  {:<20} {:>20} {:>20} {:>16} {:>14}",
            "State element", "Initial", "Estimated", "Correction", "Sigma"
        )?;
        let sigmas = self.sigmas();
        for i in 0..self.estimated_state.len() {
            writeln!(
                f,
                "  {:<20} {:>20.9} {:>20.9} {:>16.6e} {:>14.6e}",
                self.label(i, false),
                self.initial_state[i],
                self.estimated_state[i],
                self.estimated_state[i] - self.initial_state[i],
                sigmas[i]
            )?;
        }
        write_matrix(f, "Covariance", &self.covariance, |i| self.label(i, false))?;
        write_matrix(f, "Correlation", &self.correlation, |i| self.label(i, false))?;
        if let Some(kep) = &self.keplerian_covariance {
            write_matrix(f, "Keplerian covariance", kep, |i| self.label(i, true))?;
        }
        write!(f, "{}", self.statistics)
    }
}
