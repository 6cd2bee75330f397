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

use std::fmt;

/// Convergence verdict of the estimator, updated once per iteration.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum ConvergenceStatus {
    #[default]
    Unknown,
    AbsoluteTolConverged,
    RelativeTolConverged,
    BothConverged,
    Converging,
    Diverging,
    MaxConsecutiveDiverged,
    MaxIterationsDiverged,
}

impl ConvergenceStatus {
    pub fn is_converged(self) -> bool {
        matches!(
            self,
            Self::AbsoluteTolConverged | Self::RelativeTolConverged | Self::BothConverged
        )
    }

    /// Returns true if the estimator must stop iterating
    pub fn is_final(self) -> bool {
        self.is_converged()
            || matches!(
                self,
                Self::MaxConsecutiveDiverged | Self::MaxIterationsDiverged
            )
    }
}

impl fmt::Display for ConvergenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unknown => "Unknown",
            Self::AbsoluteTolConverged => "Converged (absolute tolerance)",
            Self::RelativeTolConverged => "Converged (relative tolerance)",
            Self::BothConverged => "Converged (absolute and relative tolerances)",
            Self::Converging => "Converging",
            Self::Diverging => "Diverging",
            Self::MaxConsecutiveDiverged => "Diverged (consecutive divergences)",
            Self::MaxIterationsDiverged => "Diverged (maximum iterations)",
        };
        write!(f, "{s}")
    }
}

/// RMS values of the current iteration
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct RmsHistory {
    /// Weighted RMS of the previous iteration
    pub old: f64,
    /// Weighted RMS of this iteration
    pub new: f64,
    pub best: f64,
    /// Predicted RMS after applying this iteration's correction
    pub predicted: f64,
}

/// Tolerances and limits of the convergence test
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ConvergenceCriteria {
    pub absolute_tol: f64,
    pub relative_tol: f64,
    pub max_iterations: usize,
    pub max_consecutive_divergences: usize,
}

/// Outcome of one convergence test
#[derive(Clone, Debug, PartialEq)]
pub struct ConvergenceVerdict {
    pub status: ConvergenceStatus,
    pub reason: String,
    /// Updated count of consecutive divergences
    pub num_divergences: usize,
}

/// Tests for convergence after `iterations_taken` completed iterations (the current one excluded).
pub fn test_for_convergence(
    criteria: &ConvergenceCriteria,
    rms: &RmsHistory,
    iterations_taken: usize,
    num_divergences: usize,
) -> ConvergenceVerdict {
    let mut reason = String::new();
    let mut status = ConvergenceStatus::Unknown;
    let mut num_divergences = num_divergences;

    if rms.new <= criteria.absolute_tol {
        status = ConvergenceStatus::AbsoluteTolConverged;
        reason.push_str(&format!(
            "   WeightedRMS <= AbsoluteTol ({} <= {})\n",
            rms.new, criteria.absolute_tol
        ));
    }

    let relative = if rms.best == 0.0 {
        (rms.predicted - rms.best).abs()
    } else {
        ((rms.predicted - rms.best) / rms.best).abs()
    };
    if relative <= criteria.relative_tol {
        status = if status == ConvergenceStatus::AbsoluteTolConverged {
            ConvergenceStatus::BothConverged
        } else {
            ConvergenceStatus::RelativeTolConverged
        };
        reason.push_str(&format!(
            "   |1 - RMSP/RMSB| <= RelativeTol ({relative} <= {})\n",
            criteria.relative_tol
        ));
    }

    if !status.is_converged() {
        if iterations_taken + 1 >= criteria.max_iterations {
            status = ConvergenceStatus::MaxIterationsDiverged;
            reason.push_str(&format!(
                "   Number of iterations reached its maximum ({})\n",
                criteria.max_iterations
            ));
        } else if iterations_taken >= 1 {
            if rms.new > rms.old {
                num_divergences += 1;
                if num_divergences >= criteria.max_consecutive_divergences {
                    status = ConvergenceStatus::MaxConsecutiveDiverged;
                    reason.push_str(&format!(
                        "   Number of consecutive divergences reached its maximum ({})\n",
                        criteria.max_consecutive_divergences
                    ));
                } else {
                    status = ConvergenceStatus::Diverging;
                }
            } else {
                num_divergences = 0;
                status = ConvergenceStatus::Converging;
            }
        }
    }

    ConvergenceVerdict {
        status,
        reason,
        num_divergences,
    }
}
