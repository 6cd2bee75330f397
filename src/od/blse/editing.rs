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

use super::BatchConf;
use crate::od::msr::EditReason;

/// Sigma editing thresholds of one pass over the data.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum SigmaEditor {
    /// First iteration: reject on the initial RMS sigma
    Initial { sigma: f64 },
    /// Later iterations: reject beyond `k * rms + additive`
    OuterLoop { k: f64, rms: f64, additive: f64 },
}

impl SigmaEditor {
    /// Builds the editor of the provided iteration from the RMS values of the previous pass
    pub fn for_iteration(
        conf: &BatchConf,
        iteration: usize,
        predicted_rms: f64,
        weighted_rms: f64,
    ) -> Self {
        if iteration == 0 {
            Self::Initial {
                sigma: conf.olse_initial_rms_sigma,
            }
        } else {
            Self::OuterLoop {
                k: conf.olse_multiplicative_constant,
                rms: if conf.edit_with_predicted_rms {
                    predicted_rms
                } else {
                    weighted_rms
                },
                additive: conf.olse_additive_constant,
            }
        }
    }

    pub fn threshold(&self) -> f64 {
        match *self {
            Self::Initial { sigma } => sigma,
            Self::OuterLoop { k, rms, additive } => k * rms + additive,
        }
    }

    /// Returns the edit reason if the weighted residual exceeds the threshold, strictly.
    pub fn check(&self, residual: f64, weight: f64) -> Option<EditReason> {
        let normalized = weight.sqrt() * residual.abs();
        if normalized > self.threshold() {
            Some(match self {
                Self::Initial { .. } => EditReason::InitialRms,
                Self::OuterLoop { .. } => EditReason::OuterLoopSigma,
            })
        } else {
            None
        }
    }
}

/// Weight of an observation from its variance. Non-positive variances are given a unit weight.
pub fn weight_from_variance(variance: Option<f64>) -> f64 {
    match variance {
        Some(var) if var > 0.0 => 1.0 / var,
        _ => 1.0,
    }
}

/// Number of range ambiguities to add to an observed range so that it is closest to the computed one
pub fn range_ambiguity(observed: f64, computed: f64, modulo: f64) -> f64 {
    ((computed - observed) / modulo + 0.5).floor()
}
