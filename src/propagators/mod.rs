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

use crate::od::estimate::EstimationStateManager;
use crate::time::{Duration, Epoch};
use snafu::prelude::*;

/// Largest magnitude of a single propagation step requested by the estimator, in seconds.
/// Larger gaps between observations are covered by several steps.
pub const MAX_STEP_S: f64 = 600.0;

mod two_body;
pub use two_body::TwoBody;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum PropagationError {
    #[snafu(display("propagation step of {step} from {epoch} failed: {details}"))]
    StepFailed {
        epoch: Epoch,
        step: Duration,
        details: String,
    },
    #[snafu(display("propagator cannot be synchronized with participant {name}: {details}"))]
    Synchronization { name: String, details: String },
}

/// The propagator interface of the orbit determination process.
///
/// The propagator integrates the participants of the estimation state manager: on each step it
/// must update their states and their dynamic state transition matrices.
pub trait Propagator {
    /// Current epoch of the propagator
    fn epoch(&self) -> Epoch;

    /// Forces the propagator epoch, used when restarting a pass from the estimation epoch
    fn set_epoch(&mut self, epoch: Epoch);

    /// Reloads the propagated states from the participants, e.g. after a state correction
    fn update_from_space_objects(
        &mut self,
        esm: &dyn EstimationStateManager,
    ) -> Result<(), PropagationError>;

    /// Propagates the participants by the provided step, which may be negative, and returns the new epoch
    fn step(
        &mut self,
        step: Duration,
        esm: &mut dyn EstimationStateManager,
    ) -> Result<Epoch, PropagationError>;
}

/// Clamps the provided step to [MAX_STEP_S] in magnitude, keeping its sign.
pub fn clamp_step(step: Duration) -> Duration {
    let step_s = step.to_seconds();
    if step_s.abs() > MAX_STEP_S {
        Duration::from_seconds(MAX_STEP_S.copysign(step_s))
    } else {
        step
    }
}
