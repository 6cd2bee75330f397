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

use super::{ComputedMeasurement, MeasurementType, ObservationRecord};
use crate::linalg::DMatrix;
use crate::od::estimate::{EstimationStateManager, StateElement};
use crate::od::ODError;

/// A measurement model computes the predicted value of an observation from the current state
/// of the participants, and the partials of that value with respect to the estimation state.
///
/// Models are stateful across a single evaluation: `derivatives` uses the signal geometry of the
/// last call to `calculate`, and must fail if `calculate` was never called.
pub trait MeasurementModel {
    /// Name of this model, used to label the residual plots
    fn name(&self) -> &str;

    fn msr_type(&self) -> MeasurementType;

    /// Participant identifiers along the signal path, starting with the observing station
    fn participants(&self) -> &[String];

    /// Number of values of this measurement
    fn size(&self) -> usize {
        1
    }

    /// Returns true if this model computes the provided observation
    fn matches(&self, obs: &ObservationRecord) -> bool {
        obs.msr_type == self.msr_type() && obs.participants.as_slice() == self.participants()
    }

    /// Computes the predicted measurement of the provided observation
    fn calculate(
        &mut self,
        obs: &ObservationRecord,
        esm: &dyn EstimationStateManager,
        with_events: bool,
    ) -> Result<ComputedMeasurement, ODError>;

    /// Partials of the last computed measurement with respect to the provided state element.
    ///
    /// Returns a matrix of `size()` rows and `element.length` columns.
    fn derivatives(
        &mut self,
        element: &StateElement,
        esm: &dyn EstimationStateManager,
    ) -> Result<DMatrix<f64>, ODError>;
}
