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

use crate::od::blse::{
    Action, BatchConf, BatchEstimator, BatchSolution, EstimatorState, Transition,
};
use crate::od::estimate::EstimationStateManager;
use crate::od::events::EventManager;
use crate::od::msr::MeasurementManager;
use crate::od::{NoSolutionSnafu, ODConfigSnafu, ODError, ODPropSnafu};
use crate::propagators::Propagator;
use snafu::prelude::*;

/// A batch orbit determination process: drives the estimator state machine and applies the
/// propagation and event location it requests. Note that everything passed to this structure is moved.
#[allow(clippy::upper_case_acronyms)]
pub struct BatchODProcess<P, E, M, S>
where
    P: Propagator,
    E: EventManager,
    M: MeasurementManager,
    S: EstimationStateManager,
{
    pub prop: P,
    pub events: E,
    pub estimator: BatchEstimator<M, S>,
    /// Number of propagation steps taken over the whole run
    steps_taken: usize,
}

impl<P, E, M, S> BatchODProcess<P, E, M, S>
where
    P: Propagator,
    E: EventManager,
    M: MeasurementManager,
    S: EstimationStateManager,
{
    pub fn new(prop: P, events: E, conf: BatchConf, msr: M, esm: S) -> Self {
        Self {
            prop,
            events,
            estimator: BatchEstimator::new(conf, msr, esm),
            steps_taken: 0,
        }
    }

    /// Validates the configuration and synchronizes the propagator with the participants
    pub fn initialize(&mut self) -> Result<(), ODError> {
        self.estimator.conf.validate().context(ODConfigSnafu)?;
        self.prop
            .update_from_space_objects(self.estimator.esm())
            .context(ODPropSnafu)?;
        self.steps_taken = 0;
        info!(
            "{} initialized at {}",
            self.estimator.conf.name,
            self.prop.epoch()
        );
        Ok(())
    }

    /// Performs the work of one estimator state and applies the resulting action
    pub fn execute(&mut self) -> Result<Transition, ODError> {
        let transition = self.estimator.advance()?;
        match transition.action {
            Action::None => {}
            Action::Propagate { step } => {
                let epoch = self
                    .prop
                    .step(step, self.estimator.esm_mut())
                    .context(ODPropSnafu)?;
                self.steps_taken += 1;
                trace!("propagated by {step} to {epoch}");
                self.estimator.propagated_to(epoch);
            }
            Action::LocateEvents => self.estimator.locate_events(&mut self.events)?,
            Action::RestartPass { epoch } => {
                self.prop.set_epoch(epoch);
                self.prop
                    .update_from_space_objects(self.estimator.esm())
                    .context(ODPropSnafu)?;
                self.estimator.propagated_to(epoch);
            }
        }
        Ok(transition)
    }

    /// Runs the estimator until it finishes and returns its solution
    pub fn run(&mut self) -> Result<BatchSolution, ODError> {
        self.initialize()?;
        while self.estimator.state() != EstimatorState::Finished {
            self.execute()?;
        }
        info!(
            "{} finished after {} propagation steps",
            self.estimator.conf.name, self.steps_taken
        );
        self.estimator.solution().cloned().context(NoSolutionSnafu)
    }

    pub fn steps_taken(&self) -> usize {
        self.steps_taken
    }
}
