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

use crate::io::ConfigError;
use crate::propagators::PropagationError;
use snafu::prelude::Snafu;

/// Provides the batch least squares estimator, its inversion strategies and its report.
pub mod blse;

/// Provides the estimation state, the participants and the estimation state manager.
pub mod estimate;

/// Provides the light time and occultation event interface.
pub mod events;

/// Provides all of the measurement plumbing and the angle measurement models.
pub mod msr;

/// Provides the driver of the batch estimator.
pub mod process;

#[allow(unused_imports)]
pub mod prelude {
    pub use super::blse::*;
    pub use super::estimate::*;
    pub use super::events::*;
    pub use super::msr::angles::*;
    pub use super::msr::*;
    pub use super::process::*;
    pub use super::ODError;
    pub use crate::io::ConfigRepr;
    pub use crate::propagators::{PropagationError, Propagator, TwoBody};
    pub use crate::time::{Duration, Epoch, TimeScale, Unit};
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ODError {
    #[snafu(display("during an orbit determination, encountered {source}"))]
    ODPropError { source: PropagationError },
    #[snafu(display("OD failed because {source}"))]
    ODConfigError { source: ConfigError },
    #[snafu(display("could not invert the {which}: {source}"))]
    ODInversion {
        source: blse::InversionError,
        which: &'static str,
    },
    #[snafu(display(
        "for batch estimator {estimator}, there are {solve_for} solve-for parameters, and only {remaining} valid observable records remaining after editing. Please modify data editing criteria or provide a better a-priori estimate"
    ))]
    TooFewObservations {
        estimator: String,
        solve_for: usize,
        remaining: usize,
    },
    #[snafu(display("no observations were loaded by the measurement manager"))]
    NoObservations,
    #[snafu(display("no spacecraft participant to derive the estimation epoch from"))]
    NoSpacecraft,
    #[snafu(display("the estimation state is empty: no solve-for parameters are registered"))]
    EmptyState,
    #[snafu(display("a-priori covariance requested but none of the participants provides one"))]
    MissingApriori,
    #[snafu(display(
        "a-priori covariance is {rows}x{cols} but the estimation state has {size} elements"
    ))]
    AprioriSize { rows: usize, cols: usize, size: usize },
    #[snafu(display("{quantity} is degenerate when {action}"))]
    GeometricDegeneracy {
        quantity: &'static str,
        action: &'static str,
    },
    #[snafu(display("derivatives of {model} requested before its measurement was calculated"))]
    DerivativeBeforeValue { model: String },
    #[snafu(display("{name} is not a ground station: angles are measured from a station"))]
    NotAStation { name: String },
    #[snafu(display(
        "the state transition matrix of {object} at the measurement epoch is singular"
    ))]
    SingularStm { object: String },
    #[snafu(display("unknown measurement type {name}"))]
    UnknownMeasurementType { name: String },
    #[snafu(display("no signal path for {model}"))]
    NoSignalPath { model: String },
    #[snafu(display("no measurement model with id {id}"))]
    UnknownModel { id: usize },
    #[snafu(display("estimator in state {state} cannot proceed: {details}"))]
    InvalidState { state: String, details: String },
    #[snafu(display("could not write the estimator report to {path}: {source}"))]
    ReportWrite {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("no solution available: the estimator has not finished"))]
    NoSolution,
}
