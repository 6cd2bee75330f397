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

/*! # nyx-blse

Batch least squares orbit determination: an iterative estimator which accumulates
weighted normal equations over a full pass of tracking data, inverts them with a
selectable algorithm (direct, Schur or Cholesky), edits outliers and tests for
convergence on the weighted RMS of the residuals.

The estimator is a cooperative state machine: each call to
[`BatchEstimator::advance`](od::blse::BatchEstimator::advance) performs exactly one
state's work and returns the side effect the driver must apply (e.g. a propagation
step). The [`BatchODProcess`](od::process::BatchODProcess) driver wires it to a
propagator and an event manager.

Angle measurement models (right ascension, declination, X/Y angles, azimuth and
elevation) are provided in [`od::msr::angles`].
*/

/// Provides the propagator interface consumed by the orbit determination process.
pub mod propagators;

/// Provides all of the orbit determination tools: batch estimator, measurements, estimation state.
pub mod od;

/// Handles the configuration files and the loading of estimator settings.
pub mod io;

/// Utility functions shared by all of the modules.
pub mod utils;

#[macro_use]
extern crate log;

/// Re-export of hifitime
pub mod time {
    pub use hifitime::*;
}

/// Re-export nalgebra
pub mod linalg {
    pub use nalgebra::base::*;
}
