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

mod state;
pub use state::{EstimationState, SolveFor, StateElement};

mod participant;
pub use participant::{Participant, ParticipantKind};

mod manager;
pub use manager::{
    error_models_of, EstimationStateManager, ParticipantBuffer, ParticipantStateManager,
};

/// Cartesian to Keplerian partials, used to express the covariance in Keplerian elements
pub mod keplerian;
