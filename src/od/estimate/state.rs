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

use crate::linalg::DVector;
use crate::time::Epoch;
use serde_derive::{Deserialize, Serialize};
use std::fmt;

/// A parameter of a participant which may be solved for.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SolveFor {
    /// Position and velocity, km and km/s
    CartesianState,
    /// Position only, km
    Position,
    /// Velocity only, km/s
    Velocity,
    /// Measurement bias of an error model, in the units of the measurement
    Bias,
    /// Solar radiation pressure coefficient correction
    CrEpsilon,
    /// Drag coefficient correction
    CdEpsilon,
    /// Thrust scale factor correction of the named thrust force
    ThrustScaleFactor { force: String },
}

impl SolveFor {
    /// Number of scalars of this parameter in the estimation state
    pub fn size(&self) -> usize {
        match self {
            Self::CartesianState => 6,
            Self::Position | Self::Velocity => 3,
            Self::Bias | Self::CrEpsilon | Self::CdEpsilon | Self::ThrustScaleFactor { .. } => 1,
        }
    }

    /// Returns true if this parameter is part of the orbital state
    pub fn is_orbital(&self) -> bool {
        matches!(self, Self::CartesianState | Self::Position | Self::Velocity)
    }

    /// Label of the subelement (1-indexed) for reports
    pub fn label(&self, subelement: usize) -> String {
        const CART: [&str; 6] = ["X", "Y", "Z", "VX", "VY", "VZ"];
        let cart = |offset: usize| {
            subelement
                .checked_sub(1)
                .and_then(|i| CART.get(i + offset))
                .unwrap_or(&"?")
                .to_string()
        };
        match self {
            Self::CartesianState | Self::Position => cart(0),
            Self::Velocity => cart(3),
            other => format!("{other}"),
        }
    }
}

impl fmt::Display for SolveFor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CartesianState => write!(f, "CartesianState"),
            Self::Position => write!(f, "Position"),
            Self::Velocity => write!(f, "Velocity"),
            Self::Bias => write!(f, "Bias"),
            Self::CrEpsilon => write!(f, "Cr_Epsilon"),
            Self::CdEpsilon => write!(f, "Cd_Epsilon"),
            Self::ThrustScaleFactor { force } => write!(f, "{force}.TSF_Epsilon"),
        }
    }
}

/// Tag of one scalar of the estimation state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StateElement {
    /// Name of the participant owning this parameter
    pub object: String,
    pub element: SolveFor,
    /// 1-indexed position of this scalar within its parameter
    pub subelement: usize,
    /// Number of scalars of the parameter
    pub length: usize,
    /// Index of this scalar in the estimation state
    pub index: usize,
}

impl fmt::Display for StateElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.object, self.element.label(self.subelement))
    }
}

/// The flat estimation state vector.
#[derive(Clone, Debug, PartialEq)]
pub struct EstimationState {
    pub epoch: Epoch,
    pub vector: DVector<f64>,
}

impl EstimationState {
    pub fn zeros(epoch: Epoch, size: usize) -> Self {
        Self {
            epoch,
            vector: DVector::zeros(size),
        }
    }

    pub fn len(&self) -> usize {
        self.vector.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vector.is_empty()
    }
}
