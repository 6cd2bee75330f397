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

use super::SolveFor;
use crate::linalg::{DMatrix, Vector6};
use crate::od::msr::signal::GeodeticPosition;
use crate::od::msr::MeasurementType;
use crate::time::Epoch;
use std::collections::BTreeMap;

/// What a participant is, and the data specific to its kind.
#[derive(Clone, Debug, PartialEq)]
pub enum ParticipantKind {
    /// A spacecraft, with the gravitational parameter of its central body when known
    Spacecraft { mu_km3_s2: Option<f64> },
    /// A ground station fixed on its central body
    GroundStation { position: GeodeticPosition },
    /// The error model of a station for one measurement type
    ErrorModel {
        station: String,
        msr_type: MeasurementType,
        noise_sigma: f64,
    },
    /// A finite burn force applied to the listed spacecraft
    ThrustForce { spacecraft: Vec<String> },
}

/// A participant of the estimation: anything which owns solve-for parameters or appears in a signal path.
#[derive(Clone, Debug, PartialEq)]
pub struct Participant {
    pub name: String,
    pub id: String,
    pub kind: ParticipantKind,
    pub epoch: Epoch,
    /// Current value of each parameter; position and velocity are views into the Cartesian state
    pub parameters: BTreeMap<SolveFor, Vec<f64>>,
    /// Parameters of this participant included in the estimation state, in order
    pub solve_fors: Vec<SolveFor>,
    /// Dynamic state transition matrix of this participant, laid out as `stm_elements`
    pub stm: DMatrix<f64>,
    pub stm_elements: Vec<SolveFor>,
    /// A-priori covariance over the solve-for parameters, in order
    pub apriori_covariance: Option<DMatrix<f64>>,
}

impl Participant {
    fn new(name: &str, kind: ParticipantKind, epoch: Epoch) -> Self {
        Self {
            name: name.to_string(),
            id: name.to_string(),
            kind,
            epoch,
            parameters: BTreeMap::new(),
            solve_fors: Vec::new(),
            stm: DMatrix::zeros(0, 0),
            stm_elements: Vec::new(),
            apriori_covariance: None,
        }
    }

    /// Initializes a spacecraft from its J2000 Cartesian state, km and km/s. Its dynamic STM is the 6x6 identity.
    pub fn spacecraft(
        name: &str,
        epoch: Epoch,
        state: Vector6<f64>,
        mu_km3_s2: Option<f64>,
    ) -> Self {
        let mut me = Self::new(name, ParticipantKind::Spacecraft { mu_km3_s2 }, epoch);
        me.parameters
            .insert(SolveFor::CartesianState, state.as_slice().to_vec());
        me.stm = DMatrix::identity(6, 6);
        me.stm_elements.push(SolveFor::CartesianState);
        me
    }

    /// Initializes a ground station from its geodetic position
    pub fn ground_station(name: &str, epoch: Epoch, position: GeodeticPosition) -> Self {
        Self::new(name, ParticipantKind::GroundStation { position }, epoch)
    }

    /// Initializes the error model of a station for a measurement type
    pub fn error_model(
        name: &str,
        epoch: Epoch,
        station: &str,
        msr_type: MeasurementType,
        bias: f64,
        noise_sigma: f64,
    ) -> Self {
        let mut me = Self::new(
            name,
            ParticipantKind::ErrorModel {
                station: station.to_string(),
                msr_type,
                noise_sigma,
            },
            epoch,
        );
        me.parameters.insert(SolveFor::Bias, vec![bias]);
        me
    }

    /// Initializes a thrust force applied to the listed spacecraft
    pub fn thrust_force(name: &str, epoch: Epoch, spacecraft: Vec<String>, tsf: f64) -> Self {
        let mut me = Self::new(name, ParticipantKind::ThrustForce { spacecraft }, epoch);
        me.parameters.insert(
            SolveFor::ThrustScaleFactor {
                force: name.to_string(),
            },
            vec![tsf],
        );
        me
    }

    /// Sets the identifier used in tracking data, defaults to the name
    pub fn with_id(mut self, id: &str) -> Self {
        self.id = id.to_string();
        self
    }

    /// Adds the provided parameter to the estimation state
    pub fn with_solve_for(mut self, param: SolveFor) -> Self {
        self.solve_fors.push(param);
        self
    }

    /// Adds a dynamic parameter (e.g. Cr_Epsilon) to the dynamic STM of this participant
    pub fn with_dynamic_parameter(mut self, param: SolveFor, value: f64) -> Self {
        let n = self.stm.nrows() + param.size();
        let mut stm = DMatrix::identity(n, n);
        stm.view_mut((0, 0), (self.stm.nrows(), self.stm.ncols()))
            .copy_from(&self.stm);
        self.stm = stm;
        self.stm_elements.push(param.clone());
        self.parameters.insert(param, vec![value]);
        self
    }

    /// Sets the a-priori covariance of the solve-for parameters
    pub fn with_apriori(mut self, covariance: DMatrix<f64>) -> Self {
        self.apriori_covariance = Some(covariance);
        self
    }

    /// Number of scalars this participant contributes to the estimation state
    pub fn solve_for_size(&self) -> usize {
        self.solve_fors.iter().map(|sf| sf.size()).sum()
    }

    /// Returns the current values of the provided parameter
    pub fn values(&self, param: &SolveFor) -> Option<Vec<f64>> {
        match param {
            SolveFor::Position => self
                .parameters
                .get(&SolveFor::CartesianState)
                .map(|cart| cart[..3].to_vec()),
            SolveFor::Velocity => self
                .parameters
                .get(&SolveFor::CartesianState)
                .map(|cart| cart[3..6].to_vec()),
            other => self.parameters.get(other).cloned(),
        }
    }

    /// Sets the values of the provided parameter, returns false if this participant does not have it
    pub fn set_values(&mut self, param: &SolveFor, values: &[f64]) -> bool {
        let (key, offset) = match param {
            SolveFor::Position => (SolveFor::CartesianState, 0),
            SolveFor::Velocity => (SolveFor::CartesianState, 3),
            other => (other.clone(), 0),
        };
        match self.parameters.get_mut(&key) {
            Some(current) if current.len() >= offset + values.len() => {
                current[offset..offset + values.len()].copy_from_slice(values);
                true
            }
            _ => false,
        }
    }

    /// Cartesian state of a spacecraft
    pub fn cartesian(&self) -> Option<Vector6<f64>> {
        self.parameters
            .get(&SolveFor::CartesianState)
            .filter(|cart| cart.len() == 6)
            .map(|cart| Vector6::from_column_slice(cart))
    }

    /// Offset of the provided parameter in the dynamic STM, if it is a dynamic parameter
    pub fn stm_offset(&self, param: &SolveFor) -> Option<usize> {
        let (key, extra) = match param {
            SolveFor::Position => (&SolveFor::CartesianState, 0),
            SolveFor::Velocity => (&SolveFor::CartesianState, 3),
            other => (other, 0),
        };
        let mut offset = 0;
        for elem in &self.stm_elements {
            if elem == key {
                return Some(offset + extra);
            }
            offset += elem.size();
        }
        None
    }

    pub fn is_spacecraft(&self) -> bool {
        matches!(self.kind, ParticipantKind::Spacecraft { .. })
    }

    pub fn is_ground_station(&self) -> bool {
        matches!(self.kind, ParticipantKind::GroundStation { .. })
    }
}

#[cfg(test)]
mod ut_participant {
    use super::*;

    fn sc() -> Participant {
        Participant::spacecraft(
            "Sat",
            Epoch::from_gregorian_utc_at_midnight(2024, 1, 1),
            Vector6::new(7000.0, 0.0, 0.0, 0.0, 7.5, 0.0),
            Some(398_600.4415),
        )
    }

    #[test]
    fn views_and_offsets() {
        let mut sat = sc()
            .with_solve_for(SolveFor::CartesianState)
            .with_dynamic_parameter(SolveFor::CrEpsilon, 0.1)
            .with_dynamic_parameter(SolveFor::CdEpsilon, 0.2);
        assert_eq!(sat.values(&SolveFor::Velocity).unwrap(), vec![0.0, 7.5, 0.0]);
        assert!(sat.set_values(&SolveFor::Position, &[7100.0, 1.0, 2.0]));
        assert_eq!(sat.cartesian().unwrap()[0], 7100.0);
        assert_eq!(sat.stm.nrows(), 8);
        assert_eq!(sat.stm_offset(&SolveFor::Velocity), Some(3));
        assert_eq!(sat.stm_offset(&SolveFor::CrEpsilon), Some(6));
        assert_eq!(sat.stm_offset(&SolveFor::CdEpsilon), Some(7));
        assert_eq!(sat.stm_offset(&SolveFor::Bias), None);
        assert!(!sat.set_values(&SolveFor::Bias, &[1.0]));
        assert_eq!(sat.solve_for_size(), 6);
    }
}
