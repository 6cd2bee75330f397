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

use super::{EstimationState, Participant, ParticipantKind, SolveFor, StateElement};
use crate::linalg::DMatrix;
use crate::od::{EmptyStateSnafu, ODError};
use crate::time::Epoch;
use snafu::ensure;

/// Snapshot of the participants, used to restart a pass from the state at the estimation epoch.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParticipantBuffer {
    pub participants: Vec<Participant>,
}

/// Maps the flat estimation state to and from the participants, and owns the estimation STM.
pub trait EstimationStateManager {
    /// Builds the state map from the registered solve-for parameters, returns the state size
    fn build_state(&mut self) -> Result<usize, ODError>;

    fn state_map(&self) -> &[StateElement];

    fn state(&self) -> &EstimationState;

    fn state_mut(&mut self) -> &mut EstimationState;

    /// Copies the participant parameters into the estimation state
    fn map_objects_to_vector(&mut self);

    /// Copies the estimation state into the participant parameters
    fn map_vector_to_objects(&mut self);

    fn buffer_objects(&self) -> ParticipantBuffer;

    fn restore_objects(&mut self, buffer: &ParticipantBuffer);

    fn stm(&self) -> &DMatrix<f64>;

    fn stm_mut(&mut self) -> &mut DMatrix<f64>;

    /// Copies the estimation STM into the participants' dynamic STMs
    fn map_stm_to_objects(&mut self);

    /// Assembles the estimation STM from the participants' dynamic STMs
    fn map_objects_to_stm(&mut self);

    /// A-priori covariance of the estimation state, if every participant with solve-fors provides one
    fn apriori_covariance(&self) -> Result<Option<DMatrix<f64>>, ODError>;

    fn participant(&self, name: &str) -> Option<&Participant>;

    fn participant_mut(&mut self, name: &str) -> Option<&mut Participant>;

    fn participants(&self) -> &[Participant];

    /// Epoch of the first spacecraft
    fn epoch(&self) -> Option<Epoch> {
        self.participants()
            .iter()
            .find(|p| p.is_spacecraft())
            .map(|p| p.epoch)
    }
}

/// Estimation state manager over a list of registered participants.
#[derive(Clone, Debug)]
pub struct ParticipantStateManager {
    participants: Vec<Participant>,
    state_map: Vec<StateElement>,
    state: EstimationState,
    stm: DMatrix<f64>,
}

impl ParticipantStateManager {
    pub fn new(participants: Vec<Participant>) -> Self {
        let epoch = participants
            .iter()
            .find(|p| p.is_spacecraft())
            .or(participants.first())
            .map(|p| p.epoch)
            .unwrap_or_else(|| Epoch::from_tai_seconds(0.0));
        Self {
            participants,
            state_map: Vec::new(),
            state: EstimationState::zeros(epoch, 0),
            stm: DMatrix::zeros(0, 0),
        }
    }

    /// Index in the estimation state of the first scalar of the provided parameter
    pub fn index_of(&self, object: &str, param: &SolveFor) -> Option<usize> {
        first_index(&self.state_map, object, param)
    }
}

impl EstimationStateManager for ParticipantStateManager {
    fn build_state(&mut self) -> Result<usize, ODError> {
        self.state_map.clear();
        for p in &self.participants {
            for sf in &p.solve_fors {
                let length = sf.size();
                for subelement in 1..=length {
                    let index = self.state_map.len();
                    self.state_map.push(StateElement {
                        object: p.name.clone(),
                        element: sf.clone(),
                        subelement,
                        length,
                        index,
                    });
                }
            }
        }
        let size = self.state_map.len();
        ensure!(size > 0, EmptyStateSnafu);

        let epoch = self.epoch().unwrap_or(self.state.epoch);
        self.state = EstimationState::zeros(epoch, size);
        self.stm = DMatrix::identity(size, size);
        self.map_objects_to_vector();
        debug!("estimation state built with {size} elements");
        Ok(size)
    }

    fn state_map(&self) -> &[StateElement] {
        &self.state_map
    }

    fn state(&self) -> &EstimationState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut EstimationState {
        &mut self.state
    }

    fn map_objects_to_vector(&mut self) {
        for elem in self.state_map.iter().filter(|e| e.subelement == 1) {
            if let Some(values) = self
                .participants
                .iter()
                .find(|p| p.name == elem.object)
                .and_then(|p| p.values(&elem.element))
            {
                for (k, value) in values.iter().take(elem.length).enumerate() {
                    self.state.vector[elem.index + k] = *value;
                }
            }
        }
        if let Some(epoch) = self.epoch() {
            self.state.epoch = epoch;
        }
    }

    fn map_vector_to_objects(&mut self) {
        for elem in self.state_map.iter().filter(|e| e.subelement == 1) {
            let values = self
                .state
                .vector
                .rows(elem.index, elem.length)
                .iter()
                .copied()
                .collect::<Vec<f64>>();
            if let Some(p) = self.participants.iter_mut().find(|p| p.name == elem.object) {
                if !p.set_values(&elem.element, &values) {
                    warn!("{} has no {} to update", p.name, elem.element);
                }
            }
        }
    }

    fn buffer_objects(&self) -> ParticipantBuffer {
        ParticipantBuffer {
            participants: self.participants.clone(),
        }
    }

    fn restore_objects(&mut self, buffer: &ParticipantBuffer) {
        self.participants = buffer.participants.clone();
    }

    fn stm(&self) -> &DMatrix<f64> {
        &self.stm
    }

    fn stm_mut(&mut self) -> &mut DMatrix<f64> {
        &mut self.stm
    }

    fn map_stm_to_objects(&mut self) {
        for p in self.participants.iter_mut() {
            let n = p.stm.nrows();
            p.stm = DMatrix::identity(n, n);
            for row_param in &p.solve_fors {
                let (Some(prow), Some(erow)) = (
                    p.stm_offset(row_param),
                    first_index(&self.state_map, &p.name, row_param),
                ) else {
                    continue;
                };
                for col_param in &p.solve_fors {
                    let (Some(pcol), Some(ecol)) = (
                        p.stm_offset(col_param),
                        first_index(&self.state_map, &p.name, col_param),
                    ) else {
                        continue;
                    };
                    for i in 0..row_param.size() {
                        for j in 0..col_param.size() {
                            p.stm[(prow + i, pcol + j)] = self.stm[(erow + i, ecol + j)];
                        }
                    }
                }
            }
        }
    }

    fn map_objects_to_stm(&mut self) {
        let size = self.state_map.len();
        self.stm = DMatrix::identity(size, size);
        for p in &self.participants {
            for row_param in &p.solve_fors {
                let (Some(prow), Some(erow)) = (
                    p.stm_offset(row_param),
                    first_index(&self.state_map, &p.name, row_param),
                ) else {
                    continue;
                };
                for col_param in &p.solve_fors {
                    let (Some(pcol), Some(ecol)) = (
                        p.stm_offset(col_param),
                        first_index(&self.state_map, &p.name, col_param),
                    ) else {
                        continue;
                    };
                    for i in 0..row_param.size() {
                        for j in 0..col_param.size() {
                            self.stm[(erow + i, ecol + j)] = p.stm[(prow + i, pcol + j)];
                        }
                    }
                }
            }
        }
    }

    fn apriori_covariance(&self) -> Result<Option<DMatrix<f64>>, ODError> {
        let size = self.state_map.len();
        let mut covar = DMatrix::zeros(size, size);
        let mut offset = 0;
        for p in self.participants.iter().filter(|p| !p.solve_fors.is_empty()) {
            let n = p.solve_for_size();
            match &p.apriori_covariance {
                None => return Ok(None),
                Some(p_covar) => {
                    if p_covar.nrows() != n || p_covar.ncols() != n {
                        return Err(ODError::AprioriSize {
                            rows: p_covar.nrows(),
                            cols: p_covar.ncols(),
                            size: n,
                        });
                    }
                    covar.view_mut((offset, offset), (n, n)).copy_from(p_covar);
                }
            }
            offset += n;
        }
        Ok(Some(covar))
    }

    fn participant(&self, name: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.name == name || p.id == name)
    }

    fn participant_mut(&mut self, name: &str) -> Option<&mut Participant> {
        self.participants
            .iter_mut()
            .find(|p| p.name == name || p.id == name)
    }

    fn participants(&self) -> &[Participant] {
        &self.participants
    }
}

fn first_index(map: &[StateElement], object: &str, param: &SolveFor) -> Option<usize> {
    map.iter()
        .find(|e| e.subelement == 1 && e.object == object && &e.element == param)
        .map(|e| e.index)
}

/// Returns the names of the error models of the provided station
pub fn error_models_of<'a>(
    esm: &'a dyn EstimationStateManager,
    station: &'a str,
) -> impl Iterator<Item = &'a Participant> + 'a {
    esm.participants().iter().filter(move |p| {
        matches!(&p.kind, ParticipantKind::ErrorModel { station: owner, .. } if owner == station)
    })
}

#[cfg(test)]
mod ut_esm {
    use super::*;
    use crate::linalg::Vector6;
    use crate::od::msr::MeasurementType;
    use crate::time::Unit;

    fn esm() -> ParticipantStateManager {
        let epoch = Epoch::from_gregorian_utc_at_midnight(2024, 1, 1);
        let sat = Participant::spacecraft(
            "Sat",
            epoch,
            Vector6::new(7000.0, 0.0, 0.0, 0.0, 7.5, 0.0),
            None,
        )
        .with_solve_for(SolveFor::CartesianState)
        .with_dynamic_parameter(SolveFor::CrEpsilon, 0.0)
        .with_solve_for(SolveFor::CrEpsilon)
        .with_apriori(DMatrix::identity(7, 7));
        let bias = Participant::error_model(
            "GDS.RA",
            epoch,
            "GDS",
            MeasurementType::RightAscension,
            0.01,
            1e-3,
        )
        .with_solve_for(SolveFor::Bias)
        .with_apriori(DMatrix::identity(1, 1) * 4.0);
        ParticipantStateManager::new(vec![sat, bias])
    }

    #[test]
    fn state_map_and_vector() {
        let mut esm = esm();
        assert_eq!(esm.build_state().unwrap(), 8);
        let map = esm.state_map();
        assert_eq!(map[0].to_string(), "Sat.X");
        assert_eq!(map[5].to_string(), "Sat.VZ");
        assert_eq!(map[6].element, SolveFor::CrEpsilon);
        assert_eq!(map[7].object, "GDS.RA");
        assert_eq!(esm.state().vector[7], 0.01);
        assert_eq!(esm.index_of("GDS.RA", &SolveFor::Bias), Some(7));

        esm.state_mut().vector[0] += 1.0;
        esm.state_mut().vector[7] = 0.5;
        esm.map_vector_to_objects();
        assert_eq!(esm.participant("Sat").unwrap().cartesian().unwrap()[0], 7001.0);
        assert_eq!(esm.participant("GDS.RA").unwrap().values(&SolveFor::Bias).unwrap(), vec![0.5]);
    }

    #[test]
    fn stm_mapping_and_buffer() {
        let mut esm = esm();
        esm.build_state().unwrap();
        let buffer = esm.buffer_objects();
        {
            let sat = esm.participant_mut("Sat").unwrap();
            sat.stm[(0, 3)] = 60.0;
            sat.stm[(0, 6)] = 2.0;
            sat.epoch += Unit::Minute * 1;
        }
        esm.map_objects_to_stm();
        assert_eq!(esm.stm()[(0, 3)], 60.0);
        assert_eq!(esm.stm()[(0, 6)], 2.0);
        assert_eq!(esm.stm()[(7, 7)], 1.0);

        *esm.stm_mut() = DMatrix::identity(8, 8);
        esm.map_stm_to_objects();
        assert_eq!(esm.participant("Sat").unwrap().stm, DMatrix::identity(7, 7));

        esm.restore_objects(&buffer);
        assert_eq!(esm.participant("Sat").unwrap().epoch, buffer.participants[0].epoch);

        let covar = esm.apriori_covariance().unwrap().unwrap();
        assert_eq!(covar[(7, 7)], 4.0);
        assert_eq!(covar[(6, 6)], 1.0);
        assert_eq!(error_models_of(&esm, "GDS").count(), 1);
    }
}
