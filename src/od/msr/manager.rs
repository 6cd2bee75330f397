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

use super::{ComputedMeasurement, MeasurementModel, ObservationRecord};
use crate::linalg::DMatrix;
use crate::od::estimate::{EstimationStateManager, StateElement};
use crate::od::events::Event;
use crate::od::{NoObservationsSnafu, ODError, UnknownModelSnafu};
use crate::time::Epoch;
use snafu::{ensure, OptionExt};

/// Walks the tracking data in time order and evaluates the measurement models against it.
pub trait MeasurementManager {
    /// Loads the observations in time order, returns the number of records.
    fn load_observations(&mut self) -> Result<usize, ODError>;

    /// The current observation, `None` at the end of the data
    fn observation(&self) -> Option<&ObservationRecord>;

    fn observation_mut(&mut self) -> Option<&mut ObservationRecord>;

    fn observations(&self) -> &[ObservationRecord];

    /// Identifiers of the models which can compute the current observation
    fn valid_measurement_list(&self) -> Vec<usize>;

    /// Computes every model matching the current observation, returns the number computed
    fn calculate_measurements(
        &mut self,
        esm: &dyn EstimationStateManager,
        with_events: bool,
    ) -> Result<usize, ODError>;

    /// Computes a single model against the current observation
    fn calculate(
        &mut self,
        model: usize,
        esm: &dyn EstimationStateManager,
        with_events: bool,
    ) -> Result<&ComputedMeasurement, ODError>;

    /// Last computed measurement of the provided model
    fn measurement(&self, model: usize) -> Option<&ComputedMeasurement>;

    fn derivatives(
        &mut self,
        model: usize,
        element: &StateElement,
        esm: &dyn EstimationStateManager,
    ) -> Result<DMatrix<f64>, ODError>;

    /// Moves to the next observation, returns false at the end of the data
    fn advance_observation(&mut self) -> bool;

    /// Epoch of the current observation
    fn epoch(&self) -> Option<Epoch>;

    /// Epoch of the observation after the current one
    fn next_epoch(&self) -> Option<Epoch>;

    /// Rewinds to the first observation for a new pass
    fn reset(&mut self);

    /// Index of the current observation
    fn record_number(&self) -> usize;

    /// Number of events which must be located before accumulating
    fn event_count(&self) -> usize;

    fn events_mut(&mut self) -> &mut [Event];

    /// Applies the located event to the measurement which requested it
    fn process_event(
        &mut self,
        index: usize,
        esm: &dyn EstimationStateManager,
    ) -> Result<(), ODError>;

    /// Called once the estimator is done with the data
    fn processing_complete(&mut self);

    fn model_name(&self, model: usize) -> Option<&str>;
}

/// Measurement manager over an in-memory table of observations.
///
/// Each observation is computed by the first registered model whose type and participants match.
pub struct TrackingDataManager {
    observations: Vec<ObservationRecord>,
    models: Vec<Box<dyn MeasurementModel>>,
    computed: Vec<Option<ComputedMeasurement>>,
    current: usize,
    /// Request a light time event for each computed measurement
    pub light_time_events: bool,
    events: Vec<Event>,
    /// Model which requested each event
    event_models: Vec<usize>,
}

impl TrackingDataManager {
    pub fn new(observations: Vec<ObservationRecord>) -> Self {
        Self {
            observations,
            models: Vec::new(),
            computed: Vec::new(),
            current: 0,
            light_time_events: false,
            events: Vec::new(),
            event_models: Vec::new(),
        }
    }

    /// Registers a measurement model, its identifier is its registration order
    pub fn with_model(mut self, model: Box<dyn MeasurementModel>) -> Self {
        self.models.push(model);
        self.computed.push(None);
        self
    }

    pub fn with_light_time_events(mut self) -> Self {
        self.light_time_events = true;
        self
    }

    fn clear_events(&mut self) {
        self.events.clear();
        self.event_models.clear();
    }
}

impl MeasurementManager for TrackingDataManager {
    fn load_observations(&mut self) -> Result<usize, ODError> {
        ensure!(!self.observations.is_empty(), NoObservationsSnafu);
        self.observations.sort_by(|a, b| a.epoch.cmp(&b.epoch));
        self.current = 0;
        info!(
            "loaded {} observations from {} to {}",
            self.observations.len(),
            self.observations[0].epoch,
            self.observations[self.observations.len() - 1].epoch
        );
        Ok(self.observations.len())
    }

    fn observation(&self) -> Option<&ObservationRecord> {
        self.observations.get(self.current)
    }

    fn observation_mut(&mut self) -> Option<&mut ObservationRecord> {
        self.observations.get_mut(self.current)
    }

    fn observations(&self) -> &[ObservationRecord] {
        &self.observations
    }

    fn valid_measurement_list(&self) -> Vec<usize> {
        match self.observation() {
            Some(obs) => self
                .models
                .iter()
                .enumerate()
                .filter(|(_, model)| model.matches(obs))
                .map(|(id, _)| id)
                .take(1)
                .collect(),
            None => Vec::new(),
        }
    }

    fn calculate_measurements(
        &mut self,
        esm: &dyn EstimationStateManager,
        with_events: bool,
    ) -> Result<usize, ODError> {
        self.clear_events();
        let valid = self.valid_measurement_list();
        for &id in &valid {
            self.calculate(id, esm, with_events)?;
            if with_events && self.light_time_events {
                let obs_epoch = self.observations[self.current].epoch;
                let event = Event::new(
                    &format!("{} light time", self.models[id].name()),
                    self.models[id].participants().to_vec(),
                    obs_epoch,
                );
                self.events.push(event);
                self.event_models.push(id);
            }
        }
        Ok(valid.len())
    }

    fn calculate(
        &mut self,
        model: usize,
        esm: &dyn EstimationStateManager,
        with_events: bool,
    ) -> Result<&ComputedMeasurement, ODError> {
        let obs = self.observations.get(self.current).context(NoObservationsSnafu)?;
        let msr_model = self
            .models
            .get_mut(model)
            .context(UnknownModelSnafu { id: model })?;
        let mut computed = msr_model.calculate(obs, esm, with_events)?;
        computed.model_id = model;
        let slot = &mut self.computed[model];
        Ok(slot.insert(computed))
    }

    fn measurement(&self, model: usize) -> Option<&ComputedMeasurement> {
        self.computed.get(model).and_then(|c| c.as_ref())
    }

    fn derivatives(
        &mut self,
        model: usize,
        element: &StateElement,
        esm: &dyn EstimationStateManager,
    ) -> Result<DMatrix<f64>, ODError> {
        self.models
            .get_mut(model)
            .context(UnknownModelSnafu { id: model })?
            .derivatives(element, esm)
    }

    fn advance_observation(&mut self) -> bool {
        if self.current < self.observations.len() {
            self.current += 1;
        }
        self.clear_events();
        self.current < self.observations.len()
    }

    fn epoch(&self) -> Option<Epoch> {
        self.observation().map(|obs| obs.epoch)
    }

    fn next_epoch(&self) -> Option<Epoch> {
        self.observations.get(self.current + 1).map(|obs| obs.epoch)
    }

    fn reset(&mut self) {
        self.current = 0;
        self.clear_events();
        for computed in self.computed.iter_mut() {
            *computed = None;
        }
    }

    fn record_number(&self) -> usize {
        self.current
    }

    fn event_count(&self) -> usize {
        self.events.len()
    }

    fn events_mut(&mut self) -> &mut [Event] {
        &mut self.events
    }

    fn process_event(
        &mut self,
        index: usize,
        esm: &dyn EstimationStateManager,
    ) -> Result<(), ODError> {
        let (Some(event), Some(&model)) = (self.events.get(index), self.event_models.get(index))
        else {
            return Ok(());
        };
        debug!("processing {event}");
        // The located signal path is recomputed without requesting new events
        self.calculate(model, esm, false)?;
        Ok(())
    }

    fn processing_complete(&mut self) {
        self.clear_events();
        let used = self.observations.iter().filter(|obs| obs.in_use).count();
        debug!(
            "measurement processing complete: {used} of {} observations in use",
            self.observations.len()
        );
    }

    fn model_name(&self, model: usize) -> Option<&str> {
        self.models.get(model).map(|m| m.name())
    }
}

#[cfg(test)]
mod ut_tracking_data {
    use super::*;
    use crate::od::estimate::ParticipantStateManager;
    use crate::od::msr::MeasurementType;
    use crate::time::Unit;

    struct Constant {
        participants: Vec<String>,
        calls: usize,
    }

    impl MeasurementModel for Constant {
        fn name(&self) -> &str {
            "constant"
        }

        fn msr_type(&self) -> MeasurementType {
            MeasurementType::Range
        }

        fn participants(&self) -> &[String] {
            &self.participants
        }

        fn calculate(
            &mut self,
            obs: &ObservationRecord,
            _esm: &dyn EstimationStateManager,
            _with_events: bool,
        ) -> Result<ComputedMeasurement, ODError> {
            self.calls += 1;
            let mut msr = ComputedMeasurement::new(
                self.msr_type(),
                99,
                self.participants.clone(),
                obs.epoch,
                1,
            );
            msr.value[0] = 42.0;
            msr.feasible = true;
            Ok(msr)
        }

        fn derivatives(
            &mut self,
            element: &StateElement,
            _esm: &dyn EstimationStateManager,
        ) -> Result<DMatrix<f64>, ODError> {
            Ok(DMatrix::from_element(1, element.length, 1.0))
        }
    }

    fn obs(epoch: Epoch, station: &str) -> ObservationRecord {
        ObservationRecord::builder()
            .epoch(epoch)
            .msr_type(MeasurementType::Range)
            .participants(vec![station.to_string(), "Sat".to_string()])
            .value(vec![40.0])
            .build()
    }

    #[test]
    fn walk_and_match() {
        let epoch = Epoch::from_gregorian_utc_at_midnight(2024, 1, 1);
        let mut msr = TrackingDataManager::new(vec![
            obs(epoch + Unit::Minute * 1, "GDS"),
            obs(epoch, "GDS"),
            obs(epoch + Unit::Minute * 2, "MAD"),
        ])
        .with_model(Box::new(Constant {
            participants: vec!["GDS".to_string(), "Sat".to_string()],
            calls: 0,
        }))
        .with_light_time_events();
        let esm = ParticipantStateManager::new(Vec::new());

        assert_eq!(msr.load_observations().unwrap(), 3);
        assert_eq!(msr.epoch(), Some(epoch));
        assert_eq!(msr.next_epoch(), Some(epoch + Unit::Minute * 1));
        assert_eq!(msr.valid_measurement_list(), vec![0]);
        assert_eq!(msr.calculate_measurements(&esm, true).unwrap(), 1);
        assert_eq!(msr.event_count(), 1);
        let computed = msr.measurement(0).unwrap();
        assert_eq!(computed.model_id, 0);
        assert_eq!(computed.value, vec![42.0]);

        assert!(msr.advance_observation());
        assert_eq!(msr.event_count(), 0);
        assert!(msr.advance_observation());
        assert_eq!(msr.record_number(), 2);
        // No model for the MAD station
        assert!(msr.valid_measurement_list().is_empty());
        assert_eq!(msr.calculate_measurements(&esm, false).unwrap(), 0);
        assert!(!msr.advance_observation());
        assert!(msr.observation().is_none());

        msr.reset();
        assert_eq!(msr.record_number(), 0);
        assert!(msr.measurement(0).is_none());
        assert_eq!(msr.model_name(0), Some("constant"));
    }

    #[test]
    fn empty_data_is_an_error() {
        let mut msr = TrackingDataManager::new(Vec::new());
        assert!(matches!(msr.load_observations(), Err(ODError::NoObservations)));
    }
}
