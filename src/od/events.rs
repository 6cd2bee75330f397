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
use crate::od::ODError;
use crate::time::{Duration, Epoch, Unit};
use std::fmt;

/// Location status of an event
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum EventStatus {
    #[default]
    Seeking,
    Located,
    Failed,
}

/// An event which must be located before a measurement can be accumulated, e.g. the
/// transmit epoch of a light time corrected signal.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    pub name: String,
    /// Participants whose state the event depends on
    pub participants: Vec<String>,
    /// Initial guess of the event epoch
    pub estimate: Epoch,
    /// The duration precision after which the solver stops refining the event epoch
    pub epoch_precision: Duration,
    pub status: EventStatus,
    pub located_epoch: Option<Epoch>,
}

impl Event {
    pub fn new(name: &str, participants: Vec<String>, estimate: Epoch) -> Self {
        Self {
            name: name.to_string(),
            participants,
            estimate,
            epoch_precision: Unit::Microsecond * 1,
            status: EventStatus::Seeking,
            located_epoch: None,
        }
    }

    pub fn is_located(&self) -> bool {
        self.status == EventStatus::Located
    }

    /// Marks this event as located at the provided epoch
    pub fn locate(&mut self, epoch: Epoch) {
        self.status = EventStatus::Located;
        self.located_epoch = Some(epoch);
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.located_epoch {
            Some(epoch) => write!(f, "{} located at {epoch}", self.name),
            None => write!(f, "{} ({:?}) near {}", self.name, self.status, self.estimate),
        }
    }
}

/// Locates the events requested by the measurement models.
pub trait EventManager {
    /// Registers the event to locate
    fn set_object(&mut self, event: &Event);

    /// Unregisters the event
    fn clear_object(&mut self, event: &Event);

    /// Freezes the state of the participants which are not propagated during the search
    fn set_fixed_state(&mut self, event: &Event, esm: &dyn EstimationStateManager);

    /// Refines the event epoch, returns true once the event is located
    fn find_root(
        &mut self,
        event: &mut Event,
        esm: &dyn EstimationStateManager,
    ) -> Result<bool, ODError>;
}

/// Event manager used when none of the measurement models request events:
/// every event is located at its initial guess.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoEvents;

impl EventManager for NoEvents {
    fn set_object(&mut self, _event: &Event) {}

    fn clear_object(&mut self, _event: &Event) {}

    fn set_fixed_state(&mut self, _event: &Event, _esm: &dyn EstimationStateManager) {}

    fn find_root(
        &mut self,
        event: &mut Event,
        _esm: &dyn EstimationStateManager,
    ) -> Result<bool, ODError> {
        let epoch = event.estimate;
        event.locate(epoch);
        trace!("{event}");
        Ok(true)
    }
}

#[cfg(test)]
mod ut_events {
    use super::*;
    use crate::od::estimate::ParticipantStateManager;

    #[test]
    fn no_events_locates_at_estimate() {
        let epoch = Epoch::from_gregorian_utc_at_midnight(2024, 1, 1);
        let mut event = Event::new("LightTime", vec!["GDS".to_string(), "Sat".to_string()], epoch);
        assert!(!event.is_located());
        let esm = ParticipantStateManager::new(Vec::new());
        let mut em = NoEvents;
        em.set_object(&event);
        assert!(em.find_root(&mut event, &esm).unwrap());
        assert!(event.is_located());
        assert_eq!(event.located_epoch, Some(epoch));
    }
}
