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

use super::ObservationRecord;
use crate::linalg::{DMatrix, Matrix3, Vector3};
use crate::od::estimate::EstimationStateManager;
use crate::od::ODError;
use crate::time::{Duration, Epoch};

/// Geodetic coordinates of a ground station, in degrees and kilometers.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct GeodeticPosition {
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub height_km: f64,
}

/// Media correction computed by the signal path collaborator for one leg.
#[derive(Clone, Debug, PartialEq)]
pub struct MediaCorrection {
    pub kind: MediaKind,
    /// Elevation correction in radians
    pub value_rad: f64,
    pub enabled: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MediaKind {
    Troposphere,
    Ionosphere,
}

/// Feasibility of a single leg as computed by the signal path collaborator.
///
/// The reason starts with `N` when feasible and with `B` when the signal is blocked,
/// followed by an optional detail (e.g. the blocking body).
#[derive(Clone, Debug, PartialEq)]
pub struct LegFeasibility {
    pub reason: String,
    /// Elevation of the signal at the station, in degrees
    pub value: f64,
}

impl Default for LegFeasibility {
    fn default() -> Self {
        Self {
            reason: "N".to_string(),
            value: 90.0,
        }
    }
}

/// Geometry of one leg of a signal path, after light time and media corrections.
///
/// This is a per-call context: the signal path collaborator builds it for each
/// measurement evaluation and the measurement models only read it.
#[derive(Clone, Debug)]
pub struct SignalLeg {
    /// Name of the participant transmitting the signal on this leg
    pub transmitter: String,
    /// Name of the participant receiving the signal on this leg
    pub receiver: String,
    pub transmitter_is_station: bool,
    pub receiver_is_station: bool,
    pub transmit_epoch: Epoch,
    pub receive_epoch: Epoch,
    /// Hardware delay at the receiver
    pub receive_delay: Duration,
    /// Transmitter location at transmit epoch, J2000, km
    pub transmit_location: Vector3<f64>,
    /// Receiver location at receive epoch, J2000, km
    pub receive_location: Vector3<f64>,
    /// Receiver location minus transmitter location, J2000, km
    pub range_vec_inertial: Vector3<f64>,
    /// Rotation from J2000 to the body fixed frame of the receiver at receive epoch
    pub receive_j2k_to_bf: Matrix3<f64>,
    /// Geodetic position of the receiving station, if the receiver is a station
    pub station: Option<GeodeticPosition>,
    /// Velocity of the receiver's central body with respect to the solar system barycenter, km/s
    pub origin_ssb_velocity: Vector3<f64>,
    /// Velocity of the receiver with respect to its central body, J2000, km/s
    pub receiver_velocity: Vector3<f64>,
    /// Dynamic STM of the transmitter at transmit epoch
    pub transmit_stm: DMatrix<f64>,
    /// Dynamic STM of the transmitter at the measurement epoch
    pub transmit_stm_tm: DMatrix<f64>,
    /// Dynamic STM of the receiver at receive epoch
    pub receive_stm: DMatrix<f64>,
    /// Dynamic STM of the receiver at the measurement epoch
    pub receive_stm_tm: DMatrix<f64>,
    pub feasibility: LegFeasibility,
    pub corrections: Vec<MediaCorrection>,
}

impl SignalLeg {
    /// Sum of the enabled corrections of the given kind, in radians
    pub fn media_correction_rad(&self, kind: MediaKind) -> f64 {
        self.corrections
            .iter()
            .filter(|c| c.kind == kind && c.enabled)
            .map(|c| c.value_rad)
            .sum()
    }

    /// Precision epoch of the measurement, i.e. receive epoch plus the receiver delay
    pub fn measurement_epoch(&self) -> Epoch {
        self.receive_epoch + self.receive_delay
    }
}

/// Summary of a leg stored with the computed measurement for reporting.
#[derive(Clone, Debug, PartialEq)]
pub struct LegSummary {
    pub transmitter: String,
    pub receiver: String,
    pub transmit_epoch: Epoch,
    pub receive_epoch: Epoch,
    pub transmit_location: Vector3<f64>,
    pub receive_location: Vector3<f64>,
    pub range_vec_inertial: Vector3<f64>,
}

impl From<&SignalLeg> for LegSummary {
    fn from(leg: &SignalLeg) -> Self {
        Self {
            transmitter: leg.transmitter.clone(),
            receiver: leg.receiver.clone(),
            transmit_epoch: leg.transmit_epoch,
            receive_epoch: leg.receive_epoch,
            transmit_location: leg.transmit_location,
            receive_location: leg.receive_location,
            range_vec_inertial: leg.range_vec_inertial,
        }
    }
}

/// Uplink metadata of the signal path.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct UplinkInfo {
    pub band: Option<i32>,
    pub freq_hz: Option<f64>,
    pub freq_at_receive_hz: Option<f64>,
}

/// The signal path collaborator: solves the light time equations and the media
/// corrections, and returns the legs of the path from the first transmitter to the last receiver.
pub trait SignalPath {
    /// Builds the legs of the signal path for the provided observation, with the participants
    /// in their current state.
    fn legs(
        &mut self,
        obs: &ObservationRecord,
        esm: &dyn EstimationStateManager,
        with_light_time: bool,
        with_media_correction: bool,
    ) -> Result<Vec<SignalLeg>, ODError>;

    /// Uplink metadata at the time of the last computed path
    fn uplink(&self) -> UplinkInfo {
        UplinkInfo::default()
    }
}
