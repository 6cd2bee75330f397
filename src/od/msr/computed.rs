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

use super::signal::{LegSummary, UplinkInfo};
use super::{EditReason, MeasurementType};
use crate::linalg::DMatrix;
use crate::time::Epoch;

/// Media correction bookkeeping of a computed measurement, in degrees.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct MediaReport {
    pub iono_raw_deg: f64,
    pub iono_deg: f64,
    pub iono_warning: bool,
    pub tropo_raw_deg: f64,
    pub tropo_deg: f64,
    /// Set when the raw troposphere correction is outside of [0, 0.5] degrees
    pub tropo_warning: bool,
}

/// The model predicted counterpart of an observation. Recomputed on every evaluation.
#[derive(Clone, Debug, PartialEq)]
pub struct ComputedMeasurement {
    pub msr_type: MeasurementType,
    /// Identifier of the measurement model which produced this measurement
    pub model_id: usize,
    pub participants: Vec<String>,
    pub epoch: Epoch,
    /// Computed values including bias and noise if enabled
    pub value: Vec<f64>,
    /// Sum of noise and bias added to each value
    pub correction: Vec<f64>,
    pub feasible: bool,
    /// `Normal` when feasible, else the reason the measurement cannot be formed
    pub unfeasible_reason: EditReason,
    /// Elevation angle at the station, in degrees (90 when unknown)
    pub feasibility_value: f64,
    /// Measurement noise covariance of the model
    pub covariance: DMatrix<f64>,
    pub legs: Vec<LegSummary>,
    pub uplink: UplinkInfo,
    pub media: MediaReport,
    pub is_periodic: bool,
    pub period: f64,
    pub min_value: f64,
}

impl ComputedMeasurement {
    /// Builds an empty, infeasible measurement of the provided type and size
    pub fn new(
        msr_type: MeasurementType,
        model_id: usize,
        participants: Vec<String>,
        epoch: Epoch,
        size: usize,
    ) -> Self {
        Self {
            msr_type,
            model_id,
            participants,
            epoch,
            value: vec![0.0; size],
            correction: vec![0.0; size],
            feasible: false,
            unfeasible_reason: EditReason::Normal,
            feasibility_value: 90.0,
            covariance: DMatrix::zeros(size, size),
            legs: Vec::new(),
            uplink: UplinkInfo::default(),
            media: MediaReport::default(),
            is_periodic: false,
            period: 0.0,
            min_value: 0.0,
        }
    }

    /// Variance of the k-th value from the model covariance
    pub fn variance(&self, k: usize) -> Option<f64> {
        self.covariance.get((k, k)).copied()
    }
}
