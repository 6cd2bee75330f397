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

use super::MeasurementType;
use crate::linalg::DMatrix;
use crate::time::Epoch;
use std::fmt;
use std::str::FromStr;
use typed_builder::TypedBuilder;

/// Reason why an observation was, or was not, used in the current pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum EditReason {
    /// Not edited, `N`
    #[default]
    Normal,
    /// No computed measurement configuration matches this observation, `U`
    Unused,
    /// Observation epoch outside of the ramp table, `R`
    RampOutOfRange,
    /// Signal blocked on the given leg (1-indexed), `B<leg><detail>`
    Blocked { leg: usize, detail: String },
    /// Sigma edited on the first iteration, `IRMS`
    InitialRms,
    /// Sigma edited on the outer loop, `OLSE`
    OuterLoopSigma,
}

impl EditReason {
    /// Returns true if this observation is excluded for geometric or configuration reasons,
    /// in which case it is excluded from every iteration.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::Unused | Self::RampOutOfRange | Self::Blocked { .. }
        )
    }

    /// Returns true if this observation was rejected on statistical grounds
    pub fn is_sigma_edit(&self) -> bool {
        matches!(self, Self::InitialRms | Self::OuterLoopSigma)
    }

    /// Key used to count the removed observations per reason, e.g. `B` for all blocked legs.
    pub fn family(&self) -> &'static str {
        match self {
            Self::Normal => "N",
            Self::Unused => "U",
            Self::RampOutOfRange => "R",
            Self::Blocked { .. } => "B",
            Self::InitialRms => "IRMS",
            Self::OuterLoopSigma => "OLSE",
        }
    }
}

impl fmt::Display for EditReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blocked { leg, detail } => write!(f, "B{leg}{detail}"),
            other => write!(f, "{}", other.family()),
        }
    }
}

impl FromStr for EditReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "N" | "" => Ok(Self::Normal),
            "U" => Ok(Self::Unused),
            "R" => Ok(Self::RampOutOfRange),
            "IRMS" => Ok(Self::InitialRms),
            "OLSE" => Ok(Self::OuterLoopSigma),
            _ => {
                let rest = s
                    .strip_prefix('B')
                    .ok_or_else(|| format!("unknown edit reason `{s}`"))?;
                let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
                let leg = digits.parse::<usize>().unwrap_or(0);
                Ok(Self::Blocked {
                    leg,
                    detail: rest[digits.len()..].to_string(),
                })
            }
        }
    }
}

/// A single tracking observation, as loaded from the tracking data.
///
/// Observations are never deleted: data editing only toggles `in_use` and sets `removed_reason`.
#[derive(Clone, Debug, PartialEq, TypedBuilder)]
pub struct ObservationRecord {
    pub epoch: Epoch,
    pub msr_type: MeasurementType,
    /// Participant identifiers along the signal path, starting with the observing station
    pub participants: Vec<String>,
    /// Observed values, in the units of the measurement type
    pub value: Vec<f64>,
    /// Observed values as read, before any range modulo correction
    #[builder(default = value.clone())]
    pub value_orig: Vec<f64>,
    /// Optional observation noise covariance, overrides the measurement model covariance
    #[builder(default, setter(strip_option))]
    pub noise_covariance: Option<DMatrix<f64>>,
    #[builder(default = true)]
    pub in_use: bool,
    #[builder(default)]
    pub removed_reason: EditReason,
    /// Uplink band (1 = S-band, 2 = X-band, ...) if known
    #[builder(default, setter(strip_option))]
    pub uplink_band: Option<i32>,
    /// Uplink frequency in Hz if known
    #[builder(default, setter(strip_option))]
    pub uplink_freq_hz: Option<f64>,
    /// Range modulo in range units, for sequential ranging
    #[builder(default, setter(strip_option))]
    pub range_modulo: Option<f64>,
    /// Doppler count interval in seconds
    #[builder(default, setter(strip_option))]
    pub doppler_count_interval_s: Option<f64>,
}

impl ObservationRecord {
    /// Name of the station, i.e. the first participant, used to key the statistics
    pub fn station(&self) -> &str {
        self.participants.first().map(String::as_str).unwrap_or("")
    }

    /// Marks this observation as removed from the current pass for the given reason
    pub fn mark_unused(&mut self, reason: EditReason) {
        self.in_use = false;
        self.removed_reason = reason;
    }

    /// Restores this observation for the next pass
    pub fn readmit(&mut self) {
        self.in_use = true;
        self.removed_reason = EditReason::Normal;
    }

    /// Variance of the k-th value from the observation noise covariance, if any
    pub fn variance(&self, k: usize) -> Option<f64> {
        self.noise_covariance
            .as_ref()
            .and_then(|cov| cov.get((k, k)).copied())
    }
}
