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

use super::InversionAlgorithm;
use crate::io::{duration_from_str, duration_to_str, ConfigError, ConfigRepr, InvalidConfigSnafu};
use crate::time::{Duration, Epoch, Unit};
use serde::{Deserializer, Serializer};
use serde_derive::{Deserialize, Serialize};
use snafu::ensure;
use std::fmt;
use std::str::FromStr;
use typed_builder::TypedBuilder;

/// Epoch at which the state is estimated
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub enum EstimationEpoch {
    /// Epoch of the first spacecraft participant
    #[default]
    FromParticipants,
    Epoch(Epoch),
}

impl fmt::Display for EstimationEpoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FromParticipants => write!(f, "FromParticipants"),
            Self::Epoch(epoch) => write!(f, "{epoch}"),
        }
    }
}

impl FromStr for EstimationEpoch {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "FromParticipants" {
            return Ok(Self::FromParticipants);
        }
        Epoch::from_str(s).map(Self::Epoch).or_else(|e| {
            InvalidConfigSnafu {
                msg: format!("EstimationEpoch `{s}` is neither FromParticipants nor an epoch: {e}"),
            }
            .fail()
        })
    }
}

impl serde::Serialize for EstimationEpoch {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for EstimationEpoch {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = <String as serde::Deserialize>::deserialize(deserializer)?;
        Self::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Level of detail of the estimator report
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportMode {
    #[default]
    Normal,
    /// Adds the TAI MJD epochs, the partials and the signal metadata to each observation line
    Verbose,
}

/// Configuration of the batch least squares estimator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, TypedBuilder)]
#[builder(doc)]
pub struct BatchConf {
    /// Name used in the report and in error messages
    #[builder(default = String::from("BatchEstimator"), setter(into))]
    #[serde(default = "default_name")]
    pub name: String,
    /// Converged when the weighted RMS is below this value
    #[builder(default = 1e-3)]
    #[serde(default = "default_absolute_tol", alias = "AbsoluteTol")]
    pub absolute_tol: f64,
    /// Converged when the relative change between the predicted and best RMS is below this value
    #[builder(default = 1e-4)]
    #[serde(default = "default_relative_tol", alias = "RelativeTol")]
    pub relative_tol: f64,
    #[builder(default = 15)]
    #[serde(default = "default_max_iterations", alias = "MaxIterations")]
    pub max_iterations: usize,
    #[builder(default = 3)]
    #[serde(
        default = "default_max_consecutive_divergences",
        alias = "MaxConsecutiveDivergences"
    )]
    pub max_consecutive_divergences: usize,
    /// Initial RMS sigma editing threshold, used on the first iteration
    #[builder(default = 3000.0)]
    #[serde(default = "default_olse_initial_rms_sigma", alias = "OLSEInitialRMSSigma")]
    pub olse_initial_rms_sigma: f64,
    #[builder(default = 3.0)]
    #[serde(
        default = "default_olse_multiplicative_constant",
        alias = "OLSEMultiplicativeConstant"
    )]
    pub olse_multiplicative_constant: f64,
    #[builder(default = 0.0)]
    #[serde(default, alias = "OLSEAdditiveConstant")]
    pub olse_additive_constant: f64,
    /// Edit with the predicted RMS of the previous pass instead of its weighted RMS
    #[builder(default = true)]
    #[serde(default = "default_true", alias = "OLSEUseRMSP")]
    pub edit_with_predicted_rms: bool,
    /// After a divergence, compare against the previous RMS instead of the best RMS
    #[builder(default = false)]
    #[serde(default, alias = "ResetBestRMSIfDiverging")]
    pub reset_best_rms_on_divergence: bool,
    /// Start each pass from the a-priori covariance of the participants
    #[builder(default = false)]
    #[serde(default, alias = "UseInitialCovariance")]
    pub use_apriori: bool,
    #[builder(default)]
    #[serde(default, alias = "InversionAlgorithm")]
    pub inversion_algorithm: InversionAlgorithm,
    #[builder(default)]
    #[serde(default, alias = "EstimationEpoch")]
    pub estimation_epoch: EstimationEpoch,
    /// Register the residuals of each measurement model for plotting
    #[builder(default = true)]
    #[serde(default = "default_true", alias = "ShowAllResiduals")]
    pub show_all_residuals: bool,
    #[builder(default)]
    #[serde(default, alias = "ReportStyle")]
    pub report_mode: ReportMode,
    /// Path of the text report, kept in memory only if unset
    #[builder(default, setter(strip_option, into))]
    #[serde(default, alias = "ReportFile")]
    pub report_file: Option<String>,
    /// Two epochs closer than this are considered equal
    #[builder(default = Unit::Microsecond * 1)]
    #[serde(
        default = "default_epoch_precision",
        serialize_with = "duration_to_str",
        deserialize_with = "duration_from_str"
    )]
    pub epoch_precision: Duration,
}

fn default_name() -> String {
    String::from("BatchEstimator")
}

fn default_absolute_tol() -> f64 {
    1e-3
}

fn default_relative_tol() -> f64 {
    1e-4
}

fn default_max_iterations() -> usize {
    15
}

fn default_max_consecutive_divergences() -> usize {
    3
}

fn default_olse_initial_rms_sigma() -> f64 {
    3000.0
}

fn default_olse_multiplicative_constant() -> f64 {
    3.0
}

fn default_true() -> bool {
    true
}

fn default_epoch_precision() -> Duration {
    Unit::Microsecond * 1
}

impl Default for BatchConf {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ConfigRepr for BatchConf {}

impl BatchConf {
    /// Checks the numeric options.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure!(
            self.absolute_tol > 0.0,
            InvalidConfigSnafu {
                msg: "AbsoluteTol parameter is not a positive number"
            }
        );
        ensure!(
            self.relative_tol > 0.0 && self.relative_tol <= 1.0,
            InvalidConfigSnafu {
                msg: format!(
                    "RelativeTol must be in (0, 1] but is {}",
                    self.relative_tol
                )
            }
        );
        ensure!(
            self.olse_initial_rms_sigma > 0.0,
            InvalidConfigSnafu {
                msg: "OLSEInitialRMSSigma parameter is not a positive number"
            }
        );
        ensure!(
            self.olse_multiplicative_constant > 0.0,
            InvalidConfigSnafu {
                msg: "OLSEMultiplicativeConstant parameter is not a positive number"
            }
        );
        ensure!(
            self.max_iterations > 0,
            InvalidConfigSnafu {
                msg: "MaxIterations parameter must be at least 1"
            }
        );
        ensure!(
            self.max_consecutive_divergences > 0,
            InvalidConfigSnafu {
                msg: "MaxConsecutiveDivergences parameter must be at least 1"
            }
        );
        Ok(())
    }
}

impl fmt::Display for BatchConf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Estimator                     : {}", self.name)?;
        writeln!(f, "Absolute tolerance            : {:e}", self.absolute_tol)?;
        writeln!(f, "Relative tolerance            : {:e}", self.relative_tol)?;
        writeln!(f, "Maximum iterations            : {}", self.max_iterations)?;
        writeln!(
            f,
            "Maximum consecutive divergences : {}",
            self.max_consecutive_divergences
        )?;
        writeln!(
            f,
            "OLSE initial RMS sigma        : {}",
            self.olse_initial_rms_sigma
        )?;
        writeln!(
            f,
            "OLSE multiplicative constant  : {}",
            self.olse_multiplicative_constant
        )?;
        writeln!(
            f,
            "OLSE additive constant        : {}",
            self.olse_additive_constant
        )?;
        writeln!(
            f,
            "Edit with predicted RMS       : {}",
            self.edit_with_predicted_rms
        )?;
        writeln!(f, "Use a-priori covariance       : {}", self.use_apriori)?;
        writeln!(
            f,
            "Inversion algorithm           : {}",
            self.inversion_algorithm
        )?;
        write!(f, "Estimation epoch              : {}", self.estimation_epoch)
    }
}
