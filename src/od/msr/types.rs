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

use enum_iterator::{all, Sequence};
use serde_derive::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::od::ODError;

/// All of the measurement types known to the estimator.
///
/// The name table is a pure function of the variant: there is no registration step.
#[derive(
    Copy, Clone, Debug, Hash, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Sequence,
)]
pub enum MeasurementType {
    #[serde(rename = "Range")]
    Range,
    #[serde(rename = "DSN_SeqRange")]
    DsnRange,
    #[serde(rename = "DSN_TCP")]
    Doppler,
    #[serde(rename = "RangeRate")]
    RangeRate,
    #[serde(rename = "Azimuth")]
    Azimuth,
    #[serde(rename = "Elevation")]
    Elevation,
    #[serde(rename = "RightAscension")]
    RightAscension,
    #[serde(rename = "Declination")]
    Declination,
    #[serde(rename = "XEast")]
    XEast,
    #[serde(rename = "YNorth")]
    YNorth,
    #[serde(rename = "XSouth")]
    XSouth,
    #[serde(rename = "YEast")]
    YEast,
}

impl MeasurementType {
    /// Returns the name of this measurement type as found in tracking data files
    pub fn name(self) -> &'static str {
        match self {
            Self::Range => "Range",
            Self::DsnRange => "DSN_SeqRange",
            Self::Doppler => "DSN_TCP",
            Self::RangeRate => "RangeRate",
            Self::Azimuth => "Azimuth",
            Self::Elevation => "Elevation",
            Self::RightAscension => "RightAscension",
            Self::Declination => "Declination",
            Self::XEast => "XEast",
            Self::YNorth => "YNorth",
            Self::XSouth => "XSouth",
            Self::YEast => "YEast",
        }
    }

    /// Returns the expected unit of this measurement type
    pub fn unit(self) -> &'static str {
        match self {
            Self::Range => "km",
            Self::DsnRange => "RU",
            Self::Doppler => "Hz",
            Self::RangeRate => "km/s",
            Self::Azimuth
            | Self::Elevation
            | Self::RightAscension
            | Self::Declination
            | Self::XEast
            | Self::YNorth
            | Self::XSouth
            | Self::YEast => "deg",
        }
    }

    /// Returns whether this is an angle measurement, in degrees
    pub fn is_angle(self) -> bool {
        self.unit() == "deg"
    }

    /// Returns whether the observed value of this type may need a range modulo correction
    pub fn is_modulo_range(self) -> bool {
        self == Self::DsnRange
    }

    /// Returns the names of all of the available measurement types
    pub fn all_names() -> Vec<&'static str> {
        all::<Self>().map(|t| t.name()).collect()
    }
}

impl fmt::Display for MeasurementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for MeasurementType {
    type Err = ODError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        all::<Self>()
            .find(|t| t.name() == s)
            .ok_or_else(|| ODError::UnknownMeasurementType {
                name: s.to_string(),
            })
    }
}

#[cfg(test)]
mod ut_msr_types {
    use super::*;

    #[test]
    fn name_table_round_trips() {
        let names = MeasurementType::all_names();
        assert_eq!(names.len(), 12);
        for name in names {
            let msr_type = MeasurementType::from_str(name).unwrap();
            assert_eq!(msr_type.name(), name);
        }
        assert!(MeasurementType::from_str("TDRSDoppler_HZ").is_err());
    }

    #[test]
    fn units() {
        assert_eq!(MeasurementType::RightAscension.unit(), "deg");
        assert!(MeasurementType::YEast.is_angle());
        assert!(!MeasurementType::Range.is_angle());
        assert!(MeasurementType::DsnRange.is_modulo_range());
    }
}
