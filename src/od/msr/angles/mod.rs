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

use crate::io::ConfigRepr;
use crate::linalg::{Matrix3, Vector3};
use crate::od::msr::MeasurementType;
use crate::od::{GeometricDegeneracySnafu, ODError};
use serde_derive::{Deserialize, Serialize};
use snafu::ensure;
use std::f64::consts::PI;
use std::fmt;
use typed_builder::TypedBuilder;

pub mod geometry;
use geometry::*;

mod frames;
pub use frames::{FrameArena, TopocentricFrame};

mod adapter;
pub use adapter::AngleAdapter;

const DEG_PER_RAD: f64 = 180.0 / PI;

/// Squared denominators below this value are considered zero
const DEGENERATE_SQ: f64 = 1e-30;

/// The angle measured by an adapter.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AngleKind {
    Azimuth,
    Elevation,
    RightAscension,
    Declination,
    XEast,
    YNorth,
    XSouth,
    YEast,
}

/// Line of sight from the station to the spacecraft after the aberration and media corrections.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct AngleSolution {
    /// Topocentric South-East-Zenith line of sight, km
    pub topo: Vector3<f64>,
    /// Inertial (J2000) line of sight, km
    pub mj2000: Vector3<f64>,
    /// Rotation from J2000 to the topocentric SEZ frame
    pub sez_from_j2k: Matrix3<f64>,
}

fn nonzero(value: f64, quantity: &'static str) -> Result<f64, ODError> {
    ensure!(
        value.abs() > DEGENERATE_SQ,
        GeometricDegeneracySnafu {
            quantity,
            action: "computing the angle gradient"
        }
    );
    Ok(value)
}

impl AngleKind {
    pub fn measurement_type(self) -> MeasurementType {
        match self {
            Self::Azimuth => MeasurementType::Azimuth,
            Self::Elevation => MeasurementType::Elevation,
            Self::RightAscension => MeasurementType::RightAscension,
            Self::Declination => MeasurementType::Declination,
            Self::XEast => MeasurementType::XEast,
            Self::YNorth => MeasurementType::YNorth,
            Self::XSouth => MeasurementType::XSouth,
            Self::YEast => MeasurementType::YEast,
        }
    }

    pub fn from_measurement_type(msr_type: MeasurementType) -> Option<Self> {
        match msr_type {
            MeasurementType::Azimuth => Some(Self::Azimuth),
            MeasurementType::Elevation => Some(Self::Elevation),
            MeasurementType::RightAscension => Some(Self::RightAscension),
            MeasurementType::Declination => Some(Self::Declination),
            MeasurementType::XEast => Some(Self::XEast),
            MeasurementType::YNorth => Some(Self::YNorth),
            MeasurementType::XSouth => Some(Self::XSouth),
            MeasurementType::YEast => Some(Self::YEast),
            _ => None,
        }
    }

    /// Angle of the provided line of sight, in degrees
    pub fn value(self, sol: &AngleSolution) -> Result<f64, ODError> {
        let rad = match self {
            Self::Azimuth => topocentric_sez_to_az_el(&sol.topo)?.0,
            Self::Elevation => topocentric_sez_to_az_el(&sol.topo)?.1,
            Self::XEast => topocentric_sez_to_xe_yn(&sol.topo)?.0,
            Self::YNorth => topocentric_sez_to_xe_yn(&sol.topo)?.1,
            Self::XSouth => topocentric_sez_to_xs_ye(&sol.topo)?.0,
            Self::YEast => topocentric_sez_to_xs_ye(&sol.topo)?.1,
            Self::RightAscension => mj2000_to_ra_dec(&sol.mj2000)?.0,
            Self::Declination => mj2000_to_ra_dec(&sol.mj2000)?.1,
        };
        Ok(rad * DEG_PER_RAD)
    }

    /// Gradient of the angle with respect to the inertial line of sight, in degrees per km.
    ///
    /// Topocentric gradients are rotated back to J2000. The aberration and media corrections are
    /// not differentiated.
    pub fn gradient(self, sol: &AngleSolution) -> Result<Vector3<f64>, ODError> {
        let grad_rad = match self {
            Self::RightAscension | Self::Declination => self.inertial_gradient(&sol.mj2000)?,
            _ => sol.sez_from_j2k.transpose() * self.topocentric_gradient(&sol.topo)?,
        };
        Ok(grad_rad * DEG_PER_RAD)
    }

    fn topocentric_gradient(self, topo: &Vector3<f64>) -> Result<Vector3<f64>, ODError> {
        let (x, y, z) = (topo.x, topo.y, topo.z);
        let r2 = topo.norm_squared();
        let grad = match self {
            Self::Azimuth => {
                let rho = nonzero(x * x + y * y, "x^2 + y^2")?;
                Vector3::new(y / rho, -x / rho, 0.0)
            }
            Self::Elevation => {
                let den = r2 * nonzero(r2 - z * z, "r^2 - z^2")?.sqrt();
                Vector3::new(-x * z, -y * z, r2 - z * z) / den
            }
            Self::XEast => {
                let den = nonzero(y * y + z * z, "y^2 + z^2")?;
                Vector3::new(0.0, z / den, -y / den)
            }
            Self::YNorth => {
                let den = r2 * nonzero(r2 - x * x, "r^2 - x^2")?.sqrt();
                Vector3::new(-(r2 - x * x), x * y, x * z) / den
            }
            Self::XSouth => {
                let den = nonzero(x * x + z * z, "x^2 + z^2")?;
                Vector3::new(z / den, 0.0, -x / den)
            }
            Self::YEast => {
                let den = r2 * nonzero(r2 - y * y, "r^2 - y^2")?.sqrt();
                Vector3::new(-x * y, r2 - y * y, -y * z) / den
            }
            Self::RightAscension | Self::Declination => Vector3::zeros(),
        };
        Ok(grad)
    }

    fn inertial_gradient(self, v: &Vector3<f64>) -> Result<Vector3<f64>, ODError> {
        let (x, y, z) = (v.x, v.y, v.z);
        let rho = nonzero(x * x + y * y, "x^2 + y^2")?;
        match self {
            Self::RightAscension => Ok(Vector3::new(-y, x, 0.0) / rho),
            Self::Declination => {
                let r2 = v.norm_squared();
                Ok(Vector3::new(-x * z, -y * z, rho) / (r2 * rho.sqrt()))
            }
            _ => Ok(Vector3::zeros()),
        }
    }

    pub fn is_periodic(self) -> bool {
        self.period_bounds().is_some()
    }

    /// Period and minimum value of periodic angles, in degrees
    pub fn period_bounds(self) -> Option<(f64, f64)> {
        match self {
            Self::RightAscension | Self::Azimuth => Some((360.0, 0.0)),
            Self::XEast | Self::YNorth | Self::XSouth | Self::YEast => Some((360.0, -180.0)),
            Self::Declination | Self::Elevation => None,
        }
    }

    /// Maps an elevation correction into this angle's own domain.
    ///
    /// Azimuth and the inertial angles are insensitive to an elevation-only correction.
    pub fn partial_wrt_elevation(self, topo: &Vector3<f64>) -> Result<f64, ODError> {
        match self {
            Self::Elevation => Ok(1.0),
            Self::XEast => partial_xe_partial_el(topo),
            Self::YNorth => partial_yn_partial_el(topo),
            Self::XSouth => partial_xs_partial_el(topo),
            Self::YEast => partial_ye_partial_el(topo),
            Self::Azimuth | Self::RightAscension | Self::Declination => Ok(0.0),
        }
    }
}

impl fmt::Display for AngleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.measurement_type())
    }
}

/// Configuration of an angle adapter
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize, TypedBuilder)]
pub struct AngleAdapterConf {
    /// Correct for the velocity of the station's central body w.r.t. the solar system barycenter
    #[builder(default)]
    #[serde(default, alias = "UseAnnualAberration")]
    pub annual_aberration: bool,
    /// Correct for the velocity of the station w.r.t. its central body
    #[builder(default)]
    #[serde(default, alias = "UseDiurnalAberration")]
    pub diurnal_aberration: bool,
    #[builder(default = true)]
    #[serde(default = "default_true")]
    pub light_time: bool,
    #[builder(default)]
    #[serde(default, alias = "UseMediaCorrection")]
    pub media_correction: bool,
    /// Add the bias of the station's error model to the computed value
    #[builder(default = true)]
    #[serde(default = "default_true")]
    pub add_bias: bool,
    /// Add Gaussian noise with the sigma of the station's error model, for simulation
    #[builder(default)]
    #[serde(default)]
    pub add_noise: bool,
    #[builder(default, setter(strip_option))]
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_true() -> bool {
    true
}

impl Default for AngleAdapterConf {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ConfigRepr for AngleAdapterConf {}
