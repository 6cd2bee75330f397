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

//! Geometry helpers shared by all of the angle measurement models.
//!
//! Topocentric vectors are expressed in the South-East-Zenith (SEZ) frame of the station.
//! All of the functions return radians unless the name says otherwise, and refuse degenerate
//! vectors instead of returning NaN.

use crate::linalg::{Matrix3, Vector3};
use crate::od::msr::signal::SignalLeg;
use crate::od::{GeometricDegeneracySnafu, ODError};
use crate::utils::between_0_tau;
use snafu::ensure;

/// Speed of light in km/s
pub const SPEED_OF_LIGHT_KM_S: f64 = 299_792.458;

/// Squared norms below this value are considered zero
const DEGENERATE_SQ: f64 = 1e-30;

fn magnitude(v: &Vector3<f64>, action: &'static str) -> Result<f64, ODError> {
    let mag = v.norm();
    ensure!(
        mag * mag > DEGENERATE_SQ,
        GeometricDegeneracySnafu {
            quantity: "range vector magnitude",
            action
        }
    );
    Ok(mag)
}

fn transverse(value_sq: f64, quantity: &'static str, action: &'static str) -> Result<f64, ODError> {
    ensure!(
        value_sq > DEGENERATE_SQ,
        GeometricDegeneracySnafu { quantity, action }
    );
    Ok(value_sq.sqrt())
}

/// Azimuth in [0, 2 pi) and elevation of a topocentric SEZ vector.
pub fn topocentric_sez_to_az_el(topo: &Vector3<f64>) -> Result<(f64, f64), ODError> {
    let rmag = magnitude(topo, "computing azimuth and elevation")?;
    let elevation = (topo.z / rmag).asin();
    let azimuth = between_0_tau(topo.y.atan2(-topo.x));
    Ok((azimuth, elevation))
}

/// X-East and Y-North angles of a topocentric SEZ vector.
pub fn topocentric_sez_to_xe_yn(topo: &Vector3<f64>) -> Result<(f64, f64), ODError> {
    let rmag = magnitude(topo, "computing X-East and Y-North")?;
    let y_north = (-topo.x / rmag).asin();
    let x_east = topo.y.atan2(topo.z);
    Ok((x_east, y_north))
}

/// X-South and Y-East angles of a topocentric SEZ vector.
pub fn topocentric_sez_to_xs_ye(topo: &Vector3<f64>) -> Result<(f64, f64), ODError> {
    let rmag = magnitude(topo, "computing X-South and Y-East")?;
    let y_east = (topo.y / rmag).asin();
    let x_south = topo.x.atan2(topo.z);
    Ok((x_south, y_east))
}

/// Right ascension in [0, 2 pi) and declination of an inertial vector.
pub fn mj2000_to_ra_dec(v: &Vector3<f64>) -> Result<(f64, f64), ODError> {
    let rmag = magnitude(v, "computing right ascension and declination")?;
    let ra = between_0_tau(v.y.atan2(v.x));
    let dec = (v.z / rmag).asin();
    Ok((ra, dec))
}

/// Longitude in [0, 2 pi) and declination of a body fixed vector.
pub fn body_fixed_to_long_dec(v: &Vector3<f64>) -> Result<(f64, f64), ODError> {
    let rmag = magnitude(v, "computing longitude and declination")?;
    let longitude = between_0_tau(v.y.atan2(v.x));
    let dec = (v.z / rmag).asin();
    Ok((longitude, dec))
}

/// East, North and Zenith unit vectors of a station, expressed in its body fixed frame.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct EnzBasis {
    pub east: Vector3<f64>,
    pub north: Vector3<f64>,
    pub zenith: Vector3<f64>,
}

/// Computes the East, North, Zenith basis from the geodetic latitude and longitude, in radians.
pub fn enz_unit_vectors(latitude_rad: f64, longitude_rad: f64) -> EnzBasis {
    let (sin_lat, cos_lat) = latitude_rad.sin_cos();
    let (sin_long, cos_long) = longitude_rad.sin_cos();
    EnzBasis {
        east: Vector3::new(-sin_long, cos_long, 0.0),
        north: Vector3::new(-sin_lat * cos_long, -sin_lat * sin_long, cos_lat),
        zenith: Vector3::new(cos_lat * cos_long, cos_lat * sin_long, sin_lat),
    }
}

/// Rotation from the body fixed frame to the topocentric SEZ frame of a station.
pub fn sez_from_body_fixed(latitude_rad: f64, longitude_rad: f64) -> Matrix3<f64> {
    let enz = enz_unit_vectors(latitude_rad, longitude_rad);
    let south = -enz.north;
    Matrix3::from_rows(&[
        south.transpose(),
        enz.east.transpose(),
        enz.zenith.transpose(),
    ])
}

/// Partial of the X-East angle with respect to the elevation.
pub fn partial_xe_partial_el(topo: &Vector3<f64>) -> Result<f64, ODError> {
    let action = "computing the partial of X-East w.r.t. elevation";
    let r2 = topo.norm_squared();
    let rxz = transverse(r2 - topo.z * topo.z, "sqrt(r^2 - z^2)", action)?;
    ensure!(
        r2 - topo.x * topo.x > DEGENERATE_SQ,
        GeometricDegeneracySnafu {
            quantity: "r^2 - x^2",
            action
        }
    );
    Ok(-(topo.y * r2) / ((r2 - topo.x * topo.x) * rxz))
}

/// Partial of the Y-North angle with respect to the elevation.
pub fn partial_yn_partial_el(topo: &Vector3<f64>) -> Result<f64, ODError> {
    let action = "computing the partial of Y-North w.r.t. elevation";
    let r2 = topo.norm_squared();
    let rz = transverse(r2 - topo.z * topo.z, "sqrt(r^2 - z^2)", action)?;
    let rx = transverse(r2 - topo.x * topo.x, "sqrt(r^2 - x^2)", action)?;
    Ok((topo.x * topo.z) / (rx * rz))
}

/// Partial of the X-South angle with respect to the elevation.
pub fn partial_xs_partial_el(topo: &Vector3<f64>) -> Result<f64, ODError> {
    let action = "computing the partial of X-South w.r.t. elevation";
    let r2 = topo.norm_squared();
    let rz = transverse(r2 - topo.z * topo.z, "sqrt(r^2 - z^2)", action)?;
    ensure!(
        r2 - topo.y * topo.y > DEGENERATE_SQ,
        GeometricDegeneracySnafu {
            quantity: "r^2 - y^2",
            action
        }
    );
    Ok((-topo.x * r2) / ((r2 - topo.y * topo.y) * rz))
}

/// Partial of the Y-East angle with respect to the elevation.
pub fn partial_ye_partial_el(topo: &Vector3<f64>) -> Result<f64, ODError> {
    let action = "computing the partial of Y-East w.r.t. elevation";
    let r2 = topo.norm_squared();
    let rz = transverse(r2 - topo.z * topo.z, "sqrt(r^2 - z^2)", action)?;
    let ry = transverse(r2 - topo.y * topo.y, "sqrt(r^2 - y^2)", action)?;
    Ok(-(topo.y * topo.z) / (ry * rz))
}

/// Velocity of the observer used for the aberration correction, in km/s.
///
/// The annual term is the velocity of the observer's central body w.r.t. the solar system
/// barycenter, the diurnal term the velocity of the observer w.r.t. its central body.
pub fn aberration_velocity(use_annual: bool, use_diurnal: bool, leg: &SignalLeg) -> Vector3<f64> {
    let mut velocity = Vector3::zeros();
    if use_annual {
        velocity += leg.origin_ssb_velocity;
    }
    if use_diurnal {
        velocity += leg.receiver_velocity;
    }
    velocity
}

/// Applies the special relativistic aberration to the line of sight `lssb` for an observer
/// moving at `velocity` km/s. A null velocity returns the line of sight unchanged.
pub fn apply_aberration_correction(
    lssb: &Vector3<f64>,
    velocity: &Vector3<f64>,
) -> Result<Vector3<f64>, ODError> {
    let lssb_mag = magnitude(lssb, "applying the aberration correction")?;
    let beta = velocity / SPEED_OF_LIGHT_KM_S;
    let beta_inv = (1.0 - beta.norm_squared()).sqrt();
    let unit = lssb / lssb_mag;
    let f1 = unit.dot(&beta);
    let f2 = 1.0 + f1 / (1.0 + beta_inv);
    Ok((lssb * beta_inv + beta * f2 * lssb_mag) / (1.0 + f1))
}

/// Folds the total troposphere and ionosphere elevation correction, in radians, into the body
/// fixed range vector.
///
/// The unrefracted azimuth and elevation are those of `topo`. The correction is applied along
/// the direction of increasing elevation, with a magnitude of `|range| tan(total)`.
pub fn fold_media_correction(
    bf_range: &Vector3<f64>,
    topo: &Vector3<f64>,
    enz: &EnzBasis,
    total_rad: f64,
) -> Result<Vector3<f64>, ODError> {
    if total_rad == 0.0 {
        return Ok(*bf_range);
    }
    let (azimuth, elevation) = topocentric_sez_to_az_el(topo)?;
    let (sin_az, cos_az) = azimuth.sin_cos();
    let (sin_el, cos_el) = elevation.sin_cos();
    let d_tilde = -sin_el * cos_az * enz.north - sin_el * sin_az * enz.east + cos_el * enz.zenith;
    Ok(bf_range + bf_range.norm() * total_rad.tan() * d_tilde)
}
