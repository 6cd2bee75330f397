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

use super::geometry::{enz_unit_vectors, sez_from_body_fixed, EnzBasis};
use crate::linalg::{Matrix3, Vector3};
use crate::od::msr::signal::GeodeticPosition;
use std::collections::HashMap;

/// Local frames of a ground station
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TopocentricFrame {
    /// South, East, Zenith
    Sez,
    /// East, North, Zenith
    Enz,
}

/// Owns the body fixed to topocentric rotations of the ground stations, computed once per
/// (station, frame) from the station's geodetic coordinates.
#[derive(Clone, Debug, Default)]
pub struct FrameArena {
    rotations: HashMap<(String, TopocentricFrame), Matrix3<f64>>,
}

impl FrameArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rotation from the body fixed frame to the requested local frame of the station
    pub fn rotation(
        &mut self,
        station: &str,
        frame: TopocentricFrame,
        position: &GeodeticPosition,
    ) -> Matrix3<f64> {
        *self
            .rotations
            .entry((station.to_string(), frame))
            .or_insert_with(|| {
                let lat = position.latitude_deg.to_radians();
                let long = position.longitude_deg.to_radians();
                match frame {
                    TopocentricFrame::Sez => sez_from_body_fixed(lat, long),
                    TopocentricFrame::Enz => {
                        let enz = enz_unit_vectors(lat, long);
                        Matrix3::from_rows(&[
                            enz.east.transpose(),
                            enz.north.transpose(),
                            enz.zenith.transpose(),
                        ])
                    }
                }
            })
    }

    /// East, North and Zenith unit vectors of the station in its body fixed frame
    pub fn enz(&mut self, station: &str, position: &GeodeticPosition) -> EnzBasis {
        let rot = self.rotation(station, TopocentricFrame::Enz, position);
        let row = |i: usize| Vector3::new(rot[(i, 0)], rot[(i, 1)], rot[(i, 2)]);
        EnzBasis {
            east: row(0),
            north: row(1),
            zenith: row(2),
        }
    }

    pub fn len(&self) -> usize {
        self.rotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rotations.is_empty()
    }
}
