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

use crate::od::msr::{EditReason, MeasurementType};
use std::collections::BTreeMap;
use std::fmt;

/// Running residual statistics of a set of observations
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct ResidualStats {
    pub count: usize,
    sum: f64,
    sum_sq: f64,
    sum_weighted_sq: f64,
}

impl ResidualStats {
    pub fn add(&mut self, residual: f64, weight: f64) {
        self.count += 1;
        self.sum += residual;
        self.sum_sq += residual * residual;
        self.sum_weighted_sq += weight * residual * residual;
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }

    /// Sample standard deviation of the residuals
    pub fn std_dev(&self) -> f64 {
        if self.count < 2 {
            return 0.0;
        }
        let n = self.count as f64;
        ((self.sum_sq - self.sum * self.sum / n) / (n - 1.0)).max(0.0).sqrt()
    }

    pub fn rms(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            (self.sum_sq / self.count as f64).sqrt()
        }
    }

    pub fn weighted_rms(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            (self.sum_weighted_sq / self.count as f64).sqrt()
        }
    }
}

/// Statistics of one pass over the tracking data, per station and measurement type.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PassStatistics {
    pub by_station: BTreeMap<(String, MeasurementType), ResidualStats>,
    pub total: ResidualStats,
    /// Number of removed observations per edit reason family (U, R, B, IRMS, OLSE)
    pub removed: BTreeMap<&'static str, usize>,
}

impl PassStatistics {
    pub fn accept(&mut self, station: &str, msr_type: MeasurementType, residual: f64, weight: f64) {
        self.by_station
            .entry((station.to_string(), msr_type))
            .or_default()
            .add(residual, weight);
        self.total.add(residual, weight);
    }

    pub fn remove(&mut self, reason: &EditReason) {
        *self.removed.entry(reason.family()).or_insert(0) += 1;
    }

    pub fn removed_count(&self, family: &str) -> usize {
        self.removed.get(family).copied().unwrap_or(0)
    }

    pub fn total_removed(&self) -> usize {
        self.removed.values().sum()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

impl fmt::Display for PassStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<16} {:<16} {:>8} {:>16} {:>16} {:>16}",
            "Station", "Type", "Count", "Mean O-C", "StdDev", "Weighted RMS"
        )?;
        for ((station, msr_type), stats) in &self.by_station {
            writeln!(
                f,
                "{:<16} {:<16} {:>8} {:>16.6e} {:>16.6e} {:>16.6e}",
                station,
                msr_type,
                stats.count,
                stats.mean(),
                stats.std_dev(),
                stats.weighted_rms()
            )?;
        }
        write!(
            f,
            "Removed: U = {}, R = {}, B = {}, IRMS = {}, OLSE = {}",
            self.removed_count("U"),
            self.removed_count("R"),
            self.removed_count("B"),
            self.removed_count("IRMS"),
            self.removed_count("OLSE")
        )
    }
}

#[cfg(test)]
mod ut_stats {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn per_station_and_removed() {
        let mut stats = PassStatistics::default();
        stats.accept("GDS", MeasurementType::RightAscension, 1.0, 4.0);
        stats.accept("GDS", MeasurementType::RightAscension, 3.0, 4.0);
        stats.accept("MAD", MeasurementType::Declination, -2.0, 1.0);
        stats.remove(&EditReason::Blocked {
            leg: 1,
            detail: "Earth".to_string(),
        });
        stats.remove(&EditReason::Blocked {
            leg: 2,
            detail: "Moon".to_string(),
        });
        stats.remove(&EditReason::OuterLoopSigma);

        let gds = stats.by_station[&("GDS".to_string(), MeasurementType::RightAscension)];
        assert_eq!(gds.count, 2);
        assert_eq!(gds.mean(), 2.0);
        assert_abs_diff_eq!(gds.std_dev(), 2.0_f64.sqrt(), epsilon = 1e-12);
        assert_abs_diff_eq!(gds.weighted_rms(), 20.0_f64.sqrt(), epsilon = 1e-12);
        assert_eq!(stats.total.count, 3);
        assert_eq!(stats.removed_count("B"), 2);
        assert_eq!(stats.removed_count("IRMS"), 0);
        assert_eq!(stats.total_removed(), 3);
        assert!(format!("{stats}").contains("B = 2"));

        stats.clear();
        assert_eq!(stats.total.count, 0);
        assert!(stats.by_station.is_empty());
    }
}
