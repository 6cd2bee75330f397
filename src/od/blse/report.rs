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

use super::{BatchConf, BatchSolution, ConvergenceStatus, PassStatistics, ReportMode, RmsHistory};
use crate::io::watermark::watermark;
use crate::linalg::{DMatrix, DVector};
use crate::od::estimate::StateElement;
use crate::od::msr::{ComputedMeasurement, EditReason, ObservationRecord};
use crate::od::{ODError, ReportWriteSnafu};
use crate::time::TimeScale;
use snafu::ResultExt;
use std::fmt::Write;
use std::fs;

/// One observation of the report
pub struct ObservationLine<'a> {
    pub iteration: usize,
    pub record: usize,
    pub obs: &'a ObservationRecord,
    pub computed: Option<&'a ComputedMeasurement>,
    pub edit: &'a EditReason,
    pub weight: f64,
    /// Row of H of each value, in the order of the state map
    pub partials: Option<&'a DMatrix<f64>>,
}

/// Human readable report of the estimator, kept in memory and optionally written to a file.
#[derive(Clone, Debug, Default)]
pub struct EstimatorReport {
    mode: ReportMode,
    path: Option<String>,
    text: String,
}

fn or_na<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "N/A".to_string(), |v| format!("{v}"))
}

impl EstimatorReport {
    pub fn new(conf: &BatchConf) -> Self {
        Self {
            mode: conf.report_mode,
            path: conf.report_file.clone(),
            text: String::new(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn clear(&mut self) {
        self.text.clear();
    }

    pub fn header(&mut self, conf: &BatchConf, state_map: &[StateElement], state: &DVector<f64>) {
        self.text.push_str("*** Batch least squares estimation report ***\n");
        for (key, value) in watermark() {
            let _ = writeln!(self.text, "{key:<14}: {value}");
        }
        let _ = writeln!(self.text, "\n{conf}\n");
        let _ = writeln!(self.text, "A-priori state:");
        for (elem, value) in state_map.iter().zip(state.iter()) {
            let _ = writeln!(self.text, "  {:<24} {value:>22.9}", elem.to_string());
        }
        self.text.push('\n');
    }

    pub fn iteration_start(&mut self, iteration: usize) {
        let _ = writeln!(self.text, "Iteration {iteration}");
        let _ = write!(
            self.text,
            "{:>4} {:>7} {:<28} ",
            "Iter", "RecNum", "UTCGregorian-Epoch"
        );
        if self.mode == ReportMode::Verbose {
            let _ = write!(self.text, "{:>16} ", "TAIModJulian");
        }
        let _ = writeln!(
            self.text,
            "{:<15} {:<5} {:<24} {:<10} {:>18} {:>18} {:>18} {:>14} {:>12} {:>12} {:>12} {:>10}",
            "Obs-Type",
            "Units",
            "Participants",
            "Edit",
            "Obs (O)",
            "Obs-Correction",
            "Calc (C)",
            "O-C",
            "Weight (W)",
            "W*(O-C)^2",
            "sqrt(W)*|O-C|",
            "Elevation"
        );
    }

    pub fn observation(&mut self, line: &ObservationLine) {
        let obs = line.obs;
        let epoch_utc = format!("{}", obs.epoch.to_time_scale(TimeScale::UTC));
        let participants = obs.participants.join(",");
        for (k, observed) in obs.value.iter().enumerate() {
            let _ = write!(
                self.text,
                "{:>4} {:>7} {:<28} ",
                line.iteration, line.record, epoch_utc
            );
            if self.mode == ReportMode::Verbose {
                let _ = write!(self.text, "{:>16.10} ", obs.epoch.to_mjd_tai_days());
            }
            let _ = write!(
                self.text,
                "{:<15} {:<5} {:<24} {:<10} {observed:>18.9} ",
                obs.msr_type.name(),
                obs.msr_type.unit(),
                participants,
                line.edit.to_string()
            );
            match line.computed.filter(|c| c.feasible || line.edit.is_sigma_edit()) {
                Some(c) => {
                    let computed = c.value.get(k).copied().unwrap_or(0.0);
                    let correction = c.correction.get(k).copied().unwrap_or(0.0);
                    let residual = observed - computed;
                    let _ = write!(
                        self.text,
                        "{:>18.9} {computed:>18.9} {residual:>14.6e} {:>12.6e} {:>12.6e} {:>12.6e} {:>10.4}",
                        observed - correction,
                        line.weight,
                        line.weight * residual * residual,
                        line.weight.sqrt() * residual.abs(),
                        c.feasibility_value
                    );
                }
                None => {
                    let _ = write!(
                        self.text,
                        "{:>18} {:>18} {:>14} {:>12} {:>12} {:>12} {:>10}",
                        "N/A", "N/A", "N/A", "N/A", "N/A", "N/A", "N/A"
                    );
                }
            }
            if self.mode == ReportMode::Verbose {
                let _ = write!(
                    self.text,
                    " {:>6} {:>16} {:>14} {:>10}",
                    or_na(obs.uplink_band),
                    or_na(obs.uplink_freq_hz),
                    or_na(obs.range_modulo),
                    or_na(obs.doppler_count_interval_s)
                );
                if let Some(h) = line.partials.filter(|h| k < h.nrows()) {
                    for value in h.row(k).iter() {
                        let _ = write!(self.text, " {value:>14.6e}");
                    }
                }
            }
            self.text.push('\n');
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn iteration_summary(
        &mut self,
        iteration: usize,
        stats: &PassStatistics,
        rms: &RmsHistory,
        status: ConvergenceStatus,
        reason: &str,
        state_map: &[StateElement],
        previous: &DVector<f64>,
        correction: &DVector<f64>,
    ) {
        let _ = writeln!(self.text, "\nIteration {iteration} summary");
        let _ = writeln!(
            self.text,
            "Total observations used: {}, removed: {}",
            stats.total.count,
            stats.total_removed()
        );
        let _ = writeln!(self.text, "{stats}");
        let _ = writeln!(self.text, "Weighted RMS  : {:.12e}", rms.new);
        let _ = writeln!(self.text, "Predicted RMS : {:.12e}", rms.predicted);
        let _ = writeln!(self.text, "Best RMS      : {:.12e}", rms.best);
        let _ = writeln!(self.text, "Status        : {status}");
        if !reason.is_empty() {
            let _ = write!(self.text, "{reason}");
        }
        let _ = writeln!(
            self.text,
            "  {:<24} {:>22} {:>18} {:>22}",
            "State element", "Previous", "Correction", "Current"
        );
        for (i, elem) in state_map.iter().enumerate() {
            let _ = writeln!(
                self.text,
                "  {:<24} {:>22.9} {:>18.6e} {:>22.9}",
                elem.to_string(),
                previous[i],
                correction[i],
                previous[i] + correction[i]
            );
        }
        self.text.push('\n');
    }

    pub fn final_summary(&mut self, solution: &BatchSolution) {
        let _ = writeln!(self.text, "*** Final solution ***\n{solution}");
    }

    /// Writes the report to its file, if one is configured
    pub fn flush(&self) -> Result<(), ODError> {
        if let Some(path) = &self.path {
            fs::write(path, &self.text).context(ReportWriteSnafu { path: path.clone() })?;
            info!("estimator report written to {path}");
        }
        Ok(())
    }
}
