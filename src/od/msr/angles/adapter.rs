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

use super::geometry::{aberration_velocity, apply_aberration_correction, fold_media_correction};
use super::{AngleAdapterConf, AngleKind, AngleSolution, FrameArena, TopocentricFrame};
use crate::linalg::{DMatrix, Vector3};
use crate::od::estimate::{
    error_models_of, EstimationStateManager, ParticipantKind, SolveFor, StateElement,
};
use crate::od::msr::signal::{LegSummary, MediaKind, SignalLeg, SignalPath};
use crate::od::msr::{
    ComputedMeasurement, EditReason, MeasurementModel, MeasurementType, MediaReport,
    ObservationRecord,
};
use crate::od::{
    DerivativeBeforeValueSnafu, NoSignalPathSnafu, NotAStationSnafu, ODError, SingularStmSnafu,
};
use crate::utils::wrap_periodic;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use rand_pcg::Pcg64Mcg;
use snafu::OptionExt;

/// Geometry of the last computed measurement, required for the derivatives
#[derive(Clone, Debug)]
struct LastSolution {
    leg: SignalLeg,
    solution: AngleSolution,
}

/// Angle measurement model: computes an angle of the line of sight from a ground station to a
/// spacecraft and its partials with respect to the estimation state.
///
/// The signal geometry (light time, media corrections, STMs at the leg epochs) is provided by the
/// signal path collaborator `P`.
pub struct AngleAdapter<P: SignalPath> {
    name: String,
    kind: AngleKind,
    participants: Vec<String>,
    pub conf: AngleAdapterConf,
    path: P,
    frames: FrameArena,
    rng: Pcg64Mcg,
    last: Option<LastSolution>,
}

impl<P: SignalPath> AngleAdapter<P> {
    /// Builds a new adapter measuring `kind` between the provided participants, station first.
    pub fn new(
        name: &str,
        kind: AngleKind,
        participants: Vec<String>,
        path: P,
        conf: AngleAdapterConf,
    ) -> Self {
        let rng = match conf.seed {
            Some(seed) => Pcg64Mcg::new(seed.into()),
            None => Pcg64Mcg::from_entropy(),
        };
        Self {
            name: name.to_string(),
            kind,
            participants,
            conf,
            path,
            frames: FrameArena::new(),
            rng,
            last: None,
        }
    }

    pub fn kind(&self) -> AngleKind {
        self.kind
    }

    /// Computes the line of sight of the provided leg and the angle it defines, in degrees.
    ///
    /// The line of sight goes from the receiving station to the transmitter. Two calls with the
    /// same leg return bit-identical results.
    pub fn compute_value(&mut self, leg: &SignalLeg) -> Result<(AngleSolution, f64), ODError> {
        let mut lssb = -leg.range_vec_inertial;
        if self.conf.annual_aberration || self.conf.diurnal_aberration {
            let velocity = aberration_velocity(
                self.conf.annual_aberration,
                self.conf.diurnal_aberration,
                leg,
            );
            lssb = apply_aberration_correction(&lssb, &velocity)?;
        }

        let position = leg.station.as_ref().context(NotAStationSnafu {
            name: leg.receiver.clone(),
        })?;
        let sez_from_bf = self
            .frames
            .rotation(&leg.receiver, TopocentricFrame::Sez, position);

        let mut bf_range = leg.receive_j2k_to_bf * lssb;
        if self.conf.media_correction {
            let total = leg.media_correction_rad(MediaKind::Troposphere)
                + leg.media_correction_rad(MediaKind::Ionosphere);
            if total != 0.0 {
                let enz = self.frames.enz(&leg.receiver, position);
                let topo = sez_from_bf * bf_range;
                bf_range = fold_media_correction(&bf_range, &topo, &enz, total)?;
            }
        }

        let solution = AngleSolution {
            topo: sez_from_bf * bf_range,
            mj2000: leg.receive_j2k_to_bf.transpose() * bf_range,
            sez_from_j2k: sez_from_bf * leg.receive_j2k_to_bf,
        };
        let value = self.kind.value(&solution)?;
        Ok((solution, value))
    }

    /// Returns the bias and noise sigma of the error model of this station and measurement type
    fn error_model(&self, esm: &dyn EstimationStateManager, station: &str) -> (f64, f64) {
        let msr_type = self.kind.measurement_type();
        error_models_of(esm, station)
            .find_map(|p| match &p.kind {
                ParticipantKind::ErrorModel {
                    msr_type: model_type,
                    noise_sigma,
                    ..
                } if *model_type == msr_type => {
                    let bias = p
                        .values(&SolveFor::Bias)
                        .and_then(|b| b.first().copied())
                        .unwrap_or(0.0);
                    Some((bias, *noise_sigma))
                }
                _ => None,
            })
            .unwrap_or((0.0, 0.0))
    }

    fn media_report(&self, leg: &SignalLeg, topo: &Vector3<f64>) -> Result<MediaReport, ODError> {
        let mut report = MediaReport::default();
        if !self.conf.media_correction {
            return Ok(report);
        }
        report.iono_raw_deg = leg.media_correction_rad(MediaKind::Ionosphere).to_degrees();
        report.tropo_raw_deg = leg.media_correction_rad(MediaKind::Troposphere).to_degrees();
        report.tropo_warning = report.tropo_raw_deg < 0.0 || report.tropo_raw_deg > 0.5;
        if report.iono_raw_deg != 0.0 || report.tropo_raw_deg != 0.0 {
            let partial = self.kind.partial_wrt_elevation(topo)?;
            report.iono_deg = report.iono_raw_deg * partial;
            report.tropo_deg = report.tropo_raw_deg * partial;
        }
        Ok(report)
    }

    /// Φ = STM·STM(tm)⁻¹ on the side of the leg owned by `object`, with the sign of the line of
    /// sight partial on that side. `None` if the object is on neither side.
    fn phi_for(
        &self,
        leg: &SignalLeg,
        object: &str,
    ) -> Result<Option<(f64, DMatrix<f64>)>, ODError> {
        let (sign, stm, stm_tm) = if leg.transmitter == object {
            (1.0, &leg.transmit_stm, &leg.transmit_stm_tm)
        } else if leg.receiver == object {
            (-1.0, &leg.receive_stm, &leg.receive_stm_tm)
        } else {
            return Ok(None);
        };
        let inv = stm_tm
            .clone()
            .try_inverse()
            .context(SingularStmSnafu { object })?;
        Ok(Some((sign, stm * inv)))
    }
}

impl<P: SignalPath> MeasurementModel for AngleAdapter<P> {
    fn name(&self) -> &str {
        &self.name
    }

    fn msr_type(&self) -> MeasurementType {
        self.kind.measurement_type()
    }

    fn participants(&self) -> &[String] {
        &self.participants
    }

    fn calculate(
        &mut self,
        obs: &ObservationRecord,
        esm: &dyn EstimationStateManager,
        _with_events: bool,
    ) -> Result<ComputedMeasurement, ODError> {
        let legs = self
            .path
            .legs(obs, esm, self.conf.light_time, self.conf.media_correction)?;
        let leg = legs.last().cloned().context(NoSignalPathSnafu {
            model: self.name.clone(),
        })?;

        let mut msr = ComputedMeasurement::new(
            self.msr_type(),
            0,
            self.participants.clone(),
            leg.measurement_epoch(),
            1,
        );
        let mut verdict: Option<EditReason> = None;
        for (i, path_leg) in legs.iter().enumerate() {
            let reason = &path_leg.feasibility.reason;
            let at_station = path_leg.receiver_is_station || path_leg.transmitter_is_station;
            if reason.starts_with('N') {
                if at_station && verdict.is_none() {
                    msr.feasible = true;
                    msr.feasibility_value = path_leg.feasibility.value;
                    verdict = Some(EditReason::Normal);
                }
            } else if let Some(detail) = reason.strip_prefix('B') {
                if matches!(verdict, None | Some(EditReason::Normal)) {
                    msr.feasible = false;
                    msr.feasibility_value = path_leg.feasibility.value;
                    verdict = Some(EditReason::Blocked {
                        leg: i + 1,
                        detail: detail.to_string(),
                    });
                }
            }
        }
        msr.unfeasible_reason = verdict.unwrap_or_default();

        let (solution, raw) = self.compute_value(&leg)?;
        let (bias, sigma) = self.error_model(esm, &leg.receiver);

        let mut correction = 0.0;
        if self.conf.add_noise && sigma > 0.0 {
            if let Ok(noise) = Normal::new(0.0, sigma) {
                correction += noise.sample(&mut self.rng);
            }
        }
        if self.conf.add_bias {
            correction += bias;
        }
        let mut value = raw + correction;
        if let Some((period, min_value)) = self.kind.period_bounds() {
            value = wrap_periodic(value, period, min_value);
            msr.is_periodic = true;
            msr.period = period;
            msr.min_value = min_value;
        }

        msr.value[0] = value;
        msr.correction[0] = correction;
        msr.covariance[(0, 0)] = sigma * sigma;
        msr.legs = legs.iter().map(LegSummary::from).collect();
        msr.uplink = self.path.uplink();
        msr.media = self.media_report(&leg, &solution.topo)?;

        trace!(
            "{} {} at {}: {value:.9} deg (feasible: {})",
            self.name,
            self.kind,
            msr.epoch,
            msr.feasible
        );
        self.last = Some(LastSolution { leg, solution });
        Ok(msr)
    }

    fn derivatives(
        &mut self,
        element: &StateElement,
        esm: &dyn EstimationStateManager,
    ) -> Result<DMatrix<f64>, ODError> {
        let last = self.last.as_ref().context(DerivativeBeforeValueSnafu {
            model: self.name.clone(),
        })?;
        let leg = &last.leg;
        let mut partials = DMatrix::zeros(1, element.length);

        match &element.element {
            SolveFor::Bias => {
                let owned = esm.participant(&element.object).map(|p| &p.kind);
                if let Some(ParticipantKind::ErrorModel {
                    station, msr_type, ..
                }) = owned
                {
                    if *msr_type == self.msr_type()
                        && leg.receiver_is_station
                        && *station == leg.receiver
                    {
                        partials.fill(1.0);
                    }
                }
            }
            SolveFor::CartesianState | SolveFor::Position | SolveFor::Velocity => {
                if let Some((sign, phi)) = self.phi_for(leg, &element.object)? {
                    let grad = self.kind.gradient(&last.solution)? * sign;
                    let col0 = if element.element == SolveFor::Velocity { 3 } else { 0 };
                    let block = phi.view((0, col0), (3, element.length));
                    partials.copy_from(&(grad.transpose() * block));
                }
            }
            SolveFor::CrEpsilon | SolveFor::CdEpsilon => {
                if let (Some((sign, phi)), Some(owner)) = (
                    self.phi_for(leg, &element.object)?,
                    esm.participant(&element.object),
                ) {
                    match owner.stm_offset(&element.element) {
                        Some(col) if col < phi.ncols() => {
                            let grad = self.kind.gradient(&last.solution)? * sign;
                            partials[(0, 0)] = grad.dot(&phi.fixed_view::<3, 1>(0, col));
                        }
                        _ => debug!("{} has no {} in its STM", owner.name, element.element),
                    }
                }
            }
            SolveFor::ThrustScaleFactor { .. } => {
                if let Some(ParticipantKind::ThrustForce { spacecraft }) =
                    esm.participant(&element.object).map(|p| &p.kind)
                {
                    let for_obj = [&leg.transmitter, &leg.receiver]
                        .into_iter()
                        .find(|name| spacecraft.contains(*name));
                    if let Some(sc_name) = for_obj {
                        let sc = esm.participant(sc_name);
                        if let (Some((sign, phi)), Some(col)) = (
                            self.phi_for(leg, sc_name)?,
                            sc.and_then(|sc| sc.stm_offset(&element.element)),
                        ) {
                            if col < phi.ncols() {
                                let grad = self.kind.gradient(&last.solution)? * sign;
                                partials[(0, 0)] = grad.dot(&phi.fixed_view::<3, 1>(0, col));
                            }
                        }
                    }
                }
            }
        }
        Ok(partials)
    }
}
