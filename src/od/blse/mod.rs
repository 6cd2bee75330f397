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

use crate::linalg::{DMatrix, DVector};
use crate::od::estimate::{keplerian, EstimationStateManager, ParticipantBuffer};
use crate::od::events::EventManager;
use crate::od::msr::{ComputedMeasurement, EditReason, MeasurementManager, ObservationRecord};
use crate::od::{
    InvalidStateSnafu, MissingAprioriSnafu, NoSolutionSnafu, NoSpacecraftSnafu, ODError,
    ODInversionSnafu, TooFewObservationsSnafu,
};
use crate::propagators::clamp_step;
use crate::time::{Duration, Epoch};
use crate::utils::correlation;
use snafu::prelude::*;
use std::collections::BTreeMap;
use std::fmt;

mod conf;
pub use conf::{BatchConf, EstimationEpoch, ReportMode};

mod convergence;
pub use convergence::{
    test_for_convergence, ConvergenceCriteria, ConvergenceStatus, ConvergenceVerdict, RmsHistory,
};

mod editing;
pub use editing::{range_ambiguity, weight_from_variance, SigmaEditor};

mod inversion;
pub use inversion::{
    CholeskyInversion, DirectInversion, InversionAlgorithm, InversionError, InversionStrategy,
    SchurInversion, SymmetricPackedMatrix,
};

mod report;
pub use report::{EstimatorReport, ObservationLine};

mod solution;
pub use solution::BatchSolution;

mod stats;
pub use stats::{PassStatistics, ResidualStats};

/// States of the batch estimator
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EstimatorState {
    Initializing,
    Propagating,
    Calculating,
    Locating,
    Accumulating,
    Estimating,
    CheckingRun,
    Finished,
}

impl fmt::Display for EstimatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Side effect the driver must apply after a state's work
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Action {
    None,
    /// Propagate the participants by this signed step, then report the new epoch
    Propagate { step: Duration },
    /// Locate the pending events of the measurement manager
    LocateEvents,
    /// Reset the propagator to the estimation epoch from the participants
    RestartPass { epoch: Epoch },
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Transition {
    pub next: EstimatorState,
    pub action: Action,
}

impl Transition {
    fn to(next: EstimatorState) -> Self {
        Self {
            next,
            action: Action::None,
        }
    }
}

/// Batch least squares estimator.
///
/// Accumulates the normal equations over a full pass of tracking data, solves them at the
/// estimation epoch, and iterates until convergence. Each call to [BatchEstimator::advance]
/// performs the work of exactly one state.
pub struct BatchEstimator<M: MeasurementManager, S: EstimationStateManager> {
    pub conf: BatchConf,
    msr: M,
    esm: S,
    state: EstimatorState,
    /// Epoch of the propagated participants
    current_epoch: Epoch,
    estimation_epoch: Option<Epoch>,
    /// Set while propagating from the participants' epoch to the estimation epoch
    advancing_to_estimation_epoch: bool,
    state_size: usize,
    /// Information matrix Λ
    information: DMatrix<f64>,
    /// Residual vector N
    normal: DVector<f64>,
    apriori_inverse: Option<DMatrix<f64>>,
    /// Difference between the a-priori state and the current estimate
    x0bar: DVector<f64>,
    dx: DVector<f64>,
    initial_state: DVector<f64>,
    covariance: Option<DMatrix<f64>>,
    /// Rows of H = H̃Φ of every accepted value of this pass
    h_rows: Vec<DVector<f64>>,
    residuals: Vec<f64>,
    weights: Vec<f64>,
    rms: RmsHistory,
    rms_history: Vec<f64>,
    status: ConvergenceStatus,
    reason: String,
    iterations_taken: usize,
    num_divergences: usize,
    buffer: ParticipantBuffer,
    stats: PassStatistics,
    residual_plots: BTreeMap<String, Vec<(Epoch, f64)>>,
    report: EstimatorReport,
    solution: Option<BatchSolution>,
}

impl<M: MeasurementManager, S: EstimationStateManager> BatchEstimator<M, S> {
    pub fn new(conf: BatchConf, msr: M, esm: S) -> Self {
        let report = EstimatorReport::new(&conf);
        let epoch = esm.state().epoch;
        Self {
            conf,
            msr,
            esm,
            state: EstimatorState::Initializing,
            current_epoch: epoch,
            estimation_epoch: None,
            advancing_to_estimation_epoch: false,
            state_size: 0,
            information: DMatrix::zeros(0, 0),
            normal: DVector::zeros(0),
            apriori_inverse: None,
            x0bar: DVector::zeros(0),
            dx: DVector::zeros(0),
            initial_state: DVector::zeros(0),
            covariance: None,
            h_rows: Vec::new(),
            residuals: Vec::new(),
            weights: Vec::new(),
            rms: RmsHistory::default(),
            rms_history: Vec::new(),
            status: ConvergenceStatus::Unknown,
            reason: String::new(),
            iterations_taken: 0,
            num_divergences: 0,
            buffer: ParticipantBuffer::default(),
            stats: PassStatistics::default(),
            residual_plots: BTreeMap::new(),
            report,
            solution: None,
        }
    }

    /// Performs the work of the current state and moves to the next one.
    ///
    /// Any error finishes the estimator.
    pub fn advance(&mut self) -> Result<Transition, ODError> {
        let result = match self.state {
            EstimatorState::Initializing => self.initializing(),
            EstimatorState::Propagating => self.propagating(),
            EstimatorState::Calculating => self.calculating(),
            EstimatorState::Locating => self.locating(),
            EstimatorState::Accumulating => self.accumulating(),
            EstimatorState::Estimating => self.estimating(),
            EstimatorState::CheckingRun => self.checking_run(),
            EstimatorState::Finished => Ok(Transition::to(EstimatorState::Finished)),
        };
        match result {
            Ok(transition) => {
                trace!("{} -> {}", self.state, transition.next);
                self.state = transition.next;
                Ok(transition)
            }
            Err(e) => {
                error!("{} failed while {}: {e}", self.conf.name, self.state);
                self.state = EstimatorState::Finished;
                Err(e)
            }
        }
    }

    /// Returns to the initial state, keeping the configuration
    pub fn reset(&mut self) {
        self.state = EstimatorState::Initializing;
        self.estimation_epoch = None;
        self.advancing_to_estimation_epoch = false;
        self.apriori_inverse = None;
        self.covariance = None;
        self.solution = None;
        self.rms = RmsHistory::default();
        self.rms_history.clear();
        self.status = ConvergenceStatus::Unknown;
        self.reason.clear();
        self.iterations_taken = 0;
        self.num_divergences = 0;
        self.h_rows.clear();
        self.residuals.clear();
        self.weights.clear();
        self.stats.clear();
        self.residual_plots.clear();
        self.report.clear();
    }

    /// Informs the estimator of the epoch reached by the propagator
    pub fn propagated_to(&mut self, epoch: Epoch) {
        self.current_epoch = epoch;
    }

    /// Locates the pending events of the measurement manager
    pub fn locate_events<E: EventManager>(&mut self, em: &mut E) -> Result<(), ODError> {
        for event in self.msr.events_mut().iter_mut().filter(|e| !e.is_located()) {
            em.set_object(event);
            em.set_fixed_state(event, &self.esm);
            let located = em.find_root(event, &self.esm);
            em.clear_object(event);
            if !located? {
                debug!("{event} not located yet");
            }
        }
        Ok(())
    }

    fn initializing(&mut self) -> Result<Transition, ODError> {
        if self.advancing_to_estimation_epoch {
            self.advancing_to_estimation_epoch = false;
            return self.complete_initialization();
        }

        self.state_size = self.esm.build_state()?;
        let num_obs = self.msr.load_observations()?;
        let estimation_epoch = match self.conf.estimation_epoch {
            EstimationEpoch::FromParticipants => self.esm.epoch().context(NoSpacecraftSnafu)?,
            EstimationEpoch::Epoch(epoch) => epoch,
        };
        self.estimation_epoch = Some(estimation_epoch);
        self.current_epoch = self.esm.epoch().unwrap_or(estimation_epoch);
        info!(
            "{}: estimating {} parameters at {estimation_epoch} from {num_obs} observations",
            self.conf.name, self.state_size
        );

        if (self.current_epoch - estimation_epoch).abs() > self.conf.epoch_precision {
            debug!(
                "advancing participants from {} to the estimation epoch",
                self.current_epoch
            );
            self.advancing_to_estimation_epoch = true;
            return Ok(Transition::to(EstimatorState::Propagating));
        }
        self.complete_initialization()
    }

    fn complete_initialization(&mut self) -> Result<Transition, ODError> {
        let estimation_epoch = self.estimation_epoch()?;
        let n = self.state_size;

        self.esm.map_objects_to_vector();
        self.esm.state_mut().epoch = estimation_epoch;
        *self.esm.stm_mut() = DMatrix::identity(n, n);
        self.esm.map_stm_to_objects();

        self.apriori_inverse = if self.conf.use_apriori {
            let p0 = self
                .esm
                .apriori_covariance()?
                .context(MissingAprioriSnafu)?;
            Some(
                DirectInversion
                    .invert(&p0)
                    .context(ODInversionSnafu {
                        which: "a-priori covariance",
                    })?,
            )
        } else {
            None
        };

        self.x0bar = DVector::zeros(n);
        self.dx = DVector::zeros(n);
        self.initial_state = self.esm.state().vector.clone();
        self.reset_accumulators();
        self.buffer = self.esm.buffer_objects();
        self.status = ConvergenceStatus::Unknown;
        self.reason.clear();
        self.num_divergences = 0;
        self.iterations_taken = 0;
        self.rms = RmsHistory::default();
        self.rms_history.clear();
        self.solution = None;

        self.report.clear();
        self.report
            .header(&self.conf, self.esm.state_map(), &self.esm.state().vector);
        self.report.iteration_start(0);

        Ok(Transition::to(self.first_pass_state()))
    }

    fn propagating(&mut self) -> Result<Transition, ODError> {
        let target = if self.advancing_to_estimation_epoch {
            self.estimation_epoch()?
        } else {
            match self.msr.epoch() {
                Some(epoch) => epoch,
                None => return Ok(Transition::to(EstimatorState::Estimating)),
            }
        };

        let delta = target - self.current_epoch;
        if delta.abs() <= self.conf.epoch_precision {
            return Ok(Transition::to(if self.advancing_to_estimation_epoch {
                EstimatorState::Initializing
            } else {
                EstimatorState::Calculating
            }));
        }

        Ok(Transition {
            next: EstimatorState::Propagating,
            action: Action::Propagate {
                step: clamp_step(delta),
            },
        })
    }

    fn calculating(&mut self) -> Result<Transition, ODError> {
        self.esm.map_objects_to_stm();
        let count = self.msr.calculate_measurements(&self.esm, true)?;
        if count > 0 && self.msr.event_count() > 0 {
            Ok(Transition {
                next: EstimatorState::Locating,
                action: Action::LocateEvents,
            })
        } else {
            Ok(Transition::to(EstimatorState::Accumulating))
        }
    }

    fn locating(&mut self) -> Result<Transition, ODError> {
        let count = self.msr.event_count();
        if self.msr.events_mut().iter().all(|e| e.is_located()) {
            for index in 0..count {
                self.msr.process_event(index, &self.esm)?;
            }
            Ok(Transition::to(EstimatorState::Accumulating))
        } else {
            Ok(Transition {
                next: EstimatorState::Locating,
                action: Action::LocateEvents,
            })
        }
    }

    fn accumulating(&mut self) -> Result<Transition, ODError> {
        let iteration = self.iterations_taken;
        let record = self.msr.record_number();
        let Some(mut obs) = self.msr.observation().cloned() else {
            return Ok(Transition::to(EstimatorState::Estimating));
        };

        // Geometric and configuration edits of earlier passes are final
        if !obs.in_use && obs.removed_reason.is_permanent() {
            self.stats.remove(&obs.removed_reason);
            self.report.observation(&ObservationLine {
                iteration,
                record,
                obs: &obs,
                computed: None,
                edit: &obs.removed_reason,
                weight: 1.0,
                partials: None,
            });
            return Ok(self.next_observation());
        }

        if obs.value.is_empty() {
            warn!("[{iteration}] record {record} at {} has no observed value", obs.epoch);
            self.remove_observation(iteration, record, &obs, None, EditReason::Unused, 1.0);
            return Ok(self.next_observation());
        }

        let Some(&model) = self.msr.valid_measurement_list().first() else {
            self.remove_observation(iteration, record, &obs, None, EditReason::Unused, 1.0);
            return Ok(self.next_observation());
        };

        let computed = match self.msr.measurement(model) {
            Some(computed) => computed.clone(),
            None => self.msr.calculate(model, &self.esm, true)?.clone(),
        };

        if !computed.feasible {
            let reason = match &computed.unfeasible_reason {
                EditReason::Normal => EditReason::Unused,
                other => other.clone(),
            };
            self.remove_observation(iteration, record, &obs, Some(&computed), reason, 1.0);
            return Ok(self.next_observation());
        }

        ensure!(
            computed.value.len() >= obs.value.len(),
            InvalidStateSnafu {
                state: self.state.to_string(),
                details: format!(
                    "{} computed {} values for an observation of {}",
                    self.msr.model_name(model).unwrap_or("measurement model"),
                    computed.value.len(),
                    obs.value.len()
                )
            }
        );

        if iteration == 0 && obs.msr_type.is_modulo_range() {
            if let Some(modulo) = obs.range_modulo.filter(|m| *m > 0.0) {
                for (observed, calc) in obs.value.iter_mut().zip(&computed.value) {
                    *observed += range_ambiguity(*observed, *calc, modulo) * modulo;
                }
                if let Some(stored) = self.msr.observation_mut() {
                    stored.value.clone_from(&obs.value);
                }
            }
        }

        let weights: Vec<f64> = (0..obs.value.len())
            .map(|k| weight_from_variance(obs.variance(k).or_else(|| computed.variance(k))))
            .collect();
        let residuals: Vec<f64> = obs
            .value
            .iter()
            .zip(&computed.value)
            .map(|(o, c)| o - c)
            .collect();

        let editor =
            SigmaEditor::for_iteration(&self.conf, iteration, self.rms.predicted, self.rms.new);
        if let Some(reason) = residuals
            .iter()
            .zip(&weights)
            .find_map(|(r, w)| editor.check(*r, *w))
        {
            let weight = weights.first().copied().unwrap_or(1.0);
            self.remove_observation(iteration, record, &obs, Some(&computed), reason, weight);
            // Sigma edits are reconsidered on the next pass
            if let Some(stored) = self.msr.observation_mut() {
                stored.readmit();
            }
            return Ok(self.next_observation());
        }

        let rows = residuals.len();
        let mut h_tilde = DMatrix::zeros(rows, self.state_size);
        for elem in self.esm.state_map().iter().filter(|e| e.subelement == 1) {
            let deriv = self.msr.derivatives(model, elem, &self.esm)?;
            for j in 0..rows.min(deriv.nrows()) {
                for k in 0..elem.length.min(deriv.ncols()) {
                    h_tilde[(j, elem.index + k)] = deriv[(j, k)];
                }
            }
        }
        let h = h_tilde * self.esm.stm();

        let model_name = self.msr.model_name(model).unwrap_or("unnamed").to_string();
        for k in 0..rows {
            let h_row = h.row(k).transpose();
            self.information += &h_row * h_row.transpose() * weights[k];
            self.normal += &h_row * (weights[k] * residuals[k]);
            self.stats
                .accept(obs.station(), obs.msr_type, residuals[k], weights[k]);
            if self.conf.show_all_residuals {
                self.residual_plots
                    .entry(model_name.clone())
                    .or_default()
                    .push((obs.epoch, residuals[k]));
            }
            self.h_rows.push(h_row);
            self.residuals.push(residuals[k]);
            self.weights.push(weights[k]);
        }
        trace!(
            "[{iteration}] record {record} at {} accumulated, O-C = {residuals:?}",
            obs.epoch
        );

        self.report.observation(&ObservationLine {
            iteration,
            record,
            obs: &obs,
            computed: Some(&computed),
            edit: &EditReason::Normal,
            weight: weights.first().copied().unwrap_or(1.0),
            partials: Some(&h),
        });

        Ok(self.next_observation())
    }

    fn remove_observation(
        &mut self,
        iteration: usize,
        record: usize,
        obs: &ObservationRecord,
        computed: Option<&ComputedMeasurement>,
        reason: EditReason,
        weight: f64,
    ) {
        debug!(
            "[{iteration}] record {record} at {} removed: {reason}",
            obs.epoch
        );
        self.stats.remove(&reason);
        if let Some(stored) = self.msr.observation_mut() {
            stored.mark_unused(reason.clone());
        }
        self.report.observation(&ObservationLine {
            iteration,
            record,
            obs,
            computed,
            edit: &reason,
            weight,
            partials: None,
        });
    }

    fn next_observation(&mut self) -> Transition {
        if !self.msr.advance_observation() {
            return Transition::to(EstimatorState::Estimating);
        }
        match self.msr.epoch() {
            Some(next) if self.current_epoch <= next + self.conf.epoch_precision => {
                Transition::to(EstimatorState::Propagating)
            }
            Some(next) => {
                warn!(
                    "next observation at {next} is before the current epoch {}, estimating now",
                    self.current_epoch
                );
                Transition::to(EstimatorState::Estimating)
            }
            None => Transition::to(EstimatorState::Estimating),
        }
    }

    fn estimating(&mut self) -> Result<Transition, ODError> {
        let iteration = self.iterations_taken;
        let used = self.residuals.len();
        ensure!(
            used > self.state_size,
            TooFewObservationsSnafu {
                estimator: self.conf.name.clone(),
                solve_for: self.state_size,
                remaining: used,
            }
        );

        let sigma_edited = self.stats.removed_count("IRMS") + self.stats.removed_count("OLSE");
        if sigma_edited > 0 {
            warn!("[{iteration}] {sigma_edited} observations sigma edited in this pass");
        }

        if iteration > 0 {
            self.rms.old = self.rms.new;
        }
        let weighted_sq: f64 = self
            .residuals
            .iter()
            .zip(&self.weights)
            .map(|(r, w)| w * r * r)
            .sum();
        self.rms.new = (weighted_sq / used as f64).sqrt();
        if iteration == 0 {
            self.rms.best = self.rms.new;
        } else {
            if self.conf.reset_best_rms_on_divergence
                && self.status == ConvergenceStatus::Diverging
            {
                self.rms.best = self.rms.old;
            }
            self.rms.best = self.rms.best.min(self.rms.new);
        }

        debug!(
            "[{iteration}] inverting the information matrix with {}",
            self.conf.inversion_algorithm
        );
        let covariance = self
            .conf
            .inversion_algorithm
            .invert(&self.information)
            .context(ODInversionSnafu {
                which: "information matrix",
            })?;
        self.dx = &covariance * &self.normal;

        self.esm.state_mut().vector += &self.dx;
        self.esm.restore_objects(&self.buffer);
        self.esm.map_vector_to_objects();
        debug!("[{iteration}] state correction: {}", self.dx.transpose());

        let mut predicted: f64 = self
            .h_rows
            .iter()
            .zip(self.residuals.iter().zip(&self.weights))
            .map(|(h, (r, w))| {
                let r_pred = r - h.dot(&self.dx);
                r_pred * r_pred * w
            })
            .sum();
        if let Some(p0_inv) = &self.apriori_inverse {
            let delta = &self.esm.state().vector - &self.initial_state;
            predicted += (delta.transpose() * p0_inv * &delta)[(0, 0)];
        }
        self.rms.predicted = (predicted / used as f64).sqrt();
        self.rms_history.push(self.rms.new);

        self.covariance = Some(covariance);

        Ok(Transition::to(EstimatorState::CheckingRun))
    }

    fn checking_run(&mut self) -> Result<Transition, ODError> {
        let criteria = ConvergenceCriteria {
            absolute_tol: self.conf.absolute_tol,
            relative_tol: self.conf.relative_tol,
            max_iterations: self.conf.max_iterations,
            max_consecutive_divergences: self.conf.max_consecutive_divergences,
        };
        let verdict = test_for_convergence(
            &criteria,
            &self.rms,
            self.iterations_taken,
            self.num_divergences,
        );
        self.status = verdict.status;
        self.reason = verdict.reason;
        self.num_divergences = verdict.num_divergences;

        let previous = &self.esm.state().vector - &self.dx;
        self.report.iteration_summary(
            self.iterations_taken,
            &self.stats,
            &self.rms,
            self.status,
            &self.reason,
            self.esm.state_map(),
            &previous,
            &self.dx,
        );

        info!(
            "[{}/{}] weighted RMS: {:.6e}; predicted RMS: {:.6e}; best RMS: {:.6e}; {}",
            self.iterations_taken,
            self.conf.max_iterations,
            self.rms.new,
            self.rms.predicted,
            self.rms.best,
            self.status
        );
        if self.status == ConvergenceStatus::Diverging {
            warn!(
                "{} is diverging ({} consecutive)",
                self.conf.name, self.num_divergences
            );
        }
        self.iterations_taken += 1;

        if self.status.is_final() {
            self.finish()?;
            return Ok(Transition::to(EstimatorState::Finished));
        }
        self.restart_pass()
    }

    fn restart_pass(&mut self) -> Result<Transition, ODError> {
        let estimation_epoch = self.estimation_epoch()?;
        let n = self.state_size;

        self.esm.restore_objects(&self.buffer);
        self.esm.map_vector_to_objects();
        *self.esm.stm_mut() = DMatrix::identity(n, n);
        self.esm.map_stm_to_objects();
        self.current_epoch = estimation_epoch;
        self.msr.reset();

        self.x0bar -= &self.dx;
        self.reset_accumulators();
        self.report.iteration_start(self.iterations_taken);
        debug!(
            "restarting pass {} from {estimation_epoch}",
            self.iterations_taken
        );

        Ok(Transition {
            next: self.first_pass_state(),
            action: Action::RestartPass {
                epoch: estimation_epoch,
            },
        })
    }

    fn finish(&mut self) -> Result<(), ODError> {
        self.msr.processing_complete();
        let covariance = self.covariance.clone().context(NoSolutionSnafu)?;
        let keplerian_covariance = keplerian::conversion_matrix(&self.esm)
            .map(|conv| &conv * &covariance * conv.transpose());

        let solution = BatchSolution {
            estimator: self.conf.name.clone(),
            epoch: self.estimation_epoch()?,
            state_map: self.esm.state_map().to_vec(),
            initial_state: self.initial_state.clone(),
            estimated_state: self.esm.state().vector.clone(),
            correlation: correlation(&covariance),
            covariance,
            keplerian_covariance,
            iterations: self.iterations_taken,
            rms_history: self.rms_history.clone(),
            rms: self.rms,
            status: self.status,
            reason: self.reason.clone(),
            statistics: self.stats.clone(),
            inversion: self.conf.inversion_algorithm,
            residuals: self.residual_plots.clone(),
        };

        if self.status.is_converged() {
            info!("{} converged: {}", self.conf.name, self.status);
        } else {
            warn!("{} stopped: {}", self.conf.name, self.status);
        }
        self.report.final_summary(&solution);
        self.report.flush()?;
        self.solution = Some(solution);
        Ok(())
    }

    /// Λ and N at the start of a pass, from the a-priori information when it is used
    fn reset_accumulators(&mut self) {
        let n = self.state_size;
        match &self.apriori_inverse {
            Some(p0_inv) => {
                self.information = p0_inv.clone();
                self.normal = p0_inv * &self.x0bar;
            }
            None => {
                self.information = DMatrix::zeros(n, n);
                self.normal = DVector::zeros(n);
            }
        }
        self.h_rows.clear();
        self.residuals.clear();
        self.weights.clear();
        self.stats.clear();
        self.residual_plots.clear();
    }

    /// Calculating if the participants are at the first observation, else Propagating
    fn first_pass_state(&self) -> EstimatorState {
        match self.msr.epoch() {
            Some(first) if (first - self.current_epoch).abs() <= self.conf.epoch_precision => {
                EstimatorState::Calculating
            }
            _ => EstimatorState::Propagating,
        }
    }

    fn estimation_epoch(&self) -> Result<Epoch, ODError> {
        self.estimation_epoch.context(InvalidStateSnafu {
            state: self.state.to_string(),
            details: "the estimation epoch is not set",
        })
    }

    pub fn state(&self) -> EstimatorState {
        self.state
    }

    pub fn current_epoch(&self) -> Epoch {
        self.current_epoch
    }

    pub fn estimation_epoch_opt(&self) -> Option<Epoch> {
        self.estimation_epoch
    }

    /// Information matrix Λ of the current pass
    pub fn information(&self) -> &DMatrix<f64> {
        &self.information
    }

    /// Residual vector N of the current pass
    pub fn normal(&self) -> &DVector<f64> {
        &self.normal
    }

    /// Last state correction
    pub fn dx(&self) -> &DVector<f64> {
        &self.dx
    }

    pub fn covariance(&self) -> Option<&DMatrix<f64>> {
        self.covariance.as_ref()
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn residuals(&self) -> &[f64] {
        &self.residuals
    }

    pub fn rms(&self) -> &RmsHistory {
        &self.rms
    }

    pub fn status(&self) -> ConvergenceStatus {
        self.status
    }

    pub fn iterations_taken(&self) -> usize {
        self.iterations_taken
    }

    pub fn statistics(&self) -> &PassStatistics {
        &self.stats
    }

    pub fn report(&self) -> &EstimatorReport {
        &self.report
    }

    pub fn solution(&self) -> Option<&BatchSolution> {
        self.solution.as_ref()
    }

    pub fn msr(&self) -> &M {
        &self.msr
    }

    pub fn msr_mut(&mut self) -> &mut M {
        &mut self.msr
    }

    pub fn esm(&self) -> &S {
        &self.esm
    }

    pub fn esm_mut(&mut self) -> &mut S {
        &mut self.esm
    }
}

#[cfg(test)]
mod ut_blse {
    use super::*;
    use crate::linalg::Vector6;
    use crate::od::estimate::{Participant, ParticipantStateManager, SolveFor, StateElement};
    use crate::od::msr::{MeasurementModel, MeasurementType, TrackingDataManager};
    use crate::time::Unit;
    use approx::assert_abs_diff_eq;
    use rstest::*;

    /// Observes h · (x, y) of the spacecraft from one station
    struct Linear {
        participants: Vec<String>,
        h: [f64; 2],
    }

    impl MeasurementModel for Linear {
        fn name(&self) -> &str {
            "linear"
        }

        fn msr_type(&self) -> MeasurementType {
            MeasurementType::Range
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
            let x = esm
                .participant("Sat")
                .and_then(|p| p.cartesian())
                .unwrap_or_else(Vector6::zeros);
            let mut c = ComputedMeasurement::new(
                MeasurementType::Range,
                0,
                self.participants.clone(),
                obs.epoch,
                1,
            );
            c.value[0] = self.h[0] * x[0] + self.h[1] * x[1];
            c.covariance[(0, 0)] = 1.0;
            c.feasible = true;
            Ok(c)
        }

        fn derivatives(
            &mut self,
            element: &StateElement,
            _esm: &dyn EstimationStateManager,
        ) -> Result<DMatrix<f64>, ODError> {
            let mut d = DMatrix::zeros(1, element.length);
            if element.element == SolveFor::Position {
                d[(0, 0)] = self.h[0];
                d[(0, 1)] = self.h[1];
            }
            Ok(d)
        }
    }

    fn epoch() -> Epoch {
        Epoch::from_gregorian_utc_at_midnight(2024, 1, 1)
    }

    fn spacecraft() -> ParticipantStateManager {
        let sat = Participant::spacecraft("Sat", epoch(), Vector6::zeros(), None)
            .with_solve_for(SolveFor::Position);
        ParticipantStateManager::new(vec![sat])
    }

    /// One station per row, all observations at the same epoch
    fn estimator(
        conf: BatchConf,
        rows: &[([f64; 2], f64)],
    ) -> BatchEstimator<TrackingDataManager, ParticipantStateManager> {
        let mut obs = Vec::new();
        let mut models = Vec::new();
        for (i, (h, value)) in rows.iter().enumerate() {
            let participants = vec![format!("S{i}"), "Sat".to_string()];
            obs.push(
                ObservationRecord::builder()
                    .epoch(epoch())
                    .msr_type(MeasurementType::Range)
                    .participants(participants.clone())
                    .value(vec![*value])
                    .build(),
            );
            models.push(Linear {
                participants,
                h: *h,
            });
        }
        let mut msr = TrackingDataManager::new(obs);
        for model in models {
            msr = msr.with_model(Box::new(model));
        }
        BatchEstimator::new(conf, msr, spacecraft())
    }

    /// Runs the first pass: no propagation is needed since all observations share one epoch
    fn first_pass(est: &mut BatchEstimator<TrackingDataManager, ParticipantStateManager>) {
        while est.state() != EstimatorState::Estimating {
            let transition = est.advance().unwrap();
            assert_eq!(transition.action, Action::None);
        }
    }

    #[fixture]
    fn literal() -> Vec<([f64; 2], f64)> {
        vec![([1.0, 0.0], 2.0), ([0.0, 1.0], 3.0), ([1.0, 1.0], 5.0)]
    }

    #[rstest]
    fn normal_equations(literal: Vec<([f64; 2], f64)>) {
        let _ = pretty_env_logger::try_init();
        let mut est = estimator(BatchConf::default(), &literal);
        first_pass(&mut est);

        // Z is never observed
        let info = est.information().view((0, 0), (2, 2)).clone_owned();
        assert_eq!(info, DMatrix::from_row_slice(2, 2, &[2.0, 1.0, 1.0, 2.0]));
        assert_eq!(est.normal()[0], 7.0);
        assert_eq!(est.normal()[1], 8.0);
        assert_eq!(est.residuals(), &[2.0, 3.0, 5.0]);
        assert!(est.weights().iter().all(|w| *w > 0.0));
        assert!(crate::utils::is_symmetric(est.information(), 0.0));
        assert_eq!(est.statistics().total.count, 3);
    }

    #[rstest]
    #[case(InversionAlgorithm::Internal)]
    #[case(InversionAlgorithm::Schur)]
    #[case(InversionAlgorithm::Cholesky)]
    fn correction_of_the_normal_equations(#[case] algo: InversionAlgorithm) {
        let info = DMatrix::from_row_slice(2, 2, &[2.0, 1.0, 1.0, 2.0]);
        let normal = DVector::from_row_slice(&[7.0, 8.0]);
        let dx = algo.invert(&info).unwrap() * normal;
        assert_abs_diff_eq!(dx[0], 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(dx[1], 3.0, epsilon = 1e-12);
    }

    #[rstest]
    #[case(InversionAlgorithm::Internal)]
    #[case(InversionAlgorithm::Schur)]
    #[case(InversionAlgorithm::Cholesky)]
    fn singular_information_fails_the_run(#[case] algo: InversionAlgorithm) {
        let _ = pretty_env_logger::try_init();
        // Z is never observed, so its row and column of the information matrix are zero
        let mut est = estimator(
            BatchConf::builder().inversion_algorithm(algo).build(),
            &[
                ([1.0, 0.0], 2.0),
                ([0.0, 1.0], 3.0),
                ([1.0, 1.0], 5.0),
                ([1.0, -1.0], -1.0),
            ],
        );
        first_pass(&mut est);
        let err = est.advance().unwrap_err();
        assert!(matches!(err, ODError::ODInversion { which, .. } if which == "information matrix"));
        assert_eq!(est.state(), EstimatorState::Finished);
        assert!(est.solution().is_none());
    }

    #[test]
    fn too_few_observations() {
        let mut est = estimator(BatchConf::default(), &[([1.0, 0.0], 2.0)]);
        first_pass(&mut est);
        match est.advance() {
            Err(ODError::TooFewObservations {
                solve_for,
                remaining,
                ..
            }) => {
                assert_eq!(solve_for, 3);
                assert_eq!(remaining, 1);
            }
            other => panic!("expected too few observations, got {other:?}"),
        }
    }

    #[test]
    fn sigma_edits_are_readmitted() {
        let _ = pretty_env_logger::try_init();
        let conf = BatchConf::builder().olse_initial_rms_sigma(4.0).build();
        let mut est = estimator(conf, &[([1.0, 0.0], 2.0), ([0.0, 1.0], 30.0)]);
        first_pass(&mut est);
        assert_eq!(est.statistics().removed_count("IRMS"), 1);
        assert_eq!(est.residuals(), &[2.0]);
        assert!(est.msr().observations().iter().all(|o| o.in_use));
        assert!(est.report().text().contains("IRMS"));
    }

    #[test]
    fn propagation_is_requested_between_epochs() {
        let obs = ObservationRecord::builder()
            .epoch(epoch() + Unit::Hour * 1)
            .msr_type(MeasurementType::Range)
            .participants(vec!["S0".to_string(), "Sat".to_string()])
            .value(vec![1.0])
            .build();
        let msr = TrackingDataManager::new(vec![obs]);
        let mut est = BatchEstimator::new(BatchConf::default(), msr, spacecraft());
        assert_eq!(est.advance().unwrap().next, EstimatorState::Propagating);
        assert_eq!(
            est.advance().unwrap(),
            Transition {
                next: EstimatorState::Propagating,
                action: Action::Propagate {
                    step: Unit::Second * 600
                }
            }
        );
        est.propagated_to(epoch() + Unit::Hour * 1);
        assert_eq!(est.advance().unwrap().next, EstimatorState::Calculating);
        // No model computes this observation
        assert_eq!(est.advance().unwrap().next, EstimatorState::Accumulating);
        assert_eq!(est.advance().unwrap().next, EstimatorState::Estimating);
        assert_eq!(est.statistics().removed_count("U"), 1);
        assert!(est.advance().is_err());
        assert_eq!(est.state(), EstimatorState::Finished);

        est.reset();
        assert_eq!(est.state(), EstimatorState::Initializing);
    }
}
