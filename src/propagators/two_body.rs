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

use super::{PropagationError, Propagator, StepFailedSnafu, SynchronizationSnafu};
use crate::linalg::{DMatrix, Matrix6, Vector3, Vector6, U7};
use crate::od::estimate::{EstimationStateManager, ParticipantKind, SolveFor};
use crate::time::{Duration, Epoch, Unit};
use hyperdual::linalg::norm;
use hyperdual::{Float, OHyperdual};
use snafu::ensure;

/// Classic fixed step Runge Kutta 4 coefficients
const RK4_A: [f64; 3] = [0.5, 0.5, 1.0];
const RK4_B: [f64; 4] = [1.0 / 6.0, 1.0 / 3.0, 1.0 / 3.0, 1.0 / 6.0];

/// Point mass gravity propagator of every spacecraft participant, with its state transition matrix.
///
/// Each spacecraft is integrated about its own central body (`mu_km3_s2`) with a fixed step RK4.
/// The dynamic parameters of a spacecraft (Cr, Cd, ...) do not affect its orbit, so their
/// rows and columns of the STM remain the identity.
#[derive(Clone, Debug)]
pub struct TwoBody {
    epoch: Epoch,
    /// Largest integration step, shorter requested steps are taken in one go
    pub max_substep: Duration,
}

impl TwoBody {
    pub fn new(epoch: Epoch) -> Self {
        Self {
            epoch,
            max_substep: Unit::Second * 10,
        }
    }

    pub fn with_max_substep(mut self, max_substep: Duration) -> Self {
        self.max_substep = max_substep;
        self
    }
}

/// Returns the state derivative and its gradient with respect to the state
pub(crate) fn dual_eom(state: &Vector6<f64>, mu_km3_s2: f64) -> (Vector6<f64>, Matrix6<f64>) {
    let seed = |i: usize| {
        let mut v = [0.0; 7];
        v[0] = state[i];
        v[i + 1] = 1.0;
        OHyperdual::<f64, U7>::from_slice(&v)
    };
    let radius = Vector3::new(seed(0), seed(1), seed(2));
    let rmag = norm(&radius);
    let body_acceleration = radius * (OHyperdual::<f64, U7>::from_real(-mu_km3_s2) / rmag.powi(3));

    let mut fx = Vector6::zeros();
    let mut grad = Matrix6::zeros();
    for i in 0..3 {
        fx[i] = state[i + 3];
        grad[(i, i + 3)] = 1.0;
        fx[i + 3] = body_acceleration[i].real();
        for j in 1..7 {
            grad[(i + 3, j - 1)] = body_acceleration[i][j];
        }
    }
    (fx, grad)
}

/// Takes one RK4 step of the state and of the STM from the start of this step
fn rk4_step(state: &Vector6<f64>, mu_km3_s2: f64, h: f64) -> (Vector6<f64>, Matrix6<f64>) {
    let mut ks: Vec<(Vector6<f64>, Matrix6<f64>)> = Vec::with_capacity(4);
    let mut x = *state;
    let mut phi = Matrix6::identity();
    for stage in 0..4 {
        let (fx, grad) = dual_eom(&x, mu_km3_s2);
        ks.push((fx, grad * phi));
        if stage < 3 {
            let (k_x, k_phi) = &ks[stage];
            x = state + k_x * (RK4_A[stage] * h);
            phi = Matrix6::identity() + k_phi * (RK4_A[stage] * h);
        }
    }
    let mut next = *state;
    let mut stm = Matrix6::identity();
    for ((k_x, k_phi), b) in ks.iter().zip(RK4_B) {
        next += k_x * (b * h);
        stm += k_phi * (b * h);
    }
    (next, stm)
}

impl Propagator for TwoBody {
    fn epoch(&self) -> Epoch {
        self.epoch
    }

    fn set_epoch(&mut self, epoch: Epoch) {
        self.epoch = epoch;
    }

    fn update_from_space_objects(
        &mut self,
        esm: &dyn EstimationStateManager,
    ) -> Result<(), PropagationError> {
        for p in esm.participants().iter().filter(|p| p.is_spacecraft()) {
            ensure!(
                matches!(p.kind, ParticipantKind::Spacecraft { mu_km3_s2: Some(_) }),
                SynchronizationSnafu {
                    name: p.name.clone(),
                    details: "the gravitational parameter of its central body is unknown"
                }
            );
            ensure!(
                p.cartesian().is_some(),
                SynchronizationSnafu {
                    name: p.name.clone(),
                    details: "no Cartesian state"
                }
            );
        }
        if let Some(epoch) = esm.epoch() {
            self.epoch = epoch;
        }
        debug!("two body propagator synchronized at {}", self.epoch);
        Ok(())
    }

    fn step(
        &mut self,
        step: Duration,
        esm: &mut dyn EstimationStateManager,
    ) -> Result<Epoch, PropagationError> {
        let step_s = step.to_seconds();
        let max_s = self.max_substep.to_seconds().abs();
        ensure!(
            max_s > 0.0,
            StepFailedSnafu {
                epoch: self.epoch,
                step,
                details: "the maximum integration step is zero"
            }
        );
        let substeps = (step_s.abs() / max_s).ceil().max(1.0) as usize;
        let h = step_s / substeps as f64;

        let spacecraft: Vec<String> = esm
            .participants()
            .iter()
            .filter(|p| p.is_spacecraft())
            .map(|p| p.name.clone())
            .collect();

        for name in &spacecraft {
            let Some(p) = esm.participant_mut(name) else {
                continue;
            };
            let (Some(mut state), ParticipantKind::Spacecraft { mu_km3_s2: Some(mu) }) =
                (p.cartesian(), p.kind.clone())
            else {
                continue;
            };
            let mut phi = Matrix6::identity();
            for _ in 0..substeps {
                let (next, stm) = rk4_step(&state, mu, h);
                ensure!(
                    next.iter().all(|v| v.is_finite()),
                    StepFailedSnafu {
                        epoch: self.epoch,
                        step,
                        details: format!("{name} state is not finite")
                    }
                );
                state = next;
                phi = stm * phi;
            }
            p.set_values(&SolveFor::CartesianState, state.as_slice());

            // Only the Cartesian block of the dynamic STM evolves
            let n = p.stm.nrows();
            let mut step_stm = DMatrix::identity(n, n);
            if let Some(offset) = p.stm_offset(&SolveFor::CartesianState) {
                if offset + 6 <= n {
                    step_stm.view_mut((offset, offset), (6, 6)).copy_from(&phi);
                }
            }
            p.stm = step_stm * &p.stm;
        }

        self.epoch += step;
        for name in esm
            .participants()
            .iter()
            .map(|p| p.name.clone())
            .collect::<Vec<_>>()
        {
            if let Some(p) = esm.participant_mut(&name) {
                p.epoch = self.epoch;
            }
        }
        trace!("two body propagator at {}", self.epoch);
        Ok(self.epoch)
    }
}
