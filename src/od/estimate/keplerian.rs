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

use super::{EstimationStateManager, SolveFor};
use crate::linalg::{DMatrix, Matrix6, Vector3, Vector6, U7};
use hyperdual::linalg::norm;
use hyperdual::{Float, OHyperdual};
use std::f64::consts::PI;
use std::fmt;

/// The Keplerian elements used to express the covariance, in this order.
pub const KEPLERIAN_LABELS: [&str; 6] = ["SMA", "ECC", "INC", "RAAN", "AOP", "MA"];

type Dual = OHyperdual<f64, U7>;

/// A Cartesian state whose components carry their partials with respect to the Cartesian state.
///
/// Algorithms are from GMAT's StateConversionUtil.
#[derive(Copy, Clone, Debug)]
pub struct CartesianDual {
    x: Dual,
    y: Dual,
    z: Dual,
    vx: Dual,
    vy: Dual,
    vz: Dual,
    mu_km3_s2: f64,
}

/// Failure to express a state in Keplerian elements.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum KeplerianError {
    /// Only elliptical orbits are converted
    NotElliptical { ecc: f64 },
    /// Equatorial or circular orbit with undefined angles
    Undefined { element: &'static str },
}

impl fmt::Display for KeplerianError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotElliptical { ecc } => write!(f, "orbit is not elliptical (ecc = {ecc})"),
            Self::Undefined { element } => write!(f, "{element} is undefined for this orbit"),
        }
    }
}

impl CartesianDual {
    pub fn new(state: &Vector6<f64>, mu_km3_s2: f64) -> Self {
        let seed = |i: usize| {
            let mut v = [0.0; 7];
            v[0] = state[i];
            v[i + 1] = 1.0;
            OHyperdual::from_slice(&v)
        };
        Self {
            x: seed(0),
            y: seed(1),
            z: seed(2),
            vx: seed(3),
            vy: seed(4),
            vz: seed(5),
            mu_km3_s2,
        }
    }

    fn mu(&self) -> Dual {
        Dual::from(self.mu_km3_s2)
    }

    fn radius(&self) -> Vector3<Dual> {
        Vector3::new(self.x, self.y, self.z)
    }

    fn velocity(&self) -> Vector3<Dual> {
        Vector3::new(self.vx, self.vy, self.vz)
    }

    fn hvec(&self) -> Vector3<Dual> {
        self.radius().cross(&self.velocity())
    }

    fn evec(&self) -> Vector3<Dual> {
        let r = self.radius();
        let v = self.velocity();
        let coeff = norm(&v).powi(2) - self.mu() / norm(&r);
        let rdv = r.dot(&v);
        Vector3::new(
            (coeff * r[0] - rdv * v[0]) / self.mu(),
            (coeff * r[1] - rdv * v[1]) / self.mu(),
            (coeff * r[2] - rdv * v[2]) / self.mu(),
        )
    }

    pub fn sma_km(&self) -> Dual {
        let energy =
            norm(&self.velocity()).powi(2) / Dual::from(2.0) - self.mu() / norm(&self.radius());
        -self.mu() / (Dual::from(2.0) * energy)
    }

    pub fn ecc(&self) -> Dual {
        norm(&self.evec())
    }

    pub fn inc_deg(&self) -> Dual {
        let h = self.hvec();
        (h[2] / norm(&h)).acos().to_degrees()
    }

    fn node_vector(&self) -> Vector3<Dual> {
        Vector3::new(Dual::from(0.0), Dual::from(0.0), Dual::from(1.0)).cross(&self.hvec())
    }

    pub fn raan_deg(&self) -> Result<Dual, KeplerianError> {
        let n = self.node_vector();
        let raan = (n[0] / norm(&n)).acos();
        if raan.real().is_nan() {
            Err(KeplerianError::Undefined { element: "RAAN" })
        } else if n[1].real() < 0.0 {
            Ok((Dual::from(2.0 * PI) - raan).to_degrees())
        } else {
            Ok(raan.to_degrees())
        }
    }

    pub fn aop_deg(&self) -> Result<Dual, KeplerianError> {
        let n = self.node_vector();
        let e = self.evec();
        let aop = (n.dot(&e) / (norm(&n) * self.ecc())).acos();
        if aop.real().is_nan() {
            Err(KeplerianError::Undefined { element: "AOP" })
        } else if e[2].real() < 0.0 {
            Ok((Dual::from(2.0 * PI) - aop).to_degrees())
        } else {
            Ok(aop.to_degrees())
        }
    }

    pub fn ta_deg(&self) -> Result<Dual, KeplerianError> {
        let cos_nu = self.evec().dot(&self.radius()) / (self.ecc() * norm(&self.radius()));
        let ta = cos_nu.acos();
        if ta.real().is_nan() {
            Err(KeplerianError::Undefined { element: "TA" })
        } else if self.radius().dot(&self.velocity()).real() < 0.0 {
            Ok((Dual::from(2.0 * PI) - ta).to_degrees())
        } else {
            Ok(ta.to_degrees())
        }
    }

    pub fn ma_deg(&self) -> Result<Dual, KeplerianError> {
        let ecc = self.ecc();
        if ecc.real() >= 1.0 {
            return Err(KeplerianError::NotElliptical { ecc: ecc.real() });
        }
        let ta_rad = self.ta_deg()?.to_radians();
        let (sin_ta, cos_ta) = (ta_rad.sin(), ta_rad.cos());
        let ecc_cos_ta = ecc * cos_ta;
        let sin_ea =
            ((Dual::from(1.0) - ecc.powi(2)).sqrt() * sin_ta) / (Dual::from(1.0) + ecc_cos_ta);
        let cos_ea = (ecc + cos_ta) / (Dual::from(1.0) + ecc_cos_ta);
        let ea = sin_ea.atan2(cos_ea);
        let mut ma = (ea - ecc * ea.sin()).to_degrees();
        if ma.real() < 0.0 {
            ma = ma + Dual::from(360.0);
        }
        Ok(ma)
    }

    /// Returns the Keplerian elements with their partials, in the order of [KEPLERIAN_LABELS]
    pub fn elements(&self) -> Result<[Dual; 6], KeplerianError> {
        let ecc = self.ecc();
        if ecc.real() >= 1.0 {
            return Err(KeplerianError::NotElliptical { ecc: ecc.real() });
        }
        Ok([
            self.sma_km(),
            ecc,
            self.inc_deg(),
            self.raan_deg()?,
            self.aop_deg()?,
            self.ma_deg()?,
        ])
    }
}

/// Returns the Keplerian elements of the provided state and their Jacobian with respect to the Cartesian state
pub fn keplerian_jacobian(
    state: &Vector6<f64>,
    mu_km3_s2: f64,
) -> Result<(Vector6<f64>, Matrix6<f64>), KeplerianError> {
    let elements = CartesianDual::new(state, mu_km3_s2).elements()?;
    let mut values = Vector6::zeros();
    let mut jac = Matrix6::zeros();
    for (i, elem) in elements.iter().enumerate() {
        values[i] = elem[0];
        for j in 0..6 {
            jac[(i, j)] = elem[j + 1];
        }
    }
    Ok((values, jac))
}

/// Builds the conversion matrix of the full estimation state: the Keplerian Jacobian for each
/// spacecraft Cartesian state block, and the identity for every other element.
///
/// Returns `None` when no Cartesian state is estimated or when any spacecraft cannot be converted.
pub fn conversion_matrix(esm: &dyn EstimationStateManager) -> Option<DMatrix<f64>> {
    let map = esm.state_map();
    let n = map.len();
    let mut conv = DMatrix::identity(n, n);
    let mut converted = false;
    for elem in map
        .iter()
        .filter(|e| e.subelement == 1 && e.element == SolveFor::CartesianState)
    {
        let participant = esm.participant(&elem.object)?;
        let mu = match participant.kind {
            super::ParticipantKind::Spacecraft {
                mu_km3_s2: Some(mu),
            } => mu,
            _ => return None,
        };
        let state = participant.cartesian()?;
        match keplerian_jacobian(&state, mu) {
            Ok((_, jac)) => {
                conv.view_mut((elem.index, elem.index), (6, 6)).copy_from(&jac);
                converted = true;
            }
            Err(e) => {
                debug!("no Keplerian covariance for {}: {e}", elem.object);
                return None;
            }
        }
    }
    converted.then_some(conv)
}

#[cfg(test)]
mod ut_keplerian {
    use super::*;

    const MU_EARTH: f64 = 398_600.435_436;

    #[test]
    fn elements_of_inclined_orbit() {
        let state = Vector6::new(
            -2436.45, -2436.45, 6891.037, 5.088_611, -5.088_611, 0.0,
        );
        let (kep, jac) = keplerian_jacobian(&state, MU_EARTH).unwrap();
        assert!((kep[0] - 7712.186).abs() < 1e-2, "sma = {}", kep[0]);
        assert!((kep[1] - 0.001).abs() < 1e-3, "ecc = {}", kep[1]);
        assert!((kep[2] - 63.434).abs() < 1e-2, "inc = {}", kep[2]);
        // SMA is a function of the energy: its partial w.r.t. position is along the radius
        let d_sma_d_r = Vector3::new(jac[(0, 0)], jac[(0, 1)], jac[(0, 2)]);
        let r = Vector3::new(state[0], state[1], state[2]);
        assert!(d_sma_d_r.normalize().dot(&r.normalize()) > 0.999);
    }

    #[test]
    fn finite_difference_agrees() {
        let state = Vector6::new(7000.0, 100.0, 1300.0, -0.1, 7.4, 1.2);
        let (kep, jac) = keplerian_jacobian(&state, MU_EARTH).unwrap();
        for j in 0..6 {
            let h = if j < 3 { 1e-3 } else { 1e-6 };
            let mut pert = state;
            pert[j] += h;
            let (kep_p, _) = keplerian_jacobian(&pert, MU_EARTH).unwrap();
            for i in 0..6 {
                let fd = (kep_p[i] - kep[i]) / h;
                assert!(
                    (fd - jac[(i, j)]).abs() < 1e-3 * (1.0 + jac[(i, j)].abs()),
                    "d{}/dx{j}: fd {fd} vs {}",
                    KEPLERIAN_LABELS[i],
                    jac[(i, j)]
                );
            }
        }
    }

    #[test]
    fn hyperbolic_is_rejected() {
        let state = Vector6::new(7000.0, 0.0, 0.0, 0.0, 12.0, 0.0);
        assert!(matches!(
            keplerian_jacobian(&state, MU_EARTH),
            Err(KeplerianError::NotElliptical { .. })
        ));
    }
}
