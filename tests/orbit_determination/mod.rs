use nyx::linalg::{DMatrix, Vector3, Vector6};
use nyx::od::prelude::*;

mod angles;
mod apriori;
mod convergence;
mod editing;
mod events;

pub const MU_EARTH: f64 = 398_600.4415;

pub fn epoch() -> Epoch {
    Epoch::from_gregorian_utc_hms(2024, 2, 29, 12, 0, 0)
}

/// Observes h · r of the spacecraft "Sat" from one station, with unit variance.
pub struct LinearModel {
    pub participants: Vec<String>,
    pub h: Vector3<f64>,
    /// Reports the opposite partials, which makes every correction go the wrong way
    pub flip_partials: bool,
}

impl LinearModel {
    pub fn new(station: &str, h: Vector3<f64>) -> Self {
        Self {
            participants: vec![station.to_string(), "Sat".to_string()],
            h,
            flip_partials: false,
        }
    }
}

impl MeasurementModel for LinearModel {
    fn name(&self) -> &str {
        &self.participants[0]
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
        let state = esm
            .participant("Sat")
            .and_then(|p| p.cartesian())
            .unwrap_or_else(Vector6::zeros);
        let mut msr = ComputedMeasurement::new(
            MeasurementType::Range,
            0,
            self.participants.clone(),
            obs.epoch,
            1,
        );
        msr.value[0] = self.h.dot(&state.fixed_rows::<3>(0));
        msr.covariance[(0, 0)] = 1.0;
        msr.feasible = true;
        Ok(msr)
    }

    fn derivatives(
        &mut self,
        element: &StateElement,
        _esm: &dyn EstimationStateManager,
    ) -> Result<DMatrix<f64>, ODError> {
        let sign = if self.flip_partials { -1.0 } else { 1.0 };
        let mut partials = DMatrix::zeros(1, element.length);
        if matches!(element.element, SolveFor::Position | SolveFor::CartesianState) {
            for i in 0..3 {
                partials[(0, i)] = sign * self.h[i];
            }
        }
        Ok(partials)
    }
}

pub fn truth_position() -> Vector3<f64> {
    Vector3::new(7000.0, 100.0, -50.0)
}

pub fn spacecraft(position: Vector3<f64>) -> Participant {
    let state = Vector6::new(position[0], position[1], position[2], 0.0, 7.5, 1.0);
    Participant::spacecraft("Sat", epoch(), state, Some(MU_EARTH))
        .with_solve_for(SolveFor::Position)
}

/// Rows of H of the six linear stations
pub fn linear_rows() -> [Vector3<f64>; 6] {
    [
        Vector3::new(1.0, 0.0, 0.0),
        Vector3::new(0.0, 1.0, 0.0),
        Vector3::new(0.0, 0.0, 1.0),
        Vector3::new(1.0, 1.0, 0.0),
        Vector3::new(0.0, 1.0, 1.0),
        Vector3::new(1.0, 0.0, 1.0),
    ]
}

/// Six stations observing independent combinations of the position, all at the estimation epoch
pub fn linear_tracking(flip_partials: bool) -> TrackingDataManager {
    let rows = linear_rows();
    let truth = truth_position();
    let mut obs = Vec::new();
    let mut models = Vec::new();
    for (i, h) in rows.iter().enumerate() {
        let station = format!("Station {i}");
        obs.push(
            ObservationRecord::builder()
                .epoch(epoch())
                .msr_type(MeasurementType::Range)
                .participants(vec![station.clone(), "Sat".to_string()])
                .value(vec![h.dot(&truth)])
                .build(),
        );
        let mut model = LinearModel::new(&station, *h);
        model.flip_partials = flip_partials;
        models.push(model);
    }
    let mut msr = TrackingDataManager::new(obs);
    for model in models {
        msr = msr.with_model(Box::new(model));
    }
    msr
}

pub fn linear_process(
    conf: BatchConf,
    flip_partials: bool,
) -> BatchODProcess<TwoBody, NoEvents, TrackingDataManager, ParticipantStateManager> {
    let initial = truth_position() + Vector3::new(10.0, -5.0, 10.0);
    let esm = ParticipantStateManager::new(vec![spacecraft(initial)]);
    BatchODProcess::new(
        TwoBody::new(epoch()),
        NoEvents,
        conf,
        linear_tracking(flip_partials),
        esm,
    )
}
