use super::{epoch, spacecraft, truth_position, LinearModel};
use nyx::linalg::Vector3;
use nyx::od::prelude::*;

/// Residuals of the first pass are 3.0 on every row observing X, and 4.5 on the last row
fn boundary_process(
    extra: Vec<ObservationRecord>,
) -> BatchODProcess<TwoBody, NoEvents, TrackingDataManager, ParticipantStateManager> {
    let rows = [
        Vector3::new(1.0, 0.0, 0.0),
        Vector3::new(0.0, 1.0, 0.0),
        Vector3::new(0.0, 0.0, 1.0),
        Vector3::new(1.0, 1.0, 0.0),
        Vector3::new(0.0, 1.0, 1.0),
        Vector3::new(1.0, 0.0, 1.0),
        Vector3::new(1.5, 0.0, 0.0),
    ];
    let truth = truth_position();
    let mut msr = TrackingDataManager::new(
        rows.iter()
            .enumerate()
            .map(|(i, h)| {
                ObservationRecord::builder()
                    .epoch(epoch())
                    .msr_type(MeasurementType::Range)
                    .participants(vec![format!("Station {i}"), "Sat".to_string()])
                    .value(vec![h.dot(&truth)])
                    .build()
            })
            .chain(extra)
            .collect(),
    );
    for (i, h) in rows.iter().enumerate() {
        msr = msr.with_model(Box::new(LinearModel::new(&format!("Station {i}"), *h)));
    }

    let initial = truth - Vector3::new(3.0, 0.0, 0.0);
    let conf = BatchConf::builder()
        .olse_initial_rms_sigma(3.0)
        .edit_with_predicted_rms(false)
        .build();
    BatchODProcess::new(
        TwoBody::new(epoch()),
        NoEvents,
        conf,
        msr,
        ParticipantStateManager::new(vec![spacecraft(initial)]),
    )
}

#[test]
fn initial_rms_edit_is_strict() {
    let _ = pretty_env_logger::try_init();
    let mut odp = boundary_process(Vec::new());
    odp.initialize().unwrap();
    while odp.estimator.state() != EstimatorState::Estimating {
        odp.execute().unwrap();
    }
    let est = &odp.estimator;
    // sqrt(1) * 3.0 is not beyond 3.0
    assert_eq!(est.residuals(), &[3.0, 0.0, 0.0, 3.0, 0.0, 3.0]);
    assert_eq!(est.statistics().removed_count("IRMS"), 1);
    assert_eq!(est.statistics().total_removed(), 1);
    assert!(est.report().text().contains("IRMS"));
}

#[test]
fn sigma_edits_are_readmitted() {
    let _ = pretty_env_logger::try_init();
    let solution = boundary_process(Vec::new()).run().unwrap();
    assert!(solution.converged(), "{}", solution.status);
    // All seven observations are used on the last pass
    assert_eq!(solution.statistics.total.count, 7);
    assert_eq!(solution.statistics.total_removed(), 0);
    for i in 0..3 {
        assert!((solution.estimated_state[i] - truth_position()[i]).abs() < 1e-6);
    }
}

#[test]
fn unmatched_observations_are_permanently_removed() {
    let _ = pretty_env_logger::try_init();
    // Nothing computes azimuth
    let stray = ObservationRecord::builder()
        .epoch(epoch())
        .msr_type(MeasurementType::Azimuth)
        .participants(vec!["Station 0".to_string(), "Sat".to_string()])
        .value(vec![12.0])
        .build();
    let mut odp = boundary_process(vec![stray]);

    let solution = odp.run().unwrap();
    assert!(solution.converged());
    assert_eq!(solution.statistics.removed_count("U"), 1);
    assert!(odp
        .estimator
        .msr()
        .observations()
        .iter()
        .any(|obs| !obs.in_use && obs.removed_reason == EditReason::Unused));
}

#[test]
fn empty_observations_are_unused() {
    let _ = pretty_env_logger::try_init();
    let empty = ObservationRecord::builder()
        .epoch(epoch())
        .msr_type(MeasurementType::Range)
        .participants(vec!["Station 1".to_string(), "Sat".to_string()])
        .value(vec![])
        .build();
    let mut odp = boundary_process(vec![empty]);

    let solution = odp.run().unwrap();
    assert!(solution.converged(), "{}", solution.status);
    assert_eq!(solution.statistics.removed_count("U"), 1);
    assert_eq!(solution.statistics.total.count, 7);
    assert!(odp
        .estimator
        .msr()
        .observations()
        .iter()
        .any(|obs| obs.value.is_empty() && obs.removed_reason == EditReason::Unused));
}
