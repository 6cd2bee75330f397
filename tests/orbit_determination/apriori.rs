use super::{epoch, linear_process, linear_rows, linear_tracking, spacecraft, truth_position};
use approx::{assert_abs_diff_eq, assert_relative_eq};
use nyx::linalg::{DMatrix, DVector, Vector3};
use nyx::od::prelude::*;
use rstest::*;

/// Inverse of the a-priori variance of each position component
const APRIORI_INFO: f64 = 1e-6;

fn apriori_process(
) -> BatchODProcess<TwoBody, NoEvents, TrackingDataManager, ParticipantStateManager> {
    let initial = truth_position() + Vector3::new(10.0, -5.0, 10.0);
    let sat = spacecraft(initial).with_apriori(DMatrix::identity(3, 3) / APRIORI_INFO);
    let conf = BatchConf::builder()
        .use_apriori(true)
        .edit_with_predicted_rms(false)
        .build();
    BatchODProcess::new(
        TwoBody::new(epoch()),
        NoEvents,
        conf,
        linear_tracking(false),
        ParticipantStateManager::new(vec![sat]),
    )
}

#[test]
fn apriori_information_is_carried_across_passes() {
    let _ = pretty_env_logger::try_init();
    let rows = linear_rows();
    let h = DMatrix::from_fn(6, 3, |i, j| rows[i][j]);
    let p0_inv = DMatrix::identity(3, 3) * APRIORI_INFO;

    let mut odp = apriori_process();
    odp.initialize().unwrap();
    while odp.estimator.state() != EstimatorState::Accumulating {
        odp.execute().unwrap();
    }
    assert_relative_eq!(odp.estimator.information(), &p0_inv, max_relative = 1e-12);
    assert!(odp.estimator.normal().iter().all(|n| *n == 0.0));

    while odp.estimator.state() != EstimatorState::CheckingRun {
        odp.execute().unwrap();
    }
    let expected = &p0_inv + h.transpose() * &h;
    assert_abs_diff_eq!(odp.estimator.information(), &expected, epsilon = 1e-15);

    // The predicted RMS adds the a-priori quadratic form of the total correction
    let est = &odp.estimator;
    let dx0 = est.dx().clone();
    let residuals = DVector::from_column_slice(est.residuals());
    let linearized = (&residuals - &h * &dx0).norm_squared();
    let apriori_term = APRIORI_INFO * dx0.norm_squared();
    assert_relative_eq!(
        est.rms().predicted,
        ((linearized + apriori_term) / 6.0).sqrt(),
        max_relative = 1e-9
    );
    assert!(est.rms().predicted > 1e-3);
    assert!((linearized / 6.0).sqrt() < 1e-4);

    // Second pass restarts from P0^-1 and P0^-1 * x0bar, with x0bar = -dx
    while odp.estimator.iterations_taken() == 0 {
        odp.execute().unwrap();
    }
    assert_eq!(odp.estimator.state(), EstimatorState::Calculating);
    assert_relative_eq!(odp.estimator.information(), &p0_inv, max_relative = 1e-12);
    assert_abs_diff_eq!(
        odp.estimator.normal(),
        &(-&dx0 * APRIORI_INFO),
        epsilon = 1e-15
    );

    while odp.estimator.state() != EstimatorState::Finished {
        odp.execute().unwrap();
    }
    let solution = odp.estimator.solution().unwrap();
    // The a-priori term keeps the predicted RMS away from the best RMS, so only the absolute
    // tolerance is met
    assert_eq!(solution.status, ConvergenceStatus::AbsoluteTolConverged);
    assert_eq!(solution.iterations, 2);
    // Pulled towards the a-priori state by (H'H + P0^-1)^-1 P0^-1 (x_init - truth)
    let pull = [3.5e-6, -4.0e-6, 3.5e-6];
    for i in 0..3 {
        assert_abs_diff_eq!(
            solution.estimated_state[i] - truth_position()[i],
            pull[i],
            epsilon = 1e-8
        );
    }
}

#[rstest]
#[case(false, 0)]
#[case(true, 2)]
fn best_rms_after_divergence(#[case] reset: bool, #[case] best_iteration: usize) {
    let _ = pretty_env_logger::try_init();
    let conf = BatchConf::builder()
        .olse_multiplicative_constant(1e6)
        .edit_with_predicted_rms(false)
        .reset_best_rms_on_divergence(reset)
        .build();
    let solution = linear_process(conf, true).run().unwrap();

    assert_eq!(solution.status, ConvergenceStatus::MaxConsecutiveDiverged);
    assert_eq!(solution.iterations, 4);
    // With the reset, the last best RMS is the RMS of the iteration before the last
    assert_eq!(solution.rms.best, solution.rms_history[best_iteration]);
}
