use super::{linear_process, truth_position};
use nyx::od::prelude::*;
use approx::assert_abs_diff_eq;
use rstest::*;

#[rstest]
#[case(InversionAlgorithm::Internal)]
#[case(InversionAlgorithm::Schur)]
#[case(InversionAlgorithm::Cholesky)]
fn linear_noiseless_converges(#[case] algo: InversionAlgorithm) {
    let _ = pretty_env_logger::try_init();
    let conf = BatchConf::builder()
        .inversion_algorithm(algo)
        .edit_with_predicted_rms(false)
        .build();
    let mut odp = linear_process(conf, false);
    let solution = odp.run().unwrap();

    println!("{solution}");
    assert!(solution.converged(), "{}", solution.status);
    assert!(matches!(
        solution.status,
        ConvergenceStatus::AbsoluteTolConverged | ConvergenceStatus::BothConverged
    ));
    assert!(solution.iterations <= 2);
    assert_eq!(solution.rms_history.len(), solution.iterations);
    for i in 0..3 {
        assert_abs_diff_eq!(solution.estimated_state[i], truth_position()[i], epsilon = 1e-6);
    }
    // Six observations of unit variance over three unknowns
    assert!(solution.sigmas().iter().all(|s| *s > 0.0 && *s < 1.0));
    assert!(nyx::utils::is_symmetric(&solution.covariance, 1e-12));
    assert_eq!(solution.inversion, algo);
    assert!(solution.keplerian_covariance.is_none());
    assert_eq!(solution.statistics.total.count, 6);
    assert_eq!(solution.residuals.len(), 6);
    // No observation is ever farther than the first observation epoch
    assert_eq!(odp.steps_taken(), 0);

    // Each iteration summary carries the verdict of its own iteration
    let report = odp.estimator.report().text();
    let last = format!("Iteration {} summary", solution.iterations - 1);
    let (_, last_summary) = report.split_once(&last).unwrap();
    assert!(last_summary.contains(&format!("Status        : {}", solution.status)));
    assert!(last_summary.contains(solution.reason.trim()));
    if solution.iterations == 2 {
        let first = report
            .split_once("Iteration 0 summary")
            .and_then(|(_, rest)| rest.split_once("Iteration 1 summary"))
            .map(|(first, _)| first)
            .unwrap();
        assert!(!first.contains(&format!("Status        : {}", solution.status)));
    }
}

#[test]
fn wrong_partials_diverge() {
    let _ = pretty_env_logger::try_init();
    let conf = BatchConf::builder()
        .olse_multiplicative_constant(1e6)
        .edit_with_predicted_rms(false)
        .build();
    let mut odp = linear_process(conf, true);
    let solution = odp.run().unwrap();

    assert_eq!(solution.status, ConvergenceStatus::MaxConsecutiveDiverged);
    assert!(!solution.converged());
    assert_eq!(solution.iterations, 4);
    // Each correction doubles the error
    for pair in solution.rms_history.windows(2) {
        assert_abs_diff_eq!(pair[1] / pair[0], 2.0, epsilon = 1e-9);
    }
    assert!(solution.reason.contains("consecutive divergences"));
}

#[test]
fn iterations_are_bounded() {
    let _ = pretty_env_logger::try_init();
    let conf = BatchConf::builder()
        .max_iterations(2)
        .max_consecutive_divergences(5)
        .olse_multiplicative_constant(1e6)
        .edit_with_predicted_rms(false)
        .build();
    let solution = linear_process(conf, true).run().unwrap();
    assert_eq!(solution.status, ConvergenceStatus::MaxIterationsDiverged);
    assert_eq!(solution.iterations, 2);
}

#[test]
fn information_matrix_is_symmetric_with_positive_weights() {
    let _ = pretty_env_logger::try_init();
    let mut odp = linear_process(BatchConf::default(), false);
    odp.initialize().unwrap();
    while odp.estimator.state() != EstimatorState::Estimating {
        odp.execute().unwrap();
    }
    let info = odp.estimator.information();
    assert!(nyx::utils::is_symmetric(info, 0.0));
    assert_eq!(info[(0, 0)], 3.0);
    assert_eq!(info[(0, 1)], 1.0);
    assert!(odp.estimator.weights().iter().all(|w| *w > 0.0));
    assert_eq!(odp.estimator.weights().len(), 6);
}

#[test]
fn invalid_configuration_is_rejected() {
    let conf = BatchConf::builder().absolute_tol(-1.0).build();
    let mut odp = linear_process(conf, false);
    assert!(matches!(odp.run(), Err(ODError::ODConfigError { .. })));
}

#[test]
fn configurations_from_yaml() {
    let _ = pretty_env_logger::try_init();
    let yaml = r#"
- name: direct
  AbsoluteTol: 1.0e-6
  OLSEUseRMSP: false
- name: cholesky
  InversionAlgorithm: Cholesky
  OLSEUseRMSP: false
  MaxIterations: 5
"#;
    let confs = BatchConf::loads_many(yaml).unwrap();
    assert_eq!(confs.len(), 2);
    for conf in confs {
        let name = conf.name.clone();
        let solution = linear_process(conf, false).run().unwrap();
        assert_eq!(solution.estimator, name);
        assert!(solution.converged());
    }
}
