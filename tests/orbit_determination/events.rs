use super::{linear_tracking, spacecraft, truth_position};
use nyx::linalg::Vector3;
use nyx::od::prelude::*;

#[test]
fn light_time_events_are_located() {
    let _ = pretty_env_logger::try_init();
    let initial = truth_position() + Vector3::new(1.0, 1.0, 1.0);
    let conf = BatchConf::builder().edit_with_predicted_rms(false).build();
    let mut odp = BatchODProcess::new(
        TwoBody::new(super::epoch()),
        NoEvents,
        conf,
        linear_tracking(false).with_light_time_events(),
        ParticipantStateManager::new(vec![spacecraft(initial)]),
    );
    odp.initialize().unwrap();

    let mut located = 0;
    let mut restarts = 0;
    while odp.estimator.state() != EstimatorState::Finished {
        let transition = odp.execute().unwrap();
        match transition.action {
            Action::LocateEvents => located += 1,
            Action::RestartPass { epoch } => {
                assert_eq!(epoch, super::epoch());
                restarts += 1;
            }
            _ => {}
        }
    }
    // One light time event per observation and per pass
    let solution = odp.estimator.solution().unwrap();
    assert_eq!(located, 6 * solution.iterations);
    assert_eq!(restarts, solution.iterations - 1);
    assert!(solution.converged());
    assert_eq!(odp.estimator.msr().event_count(), 0);
}
