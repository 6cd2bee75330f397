use super::{epoch, MU_EARTH};
use nyx::linalg::{Matrix3, Vector3, Vector6};
use nyx::od::msr::signal::{
    GeodeticPosition, LegFeasibility, MediaCorrection, MediaKind, SignalLeg, SignalPath,
};
use nyx::od::prelude::*;
use approx::assert_abs_diff_eq;
use rstest::*;

/// Station on the equator at the prime meridian of a non-rotating Earth, without light time.
#[derive(Clone)]
struct EquatorStation;

impl SignalPath for EquatorStation {
    fn legs(
        &mut self,
        obs: &ObservationRecord,
        esm: &dyn EstimationStateManager,
        _with_light_time: bool,
        with_media_correction: bool,
    ) -> Result<Vec<SignalLeg>, ODError> {
        let sc = esm.participant(&obs.participants[1]).unwrap();
        let cart = sc.cartesian().unwrap();
        let sc_pos = Vector3::new(cart[0], cart[1], cart[2]);
        let gs_pos = Vector3::new(6378.1363, 0.0, 0.0);
        Ok(vec![SignalLeg {
            transmitter: obs.participants[1].clone(),
            receiver: obs.participants[0].clone(),
            transmitter_is_station: false,
            receiver_is_station: true,
            transmit_epoch: obs.epoch,
            receive_epoch: obs.epoch,
            receive_delay: Duration::ZERO,
            transmit_location: sc_pos,
            receive_location: gs_pos,
            range_vec_inertial: gs_pos - sc_pos,
            receive_j2k_to_bf: Matrix3::identity(),
            station: Some(GeodeticPosition {
                latitude_deg: 0.0,
                longitude_deg: 0.0,
                height_km: 0.0,
            }),
            origin_ssb_velocity: Vector3::zeros(),
            receiver_velocity: Vector3::zeros(),
            transmit_stm: sc.stm.clone(),
            transmit_stm_tm: sc.stm.clone(),
            receive_stm: nyx::linalg::DMatrix::identity(6, 6),
            receive_stm_tm: nyx::linalg::DMatrix::identity(6, 6),
            feasibility: LegFeasibility {
                reason: "N".to_string(),
                value: 45.0,
            },
            corrections: vec![MediaCorrection {
                kind: MediaKind::Troposphere,
                value_rad: 0.0,
                enabled: with_media_correction,
            }],
        }])
    }
}

fn truth_state() -> Vector6<f64> {
    let r = 7000.0_f64;
    let v = (MU_EARTH / r).sqrt();
    let (s60, c60) = 60.0_f64.to_radians().sin_cos();
    let (s30, c30) = 30.0_f64.to_radians().sin_cos();
    Vector6::new(r * c60, r * s60, 0.0, -v * s60 * c30, v * c60 * c30, v * s30)
}

fn participants() -> Vec<String> {
    vec!["GDS".to_string(), "Sat".to_string()]
}

fn adapter(kind: AngleKind) -> AngleAdapter<EquatorStation> {
    AngleAdapter::new(
        &format!("GDS {kind}"),
        kind,
        participants(),
        EquatorStation,
        AngleAdapterConf::default(),
    )
}

fn station() -> Participant {
    Participant::ground_station(
        "GDS",
        epoch(),
        GeodeticPosition {
            latitude_deg: 0.0,
            longitude_deg: 0.0,
            height_km: 0.0,
        },
    )
}

/// Noiseless observations every minute for ten minutes, from the truth trajectory
fn simulate(kinds: &[AngleKind]) -> Vec<ObservationRecord> {
    let sat = Participant::spacecraft("Sat", epoch(), truth_state(), Some(MU_EARTH));
    let mut truth = ParticipantStateManager::new(vec![sat, station()]);
    let mut prop = TwoBody::new(epoch());
    prop.update_from_space_objects(&truth).unwrap();
    let mut models: Vec<AngleAdapter<EquatorStation>> =
        kinds.iter().map(|kind| adapter(*kind)).collect();

    let mut observations = Vec::new();
    for minute in 0..=10_i64 {
        if minute > 0 {
            prop.step(Unit::Minute * 1, &mut truth).unwrap();
        }
        let at = epoch() + Unit::Minute * minute;
        for model in models.iter_mut() {
            let mut obs = ObservationRecord::builder()
                .epoch(at)
                .msr_type(model.msr_type())
                .participants(participants())
                .value(vec![0.0])
                .build();
            let computed = model.calculate(&obs, &truth, false).unwrap();
            obs.value = computed.value.clone();
            obs.value_orig = computed.value;
            observations.push(obs);
        }
    }
    observations
}

#[rstest]
#[case(&[AngleKind::RightAscension, AngleKind::Declination])]
#[case(&[AngleKind::XEast, AngleKind::YNorth])]
#[case(&[AngleKind::Azimuth, AngleKind::Elevation])]
fn angles_only_position_estimate(#[case] kinds: &[AngleKind]) {
    let _ = pretty_env_logger::try_init();
    let observations = simulate(kinds);
    assert_eq!(observations.len(), 11 * kinds.len());

    let truth = truth_state();
    let mut initial = truth;
    initial[0] += 0.4;
    initial[1] -= 0.3;
    initial[2] += 0.2;
    let sat = Participant::spacecraft("Sat", epoch(), initial, Some(MU_EARTH))
        .with_solve_for(SolveFor::Position);

    let mut msr = TrackingDataManager::new(observations);
    for kind in kinds {
        msr = msr.with_model(Box::new(adapter(*kind)));
    }
    let conf = BatchConf::builder()
        .edit_with_predicted_rms(false)
        .report_mode(ReportMode::Verbose)
        .build();
    let mut odp = BatchODProcess::new(
        TwoBody::new(epoch()),
        NoEvents,
        conf,
        msr,
        ParticipantStateManager::new(vec![sat, station()]),
    );
    let solution = odp.run().unwrap();
    println!("{solution}");

    assert!(solution.converged(), "{}", solution.status);
    for i in 0..3 {
        assert_abs_diff_eq!(solution.estimated_state[i], truth[i], epsilon = 1e-3);
    }
    assert_eq!(solution.statistics.total.count, 11 * kinds.len());
    // Ten one minute steps per pass
    assert_eq!(odp.steps_taken(), 10 * solution.iterations);
    let report = odp.estimator.report().text();
    assert!(report.contains("Final solution"));
    assert!(report.contains(kinds[0].measurement_type().name()));
}
