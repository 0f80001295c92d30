//! Navigation primitive behavior against a scripted link: convergence,
//! deadlines, heartbeats, and cancellation.

mod common;

use common::{healthy, sample, MockLink, HOME_LAT, HOME_LON};
use skipper::error::{LinkError, MissionError};
use skipper::geo::{self, Point};
use skipper::link::{HealthReport, VehicleCommand};
use skipper::{nav, NavConfig};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::test(start_paused = true)]
async fn preflight_waits_for_gps_and_home() {
    let converging = HealthReport {
        gps_ok: false,
        home_ok: false,
        armable: true,
    };
    let link = Arc::new(MockLink::new().with_health(vec![converging, converging, healthy()]));
    let config = NavConfig::default();
    let cancel = CancellationToken::new();

    let report = nav::preflight_check(link.as_ref(), &config, &cancel)
        .await
        .unwrap();
    assert_eq!(report.message, "all preflight checks passed");
}

#[tokio::test(start_paused = true)]
async fn preflight_fails_without_connection() {
    let link = Arc::new(MockLink::disconnected());
    let config = NavConfig::default();
    let cancel = CancellationToken::new();

    let err = nav::preflight_check(link.as_ref(), &config, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, MissionError::Precondition(_)));
}

#[tokio::test(start_paused = true)]
async fn takeoff_that_never_climbs_times_out() {
    // The vehicle stays on the ground forever.
    let link = Arc::new(MockLink::with_samples(vec![sample(
        HOME_LAT, HOME_LON, 0.2, true,
    )]));
    let config = NavConfig::default();
    let cancel = CancellationToken::new();

    let err = nav::arm_and_takeoff(link.as_ref(), &config, &cancel, 20.0)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        MissionError::Timeout {
            operation: "takeoff",
            ..
        }
    ));
    // The commands were still issued; only convergence failed.
    assert!(link.issued().contains(&VehicleCommand::Arm));
    assert!(link
        .issued()
        .contains(&VehicleCommand::Takeoff { altitude_m: 20.0 }));
}

#[tokio::test(start_paused = true)]
async fn arming_is_not_gated_on_health() {
    // Health gating is preflight_check's job; arm_and_takeoff must not
    // repeat it.
    let degraded = HealthReport {
        gps_ok: false,
        home_ok: false,
        armable: false,
    };
    let link = Arc::new(
        MockLink::with_samples(vec![sample(HOME_LAT, HOME_LON, 19.5, true)])
            .with_health(vec![degraded]),
    );
    let config = NavConfig::default();
    let cancel = CancellationToken::new();

    nav::arm_and_takeoff(link.as_ref(), &config, &cancel, 20.0)
        .await
        .unwrap();
    assert_eq!(
        link.issued(),
        vec![
            VehicleCommand::Arm,
            VehicleCommand::Takeoff { altitude_m: 20.0 }
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn explicit_navigation_altitude_is_absolute() {
    let target = Point::new(47.398100, 8.546100);
    // Current altitude is 508 m AMSL; the commanded target must pass
    // through untouched, not be re-based on home.
    let link = Arc::new(MockLink::with_samples(vec![
        sample(HOME_LAT, HOME_LON, 20.0, true),
        sample(target.latitude_deg, target.longitude_deg, 20.0, true),
    ]));
    let config = NavConfig::default();
    let cancel = CancellationToken::new();

    nav::navigate_to_point(
        link.as_ref(),
        &config,
        &cancel,
        target.latitude_deg,
        target.longitude_deg,
        Some(530.0),
        None,
    )
    .await
    .unwrap();

    assert!(link.issued().iter().any(|c| matches!(
        c,
        VehicleCommand::Goto { absolute_altitude_m, .. } if *absolute_altitude_m == 530.0
    )));
}

#[tokio::test(start_paused = true)]
async fn navigation_that_never_arrives_times_out() {
    let link = Arc::new(MockLink::with_samples(vec![sample(
        HOME_LAT, HOME_LON, 20.0, true,
    )]));
    let config = NavConfig::default();
    let cancel = CancellationToken::new();

    let err = nav::navigate_to_point(
        link.as_ref(),
        &config,
        &cancel,
        48.0,
        9.0,
        None,
        None,
    )
    .await
    .unwrap_err();
    assert!(matches!(
        err,
        MissionError::Timeout {
            operation: "navigate",
            ..
        }
    ));
}

#[tokio::test(start_paused = true)]
async fn navigation_reissues_speed_every_poll() {
    let target = Point::new(47.398100, 8.546100);
    let link = Arc::new(MockLink::with_samples(vec![
        sample(HOME_LAT, HOME_LON, 20.0, true),
        sample(47.397800, 8.545700, 20.0, true),
        sample(47.397950, 8.545900, 20.0, true),
        sample(target.latitude_deg, target.longitude_deg, 20.0, true),
    ]));
    let config = NavConfig::default();
    let cancel = CancellationToken::new();

    nav::navigate_to_point(
        link.as_ref(),
        &config,
        &cancel,
        target.latitude_deg,
        target.longitude_deg,
        None,
        Some(7.0),
    )
    .await
    .unwrap();

    // One initial speed command plus one per poll tick.
    let speed_commands = link
        .issued()
        .iter()
        .filter(|c| matches!(c, VehicleCommand::SetSpeed { speed_mps } if *speed_mps == 7.0))
        .count();
    assert_eq!(speed_commands, 4);
}

#[tokio::test(start_paused = true)]
async fn relative_move_projects_from_heading() {
    let mut start = sample(HOME_LAT, HOME_LON, 20.0, true);
    start.heading_deg = 90.0;
    let origin = Point::new(HOME_LAT, HOME_LON);
    let expected = geo::offset(origin, 90.0, 100.0, 0.0);

    let link = Arc::new(MockLink::with_samples(vec![
        start,
        // navigate_to_point samples once more before its poll loop
        start,
        sample(expected.latitude_deg, expected.longitude_deg, 20.0, true),
    ]));
    let config = NavConfig::default();
    let cancel = CancellationToken::new();

    nav::navigate_relative(link.as_ref(), &config, &cancel, 100.0, 0.0, 0.0)
        .await
        .unwrap();

    // Heading east, forward motion must increase longitude only.
    assert!(link.issued().iter().any(|c| matches!(
        c,
        VehicleCommand::Goto { latitude_deg, longitude_deg, .. }
            if *longitude_deg > HOME_LON && (latitude_deg - HOME_LAT).abs() < 1e-6
    )));
}

#[tokio::test(start_paused = true)]
async fn telemetry_loss_surfaces_as_link_error() {
    // Connected, but no position has ever been scripted.
    let link = Arc::new(MockLink::new());
    let config = NavConfig::default();
    let cancel = CancellationToken::new();

    let err = nav::navigate_to_point(link.as_ref(), &config, &cancel, 47.0, 8.0, None, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        MissionError::Link(LinkError::TelemetryLost(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn cancelled_landing_issues_hold() {
    let link = Arc::new(MockLink::with_samples(vec![sample(
        HOME_LAT, HOME_LON, 20.0, true,
    )]));
    let config = NavConfig::default();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = nav::land(link.as_ref(), &config, &cancel).await.unwrap_err();
    assert!(matches!(err, MissionError::Cancelled));
    assert_eq!(link.issued(), vec![VehicleCommand::Land, VehicleCommand::Hold]);
}

#[tokio::test(start_paused = true)]
async fn return_to_launch_completes_on_disarm() {
    let link = Arc::new(MockLink::with_samples(vec![
        sample(47.397800, 8.545700, 15.0, true),
        sample(HOME_LAT, HOME_LON, 3.0, true),
        sample(HOME_LAT, HOME_LON, 0.0, false),
    ]));
    let config = NavConfig::default();
    let cancel = CancellationToken::new();

    let report = nav::return_to_launch(link.as_ref(), &config, &cancel)
        .await
        .unwrap();
    assert_eq!(report.message, "returned to launch and disarmed");
    assert_eq!(link.issued(), vec![VehicleCommand::ReturnToLaunch]);
}

#[tokio::test(start_paused = true)]
async fn landing_completes_on_disarm() {
    let link = Arc::new(MockLink::with_samples(vec![
        sample(HOME_LAT, HOME_LON, 10.0, true),
        sample(HOME_LAT, HOME_LON, 4.0, true),
        sample(HOME_LAT, HOME_LON, 0.0, false),
    ]));
    let config = NavConfig::default();
    let cancel = CancellationToken::new();

    let report = nav::land(link.as_ref(), &config, &cancel).await.unwrap();
    assert_eq!(report.message, "landed and disarmed");
}
