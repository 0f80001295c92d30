//! Navigation primitives: self-contained flight procedures built on the
//! vehicle link. Each primitive samples telemetry, issues commands, and
//! polls until its completion condition holds, its deadline passes, or the
//! mission is cancelled.

use crate::config::NavConfig;
use crate::error::MissionError;
use crate::geo::{self, Point};
use crate::link::{VehicleCommand, VehicleLink};
use serde_json::json;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// What a completed primitive reports back to the mission log.
#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    pub message: String,
    pub payload: Option<serde_json::Value>,
}

impl StepReport {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            payload: None,
        }
    }

    fn with_payload(message: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            message: message.into(),
            payload: Some(payload),
        }
    }
}

/// Sleeps for `delay`, returning `true` if cancellation fired first.
async fn pace(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => true,
        _ = sleep(delay) => false,
    }
}

/// Brings the vehicle to a stop (best effort) and reports cancellation.
async fn halted(link: &dyn VehicleLink) -> Result<StepReport, MissionError> {
    if let Err(err) = link.issue(VehicleCommand::Hold).await {
        warn!(error = %err, "hold command failed during cancellation");
    }
    Err(MissionError::Cancelled)
}

/// Waits for the health gate to pass: GPS fix, home position, and the
/// autopilot reporting armable. A vehicle that reports not-armable fails
/// immediately; GPS and home are given time to converge.
pub async fn preflight_check(
    link: &dyn VehicleLink,
    config: &NavConfig,
    cancel: &CancellationToken,
) -> Result<StepReport, MissionError> {
    if !link.connected() {
        return Err(MissionError::Precondition(
            "vehicle link is not connected".to_string(),
        ));
    }

    for attempt in 0..config.preflight_attempts {
        let health = link.sample_health().await?;
        if !health.armable {
            return Err(MissionError::Precondition(
                "autopilot reports vehicle is not armable".to_string(),
            ));
        }
        if health.all_ok() {
            debug!(attempt, "preflight health gate passed");
            return Ok(StepReport::new("all preflight checks passed"));
        }
        debug!(
            attempt,
            gps_ok = health.gps_ok,
            home_ok = health.home_ok,
            "waiting for preflight health"
        );
        if pace(config.preflight_interval, cancel).await {
            return halted(link).await;
        }
    }

    Err(MissionError::Precondition(format!(
        "health checks did not pass after {} attempts",
        config.preflight_attempts
    )))
}

/// Arms the vehicle and climbs to `altitude_m` above home. Completes once
/// relative altitude reaches the configured fraction of the target.
pub async fn arm_and_takeoff(
    link: &dyn VehicleLink,
    config: &NavConfig,
    cancel: &CancellationToken,
    altitude_m: f64,
) -> Result<StepReport, MissionError> {
    link.issue(VehicleCommand::Arm).await?;
    if pace(config.arm_settle_delay, cancel).await {
        return halted(link).await;
    }

    link.issue(VehicleCommand::Takeoff { altitude_m }).await?;

    let target = config.altitude_reached_factor * altitude_m;
    let deadline = Instant::now() + config.takeoff_timeout;
    loop {
        if pace(config.poll_interval, cancel).await {
            return halted(link).await;
        }
        let sample = link.sample_position().await?;
        debug!(
            relative_altitude_m = sample.relative_altitude_m,
            target, "climbing"
        );
        if sample.relative_altitude_m >= target {
            return Ok(StepReport::with_payload(
                format!("takeoff complete at {:.1} m", sample.relative_altitude_m),
                json!({ "altitude_m": sample.relative_altitude_m }),
            ));
        }
        if Instant::now() >= deadline {
            return Err(MissionError::Timeout {
                operation: "takeoff",
                limit: config.takeoff_timeout,
            });
        }
    }
}

/// Flies to an absolute coordinate in guided mode and polls until within
/// the arrival threshold. `altitude_m`, when given, is absolute altitude
/// AMSL; when omitted the current absolute altitude is held. The speed
/// command is re-issued every poll tick so a mode change cannot silently
/// revert it.
pub async fn navigate_to_point(
    link: &dyn VehicleLink,
    config: &NavConfig,
    cancel: &CancellationToken,
    latitude_deg: f64,
    longitude_deg: f64,
    altitude_m: Option<f64>,
    speed_mps: Option<f64>,
) -> Result<StepReport, MissionError> {
    let sample = link.sample_position().await?;
    let absolute_altitude_m = altitude_m.unwrap_or(sample.absolute_altitude_m);
    let speed = speed_mps.unwrap_or(config.default_speed_mps);
    let target = Point::new(latitude_deg, longitude_deg);

    link.issue(VehicleCommand::SetSpeed { speed_mps: speed })
        .await?;
    link.issue(VehicleCommand::Goto {
        latitude_deg,
        longitude_deg,
        absolute_altitude_m,
        yaw_deg: 0.0,
    })
    .await?;

    let deadline = Instant::now() + config.navigate_timeout;
    loop {
        if pace(config.poll_interval, cancel).await {
            return halted(link).await;
        }
        // Speed heartbeat; the goto itself stays latched in the autopilot.
        link.issue(VehicleCommand::SetSpeed { speed_mps: speed })
            .await?;
        let sample = link.sample_position().await?;
        let here = Point::new(sample.latitude_deg, sample.longitude_deg);
        let remaining = geo::distance_m(here, target);
        debug!(remaining_m = remaining, "en route");
        if remaining < config.arrival_threshold_m {
            break;
        }
        if Instant::now() >= deadline {
            return Err(MissionError::Timeout {
                operation: "navigate",
                limit: config.navigate_timeout,
            });
        }
    }

    if pace(config.stabilize_delay, cancel).await {
        return halted(link).await;
    }

    Ok(StepReport::with_payload(
        format!("arrived at {latitude_deg:.6}, {longitude_deg:.6}"),
        json!({ "latitude": latitude_deg, "longitude": longitude_deg }),
    ))
}

/// Displaces the vehicle relative to its current position and heading,
/// then delegates to [`navigate_to_point`].
pub async fn navigate_relative(
    link: &dyn VehicleLink,
    config: &NavConfig,
    cancel: &CancellationToken,
    forward_m: f64,
    right_m: f64,
    down_m: f64,
) -> Result<StepReport, MissionError> {
    let sample = link.sample_position().await?;
    let origin = Point::new(sample.latitude_deg, sample.longitude_deg);
    let target = geo::offset(origin, sample.heading_deg, forward_m, right_m);
    let absolute_altitude_m = sample.absolute_altitude_m - down_m;

    debug!(
        latitude = target.latitude_deg,
        longitude = target.longitude_deg,
        absolute_altitude_m,
        "relative move projected"
    );

    navigate_to_point(
        link,
        config,
        cancel,
        target.latitude_deg,
        target.longitude_deg,
        Some(absolute_altitude_m),
        None,
    )
    .await
}

/// Circles a point for the configured orbit duration with the nose held
/// toward the center, then commands a hold at the current position.
pub async fn orbit(
    link: &dyn VehicleLink,
    config: &NavConfig,
    cancel: &CancellationToken,
    latitude_deg: f64,
    longitude_deg: f64,
    radius_m: f64,
    speed_mps: Option<f64>,
) -> Result<StepReport, MissionError> {
    let sample = link.sample_position().await?;
    let speed = speed_mps.unwrap_or(config.default_speed_mps);

    link.issue(VehicleCommand::Orbit {
        latitude_deg,
        longitude_deg,
        radius_m,
        speed_mps: speed,
        absolute_altitude_m: sample.absolute_altitude_m,
    })
    .await?;

    if pace(config.orbit_duration, cancel).await {
        return halted(link).await;
    }

    link.issue(VehicleCommand::Hold).await?;
    if pace(config.stabilize_delay, cancel).await {
        return halted(link).await;
    }

    Ok(StepReport::with_payload(
        format!(
            "orbit of {radius_m:.0} m radius complete after {}s",
            config.orbit_duration.as_secs()
        ),
        json!({ "latitude": latitude_deg, "longitude": longitude_deg, "radius_m": radius_m }),
    ))
}

/// Lands at the current position. Completion is confirmed by disarm.
pub async fn land(
    link: &dyn VehicleLink,
    config: &NavConfig,
    cancel: &CancellationToken,
) -> Result<StepReport, MissionError> {
    link.issue(VehicleCommand::Land).await?;
    wait_for_disarm(link, config, cancel, "land").await?;
    Ok(StepReport::new("landed and disarmed"))
}

/// Returns to the launch point and lands. Completion is confirmed by disarm.
pub async fn return_to_launch(
    link: &dyn VehicleLink,
    config: &NavConfig,
    cancel: &CancellationToken,
) -> Result<StepReport, MissionError> {
    link.issue(VehicleCommand::ReturnToLaunch).await?;
    wait_for_disarm(link, config, cancel, "return_to_launch").await?;
    Ok(StepReport::new("returned to launch and disarmed"))
}

async fn wait_for_disarm(
    link: &dyn VehicleLink,
    config: &NavConfig,
    cancel: &CancellationToken,
    operation: &'static str,
) -> Result<(), MissionError> {
    let deadline = Instant::now() + config.land_timeout;
    loop {
        if pace(config.poll_interval, cancel).await {
            return halted(link).await.map(|_| ());
        }
        if !link.sample_armed().await? {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(MissionError::Timeout {
                operation,
                limit: config.land_timeout,
            });
        }
    }
}
