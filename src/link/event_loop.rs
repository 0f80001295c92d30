use crate::config::LinkConfig;
use crate::error::LinkError;
use crate::link::command::{Request, VehicleCommand};
use crate::link::state::{LinkState, StateWriters, SystemStatus, VehicleStatus};
use mavlink::common::{self, MavCmd, MavModeFlag, MavSysStatusSensor};
use mavlink::{AsyncMavConnection, MavHeader};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// ORBIT_YAW_BEHAVIOUR_HOLD_FRONT_TO_CIRCLE_CENTER
const ORBIT_YAW_HOLD_FRONT_TO_CENTER: f32 = 0.0;
/// HOME_POSITION message id, for MAV_CMD_REQUEST_MESSAGE.
const HOME_POSITION_MSG_ID: f32 = 242.0;

type Connection = dyn AsyncMavConnection<common::MavMessage> + Sync + Send;

/// Identity of the remote vehicle, learned from its heartbeats.
#[derive(Debug, Clone, Copy)]
struct VehicleTarget {
    system_id: u8,
    component_id: u8,
}

pub(crate) async fn run_event_loop(
    connection: Box<Connection>,
    mut command_rx: mpsc::Receiver<Request>,
    writers: StateWriters,
    config: LinkConfig,
    cancel: CancellationToken,
) {
    let mut vehicle_target: Option<VehicleTarget> = None;
    let mut home_requested = false;
    // PX4 publishes a prearm sensor bit in SYS_STATUS; until we see it
    // enabled, armable falls back to the heartbeat system status.
    let mut prearm_reported = false;

    let _ = writers.link_state.send(LinkState::Connected);

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("event loop cancelled");
                let _ = writers.link_state.send(LinkState::Disconnected);
                break;
            }
            Some(request) = command_rx.recv() => {
                match request {
                    Request::Shutdown => {
                        debug!("event loop shutdown requested");
                        let _ = writers.link_state.send(LinkState::Disconnected);
                        break;
                    }
                    Request::Execute { command, reply } => {
                        let result = handle_command(
                            command,
                            &*connection,
                            &writers,
                            &mut vehicle_target,
                            &mut prearm_reported,
                            &config,
                            &cancel,
                        ).await;
                        let _ = reply.send(result);
                    }
                }
            }
            result = connection.recv() => {
                match result {
                    Ok((header, msg)) => {
                        update_vehicle_target(&mut vehicle_target, &header, &msg);
                        if !home_requested && config.auto_request_home {
                            if let Some(ref target) = vehicle_target {
                                request_home_position(&*connection, target, &config).await;
                                home_requested = true;
                            }
                        }
                        update_state(&msg, &writers, &mut prearm_reported);
                    }
                    Err(err) => {
                        warn!("MAVLink recv error: {err}");
                        let _ = writers.link_state.send(LinkState::Error(err.to_string()));
                        break;
                    }
                }
            }
        }
    }
}

async fn request_home_position(connection: &Connection, target: &VehicleTarget, config: &LinkConfig) {
    let _ = connection
        .send(
            &gcs_header(config),
            &common::MavMessage::COMMAND_LONG(common::COMMAND_LONG_DATA {
                target_system: target.system_id,
                target_component: target.component_id,
                command: MavCmd::MAV_CMD_REQUEST_MESSAGE,
                confirmation: 0,
                param1: HOME_POSITION_MSG_ID,
                param2: 0.0,
                param3: 0.0,
                param4: 0.0,
                param5: 0.0,
                param6: 0.0,
                param7: 0.0,
            }),
        )
        .await;
}

fn gcs_header(config: &LinkConfig) -> MavHeader {
    MavHeader {
        system_id: config.gcs_system_id,
        component_id: config.gcs_component_id,
        sequence: 0,
    }
}

fn update_vehicle_target(
    vehicle_target: &mut Option<VehicleTarget>,
    header: &MavHeader,
    message: &common::MavMessage,
) {
    if header.system_id == 0 {
        return;
    }

    if matches!(message, common::MavMessage::HEARTBEAT(_)) || vehicle_target.is_none() {
        *vehicle_target = Some(VehicleTarget {
            system_id: header.system_id,
            component_id: header.component_id,
        });
    }
}

fn update_state(message: &common::MavMessage, writers: &StateWriters, prearm_reported: &mut bool) {
    match message {
        common::MavMessage::HEARTBEAT(hb) => {
            let armed = hb
                .base_mode
                .contains(MavModeFlag::MAV_MODE_FLAG_SAFETY_ARMED);
            let system_status = SystemStatus::from_mav(hb.system_status);
            let _ = writers.status.send(VehicleStatus {
                armed,
                custom_mode: hb.custom_mode,
                system_status,
            });
            if !*prearm_reported {
                writers.health.send_modify(|h| {
                    h.armable = matches!(
                        system_status,
                        SystemStatus::Standby | SystemStatus::Active
                    );
                });
            }
        }
        common::MavMessage::GLOBAL_POSITION_INT(data) => {
            writers.telemetry.send_modify(|t| {
                t.latitude_deg = Some(data.lat as f64 / 1e7);
                t.longitude_deg = Some(data.lon as f64 / 1e7);
                t.relative_altitude_m = Some(data.relative_alt as f64 / 1000.0);
                t.absolute_altitude_m = Some(data.alt as f64 / 1000.0);
                let vx = data.vx as f64 / 100.0;
                let vy = data.vy as f64 / 100.0;
                t.speed_mps = Some((vx * vx + vy * vy).sqrt());
                if data.hdg != u16::MAX {
                    t.heading_deg = Some(data.hdg as f64 / 100.0);
                }
            });
        }
        common::MavMessage::VFR_HUD(data) => {
            writers.telemetry.send_modify(|t| {
                t.heading_deg = Some(data.heading as f64);
                t.speed_mps = Some(data.groundspeed as f64);
            });
        }
        common::MavMessage::GPS_RAW_INT(data) => {
            let fix_ok = (data.fix_type as u8) >= 3;
            writers.health.send_modify(|h| h.gps_ok = fix_ok);
        }
        common::MavMessage::SYS_STATUS(data) => {
            let enabled = data.onboard_control_sensors_enabled;
            let healthy = data.onboard_control_sensors_health;
            if enabled.contains(MavSysStatusSensor::MAV_SYS_STATUS_PREARM_CHECK) {
                *prearm_reported = true;
                writers.health.send_modify(|h| {
                    h.armable = healthy.contains(MavSysStatusSensor::MAV_SYS_STATUS_PREARM_CHECK);
                });
            }
            if enabled.contains(MavSysStatusSensor::MAV_SYS_STATUS_SENSOR_GPS) {
                writers.health.send_modify(|h| {
                    h.gps_ok = healthy.contains(MavSysStatusSensor::MAV_SYS_STATUS_SENSOR_GPS);
                });
            }
        }
        common::MavMessage::HOME_POSITION(_) => {
            writers.health.send_modify(|h| h.home_ok = true);
        }
        _ => {
            trace!("unhandled message type");
        }
    }
}

// ---------------------------------------------------------------------------
// Command handling
// ---------------------------------------------------------------------------

async fn handle_command(
    command: VehicleCommand,
    connection: &Connection,
    writers: &StateWriters,
    vehicle_target: &mut Option<VehicleTarget>,
    prearm_reported: &mut bool,
    config: &LinkConfig,
    cancel: &CancellationToken,
) -> Result<(), LinkError> {
    let target = vehicle_target.ok_or(LinkError::IdentityUnknown)?;

    match command {
        VehicleCommand::Arm => {
            command_long_ack(
                MavCmd::MAV_CMD_COMPONENT_ARM_DISARM,
                [1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
                target,
                connection,
                writers,
                vehicle_target,
                prearm_reported,
                config,
                cancel,
            )
            .await
        }
        VehicleCommand::Disarm => {
            command_long_ack(
                MavCmd::MAV_CMD_COMPONENT_ARM_DISARM,
                [0.0; 7],
                target,
                connection,
                writers,
                vehicle_target,
                prearm_reported,
                config,
                cancel,
            )
            .await
        }
        VehicleCommand::Takeoff { altitude_m } => {
            command_long_ack(
                MavCmd::MAV_CMD_NAV_TAKEOFF,
                [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, altitude_m as f32],
                target,
                connection,
                writers,
                vehicle_target,
                prearm_reported,
                config,
                cancel,
            )
            .await
        }
        VehicleCommand::SetSpeed { speed_mps } => {
            // param1 = 1 selects groundspeed; param3 = -1 leaves throttle alone.
            command_long_ack(
                MavCmd::MAV_CMD_DO_CHANGE_SPEED,
                [1.0, speed_mps as f32, -1.0, 0.0, 0.0, 0.0, 0.0],
                target,
                connection,
                writers,
                vehicle_target,
                prearm_reported,
                config,
                cancel,
            )
            .await
        }
        VehicleCommand::Goto {
            latitude_deg,
            longitude_deg,
            absolute_altitude_m,
            yaw_deg,
        } => {
            handle_guided_goto(
                latitude_deg,
                longitude_deg,
                absolute_altitude_m,
                yaw_deg,
                target,
                connection,
                config,
            )
            .await
        }
        VehicleCommand::Orbit {
            latitude_deg,
            longitude_deg,
            radius_m,
            speed_mps,
            absolute_altitude_m,
        } => {
            // DO_ORBIT carries its coordinates in the integer fields of
            // COMMAND_INT; COMMAND_LONG would squeeze them through f32.
            command_int_ack(
                common::COMMAND_INT_DATA {
                    param1: radius_m as f32,
                    param2: speed_mps as f32,
                    param3: ORBIT_YAW_HOLD_FRONT_TO_CENTER,
                    param4: 0.0,
                    x: (latitude_deg * 1e7) as i32,
                    y: (longitude_deg * 1e7) as i32,
                    z: absolute_altitude_m as f32,
                    command: MavCmd::MAV_CMD_DO_ORBIT,
                    target_system: target.system_id,
                    target_component: target.component_id,
                    frame: common::MavFrame::MAV_FRAME_GLOBAL_INT,
                    current: 0,
                    autocontinue: 0,
                },
                connection,
                writers,
                vehicle_target,
                prearm_reported,
                config,
                cancel,
            )
            .await
        }
        VehicleCommand::Hold => {
            command_long_ack(
                MavCmd::MAV_CMD_DO_PAUSE_CONTINUE,
                [0.0; 7],
                target,
                connection,
                writers,
                vehicle_target,
                prearm_reported,
                config,
                cancel,
            )
            .await
        }
        VehicleCommand::Land => {
            command_long_ack(
                MavCmd::MAV_CMD_NAV_LAND,
                [0.0; 7],
                target,
                connection,
                writers,
                vehicle_target,
                prearm_reported,
                config,
                cancel,
            )
            .await
        }
        VehicleCommand::ReturnToLaunch => {
            command_long_ack(
                MavCmd::MAV_CMD_NAV_RETURN_TO_LAUNCH,
                [0.0; 7],
                target,
                connection,
                writers,
                vehicle_target,
                prearm_reported,
                config,
                cancel,
            )
            .await
        }
    }
}

async fn send_message(
    connection: &Connection,
    config: &LinkConfig,
    message: common::MavMessage,
) -> Result<(), LinkError> {
    connection
        .send(&gcs_header(config), &message)
        .await
        .map(|_| ())
        .map_err(|err| {
            LinkError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                err.to_string(),
            ))
        })
}

// ---------------------------------------------------------------------------
// Guided goto (fire-and-forget setpoint)
// ---------------------------------------------------------------------------

async fn handle_guided_goto(
    latitude_deg: f64,
    longitude_deg: f64,
    absolute_altitude_m: f64,
    yaw_deg: f64,
    target: VehicleTarget,
    connection: &Connection,
    config: &LinkConfig,
) -> Result<(), LinkError> {
    let type_mask = common::PositionTargetTypemask::from_bits_truncate(0x07F8);

    send_message(
        connection,
        config,
        common::MavMessage::SET_POSITION_TARGET_GLOBAL_INT(
            common::SET_POSITION_TARGET_GLOBAL_INT_DATA {
                time_boot_ms: 0,
                target_system: target.system_id,
                target_component: target.component_id,
                coordinate_frame: common::MavFrame::MAV_FRAME_GLOBAL_INT,
                type_mask,
                lat_int: (latitude_deg * 1e7) as i32,
                lon_int: (longitude_deg * 1e7) as i32,
                alt: absolute_altitude_m as f32,
                vx: 0.0,
                vy: 0.0,
                vz: 0.0,
                afx: 0.0,
                afy: 0.0,
                afz: 0.0,
                yaw: (yaw_deg as f32).to_radians(),
                yaw_rate: 0.0,
            },
        ),
    )
    .await
}

// ---------------------------------------------------------------------------
// Acknowledged commands (send, await COMMAND_ACK, retry on timeout)
// ---------------------------------------------------------------------------

#[allow(clippy::too_many_arguments)]
async fn command_long_ack(
    command: MavCmd,
    params: [f32; 7],
    target: VehicleTarget,
    connection: &Connection,
    writers: &StateWriters,
    vehicle_target: &mut Option<VehicleTarget>,
    prearm_reported: &mut bool,
    config: &LinkConfig,
    cancel: &CancellationToken,
) -> Result<(), LinkError> {
    let message = common::MavMessage::COMMAND_LONG(common::COMMAND_LONG_DATA {
        target_system: target.system_id,
        target_component: target.component_id,
        command,
        confirmation: 0,
        param1: params[0],
        param2: params[1],
        param3: params[2],
        param4: params[3],
        param5: params[4],
        param6: params[5],
        param7: params[6],
    });
    send_with_ack(
        message,
        command,
        connection,
        writers,
        vehicle_target,
        prearm_reported,
        config,
        cancel,
    )
    .await
}

#[allow(clippy::too_many_arguments)]
async fn command_int_ack(
    data: common::COMMAND_INT_DATA,
    connection: &Connection,
    writers: &StateWriters,
    vehicle_target: &mut Option<VehicleTarget>,
    prearm_reported: &mut bool,
    config: &LinkConfig,
    cancel: &CancellationToken,
) -> Result<(), LinkError> {
    let command = data.command;
    send_with_ack(
        common::MavMessage::COMMAND_INT(data),
        command,
        connection,
        writers,
        vehicle_target,
        prearm_reported,
        config,
        cancel,
    )
    .await
}

/// Sends `message`, then waits for a matching COMMAND_ACK, resending on
/// timeout up to the retry budget. Telemetry received while waiting keeps
/// flowing into the state writers.
#[allow(clippy::too_many_arguments)]
async fn send_with_ack(
    message: common::MavMessage,
    command: MavCmd,
    connection: &Connection,
    writers: &StateWriters,
    vehicle_target: &mut Option<VehicleTarget>,
    prearm_reported: &mut bool,
    config: &LinkConfig,
    cancel: &CancellationToken,
) -> Result<(), LinkError> {
    let retry_policy = &config.retry_policy;
    for _attempt in 0..=retry_policy.max_retries {
        send_message(connection, config, message.clone()).await?;

        let timeout = Duration::from_millis(retry_policy.request_timeout_ms);
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(LinkError::Cancelled),
                _ = &mut deadline => break, // retry
                result = connection.recv() => {
                    let (header, msg) = result.map_err(|err| {
                        LinkError::Io(std::io::Error::new(std::io::ErrorKind::Other, err.to_string()))
                    })?;
                    update_vehicle_target(vehicle_target, &header, &msg);
                    update_state(&msg, writers, prearm_reported);
                    if let common::MavMessage::COMMAND_ACK(ack) = &msg {
                        if ack.command == command {
                            if ack.result == common::MavResult::MAV_RESULT_ACCEPTED {
                                return Ok(());
                            }
                            return Err(LinkError::CommandRejected {
                                command: format!("{command:?}"),
                                reason: format!("{:?}", ack.result),
                            });
                        }
                    }
                }
            }
        }
    }

    Err(LinkError::Timeout)
}
