use crate::error::LinkError;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

/// Discrete commands the supervisor can issue to the autopilot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VehicleCommand {
    Arm,
    Disarm,
    /// Take off vertically; altitude rides on the takeoff command itself.
    Takeoff {
        altitude_m: f64,
    },
    SetSpeed {
        speed_mps: f64,
    },
    Goto {
        latitude_deg: f64,
        longitude_deg: f64,
        absolute_altitude_m: f64,
        yaw_deg: f64,
    },
    /// Circle a point at fixed radius/speed, nose held toward the center.
    Orbit {
        latitude_deg: f64,
        longitude_deg: f64,
        radius_m: f64,
        speed_mps: f64,
        absolute_altitude_m: f64,
    },
    Hold,
    Land,
    ReturnToLaunch,
}

impl VehicleCommand {
    pub fn name(&self) -> &'static str {
        match self {
            VehicleCommand::Arm => "arm",
            VehicleCommand::Disarm => "disarm",
            VehicleCommand::Takeoff { .. } => "takeoff",
            VehicleCommand::SetSpeed { .. } => "set_speed",
            VehicleCommand::Goto { .. } => "goto",
            VehicleCommand::Orbit { .. } => "orbit",
            VehicleCommand::Hold => "hold",
            VehicleCommand::Land => "land",
            VehicleCommand::ReturnToLaunch => "return_to_launch",
        }
    }
}

/// Requests travelling from the vehicle handle to the event loop.
pub(crate) enum Request {
    Execute {
        command: VehicleCommand,
        reply: oneshot::Sender<Result<(), LinkError>>,
    },
    Shutdown,
}
