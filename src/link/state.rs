use serde::{Deserialize, Serialize};

/// Point-in-time snapshot of vehicle position and state, as handed to the
/// navigation primitives. Never mutated, only superseded by the next sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub relative_altitude_m: f64,
    pub absolute_altitude_m: f64,
    pub heading_deg: f64,
    pub armed: bool,
    pub health: HealthReport,
}

/// The preflight health gate: all three must hold before arming.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub gps_ok: bool,
    pub home_ok: bool,
    pub armable: bool,
}

impl HealthReport {
    pub fn all_ok(&self) -> bool {
        self.gps_ok && self.home_ok && self.armable
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    Connecting,
    Connected,
    Disconnected,
    Error(String),
}

impl Default for LinkState {
    fn default() -> Self {
        LinkState::Connecting
    }
}

/// Raw telemetry accumulated by the event loop. Fields stay `None` until
/// the corresponding message has been seen at least once.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTelemetry {
    pub latitude_deg: Option<f64>,
    pub longitude_deg: Option<f64>,
    pub relative_altitude_m: Option<f64>,
    pub absolute_altitude_m: Option<f64>,
    pub heading_deg: Option<f64>,
    pub speed_mps: Option<f64>,
}

/// Armed/status flags from the vehicle heartbeat.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VehicleStatus {
    pub armed: bool,
    pub custom_mode: u32,
    pub system_status: SystemStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemStatus {
    #[default]
    Unknown,
    Boot,
    Calibrating,
    Standby,
    Active,
    Critical,
    Emergency,
    Poweroff,
}

impl SystemStatus {
    pub(crate) fn from_mav(status: mavlink::common::MavState) -> Self {
        use mavlink::common::MavState;
        match status {
            MavState::MAV_STATE_BOOT => SystemStatus::Boot,
            MavState::MAV_STATE_CALIBRATING => SystemStatus::Calibrating,
            MavState::MAV_STATE_STANDBY => SystemStatus::Standby,
            MavState::MAV_STATE_ACTIVE => SystemStatus::Active,
            MavState::MAV_STATE_CRITICAL => SystemStatus::Critical,
            MavState::MAV_STATE_EMERGENCY => SystemStatus::Emergency,
            MavState::MAV_STATE_POWEROFF => SystemStatus::Poweroff,
            _ => SystemStatus::Unknown,
        }
    }
}

/// Writer side of the link's watch channels (owned by the event loop).
pub(crate) struct StateWriters {
    pub telemetry: tokio::sync::watch::Sender<RawTelemetry>,
    pub status: tokio::sync::watch::Sender<VehicleStatus>,
    pub health: tokio::sync::watch::Sender<HealthReport>,
    pub link_state: tokio::sync::watch::Sender<LinkState>,
}

/// Reader side, held by the vehicle handle.
pub(crate) struct StateChannels {
    pub telemetry: tokio::sync::watch::Receiver<RawTelemetry>,
    pub status: tokio::sync::watch::Receiver<VehicleStatus>,
    pub health: tokio::sync::watch::Receiver<HealthReport>,
    pub link_state: tokio::sync::watch::Receiver<LinkState>,
}

pub(crate) fn create_channels() -> (StateWriters, StateChannels) {
    let (telem_tx, telem_rx) = tokio::sync::watch::channel(RawTelemetry::default());
    let (status_tx, status_rx) = tokio::sync::watch::channel(VehicleStatus::default());
    let (health_tx, health_rx) = tokio::sync::watch::channel(HealthReport::default());
    let (ls_tx, ls_rx) = tokio::sync::watch::channel(LinkState::Connecting);

    let writers = StateWriters {
        telemetry: telem_tx,
        status: status_tx,
        health: health_tx,
        link_state: ls_tx,
    };

    let channels = StateChannels {
        telemetry: telem_rx,
        status: status_rx,
        health: health_rx,
        link_state: ls_rx,
    };

    (writers, channels)
}
