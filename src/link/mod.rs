//! The narrow interface to the autopilot: discrete commands out, pollable
//! telemetry in. The concrete transport is MAVLink (`MavVehicle`); the
//! navigation primitives and the mission machine only see [`VehicleLink`].

pub mod command;
pub mod event_loop;
pub mod state;
pub mod vehicle;

use crate::error::LinkError;
use async_trait::async_trait;

pub use command::VehicleCommand;
pub use state::{HealthReport, LinkState, TelemetrySample};
pub use vehicle::MavVehicle;

/// Command/telemetry channel to the autopilot firmware.
///
/// Telemetry reads are point reads of the freshest available value; the
/// underlying link is a continuous feed, but callers poll it rather than
/// consuming it as a stream. All failures surface as typed [`LinkError`]s.
#[async_trait]
pub trait VehicleLink: Send + Sync {
    /// Whether the link currently has a live connection.
    fn connected(&self) -> bool;

    /// Issue a discrete command and wait for the autopilot to accept it.
    async fn issue(&self, command: VehicleCommand) -> Result<(), LinkError>;

    /// Freshest full telemetry snapshot. Fails with `TelemetryLost` if no
    /// position fix has been received (or the feed has gone quiet).
    async fn sample_position(&self) -> Result<TelemetrySample, LinkError>;

    /// Freshest health gate report.
    async fn sample_health(&self) -> Result<HealthReport, LinkError>;

    /// Freshest armed state.
    async fn sample_armed(&self) -> Result<bool, LinkError> {
        Ok(self.sample_position().await?.armed)
    }

    /// Freshest heading, in degrees.
    async fn sample_heading(&self) -> Result<f64, LinkError> {
        Ok(self.sample_position().await?.heading_deg)
    }
}
