use crate::config::LinkConfig;
use crate::error::LinkError;
use crate::link::command::{Request, VehicleCommand};
use crate::link::event_loop::run_event_loop;
use crate::link::state::{
    create_channels, HealthReport, LinkState, StateChannels, TelemetrySample,
};
use crate::link::VehicleLink;
use async_trait::async_trait;
use mavlink::common;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// Async MAVLink vehicle handle.
///
/// `MavVehicle` is `Clone + Send + Sync`; clones share the same connection.
/// When the last clone is dropped, the event loop is cancelled.
#[derive(Clone)]
pub struct MavVehicle {
    inner: Arc<VehicleInner>,
}

struct VehicleInner {
    command_tx: mpsc::Sender<Request>,
    cancel: CancellationToken,
    channels: StateChannels,
}

impl Drop for VehicleInner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl MavVehicle {
    /// Connect using a mavlink address string (e.g. `udpin:0.0.0.0:14540`).
    /// Waits for the first HEARTBEAT before returning.
    pub async fn connect(address: &str) -> Result<Self, LinkError> {
        Self::connect_with_config(address, LinkConfig::default()).await
    }

    /// Connect via UDP. `bind_addr` is `host:port` to bind to.
    pub async fn connect_udp(bind_addr: &str) -> Result<Self, LinkError> {
        Self::connect(&format!("udpin:{bind_addr}")).await
    }

    /// Connect with a custom `LinkConfig`.
    pub async fn connect_with_config(
        address: &str,
        config: LinkConfig,
    ) -> Result<Self, LinkError> {
        let connection = mavlink::connect_async::<common::MavMessage>(address)
            .await
            .map_err(|err| LinkError::ConnectionFailed(err.to_string()))?;

        let (writers, channels) = create_channels();
        let cancel = CancellationToken::new();
        let (command_tx, command_rx) = mpsc::channel(config.command_buffer_size);
        let connect_timeout = config.connect_timeout;

        tokio::spawn(run_event_loop(
            connection,
            command_rx,
            writers,
            config,
            cancel.clone(),
        ));

        let vehicle = MavVehicle {
            inner: Arc::new(VehicleInner {
                command_tx,
                cancel,
                channels,
            }),
        };

        // Wait for the first heartbeat (status watch leaves its default).
        let mut status_rx = vehicle.inner.channels.status.clone();
        let heartbeat_wait = async {
            loop {
                status_rx
                    .changed()
                    .await
                    .map_err(|_| LinkError::Disconnected)?;
                let status = status_rx.borrow().clone();
                if status.system_status != crate::link::state::SystemStatus::Unknown {
                    return Ok::<(), LinkError>(());
                }
            }
        };

        tokio::select! {
            result = heartbeat_wait => result?,
            _ = tokio::time::sleep(connect_timeout) => {
                return Err(LinkError::Timeout);
            }
        }

        Ok(vehicle)
    }

    /// Gracefully disconnect from the vehicle.
    pub async fn disconnect(self) -> Result<(), LinkError> {
        let _ = self.inner.command_tx.send(Request::Shutdown).await;
        Ok(())
    }

    async fn send_request(&self, command: VehicleCommand) -> Result<(), LinkError> {
        let (tx, rx) = oneshot::channel();
        self.inner
            .command_tx
            .send(Request::Execute { command, reply: tx })
            .await
            .map_err(|_| LinkError::Disconnected)?;
        rx.await.map_err(|_| LinkError::Disconnected)?
    }
}

#[async_trait]
impl VehicleLink for MavVehicle {
    fn connected(&self) -> bool {
        *self.inner.channels.link_state.borrow() == LinkState::Connected
    }

    async fn issue(&self, command: VehicleCommand) -> Result<(), LinkError> {
        self.send_request(command).await
    }

    async fn sample_position(&self) -> Result<TelemetrySample, LinkError> {
        if !self.connected() {
            return Err(LinkError::Disconnected);
        }
        let raw = self.inner.channels.telemetry.borrow().clone();
        let status = self.inner.channels.status.borrow().clone();
        let health = *self.inner.channels.health.borrow();

        match (raw.latitude_deg, raw.longitude_deg) {
            (Some(latitude_deg), Some(longitude_deg)) => Ok(TelemetrySample {
                latitude_deg,
                longitude_deg,
                relative_altitude_m: raw.relative_altitude_m.unwrap_or(0.0),
                absolute_altitude_m: raw.absolute_altitude_m.unwrap_or(0.0),
                heading_deg: raw.heading_deg.unwrap_or(0.0),
                armed: status.armed,
                health,
            }),
            _ => Err(LinkError::TelemetryLost(
                "no position fix received yet".to_string(),
            )),
        }
    }

    async fn sample_health(&self) -> Result<HealthReport, LinkError> {
        if !self.connected() {
            return Err(LinkError::Disconnected);
        }
        Ok(*self.inner.channels.health.borrow())
    }

    async fn sample_armed(&self) -> Result<bool, LinkError> {
        if !self.connected() {
            return Err(LinkError::Disconnected);
        }
        Ok(self.inner.channels.status.borrow().armed)
    }
}
