#![allow(dead_code)]

//! Scripted stand-ins for the vehicle link, geocoder, and planner.

use async_trait::async_trait;
use skipper::error::{LinkError, MissionError};
use skipper::geocode::{Geocoder, ResolvedLocation};
use skipper::link::{HealthReport, TelemetrySample, VehicleCommand, VehicleLink};
use skipper::planner::MissionPlanner;
use std::collections::VecDeque;
use std::sync::Mutex;

/// SITL default home.
pub const HOME_LAT: f64 = 47.397742;
pub const HOME_LON: f64 = 8.545594;
/// Terrain altitude AMSL underneath the test home.
pub const HOME_AMSL_M: f64 = 488.0;

pub fn healthy() -> HealthReport {
    HealthReport {
        gps_ok: true,
        home_ok: true,
        armable: true,
    }
}

pub fn sample(latitude_deg: f64, longitude_deg: f64, relative_altitude_m: f64, armed: bool) -> TelemetrySample {
    TelemetrySample {
        latitude_deg,
        longitude_deg,
        relative_altitude_m,
        absolute_altitude_m: HOME_AMSL_M + relative_altitude_m,
        heading_deg: 0.0,
        armed,
        health: healthy(),
    }
}

/// Vehicle link that serves pre-scripted telemetry and records every
/// command it is asked to issue. Queues hold their last element once
/// drained down to one, so a "steady state" sample can be scripted by
/// simply putting it last.
pub struct MockLink {
    connected: bool,
    samples: Mutex<VecDeque<TelemetrySample>>,
    health: Mutex<VecDeque<HealthReport>>,
    issued: Mutex<Vec<VehicleCommand>>,
}

impl MockLink {
    pub fn new() -> Self {
        Self {
            connected: true,
            samples: Mutex::new(VecDeque::new()),
            health: Mutex::new(VecDeque::from([healthy()])),
            issued: Mutex::new(Vec::new()),
        }
    }

    pub fn with_samples(samples: Vec<TelemetrySample>) -> Self {
        let link = Self::new();
        *link.samples.lock().unwrap() = samples.into();
        link
    }

    pub fn with_health(self, reports: Vec<HealthReport>) -> Self {
        *self.health.lock().unwrap() = reports.into();
        self
    }

    pub fn disconnected() -> Self {
        let mut link = Self::new();
        link.connected = false;
        link
    }

    pub fn issued(&self) -> Vec<VehicleCommand> {
        self.issued.lock().unwrap().clone()
    }

    fn next_from<T: Clone>(queue: &Mutex<VecDeque<T>>) -> Option<T> {
        let mut queue = queue.lock().unwrap();
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[async_trait]
impl VehicleLink for MockLink {
    fn connected(&self) -> bool {
        self.connected
    }

    async fn issue(&self, command: VehicleCommand) -> Result<(), LinkError> {
        self.issued.lock().unwrap().push(command);
        Ok(())
    }

    async fn sample_position(&self) -> Result<TelemetrySample, LinkError> {
        if !self.connected {
            return Err(LinkError::Disconnected);
        }
        Self::next_from(&self.samples)
            .ok_or_else(|| LinkError::TelemetryLost("no scripted sample".to_string()))
    }

    async fn sample_health(&self) -> Result<HealthReport, LinkError> {
        if !self.connected {
            return Err(LinkError::Disconnected);
        }
        Self::next_from(&self.health)
            .ok_or_else(|| LinkError::TelemetryLost("no scripted health".to_string()))
    }
}

/// Geocoder returning one fixed location and recording the queries made.
pub struct MockGeocoder {
    location: ResolvedLocation,
    queries: Mutex<Vec<String>>,
}

impl MockGeocoder {
    pub fn returning(latitude_deg: f64, longitude_deg: f64, label: &str) -> Self {
        Self {
            location: ResolvedLocation {
                latitude_deg,
                longitude_deg,
                label: label.to_string(),
            },
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl Geocoder for MockGeocoder {
    async fn resolve(&self, location_name: &str) -> Result<ResolvedLocation, MissionError> {
        self.queries.lock().unwrap().push(location_name.to_string());
        Ok(self.location.clone())
    }
}

/// Planner that replays a canned completion.
pub struct MockPlanner {
    completion: String,
}

impl MockPlanner {
    pub fn replying(completion: &str) -> Self {
        Self {
            completion: completion.to_string(),
        }
    }
}

#[async_trait]
impl MissionPlanner for MockPlanner {
    async fn plan(&self, _instruction: &str, _catalog: &str) -> Result<String, MissionError> {
        Ok(self.completion.clone())
    }
}
