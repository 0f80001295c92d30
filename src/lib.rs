//! Mission supervisor for remotely piloted vehicles.
//!
//! One freeform operator instruction goes in; a language model turns it
//! into a JSON mission plan over a closed action vocabulary; the plan is
//! validated, then executed step by step over a MAVLink vehicle link with
//! bounded, cancellable navigation primitives.

pub mod config;
pub mod error;
pub mod geo;
pub mod geocode;
pub mod link;
pub mod mission;
pub mod nav;
pub mod plan;
pub mod planner;
pub mod session;

pub use config::{LinkConfig, NavConfig, RetryPolicy};
pub use error::{LinkError, MissionError};
pub use geocode::{Geocoder, NominatimGeocoder, ResolvedLocation};
pub use link::{
    HealthReport, LinkState, MavVehicle, TelemetrySample, VehicleCommand, VehicleLink,
};
pub use mission::{
    MissionPhase, MissionReport, MissionRunner, StepOutcome, StepStatus,
};
pub use plan::{ActionKind, MissionPlan, MissionStep};
pub use planner::{MissionPlanner, OllamaPlanner};
pub use session::Session;
