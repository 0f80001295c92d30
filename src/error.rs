use std::time::Duration;

/// Faults on the vehicle command/telemetry channel.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("vehicle link disconnected")]
    Disconnected,
    #[error("operation timed out")]
    Timeout,
    #[error("operation cancelled")]
    Cancelled,
    #[error("command {command} rejected: {reason}")]
    CommandRejected { command: String, reason: String },
    #[error("telemetry lost: {0}")]
    TelemetryLost(String),
    #[error("no heartbeat received yet")]
    IdentityUnknown,
    #[error("MAVLink I/O: {0}")]
    Io(#[from] std::io::Error),
}

/// Faults at the mission level. Each variant maps to a distinguishable
/// step outcome message; none silently downgrade to success.
#[derive(Debug, thiserror::Error)]
pub enum MissionError {
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error("preflight gate failed: {0}")]
    Precondition(String),
    #[error("planner error: {0}")]
    Planner(String),
    #[error("plan rejected: {0}")]
    PlanValidation(String),
    #[error("argument resolution failed: {0}")]
    ArgumentResolution(String),
    #[error("geocoding failed: {0}")]
    Geocode(String),
    #[error("{operation} did not complete within {}s", .limit.as_secs())]
    Timeout {
        operation: &'static str,
        limit: Duration,
    },
    #[error("mission cancelled")]
    Cancelled,
}

impl MissionError {
    /// Whether this failure ends the whole operator session rather than
    /// just the current mission.
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            MissionError::Link(LinkError::ConnectionFailed(_))
                | MissionError::Link(LinkError::Disconnected)
        )
    }
}
