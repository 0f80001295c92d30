use std::time::Duration;

/// Retransmission policy for commands awaiting an acknowledgement.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub request_timeout_ms: u64,
    pub max_retries: u8,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            request_timeout_ms: 1500,
            max_retries: 5,
        }
    }
}

/// Configuration for the MAVLink vehicle link.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    pub gcs_system_id: u8,
    pub gcs_component_id: u8,
    pub retry_policy: RetryPolicy,
    pub auto_request_home: bool,
    pub command_buffer_size: usize,
    pub connect_timeout: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            gcs_system_id: 255,
            gcs_component_id: 190,
            retry_policy: RetryPolicy::default(),
            auto_request_home: true,
            command_buffer_size: 32,
            connect_timeout: Duration::from_secs(30),
        }
    }
}

/// Tunables for the navigation primitives.
///
/// The poll interval doubles as the heartbeat period: during a navigation
/// leg the speed command is re-issued every tick so the autopilot cannot
/// quietly revert it. Every long-running wait carries an explicit bound;
/// exceeding it produces a `Timeout` outcome rather than hanging forever.
#[derive(Debug, Clone)]
pub struct NavConfig {
    pub poll_interval: Duration,
    pub arrival_threshold_m: f64,
    pub altitude_reached_factor: f64,
    pub default_speed_mps: f64,
    pub orbit_duration: Duration,
    pub stabilize_delay: Duration,
    pub arm_settle_delay: Duration,
    pub preflight_attempts: u32,
    pub preflight_interval: Duration,
    pub takeoff_timeout: Duration,
    pub navigate_timeout: Duration,
    pub land_timeout: Duration,
}

impl Default for NavConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            arrival_threshold_m: 5.0,
            altitude_reached_factor: 0.95,
            default_speed_mps: 5.0,
            orbit_duration: Duration::from_secs(60),
            stabilize_delay: Duration::from_secs(2),
            arm_settle_delay: Duration::from_secs(1),
            preflight_attempts: 30,
            preflight_interval: Duration::from_secs(1),
            takeoff_timeout: Duration::from_secs(120),
            navigate_timeout: Duration::from_secs(600),
            land_timeout: Duration::from_secs(300),
        }
    }
}
