//! Mission execution: the plan→dispatch→observe state machine that walks a
//! validated plan one step at a time, halting on the first non-success.

use crate::config::NavConfig;
use crate::error::{LinkError, MissionError};
use crate::geocode::{Geocoder, ResolvedLocation};
use crate::link::VehicleLink;
use crate::nav::{self, StepReport};
use crate::plan::{bind_step, ActionKind, BoundAction, MissionPlan, MissionStep};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How a dispatched step ended. `Timeout` and `Cancelled` are distinct from
/// `Error` so the mission log says why the vehicle stopped, not just that
/// it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Success,
    Error,
    Timeout,
    Cancelled,
}

/// Append-only record of one executed step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub step_index: usize,
    pub action: ActionKind,
    pub status: StepStatus,
    pub message: String,
    pub payload: Option<serde_json::Value>,
}

/// Where the mission machine currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionPhase {
    Planning,
    StepReady,
    Dispatching,
    Empty,
    Completed,
    Failed,
    Cancelled,
}

impl MissionPhase {
    /// Terminal phases end the mission; the runner hands back its report.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MissionPhase::Empty
                | MissionPhase::Completed
                | MissionPhase::Failed
                | MissionPhase::Cancelled
        )
    }
}

/// Mutable execution state threaded through a mission run.
#[derive(Debug, Default)]
pub struct MissionContext {
    pub cursor: usize,
    pub resolved_location: Option<ResolvedLocation>,
    pub log: Vec<StepOutcome>,
}

impl MissionContext {
    /// Folds a step outcome into the context. The cursor only advances on
    /// success; a successful location resolution overwrites any earlier one
    /// (last write wins).
    pub fn apply_outcome(&mut self, outcome: StepOutcome) {
        if outcome.status == StepStatus::Success {
            if outcome.action == ActionKind::ResolveLocation {
                if let Some(payload) = &outcome.payload {
                    match serde_json::from_value::<ResolvedLocation>(payload.clone()) {
                        Ok(location) => self.resolved_location = Some(location),
                        Err(err) => warn!(error = %err, "unreadable resolve payload"),
                    }
                }
            }
            self.cursor += 1;
        }
        self.log.push(outcome);
    }
}

/// Pure phase transition after a step outcome has been applied.
pub fn next_phase(status: StepStatus, cursor: usize, plan_len: usize) -> MissionPhase {
    match status {
        StepStatus::Success => {
            if cursor >= plan_len {
                MissionPhase::Completed
            } else {
                MissionPhase::StepReady
            }
        }
        StepStatus::Error | StepStatus::Timeout => MissionPhase::Failed,
        StepStatus::Cancelled => MissionPhase::Cancelled,
    }
}

/// Final report for one mission run.
#[derive(Debug)]
pub struct MissionReport {
    pub phase: MissionPhase,
    pub outcomes: Vec<StepOutcome>,
    /// Set when the failing error also invalidates the vehicle link, so the
    /// session should stop accepting further instructions.
    pub session_fatal: bool,
}

impl MissionReport {
    pub fn empty() -> Self {
        Self {
            phase: MissionPhase::Empty,
            outcomes: Vec::new(),
            session_fatal: false,
        }
    }
}

/// Drives a validated plan to a terminal phase.
pub struct MissionRunner {
    link: Arc<dyn VehicleLink>,
    geocoder: Arc<dyn Geocoder>,
    config: NavConfig,
    cancel: CancellationToken,
}

impl MissionRunner {
    pub fn new(
        link: Arc<dyn VehicleLink>,
        geocoder: Arc<dyn Geocoder>,
        config: NavConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            link,
            geocoder,
            config,
            cancel,
        }
    }

    /// Executes the plan step by step. Never returns `Err`: every failure
    /// mode is folded into the report so the caller always gets the log.
    pub async fn run(&self, plan: &MissionPlan) -> MissionReport {
        let mut context = MissionContext::default();
        let mut session_fatal = false;

        let mut phase = MissionPhase::Planning;
        debug!(?phase, steps = plan.len(), "plan received");
        phase = if plan.is_empty() {
            MissionPhase::Empty
        } else {
            MissionPhase::StepReady
        };

        while phase == MissionPhase::StepReady {
            let step = &plan.steps[context.cursor];
            phase = MissionPhase::Dispatching;
            info!(
                step_index = context.cursor,
                action = %step.action,
                ?phase,
                "dispatching step"
            );

            let outcome = match self.dispatch(step, &context).await {
                Ok(report) => StepOutcome {
                    step_index: context.cursor,
                    action: step.action,
                    status: StepStatus::Success,
                    message: report.message,
                    payload: report.payload,
                },
                Err(err) => {
                    session_fatal = err.is_session_fatal();
                    warn!(
                        step_index = context.cursor,
                        action = %step.action,
                        error = %err,
                        "step failed, halting mission"
                    );
                    StepOutcome {
                        step_index: context.cursor,
                        action: step.action,
                        status: status_for(&err),
                        message: err.to_string(),
                        payload: None,
                    }
                }
            };

            let status = outcome.status;
            context.apply_outcome(outcome);
            phase = next_phase(status, context.cursor, plan.len());
        }

        info!(?phase, steps_run = context.log.len(), "mission finished");
        MissionReport {
            phase,
            outcomes: context.log,
            session_fatal,
        }
    }

    async fn dispatch(
        &self,
        step: &MissionStep,
        context: &MissionContext,
    ) -> Result<StepReport, MissionError> {
        let bound = bind_step(step, context.resolved_location.as_ref())?;
        let link = self.link.as_ref();
        let config = &self.config;
        let cancel = &self.cancel;

        match bound {
            BoundAction::PreflightCheck => nav::preflight_check(link, config, cancel).await,
            BoundAction::ArmAndTakeoff { altitude_m } => {
                nav::arm_and_takeoff(link, config, cancel, altitude_m).await
            }
            BoundAction::ResolveLocation { location_name } => {
                let resolved = self.geocoder.resolve(&location_name).await?;
                let message = format!(
                    "resolved {location_name:?} to {:.6}, {:.6}",
                    resolved.latitude_deg, resolved.longitude_deg
                );
                let payload = serde_json::to_value(&resolved)
                    .map_err(|err| MissionError::Geocode(err.to_string()))?;
                Ok(StepReport {
                    message,
                    payload: Some(payload),
                })
            }
            BoundAction::NavigateToPoint {
                latitude_deg,
                longitude_deg,
                altitude_m,
                speed_mps,
            } => {
                nav::navigate_to_point(
                    link,
                    config,
                    cancel,
                    latitude_deg,
                    longitude_deg,
                    altitude_m,
                    speed_mps,
                )
                .await
            }
            BoundAction::NavigateRelative {
                forward_m,
                right_m,
                down_m,
            } => nav::navigate_relative(link, config, cancel, forward_m, right_m, down_m).await,
            BoundAction::Orbit {
                latitude_deg,
                longitude_deg,
                radius_m,
                speed_mps,
            } => {
                nav::orbit(
                    link,
                    config,
                    cancel,
                    latitude_deg,
                    longitude_deg,
                    radius_m,
                    speed_mps,
                )
                .await
            }
            BoundAction::Land => nav::land(link, config, cancel).await,
            BoundAction::ReturnToLaunch => nav::return_to_launch(link, config, cancel).await,
        }
    }
}

fn status_for(err: &MissionError) -> StepStatus {
    match err {
        MissionError::Timeout { .. } | MissionError::Link(LinkError::Timeout) => {
            StepStatus::Timeout
        }
        MissionError::Cancelled | MissionError::Link(LinkError::Cancelled) => {
            StepStatus::Cancelled
        }
        _ => StepStatus::Error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn outcome(action: ActionKind, status: StepStatus, payload: Option<serde_json::Value>) -> StepOutcome {
        StepOutcome {
            step_index: 0,
            action,
            status,
            message: String::new(),
            payload,
        }
    }

    #[test]
    fn cursor_advances_only_on_success() {
        let mut ctx = MissionContext::default();
        ctx.apply_outcome(outcome(ActionKind::PreflightCheck, StepStatus::Success, None));
        assert_eq!(ctx.cursor, 1);
        ctx.apply_outcome(outcome(ActionKind::ArmAndTakeoff, StepStatus::Error, None));
        assert_eq!(ctx.cursor, 1);
        assert_eq!(ctx.log.len(), 2);
    }

    #[test]
    fn resolve_location_payload_overwrites_previous() {
        let mut ctx = MissionContext::default();
        ctx.apply_outcome(outcome(
            ActionKind::ResolveLocation,
            StepStatus::Success,
            Some(json!({"latitude_deg": 1.0, "longitude_deg": 2.0, "label": "first"})),
        ));
        ctx.apply_outcome(outcome(
            ActionKind::ResolveLocation,
            StepStatus::Success,
            Some(json!({"latitude_deg": 3.0, "longitude_deg": 4.0, "label": "second"})),
        ));
        let location = ctx.resolved_location.unwrap();
        assert_eq!(location.latitude_deg, 3.0);
        assert_eq!(location.label, "second");
    }

    #[test]
    fn phase_transitions_cover_all_statuses() {
        assert_eq!(next_phase(StepStatus::Success, 1, 3), MissionPhase::StepReady);
        assert_eq!(next_phase(StepStatus::Success, 3, 3), MissionPhase::Completed);
        assert_eq!(next_phase(StepStatus::Error, 1, 3), MissionPhase::Failed);
        assert_eq!(next_phase(StepStatus::Timeout, 1, 3), MissionPhase::Failed);
        assert_eq!(next_phase(StepStatus::Cancelled, 1, 3), MissionPhase::Cancelled);
    }

    #[test]
    fn terminal_phases() {
        for phase in [
            MissionPhase::Empty,
            MissionPhase::Completed,
            MissionPhase::Failed,
            MissionPhase::Cancelled,
        ] {
            assert!(phase.is_terminal());
        }
        assert!(!MissionPhase::StepReady.is_terminal());
        assert!(!MissionPhase::Dispatching.is_terminal());
        assert!(!MissionPhase::Planning.is_terminal());
    }
}
