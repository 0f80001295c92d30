//! Operator session: one instruction in, one mission report out.

use crate::config::NavConfig;
use crate::error::MissionError;
use crate::geocode::Geocoder;
use crate::link::VehicleLink;
use crate::mission::{MissionReport, MissionRunner};
use crate::plan::{validate_plan, MissionPlan};
use crate::planner::{action_catalog, MissionPlanner};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Words that end the session instead of becoming instructions.
pub fn is_stop_request(input: &str) -> bool {
    let trimmed = input.trim();
    trimmed.eq_ignore_ascii_case("quit") || trimmed.eq_ignore_ascii_case("exit")
}

/// Ties the planner, geocoder, and vehicle link together for an
/// interactive session. One `Session` serves many instructions, each run
/// as an independent mission with its own cancellation scope.
pub struct Session {
    planner: Arc<dyn MissionPlanner>,
    geocoder: Arc<dyn Geocoder>,
    link: Arc<dyn VehicleLink>,
    nav_config: NavConfig,
    cancel: CancellationToken,
}

impl Session {
    pub fn new(
        planner: Arc<dyn MissionPlanner>,
        geocoder: Arc<dyn Geocoder>,
        link: Arc<dyn VehicleLink>,
        nav_config: NavConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            planner,
            geocoder,
            link,
            nav_config,
            cancel,
        }
    }

    /// Plans and executes one instruction.
    ///
    /// An unusable planner output (no parsable plan, or a plan that fails
    /// validation) yields an `Empty` report rather than an error: the
    /// operator rephrases, the session keeps going. `Err` is reserved for
    /// infrastructure faults such as an unreachable planner.
    pub async fn execute_instruction(
        &self,
        instruction: &str,
    ) -> Result<MissionReport, MissionError> {
        info!(instruction, "planning mission");
        let catalog = action_catalog();
        let completion = self.planner.plan(instruction, &catalog).await?;

        let plan = match MissionPlan::from_completion(&completion) {
            Ok(plan) => plan,
            Err(err) => {
                warn!(error = %err, "planner output unusable");
                return Ok(MissionReport::empty());
            }
        };

        let issues = validate_plan(&plan);
        if !issues.is_empty() {
            for issue in &issues {
                warn!(
                    code = %issue.code,
                    step_index = ?issue.step_index,
                    "{}", issue.message
                );
            }
            return Ok(MissionReport::empty());
        }

        if plan.is_empty() {
            info!("planner produced an empty plan");
            return Ok(MissionReport::empty());
        }

        info!(steps = plan.len(), "plan accepted, executing");
        let runner = MissionRunner::new(
            self.link.clone(),
            self.geocoder.clone(),
            self.nav_config.clone(),
            self.cancel.child_token(),
        );
        Ok(runner.run(&plan).await)
    }
}
