//! Instruction planning: turning one freeform operator instruction into
//! raw completion text that should contain a JSON mission plan.

use crate::error::MissionError;
use crate::plan::{PLACEHOLDER_LAT, PLACEHOLDER_LON};
use async_trait::async_trait;
use ollama_rs::{generation::completion::request::GenerationRequest, Ollama};
use tracing::{debug, trace};

/// Produces raw planner output for an instruction. The mission layer owns
/// parsing and validation; a planner only has to return text.
#[async_trait]
pub trait MissionPlanner: Send + Sync {
    async fn plan(&self, instruction: &str, catalog: &str) -> Result<String, MissionError>;
}

/// The action vocabulary as presented to the model. Argument names here
/// must match what the plan parser expects.
pub fn action_catalog() -> String {
    format!(
        r#"Available actions (use exactly these names and argument keys):

- preflight_check: no arguments. Verify GPS, home position, and armability.
- arm_and_takeoff: {{"altitude_m": <number>}}. Arm and climb to the altitude in meters.
- resolve_location: {{"location_name": "<place name>"}}. Look up coordinates for a named place.
- navigate_to_point: {{"latitude": <number>, "longitude": <number>, "altitude_m": <number, optional, absolute altitude above mean sea level; omit to hold the current altitude>, "speed_mps": <number, optional>}}. Fly to a coordinate.
- navigate_relative: {{"forward_m": <number>, "right_m": <number>, "down_m": <number>}}. Move relative to the current position and heading; omitted keys default to 0.
- orbit: {{"latitude": <number>, "longitude": <number>, "radius_m": <number>, "speed_mps": <number, optional>}}. Circle a point.
- land: no arguments. Land at the current position.
- return_to_launch: no arguments. Fly back to the takeoff point and land.

When a step needs the coordinates of a place resolved earlier in the plan,
put the strings "{PLACEHOLDER_LAT}" and "{PLACEHOLDER_LON}" in the latitude and
longitude fields. They are substituted at execution time."#
    )
}

fn prompt_for(instruction: &str, catalog: &str) -> String {
    format!(
        r#"You are a drone mission planner. Convert the operator instruction into
an ordered JSON list of action steps.

{catalog}

Rules:
- Start every flight with preflight_check followed by arm_and_takeoff.
- End every flight with land or return_to_launch unless the instruction
  says otherwise.
- Put a resolve_location step before any step that uses its placeholders.
- Output ONLY the JSON list, inside a ```json fence, no commentary.

Example instruction: "take off to 20 meters, fly to the Eiffel Tower and orbit it"
Example output:
```json
[
  {{"action": "preflight_check", "arguments": {{}}}},
  {{"action": "arm_and_takeoff", "arguments": {{"altitude_m": 20}}}},
  {{"action": "resolve_location", "arguments": {{"location_name": "Eiffel Tower"}}}},
  {{"action": "navigate_to_point", "arguments": {{"latitude": "{PLACEHOLDER_LAT}", "longitude": "{PLACEHOLDER_LON}"}}}},
  {{"action": "orbit", "arguments": {{"latitude": "{PLACEHOLDER_LAT}", "longitude": "{PLACEHOLDER_LON}", "radius_m": 50}}}},
  {{"action": "return_to_launch", "arguments": {{}}}}
]
```

Operator instruction: "{instruction}"
"#
    )
}

/// Planner backed by a local Ollama instance.
pub struct OllamaPlanner {
    client: Ollama,
    model: String,
}

impl OllamaPlanner {
    pub fn new(base_url: &str, model: &str) -> Result<Self, MissionError> {
        let client = Ollama::try_new(base_url)
            .map_err(|err| MissionError::Planner(format!("bad ollama url: {err}")))?;
        Ok(Self {
            client,
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl MissionPlanner for OllamaPlanner {
    async fn plan(&self, instruction: &str, catalog: &str) -> Result<String, MissionError> {
        let prompt = prompt_for(instruction, catalog);
        trace!(%prompt, "sending planner prompt");

        let request = GenerationRequest::new(self.model.clone(), prompt);
        let response = self
            .client
            .generate(request)
            .await
            .map_err(|err| MissionError::Planner(err.to_string()))?;

        debug!(
            model = %self.model,
            chars = response.response.len(),
            "planner completion received"
        );
        Ok(response.response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_names_every_action() {
        let catalog = action_catalog();
        for name in [
            "preflight_check",
            "arm_and_takeoff",
            "resolve_location",
            "navigate_to_point",
            "navigate_relative",
            "orbit",
            "land",
            "return_to_launch",
        ] {
            assert!(catalog.contains(name), "catalog missing {name}");
        }
        assert!(catalog.contains(PLACEHOLDER_LAT));
        assert!(catalog.contains(PLACEHOLDER_LON));
    }

    #[test]
    fn prompt_embeds_instruction_and_catalog() {
        let catalog = action_catalog();
        let prompt = prompt_for("survey the harbor", &catalog);
        assert!(prompt.contains("survey the harbor"));
        assert!(prompt.contains("navigate_relative"));
    }
}
