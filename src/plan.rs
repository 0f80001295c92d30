//! Mission plans: the closed action vocabulary, planner-output parsing,
//! acceptance-time validation, and per-step argument binding.

use crate::error::MissionError;
use crate::geocode::ResolvedLocation;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Reserved placeholder tokens meaning "substitute the most recently
/// resolved location". These exact strings appear in the action catalog
/// handed to the planner.
pub const PLACEHOLDER_LAT: &str = "TARGET_LAT";
pub const PLACEHOLDER_LON: &str = "TARGET_LON";

/// The closed set of actions a plan step may name. Unknown actions fail at
/// parse time, not at dispatch time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    PreflightCheck,
    ArmAndTakeoff,
    ResolveLocation,
    NavigateToPoint,
    NavigateRelative,
    Orbit,
    Land,
    ReturnToLaunch,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::PreflightCheck => "preflight_check",
            ActionKind::ArmAndTakeoff => "arm_and_takeoff",
            ActionKind::ResolveLocation => "resolve_location",
            ActionKind::NavigateToPoint => "navigate_to_point",
            ActionKind::NavigateRelative => "navigate_relative",
            ActionKind::Orbit => "orbit",
            ActionKind::Land => "land",
            ActionKind::ReturnToLaunch => "return_to_launch",
        }
    }

    /// Actions whose coordinates are forcibly overwritten whenever a
    /// resolved location is available.
    pub fn takes_injected_coordinates(&self) -> bool {
        matches!(self, ActionKind::NavigateToPoint | ActionKind::Orbit)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One action plus its arguments within a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionStep {
    pub action: ActionKind,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

/// Ordered, immutable-once-produced sequence of steps. Produced once per
/// mission by the planner and owned by the mission machine thereafter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MissionPlan {
    pub steps: Vec<MissionStep>,
}

impl MissionPlan {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Parses a plan out of raw planner completion text.
    ///
    /// The model is asked for a JSON list inside a markdown fence, but the
    /// parser tolerates a bare bracket-delimited list and a double-encoded
    /// JSON string. Anything else is a validation failure.
    pub fn from_completion(text: &str) -> Result<Self, MissionError> {
        let json = extract_json_block(text).ok_or_else(|| {
            MissionError::PlanValidation("no JSON plan found in planner output".to_string())
        })?;

        let value: Value = serde_json::from_str(json)
            .map_err(|err| MissionError::PlanValidation(format!("unparsable plan: {err}")))?;

        // Some models double-encode the list as a JSON string.
        let value = match value {
            Value::String(inner) => serde_json::from_str(&inner)
                .map_err(|err| MissionError::PlanValidation(format!("unparsable plan: {err}")))?,
            other => other,
        };

        let steps: Vec<MissionStep> = serde_json::from_value(value)
            .map_err(|err| MissionError::PlanValidation(format!("malformed plan: {err}")))?;

        Ok(MissionPlan { steps })
    }
}

/// Extracts the JSON list from completion text: a ```json fence if present,
/// otherwise the first `[` to the last `]`.
fn extract_json_block(text: &str) -> Option<&str> {
    if let Some(start) = text.find("```json") {
        let rest = &text[start + "```json".len()..];
        if let Some(end) = rest.find("```") {
            return Some(rest[..end].trim());
        }
    }
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    if end > start {
        Some(&text[start..=end])
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Acceptance-time validation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanIssue {
    pub code: String,
    pub message: String,
    pub step_index: Option<usize>,
}

impl PlanIssue {
    fn new(code: &str, message: String, step_index: usize) -> Self {
        Self {
            code: code.to_string(),
            message,
            step_index: Some(step_index),
        }
    }
}

/// Structural validation before a plan is accepted for execution.
///
/// A step referencing placeholder coordinates is valid only if an earlier
/// step in the same plan resolves a location.
pub fn validate_plan(plan: &MissionPlan) -> Vec<PlanIssue> {
    let mut issues = Vec::new();
    let mut resolve_seen = false;

    for (index, step) in plan.steps.iter().enumerate() {
        match step.action {
            ActionKind::PreflightCheck | ActionKind::Land | ActionKind::ReturnToLaunch => {}
            ActionKind::ArmAndTakeoff => {
                match number_argument(&step.arguments, "altitude_m") {
                    Ok(Some(alt)) if alt > 0.0 => {}
                    Ok(Some(alt)) => issues.push(PlanIssue::new(
                        "arm_and_takeoff.invalid_altitude",
                        format!("takeoff altitude {alt} must be positive"),
                        index,
                    )),
                    _ => issues.push(PlanIssue::new(
                        "arm_and_takeoff.missing_altitude",
                        "arm_and_takeoff requires a numeric altitude_m".to_string(),
                        index,
                    )),
                }
            }
            ActionKind::ResolveLocation => {
                let name = step
                    .arguments
                    .get("location_name")
                    .and_then(Value::as_str)
                    .unwrap_or("");
                if name.trim().is_empty() {
                    issues.push(PlanIssue::new(
                        "resolve_location.missing_name",
                        "resolve_location requires a non-empty location_name".to_string(),
                        index,
                    ));
                } else {
                    resolve_seen = true;
                }
            }
            ActionKind::NavigateToPoint => {
                check_coordinates(&step.arguments, index, resolve_seen, &mut issues);
                check_optional_speed(&step.arguments, index, &mut issues);
            }
            ActionKind::Orbit => {
                check_coordinates(&step.arguments, index, resolve_seen, &mut issues);
                check_optional_speed(&step.arguments, index, &mut issues);
                match number_argument(&step.arguments, "radius_m") {
                    Ok(Some(radius)) if radius > 0.0 => {}
                    _ => issues.push(PlanIssue::new(
                        "orbit.missing_radius",
                        "orbit requires a positive numeric radius_m".to_string(),
                        index,
                    )),
                }
            }
            ActionKind::NavigateRelative => {
                let mut any = false;
                for key in ["forward_m", "right_m", "down_m"] {
                    match number_argument(&step.arguments, key) {
                        Ok(Some(_)) => any = true,
                        Ok(None) => {}
                        Err(_) => issues.push(PlanIssue::new(
                            "navigate_relative.invalid_displacement",
                            format!("{key} must be a number"),
                            index,
                        )),
                    }
                }
                if !any {
                    issues.push(PlanIssue::new(
                        "navigate_relative.no_displacement",
                        "navigate_relative requires at least one of forward_m, right_m, down_m"
                            .to_string(),
                        index,
                    ));
                }
            }
        }
    }

    issues
}

fn check_coordinates(
    arguments: &Map<String, Value>,
    index: usize,
    resolve_seen: bool,
    issues: &mut Vec<PlanIssue>,
) {
    for (key, placeholder) in [("latitude", PLACEHOLDER_LAT), ("longitude", PLACEHOLDER_LON)] {
        match arguments.get(key) {
            Some(Value::Number(_)) => {}
            Some(Value::String(s)) if s == placeholder => {
                if !resolve_seen {
                    issues.push(PlanIssue::new(
                        "coordinates.orphan_placeholder",
                        format!("{key} placeholder used without a prior resolve_location step"),
                        index,
                    ));
                }
            }
            Some(other) => issues.push(PlanIssue::new(
                "coordinates.invalid",
                format!("{key} must be a number or the {placeholder} placeholder, got {other}"),
                index,
            )),
            None => {
                if !resolve_seen {
                    issues.push(PlanIssue::new(
                        "coordinates.missing",
                        format!("{key} is missing and no prior resolve_location step exists"),
                        index,
                    ));
                }
            }
        }
    }
}

fn check_optional_speed(arguments: &Map<String, Value>, index: usize, issues: &mut Vec<PlanIssue>) {
    match number_argument(arguments, "speed_mps") {
        Ok(Some(speed)) if speed <= 0.0 => issues.push(PlanIssue::new(
            "speed.invalid",
            format!("speed_mps {speed} must be positive"),
            index,
        )),
        Ok(_) => {}
        Err(_) => issues.push(PlanIssue::new(
            "speed.invalid",
            "speed_mps must be a number".to_string(),
            index,
        )),
    }
}

/// Returns `Ok(None)` when absent, `Err` when present but not numeric.
fn number_argument(arguments: &Map<String, Value>, key: &str) -> Result<Option<f64>, ()> {
    match arguments.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value.as_f64().map(Some).ok_or(()),
    }
}

// ---------------------------------------------------------------------------
// Argument binding
// ---------------------------------------------------------------------------

/// A step with its arguments fully resolved and typed, ready for dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum BoundAction {
    PreflightCheck,
    ArmAndTakeoff {
        altitude_m: f64,
    },
    ResolveLocation {
        location_name: String,
    },
    NavigateToPoint {
        latitude_deg: f64,
        longitude_deg: f64,
        altitude_m: Option<f64>,
        speed_mps: Option<f64>,
    },
    NavigateRelative {
        forward_m: f64,
        right_m: f64,
        down_m: f64,
    },
    Orbit {
        latitude_deg: f64,
        longitude_deg: f64,
        radius_m: f64,
        speed_mps: Option<f64>,
    },
    Land,
    ReturnToLaunch,
}

/// Pure argument resolution for one step.
///
/// For coordinate-taking actions, a stored resolved location forcibly
/// overwrites whatever latitude/longitude the planner emitted, making the
/// machine resilient to a planner that forgot the placeholder substitution.
/// A placeholder that survives to this point (no resolution available) is
/// an error, never a silent pass-through.
pub fn bind_step(
    step: &MissionStep,
    resolved: Option<&ResolvedLocation>,
) -> Result<BoundAction, MissionError> {
    let args = &step.arguments;
    match step.action {
        ActionKind::PreflightCheck => Ok(BoundAction::PreflightCheck),
        ActionKind::Land => Ok(BoundAction::Land),
        ActionKind::ReturnToLaunch => Ok(BoundAction::ReturnToLaunch),
        ActionKind::ArmAndTakeoff => {
            let altitude_m = required_number(args, "altitude_m", step.action)?;
            Ok(BoundAction::ArmAndTakeoff { altitude_m })
        }
        ActionKind::ResolveLocation => {
            let location_name = args
                .get("location_name")
                .and_then(Value::as_str)
                .map(str::to_string)
                .filter(|name| !name.trim().is_empty())
                .ok_or_else(|| {
                    MissionError::ArgumentResolution(
                        "resolve_location requires a location_name".to_string(),
                    )
                })?;
            Ok(BoundAction::ResolveLocation { location_name })
        }
        ActionKind::NavigateToPoint => {
            let (latitude_deg, longitude_deg) = bind_coordinates(args, resolved, step.action)?;
            Ok(BoundAction::NavigateToPoint {
                latitude_deg,
                longitude_deg,
                altitude_m: optional_number(args, "altitude_m", step.action)?,
                speed_mps: optional_number(args, "speed_mps", step.action)?,
            })
        }
        ActionKind::NavigateRelative => Ok(BoundAction::NavigateRelative {
            forward_m: optional_number(args, "forward_m", step.action)?.unwrap_or(0.0),
            right_m: optional_number(args, "right_m", step.action)?.unwrap_or(0.0),
            down_m: optional_number(args, "down_m", step.action)?.unwrap_or(0.0),
        }),
        ActionKind::Orbit => {
            let (latitude_deg, longitude_deg) = bind_coordinates(args, resolved, step.action)?;
            Ok(BoundAction::Orbit {
                latitude_deg,
                longitude_deg,
                radius_m: required_number(args, "radius_m", step.action)?,
                speed_mps: optional_number(args, "speed_mps", step.action)?,
            })
        }
    }
}

fn bind_coordinates(
    args: &Map<String, Value>,
    resolved: Option<&ResolvedLocation>,
    action: ActionKind,
) -> Result<(f64, f64), MissionError> {
    if let Some(location) = resolved {
        return Ok((location.latitude_deg, location.longitude_deg));
    }

    let latitude = coordinate(args, "latitude", action)?;
    let longitude = coordinate(args, "longitude", action)?;
    Ok((latitude, longitude))
}

fn coordinate(args: &Map<String, Value>, key: &str, action: ActionKind) -> Result<f64, MissionError> {
    match args.get(key) {
        Some(Value::Number(n)) => n.as_f64().ok_or_else(|| {
            MissionError::ArgumentResolution(format!("{action}: {key} is not a finite number"))
        }),
        Some(Value::String(s)) if s == PLACEHOLDER_LAT || s == PLACEHOLDER_LON => {
            Err(MissionError::ArgumentResolution(format!(
                "{action}: {key} placeholder has no resolved location to substitute"
            )))
        }
        Some(other) => Err(MissionError::ArgumentResolution(format!(
            "{action}: {key} must be a number, got {other}"
        ))),
        None => Err(MissionError::ArgumentResolution(format!(
            "{action}: {key} is missing and no resolved location is available"
        ))),
    }
}

fn required_number(
    args: &Map<String, Value>,
    key: &str,
    action: ActionKind,
) -> Result<f64, MissionError> {
    optional_number(args, key, action)?.ok_or_else(|| {
        MissionError::ArgumentResolution(format!("{action}: required argument {key} is missing"))
    })
}

fn optional_number(
    args: &Map<String, Value>,
    key: &str,
    action: ActionKind,
) -> Result<Option<f64>, MissionError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value.as_f64().map(Some).ok_or_else(|| {
            MissionError::ArgumentResolution(format!(
                "{action}: {key} must be a number, got {value}"
            ))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn step(action: ActionKind, arguments: Value) -> MissionStep {
        MissionStep {
            action,
            arguments: arguments.as_object().cloned().unwrap_or_default(),
        }
    }

    #[test]
    fn parses_fenced_completion() {
        let text = r#"Here is the plan:
```json
[
  {"action": "preflight_check", "arguments": {}},
  {"action": "arm_and_takeoff", "arguments": {"altitude_m": 20}}
]
```
Good luck!"#;
        let plan = MissionPlan::from_completion(text).unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.steps[0].action, ActionKind::PreflightCheck);
        assert_eq!(plan.steps[1].action, ActionKind::ArmAndTakeoff);
    }

    #[test]
    fn parses_bare_bracket_completion() {
        let text = r#"Sure! [{"action": "land"}] is what I'd do."#;
        let plan = MissionPlan::from_completion(text).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.steps[0].action, ActionKind::Land);
    }

    #[test]
    fn parses_double_encoded_completion() {
        let text = r#""[{\"action\": \"return_to_launch\"}]""#;
        let plan = MissionPlan::from_completion(text).unwrap();
        assert_eq!(plan.steps[0].action, ActionKind::ReturnToLaunch);
    }

    #[test]
    fn rejects_completion_without_json() {
        let err = MissionPlan::from_completion("I cannot help with that.").unwrap_err();
        assert!(matches!(err, MissionError::PlanValidation(_)));
    }

    #[test]
    fn rejects_unknown_action_at_parse_time() {
        let text = r#"[{"action": "self_destruct", "arguments": {}}]"#;
        let err = MissionPlan::from_completion(text).unwrap_err();
        assert!(matches!(err, MissionError::PlanValidation(_)));
    }

    #[test]
    fn empty_list_parses_to_empty_plan() {
        let plan = MissionPlan::from_completion("```json\n[]\n```").unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn validation_flags_orphan_placeholder() {
        let plan = MissionPlan {
            steps: vec![step(
                ActionKind::NavigateToPoint,
                json!({"latitude": "TARGET_LAT", "longitude": "TARGET_LON"}),
            )],
        };
        let issues = validate_plan(&plan);
        assert!(issues
            .iter()
            .any(|i| i.code == "coordinates.orphan_placeholder"));
    }

    #[test]
    fn validation_accepts_placeholder_after_resolve() {
        let plan = MissionPlan {
            steps: vec![
                step(
                    ActionKind::ResolveLocation,
                    json!({"location_name": "Eiffel Tower"}),
                ),
                step(
                    ActionKind::NavigateToPoint,
                    json!({"latitude": "TARGET_LAT", "longitude": "TARGET_LON"}),
                ),
            ],
        };
        assert!(validate_plan(&plan).is_empty());
    }

    #[test]
    fn validation_flags_missing_orbit_radius() {
        let plan = MissionPlan {
            steps: vec![step(
                ActionKind::Orbit,
                json!({"latitude": 48.85, "longitude": 2.29}),
            )],
        };
        let issues = validate_plan(&plan);
        assert!(issues.iter().any(|i| i.code == "orbit.missing_radius"));
    }

    #[test]
    fn validation_flags_missing_takeoff_altitude() {
        let plan = MissionPlan {
            steps: vec![step(ActionKind::ArmAndTakeoff, json!({}))],
        };
        let issues = validate_plan(&plan);
        assert!(issues
            .iter()
            .any(|i| i.code == "arm_and_takeoff.missing_altitude"));
    }

    #[test]
    fn bind_overwrites_coordinates_with_resolved_location() {
        let resolved = ResolvedLocation {
            latitude_deg: 48.8584,
            longitude_deg: 2.2945,
            label: "Eiffel Tower".to_string(),
        };
        // Even explicit numeric coordinates are overwritten.
        let s = step(
            ActionKind::NavigateToPoint,
            json!({"latitude": 1.0, "longitude": 2.0, "speed_mps": 15}),
        );
        let bound = bind_step(&s, Some(&resolved)).unwrap();
        assert_eq!(
            bound,
            BoundAction::NavigateToPoint {
                latitude_deg: 48.8584,
                longitude_deg: 2.2945,
                altitude_m: None,
                speed_mps: Some(15.0),
            }
        );
    }

    #[test]
    fn bind_rejects_unresolved_placeholder() {
        let s = step(
            ActionKind::Orbit,
            json!({"latitude": "TARGET_LAT", "longitude": "TARGET_LON", "radius_m": 50}),
        );
        let err = bind_step(&s, None).unwrap_err();
        assert!(matches!(err, MissionError::ArgumentResolution(_)));
    }

    #[test]
    fn bind_defaults_relative_displacements_to_zero() {
        let s = step(ActionKind::NavigateRelative, json!({"forward_m": 50}));
        let bound = bind_step(&s, None).unwrap();
        assert_eq!(
            bound,
            BoundAction::NavigateRelative {
                forward_m: 50.0,
                right_m: 0.0,
                down_m: 0.0,
            }
        );
    }

    #[test]
    fn action_names_round_trip_through_serde() {
        for action in [
            ActionKind::PreflightCheck,
            ActionKind::ArmAndTakeoff,
            ActionKind::ResolveLocation,
            ActionKind::NavigateToPoint,
            ActionKind::NavigateRelative,
            ActionKind::Orbit,
            ActionKind::Land,
            ActionKind::ReturnToLaunch,
        ] {
            let encoded = serde_json::to_string(&action).unwrap();
            assert_eq!(encoded, format!("\"{}\"", action.as_str()));
            let decoded: ActionKind = serde_json::from_str(&encoded).unwrap();
            assert_eq!(decoded, action);
        }
    }
}
