use serde_json::Value;

use crate::actions::{self, AgentAction};
use crate::errors::{AndroidUseError, AndroidUseResult};
use crate::hierarchy::UiHierarchy;

/// Top-level keys accepted as parameters when the model answers with a bare
/// action-name string instead of the nested form.
const FLAT_PARAM_KEYS: &[&str] = &[
    "x",
    "y",
    "x1",
    "y1",
    "x2",
    "y2",
    "text",
    "key",
    "package",
    "seconds",
    "duration_ms",
    "direction",
    "element_id",
];

/// What the model decided for one step.
#[derive(Debug, Clone)]
pub struct Decision {
    pub thought: String,
    pub action: AgentAction,
}

/// Parse a model response into a decision. Tolerates fenced output,
/// `reasoning` in place of `thought`, a flat action-name string with
/// top-level parameters, and element ids in place of coordinates.
pub fn parse_decision(content: &str, hierarchy: &UiHierarchy) -> AndroidUseResult<Decision> {
    let json = extract_json(content).ok_or_else(|| {
        AndroidUseError::ActionParsing(format!(
            "no JSON object in response: {}",
            truncate(content, 120)
        ))
    })?;
    let value: Value = serde_json::from_str(json)
        .map_err(|e| AndroidUseError::ActionParsing(format!("malformed decision JSON: {e}")))?;

    let thought = value
        .get("thought")
        .or_else(|| value.get("reasoning"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    if value.get("done").and_then(Value::as_bool).unwrap_or(false) {
        let result = value
            .get("result")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| {
                if thought.is_empty() {
                    "Task completed".to_string()
                } else {
                    thought.clone()
                }
            });
        let success = value
            .get("success")
            .and_then(Value::as_bool)
            .unwrap_or(true);
        return Ok(Decision {
            thought,
            action: AgentAction::Done { success, result },
        });
    }

    let action_value = value
        .get("action")
        .or_else(|| value.get("command"))
        .cloned()
        .unwrap_or(Value::Null);

    let (name, mut params) = match action_value {
        Value::String(name) => {
            // Bare action name; the parameters live at the top level.
            let mut flat = serde_json::Map::new();
            for key in FLAT_PARAM_KEYS {
                if let Some(v) = value.get(*key) {
                    flat.insert((*key).to_string(), v.clone());
                }
            }
            (name, Value::Object(flat))
        }
        Value::Object(obj) => {
            let name = obj
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let params = obj
                .get("params")
                .cloned()
                .unwrap_or_else(|| Value::Object(Default::default()));
            (name, params)
        }
        _ => (String::new(), Value::Object(Default::default())),
    };

    if name.is_empty() {
        return Err(AndroidUseError::ActionParsing(
            "no action specified in response".into(),
        ));
    }

    resolve_element_id(&mut params, hierarchy);

    let action = actions::parse_action(&name, &params)?;
    Ok(Decision { thought, action })
}

/// Swap an `element_id` parameter for the element's center coordinates.
/// Unresolvable ids are dropped with a warning; validation then rejects the
/// action if it needed them.
fn resolve_element_id(params: &mut Value, hierarchy: &UiHierarchy) {
    let Some(obj) = params.as_object_mut() else {
        return;
    };
    let Some(id_value) = obj.remove("element_id") else {
        return;
    };
    let id = match &id_value {
        Value::Number(n) => n.as_u64().map(|v| v as usize),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    if let Some(id) = id {
        if let Some((x, y)) = hierarchy.center_of(id) {
            tracing::info!(element = id, x, y, "resolved element id to center");
            obj.insert("x".into(), Value::from(x));
            obj.insert("y".into(), Value::from(y));
            return;
        }
    }
    tracing::warn!(value = %id_value, "could not resolve element_id");
}

/// Slice the first JSON object out of the content. Covers fenced blocks and
/// leading prose, since the fence markers lie outside the braces.
fn extract_json(content: &str) -> Option<&str> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&content[start..=end])
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max).collect();
        format!("{cut}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::UiElement;

    fn hierarchy_with_button() -> UiHierarchy {
        UiHierarchy {
            elements: vec![UiElement {
                id: 0,
                text: "Settings".into(),
                content_desc: String::new(),
                resource_id: "com.android.settings:id/gear".into(),
                class_name: "android.widget.Button".into(),
                bounds: (100, 200, 300, 280),
                clickable: true,
                focusable: true,
                scrollable: false,
                enabled: true,
                checkable: false,
                checked: false,
                editable: false,
            }],
        }
    }

    #[test]
    fn nested_action_form_parses() {
        let content = r#"{"thought": "tap the gear", "done": false,
                          "action": {"name": "tap", "params": {"x": 540, "y": 1200}}}"#;
        let d = parse_decision(content, &UiHierarchy::default()).unwrap();
        assert_eq!(d.thought, "tap the gear");
        assert_eq!(d.action, AgentAction::Tap { x: 540, y: 1200 });
    }

    #[test]
    fn fenced_output_is_tolerated() {
        let content = "Here is my decision:\n```json\n{\"thought\": \"t\", \"done\": false, \
                       \"action\": {\"name\": \"swipe_up\", \"params\": {}}}\n```";
        let d = parse_decision(content, &UiHierarchy::default()).unwrap();
        assert_eq!(d.action, AgentAction::SwipeUp);
    }

    #[test]
    fn done_response_becomes_done_action() {
        let content = r#"{"thought": "goal achieved", "done": true, "result": "WiFi enabled"}"#;
        let d = parse_decision(content, &UiHierarchy::default()).unwrap();
        assert_eq!(
            d.action,
            AgentAction::Done {
                success: true,
                result: "WiFi enabled".into()
            }
        );
    }

    #[test]
    fn done_without_result_falls_back_to_thought() {
        let content = r#"{"thought": "all set", "done": true}"#;
        let d = parse_decision(content, &UiHierarchy::default()).unwrap();
        assert_eq!(
            d.action,
            AgentAction::Done {
                success: true,
                result: "all set".into()
            }
        );
    }

    #[test]
    fn flat_string_action_reads_top_level_params() {
        let content = r#"{"thought": "t", "done": false, "action": "click", "x": 10, "y": 20}"#;
        let d = parse_decision(content, &UiHierarchy::default()).unwrap();
        assert_eq!(d.action, AgentAction::Tap { x: 10, y: 20 });
    }

    #[test]
    fn element_id_resolves_to_center_coordinates() {
        let content = r#"{"thought": "t", "done": false,
                          "action": {"name": "tap", "params": {"element_id": 0}}}"#;
        let d = parse_decision(content, &hierarchy_with_button()).unwrap();
        assert_eq!(d.action, AgentAction::Tap { x: 200, y: 240 });
    }

    #[test]
    fn unresolvable_element_id_fails_validation() {
        let content = r#"{"thought": "t", "done": false,
                          "action": {"name": "tap", "params": {"element_id": 99}}}"#;
        let err = parse_decision(content, &hierarchy_with_button()).unwrap_err();
        assert!(matches!(err, AndroidUseError::ActionValidation(_)));
    }

    #[test]
    fn missing_action_is_rejected() {
        let content = r#"{"thought": "hmm", "done": false}"#;
        let err = parse_decision(content, &UiHierarchy::default()).unwrap_err();
        assert!(matches!(err, AndroidUseError::ActionParsing(_)));
    }

    #[test]
    fn prose_without_json_is_rejected() {
        let err = parse_decision("I think we should tap the button.", &UiHierarchy::default())
            .unwrap_err();
        assert!(matches!(err, AndroidUseError::ActionParsing(_)));
    }

    #[test]
    fn reasoning_key_is_accepted_for_thought() {
        let content = r#"{"reasoning": "r", "done": false,
                          "action": {"name": "press_back", "params": {}}}"#;
        let d = parse_decision(content, &UiHierarchy::default()).unwrap();
        assert_eq!(d.thought, "r");
        assert_eq!(d.action, AgentAction::PressKey { key: "back".into() });
    }
}
