use serde::{Deserialize, Serialize};

use crate::device::traits::DeviceControl;
use crate::device::types::SwipeDirection;
use crate::errors::{AndroidUseError, AndroidUseResult};

/// Actions the decision model can choose from. The wire form is
/// `{"name": "tap", "params": {"x": 540, "y": 1200}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", content = "params", rename_all = "snake_case")]
pub enum AgentAction {
    Tap {
        x: i32,
        y: i32,
    },
    LongPress {
        x: i32,
        y: i32,
        #[serde(default = "default_long_press_ms")]
        duration_ms: u32,
    },
    Swipe {
        x1: i32,
        y1: i32,
        x2: i32,
        y2: i32,
        #[serde(default = "default_swipe_ms")]
        duration_ms: u32,
    },
    SwipeUp,
    SwipeDown,
    SwipeLeft,
    SwipeRight,
    TypeText {
        text: String,
    },
    PressKey {
        key: String,
    },
    OpenApp {
        package: String,
    },
    CloseApp {
        package: String,
    },
    Wait {
        seconds: f64,
    },
    Done {
        #[serde(default = "default_true")]
        success: bool,
        #[serde(default)]
        result: String,
    },
}

fn default_long_press_ms() -> u32 {
    1000
}

fn default_swipe_ms() -> u32 {
    500
}

fn default_true() -> bool {
    true
}

impl AgentAction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Tap { .. } => "tap",
            Self::LongPress { .. } => "long_press",
            Self::Swipe { .. } => "swipe",
            Self::SwipeUp => "swipe_up",
            Self::SwipeDown => "swipe_down",
            Self::SwipeLeft => "swipe_left",
            Self::SwipeRight => "swipe_right",
            Self::TypeText { .. } => "type_text",
            Self::PressKey { .. } => "press_key",
            Self::OpenApp { .. } => "open_app",
            Self::CloseApp { .. } => "close_app",
            Self::Wait { .. } => "wait",
            Self::Done { .. } => "done",
        }
    }

    /// Canonical serialized form, used to spot an agent repeating itself.
    pub fn signature(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| self.name().to_string())
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done { .. })
    }
}

/// Fold the aliases models like to emit into registered action names.
pub fn normalize_action_name(name: &str) -> String {
    match name.to_lowercase().as_str() {
        "click" | "press" => "tap".into(),
        "type" | "input" => "type_text".into(),
        "press_back" | "back" => "press_back".into(),
        "press_home" | "home" => "press_home".into(),
        "press_enter" | "enter" => "press_enter".into(),
        "scroll_down" => "swipe_up".into(),
        "scroll_up" => "swipe_down".into(),
        "stop_app" => "close_app".into(),
        other => other.into(),
    }
}

/// Build a typed action from a (normalized) name and its parameter object.
/// Parameter lookups tolerate numbers arriving as strings, which smaller
/// models produce routinely.
pub fn parse_action(name: &str, params: &serde_json::Value) -> AndroidUseResult<AgentAction> {
    let name = normalize_action_name(name);
    match name.as_str() {
        "tap" => Ok(AgentAction::Tap {
            x: require_i32(params, "x")?,
            y: require_i32(params, "y")?,
        }),
        "long_press" => Ok(AgentAction::LongPress {
            x: require_i32(params, "x")?,
            y: require_i32(params, "y")?,
            duration_ms: get_i32(params, "duration_ms")
                .map(|v| v.max(1) as u32)
                .unwrap_or_else(default_long_press_ms),
        }),
        "swipe" => {
            // A bare direction is accepted in place of coordinates.
            if let Some(direction) = params.get("direction").and_then(|v| v.as_str()) {
                return directional_swipe(direction);
            }
            Ok(AgentAction::Swipe {
                x1: require_i32(params, "x1")?,
                y1: require_i32(params, "y1")?,
                x2: require_i32(params, "x2")?,
                y2: require_i32(params, "y2")?,
                duration_ms: get_i32(params, "duration_ms")
                    .map(|v| v.max(1) as u32)
                    .unwrap_or_else(default_swipe_ms),
            })
        }
        "swipe_up" => Ok(AgentAction::SwipeUp),
        "swipe_down" => Ok(AgentAction::SwipeDown),
        "swipe_left" => Ok(AgentAction::SwipeLeft),
        "swipe_right" => Ok(AgentAction::SwipeRight),
        "type_text" => Ok(AgentAction::TypeText {
            text: require_str(params, "text")?,
        }),
        "press_key" => Ok(AgentAction::PressKey {
            key: require_str(params, "key")?,
        }),
        "press_back" => Ok(AgentAction::PressKey { key: "back".into() }),
        "press_home" => Ok(AgentAction::PressKey { key: "home".into() }),
        "press_enter" => Ok(AgentAction::PressKey {
            key: "enter".into(),
        }),
        "open_app" => Ok(AgentAction::OpenApp {
            package: require_str(params, "package")?,
        }),
        "close_app" => Ok(AgentAction::CloseApp {
            package: require_str(params, "package")?,
        }),
        "wait" => Ok(AgentAction::Wait {
            seconds: get_f64(params, "seconds").unwrap_or(1.0),
        }),
        "done" => Ok(AgentAction::Done {
            success: params
                .get("success")
                .and_then(|v| v.as_bool())
                .unwrap_or(true),
            result: params
                .get("result")
                .or_else(|| params.get("message"))
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
        }),
        other => Err(AndroidUseError::ActionParsing(format!(
            "action '{other}' is not registered"
        ))),
    }
}

fn directional_swipe(direction: &str) -> AndroidUseResult<AgentAction> {
    Ok(match SwipeDirection::parse(direction)? {
        SwipeDirection::Up => AgentAction::SwipeUp,
        SwipeDirection::Down => AgentAction::SwipeDown,
        SwipeDirection::Left => AgentAction::SwipeLeft,
        SwipeDirection::Right => AgentAction::SwipeRight,
    })
}

fn get_i32(params: &serde_json::Value, key: &str) -> Option<i32> {
    let v = params.get(key)?;
    if let Some(n) = v.as_i64() {
        return Some(n as i32);
    }
    if let Some(f) = v.as_f64() {
        return Some(f.round() as i32);
    }
    v.as_str()?.trim().parse().ok()
}

fn require_i32(params: &serde_json::Value, key: &str) -> AndroidUseResult<i32> {
    get_i32(params, key).ok_or_else(|| {
        AndroidUseError::ActionValidation(format!("missing or non-numeric parameter '{key}'"))
    })
}

fn get_f64(params: &serde_json::Value, key: &str) -> Option<f64> {
    let v = params.get(key)?;
    if let Some(f) = v.as_f64() {
        return Some(f);
    }
    v.as_str()?.trim().parse().ok()
}

fn require_str(params: &serde_json::Value, key: &str) -> AndroidUseResult<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| {
            AndroidUseError::ActionValidation(format!("missing string parameter '{key}'"))
        })
}

/// Execute one action against the device and describe what happened.
/// `done` is a no-op here; the agent loop terminates on it before or after
/// dispatch, never the device.
pub async fn dispatch(
    device: &dyn DeviceControl,
    action: &AgentAction,
) -> AndroidUseResult<String> {
    match action {
        AgentAction::Tap { x, y } => {
            device.tap(*x, *y).await?;
            Ok(format!("tapped ({x}, {y})"))
        }
        AgentAction::LongPress { x, y, duration_ms } => {
            // adb has no dedicated long press; a zero-length swipe with a
            // hold duration produces one.
            device.swipe(*x, *y, *x, *y, *duration_ms).await?;
            Ok(format!("long-pressed ({x}, {y})"))
        }
        AgentAction::Swipe {
            x1,
            y1,
            x2,
            y2,
            duration_ms,
        } => {
            device.swipe(*x1, *y1, *x2, *y2, *duration_ms).await?;
            Ok(format!("swiped ({x1}, {y1}) -> ({x2}, {y2})"))
        }
        AgentAction::SwipeUp => directional(device, SwipeDirection::Up).await,
        AgentAction::SwipeDown => directional(device, SwipeDirection::Down).await,
        AgentAction::SwipeLeft => directional(device, SwipeDirection::Left).await,
        AgentAction::SwipeRight => directional(device, SwipeDirection::Right).await,
        AgentAction::TypeText { text } => {
            device.input_text(text).await?;
            Ok(format!("typed {} characters", text.chars().count()))
        }
        AgentAction::PressKey { key } => {
            device.key_event(key).await?;
            Ok(format!("pressed {key}"))
        }
        AgentAction::OpenApp { package } => {
            device.app_start(package).await?;
            Ok(format!("opened {package}"))
        }
        AgentAction::CloseApp { package } => {
            device.app_stop(package).await?;
            Ok(format!("closed {package}"))
        }
        AgentAction::Wait { seconds } => {
            tokio::time::sleep(std::time::Duration::from_secs_f64(seconds.max(0.0))).await;
            Ok(format!("waited {seconds}s"))
        }
        AgentAction::Done { result, .. } => Ok(if result.is_empty() {
            "task complete".to_string()
        } else {
            result.clone()
        }),
    }
}

async fn directional(
    device: &dyn DeviceControl,
    direction: SwipeDirection,
) -> AndroidUseResult<String> {
    let (w, h) = device.screen_size().await?;
    let (x1, y1, x2, y2) = direction.endpoints(w, h);
    device.swipe(x1, y1, x2, y2, default_swipe_ms()).await?;
    Ok(format!("swiped {direction:?}").to_lowercase())
}

/// Action list for the system prompt, grouped the way the model should think
/// about them.
pub fn actions_prompt() -> String {
    let groups: &[(&str, &[(&str, &str, &str)])] = &[
        (
            "NAVIGATION",
            &[
                ("tap", "Tap at screen coordinates", r#"{"x": 540, "y": 1200}"#),
                (
                    "long_press",
                    "Long press at coordinates",
                    r#"{"x": 540, "y": 1200}"#,
                ),
            ],
        ),
        (
            "GESTURE",
            &[
                (
                    "swipe",
                    "Swipe between two points",
                    r#"{"x1": 540, "y1": 1500, "x2": 540, "y2": 500}"#,
                ),
                ("swipe_up", "Swipe up to scroll down", "{}"),
                ("swipe_down", "Swipe down to scroll up", "{}"),
                ("swipe_left", "Swipe left on screen", "{}"),
                ("swipe_right", "Swipe right on screen", "{}"),
            ],
        ),
        (
            "INPUT",
            &[
                (
                    "type_text",
                    "Type into the focused input field",
                    r#"{"text": "hello world"}"#,
                ),
                (
                    "press_key",
                    "Press a system key (home|back|recent|enter|delete)",
                    r#"{"key": "back"}"#,
                ),
                ("press_back", "Press the back button", "{}"),
                ("press_home", "Press the home button", "{}"),
                ("press_enter", "Press enter/submit", "{}"),
            ],
        ),
        (
            "APP",
            &[
                (
                    "open_app",
                    "Open an application by package name",
                    r#"{"package": "com.android.settings"}"#,
                ),
                (
                    "close_app",
                    "Force-stop an application",
                    r#"{"package": "com.android.chrome"}"#,
                ),
            ],
        ),
        (
            "SYSTEM",
            &[
                ("wait", "Wait for content to load", r#"{"seconds": 2.0}"#),
                (
                    "done",
                    "Signal that the task is complete",
                    r#"{"success": true, "result": "what was accomplished"}"#,
                ),
            ],
        ),
    ];

    let mut lines = vec!["Available Actions:".to_string()];
    for (category, actions) in groups {
        lines.push(format!("\n[{category}]"));
        for (name, description, params) in *actions {
            lines.push(format!("  • {name}: {description}"));
            lines.push(format!("    params: {params}"));
        }
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn aliases_fold_into_registered_names() {
        assert_eq!(normalize_action_name("click"), "tap");
        assert_eq!(normalize_action_name("PRESS"), "tap");
        assert_eq!(normalize_action_name("type"), "type_text");
        assert_eq!(normalize_action_name("input"), "type_text");
        assert_eq!(normalize_action_name("stop_app"), "close_app");
        assert_eq!(normalize_action_name("tap"), "tap");
    }

    #[test]
    fn tap_parses_numeric_and_string_coordinates() {
        let a = parse_action("tap", &json!({"x": 540, "y": 1200})).unwrap();
        assert_eq!(a, AgentAction::Tap { x: 540, y: 1200 });
        let b = parse_action("click", &json!({"x": "540", "y": "1200"})).unwrap();
        assert_eq!(a, b);
        let c = parse_action("tap", &json!({"x": 539.6, "y": 1200.2})).unwrap();
        assert_eq!(c, AgentAction::Tap { x: 540, y: 1200 });
    }

    #[test]
    fn missing_coordinate_is_a_validation_error() {
        let err = parse_action("tap", &json!({"x": 540})).unwrap_err();
        assert!(matches!(err, AndroidUseError::ActionValidation(_)));
    }

    #[test]
    fn unknown_action_is_a_parsing_error() {
        let err = parse_action("teleport", &json!({})).unwrap_err();
        assert!(matches!(err, AndroidUseError::ActionParsing(_)));
    }

    #[test]
    fn swipe_accepts_direction_shorthand() {
        let a = parse_action("swipe", &json!({"direction": "up"})).unwrap();
        assert_eq!(a, AgentAction::SwipeUp);
    }

    #[test]
    fn press_variants_become_key_events() {
        assert_eq!(
            parse_action("press_back", &json!({})).unwrap(),
            AgentAction::PressKey { key: "back".into() }
        );
        assert_eq!(
            parse_action("back", &json!({})).unwrap(),
            AgentAction::PressKey { key: "back".into() }
        );
    }

    #[test]
    fn done_defaults_to_success() {
        let a = parse_action("done", &json!({})).unwrap();
        assert_eq!(
            a,
            AgentAction::Done {
                success: true,
                result: String::new()
            }
        );
        let b = parse_action("done", &json!({"success": false, "result": "gave up"})).unwrap();
        assert_eq!(
            b,
            AgentAction::Done {
                success: false,
                result: "gave up".into()
            }
        );
    }

    #[test]
    fn signature_is_stable_for_identical_actions() {
        let a = AgentAction::Tap { x: 1, y: 2 };
        let b = AgentAction::Tap { x: 1, y: 2 };
        assert_eq!(a.signature(), b.signature());
        assert_ne!(a.signature(), AgentAction::Tap { x: 1, y: 3 }.signature());
    }

    #[test]
    fn prompt_lists_every_action_name() {
        let prompt = actions_prompt();
        for name in [
            "tap",
            "long_press",
            "swipe",
            "swipe_up",
            "type_text",
            "press_key",
            "open_app",
            "close_app",
            "wait",
            "done",
        ] {
            assert!(prompt.contains(name), "prompt missing {name}");
        }
    }
}
