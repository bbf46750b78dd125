use serde::{Deserialize, Serialize};

use crate::errors::{AndroidUseError, AndroidUseResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub serial: String,
    pub brand: String,
    pub model: String,
    pub android_version: String,
    pub sdk_version: u32,
    pub screen_width: u32,
    pub screen_height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwipeDirection {
    Up,
    Down,
    Left,
    Right,
}

impl SwipeDirection {
    pub fn parse(s: &str) -> AndroidUseResult<Self> {
        match s.to_lowercase().as_str() {
            "up" => Ok(Self::Up),
            "down" => Ok(Self::Down),
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            other => Err(AndroidUseError::ActionValidation(format!(
                "unknown swipe direction '{other}'"
            ))),
        }
    }

    /// Gesture endpoints for a screen of the given size.
    /// Vertical swipes travel between 70% and 30% of the height on the
    /// horizontal center line; horizontal swipes between 80% and 20% of the
    /// width on the vertical center line.
    pub fn endpoints(&self, width: u32, height: u32) -> (i32, i32, i32, i32) {
        let w = width as f64;
        let h = height as f64;
        let at = |v: f64| v.round() as i32;
        let cx = at(w / 2.0);
        let cy = at(h / 2.0);
        match self {
            Self::Up => (cx, at(h * 0.7), cx, at(h * 0.3)),
            Self::Down => (cx, at(h * 0.3), cx, at(h * 0.7)),
            Self::Left => (at(w * 0.8), cy, at(w * 0.2), cy),
            Self::Right => (at(w * 0.2), cy, at(w * 0.8), cy),
        }
    }
}

/// Maps a friendly key name to the `input keyevent` code adb understands.
/// Unrecognized names pass through uppercased so raw KEYCODE_* values work.
pub fn keycode_for(key: &str) -> String {
    match key.to_lowercase().as_str() {
        "back" => "KEYCODE_BACK".into(),
        "home" => "KEYCODE_HOME".into(),
        "enter" => "KEYCODE_ENTER".into(),
        "recent" | "recents" => "KEYCODE_APP_SWITCH".into(),
        "delete" | "del" => "KEYCODE_DEL".into(),
        "tab" => "KEYCODE_TAB".into(),
        "search" => "KEYCODE_SEARCH".into(),
        "menu" => "KEYCODE_MENU".into(),
        "power" => "KEYCODE_POWER".into(),
        "volume_up" => "KEYCODE_VOLUME_UP".into(),
        "volume_down" => "KEYCODE_VOLUME_DOWN".into(),
        other => other.to_uppercase(),
    }
}
