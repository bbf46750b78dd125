use async_trait::async_trait;
use tokio::process::Command;

use crate::config::DeviceConfig;
use crate::device::traits::DeviceControl;
use crate::device::types::{keycode_for, DeviceInfo};
use crate::errors::{AndroidUseError, AndroidUseResult};

/// Device transport speaking plain `adb`. Gestures go through `input`,
/// screenshots through `screencap`, hierarchy dumps through `uiautomator`.
pub struct AdbDevice {
    adb_path: String,
    serial: String,
}

impl AdbDevice {
    pub fn new(adb_path: impl Into<String>, serial: impl Into<String>) -> Self {
        Self {
            adb_path: adb_path.into(),
            serial: serial.into(),
        }
    }

    /// Resolve a concrete device from config. An explicit serial wins;
    /// otherwise the single connected device is picked, with a warning when
    /// several are attached.
    pub async fn connect(config: &DeviceConfig) -> AndroidUseResult<Self> {
        let serial = match &config.serial {
            Some(serial) => serial.clone(),
            None => {
                let devices = list_devices(&config.adb_path).await?;
                match devices.as_slice() {
                    [] => {
                        return Err(AndroidUseError::Device(
                            "no Android devices connected".into(),
                        ))
                    }
                    [only] => only.clone(),
                    [first, ..] => {
                        tracing::warn!(
                            count = devices.len(),
                            picked = %first,
                            "multiple devices connected, picking the first"
                        );
                        first.clone()
                    }
                }
            }
        };
        let device = Self::new(config.adb_path.clone(), serial);
        let info = device.device_info().await?;
        tracing::info!(
            serial = %info.serial,
            brand = %info.brand,
            model = %info.model,
            screen = format!("{}x{}", info.screen_width, info.screen_height),
            android = %info.android_version,
            "connected to device"
        );
        Ok(device)
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    async fn run(&self, args: &[&str]) -> AndroidUseResult<Vec<u8>> {
        let output = Command::new(&self.adb_path)
            .arg("-s")
            .arg(&self.serial)
            .args(args)
            .output()
            .await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AndroidUseError::Adb(format!(
                "adb {} failed: {}",
                args.join(" "),
                stderr.trim()
            )));
        }
        Ok(output.stdout)
    }

    async fn shell(&self, args: &[&str]) -> AndroidUseResult<String> {
        let mut full = vec!["shell"];
        full.extend_from_slice(args);
        let stdout = self.run(&full).await?;
        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }

    async fn getprop(&self, name: &str) -> AndroidUseResult<String> {
        Ok(self.shell(&["getprop", name]).await?.trim().to_string())
    }
}

#[async_trait]
impl DeviceControl for AdbDevice {
    async fn screenshot(&self) -> AndroidUseResult<Vec<u8>> {
        let bytes = self.run(&["exec-out", "screencap", "-p"]).await?;
        if bytes.is_empty() {
            return Err(AndroidUseError::Device("screencap returned no data".into()));
        }
        tracing::debug!(bytes = bytes.len(), "screenshot captured");
        Ok(bytes)
    }

    async fn dump_hierarchy(&self) -> AndroidUseResult<String> {
        // Dumping to /dev/tty streams the XML over stdout, wrapped in a
        // status line that extract_xml strips. Older devices reject the tty
        // path, hence the /sdcard fallback.
        let direct = self
            .run(&["exec-out", "uiautomator", "dump", "--compressed", "/dev/tty"])
            .await?;
        let text = String::from_utf8_lossy(&direct);
        if let Some(xml) = extract_xml(&text) {
            return Ok(xml.to_string());
        }

        self.shell(&["uiautomator", "dump", "--compressed", "/sdcard/window_dump.xml"])
            .await?;
        let dumped = self.shell(&["cat", "/sdcard/window_dump.xml"]).await?;
        extract_xml(&dumped)
            .map(str::to_string)
            .ok_or_else(|| AndroidUseError::Hierarchy("uiautomator dump produced no XML".into()))
    }

    async fn tap(&self, x: i32, y: i32) -> AndroidUseResult<()> {
        self.shell(&["input", "tap", &x.to_string(), &y.to_string()])
            .await?;
        tracing::debug!(x, y, "tap");
        Ok(())
    }

    async fn swipe(
        &self,
        x1: i32,
        y1: i32,
        x2: i32,
        y2: i32,
        duration_ms: u32,
    ) -> AndroidUseResult<()> {
        self.shell(&[
            "input",
            "swipe",
            &x1.to_string(),
            &y1.to_string(),
            &x2.to_string(),
            &y2.to_string(),
            &duration_ms.to_string(),
        ])
        .await?;
        tracing::debug!(x1, y1, x2, y2, duration_ms, "swipe");
        Ok(())
    }

    async fn input_text(&self, text: &str) -> AndroidUseResult<()> {
        let escaped = escape_input_text(text);
        self.shell(&["input", "text", &escaped]).await?;
        tracing::debug!(chars = text.chars().count(), "text typed");
        Ok(())
    }

    async fn key_event(&self, key: &str) -> AndroidUseResult<()> {
        let code = keycode_for(key);
        self.shell(&["input", "keyevent", &code]).await?;
        tracing::debug!(key = %code, "key event");
        Ok(())
    }

    async fn app_start(&self, package: &str) -> AndroidUseResult<()> {
        self.shell(&[
            "monkey",
            "-p",
            package,
            "-c",
            "android.intent.category.LAUNCHER",
            "1",
        ])
        .await?;
        tracing::info!(package = %package, "app started");
        Ok(())
    }

    async fn app_stop(&self, package: &str) -> AndroidUseResult<()> {
        self.shell(&["am", "force-stop", package]).await?;
        tracing::info!(package = %package, "app stopped");
        Ok(())
    }

    async fn screen_size(&self) -> AndroidUseResult<(u32, u32)> {
        let out = self.shell(&["wm", "size"]).await?;
        parse_wm_size(&out)
            .ok_or_else(|| AndroidUseError::Device(format!("unparsable wm size output: {out}")))
    }

    async fn current_app(&self) -> AndroidUseResult<Option<String>> {
        // Window focus is the reliable signal on older builds; newer ones
        // report it under the activity resume record instead.
        let windows = self.shell(&["dumpsys", "window"]).await?;
        if let Some(package) = parse_focused_package(&windows) {
            return Ok(Some(package));
        }
        let activities = self.shell(&["dumpsys", "activity", "activities"]).await?;
        Ok(parse_focused_package(&activities))
    }

    async fn device_info(&self) -> AndroidUseResult<DeviceInfo> {
        let brand = self.getprop("ro.product.brand").await?;
        let model = self.getprop("ro.product.model").await?;
        let android_version = self.getprop("ro.build.version.release").await?;
        let sdk_version = self
            .getprop("ro.build.version.sdk")
            .await?
            .parse()
            .unwrap_or(0);
        let (screen_width, screen_height) = self.screen_size().await?;
        Ok(DeviceInfo {
            serial: self.serial.clone(),
            brand,
            model,
            android_version,
            sdk_version,
            screen_width,
            screen_height,
        })
    }
}

/// List serials of devices currently in the `device` state.
pub async fn list_devices(adb_path: &str) -> AndroidUseResult<Vec<String>> {
    let output = Command::new(adb_path).arg("devices").output().await?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(AndroidUseError::Adb(format!(
            "adb devices failed: {}",
            stderr.trim()
        )));
    }
    Ok(parse_device_list(&String::from_utf8_lossy(&output.stdout)))
}

/// Serials from `adb devices` output. Skips the header, offline devices and
/// unauthorized entries.
fn parse_device_list(output: &str) -> Vec<String> {
    output
        .lines()
        .skip(1)
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let serial = parts.next()?;
            match parts.next() {
                Some("device") => Some(serial.to_string()),
                _ => None,
            }
        })
        .collect()
}

/// Effective screen size from `wm size`; an override line wins over the
/// physical one.
fn parse_wm_size(output: &str) -> Option<(u32, u32)> {
    let mut physical = None;
    let mut display_override = None;
    for line in output.lines() {
        if let Some((label, value)) = line.split_once(':') {
            if let Some((w, h)) = value.trim().split_once('x') {
                if let (Ok(w), Ok(h)) = (w.trim().parse::<u32>(), h.trim().parse::<u32>()) {
                    if label.contains("Override") {
                        display_override = Some((w, h));
                    } else {
                        physical = Some((w, h));
                    }
                }
            }
        }
    }
    display_override.or(physical)
}

/// `input text` goes through the remote shell, so spaces become %s and
/// shell metacharacters get backslash-escaped.
fn escape_input_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            ' ' => out.push_str("%s"),
            '\\' | '"' | '\'' | '`' | '$' | '&' | '|' | ';' | '(' | ')' | '<' | '>' | '*'
            | '~' | '#' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

/// Foreground package from dumpsys output. Focus lines look like
/// `mCurrentFocus=Window{8160e6 u0 com.android.settings/.Settings}`.
fn parse_focused_package(output: &str) -> Option<String> {
    for line in output.lines() {
        let line = line.trim_start();
        if !(line.starts_with("mCurrentFocus")
            || line.starts_with("mFocusedApp")
            || line.starts_with("mResumedActivity"))
        {
            continue;
        }
        for token in line.split_whitespace() {
            if let Some((package, _activity)) = token.split_once('/') {
                if package.contains('.') && !package.contains('=') {
                    return Some(package.to_string());
                }
            }
        }
    }
    None
}

/// Slice out the XML document from uiautomator output, dropping the
/// "UI hierchary dumped to" status line the tool appends.
fn extract_xml(text: &str) -> Option<&str> {
    let start = text.find('<')?;
    let end = text.rfind('>')?;
    if end <= start {
        return None;
    }
    Some(&text[start..=end])
}
