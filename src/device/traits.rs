use async_trait::async_trait;

use crate::device::types::DeviceInfo;
use crate::errors::AndroidUseResult;

/// Primitive operations the agent needs from an Android device.
/// One implementation ships (adb shell transport); the seam exists so the
/// agent loop and swarm can be driven by a fake in tests.
#[async_trait]
pub trait DeviceControl: Send + Sync {
    /// Capture the current screen as PNG bytes.
    async fn screenshot(&self) -> AndroidUseResult<Vec<u8>>;

    /// Dump the UI hierarchy as raw uiautomator XML.
    async fn dump_hierarchy(&self) -> AndroidUseResult<String>;

    async fn tap(&self, x: i32, y: i32) -> AndroidUseResult<()>;

    async fn swipe(&self, x1: i32, y1: i32, x2: i32, y2: i32, duration_ms: u32)
        -> AndroidUseResult<()>;

    /// Type text into the focused element.
    async fn input_text(&self, text: &str) -> AndroidUseResult<()>;

    /// Press a named device key ("back", "home", "enter", ...).
    async fn key_event(&self, key: &str) -> AndroidUseResult<()>;

    async fn app_start(&self, package: &str) -> AndroidUseResult<()>;

    async fn app_stop(&self, package: &str) -> AndroidUseResult<()>;

    /// Screen dimensions in pixels, (width, height).
    async fn screen_size(&self) -> AndroidUseResult<(u32, u32)>;

    /// Package name of the foreground app, when it can be determined.
    async fn current_app(&self) -> AndroidUseResult<Option<String>>;

    async fn device_info(&self) -> AndroidUseResult<DeviceInfo>;
}
