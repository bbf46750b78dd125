pub mod adb;
pub mod traits;
pub mod types;

pub use adb::AdbDevice;
pub use traits::DeviceControl;
pub use types::{DeviceInfo, SwipeDirection};
