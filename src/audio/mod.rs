//! Audio frames, sources and renderers

pub mod frame;
pub mod meter;
pub mod synthetic;

#[cfg(feature = "device-audio")]
pub mod capture;
#[cfg(feature = "device-audio")]
pub mod device;
#[cfg(feature = "device-audio")]
pub mod playback;

pub use frame::AudioFrame;
pub use meter::{MeterRenderer, MeterStats, NullRenderer};
pub use synthetic::SyntheticSource;

#[cfg(feature = "device-audio")]
pub use capture::CpalCapture;
#[cfg(feature = "device-audio")]
pub use device::{find_device, list_devices, AudioDeviceInfo};
#[cfg(feature = "device-audio")]
pub use playback::CpalPlayback;
