//! Capture device discovery.
//!
//! This module provides [`CaptureDevice`] for discovering audio input devices
//! and building a capture backend bound to one of them.
//!
//! # Example: List and Select a Device
//!
//! ```no_run
//! use std::sync::Arc;
//! use resonode::{AudioEngine, CaptureDevice, EngineConfig};
//!
//! // List all available input devices
//! let devices = CaptureDevice::list_inputs();
//! for (i, device) in devices.iter().enumerate() {
//!     println!("[{}] {} ({} Hz, {} ch)",
//!         i, device.name(), device.sample_rate(), device.channels());
//! }
//!
//! // Capture from a specific device
//! # #[cfg(feature = "cpal_capture")]
//! let engine = AudioEngine::new(EngineConfig::default())
//!     .with_capture_backend(Arc::new(devices[0].backend()));
//! ```

use alloc::string::String;
use alloc::vec::Vec;

#[cfg(feature = "cpal_capture")]
use cpal::traits::{DeviceTrait, HostTrait};

/// A discovered audio input device.
///
/// Use [`CaptureDevice::default_input`] to get the system default, or
/// [`CaptureDevice::list_inputs`] to enumerate all available devices.
/// Without the `cpal_capture` feature there are never any devices.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaptureDevice {
    name: String,
    sample_rate: u32,
    channels: u16,
}

impl CaptureDevice {
    /// Get the system's default input device.
    ///
    /// Returns `None` if no input device is available.
    #[cfg(feature = "cpal_capture")]
    pub fn default_input() -> Option<Self> {
        let host = cpal::default_host();
        let device = host.default_input_device()?;
        Self::describe(&device)
    }

    #[cfg(not(feature = "cpal_capture"))]
    pub fn default_input() -> Option<Self> {
        None
    }

    /// List all available audio input devices.
    ///
    /// Returns an empty list if no devices are found or if enumeration fails.
    #[cfg(feature = "cpal_capture")]
    pub fn list_inputs() -> Vec<Self> {
        let host = cpal::default_host();
        host.input_devices()
            .map(|devices| devices.filter_map(|d| Self::describe(&d)).collect())
            .unwrap_or_default()
    }

    #[cfg(not(feature = "cpal_capture"))]
    pub fn list_inputs() -> Vec<Self> {
        Vec::new()
    }

    #[cfg(feature = "cpal_capture")]
    fn describe(device: &cpal::Device) -> Option<Self> {
        let config = device.default_input_config().ok()?;
        Some(Self {
            name: device.name().unwrap_or_else(|_| "Unknown".into()),
            sample_rate: config.sample_rate().0,
            channels: config.channels(),
        })
    }

    /// Get the device name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the device's default sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Get the number of input channels. Capture always downmixes to mono.
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// A capture backend that opens this device.
    #[cfg(feature = "cpal_capture")]
    pub fn backend(&self) -> crate::audio::CpalCapture {
        crate::audio::CpalCapture::default().with_device(self.name.clone())
    }
}
