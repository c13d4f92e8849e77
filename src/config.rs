//! Engine and binding configuration.
//!
//! Every struct has sensible defaults and `with_*` builder methods, and can be
//! deserialized from JSON with missing fields falling back to the defaults:
//!
//! ```
//! use resonode::SceneConfig;
//!
//! let config: SceneConfig = serde_json::from_str(
//!     r#"{ "engine": { "analyser": { "fftSize": 512 } }, "binding": { "traversal": "unique" } }"#,
//! ).unwrap();
//! assert_eq!(config.engine.analyser.bin_count(), 256);
//! ```

use serde::{Deserialize, Serialize};

use crate::resolve::Traversal;

/// Source id used by audio-reactive nodes that don't name a source.
pub const DEFAULT_SOURCE_ID: &str = "default-microphone";

const MIN_FFT_SIZE: usize = 32;
const MAX_FFT_SIZE: usize = 32768;

/// Frequency analyser settings.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AnalyserConfig {
    /// Window length in samples. A power of two in `32..=32768`; yields
    /// `fft_size / 2` frequency bins.
    pub fft_size: usize,
    /// Averaging constant in `[0, 1)` applied between successive reads.
    pub smoothing_time_constant: f32,
    /// Level mapped to byte 0.
    pub min_decibels: f32,
    /// Level mapped to byte 255.
    pub max_decibels: f32,
}

impl Default for AnalyserConfig {
    fn default() -> Self {
        Self {
            fft_size: 256,
            smoothing_time_constant: 0.8,
            min_decibels: -100.0,
            max_decibels: -30.0,
        }
    }
}

impl AnalyserConfig {
    /// Set the window length, rounded up to a power of two and clamped to the
    /// supported range.
    pub fn with_fft_size(mut self, fft_size: usize) -> Self {
        self.fft_size = fft_size;
        self.sanitized()
    }

    pub fn with_smoothing(mut self, smoothing_time_constant: f32) -> Self {
        self.smoothing_time_constant = smoothing_time_constant;
        self.sanitized()
    }

    pub fn with_decibel_range(mut self, min_decibels: f32, max_decibels: f32) -> Self {
        self.min_decibels = min_decibels;
        self.max_decibels = max_decibels;
        self.sanitized()
    }

    /// Number of frequency bins produced per read.
    pub fn bin_count(&self) -> usize {
        self.sanitized().fft_size / 2
    }

    /// A copy with every field forced into its valid range.
    pub fn sanitized(mut self) -> Self {
        self.fft_size = self
            .fft_size
            .clamp(MIN_FFT_SIZE, MAX_FFT_SIZE)
            .next_power_of_two();
        if self.smoothing_time_constant.is_nan() {
            self.smoothing_time_constant = AnalyserConfig::default().smoothing_time_constant;
        } else if !(0.0..1.0).contains(&self.smoothing_time_constant) {
            self.smoothing_time_constant = self.smoothing_time_constant.clamp(0.0, 0.99);
        }
        if self.max_decibels <= self.min_decibels {
            let d = AnalyserConfig::default();
            self.min_decibels = d.min_decibels;
            self.max_decibels = d.max_decibels;
        }
        self
    }
}

/// Audio feature engine settings.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    pub analyser: AnalyserConfig,
    /// Capacity, in mono samples, of the ring buffer between a capture stream
    /// and its analyser.
    pub capture_buffer_frames: usize,
    /// Sample rate assumed when a backend doesn't report one.
    pub fallback_sample_rate: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            analyser: AnalyserConfig::default(),
            capture_buffer_frames: 16384,
            fallback_sample_rate: 48000,
        }
    }
}

impl EngineConfig {
    pub fn with_analyser(mut self, analyser: AnalyserConfig) -> Self {
        self.analyser = analyser.sanitized();
        self
    }

    pub fn with_capture_buffer_frames(mut self, frames: usize) -> Self {
        self.capture_buffer_frames = frames.max(1);
        self
    }
}

/// Reactive binding settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BindingConfig {
    /// Feature source for audio-reactive nodes without an `audioSourceId`.
    pub default_source_id: String,
    /// Rotation added per tick at amplitude × sensitivity = 1, in radians.
    pub rotation_step: f32,
    pub traversal: Traversal,
    /// Start capturing into the default source the first time a node needs it.
    pub auto_acquire_default_capture: bool,
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            default_source_id: DEFAULT_SOURCE_ID.to_owned(),
            rotation_step: 0.1,
            traversal: Traversal::PerPath,
            auto_acquire_default_capture: true,
        }
    }
}

impl BindingConfig {
    pub fn with_traversal(mut self, traversal: Traversal) -> Self {
        self.traversal = traversal;
        self
    }

    pub fn with_rotation_step(mut self, step: f32) -> Self {
        self.rotation_step = step;
        self
    }

    pub fn with_default_source_id(mut self, id: impl Into<String>) -> Self {
        self.default_source_id = id.into();
        self
    }

    pub fn with_auto_acquire(mut self, enabled: bool) -> Self {
        self.auto_acquire_default_capture = enabled;
        self
    }
}

/// Everything a [`Scene`](crate::Scene) needs.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    pub engine: EngineConfig,
    pub binding: BindingConfig,
}

impl SceneConfig {
    pub fn with_engine(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_binding(mut self, binding: BindingConfig) -> Self {
        self.binding = binding;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fft_size_is_sanitized() {
        assert_eq!(AnalyserConfig::default().with_fft_size(300).fft_size, 512);
        assert_eq!(AnalyserConfig::default().with_fft_size(1).fft_size, 32);
        assert_eq!(AnalyserConfig::default().with_fft_size(1 << 20).fft_size, 32768);
        assert_eq!(AnalyserConfig::default().bin_count(), 128);
    }

    #[test]
    fn inverted_decibel_range_falls_back() {
        let c = AnalyserConfig::default().with_decibel_range(-10.0, -50.0);
        assert_eq!(c.min_decibels, -100.0);
        assert_eq!(c.max_decibels, -30.0);
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config: SceneConfig =
            serde_json::from_str(r#"{ "binding": { "rotationStep": 0.2 } }"#).unwrap();
        assert_eq!(config.binding.rotation_step, 0.2);
        assert_eq!(config.binding.default_source_id, DEFAULT_SOURCE_ID);
        assert_eq!(config.engine, EngineConfig::default());
    }
}
