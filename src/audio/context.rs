//! The shared processing context.

use std::time::Instant;

use rustfft::FftPlanner;
use tracing::info;

use crate::audio::analyser::Analyser;
use crate::config::AnalyserConfig;

/// State shared by every source of one engine.
///
/// Created the first time a source is acquired and torn down once by
/// [`AudioEngine::release_all`](super::AudioEngine::release_all).
pub struct AudioContext {
    planner: FftPlanner<f32>,
    analyser: AnalyserConfig,
    created: Instant,
}

impl AudioContext {
    pub(crate) fn new(analyser: AnalyserConfig) -> Self {
        let analyser = analyser.sanitized();
        info!(
            fft_size = analyser.fft_size,
            bins = analyser.bin_count(),
            "audio context created"
        );
        Self {
            planner: FftPlanner::new(),
            analyser,
            created: Instant::now(),
        }
    }

    /// A fresh analyser sharing this context's FFT plans.
    pub fn analyser(&mut self) -> Analyser {
        Analyser::new(self.analyser, &mut self.planner)
    }

    pub fn analyser_config(&self) -> &AnalyserConfig {
        &self.analyser
    }

    /// Time since the context was created.
    pub fn uptime(&self) -> core::time::Duration {
        self.created.elapsed()
    }
}

impl Drop for AudioContext {
    fn drop(&mut self) {
        info!(uptime = ?self.created.elapsed(), "audio context closed");
    }
}
