//! Frequency analysis.
//!
//! Produces byte-scaled magnitude spectra the same way a browser's
//! `AnalyserNode` does: Blackman window, FFT, magnitude scaled by `1/N`,
//! exponential smoothing between reads, conversion to decibels and a linear
//! map of `[min_decibels, max_decibels]` onto `0..=255`.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::f32::consts::PI;

use dasp_ring_buffer::Fixed;
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use crate::config::AnalyserConfig;

/// The latest audio measurement for one source.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FeatureSnapshot {
    /// Mean bin magnitude normalized to `[0, 1]`.
    pub amplitude: f32,
    /// Raw per-bin magnitudes.
    pub frequencies: Vec<u8>,
    /// Currently the same value as `amplitude`.
    pub average_frequency: f32,
}

impl FeatureSnapshot {
    /// The snapshot reported for sources that aren't ready.
    pub fn silent() -> Self {
        Self::default()
    }

    pub fn from_bins(frequencies: Vec<u8>) -> Self {
        let amplitude = mean_magnitude(&frequencies);
        Self {
            amplitude,
            frequencies,
            average_frequency: amplitude,
        }
    }

    pub fn is_silent(&self) -> bool {
        self.amplitude == 0.0
    }
}

/// Mean of `bins` divided by 255. Zero for an empty slice.
pub fn mean_magnitude(bins: &[u8]) -> f32 {
    if bins.is_empty() {
        return 0.0;
    }
    let sum: u64 = bins.iter().map(|&b| u64::from(b)).sum();
    (sum as f64 / bins.len() as f64 / 255.0) as f32
}

/// The most recent `fft_size` mono samples of a source, oldest first.
pub struct SampleWindow {
    ring: Fixed<Vec<f32>>,
}

impl SampleWindow {
    pub fn new(len: usize) -> Self {
        Self {
            ring: Fixed::from(vec![0.0; len.max(1)]),
        }
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.len() == 0
    }

    #[inline]
    pub fn push(&mut self, sample: f32) {
        self.ring.push(sample);
    }

    pub fn iter(&self) -> impl Iterator<Item = f32> + '_ {
        self.ring.iter().copied()
    }

    pub fn clear(&mut self) {
        for _ in 0..self.ring.len() {
            self.ring.push(0.0);
        }
    }
}

/// Per-source FFT analyser.
pub struct Analyser {
    config: AnalyserConfig,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    smoothed: Vec<f32>,
    bytes: Vec<u8>,
}

impl Analyser {
    /// Build an analyser, reusing `planner`'s cached FFT plans.
    pub fn new(config: AnalyserConfig, planner: &mut FftPlanner<f32>) -> Self {
        let config = config.sanitized();
        let n = config.fft_size;
        let fft = planner.plan_fft_forward(n);
        let scratch = vec![Complex::default(); fft.get_inplace_scratch_len()];

        Self {
            config,
            fft,
            window: blackman(n),
            buffer: vec![Complex::default(); n],
            scratch,
            smoothed: vec![0.0; n / 2],
            bytes: vec![0; n / 2],
        }
    }

    pub fn config(&self) -> &AnalyserConfig {
        &self.config
    }

    pub fn fft_size(&self) -> usize {
        self.config.fft_size
    }

    pub fn bin_count(&self) -> usize {
        self.bytes.len()
    }

    /// Analyse the latest window and return the byte spectrum.
    ///
    /// Short input is zero padded at the front so the newest sample always
    /// sits at the end of the window.
    pub fn analyse(&mut self, samples: impl IntoIterator<Item = f32>) -> &[u8] {
        let n = self.config.fft_size;
        let recent: Vec<f32> = samples.into_iter().collect();
        let skip = recent.len().saturating_sub(n);
        let pad = n - (recent.len() - skip);

        for (i, c) in self.buffer.iter_mut().enumerate() {
            let s = if i < pad { 0.0 } else { recent[skip + i - pad] };
            *c = Complex::new(s * self.window[i], 0.0);
        }

        self.fft
            .process_with_scratch(&mut self.buffer, &mut self.scratch);

        let tau = self.config.smoothing_time_constant;
        let min = self.config.min_decibels;
        let range = self.config.max_decibels - min;
        let scale = 1.0 / n as f32;

        for (k, byte) in self.bytes.iter_mut().enumerate() {
            let magnitude = self.buffer[k].norm() * scale;
            let mut smoothed = tau * self.smoothed[k] + (1.0 - tau) * magnitude;
            if !smoothed.is_finite() {
                smoothed = 0.0;
            }
            self.smoothed[k] = smoothed;

            *byte = if smoothed <= 0.0 {
                0
            } else {
                let db = 20.0 * smoothed.log10();
                (255.0 / range * (db - min)).floor().clamp(0.0, 255.0) as u8
            };
        }

        &self.bytes
    }

    /// Analyse `samples` and wrap the result as a snapshot.
    pub fn snapshot(&mut self, samples: impl IntoIterator<Item = f32>) -> FeatureSnapshot {
        let bins = self.analyse(samples).to_vec();
        FeatureSnapshot::from_bins(bins)
    }

    /// Forget smoothing history.
    pub fn reset(&mut self) {
        self.smoothed.iter_mut().for_each(|s| *s = 0.0);
        self.bytes.iter_mut().for_each(|b| *b = 0);
    }
}

fn blackman(n: usize) -> Vec<f32> {
    const A0: f32 = 0.42;
    const A1: f32 = 0.5;
    const A2: f32 = 0.08;
    let n_f = n as f32;
    (0..n)
        .map(|i| {
            let x = i as f32 / n_f;
            A0 - A1 * (2.0 * PI * x).cos() + A2 * (4.0 * PI * x).cos()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyser() -> Analyser {
        Analyser::new(AnalyserConfig::default(), &mut FftPlanner::new())
    }

    fn sine(len: usize, bin: usize, fft_size: usize) -> impl Iterator<Item = f32> {
        (0..len).map(move |i| (2.0 * PI * bin as f32 * i as f32 / fft_size as f32).sin())
    }

    #[test]
    fn amplitude_is_normalized() {
        assert_eq!(mean_magnitude(&[]), 0.0);
        assert_eq!(mean_magnitude(&[255; 128]), 1.0);
        assert_eq!(mean_magnitude(&[0; 128]), 0.0);

        let ramp: Vec<u8> = (0..=255).collect();
        let a = mean_magnitude(&ramp);
        assert!((0.0..=1.0).contains(&a));
        assert!((a - 0.5).abs() < 1e-6);
    }

    #[test]
    fn silence_is_all_zero() {
        let mut a = analyser();
        let snap = a.snapshot(core::iter::repeat(0.0).take(256));
        assert_eq!(snap.frequencies.len(), 128);
        assert!(snap.frequencies.iter().all(|&b| b == 0));
        assert!(snap.is_silent());
    }

    #[test]
    fn sine_peaks_at_its_bin() {
        let mut a = Analyser::new(
            AnalyserConfig::default().with_smoothing(0.0),
            &mut FftPlanner::new(),
        );
        let bins = a.analyse(sine(256, 16, 256)).to_vec();

        assert_eq!(bins[16], 255);
        assert!(bins[15] > 0 && bins[17] > 0);
        assert_eq!(bins[100], 0);
        assert_eq!(bins[2], 0);
    }

    #[test]
    fn smoothing_decays_towards_silence() {
        let mut a = analyser();
        let loud = a.snapshot(sine(256, 8, 256)).amplitude;
        let after = a.snapshot(core::iter::repeat(0.0).take(256)).amplitude;
        assert!(loud > 0.0);
        assert!(after > 0.0 && after <= loud);

        a.reset();
        assert!(a.snapshot(core::iter::repeat(0.0).take(256)).is_silent());
    }

    #[test]
    fn short_input_is_padded() {
        let mut a = analyser();
        assert_eq!(a.analyse([1.0; 10]).len(), 128);
    }

    #[test]
    fn window_keeps_latest_samples() {
        let mut w = SampleWindow::new(4);
        for s in 1..=6 {
            w.push(s as f32);
        }
        assert_eq!(w.iter().collect::<Vec<_>>(), [3.0, 4.0, 5.0, 6.0]);
        w.clear();
        assert!(w.iter().all(|s| s == 0.0));
    }
}
