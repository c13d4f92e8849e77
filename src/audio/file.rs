//! File-backed sources.
//!
//! A file is decoded completely up front into interleaved `f32` samples and
//! then played back on a virtual clock: every analyser read advances the
//! cursor by the wall time elapsed since the previous read. Playback loops
//! forever.

use alloc::string::ToString;
use alloc::sync::Arc;
use alloc::vec::Vec;
use std::time::Instant;

use crate::audio::analyser::SampleWindow;
use crate::error::AcquireError;

/// Fully decoded audio.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedAudio {
    /// Interleaved samples in `[-1, 1]`.
    pub samples: Vec<f32>,
    pub channels: usize,
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn new(samples: Vec<f32>, channels: usize, sample_rate: u32) -> Self {
        Self {
            samples,
            channels: channels.max(1),
            sample_rate,
        }
    }

    /// Number of frames (samples per channel).
    #[inline]
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels
    }

    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / f64::from(self.sample_rate.max(1))
    }

    /// The frame at `index`, averaged down to mono.
    #[inline]
    fn mono(&self, index: usize) -> f32 {
        let start = index * self.channels;
        let frame = &self.samples[start..start + self.channels];
        frame.iter().sum::<f32>() / self.channels as f32
    }
}

/// Turns the bytes of an audio file into samples.
///
/// Runs on a worker thread, so implementations must be `Send + Sync`.
pub trait Decoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedAudio, AcquireError>;
}

impl<F> Decoder for F
where
    F: Fn(&[u8]) -> Result<DecodedAudio, AcquireError> + Send + Sync,
{
    fn decode(&self, bytes: &[u8]) -> Result<DecodedAudio, AcquireError> {
        self(bytes)
    }
}

/// Ogg Vorbis decoding through `lewton`.
#[cfg(feature = "vorbis_src")]
#[derive(Clone, Copy, Debug, Default)]
pub struct VorbisDecoder;

#[cfg(feature = "vorbis_src")]
impl Decoder for VorbisDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedAudio, AcquireError> {
        use dasp_sample::Sample;
        use lewton::inside_ogg::OggStreamReader;

        let decode_err = |e: lewton::VorbisError| AcquireError::Decode(e.to_string());

        let mut reader = OggStreamReader::new(std::io::Cursor::new(bytes)).map_err(decode_err)?;
        let channels = usize::from(reader.ident_hdr.audio_channels);
        let sample_rate = reader.ident_hdr.audio_sample_rate;

        let mut samples = Vec::new();
        while let Some(packet) = reader.read_dec_packet_itl().map_err(decode_err)? {
            samples.extend(packet.into_iter().map(|s| s.to_sample::<f32>()));
        }

        if samples.is_empty() {
            return Err(AcquireError::Decode("stream contains no audio".into()));
        }
        Ok(DecodedAudio::new(samples, channels, sample_rate))
    }
}

/// Used when no decoder was compiled in.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoDecoder;

impl Decoder for NoDecoder {
    fn decode(&self, _bytes: &[u8]) -> Result<DecodedAudio, AcquireError> {
        Err(AcquireError::Decode(
            "no audio decoder available (enable the `vorbis_src` feature)".to_string(),
        ))
    }
}

/// The decoder an engine uses unless told otherwise.
pub fn default_decoder() -> Arc<dyn Decoder> {
    #[cfg(feature = "vorbis_src")]
    {
        Arc::new(VorbisDecoder)
    }
    #[cfg(not(feature = "vorbis_src"))]
    {
        Arc::new(NoDecoder)
    }
}

/// Looping playback of decoded audio.
pub struct FilePlayback {
    audio: DecodedAudio,
    /// Current frame.
    position: usize,
    /// Fractional frames carried between reads.
    carry: f64,
    playing: bool,
    volume: f32,
    last_read: Instant,
}

impl FilePlayback {
    /// Start playing `audio` from the beginning.
    pub fn new(audio: DecodedAudio) -> Self {
        Self::started_at(audio, Instant::now())
    }

    pub(crate) fn started_at(audio: DecodedAudio, now: Instant) -> Self {
        Self {
            audio,
            position: 0,
            carry: 0.0,
            playing: true,
            volume: 1.0,
            last_read: now,
        }
    }

    pub fn audio(&self) -> &DecodedAudio {
        &self.audio
    }

    #[inline]
    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn play(&mut self) {
        if !self.playing {
            self.playing = true;
            self.last_read = Instant::now();
        }
    }

    pub fn pause(&mut self) {
        self.playing = false;
    }

    #[inline]
    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Set the volume, clamped to `[0, 1]`. NaN mutes.
    pub fn set_volume(&mut self, volume: f32) {
        self.volume = if volume.is_nan() { 0.0 } else { volume.clamp(0.0, 1.0) };
    }

    pub fn position_secs(&self) -> f64 {
        self.position as f64 / f64::from(self.audio.sample_rate.max(1))
    }

    /// Advance the cursor to `now` and feed the frames played since the last
    /// read into `window`.
    ///
    /// While paused the window keeps its contents and the cursor stays put.
    pub fn advance(&mut self, now: Instant, window: &mut SampleWindow) {
        let elapsed = now.saturating_duration_since(self.last_read);
        self.last_read = now;
        if !self.playing {
            return;
        }

        let exact = elapsed.as_secs_f64() * f64::from(self.audio.sample_rate) + self.carry;
        let frames = exact.floor() as usize;
        self.carry = exact - frames as f64;
        self.advance_frames(frames, window);
    }

    /// Advance by exactly `frames`.
    pub fn advance_frames(&mut self, frames: usize, window: &mut SampleWindow) {
        let total = self.audio.frames();
        if total == 0 || frames == 0 {
            return;
        }

        // Frames older than the window would be overwritten anyway.
        let skip = frames.saturating_sub(window.len());
        self.position = (self.position + skip) % total;

        for _ in skip..frames {
            window.push(self.audio.mono(self.position) * self.volume);
            self.position += 1;
            if self.position >= total {
                self.position = 0;
            }
        }
    }
}
