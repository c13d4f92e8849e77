//! The audio feature engine.
//!
//! [`AudioEngine`] owns every audio source by id and turns each into a
//! [`FeatureSnapshot`] on demand. Acquisition is asynchronous: `acquire_*`
//! starts the work on a worker thread and returns immediately, and
//! [`AudioEngine::poll`] registers whatever has finished since. Until a
//! source is registered its features read as silence.
//!
//! ```no_run
//! use resonode::audio::AudioEngine;
//! use resonode::EngineConfig;
//!
//! let mut engine = AudioEngine::new(EngineConfig::default());
//! engine.acquire_capture("default-microphone")?;
//!
//! loop {
//!     for (id, outcome) in engine.poll() {
//!         if let Err(e) = outcome {
//!             eprintln!("{id}: {e}");
//!         }
//!     }
//!     let features = engine.get_features("default-microphone");
//!     println!("{:.2}", features.amplitude);
//! #   break;
//! }
//! # Ok::<(), resonode::AcquireError>(())
//! ```

pub mod analyser;
pub mod capture;
pub mod context;
pub mod file;

use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::panic::AssertUnwindSafe;
use std::panic::catch_unwind;
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender};
use hashbrown::HashMap;
use rtrb::{Consumer, RingBuffer};
use tracing::{debug, info, trace, warn};

pub use analyser::{mean_magnitude, Analyser, FeatureSnapshot, SampleWindow};
pub use capture::{CaptureBackend, CaptureGuard, CaptureHandle, NoCapture};
pub use context::AudioContext;
pub use file::{DecodedAudio, Decoder, FilePlayback, NoDecoder};
#[cfg(feature = "vorbis_src")]
pub use file::VorbisDecoder;
#[cfg(feature = "cpal_capture")]
pub use capture::cpal_backend::CpalCapture;

use crate::config::EngineConfig;
use crate::error::AcquireError;
use crate::params::Blob;

/// Where a source's samples come from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceKind {
    Capture,
    File,
}

/// Acquisition state of a source id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceStatus {
    /// Nothing is registered or in flight under this id.
    Unregistered,
    /// Acquisition has started and not finished.
    Pending(SourceKind),
    /// Registered; features are live.
    Ready(SourceKind),
    /// The last acquisition failed. Not retried.
    Failed(AcquireError),
}

/// A registered source.
struct AudioSource {
    analyser: Analyser,
    window: SampleWindow,
    input: SourceInput,
    sample_rate: u32,
}

enum SourceInput {
    Capture {
        samples: Consumer<f32>,
        handle: CaptureHandle,
    },
    File {
        playback: FilePlayback,
        blob: Blob,
    },
}

impl SourceInput {
    fn kind(&self) -> SourceKind {
        match self {
            SourceInput::Capture { .. } => SourceKind::Capture,
            SourceInput::File { .. } => SourceKind::File,
        }
    }
}

impl AudioSource {
    fn read(&mut self, now: Instant) -> FeatureSnapshot {
        match &mut self.input {
            SourceInput::Capture { samples, .. } => {
                while let Ok(s) = samples.pop() {
                    self.window.push(s);
                }
            }
            SourceInput::File { playback, .. } => playback.advance(now, &mut self.window),
        }
        self.analyser.snapshot(self.window.iter())
    }

    fn release(&mut self) {
        match &mut self.input {
            SourceInput::Capture { handle, .. } => {
                handle.stop();
            }
            SourceInput::File { playback, .. } => playback.pause(),
        }
    }
}

/// An acquisition in flight.
enum Pending {
    Capture {
        ticket: u64,
        handle: CaptureHandle,
        samples: Consumer<f32>,
    },
    File {
        ticket: u64,
        blob: Blob,
    },
}

impl Pending {
    fn ticket(&self) -> u64 {
        match self {
            Pending::Capture { ticket, .. } | Pending::File { ticket, .. } => *ticket,
        }
    }

    fn kind(&self) -> SourceKind {
        match self {
            Pending::Capture { .. } => SourceKind::Capture,
            Pending::File { .. } => SourceKind::File,
        }
    }

    fn cancel(self) {
        if let Pending::Capture { handle, .. } = self {
            handle.detach();
        }
    }
}

/// Result sent back by a worker thread.
struct Completion {
    id: String,
    ticket: u64,
    result: Result<Ready, AcquireError>,
}

enum Ready {
    Capture { sample_rate: u32 },
    File(DecodedAudio),
}

/// Owns audio sources and computes their features.
///
/// One engine is meant to serve a whole application; create it at startup
/// and call [`release_all`](Self::release_all) at shutdown. After that every
/// acquisition fails with [`AcquireError::Disposed`].
pub struct AudioEngine {
    config: EngineConfig,
    context: Option<AudioContext>,
    disposed: bool,
    sources: HashMap<String, AudioSource>,
    pending: HashMap<String, Pending>,
    failures: HashMap<String, AcquireError>,
    next_ticket: u64,
    completions_tx: Sender<Completion>,
    completions_rx: Receiver<Completion>,
    capture_backend: Arc<dyn CaptureBackend>,
    decoder: Arc<dyn Decoder>,
}

impl AudioEngine {
    /// Create an engine using the default capture backend and decoder for the
    /// enabled features.
    pub fn new(config: EngineConfig) -> Self {
        let (completions_tx, completions_rx) = crossbeam_channel::unbounded();
        Self {
            config,
            context: None,
            disposed: false,
            sources: HashMap::new(),
            pending: HashMap::new(),
            failures: HashMap::new(),
            next_ticket: 0,
            completions_tx,
            completions_rx,
            capture_backend: capture::default_backend(),
            decoder: file::default_decoder(),
        }
    }

    /// Replace the capture backend.
    pub fn with_capture_backend(mut self, backend: Arc<dyn CaptureBackend>) -> Self {
        self.capture_backend = backend;
        self
    }

    /// Replace the file decoder.
    pub fn with_decoder(mut self, decoder: Arc<dyn Decoder>) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Whether [`release_all`](Self::release_all) has been called.
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// The shared context, if any source has been acquired yet.
    pub fn context(&self) -> Option<&AudioContext> {
        self.context.as_ref()
    }

    fn context_mut(&mut self) -> Result<&mut AudioContext, AcquireError> {
        if self.disposed {
            return Err(AcquireError::Disposed);
        }
        let analyser = self.config.analyser;
        Ok(self.context.get_or_insert_with(|| AudioContext::new(analyser)))
    }

    fn begin(&mut self, id: &str) -> Result<u64, AcquireError> {
        self.context_mut()?;
        self.release(id);
        self.next_ticket += 1;
        Ok(self.next_ticket)
    }

    /// Start capturing from the microphone into source `id`.
    ///
    /// Replaces anything registered under `id`. The returned `Ok` only means
    /// the request was started; the outcome arrives through
    /// [`poll`](Self::poll).
    pub fn acquire_capture(&mut self, id: &str) -> Result<(), AcquireError> {
        let ticket = self.begin(id)?;

        let (producer, consumer) = RingBuffer::new(self.config.capture_buffer_frames);
        let tx = self.completions_tx.clone();
        let owned_id = id.to_string();
        let handle = CaptureHandle::spawn(
            id,
            self.capture_backend.clone(),
            producer,
            move |result| {
                let _ = tx.send(Completion {
                    id: owned_id,
                    ticket,
                    result: result.map(|sample_rate| Ready::Capture { sample_rate }),
                });
            },
        );

        let handle = match handle {
            Ok(handle) => handle,
            Err(e) => {
                warn!(id, error = %e, "could not start capture");
                self.failures.insert(id.to_string(), e.clone());
                return Err(e);
            }
        };

        debug!(id, ticket, "capture requested");
        self.pending.insert(
            id.to_string(),
            Pending::Capture {
                ticket,
                handle,
                samples: consumer,
            },
        );
        Ok(())
    }

    /// Decode `file` on a worker thread and, once ready, play it in a loop as
    /// source `id`.
    pub fn acquire_file(&mut self, id: &str, file: Blob) -> Result<(), AcquireError> {
        let ticket = self.begin(id)?;

        let tx = self.completions_tx.clone();
        let decoder = self.decoder.clone();
        let bytes = file.clone();
        let owned_id = id.to_string();
        std::thread::Builder::new()
            .name(format!("decode:{id}"))
            .spawn(move || {
                let result = catch_unwind(AssertUnwindSafe(|| decoder.decode(bytes.as_bytes())))
                    .unwrap_or_else(|_| Err(AcquireError::Decode("decoder panicked".into())))
                    .map(Ready::File);
                let _ = tx.send(Completion {
                    id: owned_id,
                    ticket,
                    result,
                });
            })
            .map_err(|e| AcquireError::Backend(e.to_string()))?;

        debug!(id, ticket, bytes = file.len(), "file decode requested");
        self.pending
            .insert(id.to_string(), Pending::File { ticket, blob: file });
        Ok(())
    }

    /// Register every acquisition that finished since the last call.
    ///
    /// Returns the outcome of each one. Results for ids released in the
    /// meantime are dropped without being reported.
    pub fn poll(&mut self) -> Vec<(String, Result<SourceKind, AcquireError>)> {
        let mut outcomes = Vec::new();
        while let Ok(done) = self.completions_rx.try_recv() {
            if let Some(outcome) = self.complete(done) {
                outcomes.push(outcome);
            }
        }
        outcomes
    }

    /// Block until the acquisition of `id` has finished, then register it.
    ///
    /// Returns immediately with the current status if nothing is pending.
    pub fn wait_for(&mut self, id: &str) -> SourceStatus {
        while self.pending.contains_key(id) {
            let Ok(done) = self.completions_rx.recv() else {
                break;
            };
            self.complete(done);
        }
        self.status(id)
    }

    fn complete(&mut self, done: Completion) -> Option<(String, Result<SourceKind, AcquireError>)> {
        let Completion { id, ticket, result } = done;

        let current = self.pending.get(&id).map(Pending::ticket);
        if current != Some(ticket) || self.disposed {
            warn!(id, ticket, "discarding acquisition that finished after release");
            return None;
        }
        let pending = self.pending.remove(&id)?;

        let ready = match result {
            Ok(ready) => ready,
            Err(e) => {
                warn!(id, error = %e, "acquisition failed");
                pending.cancel();
                self.failures.insert(id.clone(), e.clone());
                return Some((id, Err(e)));
            }
        };

        let analyser = match self.context_mut() {
            Ok(context) => context.analyser(),
            Err(e) => return Some((id, Err(e))),
        };
        let window = SampleWindow::new(analyser.fft_size());

        let (input, sample_rate) = match (pending, ready) {
            (
                Pending::Capture {
                    handle, samples, ..
                },
                Ready::Capture { sample_rate },
            ) => (SourceInput::Capture { samples, handle }, sample_rate),
            (Pending::File { blob, .. }, Ready::File(mut audio)) => {
                if audio.sample_rate == 0 {
                    audio.sample_rate = self.config.fallback_sample_rate;
                }
                let sample_rate = audio.sample_rate;
                let playback = FilePlayback::new(audio);
                (SourceInput::File { playback, blob }, sample_rate)
            }
            (pending, _) => {
                pending.cancel();
                return None;
            }
        };

        let sample_rate = if sample_rate == 0 {
            self.config.fallback_sample_rate
        } else {
            sample_rate
        };

        let kind = input.kind();
        debug!(id, ?kind, sample_rate, "source ready");
        self.failures.remove(&id);
        self.sources.insert(
            id.clone(),
            AudioSource {
                analyser,
                window,
                input,
                sample_rate,
            },
        );
        Some((id, Ok(kind)))
    }

    pub fn status(&self, id: &str) -> SourceStatus {
        if let Some(source) = self.sources.get(id) {
            SourceStatus::Ready(source.input.kind())
        } else if let Some(pending) = self.pending.get(id) {
            SourceStatus::Pending(pending.kind())
        } else if let Some(e) = self.failures.get(id) {
            SourceStatus::Failed(e.clone())
        } else {
            SourceStatus::Unregistered
        }
    }

    pub fn is_registered(&self, id: &str) -> bool {
        self.sources.contains_key(id)
    }

    /// Ids of every registered source.
    pub fn source_ids(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(String::as_str)
    }

    /// Sample rate of a registered source.
    pub fn sample_rate(&self, id: &str) -> Option<u32> {
        self.sources.get(id).map(|s| s.sample_rate)
    }

    /// The file blob a source was acquired from, if it is a file source
    /// (registered or still decoding).
    pub fn file_blob(&self, id: &str) -> Option<&Blob> {
        match (self.sources.get(id), self.pending.get(id)) {
            (
                Some(AudioSource {
                    input: SourceInput::File { blob, .. },
                    ..
                }),
                _,
            ) => Some(blob),
            (_, Some(Pending::File { blob, .. })) => Some(blob),
            _ => None,
        }
    }

    /// Read the latest features of `id`.
    ///
    /// Unregistered ids, pending acquisitions and a disposed engine all read
    /// as [`FeatureSnapshot::silent`].
    pub fn get_features(&mut self, id: &str) -> FeatureSnapshot {
        self.read_features(id, Instant::now())
    }

    pub(crate) fn read_features(&mut self, id: &str, now: Instant) -> FeatureSnapshot {
        match self.sources.get_mut(id) {
            Some(source) => source.read(now),
            None => {
                trace!(id, "no source, silent features");
                FeatureSnapshot::silent()
            }
        }
    }

    /// Resume a file source. Does nothing for capture sources.
    pub fn play(&mut self, id: &str) {
        if let Some(AudioSource {
            input: SourceInput::File { playback, .. },
            ..
        }) = self.sources.get_mut(id)
        {
            playback.play();
        }
    }

    /// Pause a file source. Does nothing for capture sources.
    pub fn pause(&mut self, id: &str) {
        if let Some(AudioSource {
            input: SourceInput::File { playback, .. },
            ..
        }) = self.sources.get_mut(id)
        {
            playback.pause();
        }
    }

    pub fn is_playing(&self, id: &str) -> bool {
        match self.sources.get(id) {
            Some(AudioSource {
                input: SourceInput::File { playback, .. },
                ..
            }) => playback.is_playing(),
            Some(_) => true,
            None => false,
        }
    }

    /// Set a file source's volume, clamped to `[0, 1]`.
    pub fn set_volume(&mut self, id: &str, volume: f32) {
        if let Some(AudioSource {
            input: SourceInput::File { playback, .. },
            ..
        }) = self.sources.get_mut(id)
        {
            playback.set_volume(volume);
        }
    }

    /// Stop and forget source `id`.
    ///
    /// Stops a live capture stream synchronously, pauses file playback and
    /// drops the file's bytes. An acquisition still in flight is abandoned and
    /// its result discarded. Releasing an unknown id does nothing.
    pub fn release(&mut self, id: &str) {
        let mut released = false;

        if let Some(pending) = self.pending.remove(id) {
            pending.cancel();
            released = true;
        }
        if let Some(mut source) = self.sources.remove(id) {
            source.release();
            released = true;
        }
        self.failures.remove(id);

        if released {
            debug!(id, "source released");
        } else {
            trace!(id, "release of unknown source");
        }
    }

    /// Release every source and close the shared context.
    ///
    /// The engine can't acquire anything afterwards.
    pub fn release_all(&mut self) {
        if self.disposed {
            return;
        }
        let ids: Vec<String> = self
            .sources
            .keys()
            .chain(self.pending.keys())
            .cloned()
            .collect();
        for id in &ids {
            self.release(id);
        }
        self.failures.clear();
        self.context = None;
        self.disposed = true;
        info!(sources = ids.len(), "audio engine disposed");
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        self.release_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingGuard(Arc<AtomicUsize>);

    impl CaptureGuard for CountingGuard {
        fn sample_rate(&self) -> u32 {
            48000
        }
    }

    impl Drop for CountingGuard {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct CountingBackend(Arc<AtomicUsize>);

    impl CaptureBackend for CountingBackend {
        fn open(&self, _: rtrb::Producer<f32>) -> Result<Box<dyn CaptureGuard>, AcquireError> {
            Ok(Box::new(CountingGuard(self.0.clone())))
        }
    }

    fn constant_decoder(bytes: &[u8]) -> Result<DecodedAudio, AcquireError> {
        if bytes.is_empty() {
            return Err(AcquireError::Decode("empty".into()));
        }
        let samples = (0..4800)
            .map(|i| (i as f32 * 0.3).sin())
            .collect();
        Ok(DecodedAudio::new(samples, 1, 48000))
    }

    fn engine(stopped: &Arc<AtomicUsize>) -> AudioEngine {
        AudioEngine::new(EngineConfig::default())
            .with_capture_backend(Arc::new(CountingBackend(stopped.clone())))
            .with_decoder(Arc::new(constant_decoder))
    }

    #[test]
    fn unknown_id_is_silent() {
        let mut engine = AudioEngine::new(EngineConfig::default());
        let f = engine.get_features("nope");
        assert_eq!(f.amplitude, 0.0);
        assert!(f.frequencies.is_empty());
        assert_eq!(f.average_frequency, 0.0);
        assert_eq!(engine.status("nope"), SourceStatus::Unregistered);
        assert!(engine.context().is_none());
    }

    #[test]
    fn capture_becomes_ready() {
        let stopped = Arc::new(AtomicUsize::new(0));
        let mut engine = engine(&stopped);

        engine.acquire_capture("mic").unwrap();
        assert!(engine.context().is_some());
        assert_eq!(engine.wait_for("mic"), SourceStatus::Ready(SourceKind::Capture));
        assert_eq!(engine.sample_rate("mic"), Some(48000));
        assert_eq!(engine.get_features("mic").frequencies.len(), 128);
    }

    #[test]
    fn double_release_stops_once() {
        let stopped = Arc::new(AtomicUsize::new(0));
        let mut engine = engine(&stopped);

        engine.acquire_capture("mic").unwrap();
        engine.wait_for("mic");

        engine.release("mic");
        engine.release("mic");
        assert_eq!(stopped.load(Ordering::SeqCst), 1);
        assert_eq!(engine.status("mic"), SourceStatus::Unregistered);
    }

    #[test]
    fn late_result_after_release_is_discarded() {
        let stopped = Arc::new(AtomicUsize::new(0));
        let mut engine = engine(&stopped);

        engine.acquire_file("song", Blob::from(vec![1, 2, 3])).unwrap();
        engine.release("song");

        // let the decode thread finish
        let done = engine.completions_rx.recv().unwrap();
        assert!(engine.complete(done).is_none());
        assert!(!engine.is_registered("song"));
    }

    #[test]
    fn decode_failure_leaves_source_unregistered() {
        let stopped = Arc::new(AtomicUsize::new(0));
        let mut engine = engine(&stopped);

        engine.acquire_file("song", Blob::from(Vec::new())).unwrap();
        assert!(matches!(
            engine.wait_for("song"),
            SourceStatus::Failed(AcquireError::Decode(_))
        ));
        assert!(engine.get_features("song").is_silent());
    }

    #[test]
    fn file_controls() {
        let stopped = Arc::new(AtomicUsize::new(0));
        let mut engine = engine(&stopped);

        engine.acquire_file("song", Blob::from(vec![0])).unwrap();
        assert_eq!(engine.wait_for("song"), SourceStatus::Ready(SourceKind::File));
        assert!(engine.is_playing("song"));

        engine.pause("song");
        assert!(!engine.is_playing("song"));
        engine.play("song");
        assert!(engine.is_playing("song"));

        // capture sources ignore play/pause
        engine.acquire_capture("mic").unwrap();
        engine.wait_for("mic");
        engine.pause("mic");
        assert!(engine.is_playing("mic"));
    }

    #[test]
    fn release_all_is_terminal() {
        let stopped = Arc::new(AtomicUsize::new(0));
        let mut engine = engine(&stopped);

        engine.acquire_capture("a").unwrap();
        engine.wait_for("a");
        engine.acquire_file("b", Blob::from(vec![0])).unwrap();

        engine.release_all();
        assert_eq!(stopped.load(Ordering::SeqCst), 1);
        assert!(engine.is_disposed());
        assert!(engine.context().is_none());
        assert_eq!(engine.acquire_capture("a"), Err(AcquireError::Disposed));
        assert!(engine.get_features("a").is_silent());
    }
}
