use std::f32::consts::PI;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;

use resonode::audio::{CaptureBackend, CaptureGuard, DecodedAudio};
use resonode::{AcquireError, AudioEngine, Blob, EngineConfig, SourceKind, SourceStatus};

/// A capture backend that pushes a burst of sine samples when opened and
/// counts how often its stream is closed.
struct ToneMic {
    closed: Arc<AtomicUsize>,
}

struct ToneStream(Arc<AtomicUsize>);

impl CaptureGuard for ToneStream {
    fn sample_rate(&self) -> u32 {
        48000
    }
}

impl Drop for ToneStream {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

impl CaptureBackend for ToneMic {
    fn open(
        &self,
        mut samples: rtrb::Producer<f32>,
    ) -> Result<Box<dyn CaptureGuard>, AcquireError> {
        for i in 0..1024 {
            let _ = samples.push((2.0 * PI * 440.0 * i as f32 / 48000.0).sin());
        }
        Ok(Box::new(ToneStream(self.closed.clone())))
    }
}

struct DeniedMic;

impl CaptureBackend for DeniedMic {
    fn open(&self, _: rtrb::Producer<f32>) -> Result<Box<dyn CaptureGuard>, AcquireError> {
        Err(AcquireError::PermissionDenied)
    }
}

struct BrokenMic;

impl CaptureBackend for BrokenMic {
    fn open(&self, _: rtrb::Producer<f32>) -> Result<Box<dyn CaptureGuard>, AcquireError> {
        panic!("driver crashed");
    }
}

fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn tone_engine(closed: &Arc<AtomicUsize>) -> AudioEngine {
    init_logging();
    AudioEngine::new(EngineConfig::default())
        .with_capture_backend(Arc::new(ToneMic {
            closed: closed.clone(),
        }))
        .with_decoder(Arc::new(|_: &[u8]| {
            let samples = (0..48000)
                .flat_map(|i| {
                    let s = (2.0 * PI * 1000.0 * i as f32 / 48000.0).sin();
                    [s, s]
                })
                .collect();
            Ok::<_, AcquireError>(DecodedAudio::new(samples, 2, 48000))
        }))
}

#[test]
fn unknown_source_reads_as_silence() {
    let mut engine = AudioEngine::new(EngineConfig::default());
    let f = engine.get_features("nothing-here");
    assert_eq!(f.amplitude, 0.0);
    assert!(f.frequencies.is_empty());
    assert_eq!(f.average_frequency, 0.0);
}

#[test]
fn capture_produces_features() {
    let closed = Arc::new(AtomicUsize::new(0));
    let mut engine = tone_engine(&closed);

    engine.acquire_capture("mic").unwrap();
    assert_eq!(engine.status("mic"), SourceStatus::Pending(SourceKind::Capture));
    assert_eq!(engine.wait_for("mic"), SourceStatus::Ready(SourceKind::Capture));

    let f = engine.get_features("mic");
    assert_eq!(f.frequencies.len(), 128);
    assert!(f.amplitude > 0.0 && f.amplitude <= 1.0);
    assert_eq!(f.average_frequency, f.amplitude);
}

#[test]
fn release_twice_closes_once() {
    let closed = Arc::new(AtomicUsize::new(0));
    let mut engine = tone_engine(&closed);

    engine.acquire_capture("mic").unwrap();
    engine.wait_for("mic");

    engine.release("mic");
    engine.release("mic");
    engine.release("never-existed");

    assert_eq!(closed.load(Ordering::SeqCst), 1);
    assert!(engine.get_features("mic").is_silent());
}

#[test]
fn denied_permission_is_reported_and_not_retried() {
    init_logging();
    let mut engine =
        AudioEngine::new(EngineConfig::default()).with_capture_backend(Arc::new(DeniedMic));

    engine.acquire_capture("mic").unwrap();
    let outcomes = loop {
        let outcomes = engine.poll();
        if !outcomes.is_empty() {
            break outcomes;
        }
        sleep(Duration::from_millis(1));
    };

    assert_eq!(
        outcomes,
        [(
            "mic".to_owned(),
            Err::<SourceKind, _>(AcquireError::PermissionDenied)
        )]
    );
    assert_eq!(
        engine.status("mic"),
        SourceStatus::Failed(AcquireError::PermissionDenied)
    );
    assert!(engine.poll().is_empty());
    assert!(engine.get_features("mic").is_silent());
}

#[test]
fn file_playback_produces_features() {
    let closed = Arc::new(AtomicUsize::new(0));
    let mut engine = tone_engine(&closed);

    engine.acquire_file("song", Blob::from(vec![0u8; 16])).unwrap();
    assert_eq!(engine.wait_for("song"), SourceStatus::Ready(SourceKind::File));

    engine.get_features("song");
    sleep(Duration::from_millis(20));
    let f = engine.get_features("song");
    assert!(f.amplitude > 0.0 && f.amplitude <= 1.0);

    engine.set_volume("song", 0.0);
    sleep(Duration::from_millis(20));
    for _ in 0..50 {
        engine.get_features("song");
    }
    let muted = engine.get_features("song");
    assert!(muted.amplitude < f.amplitude);
}

#[test]
fn panicking_decoder_fails_the_acquisition() {
    init_logging();
    let mut engine = AudioEngine::new(EngineConfig::default()).with_decoder(Arc::new(
        |_: &[u8]| -> Result<DecodedAudio, AcquireError> { panic!("corrupt stream") },
    ));

    engine.acquire_file("song", Blob::from(vec![0u8; 16])).unwrap();
    assert!(matches!(
        engine.wait_for("song"),
        SourceStatus::Failed(AcquireError::Decode(_))
    ));
    assert!(!engine.is_registered("song"));
    assert!(engine.get_features("song").is_silent());
}

#[test]
fn panicking_capture_backend_fails_the_acquisition() {
    init_logging();
    let mut engine =
        AudioEngine::new(EngineConfig::default()).with_capture_backend(Arc::new(BrokenMic));

    engine.acquire_capture("mic").unwrap();
    assert!(matches!(
        engine.wait_for("mic"),
        SourceStatus::Failed(AcquireError::Backend(_))
    ));
    assert!(engine.get_features("mic").is_silent());
}

#[test]
fn file_without_sample_rate_still_plays() {
    init_logging();
    let mut engine = AudioEngine::new(EngineConfig::default()).with_decoder(Arc::new(
        |_: &[u8]| {
            let samples = (0..48000)
                .map(|i| (2.0 * PI * 1000.0 * i as f32 / 48000.0).sin())
                .collect();
            Ok::<_, AcquireError>(DecodedAudio::new(samples, 1, 0))
        },
    ));

    engine.acquire_file("song", Blob::from(vec![0u8; 16])).unwrap();
    assert_eq!(engine.wait_for("song"), SourceStatus::Ready(SourceKind::File));

    engine.get_features("song");
    sleep(Duration::from_millis(20));
    let f = engine.get_features("song");
    assert!(f.amplitude > 0.0);
}

#[cfg(feature = "vorbis_src")]
#[test]
fn undecodable_file_stays_unregistered() {
    let mut engine = AudioEngine::new(EngineConfig::default());

    engine
        .acquire_file("song", Blob::from(b"RIFF....WAVEfmt ".to_vec()))
        .unwrap();
    assert!(matches!(
        engine.wait_for("song"),
        SourceStatus::Failed(AcquireError::Decode(_))
    ));
    assert!(!engine.is_registered("song"));
    assert!(engine.get_features("song").is_silent());
}

#[test]
fn release_all_disposes_the_engine() {
    let closed = Arc::new(AtomicUsize::new(0));
    let mut engine = tone_engine(&closed);

    engine.acquire_capture("mic").unwrap();
    engine.wait_for("mic");
    engine.acquire_file("song", Blob::from(vec![1u8])).unwrap();
    engine.wait_for("song");

    engine.release_all();
    engine.release_all();

    assert_eq!(closed.load(Ordering::SeqCst), 1);
    assert!(engine.is_disposed());
    assert_eq!(
        engine.acquire_file("song", Blob::from(vec![1u8])),
        Err(AcquireError::Disposed)
    );
}
