//! Live capture sources.
//!
//! A capture stream is opened on its own thread, which owns the backend's
//! guard (for cpal, the `Stream`) for as long as the source lives. Samples are
//! downmixed to mono and pushed through an `rtrb` ring buffer; the engine
//! drains it whenever features are read.

use alloc::string::String;
use alloc::sync::Arc;
use core::panic::AssertUnwindSafe;
use std::panic::catch_unwind;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};
use rtrb::Producer;
use tracing::{debug, trace, warn};

use crate::error::AcquireError;

/// Keeps an open capture stream alive. Dropping it must stop the stream.
pub trait CaptureGuard {
    /// Sample rate of the samples being pushed.
    fn sample_rate(&self) -> u32;
}

/// Opens capture streams.
///
/// `open` is called on the capture thread and may block, for instance while
/// the platform asks the user for permission.
pub trait CaptureBackend: Send + Sync {
    fn open(&self, samples: Producer<f32>) -> Result<Box<dyn CaptureGuard>, AcquireError>;
}

/// Used when no capture backend was compiled in.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoCapture;

impl CaptureBackend for NoCapture {
    fn open(&self, _samples: Producer<f32>) -> Result<Box<dyn CaptureGuard>, AcquireError> {
        Err(AcquireError::DeviceUnavailable(
            "no capture backend available (enable the `cpal_capture` feature)".into(),
        ))
    }
}

/// The backend an engine uses unless told otherwise.
pub fn default_backend() -> Arc<dyn CaptureBackend> {
    #[cfg(feature = "cpal_capture")]
    {
        Arc::new(cpal_backend::CpalCapture::default())
    }
    #[cfg(not(feature = "cpal_capture"))]
    {
        Arc::new(NoCapture)
    }
}

/// Owner side of a capture thread.
///
/// Stopping drops the stop sender, which makes the thread drop its guard and
/// exit. Stopping twice is harmless.
pub struct CaptureHandle {
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl CaptureHandle {
    /// Spawn a thread that opens `backend` and reports the result through
    /// `opened`.
    pub(crate) fn spawn(
        id: &str,
        backend: Arc<dyn CaptureBackend>,
        samples: Producer<f32>,
        opened: impl FnOnce(Result<u32, AcquireError>) + Send + 'static,
    ) -> Result<Self, AcquireError> {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let name = String::from(id);

        let thread = std::thread::Builder::new()
            .name(format!("capture:{id}"))
            .spawn(move || run(&name, backend, samples, stop_rx, opened))
            .map_err(|e| AcquireError::Backend(e.to_string()))?;

        Ok(Self {
            stop: Some(stop_tx),
            thread: Some(thread),
        })
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop the stream and wait for the capture thread to exit.
    ///
    /// Returns `false` if the handle was already stopped.
    pub fn stop(&mut self) -> bool {
        let Some(stop) = self.stop.take() else {
            return false;
        };
        drop(stop);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        true
    }

    /// Tell the thread to stop without waiting for it.
    ///
    /// Used for acquisitions still blocked in [`CaptureBackend::open`]: the
    /// thread closes whatever it eventually opens.
    pub fn detach(mut self) {
        self.stop.take();
        self.thread.take();
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(
    id: &str,
    backend: Arc<dyn CaptureBackend>,
    samples: Producer<f32>,
    stop: Receiver<()>,
    opened: impl FnOnce(Result<u32, AcquireError>),
) {
    let guard = match catch_unwind(AssertUnwindSafe(|| backend.open(samples))) {
        Ok(Ok(guard)) => guard,
        Ok(Err(e)) => {
            opened(Err(e));
            return;
        }
        Err(_) => {
            warn!(id, "capture backend panicked while opening");
            opened(Err(AcquireError::Backend("capture backend panicked".into())));
            return;
        }
    };

    debug!(id, sample_rate = guard.sample_rate(), "capture stream open");
    opened(Ok(guard.sample_rate()));

    // Block until the owner stops us or goes away.
    let _ = stop.recv();
    drop(guard);
    trace!(id, "capture stream closed");
}

#[cfg(feature = "cpal_capture")]
pub mod cpal_backend {
    //! Microphone capture through cpal.

    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use cpal::{SampleFormat, StreamConfig};
    use dasp_sample::{FromSample, Sample};
    use rtrb::Producer;
    use tracing::warn;

    use super::{CaptureBackend, CaptureGuard};
    use crate::error::AcquireError;

    /// Captures from the default input device, or from a named one.
    #[derive(Clone, Debug, Default)]
    pub struct CpalCapture {
        device_name: Option<String>,
    }

    impl CpalCapture {
        pub fn with_device(mut self, name: impl Into<String>) -> Self {
            self.device_name = Some(name.into());
            self
        }

        fn device(&self) -> Result<cpal::Device, AcquireError> {
            let host = cpal::default_host();
            match &self.device_name {
                None => host
                    .default_input_device()
                    .ok_or_else(|| AcquireError::DeviceUnavailable("no default input device".into())),
                Some(wanted) => host
                    .input_devices()
                    .map_err(|e| AcquireError::Backend(e.to_string()))?
                    .find(|d| d.name().is_ok_and(|n| &n == wanted))
                    .ok_or_else(|| AcquireError::DeviceUnavailable(format!("no input device named {wanted}"))),
            }
        }
    }

    struct CpalGuard {
        _stream: cpal::Stream,
        sample_rate: u32,
    }

    impl CaptureGuard for CpalGuard {
        fn sample_rate(&self) -> u32 {
            self.sample_rate
        }
    }

    impl CaptureBackend for CpalCapture {
        fn open(&self, samples: Producer<f32>) -> Result<Box<dyn CaptureGuard>, AcquireError> {
            let device = self.device()?;
            let config = device.default_input_config().map_err(|e| match e {
                cpal::DefaultStreamConfigError::DeviceNotAvailable => {
                    AcquireError::DeviceUnavailable(e.to_string())
                }
                other => backend_error(other.to_string()),
            })?;

            let sample_rate = config.sample_rate().0;
            let stream_config = config.config();
            let stream = build_stream(&device, config.sample_format(), &stream_config, samples)
                .map_err(|e| match e {
                    cpal::BuildStreamError::DeviceNotAvailable => {
                        AcquireError::DeviceUnavailable(e.to_string())
                    }
                    other => backend_error(other.to_string()),
                })?;

            stream.play().map_err(|e| match e {
                cpal::PlayStreamError::DeviceNotAvailable => {
                    AcquireError::DeviceUnavailable(e.to_string())
                }
                other => backend_error(other.to_string()),
            })?;

            Ok(Box::new(CpalGuard {
                _stream: stream,
                sample_rate,
            }))
        }
    }

    /// Platforms report a refused microphone as a backend-specific error.
    fn backend_error(message: String) -> AcquireError {
        let lower = message.to_lowercase();
        if lower.contains("permission") || lower.contains("denied") {
            AcquireError::PermissionDenied
        } else {
            AcquireError::Backend(message)
        }
    }

    fn build_stream(
        device: &cpal::Device,
        sample_format: SampleFormat,
        config: &StreamConfig,
        samples: Producer<f32>,
    ) -> Result<cpal::Stream, cpal::BuildStreamError> {
        let channels = usize::from(config.channels);
        match sample_format {
            SampleFormat::F32 => input_stream::<f32>(device, config, channels, samples),
            SampleFormat::I16 => input_stream::<i16>(device, config, channels, samples),
            SampleFormat::U16 => input_stream::<u16>(device, config, channels, samples),
            _ => Err(cpal::BuildStreamError::StreamConfigNotSupported),
        }
    }

    fn input_stream<T>(
        device: &cpal::Device,
        config: &StreamConfig,
        channels: usize,
        mut samples: Producer<f32>,
    ) -> Result<cpal::Stream, cpal::BuildStreamError>
    where
        T: cpal::SizedSample + Sample,
        f32: FromSample<T>,
    {
        device.build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                for frame in data.chunks(channels.max(1)) {
                    let sum: f32 = frame.iter().map(|s| s.to_sample::<f32>()).sum();
                    // A full buffer means nobody is reading; drop the sample.
                    let _ = samples.push(sum / frame.len() as f32);
                }
            },
            |err| warn!(%err, "capture stream error"),
            None,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Guard(Arc<AtomicUsize>);

    impl CaptureGuard for Guard {
        fn sample_rate(&self) -> u32 {
            44100
        }
    }

    impl Drop for Guard {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Backend(Arc<AtomicUsize>);

    impl CaptureBackend for Backend {
        fn open(&self, _samples: Producer<f32>) -> Result<Box<dyn CaptureGuard>, AcquireError> {
            Ok(Box::new(Guard(self.0.clone())))
        }
    }

    #[test]
    fn stop_closes_the_stream_once() {
        let closed = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = crossbeam_channel::bounded(1);
        let (producer, _consumer) = rtrb::RingBuffer::new(16);

        let mut handle = CaptureHandle::spawn(
            "mic",
            Arc::new(Backend(closed.clone())),
            producer,
            move |r| tx.send(r).unwrap(),
        )
        .unwrap();

        assert_eq!(rx.recv().unwrap(), Ok(44100));
        assert!(handle.stop());
        assert!(!handle.stop());
        drop(handle);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn open_failure_is_reported() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let (producer, _consumer) = rtrb::RingBuffer::new(16);
        let mut handle =
            CaptureHandle::spawn("mic", Arc::new(NoCapture), producer, move |r| {
                tx.send(r).unwrap()
            })
            .unwrap();

        assert!(matches!(
            rx.recv().unwrap(),
            Err(AcquireError::DeviceUnavailable(_))
        ));
        handle.stop();
        assert!(!handle.is_running());
    }
}
