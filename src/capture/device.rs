// src/capture/device.rs

//! Input backends that drive a [`CaptureCallback`]: the `cpal` device input and a software
//! tone generator.

use super::pipeline::{CallbackFlow, CaptureCallback};
use crate::error::{EngineError, EngineResult, ErrorKind};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, Device, FromSample, Host, Sample, SampleFormat, Stream, StreamConfig};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// The stream layout requested from a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub frames_per_buffer: usize,
}

/// An opened input. Closing it guarantees the callback is never invoked again.
pub trait InputStream {
    fn start(&mut self) -> EngineResult<()>;
    /// True while the callback can still deliver blocks: started, and the stop request not yet
    /// seen.
    fn is_active(&self) -> bool;
    /// Stops the stream, drops the callback and raises the `finished` flag passed to `open`.
    fn close(self: Box<Self>) -> EngineResult<()>;
}

pub trait InputBackend {
    /// Opens a stream that feeds interleaved `f32` blocks of `config.frames_per_buffer`
    /// frames into `callback`. `finished` is raised once the callback can no longer run.
    fn open(
        &self,
        config: &InputConfig,
        callback: CaptureCallback,
        finished: Arc<AtomicBool>,
    ) -> EngineResult<Box<dyn InputStream>>;
}

fn recording_error(context: &str, err: impl std::fmt::Display) -> EngineError {
    EngineError::new(ErrorKind::RecordingError, format!("{}: {}", context, err))
}

// --- cpal ---

fn get_host(host_name: Option<&str>) -> EngineResult<Host> {
    let Some(name) = host_name else {
        return Ok(cpal::default_host());
    };
    let host_id = cpal::available_hosts()
        .into_iter()
        .find(|id| id.name().eq_ignore_ascii_case(name))
        .ok_or_else(|| {
            EngineError::new(
                ErrorKind::InvalidConfiguration,
                format!("audio host '{}' is not available", name),
            )
        })?;
    cpal::host_from_id(host_id).map_err(|e| recording_error("Failed to get audio host", e))
}

/// Names of the input devices on `host_name` (or the default host).
pub fn list_input_devices(host_name: Option<&str>) -> EngineResult<Vec<String>> {
    let host = get_host(host_name)?;
    let devices = host
        .input_devices()
        .map_err(|e| recording_error("Failed to enumerate input devices", e))?;
    let mut result = Vec::new();
    for device in devices {
        if let Ok(name) = device.name() {
            result.push(name);
        }
    }
    Ok(result)
}

/// Records from a `cpal` input device. `None` picks the default host / device.
#[derive(Debug, Clone, Default)]
pub struct CpalInput {
    pub host: Option<String>,
    pub device: Option<String>,
}

impl CpalInput {
    pub fn new(host: Option<String>, device: Option<String>) -> Self {
        Self { host, device }
    }

    fn find_device(&self) -> EngineResult<Device> {
        let host = get_host(self.host.as_deref())?;
        if let Some(name) = &self.device {
            host.input_devices()
                .map_err(|e| recording_error("Failed to enumerate input devices", e))?
                .find(|d| d.name().ok().as_ref() == Some(name))
                .ok_or_else(|| {
                    EngineError::new(
                        ErrorKind::RecordingError,
                        format!("Input device not found: {}", name),
                    )
                })
        } else {
            host.default_input_device().ok_or_else(|| {
                EngineError::new(ErrorKind::RecordingError, "No default input device")
            })
        }
    }
}

fn input_error_fn(
    xrun_count: Arc<AtomicUsize>,
) -> impl FnMut(cpal::StreamError) + Send + 'static {
    move |err| {
        log::warn!("an error occurred on input stream: {}", err);
        xrun_count.fetch_add(1, Ordering::Relaxed);
    }
}

/// Native `f32` input goes straight to the callback, which splits it across pool buffers.
fn build_f32_input_stream(
    device: &Device,
    config: &StreamConfig,
    mut callback: CaptureCallback,
    completed: Arc<AtomicBool>,
    xrun_count: Arc<AtomicUsize>,
) -> EngineResult<Stream> {
    device
        .build_input_stream(
            config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                if completed.load(Ordering::Relaxed) {
                    return;
                }
                if callback.process(data) == CallbackFlow::Complete {
                    completed.store(true, Ordering::Release);
                }
            },
            input_error_fn(xrun_count),
            None,
        )
        .map_err(|e| recording_error("Failed to build input stream", e))
}

/// Integer input is converted through a scratch block of one pool buffer, chunk by chunk,
/// so host blocks of any size are handled without allocating on the audio thread.
fn build_input_stream<T>(
    device: &Device,
    config: &StreamConfig,
    mut callback: CaptureCallback,
    completed: Arc<AtomicBool>,
    xrun_count: Arc<AtomicUsize>,
) -> EngineResult<Stream>
where
    T: Sample + cpal::SizedSample,
    f32: FromSample<T>,
{
    let mut scratch = vec![0.0f32; callback.block_samples().max(1)];

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                if completed.load(Ordering::Relaxed) {
                    return;
                }
                let mut flow = CallbackFlow::Continue;
                for chunk in data.chunks(scratch.len()) {
                    let block = &mut scratch[..chunk.len()];
                    for (out, sample) in block.iter_mut().zip(chunk) {
                        *out = f32::from_sample(*sample);
                    }
                    flow = callback.process(block);
                }
                if flow == CallbackFlow::Complete {
                    completed.store(true, Ordering::Release);
                }
            },
            input_error_fn(xrun_count),
            None,
        )
        .map_err(|e| recording_error("Failed to build input stream", e))
}

impl InputBackend for CpalInput {
    fn open(
        &self,
        config: &InputConfig,
        callback: CaptureCallback,
        finished: Arc<AtomicBool>,
    ) -> EngineResult<Box<dyn InputStream>> {
        let device = self.find_device()?;
        let device_name = device.name().unwrap_or_else(|_| "<unnamed>".to_string());
        log::info!("Using input device: {}", device_name);

        let sample_format = device
            .default_input_config()
            .map_err(|e| recording_error("Failed to query input config", e))?
            .sample_format();
        let stream_config = StreamConfig {
            channels: config.channels,
            sample_rate: cpal::SampleRate(config.sample_rate),
            buffer_size: BufferSize::Fixed(config.frames_per_buffer as u32),
        };

        let xrun_count = Arc::new(AtomicUsize::new(0));
        let completed = Arc::new(AtomicBool::new(false));
        let (xruns, done) = (xrun_count.clone(), completed.clone());
        let stream = match sample_format {
            SampleFormat::F32 => {
                build_f32_input_stream(&device, &stream_config, callback, done, xruns)?
            }
            SampleFormat::I16 => {
                build_input_stream::<i16>(&device, &stream_config, callback, done, xruns)?
            }
            SampleFormat::U16 => {
                build_input_stream::<u16>(&device, &stream_config, callback, done, xruns)?
            }
            format => {
                return Err(EngineError::new(
                    ErrorKind::RecordingError,
                    format!("Unsupported sample format {}", format),
                ))
            }
        };

        Ok(Box::new(CpalStream {
            stream: Some(stream),
            started: false,
            completed,
            finished,
            xrun_count,
        }))
    }
}

struct CpalStream {
    stream: Option<Stream>,
    started: bool,
    /// Raised by the audio callback once it has seen the stop request.
    completed: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
    xrun_count: Arc<AtomicUsize>,
}

impl InputStream for CpalStream {
    fn start(&mut self) -> EngineResult<()> {
        let stream = self.stream.as_ref().ok_or_else(|| {
            EngineError::new(ErrorKind::StateError, "input stream is already closed")
        })?;
        stream
            .play()
            .map_err(|e| recording_error("Failed to start input stream", e))?;
        self.started = true;
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.started
            && self.stream.is_some()
            && !self.completed.load(Ordering::Acquire)
            && !self.finished.load(Ordering::Acquire)
    }

    fn close(mut self: Box<Self>) -> EngineResult<()> {
        let result = match self.stream.take() {
            Some(stream) => {
                let paused = stream.pause();
                // Dropping the stream joins the host callback thread.
                drop(stream);
                paused.map_err(|e| recording_error("Failed to stop input stream", e))
            }
            None => Ok(()),
        };
        self.finished.store(true, Ordering::Release);
        let xruns = self.xrun_count.load(Ordering::Relaxed);
        if xruns > 0 {
            log::warn!("Input stream reported {} errors", xruns);
        }
        log::debug!("Input stream closed");
        result
    }
}

// --- Software tone ---

/// A sine tone generator paced like a device: one block every `frames_per_buffer` frames.
#[derive(Debug, Clone, Copy)]
pub struct ToneInput {
    pub frequency: f32,
    pub amplitude: f32,
}

impl Default for ToneInput {
    fn default() -> Self {
        Self {
            frequency: 440.0,
            amplitude: 0.5,
        }
    }
}

impl ToneInput {
    pub fn new(frequency: f32, amplitude: f32) -> Self {
        Self {
            frequency,
            amplitude: amplitude.clamp(0.0, 1.0),
        }
    }
}

impl InputBackend for ToneInput {
    fn open(
        &self,
        config: &InputConfig,
        callback: CaptureCallback,
        finished: Arc<AtomicBool>,
    ) -> EngineResult<Box<dyn InputStream>> {
        if config.frames_per_buffer == 0 || config.channels == 0 || config.sample_rate == 0 {
            return Err(EngineError::new(
                ErrorKind::InvalidConfiguration,
                format!("tone input cannot run with {:?}", config),
            ));
        }
        Ok(Box::new(ToneStream {
            tone: *self,
            config: *config,
            callback: Some(callback),
            halt: Arc::new(AtomicBool::new(false)),
            finished,
            worker: None,
        }))
    }
}

struct ToneStream {
    tone: ToneInput,
    config: InputConfig,
    callback: Option<CaptureCallback>,
    halt: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl InputStream for ToneStream {
    fn start(&mut self) -> EngineResult<()> {
        let mut callback = self.callback.take().ok_or_else(|| {
            EngineError::new(ErrorKind::StateError, "tone input was already started")
        })?;
        let tone = self.tone;
        let config = self.config;
        let halt = self.halt.clone();
        let channels = config.channels as usize;
        let period = Duration::from_secs_f64(
            config.frames_per_buffer as f64 / config.sample_rate as f64,
        );

        let worker = thread::Builder::new()
            .name("tone-input".to_string())
            .spawn(move || {
                let step = tone.frequency * std::f32::consts::TAU / config.sample_rate as f32;
                let mut phase = 0.0f32;
                let mut block = vec![0.0f32; config.frames_per_buffer * channels];
                while !halt.load(Ordering::Acquire) {
                    for frame in block.chunks_exact_mut(channels) {
                        frame.fill(phase.sin() * tone.amplitude);
                        phase = (phase + step) % std::f32::consts::TAU;
                    }
                    if callback.process(&block) == CallbackFlow::Complete {
                        break;
                    }
                    thread::sleep(period);
                }
            })
            .map_err(|e| recording_error("Failed to spawn tone generator", e))?;
        self.worker = Some(worker);
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|worker| !worker.is_finished())
    }

    fn close(mut self: Box<Self>) -> EngineResult<()> {
        self.halt.store(true, Ordering::Release);
        let joined = match self.worker.take() {
            Some(worker) => worker.join().map_err(|_| {
                EngineError::new(ErrorKind::UnhandledException, "tone generator panicked")
            }),
            None => Ok(()),
        };
        // An unstarted stream still owns its callback; release it before signalling.
        self.callback.take();
        self.finished.store(true, Ordering::Release);
        joined
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CollectingErrorSink, ErrorSink};
    use crate::pool::{BufferPool, FilledQueue};
    use std::time::Instant;

    #[test]
    fn tone_stream_goes_inactive_once_stop_is_seen() {
        let sink: Arc<dyn ErrorSink> = Arc::new(CollectingErrorSink::new());
        let pool = Arc::new(BufferPool::new(16, 64, 1, sink.clone()).unwrap());
        let queue = Arc::new(FilledQueue::new(16, 1, sink.as_ref()).unwrap());
        let stop = Arc::new(AtomicBool::new(false));
        let overflow = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(false));
        let callback = CaptureCallback::new(pool.clone(), queue.clone(), stop.clone(), overflow);
        let parked = callback.parking_slot();

        let config = InputConfig {
            sample_rate: 48_000,
            channels: 1,
            frames_per_buffer: 64,
        };
        let mut stream = ToneInput::default()
            .open(&config, callback, finished.clone())
            .unwrap();
        assert!(!stream.is_active());

        stream.start().unwrap();
        assert!(stream.is_active());
        while queue.is_empty() {
            thread::sleep(Duration::from_millis(1));
        }

        stop.store(true, Ordering::Release);
        let deadline = Instant::now() + Duration::from_secs(2);
        while stream.is_active() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(!stream.is_active());
        assert!(!finished.load(Ordering::Acquire));

        stream.close().unwrap();
        assert!(finished.load(Ordering::Acquire));
        if let Some(buffer) = parked.lock().unwrap().take() {
            pool.push(buffer).unwrap();
        }
        while let Some(buffer) = queue.pop() {
            pool.push(buffer).unwrap();
        }
        assert_eq!(pool.current_size(), 16);
    }
}
