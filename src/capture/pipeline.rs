// src/capture/pipeline.rs

//! The recording session: device callback -> filled queue -> disk writer.

use super::device::{InputBackend, InputConfig, InputStream};
use super::event::EventHandler;
use super::streamer::{FileStreamer, StreamKind, StreamStats};
use crate::audio_buffer::AudioBuffer;
use crate::audio_file::{check_channel_count, check_sample_rate};
use crate::error::{EngineError, EngineResult, ErrorKind, ErrorSink};
use crate::pool::{BufferPool, FilledQueue};
use crate::resources::EngineResources;
use crate::settings::EngineSettings;
use crate::thread_pool::ThreadPool;
use std::hint;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Attempts on the free pool or the filled queue before a block is given up.
const SPIN_LIMIT: usize = 4096;
/// Idle workers needed before a session starts: the disk writer plus the event handler's task.
const REQUIRED_WORKERS: usize = 2;
const POLL_INTERVAL: Duration = Duration::from_millis(1);
/// Upper bound on waiting for a stopped stream to go quiet before it is closed anyway.
const STREAM_QUIESCE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackFlow {
    Continue,
    Complete,
}

/// The wait-free half of a capture session, run on the device thread.
///
/// Each call copies the interleaved input into pooled buffers (splitting it when it is larger
/// than one buffer) and hands them to the filled queue. When the pool or the queue stays
/// exhausted for [`SPIN_LIMIT`] attempts the rest of the block is dropped and the overflow flag
/// is raised; the buffer in hand is kept for the next call.
pub struct CaptureCallback {
    pool: Arc<BufferPool>,
    queue: Arc<FilledQueue>,
    stop: Arc<AtomicBool>,
    overflow: Arc<AtomicBool>,
    spare: Option<AudioBuffer>,
    parked: Arc<Mutex<Option<AudioBuffer>>>,
}

impl CaptureCallback {
    pub fn new(
        pool: Arc<BufferPool>,
        queue: Arc<FilledQueue>,
        stop: Arc<AtomicBool>,
        overflow: Arc<AtomicBool>,
    ) -> Self {
        Self {
            pool,
            queue,
            stop,
            overflow,
            spare: None,
            parked: Arc::new(Mutex::new(None)),
        }
    }

    /// Interleaved samples that fit in one pooled buffer.
    pub fn block_samples(&self) -> usize {
        self.pool.buffer_frames() * self.pool.channels()
    }

    /// Where a buffer still held by the callback ends up once the callback is dropped.
    pub fn parking_slot(&self) -> Arc<Mutex<Option<AudioBuffer>>> {
        self.parked.clone()
    }

    fn free_buffer(&mut self) -> Option<AudioBuffer> {
        if let Some(buffer) = self.spare.take() {
            return Some(buffer);
        }
        for _ in 0..SPIN_LIMIT {
            if let Some(buffer) = self.pool.try_pop() {
                return Some(buffer);
            }
            hint::spin_loop();
        }
        None
    }

    fn hand_off(&self, mut buffer: AudioBuffer) -> Result<(), AudioBuffer> {
        for _ in 0..SPIN_LIMIT {
            match self.queue.push(buffer) {
                Ok(()) => return Ok(()),
                Err(rejected) => buffer = rejected,
            }
            hint::spin_loop();
        }
        Err(buffer)
    }

    pub fn process(&mut self, input: &[f32]) -> CallbackFlow {
        let block = self.block_samples().max(1);
        for chunk in input.chunks(block) {
            let Some(mut buffer) = self.free_buffer() else {
                self.overflow.store(true, Ordering::Relaxed);
                break;
            };
            if buffer.fill_from_interleaved(chunk) == 0 {
                self.spare = Some(buffer);
                continue;
            }
            if let Err(buffer) = self.hand_off(buffer) {
                self.spare = Some(buffer);
                self.overflow.store(true, Ordering::Relaxed);
                break;
            }
        }

        if self.stop.load(Ordering::Acquire) {
            CallbackFlow::Complete
        } else {
            CallbackFlow::Continue
        }
    }
}

impl Drop for CaptureCallback {
    fn drop(&mut self) {
        if let Some(buffer) = self.spare.take() {
            if let Ok(mut slot) = self.parked.lock() {
                *slot = Some(buffer);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Uninitialized,
    Valid,
    Recording,
    Draining,
    Closed,
}

/// Outcome of the last [`CapturePipeline::record`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureStats {
    pub path: PathBuf,
    pub frames_written: usize,
    pub buffers_written: usize,
    pub overflowed: bool,
}

pub struct CapturePipeline {
    resources: Arc<EngineResources>,
    session_dir: PathBuf,
    sink: Arc<dyn ErrorSink>,
    handler: Box<dyn EventHandler>,
    backend: Box<dyn InputBackend>,
    config: InputConfig,
    settle: Duration,
    worker_wait: Duration,
    state: PipelineState,
    last_stats: Option<CaptureStats>,
}

impl CapturePipeline {
    /// Validates the recording layout against the engine resources. An invalid layout is
    /// reported and leaves the pipeline unusable; check [`CapturePipeline::is_valid`].
    pub fn new(
        resources: Arc<EngineResources>,
        session_dir: impl Into<PathBuf>,
        sink: Arc<dyn ErrorSink>,
        handler: Box<dyn EventHandler>,
        backend: Box<dyn InputBackend>,
        settings: &EngineSettings,
    ) -> Self {
        let config = InputConfig {
            sample_rate: settings.recording_sample_rate,
            channels: settings.recording_channels,
            frames_per_buffer: settings.frames_per_callback(),
        };
        let mut pipeline = Self {
            resources,
            session_dir: session_dir.into(),
            sink,
            handler,
            backend,
            config,
            settle: Duration::from_millis(settings.settle_ms),
            worker_wait: Duration::from_millis(settings.worker_wait_ms),
            state: PipelineState::Uninitialized,
            last_stats: None,
        };
        match pipeline.validate() {
            Ok(()) => pipeline.state = PipelineState::Valid,
            Err(err) => {
                err.report(pipeline.sink.as_ref());
                pipeline.state = PipelineState::Closed;
            }
        }
        pipeline
    }

    fn validate(&self) -> EngineResult<()> {
        check_channel_count(self.config.channels as usize)?;
        check_sample_rate(self.config.sample_rate)?;
        let (pool, _) = self.rings();
        if self.config.frames_per_buffer > pool.buffer_frames() {
            log::debug!(
                "Device blocks of {} frames will be split across {}-frame buffers",
                self.config.frames_per_buffer,
                pool.buffer_frames()
            );
        }
        if !self.session_dir.is_dir() {
            return Err(EngineError::new(
                ErrorKind::DirectoryNotFound,
                format!(
                    "Session directory {} does not exist",
                    self.session_dir.display()
                ),
            ));
        }
        Ok(())
    }

    fn rings(&self) -> (Arc<BufferPool>, Arc<FilledQueue>) {
        if self.config.channels == 1 {
            (self.resources.mono_pool(), self.resources.mono_queue())
        } else {
            (self.resources.stereo_pool(), self.resources.stereo_queue())
        }
    }

    pub fn is_valid(&self) -> bool {
        self.state == PipelineState::Valid
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn session_dir(&self) -> &Path {
        &self.session_dir
    }

    pub fn last_stats(&self) -> Option<&CaptureStats> {
        self.last_stats.as_ref()
    }

    /// The file written by the last session.
    pub fn output_path(&self) -> Option<&Path> {
        self.last_stats.as_ref().map(|stats| stats.path.as_path())
    }

    /// Marks the pipeline closed; later `record` calls fail.
    pub fn close(&mut self) {
        self.state = PipelineState::Closed;
    }

    /// Runs one recording session to completion. Errors are reported to the sink.
    pub fn record(&mut self) -> bool {
        if self.state != PipelineState::Valid {
            self.sink.on_error(
                ErrorKind::EngineNotInitialized,
                &format!("cannot record from a pipeline in state {:?}", self.state),
            );
            return false;
        }
        let result = self.run_session();
        if self.state != PipelineState::Closed {
            self.state = PipelineState::Valid;
        }
        match result {
            Ok(ok) => ok,
            Err(err) => {
                err.report(self.sink.as_ref());
                false
            }
        }
    }

    /// Polls the worker pool until `REQUIRED_WORKERS` are idle or the wait runs out.
    fn wait_for_workers(&self, thread_pool: &ThreadPool) -> EngineResult<()> {
        let deadline = Instant::now() + self.worker_wait;
        while thread_pool.available() < REQUIRED_WORKERS {
            if Instant::now() >= deadline {
                return Err(EngineError::new(
                    ErrorKind::ResourceAllocationFailed,
                    format!(
                        "{} of {} workers idle after {:?}; {} needed to record",
                        thread_pool.available(),
                        thread_pool.size(),
                        self.worker_wait,
                        REQUIRED_WORKERS
                    ),
                ));
            }
            thread::sleep(POLL_INTERVAL);
        }
        Ok(())
    }

    /// Gives a stopped stream time to deliver its last block, then closes it.
    fn shut_down(&self, stream: Box<dyn InputStream>) {
        let deadline = Instant::now() + STREAM_QUIESCE_TIMEOUT;
        while stream.is_active() {
            if Instant::now() >= deadline {
                log::warn!("Input stream still active after stop; closing it anyway");
                break;
            }
            thread::sleep(POLL_INTERVAL);
        }
        if let Err(err) = stream.close() {
            err.report(self.sink.as_ref());
        }
    }

    fn run_session(&mut self) -> EngineResult<bool> {
        let (pool, queue) = self.rings();
        // Blocks left over from an aborted session go back to the pool unwritten.
        reclaim(&pool, &queue);

        let stop = Arc::new(AtomicBool::new(false));
        let producer_done = Arc::new(AtomicBool::new(false));
        let overflow = Arc::new(AtomicBool::new(false));

        let mut streamer = FileStreamer::new(
            queue.clone(),
            pool.clone(),
            stop.clone(),
            StreamKind::Recording,
            &self.session_dir,
            self.sink.clone(),
        )?;
        streamer.set_write_info(self.config.channels, self.config.sample_rate)?;
        streamer.set_producer_done(producer_done.clone());
        let path = streamer.output_path().to_path_buf();

        let callback =
            CaptureCallback::new(pool.clone(), queue.clone(), stop.clone(), overflow.clone());
        let parked = callback.parking_slot();
        let mut stream = self
            .backend
            .open(&self.config, callback, producer_done.clone())?;

        let thread_pool = self.resources.thread_pool();
        if let Err(err) = self.wait_for_workers(&thread_pool) {
            stop.store(true, Ordering::Release);
            self.shut_down(stream);
            return_parked(&parked, &pool);
            return Err(err);
        }

        let (done_tx, done_rx) = mpsc::channel();
        thread_pool.enqueue(move || {
            let ok = streamer.write();
            let _ = done_tx.send((ok, streamer.stats()));
        });
        thread::sleep(self.settle);

        let session_error = match stream.start() {
            Ok(()) => {
                log::info!(
                    "Recording {} ch @ {} Hz to {}",
                    self.config.channels,
                    self.config.sample_rate,
                    path.display()
                );
                self.state = PipelineState::Recording;
                self.handler
                    .on_process(self.sink.as_ref(), &thread_pool, &stop);
                None
            }
            Err(err) => Some(err),
        };
        stop.store(true, Ordering::Release);
        self.state = PipelineState::Draining;
        self.shut_down(stream);
        producer_done.store(true, Ordering::Release);

        let writer = done_rx.recv();
        return_parked(&parked, &pool);
        // The writer has exited either way; anything it left queued is ours to return.
        let stranded = reclaim(&pool, &queue);
        if stranded > 0 {
            log::warn!("Returned {} unwritten buffers to the pool", stranded);
        }

        let (written_ok, stream_stats) = match writer {
            Ok(outcome) => outcome,
            Err(_) => {
                self.sink.on_error(
                    ErrorKind::UnhandledException,
                    "disk writer stopped without reporting a result",
                );
                (false, StreamStats::default())
            }
        };

        let overflowed = overflow.load(Ordering::Acquire);
        if overflowed {
            self.sink.on_error(
                ErrorKind::RingBufferOverflow,
                "capture blocks were dropped because the filled queue or buffer pool was exhausted",
            );
        }

        self.last_stats = Some(CaptureStats {
            path,
            frames_written: stream_stats.frames_written,
            buffers_written: stream_stats.buffers_written,
            overflowed,
        });
        log::info!(
            "Recording finished: {} frames, {} buffers",
            stream_stats.frames_written,
            stream_stats.buffers_written
        );

        match session_error {
            Some(err) => Err(err),
            None => Ok(written_ok),
        }
    }
}

/// Puts the buffer a dropped callback was holding back into the pool.
fn return_parked(parked: &Mutex<Option<AudioBuffer>>, pool: &BufferPool) {
    if let Ok(mut slot) = parked.lock() {
        if let Some(buffer) = slot.take() {
            let _ = pool.push(buffer);
        }
    }
}

/// Moves every queued buffer back to the pool. Only valid while no producer or consumer runs.
fn reclaim(pool: &BufferPool, queue: &FilledQueue) -> usize {
    let mut returned = 0;
    while let Some(buffer) = queue.pop() {
        let _ = pool.push(buffer);
        returned += 1;
    }
    returned
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CollectingErrorSink;

    fn rings(capacity: usize, frames: usize) -> (Arc<BufferPool>, Arc<FilledQueue>) {
        let sink: Arc<dyn ErrorSink> = Arc::new(CollectingErrorSink::new());
        (
            Arc::new(BufferPool::new(capacity, frames, 2, sink.clone()).unwrap()),
            Arc::new(FilledQueue::new(capacity, 2, sink.as_ref()).unwrap()),
        )
    }

    #[test]
    fn callback_moves_blocks_in_order() {
        let (pool, queue) = rings(4, 4);
        let stop = Arc::new(AtomicBool::new(false));
        let overflow = Arc::new(AtomicBool::new(false));
        let mut callback =
            CaptureCallback::new(pool.clone(), queue.clone(), stop.clone(), overflow.clone());

        assert_eq!(callback.process(&[0.1; 8]), CallbackFlow::Continue);
        assert_eq!(callback.process(&[0.2; 6]), CallbackFlow::Continue);
        stop.store(true, Ordering::Release);
        assert_eq!(callback.process(&[0.3; 2]), CallbackFlow::Complete);

        let first = queue.pop().unwrap();
        assert_eq!(first.frames(), 4);
        assert_eq!(first.samples(), &[0.1; 8]);
        assert_eq!(queue.pop().unwrap().samples(), &[0.2; 6]);
        assert_eq!(queue.pop().unwrap().frames(), 1);
        assert!(!overflow.load(Ordering::Relaxed));
    }

    #[test]
    fn large_inputs_are_split_across_buffers() {
        let (pool, queue) = rings(4, 2);
        let stop = Arc::new(AtomicBool::new(false));
        let overflow = Arc::new(AtomicBool::new(false));
        let mut callback = CaptureCallback::new(pool, queue.clone(), stop, overflow);

        let input: Vec<f32> = (0..10).map(|i| i as f32).collect();
        callback.process(&input);
        assert_eq!(queue.current_size(), 3);
        assert_eq!(queue.pop().unwrap().samples(), &[0.0, 1.0, 2.0, 3.0]);
        assert_eq!(queue.pop().unwrap().samples(), &[4.0, 5.0, 6.0, 7.0]);
        assert_eq!(queue.pop().unwrap().samples(), &[8.0, 9.0]);
    }

    #[test]
    fn exhausted_pool_sets_overflow_once_and_parks_nothing() {
        let (pool, queue) = rings(2, 2);
        let stop = Arc::new(AtomicBool::new(false));
        let overflow = Arc::new(AtomicBool::new(false));
        let mut callback = CaptureCallback::new(pool.clone(), queue.clone(), stop, overflow.clone());
        let parked = callback.parking_slot();

        callback.process(&[0.5; 4]);
        callback.process(&[0.5; 4]);
        assert!(!overflow.load(Ordering::Relaxed));
        callback.process(&[0.5; 4]);
        assert!(overflow.load(Ordering::Relaxed));
        assert_eq!(queue.current_size(), 2);

        drop(callback);
        assert!(parked.lock().unwrap().is_none());
    }
}
