// src/capture/streamer.rs

//! The disk writer: drains the filled queue into a float WAV file and hands every buffer back
//! to the pool.

use crate::audio_file::{check_channel_count, check_sample_rate};
use crate::error::{EngineError, EngineResult, ErrorKind, ErrorSink};
use crate::pool::{BufferPool, FilledQueue};
use chrono::Local;
use std::fs;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const EMPTY_POLL: Duration = Duration::from_micros(10);
pub const RECORDING_EXTENSION: &str = "wav";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Recording,
    Playback,
}

impl StreamKind {
    /// Subdirectory of the session directory used for this kind of stream.
    pub fn subdir(self) -> &'static str {
        match self {
            StreamKind::Recording => "records",
            StreamKind::Playback => "playback",
        }
    }

    fn file_prefix(self) -> &'static str {
        match self {
            StreamKind::Recording => "recording_session_",
            StreamKind::Playback => "playback_session_",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub frames_written: usize,
    pub buffers_written: usize,
}

/// `Sat Oct 18 14:03:07 2026\n` with spaces and colons turned into `_` and the newline into
/// `.`, ready for the extension.
pub fn session_timestamp() -> String {
    Local::now()
        .format("%a %b %e %H:%M:%S %Y\n")
        .to_string()
        .replace([' ', ':'], "_")
        .replace('\n', ".")
}

fn unique_path(dir: &Path, prefix: &str, stamp: &str) -> PathBuf {
    let first = dir.join(format!("{}{}{}", prefix, stamp, RECORDING_EXTENSION));
    if !first.exists() {
        return first;
    }
    let stem = stamp.trim_end_matches('.');
    (2..)
        .map(|n| dir.join(format!("{}{}_{}.{}", prefix, stem, n, RECORDING_EXTENSION)))
        .find(|p| !p.exists())
        .unwrap_or(first)
}

pub struct FileStreamer {
    queue: Arc<FilledQueue>,
    pool: Arc<BufferPool>,
    stop: Arc<AtomicBool>,
    producer_done: Option<Arc<AtomicBool>>,
    kind: StreamKind,
    path: PathBuf,
    channels: u16,
    sample_rate: u32,
    sink: Arc<dyn ErrorSink>,
    stats: StreamStats,
}

impl FileStreamer {
    /// Creates `<session_dir>/<kind subdir>/` if needed and picks a timestamped file name in it.
    pub fn new(
        queue: Arc<FilledQueue>,
        pool: Arc<BufferPool>,
        stop: Arc<AtomicBool>,
        kind: StreamKind,
        session_dir: &Path,
        sink: Arc<dyn ErrorSink>,
    ) -> EngineResult<Self> {
        let dir = session_dir.join(kind.subdir());
        fs::create_dir_all(&dir).map_err(|e| {
            EngineError::new(
                crate::audio_file::io_error_kind(&e, ErrorKind::DirectoryNotFound),
                format!("Failed to create {}: {}", dir.display(), e),
            )
        })?;
        let path = unique_path(&dir, kind.file_prefix(), &session_timestamp());
        let channels = queue.channels() as u16;

        Ok(Self {
            queue,
            pool,
            stop,
            producer_done: None,
            kind,
            path,
            channels,
            sample_rate: 44_100,
            sink,
            stats: StreamStats::default(),
        })
    }

    /// Validates and stores the output layout. Channels must also match the queue.
    pub fn set_write_info(&mut self, channels: u16, sample_rate: u32) -> EngineResult<()> {
        check_channel_count(channels as usize)?;
        check_sample_rate(sample_rate)?;
        if channels as usize != self.queue.channels() {
            return Err(EngineError::new(
                ErrorKind::InvalidChannelCount,
                format!(
                    "{}-channel output cannot drain a {}-channel queue",
                    channels,
                    self.queue.channels()
                ),
            ));
        }
        self.channels = channels;
        self.sample_rate = sample_rate;
        Ok(())
    }

    /// Holds the final drain back until the producer has also raised this flag, so no block
    /// pushed after the stop request is left behind in the queue.
    pub fn set_producer_done(&mut self, done: Arc<AtomicBool>) {
        self.producer_done = Some(done);
    }

    pub fn output_path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    pub fn stats(&self) -> StreamStats {
        self.stats
    }

    fn finished(&self) -> bool {
        self.stop.load(Ordering::Acquire)
            && self
                .producer_done
                .as_ref()
                .map_or(true, |done| done.load(Ordering::Acquire))
    }

    /// Writes queued buffers until stopped, then drains the queue and closes the file.
    ///
    /// Returns false when the file could not be opened, a block could not be written, or the
    /// file failed to close. Every failure is reported to the sink.
    pub fn write(&mut self) -> bool {
        let spec = hound::WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = match hound::WavWriter::create(&self.path, spec) {
            Ok(writer) => writer,
            Err(e) => {
                self.sink.on_error(
                    ErrorKind::FileOpenError,
                    &format!("Failed to open {}: {}", self.path.display(), e),
                );
                self.discard();
                return false;
            }
        };
        log::info!("Writer started: {}", self.path.display());

        let mut ok = true;
        loop {
            if self.finished() {
                break;
            }
            match self.queue.pop() {
                Some(buffer) => ok &= self.write_block(&mut writer, buffer),
                None => thread::sleep(EMPTY_POLL),
            }
        }

        log::debug!("Writer draining {} queued buffers", self.queue.current_size());
        while let Some(buffer) = self.queue.pop() {
            ok &= self.write_block(&mut writer, buffer);
        }

        if let Err(e) = writer.finalize() {
            self.sink.on_error(
                ErrorKind::FileClosingError,
                &format!("Failed to close {}: {}", self.path.display(), e),
            );
            ok = false;
        }
        log::info!(
            "Writer finished: {} frames in {} buffers to {}",
            self.stats.frames_written,
            self.stats.buffers_written,
            self.path.display()
        );
        ok
    }

    /// Recycles queued buffers unwritten until the session ends, so the producer never runs
    /// the pool dry behind a writer that has nothing to write to.
    fn discard(&mut self) {
        let mut dropped = 0usize;
        loop {
            let finished = self.finished();
            while let Some(buffer) = self.queue.pop() {
                dropped += 1;
                let _ = self.pool.push(buffer);
            }
            if finished {
                break;
            }
            thread::sleep(EMPTY_POLL);
        }
        log::warn!("Writer discarded {} buffers for {}", dropped, self.path.display());
    }

    fn write_block(
        &mut self,
        writer: &mut hound::WavWriter<BufWriter<fs::File>>,
        buffer: crate::audio_buffer::AudioBuffer,
    ) -> bool {
        let samples = buffer.samples();
        let mut written = 0usize;
        let mut failure = None;
        for &sample in samples {
            if let Err(e) = writer.write_sample(sample) {
                failure = Some(e);
                break;
            }
            written += 1;
        }
        let frames = written / self.channels.max(1) as usize;
        self.stats.frames_written += frames;
        self.stats.buffers_written += 1;

        let ok = match failure {
            Some(e) => {
                self.sink.on_error(
                    ErrorKind::FileWriteError,
                    &format!(
                        "Short write: {} of {} frames from buffer {}: {}",
                        frames,
                        buffer.frames(),
                        buffer.id(),
                        e
                    ),
                );
                false
            }
            None => true,
        };
        // A rejected return has already been reported by the pool.
        let _ = self.pool.push(buffer);
        ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_buffer::AudioBuffer;
    use crate::error::CollectingErrorSink;

    #[test]
    fn timestamp_is_sanitized() {
        let stamp = session_timestamp();
        assert!(stamp.ends_with('.'));
        assert!(!stamp.contains(' ') && !stamp.contains(':') && !stamp.contains('\n'));
    }

    #[test]
    fn write_info_must_match_the_queue() {
        let sink: Arc<dyn ErrorSink> = Arc::new(CollectingErrorSink::new());
        let dir = tempfile::tempdir().unwrap();
        let pool = Arc::new(BufferPool::new(4, 8, 2, sink.clone()).unwrap());
        let queue = Arc::new(FilledQueue::new(4, 2, sink.as_ref()).unwrap());
        let stop = Arc::new(AtomicBool::new(false));
        let mut streamer =
            FileStreamer::new(queue, pool, stop, StreamKind::Recording, dir.path(), sink).unwrap();

        assert!(streamer.output_path().starts_with(dir.path().join("records")));
        let name = streamer.output_path().file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("recording_session_") && name.ends_with(".wav"));

        assert_eq!(
            streamer.set_write_info(2, 44_000).unwrap_err().kind,
            ErrorKind::InvalidSampleRate
        );
        assert_eq!(
            streamer.set_write_info(3, 44_100).unwrap_err().kind,
            ErrorKind::InvalidChannelCount
        );
        assert_eq!(
            streamer.set_write_info(1, 44_100).unwrap_err().kind,
            ErrorKind::InvalidChannelCount
        );
        streamer.set_write_info(2, 48_000).unwrap();
    }

    #[test]
    fn stopped_writer_drains_queue_and_returns_buffers() {
        let sink: Arc<dyn ErrorSink> = Arc::new(CollectingErrorSink::new());
        let dir = tempfile::tempdir().unwrap();
        let pool = Arc::new(BufferPool::new(4, 8, 1, sink.clone()).unwrap());
        let queue = Arc::new(FilledQueue::new(4, 1, sink.as_ref()).unwrap());

        for value in [0.25f32, -0.5] {
            let mut buffer: AudioBuffer = pool.try_pop().unwrap();
            buffer.fill_from_interleaved(&[value; 8]);
            queue.push(buffer).unwrap();
        }
        assert_eq!(pool.current_size(), 2);

        let stop = Arc::new(AtomicBool::new(true));
        let mut streamer = FileStreamer::new(
            queue.clone(),
            pool.clone(),
            stop,
            StreamKind::Recording,
            dir.path(),
            sink,
        )
        .unwrap();
        streamer.set_write_info(1, 8_000).unwrap();
        assert!(streamer.write());

        assert!(queue.is_empty());
        assert_eq!(pool.current_size(), 4);
        assert_eq!(
            streamer.stats(),
            StreamStats {
                frames_written: 16,
                buffers_written: 2
            }
        );

        let reader = hound::WavReader::open(streamer.output_path()).unwrap();
        assert_eq!(reader.spec().sample_rate, 8_000);
        let samples: Vec<f32> = reader.into_samples::<f32>().map(Result::unwrap).collect();
        assert_eq!(&samples[..8], &[0.25; 8]);
        assert_eq!(&samples[8..], &[-0.5; 8]);
    }

    #[test]
    fn unopenable_file_still_returns_every_buffer() {
        let collecting = Arc::new(CollectingErrorSink::new());
        let sink: Arc<dyn ErrorSink> = collecting.clone();
        let dir = tempfile::tempdir().unwrap();
        let pool = Arc::new(BufferPool::new(4, 8, 1, sink.clone()).unwrap());
        let queue = Arc::new(FilledQueue::new(4, 1, sink.as_ref()).unwrap());
        let stop = Arc::new(AtomicBool::new(false));

        let mut streamer = FileStreamer::new(
            queue.clone(),
            pool.clone(),
            stop.clone(),
            StreamKind::Recording,
            dir.path(),
            sink,
        )
        .unwrap();
        streamer.set_write_info(1, 8_000).unwrap();
        fs::remove_dir_all(dir.path().join("records")).unwrap();

        let writer = thread::spawn(move || streamer.write());
        for _ in 0..20 {
            let mut buffer = loop {
                if let Some(buffer) = pool.try_pop() {
                    break buffer;
                }
                thread::yield_now();
            };
            buffer.fill_from_interleaved(&[0.1; 8]);
            queue.push(buffer).unwrap();
            thread::sleep(Duration::from_millis(1));
        }
        stop.store(true, Ordering::Release);

        assert!(!writer.join().unwrap());
        assert!(queue.is_empty());
        assert_eq!(pool.current_size(), 4);
        assert_eq!(collecting.kinds(), vec![ErrorKind::FileOpenError]);
    }
}
