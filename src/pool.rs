// src/pool.rs

//! The two buffer rings used by the capture path: the free-list [`BufferPool`] and the
//! [`FilledQueue`] that carries recorded blocks to the disk writer.

use crate::audio_buffer::AudioBuffer;
use crate::error::{EngineError, EngineResult, ErrorKind, ErrorSink};
use crate::ring::{Handoff, Pool};
use std::fmt;
use std::sync::Arc;

fn validate_layout(capacity: usize, channels: usize) -> EngineResult<()> {
    if capacity == 0 {
        return Err(EngineError::new(
            ErrorKind::InvalidBufferSize,
            "ring capacity must be greater than zero",
        ));
    }
    if !(1..=2).contains(&channels) {
        return Err(EngineError::new(
            ErrorKind::InvalidChannelCount,
            format!("channel count must be 1 or 2, got {}", channels),
        ));
    }
    Ok(())
}

/// Pre-allocated audio buffers, lent to the producer and returned by the consumer.
///
/// The producer side (`try_pop`/`pop`) and the consumer side (`push`) must each be driven by a
/// single thread.
pub struct BufferPool {
    pool: Pool<AudioBuffer>,
    buffer_frames: usize,
    channels: usize,
    sink: Arc<dyn ErrorSink>,
}

impl BufferPool {
    /// Allocates `capacity` zeroed buffers of `buffer_frames` frames each. Both numbers are
    /// rounded up to the next power of two.
    pub fn new(
        capacity: usize,
        buffer_frames: usize,
        channels: usize,
        sink: Arc<dyn ErrorSink>,
    ) -> EngineResult<Self> {
        let result = Self::build(capacity, buffer_frames, channels, sink.clone());
        if let Err(err) = &result {
            err.report(sink.as_ref());
        }
        result
    }

    fn build(
        capacity: usize,
        buffer_frames: usize,
        channels: usize,
        sink: Arc<dyn ErrorSink>,
    ) -> EngineResult<Self> {
        validate_layout(capacity, channels)?;
        if buffer_frames == 0 {
            return Err(EngineError::new(
                ErrorKind::InvalidBufferSize,
                "per-buffer size must be greater than zero",
            ));
        }
        let buffer_frames = buffer_frames.checked_next_power_of_two().ok_or_else(|| {
            EngineError::new(
                ErrorKind::ResourceAllocationFailed,
                format!("per-buffer size {} is too large", buffer_frames),
            )
        })?;
        let pool = Pool::from_fn(capacity, |id| AudioBuffer::new(id, buffer_frames, channels))?;
        log::debug!(
            "Allocated buffer pool: {} buffers x {} frames x {} ch",
            pool.capacity(),
            buffer_frames,
            channels
        );
        Ok(Self {
            pool,
            buffer_frames,
            channels,
            sink,
        })
    }

    /// Lends a buffer without reporting anything. Safe to call from the audio callback.
    #[inline]
    pub fn try_pop(&self) -> Option<AudioBuffer> {
        self.pool.try_pop()
    }

    /// Lends a buffer, reporting `EmptyBufferQueue` when none is left.
    pub fn pop(&self) -> Option<AudioBuffer> {
        let buffer = self.pool.try_pop();
        if buffer.is_none() {
            self.sink
                .on_error(ErrorKind::EmptyBufferQueue, "buffer pool is exhausted");
        }
        buffer
    }

    /// Returns a buffer to the pool.
    ///
    /// A buffer that does not match the pool layout, or a push into a pool that is already
    /// full, is reported and handed back.
    pub fn push(&self, mut buffer: AudioBuffer) -> Result<(), AudioBuffer> {
        if buffer.channels() != self.channels || buffer.capacity_frames() != self.buffer_frames {
            self.sink.on_error(
                ErrorKind::BufferSizeMismatch,
                &format!(
                    "buffer {} ({} frames x {} ch) does not belong to this pool",
                    buffer.id(),
                    buffer.capacity_frames(),
                    buffer.channels()
                ),
            );
            return Err(buffer);
        }
        buffer.clear();
        self.pool.push(buffer).map_err(|buffer| {
            self.sink.on_error(
                ErrorKind::BufferOverflow,
                &format!("buffer pool is already full, rejected buffer {}", buffer.id()),
            );
            buffer
        })
    }

    pub fn capacity(&self) -> usize {
        self.pool.capacity()
    }

    pub fn buffer_frames(&self) -> usize {
        self.buffer_frames
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Buffers currently available for lending.
    pub fn current_size(&self) -> usize {
        self.pool.current_size()
    }
}

impl fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferPool")
            .field("capacity", &self.capacity())
            .field("available", &self.current_size())
            .field("buffer_frames", &self.buffer_frames)
            .field("channels", &self.channels)
            .finish()
    }
}

/// Filled buffers on their way from the capture callback to the disk writer.
///
/// Holds no storage of its own; every buffer in it belongs to a [`BufferPool`].
pub struct FilledQueue {
    queue: Handoff<AudioBuffer>,
    channels: usize,
}

impl FilledQueue {
    pub fn new(capacity: usize, channels: usize, sink: &dyn ErrorSink) -> EngineResult<Self> {
        let result = validate_layout(capacity, channels).and_then(|_| {
            Ok(Self {
                queue: Handoff::new(capacity)?,
                channels,
            })
        });
        if let Err(err) = &result {
            err.report(sink);
        }
        result
    }

    #[inline]
    pub fn push(&self, buffer: AudioBuffer) -> Result<(), AudioBuffer> {
        self.queue.push(buffer)
    }

    #[inline]
    pub fn pop(&self) -> Option<AudioBuffer> {
        self.queue.pop()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn current_size(&self) -> usize {
        self.queue.current_size()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl fmt::Debug for FilledQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilledQueue")
            .field("capacity", &self.capacity())
            .field("queued", &self.current_size())
            .field("channels", &self.channels)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CollectingErrorSink;

    fn sink() -> Arc<CollectingErrorSink> {
        Arc::new(CollectingErrorSink::new())
    }

    #[test]
    fn pool_rounds_sizes_and_prefills() {
        let pool = BufferPool::new(3, 100, 2, sink()).unwrap();
        assert_eq!(pool.capacity(), 4);
        assert_eq!(pool.buffer_frames(), 128);
        assert_eq!(pool.current_size(), 4);
        let buffer = pool.try_pop().unwrap();
        assert_eq!(buffer.capacity_frames(), 128);
        assert_eq!(buffer.channels(), 2);
    }

    #[test]
    fn invalid_layouts_are_reported() {
        let errors = sink();
        assert!(BufferPool::new(0, 8, 1, errors.clone()).is_err());
        assert!(BufferPool::new(4, 0, 1, errors.clone()).is_err());
        assert!(BufferPool::new(4, 8, 3, errors.clone()).is_err());
        assert_eq!(
            errors.kinds(),
            vec![
                ErrorKind::InvalidBufferSize,
                ErrorKind::InvalidBufferSize,
                ErrorKind::InvalidChannelCount
            ]
        );
    }

    #[test]
    fn reporting_pop_on_empty_pool() {
        let errors = sink();
        let pool = BufferPool::new(1, 8, 1, errors.clone()).unwrap();
        let held = pool.pop().unwrap();
        assert!(pool.pop().is_none());
        assert!(errors.contains(ErrorKind::EmptyBufferQueue));
        pool.push(held).unwrap();
    }

    #[test]
    fn foreign_buffers_are_rejected() {
        let errors = sink();
        let pool = BufferPool::new(2, 8, 1, errors.clone()).unwrap();
        let stranger = AudioBuffer::new(99, 16, 1);
        assert!(pool.push(stranger).is_err());
        assert!(errors.contains(ErrorKind::BufferSizeMismatch));

        let extra = AudioBuffer::new(100, 8, 1);
        assert!(pool.push(extra).is_err());
        assert!(errors.contains(ErrorKind::BufferOverflow));
    }

    #[test]
    fn returned_buffers_are_cleared() {
        let pool = BufferPool::new(1, 4, 1, sink()).unwrap();
        let mut buffer = pool.try_pop().unwrap();
        buffer.fill_from_interleaved(&[0.5; 4]);
        pool.push(buffer).unwrap();
        assert_eq!(pool.try_pop().unwrap().frames(), 0);
    }

    #[test]
    fn filled_queue_validates_channels() {
        let errors = sink();
        assert!(FilledQueue::new(4, 0, errors.as_ref()).is_err());
        let queue = FilledQueue::new(4, 2, errors.as_ref()).unwrap();
        assert!(queue.is_empty());
        assert_eq!(queue.channels(), 2);
    }
}
