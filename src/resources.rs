// src/resources.rs

//! Process-wide buffers, queues and workers shared by every capture session.

use crate::error::{EngineResult, ErrorSink};
use crate::pool::{BufferPool, FilledQueue};
use crate::settings::EngineSettings;
use crate::thread_pool::ThreadPool;
use std::sync::Arc;

/// Owns the mono/stereo buffer pools, their filled queues and the worker pool for the lifetime
/// of the process. Accessors hand out shared handles.
#[derive(Debug)]
pub struct EngineResources {
    thread_pool: Arc<ThreadPool>,
    mono_pool: Arc<BufferPool>,
    stereo_pool: Arc<BufferPool>,
    mono_queue: Arc<FilledQueue>,
    stereo_queue: Arc<FilledQueue>,
}

impl EngineResources {
    /// 1024 buffers of 1024 frames per layout, workers sized to the hardware.
    pub fn new(sink: Arc<dyn ErrorSink>) -> EngineResult<Self> {
        Self::with_settings(&EngineSettings::default(), sink)
    }

    pub fn with_settings(settings: &EngineSettings, sink: Arc<dyn ErrorSink>) -> EngineResult<Self> {
        let buffers = settings.pool_buffers;
        let frames = settings.buffer_frames;

        let mono_pool = BufferPool::new(buffers, frames, 1, sink.clone())?;
        let stereo_pool = BufferPool::new(buffers, frames, 2, sink.clone())?;
        let mono_queue = FilledQueue::new(buffers, 1, sink.as_ref())?;
        let stereo_queue = FilledQueue::new(buffers, 2, sink.as_ref())?;

        let thread_pool = match settings.worker_threads {
            Some(threads) => ThreadPool::new(threads.max(2)),
            None => ThreadPool::with_hardware_concurrency(),
        };

        log::info!(
            "Engine resources ready: {} buffers x {} frames per layout, {} workers",
            stereo_pool.capacity(),
            stereo_pool.buffer_frames(),
            thread_pool.size()
        );

        Ok(Self {
            thread_pool: Arc::new(thread_pool),
            mono_pool: Arc::new(mono_pool),
            stereo_pool: Arc::new(stereo_pool),
            mono_queue: Arc::new(mono_queue),
            stereo_queue: Arc::new(stereo_queue),
        })
    }

    pub fn thread_pool(&self) -> Arc<ThreadPool> {
        self.thread_pool.clone()
    }

    pub fn mono_pool(&self) -> Arc<BufferPool> {
        self.mono_pool.clone()
    }

    pub fn stereo_pool(&self) -> Arc<BufferPool> {
        self.stereo_pool.clone()
    }

    pub fn mono_queue(&self) -> Arc<FilledQueue> {
        self.mono_queue.clone()
    }

    pub fn stereo_queue(&self) -> Arc<FilledQueue> {
        self.stereo_queue.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CollectingErrorSink;

    #[test]
    fn default_resources_use_engine_sizes() {
        let resources = EngineResources::new(Arc::new(CollectingErrorSink::new())).unwrap();
        let stereo = resources.stereo_pool();
        assert_eq!(stereo.capacity(), 1024);
        assert_eq!(stereo.buffer_frames(), 1024);
        assert_eq!(stereo.channels(), 2);
        assert_eq!(resources.mono_pool().channels(), 1);
        assert!(resources.stereo_queue().is_empty());
        assert!(resources.thread_pool().available() >= 2);
    }

    #[test]
    fn settings_shape_the_pools() {
        let settings = EngineSettings {
            pool_buffers: 8,
            buffer_frames: 64,
            worker_threads: Some(1),
            ..EngineSettings::default()
        };
        let resources =
            EngineResources::with_settings(&settings, Arc::new(CollectingErrorSink::new()))
                .unwrap();
        assert_eq!(resources.mono_queue().capacity(), 8);
        assert_eq!(resources.stereo_pool().buffer_frames(), 64);
        assert_eq!(resources.thread_pool().size(), 2);
    }
}
