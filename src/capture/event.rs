// src/capture/event.rs

//! Session control: decides when a recording stops.

use crate::error::{ErrorKind, ErrorSink};
use crate::thread_pool::ThreadPool;
use std::io::{self, BufRead};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Called on the recording thread once the input stream runs. Implementations return after
/// raising `stop`; blocking work belongs on `pool`.
pub trait EventHandler: Send + Sync {
    fn on_process(&self, sink: &dyn ErrorSink, pool: &ThreadPool, stop: &Arc<AtomicBool>);
}

/// Stops when Enter is pressed, printing the elapsed time once a second.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleEventHandler;

impl EventHandler for ConsoleEventHandler {
    fn on_process(&self, sink: &dyn ErrorSink, pool: &ThreadPool, stop: &Arc<AtomicBool>) {
        if pool.available() == 0 {
            sink.on_error(
                ErrorKind::ResourceAllocationFailed,
                "no idle worker to wait for input; recording may not stop on Enter",
            );
        }

        let input_stop = stop.clone();
        pool.enqueue(move || {
            let mut line = String::new();
            if let Err(e) = io::stdin().lock().read_line(&mut line) {
                log::warn!("Failed to read from stdin: {}", e);
            }
            input_stop.store(true, Ordering::Release);
        });

        println!("Recording... press Enter to stop.");
        let started = Instant::now();
        while !stop.load(Ordering::Acquire) {
            thread::sleep(Duration::from_secs(1));
            if !stop.load(Ordering::Acquire) {
                println!("  {:>4}s", started.elapsed().as_secs());
            }
        }
    }
}

/// Stops after a fixed duration, or earlier if something else raises the flag.
#[derive(Debug, Clone, Copy)]
pub struct TimedEventHandler {
    duration: Duration,
}

impl TimedEventHandler {
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }
}

impl EventHandler for TimedEventHandler {
    fn on_process(&self, _sink: &dyn ErrorSink, _pool: &ThreadPool, stop: &Arc<AtomicBool>) {
        let deadline = Instant::now() + self.duration;
        while !stop.load(Ordering::Acquire) {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep((deadline - now).min(Duration::from_millis(10)));
        }
        stop.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CollectingErrorSink;

    #[test]
    fn timed_handler_raises_stop_after_its_duration() {
        let pool = ThreadPool::new(2);
        let sink = CollectingErrorSink::new();
        let stop = Arc::new(AtomicBool::new(false));
        let started = Instant::now();
        TimedEventHandler::new(Duration::from_millis(50)).on_process(&sink, &pool, &stop);
        assert!(stop.load(Ordering::Acquire));
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn timed_handler_returns_early_when_already_stopped() {
        let pool = ThreadPool::new(2);
        let sink = CollectingErrorSink::new();
        let stop = Arc::new(AtomicBool::new(true));
        let started = Instant::now();
        TimedEventHandler::new(Duration::from_secs(10)).on_process(&sink, &pool, &stop);
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
