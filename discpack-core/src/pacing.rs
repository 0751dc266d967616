use std::thread;
use std::time::Duration;

/// Called by the packer between files and between buckets. Implementations
/// may only affect wall-clock time.
pub trait Pacer {
    fn between_files(&self) {}
    fn between_buckets(&self) {}
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoPacing;

impl Pacer for NoPacing {}

/// Sleeps a fixed interval at every step, easing load on shared filesystems.
#[derive(Clone, Copy, Debug)]
pub struct SleepPacer {
    interval: Duration,
}

impl SleepPacer {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn from_millis(ms: u64) -> Self {
        Self::new(Duration::from_millis(ms))
    }
}

impl Pacer for SleepPacer {
    fn between_files(&self) {
        if !self.interval.is_zero() {
            thread::sleep(self.interval);
        }
    }

    fn between_buckets(&self) {
        self.between_files();
    }
}
