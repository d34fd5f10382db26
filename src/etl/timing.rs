//! Step timing with a running total.

use std::future::Future;
use std::time::{Duration, Instant};
use tracing::info;

#[derive(Debug, Default)]
pub struct Stopwatch {
    total: Duration,
}

impl Stopwatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time accumulated over every recorded step.
    pub fn total(&self) -> Duration {
        self.total
    }

    /// Add a measured step to the total and log both.
    pub fn record(&mut self, step: &str, elapsed: Duration) {
        self.total += elapsed;
        info!(
            step,
            elapsed_ms = elapsed.as_millis() as u64,
            total_ms = self.total.as_millis() as u64,
            "Execution time: {:.3}s   Total: {:.3}s",
            elapsed.as_secs_f64(),
            self.total.as_secs_f64()
        );
    }

    pub fn time<T>(&mut self, step: &str, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let result = f();
        self.record(step, start.elapsed());
        result
    }

    pub async fn time_async<F: Future>(&mut self, step: &str, fut: F) -> F::Output {
        let start = Instant::now();
        let result = fut.await;
        self.record(step, start.elapsed());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_accumulates() {
        let mut watch = Stopwatch::new();
        watch.record("a", Duration::from_millis(30));
        watch.record("b", Duration::from_millis(12));
        assert_eq!(watch.total(), Duration::from_millis(42));
    }

    #[test]
    fn test_time_returns_result() {
        let mut watch = Stopwatch::new();
        let value = watch.time("sum", || 2 + 2);
        assert_eq!(value, 4);
    }

    #[tokio::test]
    async fn test_time_async_returns_result() {
        let mut watch = Stopwatch::new();
        let value = watch.time_async("ready", async { "done" }).await;
        assert_eq!(value, "done");
        watch.record("more", Duration::from_millis(5));
        assert!(watch.total() >= Duration::from_millis(5));
    }
}
