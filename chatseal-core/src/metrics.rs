//! Metrics for the encryption pipeline
//!
//! Recorded through the `metrics` facade; installing a recorder (and any
//! exporter) is up to the embedding application.

use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::time::Instant;

pub const ENVELOPES_ENCRYPTED: &str = "chatseal.envelopes.encrypted";
pub const ENVELOPES_DECRYPTED: &str = "chatseal.envelopes.decrypted";
pub const DECRYPT_FAILURES: &str = "chatseal.decrypt.failures";
pub const LEGACY_FALLBACK_ATTEMPTS: &str = "chatseal.legacy.fallback_attempts";
pub const PLAINTEXT_FALLBACKS: &str = "chatseal.outgoing.plaintext_fallbacks";
pub const CACHE_COMMITS: &str = "chatseal.cache.commits";
pub const CACHE_STALE_BATCHES: &str = "chatseal.cache.stale_batches";
pub const CACHE_PASS_DURATION: &str = "chatseal.cache.pass.duration_ms";

/// Initialize metrics with descriptions
pub fn init_metrics() {
    describe_counter!(ENVELOPES_ENCRYPTED, "Number of V2 envelopes produced");
    describe_counter!(ENVELOPES_DECRYPTED, "Number of envelopes decrypted successfully");
    describe_counter!(DECRYPT_FAILURES, "Number of envelopes that could not be decrypted");
    describe_counter!(LEGACY_FALLBACK_ATTEMPTS, "Historical keys tried on V1 packets");
    describe_counter!(PLAINTEXT_FALLBACKS, "Messages sent unencrypted under the degrade policy");
    describe_counter!(CACHE_COMMITS, "Reconciliation passes committed to the cache");
    describe_counter!(CACHE_STALE_BATCHES, "Reconciliation passes rejected as stale");
    describe_histogram!(CACHE_PASS_DURATION, "Reconciliation pass duration in milliseconds");
}

/// Record a counter metric
pub fn record_counter(name: &'static str, value: u64) {
    counter!(name).increment(value);
}

/// Timer for measuring operation duration
pub struct Timer {
    name: &'static str,
    start: Instant,
}

impl Timer {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            start: Instant::now(),
        }
    }

    /// Stop the timer and record the duration
    pub fn stop(self) {
        let duration = self.start.elapsed();
        histogram!(self.name).record(duration.as_secs_f64() * 1000.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_init() {
        // no recorder installed; describing and recording are no-ops
        init_metrics();
        record_counter(ENVELOPES_ENCRYPTED, 1);
    }

    #[test]
    fn test_timer() {
        let timer = Timer::new(CACHE_PASS_DURATION);
        std::thread::sleep(std::time::Duration::from_millis(5));
        timer.stop();
    }
}
