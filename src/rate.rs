//! Smoothed throughput from cumulative byte counters sampled at irregular intervals.

use std::{
    collections::HashMap,
    hash::Hash,
    time::{Duration, Instant},
};

use log::debug;

pub const DEFAULT_TIME_CONSTANT: Duration = Duration::from_secs(5);
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy)]
struct Sample {
    at: Instant,
    bytes: u64,
}

#[derive(Debug, Clone, Copy)]
struct Connection {
    baseline: Sample,
    smoothed: f64,
}

/// Per-connection exponential moving average whose weight depends on the
/// sampling interval: `smoothed += (1 - exp(-dt/tau)) * (instant - smoothed)`.
///
/// An interval longer than `stale_after` reseeds the estimate with the
/// instantaneous rate instead of blending against an outdated value.
#[derive(Debug, Clone)]
pub struct RateEstimator<K> {
    tau: f64,
    stale_after: Duration,
    connections: HashMap<K, Connection>,
}

impl<K> Default for RateEstimator<K>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new(DEFAULT_TIME_CONSTANT, DEFAULT_STALE_AFTER)
    }
}

impl<K> RateEstimator<K>
where
    K: Eq + Hash,
{
    pub fn new(time_constant: Duration, stale_after: Duration) -> Self {
        Self {
            // A zero time constant degenerates into "always use the last interval".
            tau: time_constant.as_secs_f64().max(f64::EPSILON),
            stale_after,
            connections: HashMap::new(),
        }
    }

    /// Feeds one sample and returns the connection's current smoothed rate in
    /// bytes per second.
    pub fn update(&mut self, key: K, at: Instant, cumulative_bytes: u64) -> f64 {
        let sample = Sample {
            at,
            bytes: cumulative_bytes,
        };
        let Some(conn) = self.connections.get_mut(&key) else {
            self.connections.insert(
                key,
                Connection {
                    baseline: sample,
                    smoothed: 0.0,
                },
            );
            return 0.0;
        };

        let dt = match at.checked_duration_since(conn.baseline.at) {
            Some(dt) if !dt.is_zero() => dt,
            _ => {
                debug!("rejected rate sample: non-positive interval");
                return conn.smoothed;
            }
        };

        if cumulative_bytes < conn.baseline.bytes {
            debug!(
                "counter reset ({} -> {}), rebaselining",
                conn.baseline.bytes, cumulative_bytes
            );
            conn.baseline = sample;
            return conn.smoothed;
        }

        let secs = dt.as_secs_f64();
        let instant = (cumulative_bytes - conn.baseline.bytes) as f64 / secs;
        let alpha = if dt > self.stale_after {
            1.0
        } else {
            1.0 - (-secs / self.tau).exp()
        };
        conn.smoothed += alpha * (instant - conn.smoothed);
        conn.baseline = sample;
        conn.smoothed
    }

    pub fn estimate(&self, key: &K) -> Option<f64> {
        self.connections.get(key).map(|conn| conn.smoothed)
    }

    /// Drops all state for a connection. Returns whether any existed.
    pub fn forget(&mut self, key: &K) -> bool {
        self.connections.remove(key).is_some()
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&K) -> bool) {
        self.connections.retain(|key, _| keep(key));
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
