//! Per-client token bucket registry with idle eviction.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

use crate::config::LimiterConfig;
use crate::lifecycle::{Background, Shutdown};

/// A simple token bucket.
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_refill: now,
        }
    }

    fn try_acquire(&mut self, capacity: f64, refill_rate: f64, now: Instant) -> bool {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();

        // Refill lazily, capped at capacity.
        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Limiter state for a single client identity.
struct ClientState {
    bucket: TokenBucket,
    last_seen: Instant,
}

/// Tracks one token bucket per client identity.
///
/// All access goes through one mutex; bucket operations are O(1) so the
/// critical section stays short for both admission checks and the janitor.
/// Time is read through `tokio::time`, so tests drive the clock with
/// `tokio::time::pause`/`advance`.
pub struct ClientRegistry {
    clients: Mutex<HashMap<String, ClientState>>,
    capacity: f64,
    refill_rate: f64,
    sweep_interval: Duration,
    idle_window: Duration,
}

impl ClientRegistry {
    pub fn new(config: &LimiterConfig) -> Arc<Self> {
        Arc::new(Self {
            clients: Mutex::new(HashMap::new()),
            capacity: f64::from(config.burst),
            refill_rate: config.requests_per_second,
            sweep_interval: Duration::from_secs(config.sweep_interval_secs),
            idle_window: Duration::from_secs(config.idle_window_secs),
        })
    }

    /// Check whether a request from `client_id` may proceed, consuming one
    /// token if so. Creates the bucket on first sight and refreshes the
    /// client's last-seen timestamp either way.
    pub fn allow(&self, client_id: &str) -> bool {
        let now = Instant::now();
        let mut clients = self.clients.lock().expect("client registry mutex poisoned");

        let state = clients
            .entry(client_id.to_string())
            .or_insert_with(|| ClientState {
                bucket: TokenBucket::new(self.capacity, now),
                last_seen: now,
            });
        state.last_seen = now;

        state.bucket.try_acquire(self.capacity, self.refill_rate, now)
    }

    /// Evict every client not seen within the idle window.
    pub fn sweep(&self) {
        let now = Instant::now();
        let mut clients = self.clients.lock().expect("client registry mutex poisoned");

        let before = clients.len();
        clients.retain(|_, state| now.duration_since(state.last_seen) <= self.idle_window);
        let evicted = before - clients.len();

        if evicted > 0 {
            tracing::debug!(evicted, remaining = clients.len(), "janitor evicted idle clients");
        }
    }

    /// Number of tracked clients.
    pub fn len(&self) -> usize {
        self.clients.lock().expect("client registry mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Spawn the janitor as a tracked background task. It sweeps once per
    /// configured interval and exits on the shutdown signal.
    pub fn spawn_janitor(self: &Arc<Self>, background: &Arc<Background>, shutdown: &Shutdown) {
        let registry = Arc::clone(self);
        let mut stop = shutdown.subscribe();

        background.spawn("limiter-janitor", async move {
            let mut ticker = tokio::time::interval(registry.sweep_interval);
            // The first tick completes immediately; skip it.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => registry.sweep(),
                    _ = stop.recv() => {
                        tracing::debug!("limiter janitor stopping");
                        break;
                    }
                }
            }
        });
    }
}
