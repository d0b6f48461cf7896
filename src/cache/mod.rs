//! Time-bounded memoization of query results.
//!
//! A key is either ready (a computed value and when it was stored) or in
//! flight (a watch channel the computing caller publishes its outcome on).
//! Concurrent callers for an in-flight key wait on the channel and receive
//! the same outcome, failures included. The map itself is only locked long
//! enough to read or replace a key, so other keys stay available while one
//! is being computed.

use log::debug;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex};

pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub template_hash: String,
    pub filter_fingerprint: String,
}

impl CacheKey {
    pub fn new(template_hash: impl Into<String>, filter_fingerprint: impl Into<String>) -> Self {
        Self {
            template_hash: template_hash.into(),
            filter_fingerprint: filter_fingerprint.into(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Prefixes are enough to tell keys apart in logs.
        let short = |s: &str| s.chars().take(12).collect::<String>();
        write!(
            f,
            "{}/{}",
            short(&self.template_hash),
            short(&self.filter_fingerprint)
        )
    }
}

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

type Outcome<V, E> = Option<Result<Arc<V>, E>>;

struct CacheEntry<V> {
    value: Arc<V>,
    inserted_at: Instant,
}

enum Slot<V, E> {
    Ready(CacheEntry<V>),
    /// Closed once the computing caller publishes, or when it is dropped
    /// before finishing.
    InFlight(watch::Receiver<Outcome<V, E>>),
}

enum Turn<V, E> {
    Wait(watch::Receiver<Outcome<V, E>>),
    Compute(watch::Sender<Outcome<V, E>>),
}

pub struct ResultCache<V, E> {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    slots: Mutex<HashMap<CacheKey, Slot<V, E>>>,
}

impl<V, E: Clone> ResultCache<V, E> {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the cached value for `key`, or runs `compute` and stores its
    /// result.
    ///
    /// Callers that arrive while `key` is being computed get that
    /// computation's outcome, success or failure. Failures are never stored;
    /// the next call after one computes again.
    pub async fn get_or_compute<F, Fut>(&self, key: CacheKey, compute: F) -> Result<Arc<V>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        loop {
            let turn = {
                let mut slots = self.slots.lock().await;
                let waiting = match slots.get(&key) {
                    Some(Slot::Ready(entry)) if self.is_fresh(entry) => {
                        debug!("Cache hit for {}", key);
                        return Ok(entry.value.clone());
                    }
                    Some(Slot::InFlight(receiver)) if receiver.has_changed().is_ok() => {
                        debug!("Waiting on in-flight computation for {}", key);
                        Some(receiver.clone())
                    }
                    Some(Slot::Ready(_)) => {
                        debug!("Cache entry for {} expired", key);
                        None
                    }
                    Some(Slot::InFlight(_)) => {
                        debug!("Computation for {} was abandoned", key);
                        None
                    }
                    None => {
                        debug!("Cache miss for {}", key);
                        None
                    }
                };
                match waiting {
                    Some(receiver) => Turn::Wait(receiver),
                    None => {
                        let (sender, receiver) = watch::channel(None);
                        slots.insert(key.clone(), Slot::InFlight(receiver));
                        Turn::Compute(sender)
                    }
                }
            };

            match turn {
                Turn::Wait(mut receiver) => {
                    let published = receiver
                        .wait_for(Option::is_some)
                        .await
                        .ok()
                        .and_then(|outcome| outcome.clone());
                    match published {
                        Some(outcome) => return outcome,
                        // The computing caller went away; start over.
                        None => continue,
                    }
                }
                Turn::Compute(sender) => {
                    let outcome = compute().await.map(Arc::new);
                    {
                        let mut slots = self.slots.lock().await;
                        match &outcome {
                            Ok(value) => {
                                slots.insert(
                                    key,
                                    Slot::Ready(CacheEntry {
                                        value: value.clone(),
                                        inserted_at: self.clock.now(),
                                    }),
                                );
                            }
                            Err(_) => {
                                slots.remove(&key);
                            }
                        }
                    }
                    sender.send_replace(Some(outcome.clone()));
                    return outcome;
                }
            }
        }
    }

    /// Number of keys that currently hold a value, fresh or not.
    pub async fn len(&self) -> usize {
        self.slots
            .lock()
            .await
            .values()
            .filter(|slot| matches!(slot, Slot::Ready(_)))
            .count()
    }

    pub async fn clear(&self) {
        self.slots.lock().await.clear();
    }

    fn is_fresh(&self, entry: &CacheEntry<V>) -> bool {
        self.clock.now().saturating_duration_since(entry.inserted_at) < self.ttl
    }
}

impl<V, E: Clone> Default for ResultCache<V, E> {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

/// A clock that only moves when told to.
#[cfg(test)]
pub(crate) struct ManualClock {
    now: std::sync::Mutex<Instant>,
}

#[cfg(test)]
impl ManualClock {
    pub(crate) fn new() -> Self {
        Self {
            now: std::sync::Mutex::new(Instant::now()),
        }
    }

    pub(crate) fn advance(&self, by: Duration) {
        *self.now.lock().unwrap() += by;
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap()
    }
}
