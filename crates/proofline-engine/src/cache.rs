//! Content-addressed LRU/TTL cache of annotator results.
//!
//! Entries are keyed by a hash of the whitespace-normalized, lowercased text,
//! so two requests for the same content share a result whichever session
//! issued them. The cache is a plain value; wrap it in [`SharedCache`] to
//! share it with the background sweeper.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::text::{char_len, collapse_whitespace};

const PREVIEW_CHARS: usize = 50;

pub type SharedCache<T> = Arc<Mutex<AnnotationCache<T>>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub capacity: usize,
    pub ttl_secs: u64,
    pub min_len: usize,
    pub max_len: usize,
    /// Hex characters of the SHA-256 digest kept as the key
    pub key_len: usize,
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            ttl_secs: 30 * 60,
            min_len: 10,
            max_len: 10_000,
            key_len: 16,
            sweep_interval_secs: 5 * 60,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub key: String,
    pub text_preview: String,
    pub result: T,
    pub created_at: Instant,
    pub last_accessed_at: Instant,
    pub hit_count: u64,
    pub text_length: usize,
}

/// Inspection view of an entry, for debugging surfaces
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheEntrySummary {
    pub key: String,
    pub text_preview: String,
    pub text_length: usize,
    pub hit_count: u64,
    pub age_secs: u64,
}

/// Counters since the cache was created.
///
/// `hits` and `misses` count lookups of eligible text only; a `get` for text
/// outside `[min_len, max_len]` returns `None` without touching either.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub total_entries: usize,
    pub evictions: u64,
    pub expirations: u64,
    pub capacity: usize,
}

#[derive(Debug, Default)]
struct Counters {
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
}

#[derive(Debug)]
pub struct AnnotationCache<T> {
    config: CacheConfig,
    entries: HashMap<String, CacheEntry<T>>,
    /// Keys from least to most recently accessed
    access_order: VecDeque<String>,
    counters: Counters,
    sweeper: Option<CancellationToken>,
}

impl<T: Clone> AnnotationCache<T> {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: HashMap::with_capacity(config.capacity),
            access_order: VecDeque::with_capacity(config.capacity),
            counters: Counters::default(),
            sweeper: None,
            config,
        }
    }

    pub fn shared(config: CacheConfig) -> SharedCache<T> {
        Arc::new(Mutex::new(Self::new(config)))
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Whether `text` may be cached at all
    pub fn is_eligible(&self, text: &str) -> bool {
        let len = char_len(text);
        !text.trim().is_empty() && len >= self.config.min_len && len <= self.config.max_len
    }

    /// Key under which `text` is stored
    pub fn key_for(&self, text: &str) -> String {
        cache_key(text, self.config.key_len)
    }

    /// Live entry for `text`. Ineligible text always misses and is not counted.
    pub fn get(&mut self, text: &str) -> Option<CacheEntry<T>> {
        self.get_at(text, Instant::now())
    }

    pub fn get_at(&mut self, text: &str, now: Instant) -> Option<CacheEntry<T>> {
        if !self.is_eligible(text) {
            return None;
        }
        let key = self.key_for(text);
        if self.expire_if_stale(&key, now) {
            self.counters.misses += 1;
            return None;
        }

        match self.entries.get_mut(&key) {
            Some(entry) => {
                entry.hit_count += 1;
                entry.last_accessed_at = now;
                let found = entry.clone();
                self.counters.hits += 1;
                self.touch(&key);
                Some(found)
            }
            None => {
                self.counters.misses += 1;
                None
            }
        }
    }

    /// Store `result` for `text`. Returns `false` when the text is ineligible.
    pub fn set(&mut self, text: &str, result: T) -> bool {
        self.set_at(text, result, Instant::now())
    }

    pub fn set_at(&mut self, text: &str, result: T, now: Instant) -> bool {
        if !self.is_eligible(text) || self.config.capacity == 0 {
            log::debug!("Not caching ineligible text of length {}", char_len(text));
            return false;
        }
        let key = self.key_for(text);

        if !self.entries.contains_key(&key) && self.entries.len() >= self.config.capacity {
            self.evict_least_recent();
        }

        let entry = CacheEntry {
            key: key.clone(),
            text_preview: preview(text),
            result,
            created_at: now,
            last_accessed_at: now,
            hit_count: 0,
            text_length: char_len(text),
        };
        self.entries.insert(key.clone(), entry);
        self.touch(&key);
        true
    }

    /// Presence check; does not count as an access
    pub fn has(&mut self, text: &str) -> bool {
        self.has_at(text, Instant::now())
    }

    pub fn has_at(&mut self, text: &str, now: Instant) -> bool {
        if !self.is_eligible(text) {
            return false;
        }
        let key = self.key_for(text);
        !self.expire_if_stale(&key, now) && self.entries.contains_key(&key)
    }

    pub fn stats(&self) -> CacheStats {
        let Counters {
            hits,
            misses,
            evictions,
            expirations,
        } = self.counters;
        let lookups = hits + misses;
        CacheStats {
            hits,
            misses,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
            total_entries: self.entries.len(),
            evictions,
            expirations,
            capacity: self.config.capacity,
        }
    }

    /// Up to `limit` entries, most recently accessed first
    pub fn entries(&self, limit: usize) -> Vec<CacheEntrySummary> {
        let now = Instant::now();
        self.access_order
            .iter()
            .rev()
            .filter_map(|key| self.entries.get(key))
            .take(limit)
            .map(|entry| CacheEntrySummary {
                key: entry.key.clone(),
                text_preview: entry.text_preview.clone(),
                text_length: entry.text_length,
                hit_count: entry.hit_count,
                age_secs: now.saturating_duration_since(entry.created_at).as_secs(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove every expired entry; returns how many were removed
    pub fn sweep_expired(&mut self) -> usize {
        self.sweep_expired_at(Instant::now())
    }

    pub fn sweep_expired_at(&mut self, now: Instant) -> usize {
        let ttl = self.config.ttl();
        let expired: Vec<String> = self
            .entries
            .values()
            .filter(|entry| now.saturating_duration_since(entry.created_at) >= ttl)
            .map(|entry| entry.key.clone())
            .collect();
        for key in &expired {
            self.remove(key);
        }
        self.counters.expirations += expired.len() as u64;
        if !expired.is_empty() {
            log::debug!("Swept {} expired cache entries", expired.len());
        }
        expired.len()
    }

    /// Drop all entries and reset the counters
    pub fn clear(&mut self) {
        self.entries.clear();
        self.access_order.clear();
        self.counters = Counters::default();
        log::info!("Annotation cache cleared");
    }

    /// Clear and stop the background sweeper, if any
    pub fn destroy(&mut self) {
        if let Some(token) = self.sweeper.take() {
            token.cancel();
        }
        self.clear();
    }

    fn expire_if_stale(&mut self, key: &str, now: Instant) -> bool {
        let ttl = self.config.ttl();
        let stale = self
            .entries
            .get(key)
            .is_some_and(|entry| now.saturating_duration_since(entry.created_at) >= ttl);
        if stale {
            self.remove(key);
            self.counters.expirations += 1;
            log::debug!("Cache entry {key} expired");
        }
        stale
    }

    fn evict_least_recent(&mut self) {
        if let Some(key) = self.access_order.pop_front() {
            self.entries.remove(&key);
            self.counters.evictions += 1;
            log::debug!("Evicted least recently used cache entry {key}");
        }
    }

    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.access_order.iter().position(|k| k == key) {
            self.access_order.remove(pos);
        }
        self.access_order.push_back(key.to_string());
    }

    fn remove(&mut self, key: &str) {
        self.entries.remove(key);
        self.access_order.retain(|k| k != key);
    }
}

/// Start the periodic TTL sweep for `cache` on the current tokio runtime.
///
/// The task stops when [`AnnotationCache::destroy`] is called, when the cache
/// is dropped, or when another sweeper replaces it.
pub fn spawn_sweeper<T>(cache: &SharedCache<T>) -> JoinHandle<()>
where
    T: Clone + Send + 'static,
{
    let token = CancellationToken::new();
    let interval = {
        let mut guard = cache.lock();
        if let Some(previous) = guard.sweeper.replace(token.clone()) {
            previous.cancel();
        }
        guard.config.sweep_interval()
    };
    let weak = Arc::downgrade(cache);
    log::info!("Starting cache sweeper every {interval:?}");

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    let Some(cache) = weak.upgrade() else { break };
                    cache.lock().sweep_expired();
                }
            }
        }
        log::debug!("Cache sweeper stopped");
    })
}

fn cache_key(text: &str, key_len: usize) -> String {
    let normalized = collapse_whitespace(text).to_lowercase();
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    let mut hex: String = hasher
        .finalize()
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect();
    hex.truncate(key_len);
    hex
}

fn preview(text: &str) -> String {
    let trimmed = text.trim();
    if char_len(trimmed) <= PREVIEW_CHARS {
        trimmed.to_string()
    } else {
        let mut cut: String = trimmed.chars().take(PREVIEW_CHARS).collect();
        cut.push('…');
        cut
    }
}
