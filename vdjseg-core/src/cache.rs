//! Decode cache
//!
//! Memoizes engine decodes keyed by gene name and subsequence content. The same
//! V subsequence shows up for every `k_d` sharing a `k_v` (and likewise for J),
//! so most lookups during a sweep are hits.
//!
//! Each key owns a slot guarded by its own mutex. A miss decodes while holding
//! that slot's lock, so concurrent misses on one key run the engine once and
//! the others wait for the stored result; different keys never contend.

use crate::engine::{DecodeEngine, DecodeRequest};
use crate::error::{SearchError, SearchResult};
use crate::types::{Algorithm, Gene, PathLabel};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Composite cache key: gene identity plus the exact subsequence content.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DecodeKey {
    pub gene: Arc<str>,
    pub content: Box<[u8]>,
}

impl DecodeKey {
    pub fn new(gene: &Arc<str>, content: &[u8]) -> Self {
        Self {
            gene: Arc::clone(gene),
            content: content.into(),
        }
    }
}

/// A stored decode. Owned by the cache; callers get shared handles.
#[derive(Debug)]
pub struct DecodeResult<T> {
    pub gene: Arc<Gene>,
    pub trellis: T,
    pub path: Vec<PathLabel>,
    pub score: f64,
}

/// Snapshot of cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Distinct keys with a stored result
    pub entries: usize,
    /// Engine invocations
    pub decodes: u64,
    /// Lookups answered from a stored result
    pub hits: u64,
}

type Slot<T> = Arc<Mutex<Option<Arc<DecodeResult<T>>>>>;

/// Memoizing front end for a [`DecodeEngine`]
pub struct DecodeCache<E: DecodeEngine> {
    engine: E,
    model_dir: PathBuf,
    algorithm: Algorithm,
    entries: DashMap<DecodeKey, Slot<E::Trellis>>,
    decodes: AtomicU64,
    hits: AtomicU64,
}

impl<E: DecodeEngine> DecodeCache<E> {
    pub fn new(engine: E, model_dir: impl Into<PathBuf>, algorithm: Algorithm) -> Self {
        Self {
            engine,
            model_dir: model_dir.into(),
            algorithm,
            entries: DashMap::new(),
            decodes: AtomicU64::new(0),
            hits: AtomicU64::new(0),
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Return the stored decode of `subsequence` against `gene`, running the
    /// engine only if no result is stored yet.
    pub fn get_or_compute(
        &self,
        gene: &Arc<Gene>,
        subsequence: &[u8],
    ) -> SearchResult<Arc<DecodeResult<E::Trellis>>> {
        let key = DecodeKey::new(&gene.name, subsequence);
        let slot = self.slot(key);

        let mut stored = slot.lock();
        if let Some(result) = stored.as_ref() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Arc::clone(result));
        }

        self.decodes.fetch_add(1, Ordering::Relaxed);
        log::debug!(
            "Decoding {} against {} bp subsequence with {}",
            gene.name,
            subsequence.len(),
            self.engine.name()
        );
        let request = DecodeRequest {
            model_dir: &self.model_dir,
            algorithm: self.algorithm,
            gene,
            subsequence,
        };
        let decoded = self
            .engine
            .decode(&request)
            .map_err(|e| SearchError::engine(&gene.name, format!("{:#}", e)))?;

        let result = Arc::new(DecodeResult {
            gene: Arc::clone(gene),
            trellis: decoded.trellis,
            path: decoded.path,
            score: decoded.score,
        });

        // The slot lock is held across the decode, so nobody else can have filled it.
        if stored.replace(Arc::clone(&result)).is_some() {
            return Err(SearchError::cache_race(
                &gene.name,
                "slot filled while its decode was in flight",
            ));
        }

        Ok(result)
    }

    /// Look up a stored decode without computing it.
    pub fn get(&self, gene: &Arc<str>, subsequence: &[u8]) -> Option<Arc<DecodeResult<E::Trellis>>> {
        let key = DecodeKey::new(gene, subsequence);
        let slot = self.entries.get(&key).map(|slot| Arc::clone(slot.value()))?;
        let stored = slot.lock();
        stored.as_ref().map(Arc::clone)
    }

    pub fn len(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.value().lock().is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            decodes: self.decodes.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
        }
    }

    fn slot(&self, key: DecodeKey) -> Slot<E::Trellis> {
        if let Some(slot) = self.entries.get(&key) {
            return Arc::clone(slot.value());
        }
        // The shard guard is released before the slot is locked.
        let slot = self.entries.entry(key).or_default();
        Arc::clone(slot.value())
    }
}
