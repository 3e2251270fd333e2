/// Per-object cache of extracted geometry.
///
/// Extraction is expensive, so each geometry source is extracted at most once
/// until its entry is evicted (data change, prototype de-realization, source
/// removal). An extraction that yields no polygons is an explicit empty result,
/// never an error.

use std::sync::Arc;
use rustc_hash::FxHashMap;
use crate::keys::ObjectKey;
use crate::source::GeometryExtractor;
use super::extracted_geometry::ExtractedGeometry;

/// Hit/miss counters, reported by the frame driver
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeometryCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Cache of extracted geometry keyed by geometry source
pub struct GeometryCache {
    /// `None` values are remembered empty extractions
    entries: FxHashMap<ObjectKey, Option<Arc<ExtractedGeometry>>>,
    /// Whether empty extractions are remembered
    cache_empty: bool,
    stats: GeometryCacheStats,
}

impl GeometryCache {
    /// Create an empty cache
    ///
    /// # Arguments
    ///
    /// * `cache_empty` - remember empty extractions so zero-polygon objects
    ///   are not re-extracted on every request
    pub fn new(cache_empty: bool) -> Self {
        Self {
            entries: FxHashMap::default(),
            cache_empty,
            stats: GeometryCacheStats::default(),
        }
    }

    /// Return the cached geometry of `key`, extracting it on a miss.
    ///
    /// Returns None when the object has no geometry.
    pub fn get_or_extract<E: GeometryExtractor + ?Sized>(
        &mut self,
        key: ObjectKey,
        extractor: &E,
    ) -> Option<Arc<ExtractedGeometry>> {
        if let Some(entry) = self.entries.get(&key) {
            self.stats.hits += 1;
            return entry.clone();
        }

        self.stats.misses += 1;
        let extracted = extractor
            .extract(key)
            .filter(|geometry| !geometry.is_empty())
            .map(Arc::new);

        match &extracted {
            Some(geometry) => {
                crate::engine_trace!("galaxy3d::GeometryCache",
                    "Extracted {:?} ('{}', {} faces)", key, geometry.name(), geometry.face_count());
                self.entries.insert(key, extracted.clone());
            }
            None => {
                crate::engine_debug!("galaxy3d::GeometryCache", "{:?} has no geometry", key);
                if self.cache_empty {
                    self.entries.insert(key, None);
                }
            }
        }
        extracted
    }

    /// Drop the entry of `key`. Returns true if something was cached.
    pub fn evict(&mut self, key: ObjectKey) -> bool {
        let evicted = self.entries.remove(&key).is_some();
        if evicted {
            self.stats.evictions += 1;
        }
        evicted
    }

    /// Whether `key` has an entry (including a remembered empty result)
    pub fn contains(&self, key: ObjectKey) -> bool {
        self.entries.contains_key(&key)
    }

    /// Whether `key` is remembered as having no geometry
    pub fn is_known_empty(&self, key: ObjectKey) -> bool {
        matches!(self.entries.get(&key), Some(None))
    }

    /// Number of entries (including remembered empty results)
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> GeometryCacheStats {
        self.stats
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.stats.evictions += self.entries.len() as u64;
        self.entries.clear();
    }
}

#[cfg(test)]
#[path = "geometry_cache_tests.rs"]
mod tests;
