/// In-memory thumbnail storage
///
/// Two instances live in the controller with different policies: the grid
/// cache is unbounded and only cleared on reload, the lightbox preview cache
/// keeps the few most recently used full-size previews.
use image::RgbaImage;
use lru::LruCache;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A decoded preview ready to paint
#[derive(Debug, Clone)]
pub struct Thumbnail {
    pub image: Arc<RgbaImage>,
    /// Generated glyph standing in for media that could not be decoded
    pub placeholder: bool,
}

/// LRU map from (path, size) to thumbnail
///
/// The map itself never evicts; the capacity, when there is one, is
/// enforced in `evict_if_over` so every eviction goes through one place.
pub struct ThumbnailCache {
    name: &'static str,
    entries: LruCache<(PathBuf, u32), Thumbnail>,
    capacity: Option<usize>,
}

impl ThumbnailCache {
    /// Cache that never evicts
    pub fn unbounded(name: &'static str) -> Self {
        Self {
            name,
            entries: LruCache::unbounded(),
            capacity: None,
        }
    }

    /// Cache that keeps at most `capacity` entries
    pub fn bounded(name: &'static str, capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::unbounded(name)
        }
    }

    /// Look up a thumbnail, marking it as recently used
    pub fn get(&mut self, path: &Path, size: u32) -> Option<Thumbnail> {
        self.entries.get(&(path.to_path_buf(), size)).cloned()
    }

    /// Lookup that leaves recency alone
    pub fn contains(&self, path: &Path, size: u32) -> bool {
        self.entries.contains(&(path.to_path_buf(), size))
    }

    /// Insert or replace, then evict down to capacity
    pub fn put(&mut self, path: &Path, size: u32, thumbnail: Thumbnail) {
        self.entries.put((path.to_path_buf(), size), thumbnail);
        if let Some(capacity) = self.capacity {
            self.evict_if_over(capacity);
        }
    }

    /// Remove least recently used entries until at most `capacity` remain
    pub fn evict_if_over(&mut self, capacity: usize) {
        while self.entries.len() > capacity {
            let Some(((path, size), _)) = self.entries.pop_lru() else {
                break;
            };
            log::debug!("{} cache: evicting {} @{}", self.name, path.display(), size);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
