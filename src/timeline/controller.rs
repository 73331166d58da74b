/// Timeline controller
///
/// Owns everything one timeline needs: the loaded records, the group layout,
/// both thumbnail caches, the lazy queue, the decode pool and the single
/// debounce timer shared by every scroll notification. All of it is mutated
/// from the UI thread only; the decode workers talk back through the
/// loader's completion channel, which is drained on `tick`.
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use super::cache::{Thumbnail, ThumbnailCache};
use super::debounce::Debouncer;
use super::geometry::ScrollEvent;
use super::groups::group_by_day;
use super::lazy::{LazyLoadQueue, PendingItem};
use super::loader::{AsyncThumbnailLoader, Completion, LoadTask, ThumbnailPurpose};
use super::renderer::{GridMetrics, ItemTarget, VirtualGroupRenderer};
use crate::config::TimelineConfig;
use crate::error::Result;
use crate::media::MediaDecoder;
use crate::state::data::{MediaFilter, MediaRecord};
use crate::state::session::TimelineSessionState;

/// Where the timeline gets its records from
pub trait MediaSource {
    /// Records matching `filter`, newest first
    fn query(&self, filter: &MediaFilter) -> Result<Vec<MediaRecord>>;
}

/// A thumbnail that just became available to paint
#[derive(Debug, Clone)]
pub struct ThumbnailReady {
    pub path: PathBuf,
    pub size: u32,
    pub thumbnail: Thumbnail,
    pub purpose: ThumbnailPurpose,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TimelineStatus {
    /// Nothing loaded yet
    Idle,
    Ready,
    /// Shown instead of the grid: no matches, or the catalog could not be read
    Empty(String),
}

pub struct TimelineController {
    config: TimelineConfig,
    session: TimelineSessionState,
    /// Display order: newest day first, catalog order within a day
    records: Vec<MediaRecord>,
    renderer: VirtualGroupRenderer,
    lazy: LazyLoadQueue,
    loader: AsyncThumbnailLoader,
    grid_cache: ThumbnailCache,
    preview_cache: ThumbnailCache,
    /// Previews submitted and not back yet
    preview_requests: HashSet<PathBuf>,
    debouncer: Debouncer,
    viewport: ScrollEvent,
    status: TimelineStatus,
}

impl TimelineController {
    pub fn new(config: TimelineConfig, decoder: Arc<dyn MediaDecoder>) -> Result<Self> {
        let config = config.validate()?;
        let loader = AsyncThumbnailLoader::new(
            decoder,
            config.workers,
            config.photo_failure_placeholder,
            config.shutdown_timeout(),
        )?;

        let viewport = ScrollEvent {
            offset_y: 0.0,
            viewport_width: 1200.0,
            viewport_height: 800.0,
        };
        let metrics = GridMetrics::from_config(&config, config.thumb_size);

        Ok(Self {
            session: TimelineSessionState::new(config.thumb_size),
            records: Vec::new(),
            renderer: VirtualGroupRenderer::new(
                metrics,
                viewport.viewport_width,
                config.eager_groups,
                config.overscan,
            ),
            lazy: LazyLoadQueue::new(config.scan_cap),
            loader,
            grid_cache: ThumbnailCache::unbounded("grid"),
            preview_cache: ThumbnailCache::bounded("preview", config.preview_cache_capacity),
            preview_requests: HashSet::new(),
            debouncer: Debouncer::new(config.debounce()),
            viewport,
            status: TimelineStatus::Idle,
            config,
        })
    }

    /// Replace the timeline with the records matching `filter`
    ///
    /// Any work still running for the previous timeline is orphaned: its
    /// results carry the old generation and are dropped on arrival.
    pub fn load(&mut self, source: &dyn MediaSource, filter: MediaFilter) {
        let generation = self.session.next_generation();
        self.session.filter = filter;

        self.debouncer.cancel();
        self.lazy.clear();
        self.grid_cache.clear();
        self.preview_cache.clear();
        self.preview_requests.clear();

        let mut records = match source.query(&self.session.filter) {
            Ok(records) => records,
            Err(e) => {
                log::error!("Timeline load failed: {}", e);
                self.records.clear();
                self.renderer.build(Vec::new(), generation);
                self.status = TimelineStatus::Empty(format!("Could not read the library: {e}"));
                return;
            }
        };

        // Stable, so catalog order survives within a day and the grid
        // reads in the same order as `records`
        records.sort_by(|a, b| b.day().cmp(&a.day()));
        let groups = group_by_day(&records);
        self.records = records;
        self.renderer.build(groups, generation);

        let size = self.session.thumb_size;
        let items = self.pending_items(generation, size, |_| true);
        let eager = self.lazy.seed(items, self.config.initial_load_limit);
        self.submit_all(eager);

        self.status = if self.records.is_empty() {
            TimelineStatus::Empty("No photos or videos to show".to_string())
        } else {
            TimelineStatus::Ready
        };

        log::info!(
            "Loaded {} items in {} groups, {:.0}px tall (generation {})",
            self.records.len(),
            self.renderer.slots().len(),
            self.renderer.content_height(),
            generation
        );
    }

    /// Every grid cell of the current layout accepted by `keep`, in display order
    fn pending_items(
        &self,
        generation: u64,
        size: u32,
        keep: impl Fn(&MediaRecord) -> bool,
    ) -> Vec<PendingItem> {
        let mut items = Vec::new();
        for (group, slot) in self.renderer.slots().iter().enumerate() {
            for (index, &member) in slot.group.members.iter().enumerate() {
                let record = &self.records[member];
                if !keep(record) {
                    continue;
                }
                items.push(PendingItem {
                    path: record.path.clone(),
                    kind: record.kind,
                    target: ItemTarget {
                        generation,
                        group,
                        index,
                    },
                    size,
                });
            }
        }
        items
    }

    /// Scroll or resize notification from the view
    ///
    /// Width changes relayout right away so placeholder heights track the
    /// window; everything else waits for the scroll to settle.
    pub fn on_viewport_scrolled(&mut self, event: ScrollEvent, now: Instant) {
        if event.viewport_width != self.viewport.viewport_width {
            self.renderer.set_viewport_width(event.viewport_width);
        }
        self.viewport = event;
        self.debouncer.poke(now);
    }

    /// Advance timers and collect finished thumbnails
    pub fn tick(&mut self, now: Instant) -> Vec<ThumbnailReady> {
        if self.debouncer.poll(now) {
            self.settle();
        }

        let completions = self.loader.drain();
        completions
            .into_iter()
            .filter_map(|completion| self.accept(completion))
            .collect()
    }

    /// Materialize visible groups, then queue their visible items
    fn settle(&mut self) {
        let visible = self.viewport.visible_rect();
        self.renderer.on_scroll_settled(&visible);

        let start = self.renderer.first_visible(&visible);
        let tasks = self.lazy.on_scroll_settled(&visible, &self.renderer, start);
        if !tasks.is_empty() {
            log::debug!("Scroll settled: {} thumbnails requested", tasks.len());
        }
        self.submit_all(tasks);
    }

    fn submit_all(&self, tasks: Vec<LoadTask>) {
        for task in tasks {
            let path = task.path.clone();
            if let Err(e) = self.loader.submit(task) {
                log::warn!("Not loading {}: {}", path.display(), e);
            }
        }
    }

    /// Store a completion and turn it into a paint event, unless it is stale
    fn accept(&mut self, completion: Completion) -> Option<ThumbnailReady> {
        let Completion { task, thumbnail } = completion;

        if task.generation != self.session.generation() {
            log::trace!("Dropping {} from load {}", task.path.display(), task.generation);
            return None;
        }

        if task.purpose == ThumbnailPurpose::Preview {
            // Finished either way; a failed preview may be asked for again
            self.preview_requests.remove(&task.path);
        }
        let thumbnail = thumbnail?;

        match task.purpose {
            ThumbnailPurpose::Grid => {
                if let Some(target) = task.target {
                    if !self.renderer.is_alive(&target) {
                        log::trace!("Dropping {}: grid cell is gone", task.path.display());
                        return None;
                    }
                }
                self.grid_cache.put(&task.path, task.size, thumbnail.clone());
                // Results for an earlier zoom level stay cached but are not painted
                if task.size != self.session.thumb_size {
                    return None;
                }
            }
            ThumbnailPurpose::Preview => {
                self.preview_cache.put(&task.path, task.size, thumbnail.clone());
            }
        }

        Some(ThumbnailReady {
            path: task.path,
            size: task.size,
            thumbnail,
            purpose: task.purpose,
        })
    }

    /// Lightbox preview for the record at `index` in display order
    ///
    /// Returns the preview when it is already cached. The record and its
    /// neighbours are requested in the background when missing.
    pub fn open_preview(&mut self, index: usize) -> Option<Thumbnail> {
        let record = self.records.get(index)?;
        let size = self.config.preview_size;
        let path = record.path.clone();

        let radius = self.config.preview_neighbors;
        let first = index.saturating_sub(radius);
        let last = (index + radius).min(self.records.len() - 1);

        // the opened record goes first so it reaches a worker first
        let order = std::iter::once(index).chain((first..=last).filter(|&i| i != index));
        let mut tasks = Vec::new();
        for i in order {
            let record = &self.records[i];
            if self.preview_cache.contains(&record.path, size)
                || self.preview_requests.contains(&record.path)
            {
                continue;
            }
            self.preview_requests.insert(record.path.clone());
            tasks.push(LoadTask {
                path: record.path.clone(),
                size,
                kind: record.kind,
                generation: self.session.generation(),
                target: None,
                purpose: ThumbnailPurpose::Preview,
            });
        }
        self.submit_all(tasks);

        self.preview_cache.get(&path, size)
    }

    /// Change the grid thumbnail size
    ///
    /// The layout is recomputed and every item without a thumbnail at the
    /// new size goes back into the lazy queue; the visible ones are
    /// requested immediately.
    pub fn set_zoom(&mut self, thumb_size: u32) {
        if thumb_size == 0 || thumb_size == self.session.thumb_size {
            return;
        }
        log::debug!("Zoom {} -> {}", self.session.thumb_size, thumb_size);

        self.session.thumb_size = thumb_size;
        self.renderer
            .set_metrics(GridMetrics::from_config(&self.config, thumb_size));

        let generation = self.session.generation();
        let items = self.pending_items(generation, thumb_size, |record| {
            !self.grid_cache.contains(&record.path, thumb_size)
        });
        self.lazy.seed(items, 0);
        self.debouncer.cancel();
        self.settle();
    }

    /// Returns whether `path` is selected afterwards
    pub fn toggle_selected(&mut self, path: &Path) -> bool {
        self.session.toggle_selected(path)
    }

    pub fn is_selected(&self, path: &Path) -> bool {
        self.session.is_selected(path)
    }

    pub fn clear_selection(&mut self) {
        self.session.clear_selection();
    }

    /// Stop the decode pool and forget every thumbnail
    ///
    /// Jobs that outlive the shutdown timeout still finish, but their
    /// results belong to a dead generation and are ignored.
    pub fn teardown(&mut self) {
        self.loader.shutdown(self.config.shutdown_timeout());
        self.loader.drain();
        let generation = self.session.next_generation();
        log::debug!(
            "Teardown: dropping {} grid and {} preview thumbnails",
            self.grid_cache.len(),
            self.preview_cache.len()
        );

        self.debouncer.cancel();
        self.lazy.clear();
        self.grid_cache.clear();
        self.preview_cache.clear();
        self.preview_requests.clear();
        self.records.clear();
        self.renderer.build(Vec::new(), generation);
        self.status = TimelineStatus::Idle;
    }

    /// Whether `tick` still has something to do
    ///
    /// Workers send before they stop counting as in flight, so checking the
    /// counter first cannot miss a result.
    pub fn needs_tick(&self) -> bool {
        self.debouncer.is_armed() || self.loader.in_flight() > 0 || self.loader.has_completions()
    }

    /// Whether the lightbox preview of `path` is still cached
    pub fn has_preview(&self, path: &Path) -> bool {
        self.preview_cache.contains(path, self.config.preview_size)
    }

    /// Whether a preview of `path` has been requested and not finished yet
    pub fn is_preview_pending(&self, path: &Path) -> bool {
        self.preview_requests.contains(path)
    }

    pub fn records(&self) -> &[MediaRecord] {
        &self.records
    }

    pub fn renderer(&self) -> &VirtualGroupRenderer {
        &self.renderer
    }

    pub fn session(&self) -> &TimelineSessionState {
        &self.session
    }

    pub fn status(&self) -> &TimelineStatus {
        &self.status
    }

    #[cfg(test)]
    pub fn pending_len(&self) -> usize {
        self.lazy.len()
    }
}
