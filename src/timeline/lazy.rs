/// Lazy thumbnail loading
///
/// Only the first few items of a freshly loaded timeline are decoded right
/// away. Everything else waits here until a settled scroll shows it on
/// screen. Removal from the queue and handing the task to the loader happen
/// in the same step, so an item is submitted at most once per load.
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use super::geometry::Rect;
use super::loader::{LoadTask, ThumbnailPurpose};
use super::renderer::{ItemTarget, TargetMapper};
use crate::state::data::MediaKind;

/// An item still waiting for its grid thumbnail
#[derive(Debug, Clone, PartialEq)]
pub struct PendingItem {
    pub path: PathBuf,
    pub kind: MediaKind,
    pub target: ItemTarget,
    pub size: u32,
}

impl PendingItem {
    fn into_task(self) -> LoadTask {
        LoadTask {
            path: self.path,
            size: self.size,
            kind: self.kind,
            generation: self.target.generation,
            target: Some(self.target),
            purpose: ThumbnailPurpose::Grid,
        }
    }
}

#[derive(Debug, Default)]
pub struct LazyLoadQueue {
    /// Keyed by display position (group, index) so scans walk the grid in order
    pending: BTreeMap<(usize, usize), PendingItem>,
    by_path: HashMap<PathBuf, (usize, usize)>,
    scan_cap: usize,
}

impl LazyLoadQueue {
    pub fn new(scan_cap: usize) -> Self {
        Self {
            scan_cap,
            ..Default::default()
        }
    }

    /// Replace the queue with a new load's items, in display order
    ///
    /// The first `eager` items come back as tasks to submit right away;
    /// the rest are queued.
    pub fn seed(&mut self, items: impl IntoIterator<Item = PendingItem>, eager: usize) -> Vec<LoadTask> {
        self.clear();

        let mut tasks = Vec::new();
        for item in items {
            if tasks.len() < eager {
                tasks.push(item.into_task());
            } else {
                self.insert(item);
            }
        }

        log::debug!("Lazy queue seeded: {} eager, {} pending", tasks.len(), self.len());
        tasks
    }

    fn insert(&mut self, item: PendingItem) {
        let key = (item.target.group, item.target.index);
        if let Some(previous) = self.by_path.insert(item.path.clone(), key) {
            self.pending.remove(&previous);
        }
        self.pending.insert(key, item);
    }

    /// Items intersecting `visible`, removed from the queue
    ///
    /// At most `scan_cap` pending items are examined, starting at display
    /// position `start`. An item whose rectangle cannot be mapped is skipped
    /// and stays queued.
    pub fn on_scroll_settled(
        &mut self,
        visible: &Rect,
        mapper: &impl TargetMapper,
        start: (usize, usize),
    ) -> Vec<LoadTask> {
        let mut hits = Vec::new();
        let mut skipped = 0;

        for (key, item) in self.pending.range(start..).take(self.scan_cap) {
            match mapper.map_target(&item.target) {
                Ok(rect) if rect.intersects(visible) => hits.push(*key),
                Ok(_) => {}
                Err(e) => {
                    skipped += 1;
                    log::trace!("Skipping {}: {}", item.path.display(), e);
                }
            }
        }

        if skipped > 0 {
            log::debug!("{} pending items could not be mapped", skipped);
        }

        hits.into_iter()
            .filter_map(|key| self.pending.remove(&key))
            .map(|item| {
                self.by_path.remove(&item.path);
                item.into_task()
            })
            .collect()
    }

    #[cfg(test)]
    pub fn contains(&self, path: &std::path::Path) -> bool {
        self.by_path.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.by_path.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Result, TimelineError};
    use std::path::Path;

    /// One column of 100px cells; group 1 "lost its widget"
    struct ColumnMapper;

    impl TargetMapper for ColumnMapper {
        fn map_target(&self, target: &ItemTarget) -> Result<Rect> {
            if target.group == 1 {
                return Err(TimelineError::ViewportMapping("widget destroyed".into()));
            }
            Ok(Rect::new(0.0, target.index as f32 * 100.0, 100.0, 100.0))
        }
    }

    fn items(group: usize, count: usize) -> Vec<PendingItem> {
        (0..count)
            .map(|index| PendingItem {
                path: PathBuf::from(format!("/g{group}/{index}.jpg")),
                kind: MediaKind::Photo,
                target: ItemTarget {
                    generation: 1,
                    group,
                    index,
                },
                size: 200,
            })
            .collect()
    }

    #[test]
    fn test_seed_splits_eager_and_pending() {
        let mut queue = LazyLoadQueue::new(200);
        let eager = queue.seed(items(0, 120), 50);

        assert_eq!(eager.len(), 50);
        assert_eq!(queue.len(), 70);
        assert_eq!(eager[49].path, PathBuf::from("/g0/49.jpg"));
        assert!(queue.contains(Path::new("/g0/50.jpg")));
        assert!(!queue.contains(Path::new("/g0/49.jpg")));
    }

    #[test]
    fn test_visible_items_submitted_once() {
        let mut queue = LazyLoadQueue::new(200);
        queue.seed(items(0, 100), 0);
        let visible = Rect::new(0.0, 1000.0, 800.0, 500.0);

        let first = queue.on_scroll_settled(&visible, &ColumnMapper, (0, 0));
        let paths: Vec<_> = first.iter().map(|t| t.path.clone()).collect();
        assert_eq!(paths.len(), 5);
        assert_eq!(paths[0], PathBuf::from("/g0/10.jpg"));
        assert!(first.iter().all(|t| t.purpose == ThumbnailPurpose::Grid));

        let second = queue.on_scroll_settled(&visible, &ColumnMapper, (0, 0));
        assert!(second.is_empty());
        assert_eq!(queue.len(), 95);
    }

    #[test]
    fn test_scan_cap_bounds_work_per_tick() {
        let mut queue = LazyLoadQueue::new(20);
        queue.seed(items(0, 100), 0);
        // items 30..35 are visible but lie beyond the first 20 pending entries
        let visible = Rect::new(0.0, 3000.0, 800.0, 500.0);

        assert!(queue.on_scroll_settled(&visible, &ColumnMapper, (0, 0)).is_empty());
        assert_eq!(queue.on_scroll_settled(&visible, &ColumnMapper, (0, 25)).len(), 5);
    }

    #[test]
    fn test_unmappable_item_is_skipped_not_fatal() {
        let mut queue = LazyLoadQueue::new(200);
        let mut all = items(0, 3);
        all.extend(items(1, 3));
        all.extend(items(2, 3));
        queue.seed(all, 0);

        let visible = Rect::new(0.0, 0.0, 800.0, 1000.0);
        let tasks = queue.on_scroll_settled(&visible, &ColumnMapper, (0, 0));

        assert_eq!(tasks.len(), 6);
        assert!(tasks.iter().all(|t| t.target.unwrap().group != 1));
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn test_repeated_path_keeps_only_its_last_cell() {
        let mut moved = items(0, 5);
        for item in &mut moved {
            item.target.group = 2;
        }
        let mut queue = LazyLoadQueue::new(200);
        queue.seed(items(0, 5).into_iter().chain(moved), 0);

        assert_eq!(queue.len(), 5);
        assert!(queue.contains(Path::new("/g0/3.jpg")));
        assert!(queue.pending.keys().all(|&(group, _)| group == 2));
    }
}
