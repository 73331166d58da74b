/// Virtualized date-group layout
///
/// Building a grid cell for every item of a large library up front stalls
/// the UI, so only the first few groups are rendered on load. Every other
/// group is a placeholder whose height is estimated from its member count,
/// which keeps the scrollbar geometry right. Placeholders that scroll into
/// view are swapped for real grids in place; nothing is ever un-rendered.
use crate::config::TimelineConfig;
use crate::error::{Result, TimelineError};

use super::geometry::Rect;
use super::groups::{DateGroup, RenderState};

/// Grid measurements shared by the estimator and the real layout
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridMetrics {
    pub thumb_size: f32,
    pub spacing: f32,
    pub margins: f32,
    pub header_height: f32,
    pub min_columns: usize,
    pub max_columns: usize,
}

impl GridMetrics {
    pub fn from_config(config: &TimelineConfig, thumb_size: u32) -> Self {
        Self {
            thumb_size: thumb_size as f32,
            spacing: config.spacing,
            margins: config.margins,
            header_height: config.header_height,
            min_columns: config.min_columns,
            max_columns: config.max_columns,
        }
    }

    /// Distance from one row (or column) to the next
    pub fn stride(&self) -> f32 {
        self.thumb_size + self.spacing
    }

    /// `clamp(min, max, floor((width - margins) / (thumb + spacing)))`
    pub fn columns(&self, viewport_width: f32) -> usize {
        let usable = (viewport_width - self.margins).max(0.0);
        let fit = (usable / self.stride()).floor() as usize;
        fit.clamp(self.min_columns, self.max_columns)
    }

    pub fn rows(&self, count: usize, columns: usize) -> usize {
        count.div_ceil(columns.max(1))
    }

    /// Height reserved by a placeholder
    pub fn estimated_height(&self, count: usize, columns: usize) -> f32 {
        let rows = self.rows(count, columns) as f32;
        self.header_height + rows * self.stride() + self.margins
    }

    /// Height of a rendered group: rows are separated by `spacing` with no
    /// trailing gap, so this is at most one spacing below the estimate
    pub fn rendered_height(&self, count: usize, columns: usize) -> f32 {
        let rows = self.rows(count, columns);
        let gaps = rows.saturating_sub(1) as f32;
        self.header_height + rows as f32 * self.thumb_size + gaps * self.spacing + self.margins
    }

    /// Rectangle of the `index`-th member of a group whose top is at `group_top`
    pub fn item_rect(&self, group_top: f32, index: usize, columns: usize) -> Rect {
        let columns = columns.max(1);
        let (row, column) = (index / columns, index % columns);
        Rect::new(
            self.margins / 2.0 + column as f32 * self.stride(),
            group_top + self.header_height + self.margins / 2.0 + row as f32 * self.stride(),
            self.thumb_size,
            self.thumb_size,
        )
    }
}

/// Handle to one grid cell, valid for a single load generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ItemTarget {
    pub generation: u64,
    pub group: usize,
    pub index: usize,
}

/// Resolves grid cells to content-space rectangles
pub trait TargetMapper {
    fn map_target(&self, target: &ItemTarget) -> Result<Rect>;
}

#[derive(Debug, Clone)]
pub struct GroupSlot {
    pub group: DateGroup,
    /// Top edge in content coordinates
    pub offset: f32,
    pub height: f32,
}

impl GroupSlot {
    pub fn rect(&self, width: f32) -> Rect {
        Rect::new(0.0, self.offset, width, self.height)
    }
}

#[derive(Debug)]
pub struct VirtualGroupRenderer {
    metrics: GridMetrics,
    viewport_width: f32,
    columns: usize,
    eager_groups: usize,
    overscan: f32,
    generation: u64,
    slots: Vec<GroupSlot>,
    content_height: f32,
}

impl VirtualGroupRenderer {
    pub fn new(metrics: GridMetrics, viewport_width: f32, eager_groups: usize, overscan: f32) -> Self {
        Self {
            metrics,
            viewport_width,
            columns: metrics.columns(viewport_width),
            eager_groups,
            overscan,
            generation: 0,
            slots: Vec::new(),
            content_height: 0.0,
        }
    }

    /// Lay out a fresh set of groups; the first `eager_groups` are rendered
    pub fn build(&mut self, groups: Vec<DateGroup>, generation: u64) {
        self.generation = generation;
        self.slots = groups
            .into_iter()
            .enumerate()
            .map(|(i, mut group)| {
                group.render_state = if i < self.eager_groups {
                    RenderState::Rendered
                } else {
                    RenderState::Placeholder
                };
                GroupSlot {
                    group,
                    offset: 0.0,
                    height: 0.0,
                }
            })
            .collect();
        self.relayout();

        log::debug!(
            "Built {} groups ({} rendered), content height {:.0}px",
            self.slots.len(),
            self.rendered_count(),
            self.content_height
        );
    }

    /// Recompute every group's height and offset from the current columns
    fn relayout(&mut self) {
        let mut offset = 0.0;
        for slot in &mut self.slots {
            let count = slot.group.len();
            slot.offset = offset;
            slot.height = match slot.group.render_state {
                RenderState::Rendered => self.metrics.rendered_height(count, self.columns),
                RenderState::Placeholder => self.metrics.estimated_height(count, self.columns),
            };
            offset += slot.height;
        }
        self.content_height = offset;
    }

    /// Materialize every placeholder near `viewport`
    ///
    /// Returns the indices of the groups that were swapped in. A second call
    /// with the same viewport returns nothing.
    pub fn on_scroll_settled(&mut self, viewport: &Rect) -> Vec<usize> {
        let near = viewport.expand_y(self.overscan);
        let width = self.viewport_width;

        let materialized: Vec<usize> = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| !slot.group.is_rendered() && slot.rect(width).intersects(&near))
            .map(|(i, _)| i)
            .collect();

        if materialized.is_empty() {
            return materialized;
        }

        for &i in &materialized {
            self.slots[i].group.render_state = RenderState::Rendered;
        }
        self.relayout();

        log::debug!("Materialized groups {:?}", materialized);
        materialized
    }

    /// Window resize; returns whether the column count changed
    pub fn set_viewport_width(&mut self, width: f32) -> bool {
        self.viewport_width = width;
        let columns = self.metrics.columns(width);
        if columns == self.columns {
            return false;
        }
        log::debug!("Columns {} -> {} at width {:.0}", self.columns, columns, width);
        self.columns = columns;
        self.relayout();
        true
    }

    /// Zoom change
    pub fn set_metrics(&mut self, metrics: GridMetrics) {
        self.metrics = metrics;
        self.columns = metrics.columns(self.viewport_width);
        self.relayout();
    }

    /// First cell that can be visible in `viewport`, as (group, member index)
    pub fn first_visible(&self, viewport: &Rect) -> (usize, usize) {
        let group = self
            .slots
            .partition_point(|slot| slot.offset + slot.height <= viewport.y);

        let Some(slot) = self.slots.get(group) else {
            return (group, 0);
        };
        if !slot.group.is_rendered() {
            return (group, 0);
        }

        let grid_top = slot.offset + self.metrics.header_height + self.metrics.margins / 2.0;
        let row = ((viewport.y - grid_top) / self.metrics.stride()).floor().max(0.0) as usize;
        (group, row * self.columns)
    }

    pub fn is_alive(&self, target: &ItemTarget) -> bool {
        target.generation == self.generation
            && self
                .slots
                .get(target.group)
                .is_some_and(|slot| target.index < slot.group.len())
    }

    pub fn slots(&self) -> &[GroupSlot] {
        &self.slots
    }

    pub fn metrics(&self) -> &GridMetrics {
        &self.metrics
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn content_height(&self) -> f32 {
        self.content_height
    }

    pub fn rendered_count(&self) -> usize {
        self.slots.iter().filter(|s| s.group.is_rendered()).count()
    }
}

impl TargetMapper for VirtualGroupRenderer {
    fn map_target(&self, target: &ItemTarget) -> Result<Rect> {
        if target.generation != self.generation {
            return Err(TimelineError::ViewportMapping(format!(
                "target from load {} outlived its timeline (now {})",
                target.generation, self.generation
            )));
        }
        let slot = self.slots.get(target.group).ok_or_else(|| {
            TimelineError::ViewportMapping(format!("group {} no longer exists", target.group))
        })?;
        if target.index >= slot.group.len() {
            return Err(TimelineError::ViewportMapping(format!(
                "item {} out of range in group {}",
                target.index, target.group
            )));
        }
        if !slot.group.is_rendered() {
            return Err(TimelineError::ViewportMapping(format!(
                "group {} is still a placeholder",
                target.group
            )));
        }
        Ok(self.metrics.item_rect(slot.offset, target.index, self.columns))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn metrics() -> GridMetrics {
        GridMetrics {
            thumb_size: 200.0,
            spacing: 2.0,
            margins: 40.0,
            header_height: 40.0,
            min_columns: 2,
            max_columns: 8,
        }
    }

    fn groups(sizes: &[usize]) -> Vec<DateGroup> {
        let mut next = 0;
        sizes
            .iter()
            .enumerate()
            .map(|(i, &size)| {
                let members = (next..next + size).collect();
                next += size;
                DateGroup {
                    date: NaiveDate::from_ymd_opt(2024, 1, 28).unwrap() - chrono::Days::new(i as u64),
                    members,
                    render_state: RenderState::Placeholder,
                }
            })
            .collect()
    }

    #[test]
    fn test_columns_follow_viewport_width() {
        let m = metrics();
        assert_eq!(m.columns(1200.0), 5);
        assert_eq!(m.columns(600.0), 2);
        assert_eq!(m.columns(100.0), 2);
        assert_eq!(m.columns(5000.0), 8);
    }

    #[test]
    fn test_placeholder_estimate() {
        let m = metrics();
        // 12 items in 5 columns = 3 rows
        assert_eq!(m.estimated_height(12, 5), 40.0 + 3.0 * 202.0 + 40.0);
    }

    #[test]
    fn test_resize_recomputes_placeholder_heights() {
        let mut renderer = VirtualGroupRenderer::new(metrics(), 1200.0, 1, 0.0);
        renderer.build(groups(&[10, 10, 7]), 1);
        assert_eq!(renderer.columns(), 5);
        assert_eq!(renderer.slots()[1].height, 40.0 + 2.0 * 202.0 + 40.0);

        assert!(renderer.set_viewport_width(600.0));

        assert_eq!(renderer.columns(), 2);
        assert_eq!(renderer.slots()[1].height, 40.0 + 5.0 * 202.0 + 40.0);
        assert_eq!(renderer.slots()[2].height, 40.0 + 4.0 * 202.0 + 40.0);
        let total: f32 = renderer.slots().iter().map(|s| s.height).sum();
        assert_eq!(renderer.content_height(), total);
    }

    #[test]
    fn test_materializing_keeps_content_height_within_one_row() {
        let mut renderer = VirtualGroupRenderer::new(metrics(), 1200.0, 0, 0.0);
        renderer.build(groups(&[1, 4, 5, 6, 11, 23, 40]), 1);
        let before = renderer.content_height();

        let all = Rect::new(0.0, 0.0, 1200.0, before);
        let materialized = renderer.on_scroll_settled(&all);
        assert_eq!(materialized.len(), 7);

        for slot in renderer.slots() {
            let estimate = metrics().estimated_height(slot.group.len(), 5);
            assert!((estimate - slot.height).abs() <= metrics().stride());
        }
        // each group shrinks by exactly one trailing spacing
        assert_eq!(before - renderer.content_height(), 7.0 * 2.0);
    }

    #[test]
    fn test_only_visible_placeholders_materialize_once() {
        let mut renderer = VirtualGroupRenderer::new(metrics(), 1200.0, 1, 0.0);
        renderer.build(groups(&[10, 10, 10, 10]), 1);
        // each 10-item group is 2 rows: 40 + 404 + 40 = 484 (placeholder)
        let second = renderer.slots()[1].offset;
        let viewport = Rect::new(0.0, second + 10.0, 1200.0, 300.0);

        assert_eq!(renderer.on_scroll_settled(&viewport), vec![1]);
        assert!(renderer.on_scroll_settled(&viewport).is_empty());
        assert_eq!(renderer.rendered_count(), 2);
        assert!(!renderer.slots()[2].group.is_rendered());
    }

    #[test]
    fn test_overscan_reaches_neighbouring_group() {
        let mut renderer = VirtualGroupRenderer::new(metrics(), 1200.0, 0, 300.0);
        renderer.build(groups(&[10, 10]), 1);
        let viewport = Rect::new(0.0, 0.0, 1200.0, 300.0);

        assert_eq!(renderer.on_scroll_settled(&viewport), vec![0, 1]);
    }

    #[test]
    fn test_map_target_failures() {
        let mut renderer = VirtualGroupRenderer::new(metrics(), 1200.0, 1, 0.0);
        renderer.build(groups(&[3, 3]), 7);

        let ok = ItemTarget { generation: 7, group: 0, index: 2 };
        let rect = renderer.map_target(&ok).unwrap();
        assert_eq!(rect, Rect::new(20.0 + 2.0 * 202.0, 60.0, 200.0, 200.0));

        let stale = ItemTarget { generation: 6, ..ok };
        let placeholder = ItemTarget { generation: 7, group: 1, index: 0 };
        let missing = ItemTarget { generation: 7, group: 9, index: 0 };
        assert!(renderer.map_target(&stale).is_err());
        assert!(renderer.map_target(&placeholder).is_err());
        assert!(renderer.map_target(&missing).is_err());
        assert!(renderer.is_alive(&placeholder));
        assert!(!renderer.is_alive(&stale));
    }

    #[test]
    fn test_first_visible() {
        let mut renderer = VirtualGroupRenderer::new(metrics(), 1200.0, 2, 0.0);
        renderer.build(groups(&[20, 20, 20]), 1);
        // group 0 is rendered: 4 rows, grid starts at 60
        let viewport = Rect::new(0.0, 60.0 + 2.0 * 202.0 + 5.0, 1200.0, 100.0);
        assert_eq!(renderer.first_visible(&viewport), (0, 10));

        let below = Rect::new(0.0, renderer.slots()[2].offset + 1.0, 1200.0, 100.0);
        assert_eq!(renderer.first_visible(&below), (2, 0));
    }
}
