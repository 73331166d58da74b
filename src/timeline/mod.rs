/// The virtualized photo timeline
///
/// This module handles:
/// - Grouping records by capture day and laying the groups out (groups.rs, renderer.rs)
/// - Thumbnail caching and background decoding (cache.rs, loader.rs)
/// - Deferring off-screen thumbnails until a scroll settles (lazy.rs, debounce.rs)
/// - Tying it all together for the view (controller.rs)

pub mod cache;
pub mod controller;
pub mod debounce;
pub mod geometry;
pub mod groups;
pub mod lazy;
pub mod loader;
pub mod renderer;

pub use cache::Thumbnail;
pub use controller::{MediaSource, TimelineController, TimelineStatus};
pub use geometry::ScrollEvent;
pub use loader::ThumbnailPurpose;
