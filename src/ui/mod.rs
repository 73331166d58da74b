/// User interface components
///
/// - The virtualized timeline grid (timeline_view.rs)
/// - The full-size preview overlay (lightbox.rs)

pub mod lightbox;
pub mod timeline_view;
