/// Per-timeline session state
///
/// Everything the user changes while looking at one timeline: the active
/// filter, the selection and the zoom level. Owned by the controller and
/// lent to the components that need it for the duration of one call.
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use super::data::MediaFilter;

#[derive(Debug, Clone)]
pub struct TimelineSessionState {
    pub filter: MediaFilter,
    selection: HashSet<PathBuf>,
    /// Grid thumbnail edge in pixels
    pub thumb_size: u32,
    /// Bumped on every full reload; results tagged with an older generation
    /// belong to a torn-down timeline
    generation: u64,
}

impl TimelineSessionState {
    pub fn new(thumb_size: u32) -> Self {
        Self {
            filter: MediaFilter::default(),
            selection: HashSet::new(),
            thumb_size,
            generation: 0,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Start a new load session. The selection does not survive a reload
    pub fn next_generation(&mut self) -> u64 {
        self.generation += 1;
        self.selection.clear();
        self.generation
    }

    /// Returns whether `path` is selected afterwards
    pub fn toggle_selected(&mut self, path: &Path) -> bool {
        if self.selection.remove(path) {
            false
        } else {
            self.selection.insert(path.to_path_buf());
            true
        }
    }

    pub fn is_selected(&self, path: &Path) -> bool {
        self.selection.contains(path)
    }

    pub fn selection_len(&self) -> usize {
        self.selection.len()
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle_selection() {
        let mut session = TimelineSessionState::new(200);
        let path = Path::new("/a.jpg");

        assert!(session.toggle_selected(path));
        assert!(session.is_selected(path));
        assert!(!session.toggle_selected(path));
        assert_eq!(session.selection_len(), 0);
    }

    #[test]
    fn test_reload_clears_selection() {
        let mut session = TimelineSessionState::new(200);
        session.toggle_selected(Path::new("/a.jpg"));

        assert_eq!(session.next_generation(), 1);
        assert_eq!(session.selection_len(), 0);
        assert_eq!(session.generation(), 1);
    }
}
