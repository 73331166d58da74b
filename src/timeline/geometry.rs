/// Content-space geometry
///
/// All rectangles are in scroll-content coordinates: y = 0 is the top of the
/// first date group, and the viewport is the window onto that space.

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    /// Open-interval overlap: rectangles that only share an edge do not intersect
    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    /// Grow vertically by `amount` on both sides
    pub fn expand_y(&self, amount: f32) -> Rect {
        Rect {
            y: self.y - amount,
            height: self.height + 2.0 * amount,
            ..*self
        }
    }
}

/// A raw scroll notification from the view layer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollEvent {
    pub offset_y: f32,
    pub viewport_width: f32,
    pub viewport_height: f32,
}

impl ScrollEvent {
    pub fn visible_rect(&self) -> Rect {
        Rect::new(0.0, self.offset_y, self.viewport_width, self.viewport_height)
    }
}
