use serde::Serialize;

/// Axis-aligned rectangle in scroll-container pixels (y grows downward).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
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

    pub fn top(&self) -> f32 {
        self.y
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }
}

/// Visible height of `page` inside `viewport`, zero when they do not meet.
pub fn vertical_overlap(page: &Rect, viewport: &Rect) -> f32 {
    (page.bottom().min(viewport.bottom()) - page.top().max(viewport.top())).max(0.0)
}

/// Index of the page with the greatest visible overlap.
///
/// The current page seeds the comparison, so another page must be strictly
/// more visible to take over. Equal overlaps never move the current page.
pub fn most_visible_page(page_bounds: &[Rect], viewport: Rect, current: usize) -> usize {
    if page_bounds.is_empty() {
        return current;
    }

    let mut best = current.min(page_bounds.len() - 1);
    let mut best_overlap = vertical_overlap(&page_bounds[best], &viewport);

    for (index, bounds) in page_bounds.iter().enumerate() {
        let overlap = vertical_overlap(bounds, &viewport);
        if overlap > best_overlap {
            best = index;
            best_overlap = overlap;
        }
    }

    best
}

pub fn visible_pages(page_bounds: &[Rect], viewport: Rect) -> Vec<usize> {
    page_bounds
        .iter()
        .enumerate()
        .filter(|(_, bounds)| vertical_overlap(bounds, &viewport) > 0.0)
        .map(|(index, _)| index)
        .collect()
}

/// Pages stacked vertically in one scroll container.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PageLayout {
    bounds: Vec<Rect>,
}

impl PageLayout {
    /// Stacks pages of the given pixel sizes top to bottom with `spacing`
    /// between them, scaled by `zoom` (1.0 = 100%).
    pub fn stacked(page_sizes: &[(f32, f32)], spacing: f32, zoom: f32) -> Self {
        let mut cursor = 0.0;
        let mut bounds = Vec::with_capacity(page_sizes.len());

        for &(width, height) in page_sizes {
            let rect = Rect::new(0.0, cursor, width * zoom, height * zoom);
            cursor = rect.bottom() + spacing;
            bounds.push(rect);
        }

        Self { bounds }
    }

    pub fn bounds(&self) -> &[Rect] {
        &self.bounds
    }

    pub fn len(&self) -> usize {
        self.bounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bounds.is_empty()
    }

    /// Scroll offset that brings the top of `page_index` to the top edge.
    pub fn scroll_offset_for(&self, page_index: usize) -> Option<f32> {
        self.bounds.get(page_index).map(Rect::top)
    }

    pub fn total_height(&self) -> f32 {
        self.bounds.last().map(Rect::bottom).unwrap_or(0.0)
    }

    /// The visible window for a container of `height` scrolled to `offset`.
    pub fn viewport_at(&self, offset: f32, height: f32) -> Rect {
        let width = self.bounds.iter().map(|b| b.width).fold(0.0, f32::max);
        Rect::new(0.0, offset.max(0.0), width, height)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrollUpdate {
    pub current: usize,
    pub changed: bool,
    pub visible: Vec<usize>,
}

/// Follows scroll events and reports the current page only when it moves.
#[derive(Debug, Clone, Default)]
pub struct ScrollTracker {
    current: usize,
}

impl ScrollTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn on_scroll(&mut self, page_bounds: &[Rect], viewport: Rect) -> ScrollUpdate {
        let next = most_visible_page(page_bounds, viewport, self.current);
        let changed = next != self.current;
        self.current = next;

        ScrollUpdate { current: next, changed, visible: visible_pages(page_bounds, viewport) }
    }

    /// Programmatic jumps set the current page without an overlap test.
    pub fn jump_to(&mut self, page_index: usize) {
        self.current = page_index;
    }
}
