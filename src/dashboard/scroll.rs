/// How close to the bottom (in content units) a viewport counts as pinned.
pub const BOTTOM_PROXIMITY: u32 = 100;

/// Scroll position of one log pane. Content grows by appends; the offset
/// follows the bottom only while the user is already near it, so scrolling
/// back to read history survives new lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollPane {
    content: u32,
    viewport: u32,
    offset: u32,
}

impl ScrollPane {
    pub fn new(viewport: u32) -> Self {
        Self {
            content: 0,
            viewport,
            offset: 0,
        }
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn content_len(&self) -> u32 {
        self.content
    }

    fn max_offset(&self) -> u32 {
        self.content.saturating_sub(self.viewport)
    }

    pub fn distance_from_bottom(&self) -> u32 {
        self.max_offset().saturating_sub(self.offset)
    }

    pub fn near_bottom(&self) -> bool {
        self.distance_from_bottom() <= BOTTOM_PROXIMITY
    }

    /// Manual scroll, clamped to the scrollable range.
    pub fn scroll_to(&mut self, offset: u32) {
        self.offset = offset.min(self.max_offset());
    }

    pub fn scroll_to_bottom(&mut self) {
        self.offset = self.max_offset();
    }

    /// Grow the content. Follows the bottom only when the pane was already
    /// near it before the append.
    pub fn append(&mut self, added: u32) {
        let was_near = self.near_bottom();
        self.content = self.content.saturating_add(added);
        if was_near {
            self.scroll_to_bottom();
        }
    }
}
