use serde::Serialize;

pub const MIN_ZOOM: u16 = 50;
pub const MAX_ZOOM: u16 = 200;
pub const ZOOM_STEP: u16 = 25;
pub const DEFAULT_ZOOM: u16 = 100;

/// Interaction state for one preview. `current_page` is 1-based; zero only
/// while no document is loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViewState {
    pub current_page: u32,
    pub total_pages: u32,
    pub zoom_percent: u16,
    pub fullscreen: bool,
    pub show_extracted_text: bool,
    pub loading: bool,
    pub error: Option<String>,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            current_page: 0,
            total_pages: 0,
            zoom_percent: DEFAULT_ZOOM,
            fullscreen: false,
            show_extracted_text: false,
            loading: false,
            error: None,
        }
    }
}

/// Parses page-number input and clamps it to `[1, total_pages]`.
///
/// Returns `None` for non-numeric input or when there are no pages.
pub fn parse_page_input(input: &str, total_pages: u32) -> Option<u32> {
    if total_pages == 0 {
        return None;
    }
    let input = input.trim();
    let value = match input.parse::<i64>() {
        Ok(value) => value,
        // Digits too long for i64 still name a page past either end.
        Err(_) => match input.strip_prefix('-') {
            Some(digits) if is_digits(digits) => i64::MIN,
            _ if is_digits(input.strip_prefix('+').unwrap_or(input)) => i64::MAX,
            _ => return None,
        },
    };
    Some(value.clamp(1, i64::from(total_pages)) as u32)
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

impl ViewState {
    pub fn new(total_pages: u32) -> Self {
        Self { current_page: total_pages.min(1), total_pages, ..Self::default() }
    }

    /// Back to a fresh state for a newly loaded document.
    pub fn reset(&mut self, total_pages: u32) {
        *self = Self::new(total_pages);
    }

    pub fn zoom_factor(&self) -> f32 {
        f32::from(self.zoom_percent) / 100.0
    }

    pub fn zoom_in(&mut self) -> u16 {
        self.set_zoom(self.zoom_percent.saturating_add(ZOOM_STEP))
    }

    pub fn zoom_out(&mut self) -> u16 {
        self.set_zoom(self.zoom_percent.saturating_sub(ZOOM_STEP))
    }

    /// Snaps to the nearest step and clamps to the supported range.
    pub fn set_zoom(&mut self, percent: u16) -> u16 {
        let snapped = (percent.saturating_add(ZOOM_STEP / 2) / ZOOM_STEP) * ZOOM_STEP;
        self.zoom_percent = snapped.clamp(MIN_ZOOM, MAX_ZOOM);
        self.zoom_percent
    }

    /// Applies page-number input. Invalid input leaves the state untouched.
    pub fn apply_page_input(&mut self, input: &str) -> Option<u32> {
        let page = parse_page_input(input, self.total_pages)?;
        self.current_page = page;
        Some(page)
    }

    /// Returns `true` when the page actually changed.
    pub fn set_current_page(&mut self, page: u32) -> bool {
        if page == 0 || page > self.total_pages || page == self.current_page {
            return false;
        }
        self.current_page = page;
        true
    }

    pub fn next_page(&mut self) -> Option<u32> {
        let next = self.current_page + 1;
        self.set_current_page(next).then_some(next)
    }

    pub fn previous_page(&mut self) -> Option<u32> {
        let previous = self.current_page.checked_sub(1)?;
        self.set_current_page(previous).then_some(previous)
    }

    pub fn toggle_fullscreen(&mut self) -> bool {
        self.fullscreen = !self.fullscreen;
        self.fullscreen
    }

    pub fn toggle_extracted_text(&mut self) -> bool {
        self.show_extracted_text = !self.show_extracted_text;
        self.show_extracted_text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zoom_steps_and_clamps() {
        let mut state = ViewState::new(5);

        assert_eq!(state.zoom_in(), 125);
        for _ in 0..10 {
            state.zoom_in();
        }
        assert_eq!(state.zoom_percent, MAX_ZOOM);

        for _ in 0..10 {
            state.zoom_out();
        }
        assert_eq!(state.zoom_percent, MIN_ZOOM);
        assert_eq!(state.zoom_factor(), 0.5);
    }

    #[test]
    fn set_zoom_snaps_to_step() {
        let mut state = ViewState::default();

        assert_eq!(state.set_zoom(112), 100);
        assert_eq!(state.set_zoom(113), 125);
        assert_eq!(state.set_zoom(10), MIN_ZOOM);
        assert_eq!(state.set_zoom(900), MAX_ZOOM);
    }

    #[test]
    fn page_input_clamps_to_document() {
        let mut state = ViewState::new(12);

        assert_eq!(state.apply_page_input("40"), Some(12));
        assert_eq!(state.current_page, 12);
        assert_eq!(state.apply_page_input("0"), Some(1));
        assert_eq!(state.apply_page_input(" -3 "), Some(1));
        assert_eq!(state.apply_page_input("7"), Some(7));
    }

    #[test]
    fn oversized_page_input_still_clamps() {
        let mut state = ViewState::new(12);

        assert_eq!(state.apply_page_input("99999999999999999999"), Some(12));
        assert_eq!(state.apply_page_input("+99999999999999999999"), Some(12));
        assert_eq!(state.apply_page_input("-99999999999999999999"), Some(1));
        assert_eq!(state.apply_page_input("9999999999999999999x"), None);
        assert_eq!(state.apply_page_input("-"), None);
    }

    #[test]
    fn non_numeric_page_input_is_ignored() {
        let mut state = ViewState::new(12);
        state.apply_page_input("5");
        let before = state.clone();

        assert_eq!(state.apply_page_input("abc"), None);
        assert_eq!(state.apply_page_input(""), None);
        assert_eq!(state, before);
    }

    #[test]
    fn page_input_without_document_is_ignored() {
        let mut state = ViewState::default();

        assert_eq!(state.apply_page_input("1"), None);
        assert_eq!(state.current_page, 0);
    }

    #[test]
    fn arrows_stop_at_document_edges() {
        let mut state = ViewState::new(2);

        assert_eq!(state.previous_page(), None);
        assert_eq!(state.next_page(), Some(2));
        assert_eq!(state.next_page(), None);
        assert_eq!(state.current_page, 2);
    }

    #[test]
    fn reset_clears_toggles_and_errors() {
        let mut state = ViewState::new(3);
        state.toggle_fullscreen();
        state.toggle_extracted_text();
        state.zoom_in();
        state.error = Some("boom".to_owned());

        state.reset(8);

        assert_eq!(state, ViewState::new(8));
        assert_eq!(state.current_page, 1);
    }
}
