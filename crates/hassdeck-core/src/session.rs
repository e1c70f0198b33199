#![forbid(unsafe_code)]

//! Navigation session: which page is showing, sleep state, and the
//! detached-page overlay.
//!
//! A detached page (an anonymous page or a generated light-control page)
//! sits on top of the ordered cycle and remembers where to return.
//! Next/previous and go-to close any overlay first.

use crate::config::Config;
use crate::model::Page;

#[derive(Debug, Clone, PartialEq)]
struct Detached {
    page: Page,
    return_to: usize,
}

/// Mutable navigation state, owned by the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    current: usize,
    detached: Option<Detached>,
    awake: bool,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    #[must_use]
    pub fn new() -> Self {
        Self {
            current: 0,
            detached: None,
            awake: true,
        }
    }

    /// Index of the current page in the ordered cycle.
    ///
    /// While a detached page is showing, this is the page to return to.
    #[must_use]
    pub fn current_index(&self) -> usize {
        match &self.detached {
            Some(d) => d.return_to,
            None => self.current,
        }
    }

    #[must_use]
    pub fn is_detached(&self) -> bool {
        self.detached.is_some()
    }

    #[must_use]
    pub fn is_awake(&self) -> bool {
        self.awake
    }

    pub fn sleep(&mut self) {
        self.awake = false;
    }

    /// Wake up. Returns true if the session was asleep, in which case the
    /// waking event must be consumed rather than dispatched.
    pub fn wake(&mut self) -> bool {
        let was_asleep = !self.awake;
        self.awake = true;
        was_asleep
    }

    /// The page currently showing.
    #[must_use]
    pub fn current_page<'a>(&'a self, config: &'a Config) -> &'a Page {
        match &self.detached {
            Some(d) => &d.page,
            None => &config.pages[self.current.min(config.pages.len() - 1)],
        }
    }

    /// Advance to the next page in the cycle, wrapping at the end.
    pub fn next_page(&mut self, page_count: usize) {
        let base = self.close_detached();
        self.current = (base + 1) % page_count.max(1);
    }

    /// Go back to the previous page in the cycle, wrapping at the start.
    pub fn previous_page(&mut self, page_count: usize) {
        let base = self.close_detached();
        let n = page_count.max(1);
        self.current = (base + n - 1) % n;
    }

    /// Jump to a page by cycle index.
    pub fn go_to_index(&mut self, index: usize, page_count: usize) {
        self.close_detached();
        self.current = index.min(page_count.saturating_sub(1));
    }

    /// Show a page outside the cycle, remembering where to return.
    ///
    /// Opening a second overlay replaces the first; the return point is
    /// kept from the original.
    pub fn open_detached(&mut self, page: Page) {
        let return_to = self.current_index();
        self.detached = Some(Detached { page, return_to });
    }

    /// Close the overlay if one is showing. Returns true if one was.
    pub fn close_page(&mut self) -> bool {
        let was_detached = self.detached.is_some();
        self.close_detached();
        was_detached
    }

    fn close_detached(&mut self) -> usize {
        if let Some(d) = self.detached.take() {
            self.current = d.return_to;
        }
        self.current
    }

    /// Re-anchor after a configuration reload: the overlay is dropped, and
    /// an index the new cycle no longer has resets to the first page.
    pub fn after_reload(&mut self, page_count: usize) {
        self.detached = None;
        if self.current >= page_count {
            self.current = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(name: &str) -> Page {
        Page {
            name: name.to_owned(),
            ..Page::default()
        }
    }

    #[test]
    fn next_and_previous_wrap() {
        let mut s = Session::new();
        s.previous_page(3);
        assert_eq!(s.current_index(), 2);
        s.next_page(3);
        assert_eq!(s.current_index(), 0);
        s.next_page(3);
        s.next_page(3);
        s.next_page(3);
        assert_eq!(s.current_index(), 0);
    }

    #[test]
    fn detached_returns_to_origin() {
        let mut s = Session::new();
        s.go_to_index(2, 4);
        s.open_detached(page("overlay"));
        assert!(s.is_detached());
        assert_eq!(s.current_index(), 2);
        assert!(s.close_page());
        assert_eq!(s.current_index(), 2);
        assert!(!s.is_detached());
        // Closing with nothing open is a no-op.
        assert!(!s.close_page());
    }

    #[test]
    fn navigation_closes_overlay_first() {
        let mut s = Session::new();
        s.go_to_index(1, 4);
        s.open_detached(page("overlay"));
        s.next_page(4);
        assert!(!s.is_detached());
        assert_eq!(s.current_index(), 2);
    }

    #[test]
    fn replacing_overlay_keeps_original_return_point() {
        let mut s = Session::new();
        s.go_to_index(3, 4);
        s.open_detached(page("first"));
        s.open_detached(page("second"));
        assert!(s.close_page());
        assert_eq!(s.current_index(), 3);
    }

    #[test]
    fn wake_reports_transition_once() {
        let mut s = Session::new();
        assert!(!s.wake());
        s.sleep();
        assert!(!s.is_awake());
        assert!(s.wake());
        assert!(!s.wake());
    }

    #[test]
    fn reload_drops_overlay_and_keeps_a_surviving_index() {
        let mut s = Session::new();
        s.go_to_index(2, 6);
        s.open_detached(page("overlay"));
        s.after_reload(3);
        assert!(!s.is_detached());
        assert_eq!(s.current_index(), 2);
    }

    #[test]
    fn reload_resets_a_vanished_index_to_the_first_page() {
        let mut s = Session::new();
        s.go_to_index(5, 6);
        s.after_reload(3);
        assert_eq!(s.current_index(), 0);
    }
}
