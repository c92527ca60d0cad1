//! Hide-on-hover behaviour for the widget.
//!
//! When the pointer moves onto the widget it is hidden so whatever is
//! underneath stays readable. The pointer is then polled every
//! [`HOVER_POLL_MS`] and the widget restored once it leaves the bounds that
//! were captured at placement.

use std::time::{Duration, Instant};

use crate::constants::HOVER_POLL_MS;

/// Screen rectangle of the widget, in terminal cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Bounds {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
}

impl Bounds {
    /// Hit test with inclusive edges on all four sides.
    pub fn contains(&self, column: u16, row: u16) -> bool {
        let (column, row) = (u32::from(column), u32::from(row));
        let (x, y) = (u32::from(self.x), u32::from(self.y));
        x <= column
            && column <= x + u32::from(self.width)
            && y <= row
            && row <= y + u32::from(self.height)
    }
}

/// Whatever the guard hides and restores.
pub trait HoverSurface {
    fn show(&mut self);
    fn hide(&mut self);
    /// Last known pointer position, `None` if unknown.
    fn pointer_position(&self) -> Option<(u16, u16)>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoverState {
    Idle,
    Hiding,
}

#[derive(Debug, Clone)]
pub struct HoverGuard {
    state: HoverState,
    bounds: Bounds,
    next_poll: Option<Instant>,
    poll: Duration,
}

impl Default for HoverGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl HoverGuard {
    pub fn new() -> Self {
        Self {
            state: HoverState::Idle,
            bounds: Bounds::default(),
            next_poll: None,
            poll: Duration::from_millis(HOVER_POLL_MS),
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> HoverState {
        self.state
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    /// Capture the widget's current placement.
    pub fn place(&mut self, bounds: Bounds) {
        self.bounds = bounds;
    }

    /// Pointer entered the widget: hide and start polling.
    pub fn on_pointer_enter(&mut self, surface: &mut dyn HoverSurface, now: Instant) {
        if self.state == HoverState::Hiding {
            return;
        }
        log::info!("[APP] Hover hide");
        surface.hide();
        self.next_poll = Some(now + self.poll);
        self.state = HoverState::Hiding;
    }

    /// Poll the pointer if due; restore once it is outside the bounds.
    pub fn tick(&mut self, surface: &mut dyn HoverSurface, now: Instant) {
        if self.state != HoverState::Hiding {
            return;
        }
        match self.next_poll {
            Some(due) if now < due => return,
            _ => {}
        }

        let inside = surface
            .pointer_position()
            .is_some_and(|(column, row)| self.bounds.contains(column, row));
        if inside {
            self.next_poll = Some(now + self.poll);
        } else {
            log::info!("[APP] Hover restore");
            surface.show();
            self.next_poll = None;
            self.state = HoverState::Idle;
        }
    }
}
