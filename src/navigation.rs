//! Maps wheel and keyboard gestures onto the feed cursor.
//!
//! The controller is a small timer-gated state machine: a gesture that moves
//! the cursor closes the gate for `cooldown`, and every gesture that arrives
//! while the gate is cooling is dropped. One physical flick of a trackpad
//! produces a burst of wheel events; only the first one counts.

use std::time::{Duration, Instant};

pub const DEFAULT_WHEEL_THRESHOLD: f64 = 50.0;
pub const DEFAULT_COOLDOWN: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Next,
    Previous,
}

impl Direction {
    pub fn from_delta(delta_y: f64) -> Self {
        if delta_y > 0.0 {
            Direction::Next
        } else {
            Direction::Previous
        }
    }
}

/// The region a scroll gesture started in. Nested scrollable regions consume
/// their own gestures, so only `Feed` can move the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScrollOrigin {
    #[default]
    Feed,
    Comments,
    Sidebar,
    Modal,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WheelEvent {
    pub delta_y: f64,
    pub origin: ScrollOrigin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavKey {
    ArrowDown,
    ArrowUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorMove {
    pub from: usize,
    pub to: usize,
    pub direction: Direction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gate {
    Ready,
    Cooling { until: Instant },
}

#[derive(Debug, Clone, Copy)]
pub struct NavigationConfig {
    pub wheel_threshold: f64,
    pub cooldown: Duration,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            wheel_threshold: DEFAULT_WHEEL_THRESHOLD,
            cooldown: DEFAULT_COOLDOWN,
        }
    }
}

#[derive(Debug)]
pub struct NavigationController {
    index: usize,
    len: usize,
    gate: Gate,
    cfg: NavigationConfig,
}

impl NavigationController {
    pub fn new(cfg: NavigationConfig) -> Self {
        Self {
            index: 0,
            len: 0,
            gate: Gate::Ready,
            cfg,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Upper bound of the cursor. The cursor may sit one past the last item
    /// while the next page is on its way.
    pub fn set_len(&mut self, len: usize) {
        self.len = len;
        if self.index > len {
            self.index = len;
        }
    }

    pub fn reset(&mut self) {
        self.index = 0;
        self.gate = Gate::Ready;
    }

    pub fn jump_to(&mut self, index: usize) -> Option<CursorMove> {
        let target = index.min(self.len);
        if target == self.index {
            return None;
        }
        let direction = if target > self.index {
            Direction::Next
        } else {
            Direction::Previous
        };
        Some(self.move_to(target, direction))
    }

    pub fn is_cooling(&self, now: Instant) -> bool {
        matches!(self.gate, Gate::Cooling { until } if now < until)
    }

    /// Programmatic next/previous. Refused while a gesture cooldown is
    /// running, but does not start one itself.
    pub fn advance(&mut self, direction: Direction, now: Instant) -> Option<CursorMove> {
        if self.is_cooling(now) {
            return None;
        }
        self.step(direction)
    }

    pub fn handle_wheel(&mut self, event: WheelEvent, now: Instant) -> Option<CursorMove> {
        if event.origin != ScrollOrigin::Feed {
            return None;
        }
        if event.delta_y.abs() <= self.cfg.wheel_threshold {
            return None;
        }
        self.gesture(Direction::from_delta(event.delta_y), now)
    }

    pub fn handle_key(&mut self, key: NavKey, now: Instant) -> Option<CursorMove> {
        let direction = match key {
            NavKey::ArrowDown => Direction::Next,
            NavKey::ArrowUp => Direction::Previous,
        };
        self.gesture(direction, now)
    }

    fn gesture(&mut self, direction: Direction, now: Instant) -> Option<CursorMove> {
        if self.is_cooling(now) {
            return None;
        }
        let moved = self.step(direction)?;
        self.gate = Gate::Cooling {
            until: now + self.cfg.cooldown,
        };
        Some(moved)
    }

    fn step(&mut self, direction: Direction) -> Option<CursorMove> {
        let target = match direction {
            Direction::Next => (self.index + 1).min(self.len),
            Direction::Previous => self.index.saturating_sub(1),
        };
        if target == self.index {
            return None;
        }
        Some(self.move_to(target, direction))
    }

    fn move_to(&mut self, target: usize, direction: Direction) -> CursorMove {
        let moved = CursorMove {
            from: self.index,
            to: target,
            direction,
        };
        self.index = target;
        tracing::debug!(from = moved.from, to = moved.to, "cursor moved");
        moved
    }
}
