//! Pointer-driven crop selection state machine.
//!
//! The selector owns the live [`CropRegion`] and mutates it in response to
//! pointer events over the preview surface. It is a plain state machine
//! with no UI binding: the caller maps its viewport to percent space
//! (0-100 on both axes), feeds events in, and renders whatever region
//! comes back. States are `Idle`, `Dragging` (moving the whole region)
//! and `Resizing` (one corner handle active, the opposite corner fixed).

use crate::crop::{CropRegion, MIN_SIZE_PERCENT};

/// Corner handles, named for the corner they sit on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handle {
    Nw,
    Ne,
    Sw,
    Se,
}

/// A pointer position in percent space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PointerPos {
    pub x: f64,
    pub y: f64,
}

impl PointerPos {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// What the pointer went down on, as resolved by [`RegionSelector::hit_test`]
/// or by the caller's own overlay geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitTarget {
    Body,
    Handle(Handle),
    Outside,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    Down { pos: PointerPos, target: HitTarget },
    Move { pos: PointerPos },
    Up,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum State {
    Idle,
    Dragging {
        start: PointerPos,
        origin: CropRegion,
    },
    Resizing {
        handle: Handle,
        start: PointerPos,
        origin: CropRegion,
    },
}

/// Half-size of a corner handle's hit area, in percent of the surface.
const HANDLE_HIT_RADIUS: f64 = 2.5;

pub struct RegionSelector {
    region: CropRegion,
    state: State,
    enabled: bool,
}

impl Default for RegionSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl RegionSelector {
    pub fn new() -> Self {
        Self {
            region: CropRegion::full_frame(),
            state: State::Idle,
            enabled: true,
        }
    }

    pub fn region(&self) -> CropRegion {
        self.region
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, State::Idle)
    }

    /// Crop mode toggle. While disabled every event is a no-op; disabling
    /// mid-gesture also abandons that gesture.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.state = State::Idle;
        }
    }

    /// Resets the selection to the full frame, e.g. when a new source
    /// replaces the current one.
    pub fn reset(&mut self) {
        self.region = CropRegion::full_frame();
        self.state = State::Idle;
    }

    /// Resolves a pointer position against the current region geometry.
    pub fn hit_test(&self, pos: PointerPos) -> HitTarget {
        let corners = [
            (Handle::Nw, self.region.x, self.region.y),
            (Handle::Ne, self.region.right(), self.region.y),
            (Handle::Sw, self.region.x, self.region.bottom()),
            (Handle::Se, self.region.right(), self.region.bottom()),
        ];
        for (handle, cx, cy) in corners {
            if (pos.x - cx).abs() <= HANDLE_HIT_RADIUS && (pos.y - cy).abs() <= HANDLE_HIT_RADIUS {
                return HitTarget::Handle(handle);
            }
        }
        if self.region.contains(pos.x, pos.y) {
            HitTarget::Body
        } else {
            HitTarget::Outside
        }
    }

    /// Feeds one pointer event through the state machine. Returns the
    /// updated region when the event mutated it, so subscribers observe
    /// every change synchronously.
    pub fn handle_event(&mut self, event: PointerEvent) -> Option<CropRegion> {
        if !self.enabled {
            return None;
        }

        match (self.state, event) {
            (State::Idle, PointerEvent::Down { pos, target }) => {
                match target {
                    HitTarget::Body => {
                        self.state = State::Dragging {
                            start: pos,
                            origin: self.region,
                        };
                    }
                    HitTarget::Handle(handle) => {
                        self.state = State::Resizing {
                            handle,
                            start: pos,
                            origin: self.region,
                        };
                    }
                    HitTarget::Outside => {}
                }
                None
            }
            (State::Dragging { start, origin }, PointerEvent::Move { pos }) => {
                let dx = pos.x - start.x;
                let dy = pos.y - start.y;
                self.region.x = (origin.x + dx).clamp(0.0, 100.0 - origin.width);
                self.region.y = (origin.y + dy).clamp(0.0, 100.0 - origin.height);
                Some(self.region)
            }
            (
                State::Resizing {
                    handle,
                    start,
                    origin,
                },
                PointerEvent::Move { pos },
            ) => {
                let dx = pos.x - start.x;
                let dy = pos.y - start.y;
                self.region = resize(origin, handle, dx, dy);
                Some(self.region)
            }
            (_, PointerEvent::Up) => {
                self.state = State::Idle;
                None
            }
            // Down while already dragging/resizing, or moves while idle.
            _ => None,
        }
    }
}

/// Applies a cumulative pointer delta to the gesture's starting region.
/// The corner opposite `handle` is the anchor: it never moves, even when
/// the adjusted dimension bottoms out at [`MIN_SIZE_PERCENT`]. Moving
/// edges are additionally clamped to the surface.
fn resize(origin: CropRegion, handle: Handle, dx: f64, dy: f64) -> CropRegion {
    let left = origin.x;
    let top = origin.y;
    let right = origin.right();
    let bottom = origin.bottom();

    let (new_left, new_right) = match handle {
        Handle::Nw | Handle::Sw => {
            let edge = (left + dx).clamp(0.0, right - MIN_SIZE_PERCENT);
            (edge, right)
        }
        Handle::Ne | Handle::Se => {
            let edge = (right + dx).clamp(left + MIN_SIZE_PERCENT, 100.0);
            (left, edge)
        }
    };
    let (new_top, new_bottom) = match handle {
        Handle::Nw | Handle::Ne => {
            let edge = (top + dy).clamp(0.0, bottom - MIN_SIZE_PERCENT);
            (edge, bottom)
        }
        Handle::Sw | Handle::Se => {
            let edge = (bottom + dy).clamp(top + MIN_SIZE_PERCENT, 100.0);
            (top, edge)
        }
    };

    CropRegion::new(new_left, new_top, new_right - new_left, new_bottom - new_top)
}
