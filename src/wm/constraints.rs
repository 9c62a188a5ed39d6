//! Geometry Constraint Solver
//!
//! Pure function from a proposed client rectangle to the rectangle the
//! window is actually given. Steps run in a fixed order and later steps
//! win: maximize/fullscreen, edge snap, aspect ratio, on-screen, size
//! increments, size limits.

use crate::shared::{FrameBorders, Geometry};
use crate::wm::geometry::{resize_with_gravity, Gravity, MoveResizeFlags};
use crate::wm::hints::SizeHints;

/// Pixels of a window that must stay visible after a user move
pub const MIN_VISIBLE: i32 = 10;

/// Window state the solver cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConstraintState {
    pub maximized_horizontally: bool,
    pub maximized_vertically: bool,
    pub fullscreen: bool,
    pub shaded: bool,
    /// Docks and desktops may sit anywhere
    pub exempt_from_onscreen: bool,
    /// Keep the whole window in the work area on non-user changes
    pub require_fully_onscreen: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct ConstraintInput<'a> {
    pub flags: MoveResizeFlags,
    pub resize_gravity: Gravity,
    /// Client rectangle before the change
    pub orig: Geometry,
    /// Client rectangle requested
    pub proposed: Geometry,
    /// Moving-edge deltas from `mouse_deltas_for_resize`
    pub deltas: (i32, i32),
    pub hints: &'a SizeHints,
    /// Zero when the window has no frame
    pub borders: FrameBorders,
    pub monitors: &'a [Geometry],
    /// Screen work area net of struts
    pub work_area: Geometry,
    pub state: ConstraintState,
    /// Edge snapping distance when snapping applies to this change
    pub snap_distance: Option<i32>,
}

/// Monitor the window mostly lives on
fn pick_monitor(monitors: &[Geometry], frame: &Geometry, fallback: Geometry) -> Geometry {
    let (cx, cy) = frame.center();
    if let Some(m) = monitors.iter().find(|m| m.contains_point(cx, cy)) {
        return *m;
    }
    monitors
        .iter()
        .max_by_key(|m| m.intersection(frame).map(|i| i.area()).unwrap_or(0))
        .copied()
        .unwrap_or(fallback)
}

/// Snap a frame rectangle to work-area edges within `distance`
fn snap_to_edges(frame: &Geometry, work: &Geometry, distance: i32) -> (i32, i32) {
    let mut new_x = frame.x;
    let mut new_y = frame.y;

    // Snap to left edge
    if (frame.x - work.x).abs() < distance {
        new_x = work.x;
    }

    // Snap to right edge
    if (frame.right() - work.right()).abs() < distance {
        new_x = work.right() - frame.width;
    }

    // Snap to top edge
    if (frame.y - work.y).abs() < distance {
        new_y = work.y;
    }

    // Snap to bottom edge
    if (frame.bottom() - work.bottom()).abs() < distance {
        new_y = work.bottom() - frame.height;
    }

    (new_x, new_y)
}

fn div_ceil(a: i64, b: i64) -> i64 {
    (a + b - 1) / b
}

fn constrain_aspect(rect: &mut Geometry, hints: &SizeHints, deltas: (i32, i32), gravity: Gravity) {
    let (mut w, mut h) = (rect.width as i64, rect.height.max(1) as i64);
    let width_only = deltas.0 != 0 && deltas.1 == 0;
    let height_only = deltas.0 == 0 && deltas.1 != 0;

    if let Some((num, den)) = hints.min_aspect {
        let (num, den) = (num as i64, den as i64);
        if w * den < num * h {
            if height_only {
                h = (w * den / num).max(1);
            } else {
                w = div_ceil(h * num, den);
            }
        }
    }
    if let Some((num, den)) = hints.max_aspect {
        let (num, den) = (num as i64, den as i64);
        if w * den > num * h {
            if width_only {
                w = (h * num / den).max(1);
            } else {
                h = div_ceil(w * den, num);
            }
        }
    }

    let (w, h) = (w.min(i32::MAX as i64) as i32, h.min(i32::MAX as i64) as i32);
    if w != rect.width || h != rect.height {
        *rect = resize_with_gravity(rect, w, h, gravity);
    }
}

fn constrain_onscreen(rect: &mut Geometry, input: &ConstraintInput<'_>, work: &Geometry) {
    let b = input.borders;
    let frame = b.frame_rect(rect, input.state.shaded);
    let user = input.flags.contains(MoveResizeFlags::IS_USER_ACTION);
    let resizing = input.flags.contains(MoveResizeFlags::IS_RESIZE_ACTION);

    if user || !input.state.require_fully_onscreen {
        if resizing {
            // Only the titlebar needs rescuing; the other edge is anchored
            if frame.y < work.y {
                let dy = work.y - frame.y;
                rect.y += dy;
                rect.height = (rect.height - dy).max(1);
            }
            return;
        }

        let min_x = work.x + MIN_VISIBLE - frame.width;
        let max_x = work.right() - MIN_VISIBLE;
        let titlebar = b.top.max(MIN_VISIBLE);
        let min_y = work.y;
        let max_y = (work.bottom() - titlebar).max(min_y);

        let new_x = frame.x.clamp(min_x.min(max_x), max_x);
        let new_y = frame.y.clamp(min_y, max_y);
        rect.x += new_x - frame.x;
        rect.y += new_y - frame.y;
        return;
    }

    // Fully onscreen, shrinking resizable windows that do not fit
    let mut frame = frame;
    if frame.width > work.width && input.hints.is_resizable() {
        rect.width = (work.width - b.left - b.right).max(1);
        frame.width = work.width;
    }
    if frame.height > work.height && input.hints.is_resizable() && !input.state.shaded {
        rect.height = (work.height - b.top - b.bottom).max(1);
        frame.height = work.height;
    }
    let new_x = if frame.width <= work.width {
        frame.x.clamp(work.x, work.right() - frame.width)
    } else {
        work.x
    };
    let new_y = if frame.height <= work.height {
        frame.y.clamp(work.y, work.bottom() - frame.height)
    } else {
        work.y
    };
    rect.x += new_x - frame.x;
    rect.y += new_y - frame.y;
}

/// Round down to the size grid, then clamp into the size limits
fn constrain_size(rect: &mut Geometry, hints: &SizeHints, gravity: Gravity) {
    let snap = |value: i32, base: i32, inc: i32| -> i32 {
        if value < base {
            value
        } else {
            value - (value - base) % inc
        }
    };
    let w = snap(rect.width, hints.base_width, hints.width_inc).clamp(hints.min_width, hints.max_width);
    let h = snap(rect.height, hints.base_height, hints.height_inc).clamp(hints.min_height, hints.max_height);

    // Sizes below base are only reachable when min < base; land on the grid
    let w = if (w - hints.base_width).rem_euclid(hints.width_inc) != 0 {
        w + (hints.base_width - w).rem_euclid(hints.width_inc)
    } else {
        w
    };
    let h = if (h - hints.base_height).rem_euclid(hints.height_inc) != 0 {
        h + (hints.base_height - h).rem_euclid(hints.height_inc)
    } else {
        h
    };

    if w != rect.width || h != rect.height {
        *rect = resize_with_gravity(rect, w, h, gravity);
    }
}

/// Constrain a proposed client rectangle
pub fn constrain(input: &ConstraintInput<'_>) -> Geometry {
    let b = input.borders;
    let state = input.state;
    let mut rect = input.proposed;

    let frame = b.frame_rect(&rect, state.shaded);
    let monitor = pick_monitor(input.monitors, &frame, input.work_area);
    let work = monitor.intersection(&input.work_area).unwrap_or(monitor);

    if state.fullscreen {
        rect = Geometry::new(
            monitor.x + b.left,
            monitor.y + b.top,
            monitor.width - b.left - b.right,
            monitor.height - b.top - b.bottom,
        );
    } else {
        if state.maximized_horizontally {
            rect.x = work.x + b.left;
            rect.width = work.width - b.left - b.right;
        }
        if state.maximized_vertically {
            rect.y = work.y + b.top;
            rect.height = work.height - b.top - b.bottom;
        }
    }
    let maximized = state.maximized_horizontally || state.maximized_vertically || state.fullscreen;

    if let Some(distance) = input.snap_distance {
        if !maximized && input.flags.contains(MoveResizeFlags::IS_MOVE_ACTION) {
            let frame = b.frame_rect(&rect, state.shaded);
            let (x, y) = snap_to_edges(&frame, &work, distance);
            rect.x += x - frame.x;
            rect.y += y - frame.y;
        }
    }

    if !maximized {
        constrain_aspect(&mut rect, input.hints, input.deltas, input.resize_gravity);
    }

    if !state.fullscreen && !state.exempt_from_onscreen {
        constrain_onscreen(&mut rect, input, &work);
    }

    constrain_size(&mut rect, input.hints, input.resize_gravity);

    rect
}
