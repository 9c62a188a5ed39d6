//! Grab operations
//!
//! At most one interactive operation (move, resize, window switching, ...)
//! is active per display. It owns the pointer grab and, for keyboard and
//! mouse-only ops, the keyboard grab.

use std::time::Instant;

use anyhow::Result;
use tracing::{debug, info, warn};
use x11rb::protocol::xproto::Window;

use crate::shared::Geometry;
use crate::wm::conn::{CursorShape, XConn};
use crate::wm::display::Display;
use crate::wm::geometry::Gravity;
use crate::wm::stacking::StackSnapshot;
use crate::wm::timers::TimerId;
use crate::wm::timestamp::Timestamp;
use crate::wm::transients;

/// Kind of interactive operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GrabOp {
    #[default]
    None,

    Moving,
    ResizingSe,
    ResizingS,
    ResizingSw,
    ResizingN,
    ResizingNe,
    ResizingNw,
    ResizingW,
    ResizingE,

    KeyboardMoving,
    KeyboardResizingUnknown,
    KeyboardResizingS,
    KeyboardResizingN,
    KeyboardResizingW,
    KeyboardResizingE,
    KeyboardResizingSe,
    KeyboardResizingNe,
    KeyboardResizingSw,
    KeyboardResizingNw,

    KeyboardTabbingNormal,
    KeyboardTabbingDock,
    KeyboardTabbingGroup,
    KeyboardEscapingNormal,
    KeyboardEscapingDock,
    KeyboardEscapingGroup,

    KeyboardWorkspaceSwitching,

    ClickingMinimize,
    ClickingMaximize,
    ClickingUnmaximize,
    ClickingDelete,
    ClickingMenu,
    ClickingAppmenu,
    ClickingShade,
    ClickingUnshade,
    ClickingAbove,
    ClickingUnabove,
    ClickingStick,
    ClickingUnstick,
}

impl GrabOp {
    /// Pointer-driven moves and resizes
    pub fn is_mouse_only(self) -> bool {
        matches!(
            self,
            GrabOp::Moving
                | GrabOp::ResizingSe
                | GrabOp::ResizingS
                | GrabOp::ResizingSw
                | GrabOp::ResizingN
                | GrabOp::ResizingNe
                | GrabOp::ResizingNw
                | GrabOp::ResizingW
                | GrabOp::ResizingE
        )
    }

    /// Ops that follow the pointer, including keyboard moves and resizes
    pub fn is_mouse(self) -> bool {
        self.is_mouse_only() || self == GrabOp::KeyboardMoving || self.is_keyboard_resizing()
    }

    pub fn is_keyboard(self) -> bool {
        self == GrabOp::KeyboardMoving
            || self.is_keyboard_resizing()
            || self.is_window_switch()
            || self == GrabOp::KeyboardWorkspaceSwitching
    }

    fn is_keyboard_resizing(self) -> bool {
        matches!(
            self,
            GrabOp::KeyboardResizingUnknown
                | GrabOp::KeyboardResizingS
                | GrabOp::KeyboardResizingN
                | GrabOp::KeyboardResizingW
                | GrabOp::KeyboardResizingE
                | GrabOp::KeyboardResizingSe
                | GrabOp::KeyboardResizingNe
                | GrabOp::KeyboardResizingSw
                | GrabOp::KeyboardResizingNw
        )
    }

    pub fn is_resizing(self) -> bool {
        (self.is_mouse_only() && self != GrabOp::Moving) || self.is_keyboard_resizing()
    }

    pub fn is_moving(self) -> bool {
        matches!(self, GrabOp::Moving | GrabOp::KeyboardMoving)
    }

    pub fn is_moving_or_resizing(self) -> bool {
        self.is_moving() || self.is_resizing()
    }

    pub fn is_window_switch(self) -> bool {
        matches!(
            self,
            GrabOp::KeyboardTabbingNormal
                | GrabOp::KeyboardTabbingDock
                | GrabOp::KeyboardTabbingGroup
                | GrabOp::KeyboardEscapingNormal
                | GrabOp::KeyboardEscapingDock
                | GrabOp::KeyboardEscapingGroup
        )
    }

    pub fn is_clicking(self) -> bool {
        matches!(
            self,
            GrabOp::ClickingMinimize
                | GrabOp::ClickingMaximize
                | GrabOp::ClickingUnmaximize
                | GrabOp::ClickingDelete
                | GrabOp::ClickingMenu
                | GrabOp::ClickingAppmenu
                | GrabOp::ClickingShade
                | GrabOp::ClickingUnshade
                | GrabOp::ClickingAbove
                | GrabOp::ClickingUnabove
                | GrabOp::ClickingStick
                | GrabOp::ClickingUnstick
        )
    }

    /// Cursor shown while the op is active
    pub fn cursor(self) -> CursorShape {
        match self {
            GrabOp::ResizingSe | GrabOp::KeyboardResizingSe => CursorShape::SouthEast,
            GrabOp::ResizingS | GrabOp::KeyboardResizingS => CursorShape::South,
            GrabOp::ResizingSw | GrabOp::KeyboardResizingSw => CursorShape::SouthWest,
            GrabOp::ResizingN | GrabOp::KeyboardResizingN => CursorShape::North,
            GrabOp::ResizingNe | GrabOp::KeyboardResizingNe => CursorShape::NorthEast,
            GrabOp::ResizingNw | GrabOp::KeyboardResizingNw => CursorShape::NorthWest,
            GrabOp::ResizingW | GrabOp::KeyboardResizingW => CursorShape::West,
            GrabOp::ResizingE | GrabOp::KeyboardResizingE => CursorShape::East,
            GrabOp::Moving | GrabOp::KeyboardMoving | GrabOp::KeyboardResizingUnknown => CursorShape::Move,
            _ => CursorShape::Default,
        }
    }

    /// The corner or edge that stays put during this resize
    pub fn resize_gravity(self) -> Gravity {
        match self {
            GrabOp::ResizingSe | GrabOp::KeyboardResizingSe => Gravity::NorthWest,
            GrabOp::ResizingS | GrabOp::KeyboardResizingS => Gravity::North,
            GrabOp::ResizingSw | GrabOp::KeyboardResizingSw => Gravity::NorthEast,
            GrabOp::ResizingN | GrabOp::KeyboardResizingN => Gravity::South,
            GrabOp::ResizingNe | GrabOp::KeyboardResizingNe => Gravity::SouthWest,
            GrabOp::ResizingNw | GrabOp::KeyboardResizingNw => Gravity::SouthEast,
            GrabOp::ResizingE | GrabOp::KeyboardResizingE => Gravity::West,
            GrabOp::ResizingW | GrabOp::KeyboardResizingW => Gravity::East,
            _ => Gravity::NorthWest,
        }
    }

    /// Whether the west/north edge follows the pointer
    pub fn moves_west_edge(self) -> bool {
        matches!(
            self,
            GrabOp::ResizingW | GrabOp::ResizingNw | GrabOp::ResizingSw
                | GrabOp::KeyboardResizingW | GrabOp::KeyboardResizingNw | GrabOp::KeyboardResizingSw
        )
    }

    pub fn moves_east_edge(self) -> bool {
        matches!(
            self,
            GrabOp::ResizingE | GrabOp::ResizingNe | GrabOp::ResizingSe
                | GrabOp::KeyboardResizingE | GrabOp::KeyboardResizingNe | GrabOp::KeyboardResizingSe
        )
    }

    pub fn moves_north_edge(self) -> bool {
        matches!(
            self,
            GrabOp::ResizingN | GrabOp::ResizingNe | GrabOp::ResizingNw
                | GrabOp::KeyboardResizingN | GrabOp::KeyboardResizingNe | GrabOp::KeyboardResizingNw
        )
    }

    pub fn moves_south_edge(self) -> bool {
        matches!(
            self,
            GrabOp::ResizingS | GrabOp::ResizingSe | GrabOp::ResizingSw
                | GrabOp::KeyboardResizingS | GrabOp::KeyboardResizingSe | GrabOp::KeyboardResizingSw
        )
    }

    /// `_NET_WM_MOVERESIZE` direction codes
    pub fn from_moveresize_action(action: u32) -> Option<GrabOp> {
        Some(match action {
            0 => GrabOp::ResizingNw,
            1 => GrabOp::ResizingN,
            2 => GrabOp::ResizingNe,
            3 => GrabOp::ResizingE,
            4 => GrabOp::ResizingSe,
            5 => GrabOp::ResizingS,
            6 => GrabOp::ResizingSw,
            7 => GrabOp::ResizingW,
            8 => GrabOp::Moving,
            9 => GrabOp::KeyboardResizingUnknown,
            10 => GrabOp::KeyboardMoving,
            _ => return None,
        })
    }
}

/// Half-screen tiling target while dragging against an edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TileMode {
    #[default]
    None,
    Left,
    Right,
}

/// The process-wide grab op
#[derive(Debug, Clone, Default)]
pub struct GrabState {
    pub op: GrabOp,
    /// Client the op acts on
    pub window: Option<Window>,
    /// Root of the screen the op runs on
    pub screen: Option<Window>,
    /// Window that received the grab: frame, client or root
    pub xwindow: Window,
    pub button: u8,
    pub modifiers: u16,
    pub frame_action: bool,

    pub anchor_root_x: i32,
    pub anchor_root_y: i32,
    pub anchor_rect: Geometry,
    pub initial_rect: Geometry,
    pub latest_motion_x: i32,
    pub latest_motion_y: i32,

    /// Pointer position at begin, for the click-versus-drag latch
    pub initial_x: i32,
    pub initial_y: i32,
    pub threshold_exceeded: bool,

    pub tile_mode: TileMode,
    /// Snap to work-area edges while moving
    pub snap: bool,
    pub wireframe_active: bool,
    pub wireframe_rect: Geometry,
    pub old_stacking: Option<StackSnapshot>,

    pub have_pointer: bool,
    pub have_keyboard: bool,
    pub was_cancelled: bool,
    /// Workspace to return to when a workspace switch is cancelled
    pub initial_workspace: Option<usize>,

    pub sync_alarm: Option<u32>,
    pub compensation_timer: Option<TimerId>,
    pub last_moveresize: Option<Instant>,
}

impl GrabState {
    pub fn is_active(&self) -> bool {
        self.op != GrabOp::None
    }
}

/// Arguments to [`Display::begin_grab_op`]
#[derive(Debug, Clone, Copy)]
pub struct GrabRequest {
    pub window: Option<Window>,
    pub op: GrabOp,
    pub pointer_already_grabbed: bool,
    pub frame_action: bool,
    pub button: u8,
    pub modmask: u16,
    pub timestamp: Timestamp,
    pub root_x: i32,
    pub root_y: i32,
}

impl GrabRequest {
    pub fn new(window: Option<Window>, op: GrabOp, timestamp: Timestamp, root_x: i32, root_y: i32) -> Self {
        Self {
            window,
            op,
            pointer_already_grabbed: false,
            frame_action: false,
            button: 0,
            modmask: 0,
            timestamp,
            root_x,
            root_y,
        }
    }
}

impl<C: XConn> Display<C> {
    /// Start an interactive operation
    ///
    /// Returns false and leaves all state alone when another op is active or
    /// a required grab cannot be obtained.
    pub fn begin_grab_op(&mut self, req: GrabRequest) -> Result<bool> {
        if self.grab.is_active() {
            warn!(
                "Grab: attempt to begin {:?} while {:?} is active on {:?}",
                req.op, self.grab.op, self.grab.window
            );
            return Ok(false);
        }
        if req.op == GrabOp::None {
            return Ok(false);
        }
        let mut window = req.window;
        if let Some(w) = window {
            if !self.clients.contains_key(&w) {
                debug!("Grab: 0x{:x} is gone, not grabbing", w);
                return Ok(false);
            }
        }

        if req.op.is_moving_or_resizing() {
            if let Some(w) = window {
                if self.settings.raise_on_click {
                    self.raise_window(w)?;
                }
            }
        }
        if req.op.is_moving() {
            window = window.map(|w| transients::grab_target(&self.clients, w, self.settings.attach_modal_dialogs));
        }

        let root = self.screen.root;
        let xwindow = window
            .and_then(|w| self.clients.get(&w))
            .map(|c| c.outer_xwindow())
            .unwrap_or(root);

        let grabbed = self.conn.grab_pointer(root, root, req.op.cursor(), req.timestamp)?;
        let have_pointer = grabbed || req.pointer_already_grabbed;
        if !have_pointer && !req.op.is_keyboard() {
            debug!("Grab: pointer grab for {:?} failed", req.op);
            return Ok(false);
        }

        let mut have_keyboard = false;
        if req.op.is_keyboard() || req.op.is_mouse_only() {
            have_keyboard = self.conn.grab_keyboard(xwindow, req.timestamp)?;
            if !have_keyboard {
                debug!("Grab: keyboard grab for {:?} failed, releasing pointer", req.op);
                if grabbed {
                    self.conn.ungrab_pointer(req.timestamp)?;
                }
                return Ok(false);
            }
        }

        if let Some(timer) = self.grab.compensation_timer.take() {
            self.timers.cancel(timer);
        }

        let rect = window
            .and_then(|w| self.clients.get(&w))
            .map(|c| c.rect)
            .unwrap_or_default();
        self.grab = GrabState {
            op: req.op,
            window,
            screen: Some(root),
            xwindow,
            button: req.button,
            modifiers: req.modmask,
            frame_action: req.frame_action,
            anchor_root_x: req.root_x,
            anchor_root_y: req.root_y,
            anchor_rect: rect,
            initial_rect: rect,
            latest_motion_x: req.root_x,
            latest_motion_y: req.root_y,
            initial_x: req.root_x,
            initial_y: req.root_y,
            threshold_exceeded: false,
            have_pointer,
            have_keyboard,
            initial_workspace: (req.op == GrabOp::KeyboardWorkspaceSwitching).then(|| self.workspaces.active()),
            ..GrabState::default()
        };
        info!("Grab: began {:?} on {:?} (button {})", req.op, window, req.button);

        if req.op.is_moving_or_resizing() && self.settings.reduced_resources && !self.settings.accessibility {
            let outer = window
                .and_then(|w| self.clients.get(&w))
                .map(|c| c.outer_rect())
                .unwrap_or(rect);
            self.grab.wireframe_active = true;
            self.grab.wireframe_rect = rect;
            self.ui.wireframe_begin(outer);
        } else if req.op.is_resizing() && self.extensions.have_xsync {
            let counter = window
                .and_then(|w| self.clients.get_mut(&w))
                .filter(|c| !c.disable_sync)
                .and_then(|c| {
                    c.sync_request_time = None;
                    c.sync_request_counter
                });
            if let Some(counter) = counter {
                self.grab.sync_alarm = self.conn.create_sync_alarm(counter)?;
                debug!("Grab: sync alarm {:?} on counter 0x{:x}", self.grab.sync_alarm, counter);
            }
        }

        if req.op.is_window_switch() {
            self.grab.old_stacking = Some(self.stack.snapshot());
            let windows = self.tab_list();
            self.ui.tab_popup_show(req.op, &windows);
        } else if req.op == GrabOp::KeyboardWorkspaceSwitching {
            self.ui.tab_popup_show(req.op, &[]);
        }

        debug_assert!(self.grab.window.is_some() || self.grab.screen.is_some());
        Ok(true)
    }

    /// Finish the active op; a no-op when none is active
    ///
    /// The grab state is cleared and the grabs released even when a step
    /// fails; the first error is returned afterwards.
    pub fn end_grab_op(&mut self, timestamp: Timestamp) -> Result<()> {
        if !self.grab.is_active() {
            return Ok(());
        }
        let grab = std::mem::take(&mut self.grab);
        let op = grab.op;
        let window = grab.window;
        info!("Grab: ending {:?} on {:?}", op, window);

        let mut first_error = None;
        let mut note = |step: &str, result: Result<()>| {
            if let Err(e) = result {
                warn!("Grab: {} failed while ending {:?}: {:#}", step, op, e);
                first_error.get_or_insert(e);
            }
        };

        if let Some(client) = window.and_then(|w| self.clients.get_mut(&w)) {
            client.shaken_loose = false;
        }

        if let Some(w) = window {
            if !self.settings.raise_on_click && op.is_moving_or_resizing() && !grab.threshold_exceeded {
                // A click rather than a drag
                note("raise", self.raise_window(w));
            }
        }

        if op.is_window_switch() || op == GrabOp::KeyboardWorkspaceSwitching {
            self.ui.tab_popup_free();
            self.ungrab_should_not_cause_focus_window = Some(grab.xwindow);
        }

        if grab.wireframe_active {
            self.ui.wireframe_end();
            if let Some(w) = window.filter(|_| !grab.was_cancelled) {
                let rect = grab.wireframe_rect;
                if rect.width > 0 && rect.height > 0 {
                    if op.is_moving() {
                        note("wireframe move", self.move_window(w, true, rect.x, rect.y));
                    }
                    if op.is_resizing() {
                        note(
                            "wireframe resize",
                            self.resize_window_with_gravity(w, true, rect.width, rect.height, op.resize_gravity()),
                        );
                    }
                } else {
                    warn!("Grab: rejecting zero-sized wireframe result {:?}", rect);
                }
            }
        }

        if grab.have_pointer {
            note("pointer ungrab", self.conn.ungrab_pointer(timestamp));
        }
        if grab.have_keyboard {
            note("keyboard ungrab", self.conn.ungrab_keyboard(timestamp));
        }

        self.ui.tile_preview_hide();
        if let Some(alarm) = grab.sync_alarm {
            note("sync alarm teardown", self.conn.destroy_sync_alarm(alarm));
        }
        self.ui.resize_popup_free();
        if let Some(timer) = grab.compensation_timer {
            self.timers.cancel(timer);
        }

        if let Some(w) = window {
            if grab.tile_mode != TileMode::None && !grab.was_cancelled {
                note("tile", self.tile_window(w, grab.tile_mode));
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Latch once the pointer has moved far enough to count as a drag
    pub fn check_threshold(&mut self, x: i32, y: i32) {
        if self.settings.raise_on_click || self.grab.threshold_exceeded {
            return;
        }
        let threshold = self.settings.drag_threshold;
        if (self.grab.initial_x - x).abs() >= threshold || (self.grab.initial_y - y).abs() >= threshold {
            self.grab.threshold_exceeded = true;
        }
    }

    /// Windows offered by the window-switch popup, most recent first
    fn tab_list(&self) -> Vec<Window> {
        let active = self.workspaces.active();
        self.focus
            .history()
            .filter(|w| {
                self.clients
                    .get(w)
                    .is_some_and(|c| (c.is_sticky() || c.workspace == active) && !c.is_dock_or_desktop())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wm::geometry::resize_with_gravity;
    use crate::wm::testing::{test_display, Request};

    #[test]
    fn test_predicates() {
        assert!(GrabOp::Moving.is_mouse_only());
        assert!(GrabOp::KeyboardMoving.is_mouse());
        assert!(!GrabOp::KeyboardMoving.is_mouse_only());
        assert!(GrabOp::KeyboardResizingUnknown.is_resizing());
        assert!(GrabOp::KeyboardTabbingDock.is_window_switch());
        assert!(GrabOp::KeyboardTabbingDock.is_keyboard());
        assert!(GrabOp::ClickingShade.is_clicking());
        assert!(!GrabOp::ClickingShade.is_keyboard());
        assert!(GrabOp::ResizingE.is_resizing());
        assert!(!GrabOp::Moving.is_resizing());
    }

    #[test]
    fn test_cursors_and_gravity() {
        assert_eq!(GrabOp::ResizingSe.cursor(), CursorShape::SouthEast);
        assert_eq!(GrabOp::KeyboardResizingUnknown.cursor(), CursorShape::Move);
        assert_eq!(GrabOp::KeyboardTabbingNormal.cursor(), CursorShape::Default);
        assert_eq!(GrabOp::ResizingE.resize_gravity(), Gravity::West);
        assert_eq!(GrabOp::ResizingNw.resize_gravity(), Gravity::SouthEast);
        assert_eq!(GrabOp::from_moveresize_action(8), Some(GrabOp::Moving));
        assert_eq!(GrabOp::from_moveresize_action(11), None);
    }

    #[test]
    fn test_begin_twice_fails_without_state_change() {
        let mut display = test_display();
        let window = display.add_test_client(0x400001);
        let req = GrabRequest::new(Some(window), GrabOp::Moving, 100, 10, 10);
        assert!(display.begin_grab_op(req).unwrap());

        let second = GrabRequest::new(Some(window), GrabOp::ResizingE, 101, 50, 50);
        assert!(!display.begin_grab_op(second).unwrap());
        assert_eq!(display.grab.op, GrabOp::Moving);
        assert_eq!(display.grab.anchor_root_x, 10);
    }

    #[test]
    fn test_end_without_grab_is_noop() {
        let mut display = test_display();
        display.end_grab_op(100).unwrap();
        display.end_grab_op(100).unwrap();
        assert!(display.conn.requests().is_empty());
    }

    #[test]
    fn test_pointer_failure_aborts_mouse_op() {
        let mut display = test_display();
        let window = display.add_test_client(0x400001);
        display.conn.set_pointer_grab_result(false);
        let req = GrabRequest::new(Some(window), GrabOp::Moving, 100, 0, 0);
        assert!(!display.begin_grab_op(req).unwrap());
        assert!(!display.grab.is_active());
    }

    #[test]
    fn test_keyboard_failure_rolls_back_pointer() {
        let mut display = test_display();
        let window = display.add_test_client(0x400001);
        display.conn.set_keyboard_grab_result(false);
        let req = GrabRequest::new(Some(window), GrabOp::ResizingSe, 100, 0, 0);
        assert!(!display.begin_grab_op(req).unwrap());
        assert!(!display.grab.is_active());
        assert_eq!(display.conn.count(|r| matches!(r, Request::UngrabPointer)), 1);
    }

    #[test]
    fn test_grab_invariant_after_begin() {
        let mut display = test_display();
        let req = GrabRequest::new(None, GrabOp::KeyboardTabbingNormal, 100, 0, 0);
        assert!(display.begin_grab_op(req).unwrap());
        assert!(display.grab.have_keyboard);
        assert!(display.grab.screen.is_some());
        assert!(display.grab.old_stacking.is_some());
        display.end_grab_op(101).unwrap();
        assert!(!display.grab.is_active());
        assert_eq!(display.ungrab_should_not_cause_focus_window, Some(display.screen.root));
    }

    #[test]
    fn test_threshold_latch() {
        let mut display = test_display();
        display.settings.raise_on_click = false;
        let window = display.add_test_client(0x400001);
        let req = GrabRequest::new(Some(window), GrabOp::Moving, 100, 100, 100);
        assert!(display.begin_grab_op(req).unwrap());
        display.check_threshold(107, 100);
        assert!(!display.grab.threshold_exceeded);
        display.check_threshold(108, 100);
        assert!(display.grab.threshold_exceeded);
        display.check_threshold(100, 100);
        assert!(display.grab.threshold_exceeded);
    }

    #[test]
    fn test_wireframe_commits_on_end() {
        let mut display = test_display();
        display.settings.reduced_resources = true;
        let window = display.add_test_client(0x400001);
        let req = GrabRequest::new(Some(window), GrabOp::Moving, 100, 0, 0);
        assert!(display.begin_grab_op(req).unwrap());
        assert!(display.grab.wireframe_active);
        let mut rect = display.grab.wireframe_rect;
        rect.x += 40;
        display.grab.wireframe_rect = rect;
        display.end_grab_op(101).unwrap();
        assert_eq!(display.clients[&window].rect.x, rect.x);
    }

    #[test]
    fn test_wireframe_resize_keeps_opposite_corner() {
        let mut display = test_display();
        display.settings.reduced_resources = true;
        let window = display.add_test_client(0x400001);
        display.clients.get_mut(&window).unwrap().size_hints.min_width = 380;
        let initial = display.clients[&window].rect;
        let req = GrabRequest::new(Some(window), GrabOp::ResizingNw, 100, 0, 0);
        assert!(display.begin_grab_op(req).unwrap());

        let shrunk = resize_with_gravity(&initial, initial.width - 70, initial.height - 40, Gravity::SouthEast);
        display.grab.wireframe_rect = shrunk;
        display.end_grab_op(101).unwrap();

        // Clamped to the minimum width around the fixed south-east corner
        let rect = display.clients[&window].rect;
        assert_eq!(rect.width, 380);
        assert_eq!(rect.right(), initial.right());
        assert_eq!(rect.bottom(), initial.bottom());
        assert_eq!(rect.y, initial.y + 40);
    }

    #[test]
    fn test_end_clears_state_when_ungrab_fails() {
        let mut display = test_display();
        let window = display.add_test_client(0x400001);
        let req = GrabRequest::new(Some(window), GrabOp::ResizingSe, 100, 0, 0);
        assert!(display.begin_grab_op(req).unwrap());

        display.conn.fail_requests(|r| matches!(r, Request::UngrabPointer));
        assert!(display.end_grab_op(101).is_err());
        assert!(display.grab.op == GrabOp::None);
        assert!(!display.grab.is_active());
        assert_eq!(display.conn.count(|r| matches!(r, Request::UngrabKeyboard)), 1);

        let again = GrabRequest::new(Some(window), GrabOp::Moving, 102, 0, 0);
        assert!(display.begin_grab_op(again).unwrap());
    }
}
