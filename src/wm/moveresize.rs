//! MoveResize Module
//!
//! Pointer and keyboard driven moving and resizing while a grab op is
//! active: anchor arithmetic, shake-loose from maximized, edge tiling,
//! wireframe updates and resize throttling.

use std::time::Duration;

use anyhow::Result;
use tracing::{debug, warn};
use x11rb::protocol::xproto::{KeyButMask, KeyPressEvent, Window};
use x11rb::protocol::Event;

use crate::shared::Geometry;
use crate::wm::client_flags::ClientFlags;
use crate::wm::conn::XConn;
use crate::wm::display::Display;
use crate::wm::geometry::resize_with_gravity;
use crate::wm::grab::{GrabOp, TileMode};
use crate::wm::timers::{TimerId, TimerKind};

/// A maximized window must be dragged this many drag thresholds to come loose
pub const SHAKE_THRESHOLD_FACTOR: i32 = 6;

/// Without sync, at most 25 resizes per second
const MIN_RESIZE_INTERVAL: Duration = Duration::from_millis(40);

/// A client that takes longer than this to answer a sync request loses sync
const SYNC_REQUEST_TIMEOUT: Duration = Duration::from_millis(1000);

/// Pixels per arrow key press, and with Control held
const KEYBOARD_STEP: i32 = 10;
const KEYBOARD_FINE_STEP: i32 = 1;

mod keysym {
    pub const LEFT: u32 = 0xff51;
    pub const UP: u32 = 0xff52;
    pub const RIGHT: u32 = 0xff53;
    pub const DOWN: u32 = 0xff54;
    pub const RETURN: u32 = 0xff0d;
    pub const KP_ENTER: u32 = 0xff8d;
    pub const SPACE: u32 = 0x0020;
    pub const ESCAPE: u32 = 0xff1b;
}

/// Outcome of the resize rate limiter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Throttle {
    Allow,
    /// Too soon; try again after this long
    Wait(Duration),
    /// A sync request is outstanding; the alarm will force the next update
    AwaitSync,
}

fn has_mask(state: u16, mask: KeyButMask) -> bool {
    state & u16::from(mask) != 0
}

impl<C: XConn> Display<C> {
    /// Pointer moved during a move op
    pub fn update_move(&mut self, mask: u16, x: i32, y: i32) -> Result<()> {
        let Some(window) = self.grab.window else {
            return Ok(());
        };
        self.grab.latest_motion_x = x;
        self.grab.latest_motion_y = y;
        self.grab.snap = self.settings.snap_to_edges || has_mask(mask, KeyButMask::SHIFT);

        let dx = x - self.grab.anchor_root_x;
        let dy = y - self.grab.anchor_root_y;
        let anchor = self.grab.anchor_rect;
        let mut new_x = anchor.x + dx;
        let mut new_y = anchor.y + dy;

        let Some(client) = self.clients.get(&window) else {
            return Ok(());
        };
        let maximized = client.state.intersects(ClientFlags::maximized());
        if maximized && !client.shaken_loose {
            let shake = self.settings.drag_threshold * SHAKE_THRESHOLD_FACTOR;
            if dy.abs() < shake {
                // Maximized windows stay put until shaken loose
                return Ok(());
            }
            let saved = client.saved_rect;
            debug!("MoveResize: {} shaken loose", client.desc());

            // Keep the pointer at the same relative spot of the titlebar
            let offset_x = if anchor.width > 0 {
                (self.grab.anchor_root_x - anchor.x) * saved.width / anchor.width
            } else {
                0
            };
            let offset_y = self.grab.anchor_root_y - anchor.y;
            new_x = x - offset_x;
            new_y = y - offset_y;

            if let Some(client) = self.clients.get_mut(&window) {
                client.shaken_loose = true;
            }
            self.unmaximize(window, ClientFlags::maximized())?;
            self.grab.anchor_root_x = x;
            self.grab.anchor_root_y = y;
            self.grab.anchor_rect = Geometry::new(new_x, new_y, saved.width, saved.height);
            return self.move_resize_window(window, true, new_x, new_y, saved.width, saved.height);
        }

        if self.settings.edge_tiling {
            self.update_tile_mode(x, y);
        }

        if self.grab.wireframe_active {
            self.grab.wireframe_rect.x = new_x;
            self.grab.wireframe_rect.y = new_y;
            let rect = self.grab.wireframe_rect;
            self.ui.wireframe_update(rect);
            return Ok(());
        }

        if self.verbose {
            debug!("MoveResize: moving 0x{:x} to ({}, {})", window, new_x, new_y);
        }
        self.move_window(window, true, new_x, new_y)
    }

    /// Track whether the pointer sits on a screen edge that tiles on release
    fn update_tile_mode(&mut self, x: i32, y: i32) {
        let work = self.screen.work_area_at(x, y);
        let mode = if x <= work.x {
            TileMode::Left
        } else if x >= work.right() - 1 {
            TileMode::Right
        } else {
            TileMode::None
        };
        if mode == self.grab.tile_mode {
            return;
        }
        self.grab.tile_mode = mode;
        match tile_rect(mode, &work) {
            Some(rect) => self.ui.tile_preview_show(rect),
            None => self.ui.tile_preview_hide(),
        }
    }

    /// Pointer moved during a resize op
    pub fn update_resize(&mut self, x: i32, y: i32, force: bool) -> Result<()> {
        let Some(window) = self.grab.window else {
            return Ok(());
        };
        self.grab.latest_motion_x = x;
        self.grab.latest_motion_y = y;

        let op = self.grab.op;
        let dx = x - self.grab.anchor_root_x;
        let dy = y - self.grab.anchor_root_y;
        let anchor = self.grab.anchor_rect;
        let (mut new_x, mut new_y) = (anchor.x, anchor.y);
        let (mut new_w, mut new_h) = (anchor.width, anchor.height);

        if op.moves_east_edge() {
            new_w += dx;
        } else if op.moves_west_edge() {
            new_w -= dx;
            new_x += dx;
        }
        if op.moves_south_edge() {
            new_h += dy;
        } else if op.moves_north_edge() {
            new_h -= dy;
            new_y += dy;
        }

        match self.check_moveresize_frequency(window) {
            Throttle::Allow => {}
            _ if force => {}
            Throttle::Wait(remaining) => {
                if self.grab.compensation_timer.is_none() {
                    let timer = self.add_timer(remaining, TimerKind::ResizeCompensation);
                    self.grab.compensation_timer = Some(timer);
                }
                return Ok(());
            }
            Throttle::AwaitSync => return Ok(()),
        }

        if let Some(timer) = self.grab.compensation_timer.take() {
            self.timers.cancel(timer);
        }

        if self.grab.wireframe_active {
            if new_w <= 0 || new_h <= 0 {
                return Ok(());
            }
            let rect = Geometry::new(new_x, new_y, new_w, new_h);
            self.grab.wireframe_rect = rect;
            self.ui.wireframe_update(rect);
            return Ok(());
        }

        let Some(old) = self.clients.get(&window).map(|c| c.rect) else {
            return Ok(());
        };
        self.resize_window_with_gravity(window, true, new_w, new_h, op.resize_gravity())?;
        let resized = self
            .clients
            .get(&window)
            .is_some_and(|c| !c.rect.same_size(&old));
        if resized {
            self.grab.last_moveresize = Some(self.instant());
        }
        Ok(())
    }

    /// Rate limit for live resizes
    fn check_moveresize_frequency(&mut self, window: Window) -> Throttle {
        let now = self.instant();
        let have_alarm = self.grab.sync_alarm.is_some();
        if let Some(client) = self.clients.get_mut(&window) {
            if have_alarm && client.sync_request_counter.is_some() && !client.disable_sync {
                return match client.sync_request_time {
                    None => Throttle::Allow,
                    Some(sent) if now.saturating_duration_since(sent) < SYNC_REQUEST_TIMEOUT => Throttle::AwaitSync,
                    Some(_) => {
                        warn!("MoveResize: {} did not answer sync request, disabling sync", client.desc());
                        client.disable_sync = true;
                        client.sync_request_time = None;
                        Throttle::Allow
                    }
                };
            }
        }

        match self.grab.last_moveresize {
            Some(last) => {
                let elapsed = now.saturating_duration_since(last);
                if elapsed < MIN_RESIZE_INTERVAL {
                    Throttle::Wait(MIN_RESIZE_INTERVAL - elapsed)
                } else {
                    Throttle::Allow
                }
            }
            None => Throttle::Allow,
        }
    }

    /// A throttled resize is due
    pub(crate) fn resize_compensation_fired(&mut self, timer: TimerId) -> Result<()> {
        if self.grab.compensation_timer != Some(timer) {
            return Ok(());
        }
        self.grab.compensation_timer = None;
        if self.grab.op.is_resizing() {
            let (x, y) = (self.grab.latest_motion_x, self.grab.latest_motion_y);
            self.update_resize(x, y, true)?;
        }
        Ok(())
    }

    /// The client updated its sync counter; returns whether the alarm was ours
    pub fn sync_alarm_notify(&mut self, alarm: u32) -> Result<bool> {
        if self.grab.sync_alarm != Some(alarm) {
            return Ok(false);
        }
        if let Some(client) = self.grab.window.and_then(|w| self.clients.get_mut(&w)) {
            client.disable_sync = false;
            client.sync_request_time = None;
        }
        if self.grab.op.is_resizing() {
            let (x, y) = (self.grab.latest_motion_x, self.grab.latest_motion_y);
            self.update_resize(x, y, true)?;
        }
        Ok(true)
    }

    /// Pointer events while a mouse-driven op is active
    pub fn handle_mouse_grab_op_event(&mut self, event: &Event) -> Result<()> {
        let op = self.grab.op;
        match event {
            Event::ButtonRelease(e) => {
                if op.is_moving() {
                    self.update_move(e.state.into(), e.root_x.into(), e.root_y.into())?;
                } else if op.is_resizing() {
                    self.update_resize(e.root_x.into(), e.root_y.into(), true)?;
                }
                self.end_grab_op(e.time)
            }
            Event::MotionNotify(e) => {
                self.check_threshold(e.root_x.into(), e.root_y.into());
                self.update_from_pointer(op, e.state.into(), e.root_x.into(), e.root_y.into())
            }
            Event::EnterNotify(e) | Event::LeaveNotify(e) => {
                self.update_from_pointer(op, e.state.into(), e.root_x.into(), e.root_y.into())
            }
            _ => Ok(()),
        }
    }

    fn update_from_pointer(&mut self, op: GrabOp, state: u16, x: i32, y: i32) -> Result<()> {
        if op.is_moving() {
            self.update_move(state, x, y)
        } else if op.is_resizing() {
            self.update_resize(x, y, false)
        } else {
            Ok(())
        }
    }

    /// Key events while a keyboard op is active; returns whether the event was consumed
    pub fn handle_keyboard_grab_event(&mut self, event: &KeyPressEvent, press: bool) -> Result<bool> {
        if !press {
            return Ok(true);
        }
        let keysym = self.conn.keycode_to_keysym(event.detail, event.state.into());
        let op = self.grab.op;
        if op.is_moving_or_resizing() {
            self.keyboard_move_resize(keysym, event.state.into(), event.time)?;
        } else if op.is_window_switch() {
            self.keyboard_window_switch(keysym, event.time)?;
        } else if op == GrabOp::KeyboardWorkspaceSwitching {
            self.keyboard_workspace_switch(keysym, event.time)?;
        }
        Ok(true)
    }

    fn keyboard_move_resize(&mut self, keysym: u32, state: u16, time: u32) -> Result<()> {
        let Some(window) = self.grab.window else {
            return self.end_grab_op(time);
        };
        match keysym {
            keysym::ESCAPE => {
                debug!("MoveResize: keyboard op on 0x{:x} cancelled", window);
                self.grab.was_cancelled = true;
                let initial = self.grab.initial_rect;
                if !self.grab.wireframe_active {
                    self.move_resize_window(window, true, initial.x, initial.y, initial.width, initial.height)?;
                }
                return self.end_grab_op(time);
            }
            keysym::RETURN | keysym::KP_ENTER | keysym::SPACE => return self.end_grab_op(time),
            keysym::LEFT | keysym::RIGHT | keysym::UP | keysym::DOWN => {}
            _ => return Ok(()),
        }

        let step = if has_mask(state, KeyButMask::CONTROL) {
            KEYBOARD_FINE_STEP
        } else {
            KEYBOARD_STEP
        };
        let rect = if self.grab.wireframe_active {
            self.grab.wireframe_rect
        } else {
            match self.clients.get(&window) {
                Some(client) => client.rect,
                None => return Ok(()),
            }
        };

        if self.grab.op.is_moving() {
            let (dx, dy) = match keysym {
                keysym::LEFT => (-step, 0),
                keysym::RIGHT => (step, 0),
                keysym::UP => (0, -step),
                _ => (0, step),
            };
            if self.grab.wireframe_active {
                self.grab.wireframe_rect.x += dx;
                self.grab.wireframe_rect.y += dy;
                let rect = self.grab.wireframe_rect;
                self.ui.wireframe_update(rect);
                return Ok(());
            }
            return self.move_window(window, true, rect.x + dx, rect.y + dy);
        }

        if self.grab.op == GrabOp::KeyboardResizingUnknown {
            // The first arrow picks the edge
            self.grab.op = match keysym {
                keysym::LEFT => GrabOp::KeyboardResizingW,
                keysym::RIGHT => GrabOp::KeyboardResizingE,
                keysym::UP => GrabOp::KeyboardResizingN,
                _ => GrabOp::KeyboardResizingS,
            };
            debug!("MoveResize: keyboard resize picks {:?}", self.grab.op);
            return Ok(());
        }

        let op = self.grab.op;
        let (mut width, mut height) = (rect.width, rect.height);
        match keysym {
            keysym::LEFT if op.moves_west_edge() => width += step,
            keysym::LEFT if op.moves_east_edge() => width -= step,
            keysym::RIGHT if op.moves_east_edge() => width += step,
            keysym::RIGHT if op.moves_west_edge() => width -= step,
            keysym::UP if op.moves_north_edge() => height += step,
            keysym::UP if op.moves_south_edge() => height -= step,
            keysym::DOWN if op.moves_south_edge() => height += step,
            keysym::DOWN if op.moves_north_edge() => height -= step,
            _ => return Ok(()),
        }
        if width <= 0 || height <= 0 {
            return Ok(());
        }
        if self.grab.wireframe_active {
            let resized = resize_with_gravity(&rect, width, height, op.resize_gravity());
            self.grab.wireframe_rect = resized;
            self.ui.wireframe_update(resized);
            return Ok(());
        }
        self.resize_window_with_gravity(window, true, width, height, op.resize_gravity())
    }

    fn keyboard_window_switch(&mut self, keysym: u32, time: u32) -> Result<()> {
        match keysym {
            keysym::ESCAPE => {
                if let Some(snapshot) = self.grab.old_stacking.take() {
                    self.stack.restore(&snapshot);
                    self.sync_stack()?;
                }
                self.grab.was_cancelled = true;
                self.end_grab_op(time)
            }
            keysym::RETURN | keysym::KP_ENTER | keysym::SPACE => self.end_grab_op(time),
            _ => Ok(()),
        }
    }

    fn keyboard_workspace_switch(&mut self, keysym: u32, time: u32) -> Result<()> {
        let active = self.workspaces.active();
        let count = self.workspaces.count();
        let target = match keysym {
            keysym::LEFT | keysym::UP => active.checked_sub(1),
            keysym::RIGHT | keysym::DOWN => (active + 1 < count).then_some(active + 1),
            keysym::ESCAPE => {
                self.grab.was_cancelled = true;
                if let Some(initial) = self.grab.initial_workspace.filter(|&index| index != active) {
                    debug!("MoveResize: workspace switch cancelled, back to {}", initial);
                    self.activate_workspace(initial, time)?;
                }
                return self.end_grab_op(time);
            }
            keysym::RETURN | keysym::KP_ENTER | keysym::SPACE => return self.end_grab_op(time),
            _ => None,
        };
        match target {
            Some(index) => self.activate_workspace(index, time),
            None => Ok(()),
        }
    }
}

/// Half of the work area a tile mode covers
pub fn tile_rect(mode: TileMode, work: &Geometry) -> Option<Geometry> {
    let half = work.width / 2;
    match mode {
        TileMode::None => None,
        TileMode::Left => Some(Geometry::new(work.x, work.y, half, work.height)),
        TileMode::Right => Some(Geometry::new(work.x + half, work.y, work.width - half, work.height)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wm::grab::GrabRequest;
    use crate::wm::testing::{key_press, test_display, ROOT};

    #[test]
    fn test_resize_east_follows_pointer() {
        let mut display = test_display();
        let window = display.add_test_client(0x400001);
        let before = display.clients[&window].rect;
        assert!(display
            .begin_grab_op(GrabRequest::new(Some(window), GrabOp::ResizingE, 100, 100, 100))
            .unwrap());
        display.update_resize(140, 100, false).unwrap();
        let after = display.clients[&window].rect;
        assert_eq!(after.width, before.width + 40);
        assert_eq!(after.x, before.x);
        assert!(display.grab.last_moveresize.is_some());
    }

    #[test]
    fn test_resize_west_keeps_right_edge() {
        let mut display = test_display();
        let window = display.add_test_client(0x400001);
        let before = display.clients[&window].rect;
        assert!(display
            .begin_grab_op(GrabRequest::new(Some(window), GrabOp::ResizingW, 100, 100, 200))
            .unwrap());
        display.update_resize(70, 200, false).unwrap();
        let after = display.clients[&window].rect;
        assert_eq!(after.width, before.width + 30);
        assert_eq!(after.right(), before.right());
    }

    #[test]
    fn test_resize_burst_is_coalesced() {
        let mut display = test_display();
        let window = display.add_test_client(0x400001);
        let before = display.clients[&window].rect;
        assert!(display
            .begin_grab_op(GrabRequest::new(Some(window), GrabOp::ResizingE, 100, 100, 100))
            .unwrap());
        display.update_resize(140, 100, false).unwrap();

        display.clock_advance_ms(10);
        display.update_resize(150, 100, false).unwrap();
        display.update_resize(160, 100, false).unwrap();
        assert_eq!(display.timers.len(), 1);
        assert_eq!(display.clients[&window].rect.width, before.width + 40);

        display.clock_advance_ms(40);
        display.run_timers().unwrap();
        assert_eq!(display.clients[&window].rect.width, before.width + 60);
        assert!(display.grab.compensation_timer.is_none());
    }

    #[test]
    fn test_keyboard_move_cancel_restores() {
        let mut display = test_display();
        let window = display.add_test_client(0x400001);
        let before = display.clients[&window].rect;
        assert!(display
            .begin_grab_op(GrabRequest::new(Some(window), GrabOp::KeyboardMoving, 100, 0, 0))
            .unwrap());

        display.conn.set_keysym(keysym::RIGHT);
        display.handle_keyboard_grab_event(&key_press(window, 0), true).unwrap();
        assert_eq!(display.clients[&window].rect.x, before.x + KEYBOARD_STEP);

        display.conn.set_keysym(keysym::DOWN);
        let control = u16::from(KeyButMask::CONTROL);
        display.handle_keyboard_grab_event(&key_press(window, control), true).unwrap();
        assert_eq!(display.clients[&window].rect.y, before.y + KEYBOARD_FINE_STEP);

        display.conn.set_keysym(keysym::ESCAPE);
        display.handle_keyboard_grab_event(&key_press(window, 0), true).unwrap();
        assert_eq!(display.clients[&window].rect, before);
        assert!(!display.grab.is_active());
    }

    #[test]
    fn test_workspace_switch_cancel_returns_to_start() {
        let mut display = test_display();
        assert!(display
            .begin_grab_op(GrabRequest::new(None, GrabOp::KeyboardWorkspaceSwitching, 100, 0, 0))
            .unwrap());

        display.conn.set_keysym(keysym::RIGHT);
        display.handle_keyboard_grab_event(&key_press(ROOT, 0), true).unwrap();
        display.handle_keyboard_grab_event(&key_press(ROOT, 0), true).unwrap();
        assert_eq!(display.workspaces.active(), 2);

        display.conn.set_keysym(keysym::ESCAPE);
        display.handle_keyboard_grab_event(&key_press(ROOT, 0), true).unwrap();
        assert_eq!(display.workspaces.active(), 0);
        assert!(!display.grab.is_active());
    }

    #[test]
    fn test_keyboard_resize_picks_edge_first() {
        let mut display = test_display();
        let window = display.add_test_client(0x400001);
        let before = display.clients[&window].rect;
        assert!(display
            .begin_grab_op(GrabRequest::new(Some(window), GrabOp::KeyboardResizingUnknown, 100, 0, 0))
            .unwrap());
        display.conn.set_keysym(keysym::RIGHT);
        display.handle_keyboard_grab_event(&key_press(window, 0), true).unwrap();
        assert_eq!(display.grab.op, GrabOp::KeyboardResizingE);
        assert_eq!(display.clients[&window].rect, before);

        display.handle_keyboard_grab_event(&key_press(window, 0), true).unwrap();
        assert_eq!(display.clients[&window].rect.width, before.width + KEYBOARD_STEP);

        display.conn.set_keysym(keysym::RETURN);
        display.handle_keyboard_grab_event(&key_press(window, 0), true).unwrap();
        assert!(!display.grab.is_active());
        assert!(!display.grab.was_cancelled);
    }

    #[test]
    fn test_maximized_window_needs_shake() {
        let mut display = test_display();
        let window = display.add_test_client(0x400001);
        display.maximize(window, ClientFlags::maximized()).unwrap();
        let maximized = display.clients[&window].rect;
        assert!(display
            .begin_grab_op(GrabRequest::new(Some(window), GrabOp::Moving, 100, 300, 10))
            .unwrap());

        display.update_move(0, 310, 20).unwrap();
        assert_eq!(display.clients[&window].rect, maximized);

        display.update_move(0, 310, 80).unwrap();
        let client = &display.clients[&window];
        assert!(client.shaken_loose);
        assert!(!client.is_maximized());
        assert_eq!(client.rect.width, 400);
    }

    #[test]
    fn test_tile_rect_halves() {
        let work = Geometry::new(0, 30, 1280, 994);
        assert_eq!(tile_rect(TileMode::Left, &work), Some(Geometry::new(0, 30, 640, 994)));
        assert_eq!(tile_rect(TileMode::Right, &work), Some(Geometry::new(640, 30, 640, 994)));
        assert_eq!(tile_rect(TileMode::None, &work), None);
    }
}
