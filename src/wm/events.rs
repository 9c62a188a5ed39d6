//! Events Module
//!
//! The display event dispatcher. One event is handled to completion before
//! the next; handlers may issue further requests synchronously.

use anyhow::Result;
use tracing::{debug, info, warn};
use x11rb::protocol::xproto::{
    Allow, ButtonPressEvent, ConfigWindow, ConfigureRequestEvent, ConfigureWindowAux, EnterNotifyEvent, NotifyDetail,
    NotifyMode, Window,
};
use x11rb::protocol::Event;

use crate::wm::client_flags::WindowType;
use crate::wm::conn::XConn;
use crate::wm::display::Display;
use crate::wm::error_trap::ErrorTrap;
use crate::wm::grab::{GrabOp, GrabRequest};
use crate::wm::settings::FocusMode;
use crate::wm::timestamp::{Timestamp, CURRENT_TIME};

/// Server time carried by an event, or `CurrentTime` for events without one
pub fn event_time(event: &Event) -> Timestamp {
    match event {
        Event::KeyPress(e) | Event::KeyRelease(e) => e.time,
        Event::ButtonPress(e) | Event::ButtonRelease(e) => e.time,
        Event::MotionNotify(e) => e.time,
        Event::EnterNotify(e) | Event::LeaveNotify(e) => e.time,
        Event::PropertyNotify(e) => e.time,
        Event::SelectionClear(e) => e.time,
        Event::SelectionRequest(e) => e.time,
        Event::SelectionNotify(e) => e.time,
        _ => CURRENT_TIME,
    }
}

/// The X window an event is about
pub fn modified_window(event: &Event) -> Option<Window> {
    match event {
        Event::KeyPress(e) | Event::KeyRelease(e) => Some(e.event),
        Event::ButtonPress(e) | Event::ButtonRelease(e) => Some(e.event),
        Event::MotionNotify(e) => Some(e.event),
        Event::EnterNotify(e) | Event::LeaveNotify(e) => Some(e.event),
        Event::FocusIn(e) | Event::FocusOut(e) => Some(e.event),
        Event::UnmapNotify(e) => Some(e.window),
        Event::DestroyNotify(e) => Some(e.window),
        Event::MapRequest(e) => Some(e.window),
        Event::ConfigureRequest(e) => Some(e.window),
        Event::ReparentNotify(e) => Some(e.window),
        Event::PropertyNotify(e) => Some(e.window),
        Event::ClientMessage(e) => Some(e.window),
        Event::ShapeNotify(e) => Some(e.affected_window),
        _ => None,
    }
}

fn is_scroll_button(event: &Event) -> bool {
    matches!(event, Event::ButtonPress(e) | Event::ButtonRelease(e) if e.detail == 4 || e.detail == 5)
}

/// Resize op for a press at `(x, y)` relative to a frame, by thirds
fn resize_op_for_thirds(x: i32, y: i32, width: i32, height: i32) -> GrabOp {
    let third = |v: i32, size: i32| if size <= 0 { 1 } else { (v * 3 / size).clamp(0, 2) };
    match (third(y, height), third(x, width)) {
        (0, 0) => GrabOp::ResizingNw,
        (0, 1) => GrabOp::ResizingN,
        (0, 2) => GrabOp::ResizingNe,
        (1, 0) => GrabOp::ResizingW,
        (1, 2) => GrabOp::ResizingE,
        (2, 0) => GrabOp::ResizingSw,
        (2, 1) => GrabOp::ResizingS,
        (2, 2) => GrabOp::ResizingSe,
        _ => GrabOp::None,
    }
}

impl<C: XConn> Display<C> {
    /// Handle one event; returns true when it should not be processed further
    pub fn handle_event(&mut self, event: &Event, serial: u64) -> Result<bool> {
        self.time.current_time = event_time(event);
        let result = self.dispatch_event(event, serial);
        self.time.current_time = CURRENT_TIME;
        result
    }

    fn dispatch_event(&mut self, event: &Event, serial: u64) -> Result<bool> {
        self.reconcile_focus(serial)?;

        if is_scroll_button(event) {
            return Ok(false);
        }

        let no_focus_window = self.ungrab_should_not_cause_focus_window;
        match event {
            Event::UnmapNotify(e) if no_focus_window == Some(e.window) => {
                debug!("Events: ignoring serial {} for unmap of 0x{:x}", serial, e.window);
                self.add_ignored_serial(serial);
            }
            Event::LeaveNotify(e) if e.mode == NotifyMode::UNGRAB && no_focus_window == Some(e.event) => {
                debug!("Events: ignoring serial {} for ungrab leave of 0x{:x}", serial, e.event);
                self.add_ignored_serial(serial);
            }
            _ => {}
        }

        let modified = modified_window(event);
        let window = modified.and_then(|xid| self.lookup(xid));
        let frame_was_receiver = match (window, modified) {
            (Some(w), Some(xid)) => self
                .clients
                .get(&w)
                .and_then(|c| c.frame)
                .is_some_and(|f| f.xwindow == xid),
            _ => false,
        };
        if self.verbose {
            debug!(
                "Events: {:?} serial {} on {:?} (client {:?}, frame {})",
                std::mem::discriminant(event),
                serial,
                modified,
                window,
                frame_was_receiver
            );
        }

        match event {
            Event::SyncAlarmNotify(e) => {
                if self.sync_alarm_notify(e.alarm)? {
                    return Ok(true);
                }
            }
            Event::ShapeNotify(e) => {
                if let Some(w) = window.filter(|&w| w == e.affected_window) {
                    if let Some(client) = self.clients.get_mut(&w) {
                        client.has_shape = e.shaped;
                        debug!("Events: {} shaped = {}", client.desc(), e.shaped);
                        self.ui.apply_frame_shape(client);
                    }
                    return Ok(true);
                }
            }
            _ => {}
        }

        if let Some(w) = window {
            let press_time = match event {
                Event::KeyPress(e) => Some(e.time),
                Event::ButtonPress(e) => Some(e.time),
                _ => None,
            };
            if let Some(time) = press_time {
                if time == CURRENT_TIME {
                    warn!("Events: press on 0x{:x} without a timestamp", w);
                } else {
                    if let Some(client) = self.clients.get_mut(&w) {
                        client.net_wm_user_time = Some(time);
                    }
                    self.time.last_user_time = time;
                    self.sanity_check_timestamps(time);
                }
            }
        }

        let mut filter = false;
        match event {
            Event::KeyPress(e) | Event::KeyRelease(e) => {
                if self.grab.is_active() && self.grab.op.is_keyboard() {
                    let press = matches!(event, Event::KeyPress(_));
                    filter = self.handle_keyboard_grab_event(e, press)?;
                }
            }
            Event::ButtonPress(e) => self.handle_button_press(e, window, frame_was_receiver)?,
            Event::ButtonRelease(e) => {
                if self.pointer_event_belongs_to_grab(e.event, window) {
                    self.handle_mouse_grab_op_event(event)?;
                }
            }
            Event::MotionNotify(e) => {
                if self.pointer_event_belongs_to_grab(e.event, window) {
                    self.handle_mouse_grab_op_event(event)?;
                }
            }
            Event::EnterNotify(e) => {
                if self.grab.is_active() && self.grab.op.is_mouse() {
                    if self.pointer_event_belongs_to_grab(e.event, window) {
                        self.handle_mouse_grab_op_event(event)?;
                    }
                } else if let Some(w) = window {
                    self.handle_enter(w, e, serial)?;
                }
            }
            Event::LeaveNotify(e) => {
                if self.grab.is_active() && self.grab.op.is_mouse() {
                    if self.pointer_event_belongs_to_grab(e.event, window) {
                        self.handle_mouse_grab_op_event(event)?;
                    }
                } else if let Some(w) = window {
                    let unfocused_dock = self
                        .clients
                        .get(&w)
                        .is_some_and(|c| c.window_type == WindowType::Dock && !c.has_focus);
                    if unfocused_dock {
                        self.lower_window(w)?;
                    }
                }
            }
            Event::FocusIn(e) | Event::FocusOut(e) => {
                let focus_in = matches!(event, Event::FocusIn(_));
                if window.is_some() || e.event == self.screen.no_focus_window {
                    self.handle_window_focus_event(window, e, focus_in, serial)?;
                } else if focus_in && e.event == self.screen.root {
                    let reverted = e.detail == NotifyDetail::NONE
                        || (e.mode == NotifyMode::NORMAL && e.detail == NotifyDetail::INFERIOR);
                    if reverted {
                        debug!("Events: focus fell back to the root, focusing default window");
                        let now = self.now_roundtrip()?;
                        self.focus_default_window(now)?;
                    }
                }
            }
            Event::DestroyNotify(e) => {
                if let Some(w) = window.filter(|_| !frame_was_receiver) {
                    debug!("Events: 0x{:x} destroyed", e.window);
                    let now = self.now();
                    if self.grab.window == Some(w) {
                        self.end_grab_op(now)?;
                    }
                    self.unmanage_window(w, now)?;
                }
            }
            Event::UnmapNotify(e) => {
                // Only the parent's substructure copy counts
                if let Some(w) = window.filter(|_| !frame_was_receiver && e.event != e.window) {
                    self.handle_unmap(w)?;
                }
            }
            Event::MapRequest(e) => match window {
                None => {
                    self.manage_window(e.window)?;
                }
                Some(w) => {
                    if self.clients.get(&w).is_some_and(|c| c.is_minimized()) {
                        self.unminimize(w)?;
                    }
                }
            },
            Event::ConfigureRequest(e) => match window {
                None => self.configure_unmanaged(e)?,
                Some(w) if !frame_was_receiver => self.configure_request(w, e)?,
                Some(_) => {}
            },
            Event::PropertyNotify(e) => {
                if let Some(w) = window {
                    self.reload_property(w, e.atom, false)?;
                } else if e.window == self.screen.root && e.atom == self.atoms.areawm_sentinel {
                    self.decrement_focus_sentinel();
                }
            }
            Event::SelectionClear(e) => {
                self.time.current_time = CURRENT_TIME;
                if e.selection == self.wm_sn_atom {
                    info!("Events: another window manager took over, closing");
                    self.request_quit();
                }
            }
            Event::ClientMessage(e) => filter = self.handle_client_message(e)?,
            Event::MappingNotify(_) => self.conn.refresh_keyboard_mapping()?,
            Event::Error(err) => {
                warn!("Events: untrapped X error {:?}", err);
            }
            _ => {}
        }
        Ok(filter)
    }

    /// Whether a pointer event on `xwindow` goes to the active mouse op
    fn pointer_event_belongs_to_grab(&self, xwindow: Window, window: Option<Window>) -> bool {
        let op = self.grab.op;
        if !self.grab.is_active() || !(op.is_mouse() || op.is_clicking()) {
            return false;
        }
        xwindow == self.grab.xwindow
            || xwindow == self.screen.root
            || (window.is_some() && window == self.grab.window)
    }

    fn handle_button_press(&mut self, e: &ButtonPressEvent, window: Option<Window>, frame_was_receiver: bool) -> Result<()> {
        if self.grab.is_active() {
            let op = self.grab.op;
            let other_button = op.is_mouse_only() && self.grab.button != e.detail && window == self.grab.window;
            if other_button || op.is_keyboard() {
                if op.is_window_switch() && self.grab.window.is_none() {
                    if let Some(snapshot) = self.grab.old_stacking.take() {
                        self.stack.restore(&snapshot);
                        self.sync_stack()?;
                    }
                }
                debug!("Events: button {} ends {:?}", e.detail, op);
                self.end_grab_op(e.time)?;
            }
            return Ok(());
        }

        let Some(w) = window else {
            return Ok(());
        };
        let Some(client) = self.clients.get(&w) else {
            return Ok(());
        };

        let state = u16::from(e.state);
        let modmask = self.settings.mouse_button_mods.mask();
        let unmodified = modmask == 0 || state & modmask != modmask;
        let (resize_button, menu_button) = self.settings.resize_and_menu_buttons();
        let is_dock = client.window_type == WindowType::Dock;
        let outer = client.outer_rect();
        let resizable = client.is_resizable();

        if unmodified || e.detail == 1 {
            if self.settings.raise_on_click {
                self.raise_window(w)?;
            }
            if !is_dock && !frame_was_receiver {
                self.focus_client(w, e.time)?;
            }
        }

        let (root_x, root_y) = (i32::from(e.root_x), i32::from(e.root_y));
        if !unmodified {
            let op = if e.detail == 1 {
                GrabOp::Moving
            } else if e.detail == resize_button && resizable {
                resize_op_for_thirds(root_x - outer.x, root_y - outer.y, outer.width, outer.height)
            } else {
                GrabOp::None
            };

            if op != GrabOp::None {
                let mut req = GrabRequest::new(Some(w), op, e.time, root_x, root_y);
                req.button = e.detail;
                req.modmask = state;
                self.begin_grab_op(req)?;
            } else if e.detail == menu_button {
                self.ui.show_window_menu(w, root_x, root_y, e.detail, e.time);
            }
        }

        if unmodified && !frame_was_receiver {
            self.conn.allow_events(Allow::REPLAY_POINTER, e.time)?;
        }
        Ok(())
    }

    fn handle_enter(&mut self, window: Window, e: &EnterNotifyEvent, serial: u64) -> Result<()> {
        let Some(client) = self.clients.get(&window) else {
            return Ok(());
        };
        let window_type = client.window_type;

        let focus_follows_mouse = self.settings.focus_mode != FocusMode::Click;
        let eligible = !self.serial_is_ignored(serial)
            && e.mode != NotifyMode::GRAB
            && e.mode != NotifyMode::UNGRAB
            && e.detail != NotifyDetail::INFERIOR
            && self.focus_sentinel_clear()
            && window_type != WindowType::Desktop;
        if focus_follows_mouse && eligible {
            if self.verbose {
                debug!("Events: focusing 0x{:x} on enter", window);
            }
            self.focus_client(window, e.time)?;
            self.reset_ignores();
            self.mouse_mode = true;
            if self.settings.auto_raise {
                self.queue_autoraise(window);
            }
        }

        if window_type == WindowType::Dock {
            self.raise_window(window)?;
        }
        Ok(())
    }

    fn handle_unmap(&mut self, window: Window) -> Result<()> {
        let Some(minimized) = self.clients.get(&window).map(|c| c.is_minimized()) else {
            return Ok(());
        };
        let now = self.now();
        if self.grab.window == Some(window) && !minimized {
            self.end_grab_op(now)?;
        }
        let Some(client) = self.clients.get_mut(&window) else {
            return Ok(());
        };
        if client.unmaps_pending > 0 {
            client.unmaps_pending -= 1;
            debug!("Events: expected unmap of {}, {} left", client.desc(), client.unmaps_pending);
            return Ok(());
        }
        debug!("Events: 0x{:x} withdrawn", window);
        self.unmanage_window(window, now)
    }

    /// Pass a configure request from a window we do not manage straight through
    fn configure_unmanaged(&mut self, e: &ConfigureRequestEvent) -> Result<()> {
        let mask = e.value_mask;
        let mut aux = ConfigureWindowAux::new();
        if mask.contains(ConfigWindow::X) {
            aux = aux.x(i32::from(e.x));
        }
        if mask.contains(ConfigWindow::Y) {
            aux = aux.y(i32::from(e.y));
        }
        if mask.contains(ConfigWindow::WIDTH) {
            aux = aux.width(u32::from(e.width));
        }
        if mask.contains(ConfigWindow::HEIGHT) {
            aux = aux.height(u32::from(e.height));
        }
        if mask.contains(ConfigWindow::BORDER_WIDTH) {
            aux = aux.border_width(u32::from(e.border_width));
        }
        if mask.contains(ConfigWindow::SIBLING) {
            aux = aux.sibling(e.sibling);
        }
        if mask.contains(ConfigWindow::STACK_MODE) {
            aux = aux.stack_mode(e.stack_mode);
        }

        let trap = ErrorTrap::new(&self.conn);
        self.conn.configure_window(e.window, &aux)?;
        if let Err(err) = trap.finish() {
            debug!("Events: configure of unmanaged 0x{:x} failed ({:?})", e.window, err);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wm::testing::{
        button_press, configure_request_event, crossing_event, property_notify, test_display, unmap_notify, Request,
        ROOT,
    };
    use crate::shared::Geometry;
    use crate::wm::client::client_event_mask;
    use x11rb::protocol::xproto::{EventMask, KeyButMask};

    #[test]
    fn test_scroll_buttons_are_ignored() {
        let mut display = test_display();
        let window = display.add_test_client(0x400001);
        display.conn.clear();
        let filtered = display
            .handle_event(&button_press(window, 4, 0, 150, 150, 1000), 10)
            .unwrap();
        assert!(!filtered);
        assert!(display.conn.requests().is_empty());
        assert_eq!(display.clients[&window].net_wm_user_time, None);
    }

    #[test]
    fn test_press_records_user_time_and_resets_current_time() {
        let mut display = test_display();
        let window = display.add_test_client(0x400001);
        display
            .handle_event(&button_press(window, 1, 0, 150, 150, 1000), 10)
            .unwrap();
        assert_eq!(display.clients[&window].net_wm_user_time, Some(1000));
        assert_eq!(display.time.last_user_time, 1000);
        assert_eq!(display.time.current_time, CURRENT_TIME);
        assert_eq!(display.focus.expected_focus_window, Some(window));
        assert!(display
            .conn
            .requests()
            .iter()
            .any(|r| matches!(r, Request::AllowEvents { .. })));
    }

    #[test]
    fn test_modified_button1_begins_move() {
        let mut display = test_display();
        let window = display.add_test_client(0x400001);
        let mods = u16::from(KeyButMask::MOD1);
        display
            .handle_event(&button_press(window, 1, mods, 150, 150, 1000), 10)
            .unwrap();
        assert_eq!(display.grab.op, GrabOp::Moving);
        assert_eq!(display.grab.window, Some(window));
    }

    #[test]
    fn test_modified_resize_button_uses_thirds() {
        let mut display = test_display();
        let window = display.add_test_client(0x400001);
        let outer = display.clients[&window].outer_rect();
        let mods = u16::from(KeyButMask::MOD1);
        let (x, y) = (outer.right() - 2, outer.bottom() - 2);
        display
            .handle_event(&button_press(window, 2, mods, x as i16, y as i16, 1000), 10)
            .unwrap();
        assert_eq!(display.grab.op, GrabOp::ResizingSe);
    }

    #[test]
    fn test_thirds_centre_is_none() {
        assert_eq!(resize_op_for_thirds(50, 50, 90, 90), GrabOp::None);
        assert_eq!(resize_op_for_thirds(0, 45, 90, 90), GrabOp::ResizingW);
        assert_eq!(resize_op_for_thirds(89, 0, 90, 90), GrabOp::ResizingNe);
    }

    #[test]
    fn test_pending_unmap_is_consumed() {
        let mut display = test_display();
        let window = display.add_test_client(0x400001);
        display.clients.get_mut(&window).unwrap().unmaps_pending = 1;
        display.handle_event(&unmap_notify(ROOT, window), 10).unwrap();
        assert_eq!(display.clients[&window].unmaps_pending, 0);

        display.handle_event(&unmap_notify(ROOT, window), 11).unwrap();
        assert!(!display.clients.contains_key(&window));
    }

    #[test]
    fn test_expected_unmap_still_ends_grab() {
        let mut display = test_display();
        let window = display.add_test_client(0x400001);
        let req = GrabRequest::new(Some(window), GrabOp::KeyboardMoving, 10, 100, 100);
        assert!(display.begin_grab_op(req).unwrap());
        display.clients.get_mut(&window).unwrap().unmaps_pending = 1;

        display.handle_event(&unmap_notify(ROOT, window), 20).unwrap();
        assert!(!display.grab.is_active());
        assert!(display.clients.contains_key(&window));
        assert_eq!(display.clients[&window].unmaps_pending, 0);
    }

    #[test]
    fn test_adopted_window_survives_reparent_unmap() {
        let mut display = test_display();
        display.conn.add_window(0x400001, Geometry::new(100, 100, 300, 200), true);
        let window = display.manage_window(0x400001).unwrap().unwrap();
        assert!(!client_event_mask().contains(EventMask::STRUCTURE_NOTIFY));

        // The reparent unmap as seen by the client itself and by the root
        display.handle_event(&unmap_notify(window, window), 10).unwrap();
        display.handle_event(&unmap_notify(ROOT, window), 10).unwrap();
        assert!(display.clients.contains_key(&window));
        assert_eq!(display.clients[&window].unmaps_pending, 0);
    }

    #[test]
    fn test_unknown_configure_request_passes_through() {
        let mut display = test_display();
        let mask = ConfigWindow::WIDTH | ConfigWindow::HEIGHT;
        let event = configure_request_event(0x700001, mask, 5, 5, 320, 200);
        display.handle_event(&Event::ConfigureRequest(event), 10).unwrap();
        assert!(display.conn.requests().iter().any(|r| matches!(
            r,
            Request::ConfigureWindow { window: 0x700001, x: None, y: None, width: Some(320), height: Some(200), .. }
        )));
        assert_eq!(display.conn.open_traps(), 0);
    }

    #[test]
    fn test_enter_focuses_under_sloppy_mode() {
        let mut display = test_display();
        display.settings.focus_mode = FocusMode::Sloppy;
        let window = display.add_test_client(0x400001);
        let enter = crossing_event(window, true, NotifyMode::NORMAL, NotifyDetail::NONLINEAR, 1000);
        display.handle_event(&enter, 20).unwrap();
        assert_eq!(display.focus.expected_focus_window, Some(window));
        assert!(display.mouse_mode);
    }

    #[test]
    fn test_enter_with_ignored_serial_does_not_focus() {
        let mut display = test_display();
        display.settings.focus_mode = FocusMode::Sloppy;
        let window = display.add_test_client(0x400001);
        display.add_ignored_serial(20);
        let enter = crossing_event(window, true, NotifyMode::NORMAL, NotifyDetail::NONLINEAR, 1000);
        display.handle_event(&enter, 20).unwrap();
        assert_eq!(display.focus.expected_focus_window, None);
    }

    #[test]
    fn test_enter_under_click_mode_does_nothing() {
        let mut display = test_display();
        let window = display.add_test_client(0x400001);
        let enter = crossing_event(window, true, NotifyMode::NORMAL, NotifyDetail::NONLINEAR, 1000);
        display.handle_event(&enter, 20).unwrap();
        assert_eq!(display.focus.expected_focus_window, None);
    }

    #[test]
    fn test_ungrab_leave_is_ignored_later() {
        let mut display = test_display();
        let window = display.add_test_client(0x400001);
        let frame = display.clients[&window].frame.unwrap().xwindow;
        display.ungrab_should_not_cause_focus_window = Some(frame);
        let leave = crossing_event(frame, false, NotifyMode::UNGRAB, NotifyDetail::NONLINEAR, 1000);
        display.handle_event(&leave, 30).unwrap();
        assert!(display.serial_is_ignored(30));
    }

    #[test]
    fn test_sentinel_property_decrements() {
        let mut display = test_display();
        display.settings.focus_mode = FocusMode::Sloppy;
        display.increment_focus_sentinel().unwrap();
        assert!(!display.focus_sentinel_clear());
        let root = display.screen.root;
        let atom = display.atoms.areawm_sentinel;
        display.handle_event(&property_notify(root, atom, 500), 10).unwrap();
        assert!(display.focus_sentinel_clear());
    }

    #[test]
    fn test_event_time_only_for_timed_events() {
        let press = button_press(1, 1, 0, 0, 0, 77);
        assert_eq!(event_time(&press), 77);
        assert_eq!(event_time(&unmap_notify(ROOT, 1)), CURRENT_TIME);
        assert_eq!(modified_window(&unmap_notify(ROOT, 5)), Some(5));
    }
}
