//! Focus Module
//!
//! Tracks which window we believe has focus, which window the server says
//! has focus, and reconciles the two using request serials. Every focus
//! change we make goes through [`Display::request_focus`].

use std::collections::VecDeque;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, warn};
use x11rb::protocol::xproto::{AtomEnum, EventMask, FocusInEvent, NotifyDetail, NotifyMode, Window};

use crate::wm::client_flags::{ClientFlags, WmFlags};
use crate::wm::conn::XConn;
use crate::wm::display::Display;
use crate::wm::error_trap::ErrorTrap;
use crate::wm::timers::{TimerId, TimerKind};
use crate::wm::timestamp::Timestamp;

/// Focus bookkeeping
#[derive(Debug, Default)]
pub struct FocusState {
    /// Client we believe has focus
    pub focus_window: Option<Window>,

    /// Client we last asked to take focus
    pub expected_focus_window: Option<Window>,

    pub previously_focused_window: Option<Window>,

    /// X window the server last reported as focused
    pub server_focus_window: Option<Window>,
    pub server_focus_serial: u64,

    /// Serial of the request or event behind `focus_window`
    pub focus_serial: u64,

    /// `focus_window` came from our own SetInputFocus
    pub focused_by_us: bool,

    /// Most recently focused first
    history: VecDeque<Window>,
}

impl FocusState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recently focused first
    pub fn history(&self) -> impl Iterator<Item = Window> + '_ {
        self.history.iter().copied()
    }

    fn push_front(&mut self, window: Window) {
        self.history.retain(|w| *w != window);
        self.history.push_front(window);
    }

    /// Drop every reference to a window that is going away
    pub fn forget_window(&mut self, window: Window) {
        self.history.retain(|w| *w != window);
        if self.expected_focus_window == Some(window) {
            self.expected_focus_window = None;
        }
        if self.previously_focused_window == Some(window) {
            self.previously_focused_window = None;
        }
    }
}

impl<C: XConn> Display<C> {
    /// Set the input focus to `xwindow` if `timestamp` is not stale
    ///
    /// The SetInputFocus and the `_AREAWM_FOCUS_SET` marker are issued under a
    /// server grab so nothing can slip in between them.
    pub fn request_focus(&mut self, xwindow: Window, timestamp: Timestamp) -> Result<()> {
        let mut timestamp = timestamp;
        if self.is_too_old(&mut timestamp)? {
            debug!("Focus: not focusing 0x{:x}, timestamp {} is too old", xwindow, timestamp);
            return Ok(());
        }

        let serial = {
            let _trap = ErrorTrap::new(&self.conn);
            self.grab_server()?;
            let focused = self.conn.set_input_focus(xwindow, timestamp).and_then(|serial| {
                self.conn.append_empty_property(
                    self.screen.timestamp_window,
                    self.atoms.areawm_focus_set,
                    AtomEnum::STRING.into(),
                )?;
                Ok(serial)
            });
            // Released before any error propagates
            self.ungrab_server()?;
            focused?
        };

        let owner = self.lookup(xwindow);
        self.update_focus_window(owner, serial, true)?;
        self.time.last_focus_time = timestamp;

        if let Some((raise_window, timer)) = self.autoraise {
            if owner != Some(raise_window) {
                self.timers.cancel(timer);
                self.autoraise = None;
            }
        }
        Ok(())
    }

    /// Record a new focus window
    pub fn update_focus_window(&mut self, window: Option<Window>, serial: u64, focused_by_us: bool) -> Result<()> {
        self.focus.focus_serial = serial;
        self.focus.focused_by_us = focused_by_us;

        if self.focus.focus_window == window {
            return Ok(());
        }

        let previous = self.focus.focus_window.take();
        if let Some(prev) = previous {
            if let Some(client) = self.clients.get_mut(&prev) {
                debug!("Focus: {} loses focus", client.desc());
                client.has_focus = false;
            }
            self.focus.previously_focused_window = Some(prev);
        }

        self.focus.focus_window = window;
        match window.and_then(|w| self.clients.get_mut(&w)) {
            Some(client) => {
                debug!("Focus: {} has focus (serial {})", client.desc(), serial);
                client.has_focus = true;
                let w = client.window;
                self.focus.push_front(w);
            }
            None => debug!("Focus: nothing has focus (serial {})", serial),
        }

        // Fullscreen windows only sit above docks while focused
        if let Some(prev) = previous {
            self.update_layer(prev)?;
        }
        if let Some(w) = window {
            self.update_layer(w)?;
        }

        if !self.is_closing() {
            self.atoms.update_active_window(&self.conn, self.screen.root, window)?;
        }
        Ok(())
    }

    /// FocusIn/FocusOut on a managed window or its frame
    pub fn handle_window_focus_event(
        &mut self,
        window: Option<Window>,
        event: &FocusInEvent,
        focus_in: bool,
        serial: u64,
    ) -> Result<()> {
        if event.mode == NotifyMode::GRAB || event.mode == NotifyMode::UNGRAB {
            return Ok(());
        }
        if u8::from(event.detail) > u8::from(NotifyDetail::NONLINEAR_VIRTUAL) {
            return Ok(());
        }

        let new_focus = if focus_in {
            self.focus.server_focus_window = Some(event.event);
            self.focus.server_focus_serial = serial;
            window
        } else {
            if event.detail == NotifyDetail::INFERIOR {
                return Ok(());
            }
            self.focus.server_focus_window = None;
            self.focus.server_focus_serial = serial;
            None
        };

        if self.verbose {
            debug!(
                "Focus: server says {:?} (serial {}, ours {} by_us={})",
                self.focus.server_focus_window, serial, self.focus.focus_serial, self.focus.focused_by_us
            );
        }

        if self.focus.server_focus_serial > self.focus.focus_serial
            || (!self.focus.focused_by_us && self.focus.server_focus_serial == self.focus.focus_serial)
        {
            let serial = self.focus.server_focus_serial;
            self.update_focus_window(new_focus, serial, false)?;
        }
        Ok(())
    }

    /// Catch focus requests that silently failed
    pub fn reconcile_focus(&mut self, serial: u64) -> Result<()> {
        if !self.focus.focused_by_us || serial <= self.focus.focus_serial {
            return Ok(());
        }
        let Some(focus) = self.focus.focus_window else {
            return Ok(());
        };
        let server = self.focus.server_focus_window.and_then(|w| self.lookup(w));
        if server != Some(focus) {
            warn!(
                "Focus: 0x{:x} should have focus but server has {:?}, resyncing",
                focus, self.focus.server_focus_window
            );
            let serial = self.focus.server_focus_serial;
            self.update_focus_window(server, serial, false)?;
        }
        Ok(())
    }

    /// Give focus to a client using whatever its input model allows
    pub fn focus_client(&mut self, window: Window, timestamp: Timestamp) -> Result<()> {
        if self.grab.is_active() && self.grab.op.is_keyboard() && self.grab.window.is_some_and(|w| w != window) {
            debug!("Focus: keyboard grab on {:?}, not focusing 0x{:x}", self.grab.window, window);
            return Ok(());
        }

        // A mapped modal transient takes focus instead of its parent
        let modal = self
            .clients
            .values()
            .find(|c| c.transient_for == Some(window) && c.state.contains(ClientFlags::MODAL) && c.mapped)
            .map(|c| c.window);
        let window = modal.unwrap_or(window);

        let Some(client) = self.clients.get(&window) else {
            debug!("Focus: 0x{:x} is not managed", window);
            return Ok(());
        };
        debug!("Focus: focusing {} at {}", client.desc(), timestamp);

        let takes_focus = client.wm_flags.contains(WmFlags::TAKEFOCUS);
        let input = client.accepts_input();
        let frame = client.frame.map(|f| f.xwindow);
        let shaded = client.is_shaded();
        let demands_attention = client.state.contains(ClientFlags::DEMANDS_ATTENTION);

        self.focus.expected_focus_window = Some(window);
        match frame {
            Some(frame) if shaded || !(input || takes_focus) => {
                self.request_focus(frame, timestamp)?;
            }
            _ => {
                if input {
                    self.request_focus(window, timestamp)?;
                }
                if takes_focus {
                    self.request_take_focus(window, timestamp)?;
                }
            }
        }

        if demands_attention {
            if let Some(client) = self.clients.get_mut(&window) {
                client.state.remove(ClientFlags::DEMANDS_ATTENTION);
            }
            self.set_net_wm_state(window)?;
        }
        Ok(())
    }

    /// Send `WM_TAKE_FOCUS` unless `timestamp` is stale
    pub fn request_take_focus(&mut self, window: Window, timestamp: Timestamp) -> Result<()> {
        let mut timestamp = timestamp;
        if self.is_too_old(&mut timestamp)? {
            debug!("Focus: not sending WM_TAKE_FOCUS to 0x{:x}, timestamp too old", window);
            return Ok(());
        }
        let input = self.clients.get(&window).is_some_and(|c| c.accepts_input());
        if !input {
            // Globally active clients get focus from us only indirectly
            self.focus_no_focus_window(timestamp)?;
        }
        self.conn.send_client_message(
            window,
            window,
            self.atoms.wm_protocols,
            [self.atoms.wm_take_focus, timestamp, 0, 0, 0],
            EventMask::NO_EVENT,
        )?;
        self.time.last_focus_time = timestamp;
        Ok(())
    }

    /// Park focus on our own input-only window
    pub fn focus_no_focus_window(&mut self, timestamp: Timestamp) -> Result<()> {
        let window = self.screen.no_focus_window;
        self.request_focus(window, timestamp)
    }

    /// Focus the most recently used window on the active workspace
    pub fn focus_default_window(&mut self, timestamp: Timestamp) -> Result<()> {
        let active = self.workspaces.active();
        let candidate = self.focus.history().find(|w| {
            self.clients.get(w).is_some_and(|c| {
                !c.unmanaging
                    && c.mapped
                    && !c.is_minimized()
                    && !c.is_dock_or_desktop()
                    && (c.is_sticky() || c.workspace == active)
            })
        });
        // Windows never focused yet still count, topmost first
        let candidate = candidate.or_else(|| {
            self.stack.order().into_iter().rev().find(|w| {
                self.clients.get(w).is_some_and(|c| {
                    !c.unmanaging
                        && c.mapped
                        && !c.is_dock_or_desktop()
                        && (c.is_sticky() || c.workspace == active)
                })
            })
        });

        match candidate {
            Some(window) => {
                debug!("Focus: default window is 0x{:x}", window);
                self.focus_client(window, timestamp)
            }
            None => {
                debug!("Focus: no default window, focusing no-focus window");
                self.focus_no_focus_window(timestamp)
            }
        }
    }

    /// Raise `window` after the auto-raise delay if it keeps focus
    pub fn queue_autoraise(&mut self, window: Window) {
        if let Some((_, timer)) = self.autoraise.take() {
            self.timers.cancel(timer);
        }
        let delay = Duration::from_millis(self.settings.auto_raise_delay_ms);
        let timer = self.add_timer(delay, TimerKind::AutoRaise { window });
        self.autoraise = Some((window, timer));
    }

    pub(crate) fn cancel_autoraise_for(&mut self, window: Window) {
        if let Some((w, timer)) = self.autoraise {
            if w == window {
                self.timers.cancel(timer);
                self.autoraise = None;
            }
        }
    }

    pub(crate) fn autoraise_fired(&mut self, timer: TimerId, window: Window) -> Result<()> {
        if self.autoraise.map(|(_, t)| t) != Some(timer) {
            return Ok(());
        }
        self.autoraise = None;
        if self.focus.focus_window == Some(window) {
            debug!("Focus: auto-raising 0x{:x}", window);
            self.raise_window(window)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wm::testing::{focus_event, test_display, Request};

    #[test]
    fn test_request_focus_sequence() {
        let mut display = test_display();
        let window = display.add_test_client(0x400001);
        display.request_focus(window, 100).unwrap();

        let requests = display.conn.requests();
        let grab = requests.iter().position(|r| matches!(r, Request::GrabServer)).unwrap();
        let set = requests
            .iter()
            .position(|r| matches!(r, Request::SetInputFocus { window: w, .. } if *w == window))
            .unwrap();
        let marker = requests
            .iter()
            .position(|r| matches!(r, Request::AppendEmptyProperty { .. }))
            .unwrap();
        let ungrab = requests.iter().position(|r| matches!(r, Request::UngrabServer)).unwrap();
        assert!(grab < set && set < marker && marker < ungrab);

        assert_eq!(display.focus.focus_window, Some(window));
        assert!(display.focus.focused_by_us);
        assert_eq!(display.time.last_focus_time, 100);
        assert!(display.clients[&window].has_focus);
    }

    #[test]
    fn test_stale_request_focus_issues_nothing() {
        let mut display = test_display();
        let window = display.add_test_client(0x400001);
        display.time.last_focus_time = 1000;
        display.time.last_user_time = 1000;
        display.request_focus(window, 500).unwrap();
        assert!(display.conn.requests().is_empty());
        assert_eq!(display.focus.focus_window, None);
    }

    #[test]
    fn test_failed_focus_request_releases_server() {
        let mut display = test_display();
        let window = display.add_test_client(0x400001);
        display.conn.fail_requests(|r| matches!(r, Request::SetInputFocus { .. }));
        assert!(display.request_focus(window, 100).is_err());
        assert_eq!(display.server_grab_count(), 0);
        assert_eq!(display.conn.count(|r| matches!(r, Request::UngrabServer)), 1);
        assert_eq!(display.focus.focus_window, None);
    }

    #[test]
    fn test_grab_mode_focus_events_ignored() {
        let mut display = test_display();
        let window = display.add_test_client(0x400001);
        let event = focus_event(window, NotifyMode::GRAB, NotifyDetail::NONLINEAR);
        display.handle_window_focus_event(Some(window), &event, true, 50).unwrap();
        let event = focus_event(window, NotifyMode::UNGRAB, NotifyDetail::NONLINEAR);
        display.handle_window_focus_event(Some(window), &event, true, 51).unwrap();
        assert_eq!(display.focus.server_focus_window, None);
        assert_eq!(display.focus.focus_window, None);
    }

    #[test]
    fn test_focus_in_from_elsewhere_is_applied() {
        let mut display = test_display();
        let window = display.add_test_client(0x400001);
        let event = focus_event(window, NotifyMode::NORMAL, NotifyDetail::NONLINEAR);
        display.handle_window_focus_event(Some(window), &event, true, 10).unwrap();
        assert_eq!(display.focus.focus_window, Some(window));
        assert!(!display.focus.focused_by_us);

        // FocusOut to an inferior does not clear it
        let event = focus_event(window, NotifyMode::NORMAL, NotifyDetail::INFERIOR);
        display.handle_window_focus_event(Some(window), &event, false, 11).unwrap();
        assert_eq!(display.focus.focus_window, Some(window));

        let event = focus_event(window, NotifyMode::NORMAL, NotifyDetail::NONLINEAR);
        display.handle_window_focus_event(Some(window), &event, false, 12).unwrap();
        assert_eq!(display.focus.focus_window, None);
    }

    #[test]
    fn test_older_focus_event_does_not_override_request() {
        let mut display = test_display();
        let a = display.add_test_client(0x400001);
        let b = display.add_test_client(0x400002);
        display.conn.set_next_serial(100);
        display.request_focus(b, 10).unwrap();
        let event = focus_event(a, NotifyMode::NORMAL, NotifyDetail::NONLINEAR);
        display.handle_window_focus_event(Some(a), &event, true, 90).unwrap();
        assert_eq!(display.focus.focus_window, Some(b));
    }

    #[test]
    fn test_reconcile_resyncs_failed_request() {
        let mut display = test_display();
        let a = display.add_test_client(0x400001);
        let b = display.add_test_client(0x400002);
        let event = focus_event(a, NotifyMode::NORMAL, NotifyDetail::NONLINEAR);
        display.handle_window_focus_event(Some(a), &event, true, 5).unwrap();

        display.conn.set_next_serial(100);
        display.request_focus(b, 10).unwrap();
        display.reconcile_focus(150).unwrap();
        assert_eq!(display.focus.focus_window, Some(a));
        assert!(!display.focus.focused_by_us);
    }

    #[test]
    fn test_default_window_skips_docks() {
        let mut display = test_display();
        let dock = display.add_test_client(0x400001);
        display.clients.get_mut(&dock).unwrap().window_type = crate::wm::client_flags::WindowType::Dock;
        display.focus_default_window(100).unwrap();
        assert_eq!(display.focus.focus_window, None);
        assert!(display.conn.requests().iter().any(|r| matches!(
            r,
            Request::SetInputFocus { window, .. } if *window == display.screen.no_focus_window
        )));
    }

    #[test]
    fn test_take_focus_message() {
        let mut display = test_display();
        let window = display.add_test_client(0x400001);
        let client = display.clients.get_mut(&window).unwrap();
        client.wm_flags = WmFlags::TAKEFOCUS;
        display.focus_client(window, 100).unwrap();
        let take_focus = display.atoms.wm_take_focus;
        assert!(display.conn.requests().iter().any(|r| matches!(
            r,
            Request::SendClientMessage { data, .. } if data[0] == take_focus
        )));
        assert_eq!(display.focus.expected_focus_window, Some(window));
    }

    #[test]
    fn test_autoraise_only_when_still_focused() {
        let mut display = test_display();
        let a = display.add_test_client(0x400001);
        let b = display.add_test_client(0x400002);
        display.focus_client(a, 100).unwrap();
        display.queue_autoraise(a);
        display.focus_client(b, 200).unwrap();
        assert!(display.autoraise.is_none());
        assert!(display.timers.is_empty());
    }
}
