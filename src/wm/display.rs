//! Display Module
//!
//! The per-process window manager context: connection, atoms, extension
//! capabilities, managed windows and every piece of global state the
//! handlers share. Handlers are `impl Display` blocks spread over the
//! `wm` modules.

use std::cell::Cell;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::{debug, info, warn};
use x11rb::protocol::xproto::{Atom, AtomEnum, Window};

use crate::wm::client::Client;
use crate::wm::conn::XConn;
use crate::wm::error::WmError;
use crate::wm::ewmh::Atoms;
use crate::wm::focus::FocusState;
use crate::wm::grab::GrabState;
use crate::wm::ping::PendingPing;
use crate::wm::screen::ScreenInfo;
use crate::wm::settings::WindowManagerSettings;
use crate::wm::stacking::StackingManager;
use crate::wm::timers::{Clock, TimerId, TimerKind, TimerQueue};
use crate::wm::timestamp::TimeState;
use crate::wm::ui::WmUi;
use crate::wm::workspace::WorkspaceManager;

/// Size of the ignored-serial ring
pub const N_IGNORED_SERIALS: usize = 4;

/// X11 extension availability
#[derive(Debug, Clone, Default)]
pub struct Extensions {
    pub have_shape: bool,
    pub have_render: bool,
    pub have_xrandr: bool,
    pub have_xsync: bool,
    pub have_composite: bool,
    pub have_damage: bool,
    pub have_fixes: bool,
}

/// Display - the window manager context
pub struct Display<C: XConn> {
    /// X11 connection
    pub conn: C,

    /// All EWMH/ICCCM atoms
    pub atoms: Atoms,

    /// WM_S<screen> selection we own
    pub wm_sn_atom: Atom,

    /// X11 extension information
    pub extensions: Extensions,

    pub screen: ScreenInfo,

    pub settings: WindowManagerSettings,

    /// Managed windows by client window id
    pub clients: HashMap<Window, Client>,

    /// Any X id we created or watch (frame, user-time window) -> client
    xids: HashMap<Window, Window>,

    pub time: TimeState,
    pub focus: FocusState,
    pub grab: GrabState,

    pub(crate) pings: Vec<PendingPing<C>>,
    pub timers: TimerQueue,

    ignored_serials: [u64; N_IGNORED_SERIALS],
    pub(crate) ungrab_should_not_cause_focus_window: Option<Window>,

    sentinel_counter: u32,
    pub(crate) autoraise: Option<(Window, TimerId)>,

    server_grab_count: Cell<u32>,
    closing: bool,
    quit_requested: bool,
    restart_requested: bool,

    pub stack: StackingManager,
    pub workspaces: WorkspaceManager,
    pub ui: Box<dyn WmUi>,
    clock: Box<dyn Clock>,

    /// Chatty per-event logging
    pub verbose: bool,

    /// Focus last changed because the pointer entered a window
    pub mouse_mode: bool,

    pub showing_desktop: bool,
}

impl<C: XConn> Display<C> {
    /// Assemble a display around an already set-up connection
    pub fn with_connection(
        conn: C,
        atoms: Atoms,
        wm_sn_atom: Atom,
        extensions: Extensions,
        screen: ScreenInfo,
        settings: WindowManagerSettings,
        ui: Box<dyn WmUi>,
        clock: Box<dyn Clock>,
    ) -> Self {
        let workspaces = WorkspaceManager::new(settings.workspace_count);
        Self {
            conn,
            atoms,
            wm_sn_atom,
            extensions,
            screen,
            settings,
            clients: HashMap::new(),
            xids: HashMap::new(),
            time: TimeState::default(),
            focus: FocusState::new(),
            grab: GrabState::default(),
            pings: Vec::new(),
            timers: TimerQueue::new(),
            ignored_serials: [0; N_IGNORED_SERIALS],
            ungrab_should_not_cause_focus_window: None,
            sentinel_counter: 0,
            autoraise: None,
            server_grab_count: Cell::new(0),
            closing: false,
            quit_requested: false,
            restart_requested: false,
            stack: StackingManager::new(),
            workspaces,
            ui,
            clock,
            verbose: false,
            mouse_mode: false,
            showing_desktop: false,
        }
    }

    /// Publish root properties after the connection is set up
    pub fn init_root_properties(&mut self) -> Result<()> {
        let root = self.screen.root;
        let check = self.screen.timestamp_window;
        self.atoms.setup_supported(&self.conn, root)?;
        self.conn
            .change_property32(root, self.atoms.net_supporting_wm_check, AtomEnum::WINDOW.into(), &[check])?;
        self.conn
            .change_property32(check, self.atoms.net_supporting_wm_check, AtomEnum::WINDOW.into(), &[check])?;
        self.conn
            .change_property8(check, self.atoms.net_wm_name, self.atoms.utf8_string, b"areawm")?;
        self.update_desktop_properties()?;
        self.atoms
            .update_workarea(&self.conn, root, &self.screen.work_area, self.workspaces.count())?;
        self.atoms.update_active_window(&self.conn, root, None)?;
        self.conn.flush()
    }

    /// Tear the display down: unmanage everything and release the root
    ///
    /// Closing twice is a programming error.
    pub fn close(&mut self, timestamp: u32) -> Result<()> {
        if self.closing {
            return Err(WmError::AlreadyClosing.into());
        }
        self.closing = true;
        info!("Display: closing");

        self.end_grab_op(timestamp)?;

        let windows: Vec<Window> = self.stack.order().iter().rev().copied().collect();
        for window in windows {
            self.unmanage_window(window, timestamp)?;
        }

        let root = self.screen.root;
        self.conn.delete_property(root, self.atoms.net_supporting_wm_check)?;
        self.conn.set_input_focus(x11rb::protocol::xproto::InputFocus::POINTER_ROOT.into(), timestamp)?;
        self.conn.flush()
    }

    pub fn is_closing(&self) -> bool {
        self.closing
    }

    /// Ask the main loop to close the display after the current event
    pub(crate) fn request_quit(&mut self) {
        self.quit_requested = true;
    }

    /// Quit, and have the binary start itself again
    pub(crate) fn request_restart(&mut self) {
        self.quit_requested = true;
        self.restart_requested = true;
    }

    pub fn quit_requested(&self) -> bool {
        self.quit_requested
    }

    pub fn restart_requested(&self) -> bool {
        self.restart_requested
    }

    /// Client that owns an X id (client window, frame, user-time window)
    pub fn lookup(&self, xid: Window) -> Option<Window> {
        if self.clients.contains_key(&xid) {
            Some(xid)
        } else {
            self.xids.get(&xid).copied()
        }
    }

    pub(crate) fn register_xid(&mut self, xid: Window, owner: Window) {
        self.xids.insert(xid, owner);
    }

    pub(crate) fn unregister_xid(&mut self, xid: Window) {
        self.xids.remove(&xid);
    }

    pub fn client(&self, window: Window) -> Option<&Client> {
        self.clients.get(&window)
    }

    pub fn client_mut(&mut self, window: Window) -> Option<&mut Client> {
        self.clients.get_mut(&window)
    }

    /// Remember that crossing events with this serial must not move focus
    pub fn add_ignored_serial(&mut self, serial: u64) {
        if self.ignored_serials[N_IGNORED_SERIALS - 1] == serial {
            return;
        }
        self.ignored_serials.rotate_left(1);
        self.ignored_serials[N_IGNORED_SERIALS - 1] = serial;
    }

    pub fn serial_is_ignored(&self, serial: u64) -> bool {
        self.ignored_serials.contains(&serial)
    }

    /// Forget ignored serials and the pending "ungrab should not cause focus" window
    pub fn reset_ignores(&mut self) {
        self.ignored_serials = [0; N_IGNORED_SERIALS];
        self.ungrab_should_not_cause_focus_window = None;
    }

    pub fn ignored_serials(&self) -> &[u64; N_IGNORED_SERIALS] {
        &self.ignored_serials
    }

    /// Write the sentinel property; crossing events are ignored until it comes back
    pub fn increment_focus_sentinel(&mut self) -> Result<()> {
        let data = [self.time.current_time];
        self.conn.change_property32(
            self.screen.root,
            self.atoms.areawm_sentinel,
            AtomEnum::CARDINAL.into(),
            &data,
        )?;
        self.sentinel_counter += 1;
        Ok(())
    }

    pub fn decrement_focus_sentinel(&mut self) {
        if self.sentinel_counter == 0 {
            warn!("Focus: sentinel counter underflow");
            return;
        }
        self.sentinel_counter -= 1;
    }

    pub fn focus_sentinel_clear(&self) -> bool {
        self.sentinel_counter == 0
    }

    /// Reference-counted server grab
    pub fn grab_server(&self) -> Result<()> {
        let count = self.server_grab_count.get();
        if count == 0 {
            self.conn.grab_server()?;
        }
        self.server_grab_count.set(count + 1);
        Ok(())
    }

    /// Release one level of server grab, flushing when the last one goes
    pub fn ungrab_server(&self) -> Result<()> {
        let count = self.server_grab_count.get();
        if count == 0 {
            return Err(WmError::UngrabWithoutGrab.into());
        }
        self.server_grab_count.set(count - 1);
        if count == 1 {
            self.conn.ungrab_server()?;
            self.conn.flush()?;
        }
        Ok(())
    }

    pub fn server_grab_count(&self) -> u32 {
        self.server_grab_count.get()
    }

    /// Monotonic time from the display clock
    pub fn instant(&self) -> Instant {
        self.clock.now()
    }

    pub(crate) fn add_timer(&mut self, delay: Duration, kind: TimerKind) -> TimerId {
        let now = self.clock.now();
        self.timers.add(now, delay, kind)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    /// Fire every timer that is due
    pub fn run_timers(&mut self) -> Result<()> {
        loop {
            let now = self.clock.now();
            let Some((id, kind)) = self.timers.pop_expired(now) else {
                break;
            };
            debug!("Timers: firing {} {:?}", id, kind);
            match kind {
                TimerKind::PingTimeout { window, timestamp } => self.ping_timeout(id, window, timestamp)?,
                TimerKind::ResizeCompensation => self.resize_compensation_fired(id)?,
                TimerKind::AutoRaise { window } => self.autoraise_fired(id, window)?,
            }
        }
        self.conn.flush()
    }
}

#[cfg(test)]
mod tests {
    use crate::wm::error::WmError;
    use crate::wm::testing::{test_display, Request};

    #[test]
    fn test_ignored_serial_ring_is_bounded() {
        let mut display = test_display();
        for serial in 1..=10 {
            display.add_ignored_serial(serial);
        }
        assert_eq!(display.ignored_serials(), &[7, 8, 9, 10]);
        assert!(display.serial_is_ignored(8));
        assert!(!display.serial_is_ignored(3));
    }

    #[test]
    fn test_ignored_serial_not_recorded_twice_in_a_row() {
        let mut display = test_display();
        display.add_ignored_serial(5);
        display.add_ignored_serial(5);
        display.add_ignored_serial(6);
        assert_eq!(display.ignored_serials(), &[0, 0, 5, 6]);
        display.reset_ignores();
        assert!(!display.serial_is_ignored(5));
    }

    #[test]
    fn test_server_grab_is_refcounted() {
        let display = test_display();
        display.grab_server().unwrap();
        display.grab_server().unwrap();
        display.ungrab_server().unwrap();
        assert_eq!(display.conn.count(|r| matches!(r, Request::GrabServer)), 1);
        assert_eq!(display.conn.count(|r| matches!(r, Request::UngrabServer)), 0);
        display.ungrab_server().unwrap();
        assert_eq!(display.conn.count(|r| matches!(r, Request::UngrabServer)), 1);
        let err = display.ungrab_server().unwrap_err();
        assert!(matches!(err.downcast_ref::<WmError>(), Some(WmError::UngrabWithoutGrab)));
    }

    #[test]
    fn test_sentinel_counts() {
        let mut display = test_display();
        assert!(display.focus_sentinel_clear());
        display.increment_focus_sentinel().unwrap();
        assert!(!display.focus_sentinel_clear());
        display.decrement_focus_sentinel();
        display.decrement_focus_sentinel();
        assert!(display.focus_sentinel_clear());
    }

    #[test]
    fn test_close_twice_fails() {
        let mut display = test_display();
        display.close(0).unwrap();
        let err = display.close(0).unwrap_err();
        assert!(matches!(err.downcast_ref::<WmError>(), Some(WmError::AlreadyClosing)));
    }
}
