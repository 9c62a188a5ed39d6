//! Client Module
//!
//! Per-window state for managed windows and the manage/unmanage lifecycle.

use std::time::Instant;

use anyhow::Result;
use tracing::{debug, info, warn};
use x11rb::protocol::xproto::{AtomEnum, ConfigureWindowAux, EventMask, Window};

use crate::shared::{FrameBorders, Geometry};
use crate::wm::client_flags::{ClientFlags, WindowType, WmFlags};
use crate::wm::conn::XConn;
use crate::wm::display::Display;
use crate::wm::error_trap::ErrorTrap;
use crate::wm::geometry::{gravity_position, Gravity, MoveResizeFlags};
use crate::wm::hints::{SizeHintFlags, SizeHints, Struts};
use crate::wm::netwm::{WM_STATE_ICONIC, WM_STATE_NORMAL, WM_STATE_WITHDRAWN};
use crate::wm::timestamp::Timestamp;

/// Events selected on every managed client window
pub(crate) fn client_event_mask() -> EventMask {
    EventMask::PROPERTY_CHANGE
        | EventMask::FOCUS_CHANGE
        | EventMask::ENTER_WINDOW
        | EventMask::LEAVE_WINDOW
}

/// Events selected on frame windows
pub(crate) fn frame_event_mask() -> EventMask {
    EventMask::SUBSTRUCTURE_REDIRECT
        | EventMask::SUBSTRUCTURE_NOTIFY
        | EventMask::ENTER_WINDOW
        | EventMask::LEAVE_WINDOW
        | EventMask::BUTTON_PRESS
        | EventMask::BUTTON_RELEASE
        | EventMask::FOCUS_CHANGE
}

/// Decoration wrapper around a client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    /// X11 frame window ID
    pub xwindow: Window,
    /// Frame rectangle in root coordinates
    pub rect: Geometry,
    /// Client offsets inside the frame as last configured
    pub borders: FrameBorders,
}

/// Window Manager client state
#[derive(Debug, Clone)]
pub struct Client {
    /// X11 window ID
    pub window: Window,

    pub frame: Option<Frame>,

    /// Client rectangle in root coordinates
    pub rect: Geometry,

    /// Last geometry the user chose
    pub user_rect: Geometry,

    /// Geometry to go back to when leaving maximized or fullscreen
    pub saved_rect: Geometry,

    /// Border width the client asked for
    pub border_width: i32,

    pub size_hints: SizeHints,

    /// EWMH state
    pub state: ClientFlags,

    /// Input model and protocols
    pub wm_flags: WmFlags,

    pub window_type: WindowType,

    pub struts: Option<Struts>,

    /// Workspace index; ignored while sticky
    pub workspace: usize,

    pub transient_for: Option<Window>,

    pub net_wm_user_time: Option<Timestamp>,
    pub user_time_window: Option<Window>,

    pub sync_request_counter: Option<u32>,
    pub sync_request_serial: u64,
    /// When the outstanding sync request was sent
    pub sync_request_time: Option<Instant>,
    /// The client stopped answering sync requests
    pub disable_sync: bool,

    /// UnmapNotify events we caused and must not treat as withdrawals
    pub unmaps_pending: u32,

    pub mapped: bool,
    pub has_focus: bool,
    pub placed: bool,
    pub decorated: bool,
    pub has_shape: bool,
    /// Dragged out of maximized state during this grab
    pub shaken_loose: bool,
    pub unmanaging: bool,
    /// Failed to answer a ping after a close request
    pub unresponsive: bool,
    pub require_fully_onscreen: bool,

    pub title: String,
}

impl Client {
    pub fn new(window: Window, rect: Geometry, border_width: i32) -> Self {
        Self {
            window,
            frame: None,
            rect,
            user_rect: rect,
            saved_rect: rect,
            border_width,
            size_hints: SizeHints::default(),
            state: ClientFlags::empty(),
            wm_flags: WmFlags::INPUT,
            window_type: WindowType::Normal,
            struts: None,
            workspace: 0,
            transient_for: None,
            net_wm_user_time: None,
            user_time_window: None,
            sync_request_counter: None,
            sync_request_serial: 0,
            sync_request_time: None,
            disable_sync: false,
            unmaps_pending: 0,
            mapped: false,
            has_focus: false,
            placed: false,
            decorated: true,
            has_shape: false,
            shaken_loose: false,
            unmanaging: false,
            unresponsive: false,
            require_fully_onscreen: true,
            title: String::new(),
        }
    }

    /// Short description for log lines
    pub fn desc(&self) -> String {
        if self.title.is_empty() {
            format!("0x{:x}", self.window)
        } else {
            let title: String = self.title.chars().take(16).collect();
            format!("0x{:x} ({})", self.window, title)
        }
    }

    pub fn is_fullscreen(&self) -> bool {
        self.state.contains(ClientFlags::FULLSCREEN)
    }

    pub fn is_shaded(&self) -> bool {
        self.state.contains(ClientFlags::SHADED)
    }

    pub fn is_minimized(&self) -> bool {
        self.state.contains(ClientFlags::MINIMIZED)
    }

    pub fn is_sticky(&self) -> bool {
        self.state.contains(ClientFlags::STICKY)
    }

    pub fn is_maximized(&self) -> bool {
        self.state.is_maximized()
    }

    pub fn is_dock_or_desktop(&self) -> bool {
        self.window_type.is_dock_or_desktop()
    }

    pub fn is_resizable(&self) -> bool {
        self.size_hints.is_resizable()
    }

    pub fn borders(&self) -> Option<FrameBorders> {
        self.frame.map(|f| f.borders)
    }

    /// The outermost rectangle: frame if framed, else the client
    pub fn outer_rect(&self) -> Geometry {
        match &self.frame {
            Some(frame) => frame.rect,
            None => self.rect,
        }
    }

    /// The X window that is stacked and mapped for this client
    pub fn outer_xwindow(&self) -> Window {
        self.frame.map(|f| f.xwindow).unwrap_or(self.window)
    }

    /// Frame borders, or zero when unframed; what the constraint solver wants
    pub fn borders_or_zero(&self) -> FrameBorders {
        self.borders().unwrap_or_default()
    }

    /// Whether the window accepts a normal SetInputFocus
    pub fn accepts_input(&self) -> bool {
        self.wm_flags.contains(WmFlags::INPUT)
    }
}

impl<C: XConn> Display<C> {
    /// Start managing a top-level window
    ///
    /// Returns the client id, or `None` when the window is gone or must not
    /// be managed.
    pub fn manage_window(&mut self, xwindow: Window) -> Result<Option<Window>> {
        if self.clients.contains_key(&xwindow) {
            return Ok(Some(xwindow));
        }
        if xwindow == self.screen.no_focus_window || xwindow == self.screen.timestamp_window {
            return Ok(None);
        }

        self.grab_server()?;
        let result = self.manage_window_grabbed(xwindow);
        self.ungrab_server()?;
        result
    }

    fn manage_window_grabbed(&mut self, xwindow: Window) -> Result<Option<Window>> {
        let attrs = match self.conn.client_attributes(xwindow)? {
            Some(attrs) => attrs,
            None => {
                debug!("Manage: window 0x{:x} disappeared before we could manage it", xwindow);
                return Ok(None);
            }
        };
        if attrs.override_redirect {
            debug!("Manage: window 0x{:x} is override-redirect, skipping", xwindow);
            return Ok(None);
        }

        let trap = ErrorTrap::new(&self.conn);
        self.conn.select_input(xwindow, client_event_mask())?;
        self.conn.change_save_set(xwindow, true)?;
        if trap.finish().is_err() {
            debug!("Manage: window 0x{:x} vanished while selecting input", xwindow);
            return Ok(None);
        }

        let mut client = Client::new(xwindow, attrs.geometry, attrs.border_width);
        client.workspace = self.workspaces.active();
        if self.extensions.have_shape {
            self.conn.select_shape_input(xwindow)?;
            client.has_shape = self.conn.is_shaped(xwindow)?;
        }
        self.clients.insert(xwindow, client);

        for atom in self.initial_properties() {
            self.reload_property(xwindow, atom, true)?;
        }
        let requested_desktop = self.conn.get_property32(xwindow, self.atoms.net_wm_desktop)?;
        let wm_hints = self.conn.get_property32(xwindow, AtomEnum::WM_HINTS.into())?;
        let start_iconic = wm_hints
            .as_deref()
            .map(|d| crate::wm::hints::WmHints::from_raw(d).iconic)
            .unwrap_or(false);

        let Some(client) = self.clients.get_mut(&xwindow) else {
            return Ok(None);
        };
        match requested_desktop.as_deref().and_then(|d| d.first().copied()) {
            Some(0xFFFF_FFFF) => client.state.insert(ClientFlags::STICKY),
            Some(index) if (index as usize) < self.workspaces.count() => client.workspace = index as usize,
            _ => {}
        }
        if start_iconic {
            client.state.insert(ClientFlags::MINIMIZED);
        }
        if matches!(client.window_type, WindowType::Desktop | WindowType::Dock | WindowType::Splashscreen) {
            client.decorated = false;
        }
        if client.window_type.is_dock_or_desktop() {
            client.state.insert(ClientFlags::STICKY);
        }

        // Unpositioned windows start centered on the work area
        let positioned = client
            .size_hints
            .flags
            .intersects(SizeHintFlags::US_POSITION | SizeHintFlags::P_POSITION);
        if !positioned && client.transient_for.is_none() && !client.is_dock_or_desktop() {
            let area = self.screen.work_area_at(client.rect.x, client.rect.y);
            client.rect.x = area.x + (area.width - client.rect.width) / 2;
            client.rect.y = area.y + (area.height - client.rect.height) / 2;
        }

        if client.decorated {
            let borders = self.ui.frame_borders(client);
            let frame_rect = borders.frame_rect(&client.rect, client.is_shaded());
            let frame = self.conn.create_frame_window(frame_rect)?;
            self.conn.select_input(frame, frame_event_mask())?;
            if attrs.viewable {
                // Reparenting a mapped window unmaps it
                client.unmaps_pending += 1;
            }
            self.conn
                .configure_window(xwindow, &ConfigureWindowAux::new().border_width(0))?;
            self.conn.reparent_window(xwindow, frame, borders.left, borders.top)?;
            client.frame = Some(Frame {
                xwindow: frame,
                rect: frame_rect,
                borders,
            });
            self.ui.apply_frame_shape(client);
            self.register_xid(frame, xwindow);
        }

        let client = &self.clients[&xwindow];
        let layer = self.layer_for(client);
        let (workspace, sticky, rect) = (client.workspace, client.is_sticky(), client.rect);
        let extents = client.borders_or_zero().as_extents();
        info!("Manage: managing {}", client.desc());

        self.stack.add(xwindow, layer);
        if !sticky {
            self.workspaces.add_window(workspace, xwindow);
        }
        self.atoms.update_frame_extents(&self.conn, xwindow, extents)?;
        self.set_allowed_actions(xwindow)?;
        self.set_net_wm_desktop(xwindow)?;
        self.set_net_wm_state(xwindow)?;

        self.move_resize_internal(
            xwindow,
            MoveResizeFlags::IS_MOVE_ACTION | MoveResizeFlags::IS_RESIZE_ACTION,
            Gravity::NorthWest,
            rect.x,
            rect.y,
            rect.width,
            rect.height,
        )?;
        if let Some(client) = self.clients.get_mut(&xwindow) {
            client.placed = true;
        }

        self.calc_showing(xwindow)?;
        self.sync_stack()?;
        self.update_client_lists()?;
        if self.clients.get(&xwindow).is_some_and(|c| c.struts.is_some()) {
            self.update_work_area()?;
        }

        self.focus_new_window(xwindow)?;
        Ok(Some(xwindow))
    }

    fn focus_new_window(&mut self, window: Window) -> Result<()> {
        let Some(client) = self.clients.get(&window) else {
            return Ok(());
        };
        if client.is_minimized() || client.is_dock_or_desktop() || !client.mapped {
            return Ok(());
        }
        let wants_focus = match client.net_wm_user_time {
            Some(0) => false,
            Some(t) => !crate::wm::timestamp::is_before(t, self.time.last_focus_time),
            None => true,
        };
        let on_active = client.is_sticky() || client.workspace == self.workspaces.active();
        if wants_focus && on_active {
            let now = self.now();
            self.focus_client(window, now)?;
        } else {
            debug!("Manage: not focusing {} (user time too old)", client.desc());
        }
        Ok(())
    }

    /// Stop managing a window and hand it back to the root
    pub fn unmanage_window(&mut self, window: Window, timestamp: Timestamp) -> Result<()> {
        let Some(client) = self.clients.get_mut(&window) else {
            debug!("Unmanage: 0x{:x} is not managed", window);
            return Ok(());
        };
        if client.unmanaging {
            return Ok(());
        }
        client.unmanaging = true;
        info!("Unmanage: unmanaging {}", client.desc());

        self.cancel_pings(window);
        self.cancel_autoraise_for(window);
        if self.grab.window == Some(window) {
            self.end_grab_op(timestamp)?;
        }

        let Some(client) = self.clients.remove(&window) else {
            return Ok(());
        };
        let had_focus = self.focus.focus_window == Some(window);
        self.focus.forget_window(window);
        if had_focus {
            let serial = self.focus.focus_serial;
            self.update_focus_window(None, serial, false)?;
        }

        self.workspaces.remove_window(window);
        self.stack.remove(window);

        if self.settings.focus_mode != crate::wm::settings::FocusMode::Click {
            self.increment_focus_sentinel()?;
        }

        let root = self.screen.root;
        {
            let trap = ErrorTrap::new(&self.conn);
            if let Some(frame) = &client.frame {
                let (x, y) = gravity_position(
                    client.size_hints.gravity(),
                    &client.rect,
                    Some(&frame.borders),
                    client.is_shaded(),
                );
                self.conn.reparent_window(window, root, x, y)?;
                if client.border_width != 0 {
                    self.conn.configure_window(
                        window,
                        &ConfigureWindowAux::new().border_width(client.border_width as u32),
                    )?;
                }
                self.conn.destroy_window(frame.xwindow)?;
            }
            if self.is_closing() {
                // Leave the window visible for whoever manages it next
                self.conn.map_window(window)?;
            } else {
                self.conn.change_property32(
                    window,
                    self.atoms.wm_state,
                    self.atoms.wm_state,
                    &[WM_STATE_WITHDRAWN, 0],
                )?;
                self.conn.delete_property(window, self.atoms.net_wm_state)?;
                self.conn.delete_property(window, self.atoms.net_wm_desktop)?;
            }
            self.conn.select_input(window, EventMask::NO_EVENT)?;
            self.conn.change_save_set(window, false)?;
            if let Err(err) = trap.finish() {
                debug!("Unmanage: window 0x{:x} already gone ({:?})", window, err);
            }
        }

        if let Some(frame) = &client.frame {
            self.unregister_xid(frame.xwindow);
        }
        if let Some(user_time_window) = client.user_time_window {
            self.unregister_xid(user_time_window);
        }
        if client.struts.is_some() {
            self.update_work_area()?;
        }

        if !self.is_closing() {
            self.update_client_lists()?;
            if had_focus {
                self.focus_default_window(timestamp)?;
            }
        }
        Ok(())
    }

    /// Map or unmap a client to match its minimized and workspace state
    pub fn calc_showing(&mut self, window: Window) -> Result<()> {
        let active = self.workspaces.active();
        let showing_desktop = self.showing_desktop;
        let Some(client) = self.clients.get(&window) else {
            return Ok(());
        };
        let on_active = client.is_sticky() || client.workspace == active;
        let hidden_by_desktop = showing_desktop && !client.is_dock_or_desktop();
        let should_show = !client.is_minimized() && on_active && !hidden_by_desktop;
        if should_show {
            self.show_window(window)
        } else {
            self.hide_window(window)
        }
    }

    fn show_window(&mut self, window: Window) -> Result<()> {
        let Some(client) = self.clients.get_mut(&window) else {
            return Ok(());
        };
        if client.mapped {
            return Ok(());
        }
        debug!("Manage: showing {}", client.desc());
        client.mapped = true;
        let frame = client.frame.map(|f| f.xwindow);
        self.conn.map_window(window)?;
        if let Some(frame) = frame {
            self.conn.map_window(frame)?;
        }
        self.conn
            .change_property32(window, self.atoms.wm_state, self.atoms.wm_state, &[WM_STATE_NORMAL, 0])?;
        Ok(())
    }

    fn hide_window(&mut self, window: Window) -> Result<()> {
        let Some(client) = self.clients.get_mut(&window) else {
            return Ok(());
        };
        if client.mapped {
            debug!("Manage: hiding {}", client.desc());
            client.mapped = false;
            match client.frame {
                Some(frame) => self.conn.unmap_window(frame.xwindow)?,
                None => {
                    client.unmaps_pending += 1;
                    self.conn.unmap_window(window)?;
                }
            }
        }
        self.conn
            .change_property32(window, self.atoms.wm_state, self.atoms.wm_state, &[WM_STATE_ICONIC, 0])?;

        if self.focus.focus_window == Some(window) {
            let now = self.now();
            self.focus_default_window(now)?;
        }
        Ok(())
    }

    /// Publish `_NET_CLIENT_LIST` and `_NET_CLIENT_LIST_STACKING`
    pub fn update_client_lists(&self) -> Result<()> {
        let mut windows: Vec<Window> = self.clients.keys().copied().collect();
        windows.sort_unstable();
        let root = self.screen.root;
        self.atoms.update_client_list(&self.conn, root, false, &windows)?;
        self.atoms.update_client_list(&self.conn, root, true, &self.stack.order())
    }

    /// Recompute the work area from every client's struts
    pub fn update_work_area(&mut self) -> Result<()> {
        let changed = self
            .screen
            .update_work_area(self.clients.values().filter_map(|c| c.struts.as_ref()));
        if changed {
            info!("Screen: work area is now {:?}", self.screen.work_area);
            self.atoms.update_workarea(
                &self.conn,
                self.screen.root,
                &self.screen.work_area,
                self.workspaces.count(),
            )?;
            let windows: Vec<Window> = self
                .clients
                .values()
                .filter(|c| c.is_maximized() && !c.unmanaging)
                .map(|c| c.window)
                .collect();
            for window in windows {
                self.refit_maximized(window)?;
            }
        } else if self.clients.values().any(|c| c.struts.is_some()) {
            warn!("Screen: struts present but work area unchanged");
        }
        Ok(())
    }
}
