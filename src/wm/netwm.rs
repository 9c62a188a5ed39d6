//! NetWM Module
//!
//! EWMH client message handlers and the per-window properties we publish.

use anyhow::Result;
use tracing::{debug, info, warn};
use x11rb::protocol::xproto::{AtomEnum, ClientMessageEvent, Window};

use crate::wm::client::Client;
use crate::wm::client_flags::{ClientFlags, WindowType};
use crate::wm::conn::XConn;
use crate::wm::display::Display;
use crate::wm::ewmh::Atoms;
use crate::wm::grab::{GrabOp, GrabRequest};
use crate::wm::timestamp::CURRENT_TIME;

// ICCCM WM_STATE values
pub const WM_STATE_WITHDRAWN: u32 = 0;
pub const WM_STATE_NORMAL: u32 = 1;
pub const WM_STATE_ICONIC: u32 = 3;

// _NET_WM_STATE actions
const NET_WM_STATE_REMOVE: u32 = 0;
const NET_WM_STATE_ADD: u32 = 1;
const NET_WM_STATE_TOGGLE: u32 = 2;

/// `_NET_WM_MOVERESIZE` action that cancels a running op
const NET_WM_MOVERESIZE_CANCEL: u32 = 11;

/// `_NET_WM_DESKTOP` value for "all desktops"
const ALL_DESKTOPS: u32 = 0xFFFF_FFFF;

/// Button1Mask; ButtonN is `BUTTON1_MASK << (N - 1)`
const BUTTON1_MASK: u16 = 1 << 8;

impl<C: XConn> Display<C> {
    /// Write `_NET_WM_STATE` from the client's flags
    pub fn set_net_wm_state(&self, window: Window) -> Result<()> {
        let Some(client) = self.clients.get(&window) else {
            return Ok(());
        };
        let data = state_atoms(client, &self.atoms);
        self.conn
            .change_property32(window, self.atoms.net_wm_state, AtomEnum::ATOM.into(), &data)
    }

    /// Write `_NET_WM_ALLOWED_ACTIONS`
    pub fn set_allowed_actions(&self, window: Window) -> Result<()> {
        let Some(client) = self.clients.get(&window) else {
            return Ok(());
        };
        let atoms = &self.atoms;
        let mut data = vec![atoms.net_wm_action_move];
        if client.is_resizable() {
            data.push(atoms.net_wm_action_resize);
            data.push(atoms.net_wm_action_fullscreen);
        }
        if !client.is_dock_or_desktop() {
            data.push(atoms.net_wm_action_minimize);
        }
        if client.decorated {
            data.push(atoms.net_wm_action_shade);
        }
        if client.is_resizable() {
            data.push(atoms.net_wm_action_maximize_horz);
            data.push(atoms.net_wm_action_maximize_vert);
        }
        if !client.is_dock_or_desktop() {
            data.push(atoms.net_wm_action_change_desktop);
        }
        data.push(atoms.net_wm_action_close);
        self.conn
            .change_property32(window, atoms.net_wm_allowed_actions, AtomEnum::ATOM.into(), &data)
    }

    /// Dispatch a ClientMessage; returns whether it should be filtered
    pub fn handle_client_message(&mut self, event: &ClientMessageEvent) -> Result<bool> {
        if event.format != 32 {
            debug!("NetWM: ignoring client message with format {}", event.format);
            return Ok(false);
        }
        let data = event.data.as_data32();
        let type_ = event.type_;

        if type_ == self.atoms.net_request_frame_extents {
            self.request_frame_extents(event.window)?;
            return Ok(false);
        }
        if event.window == self.screen.root {
            return self.root_client_message(type_, data);
        }
        match self.lookup(event.window) {
            Some(window) => {
                self.window_client_message(window, type_, data)?;
                Ok(false)
            }
            None => {
                if self.verbose {
                    debug!("NetWM: client message for unmanaged 0x{:x}", event.window);
                }
                Ok(false)
            }
        }
    }

    fn root_client_message(&mut self, type_: u32, data: [u32; 5]) -> Result<bool> {
        let atoms = &self.atoms;
        if type_ == atoms.wm_protocols && data[0] == atoms.net_wm_ping {
            self.pong_received(data[2], data[1])?;
            return Ok(true);
        }

        if type_ == atoms.net_current_desktop {
            let mut timestamp = data[1];
            if timestamp == CURRENT_TIME {
                warn!("NetWM: _NET_CURRENT_DESKTOP without a timestamp");
                timestamp = self.now_roundtrip()?;
            }
            self.activate_workspace(data[0] as usize, timestamp)?;
        } else if type_ == atoms.net_number_of_desktops {
            self.set_workspace_count(data[0])?;
        } else if type_ == atoms.net_showing_desktop {
            let now = self.now();
            self.set_showing_desktop(data[0] != 0, now)?;
        } else if type_ == atoms.areawm_restart_message {
            info!("NetWM: restart requested");
            self.request_restart();
        } else if type_ == atoms.areawm_reload_theme_message {
            info!("NetWM: theme reload requested, refreshing frames");
            self.refresh_frames()?;
        } else if type_ == atoms.areawm_set_keybindings_message {
            info!("NetWM: keybindings {}", if data[0] != 0 { "enabled" } else { "disabled" });
        } else if type_ == atoms.areawm_set_mousemods_message {
            info!("NetWM: mouse modifiers {}", if data[0] != 0 { "enabled" } else { "disabled" });
        } else if type_ == atoms.areawm_toggle_verbose {
            self.verbose = !self.verbose;
            info!("NetWM: verbose logging {}", if self.verbose { "on" } else { "off" });
        } else if self.verbose {
            debug!("NetWM: unhandled root message {:?}", self.atoms.name_of(type_));
        }
        Ok(false)
    }

    fn window_client_message(&mut self, window: Window, type_: u32, data: [u32; 5]) -> Result<()> {
        let atoms = &self.atoms;
        if type_ == atoms.net_close_window {
            let mut timestamp = data[0];
            if timestamp == CURRENT_TIME {
                warn!("NetWM: _NET_CLOSE_WINDOW for 0x{:x} without a timestamp", window);
                timestamp = self.now();
            }
            self.delete_window(window, timestamp)
        } else if type_ == atoms.net_wm_desktop {
            if data[0] == ALL_DESKTOPS {
                self.set_sticky(window, true)
            } else {
                self.set_sticky(window, false)?;
                self.change_workspace(window, data[0] as usize)
            }
        } else if type_ == atoms.net_wm_state {
            self.change_net_wm_state(window, data[0], [data[1], data[2]])
        } else if type_ == atoms.wm_change_state {
            if data[0] == WM_STATE_ICONIC {
                self.iconify_request(window)?;
            }
            Ok(())
        } else if type_ == atoms.net_wm_moveresize {
            self.moveresize_request(window, data)
        } else if type_ == atoms.net_active_window {
            let timestamp = if data[0] != 0 { data[1] } else { self.now() };
            debug!("NetWM: activate request for 0x{:x} (source {})", window, data[0]);
            self.activate(window, timestamp)
        } else {
            if self.verbose {
                debug!("NetWM: unhandled message {:?} for 0x{:x}", self.atoms.name_of(type_), window);
            }
            Ok(())
        }
    }

    /// Apply `_NET_WM_STATE` add/remove/toggle for up to two states
    fn change_net_wm_state(&mut self, window: Window, action: u32, props: [u32; 2]) -> Result<()> {
        let Some(current) = self.clients.get(&window).map(|c| c.state) else {
            return Ok(());
        };
        let mut wanted = current;
        for atom in props.into_iter().filter(|&a| a != x11rb::NONE) {
            let Some(flag) = ClientFlags::from_state_atom(atom, &self.atoms) else {
                debug!("NetWM: unsupported _NET_WM_STATE atom {}", atom);
                continue;
            };
            match action {
                NET_WM_STATE_REMOVE => wanted.remove(flag),
                NET_WM_STATE_ADD => wanted.insert(flag),
                NET_WM_STATE_TOGGLE => wanted.toggle(flag),
                other => {
                    warn!("NetWM: bad _NET_WM_STATE action {}", other);
                    return Ok(());
                }
            }
        }
        let changed = current ^ wanted;
        if changed.is_empty() {
            return Ok(());
        }
        debug!("NetWM: 0x{:x} state {:?} -> {:?}", window, current, wanted);

        if changed.contains(ClientFlags::SHADED) {
            self.set_shaded(window, wanted.contains(ClientFlags::SHADED))?;
        }
        if changed.contains(ClientFlags::FULLSCREEN) {
            self.set_fullscreen(window, wanted.contains(ClientFlags::FULLSCREEN))?;
        }
        let max_on = changed & wanted & ClientFlags::maximized();
        let max_off = changed & current & ClientFlags::maximized();
        if !max_on.is_empty() {
            self.maximize(window, max_on)?;
        }
        if !max_off.is_empty() {
            self.unmaximize(window, max_off)?;
        }
        if changed.contains(ClientFlags::STICKY) {
            self.set_sticky(window, wanted.contains(ClientFlags::STICKY))?;
        }

        let plain = ClientFlags::MODAL
            | ClientFlags::SKIP_PAGER
            | ClientFlags::SKIP_TASKBAR
            | ClientFlags::ABOVE
            | ClientFlags::BELOW
            | ClientFlags::DEMANDS_ATTENTION;
        if let Some(client) = self.clients.get_mut(&window) {
            client.state = (client.state & !plain) | (wanted & plain);
            if changed.contains(ClientFlags::MODAL) {
                client.window_type = match (client.window_type, wanted.contains(ClientFlags::MODAL)) {
                    (WindowType::Dialog, true) => WindowType::ModalDialog,
                    (WindowType::ModalDialog, false) => WindowType::Dialog,
                    (t, _) => t,
                };
            }
        }
        if changed.intersects(ClientFlags::ABOVE | ClientFlags::BELOW) {
            self.update_layer(window)?;
        }
        self.set_net_wm_state(window)
    }

    /// `WM_CHANGE_STATE` to IconicState
    fn iconify_request(&mut self, window: Window) -> Result<()> {
        self.minimize(window)?;

        // Focus stayed on a dock after the minimized window lost it
        let on_dock = self
            .focus
            .focus_window
            .and_then(|w| self.clients.get(&w))
            .is_some_and(|c| c.is_dock_or_desktop());
        if on_dock && self.focus.previously_focused_window == Some(window) {
            let now = self.now();
            self.focus_default_window(now)?;
        }
        Ok(())
    }

    /// `_NET_WM_MOVERESIZE`
    fn moveresize_request(&mut self, window: Window, data: [u32; 5]) -> Result<()> {
        let (x_root, y_root, action, button) = (data[0] as i32, data[1] as i32, data[2], data[3]);
        if action == NET_WM_MOVERESIZE_CANCEL {
            if self.grab.window == Some(window) {
                let now = self.now();
                self.end_grab_op(now)?;
            }
            return Ok(());
        }
        let Some(op) = GrabOp::from_moveresize_action(action) else {
            warn!("NetWM: unknown _NET_WM_MOVERESIZE action {}", action);
            return Ok(());
        };
        let timestamp = self.now();

        let mut req = GrabRequest::new(Some(window), op, timestamp, x_root, y_root);
        if op.is_keyboard() {
            let pointer = self.conn.query_pointer()?;
            req.root_x = pointer.root_x;
            req.root_y = pointer.root_y;
            self.begin_grab_op(req)?;
            return Ok(());
        }

        let pointer = self.conn.query_pointer()?;
        let button = if button == 0 {
            held_button(pointer.mask)
        } else {
            u8::try_from(button)
                .ok()
                .filter(|&b| (1..=5).contains(&b) && pointer.mask & button_mask(b) != 0)
        };
        let Some(button) = button else {
            debug!("NetWM: no button held for moveresize on 0x{:x}, ignoring", window);
            return Ok(());
        };
        req.button = button;
        req.frame_action = true;
        self.begin_grab_op(req)?;
        Ok(())
    }

    /// Estimate `_NET_FRAME_EXTENTS` for a window that is not mapped yet
    fn request_frame_extents(&mut self, xwindow: Window) -> Result<()> {
        let motif = self.conn.get_property32(xwindow, self.atoms.motif_wm_hints)?;
        let decorated = motif
            .as_deref()
            .and_then(Atoms::motif_wants_decorations)
            .unwrap_or(true);
        let extents = match self.clients.get(&xwindow) {
            Some(client) => client.borders_or_zero().as_extents(),
            None if decorated => {
                let probe = Client::new(xwindow, Default::default(), 0);
                self.ui.frame_borders(&probe).as_extents()
            }
            None => [0; 4],
        };
        debug!("NetWM: frame extents for 0x{:x} are {:?}", xwindow, extents);
        self.atoms.update_frame_extents(&self.conn, xwindow, extents)
    }

    /// Re-apply frame borders after a theme change
    fn refresh_frames(&mut self) -> Result<()> {
        let windows: Vec<Window> = self
            .clients
            .values()
            .filter(|c| c.frame.is_some())
            .map(|c| c.window)
            .collect();
        for window in windows {
            self.refit_maximized(window)?;
        }
        Ok(())
    }
}

fn button_mask(button: u8) -> u16 {
    BUTTON1_MASK << (button - 1)
}

/// Lowest button held in a pointer state mask
fn held_button(mask: u16) -> Option<u8> {
    (1..=5).find(|&b| mask & button_mask(b) != 0)
}

/// `_NET_WM_STATE` atoms describing a client
fn state_atoms(client: &Client, atoms: &Atoms) -> Vec<u32> {
    let table = [
        (ClientFlags::SHADED, atoms.net_wm_state_shaded),
        (ClientFlags::MODAL, atoms.net_wm_state_modal),
        (ClientFlags::SKIP_PAGER, atoms.net_wm_state_skip_pager),
        (ClientFlags::SKIP_TASKBAR, atoms.net_wm_state_skip_taskbar),
        (ClientFlags::MAXIMIZED_HORZ, atoms.net_wm_state_maximized_horz),
        (ClientFlags::MAXIMIZED_VERT, atoms.net_wm_state_maximized_vert),
        (ClientFlags::FULLSCREEN, atoms.net_wm_state_fullscreen),
        (ClientFlags::ABOVE, atoms.net_wm_state_above),
        (ClientFlags::BELOW, atoms.net_wm_state_below),
        (ClientFlags::DEMANDS_ATTENTION, atoms.net_wm_state_demands_attention),
        (ClientFlags::STICKY, atoms.net_wm_state_sticky),
    ];
    let mut data: Vec<u32> = table
        .iter()
        .filter(|(flag, _)| client.state.contains(*flag))
        .map(|(_, atom)| *atom)
        .collect();
    if client.is_minimized() {
        data.push(atoms.net_wm_state_hidden);
    }
    data
}
