//! Props Module
//!
//! Reload client fields when the properties backing them change.

use anyhow::Result;
use tracing::{debug, info, warn};
use x11rb::protocol::xproto::{Atom, AtomEnum, EventMask, Window};

use crate::wm::client_flags::{ClientFlags, WindowType, WmFlags};
use crate::wm::conn::XConn;
use crate::wm::display::Display;
use crate::wm::ewmh::Atoms;
use crate::wm::hints::{SizeHints, Struts, WmHints};
use crate::wm::timestamp::is_before;
use crate::wm::transients;

impl<C: XConn> Display<C> {
    /// Properties read when a window is first managed, in load order
    pub fn initial_properties(&self) -> Vec<Atom> {
        vec![
            AtomEnum::WM_NORMAL_HINTS.into(),
            AtomEnum::WM_HINTS.into(),
            self.atoms.wm_protocols,
            AtomEnum::WM_TRANSIENT_FOR.into(),
            self.atoms.net_wm_state,
            self.atoms.net_wm_window_type,
            self.atoms.net_wm_name,
            self.atoms.motif_wm_hints,
            self.atoms.net_wm_strut_partial,
            self.atoms.net_wm_user_time_window,
            self.atoms.net_wm_user_time,
            self.atoms.net_wm_sync_request_counter,
        ]
    }

    /// Re-read one property of a managed window
    ///
    /// `initial` is set while the window is being managed; follow-up work
    /// such as restacking and re-constraining is skipped then.
    pub fn reload_property(&mut self, window: Window, atom: Atom, initial: bool) -> Result<()> {
        if !self.clients.contains_key(&window) {
            return Ok(());
        }
        if self.verbose {
            debug!(
                "Props: reloading {} on 0x{:x}",
                self.atoms.name_of(atom).unwrap_or("(unknown)"),
                window
            );
        }

        if atom == u32::from(AtomEnum::WM_NORMAL_HINTS) {
            self.reload_normal_hints(window, initial)
        } else if atom == u32::from(AtomEnum::WM_HINTS) {
            self.reload_wm_hints(window)
        } else if atom == self.atoms.wm_protocols {
            self.reload_protocols(window)
        } else if atom == u32::from(AtomEnum::WM_TRANSIENT_FOR) {
            self.reload_transient_for(window, initial)
        } else if atom == self.atoms.net_wm_state {
            // Clients only set this before mapping; later changes come as messages
            if initial {
                self.reload_initial_state(window)?;
            }
            Ok(())
        } else if atom == self.atoms.net_wm_window_type {
            self.reload_window_type(window, initial)
        } else if atom == self.atoms.net_wm_name || atom == u32::from(AtomEnum::WM_NAME) {
            self.reload_title(window)
        } else if atom == self.atoms.motif_wm_hints {
            self.reload_motif_hints(window, initial)
        } else if atom == self.atoms.net_wm_strut_partial || atom == self.atoms.net_wm_strut {
            self.reload_struts(window, initial)
        } else if atom == self.atoms.net_wm_user_time_window {
            self.reload_user_time_window(window)
        } else if atom == self.atoms.net_wm_user_time {
            self.reload_user_time(window)
        } else if atom == self.atoms.net_wm_sync_request_counter {
            self.reload_sync_counter(window)
        } else {
            Ok(())
        }
    }

    fn reload_normal_hints(&mut self, window: Window, initial: bool) -> Result<()> {
        let data = self
            .conn
            .get_property32(window, AtomEnum::WM_NORMAL_HINTS.into())?
            .unwrap_or_default();
        let Some(client) = self.clients.get_mut(&window) else {
            return Ok(());
        };
        let mut hints = SizeHints::from_raw(&data);
        hints.normalize();
        client.size_hints = hints;
        if initial {
            return Ok(());
        }

        let rect = client.rect;
        self.set_allowed_actions(window)?;
        self.move_resize_window(window, false, rect.x, rect.y, rect.width, rect.height)
    }

    fn reload_wm_hints(&mut self, window: Window) -> Result<()> {
        let hints = self
            .conn
            .get_property32(window, AtomEnum::WM_HINTS.into())?
            .map(|data| WmHints::from_raw(&data))
            .unwrap_or_default();
        let Some(client) = self.clients.get_mut(&window) else {
            return Ok(());
        };
        client.wm_flags.set(WmFlags::INPUT, hints.input);
        client.wm_flags.set(WmFlags::URGENT, hints.urgent);
        Ok(())
    }

    fn reload_protocols(&mut self, window: Window) -> Result<()> {
        let protocols = self
            .conn
            .get_property32(window, self.atoms.wm_protocols)?
            .unwrap_or_default();
        let flags = protocol_flags(&protocols, &self.atoms);
        let Some(client) = self.clients.get_mut(&window) else {
            return Ok(());
        };
        let keep = client.wm_flags & (WmFlags::INPUT | WmFlags::URGENT);
        client.wm_flags = keep | flags;
        debug!("Props: {} protocols {:?}", client.desc(), flags);
        Ok(())
    }

    fn reload_transient_for(&mut self, window: Window, initial: bool) -> Result<()> {
        let parent = self
            .conn
            .get_property32(window, AtomEnum::WM_TRANSIENT_FOR.into())?
            .and_then(|data| data.first().copied())
            .filter(|&p| p != x11rb::NONE && p != self.screen.root);

        let parent = match parent {
            Some(p) if p == window => {
                warn!("Props: 0x{:x} is transient for itself, ignoring", window);
                None
            }
            Some(p) if transients::is_ancestor_of(&self.clients, window, p) => {
                warn!("Props: WM_TRANSIENT_FOR of 0x{:x} would form a loop, ignoring", window);
                None
            }
            other => other,
        };

        let Some(client) = self.clients.get_mut(&window) else {
            return Ok(());
        };
        client.transient_for = parent;
        if !initial {
            self.update_layer(window)?;
        }
        Ok(())
    }

    fn reload_initial_state(&mut self, window: Window) -> Result<()> {
        let atoms = self
            .conn
            .get_property32(window, self.atoms.net_wm_state)?
            .unwrap_or_default();
        let mut state = ClientFlags::empty();
        for atom in atoms {
            match ClientFlags::from_state_atom(atom, &self.atoms) {
                Some(flag) => state.insert(flag),
                None => debug!("Props: ignoring unknown _NET_WM_STATE atom {}", atom),
            }
        }
        let Some(client) = self.clients.get_mut(&window) else {
            return Ok(());
        };
        if state.intersects(ClientFlags::maximized() | ClientFlags::FULLSCREEN) {
            client.saved_rect = client.rect;
        }
        client.state |= state;
        Ok(())
    }

    fn reload_window_type(&mut self, window: Window, initial: bool) -> Result<()> {
        let list = self.conn.get_property32(window, self.atoms.net_wm_window_type)?;
        let Some(client) = self.clients.get_mut(&window) else {
            return Ok(());
        };
        let mut window_type = match list {
            Some(list) if !list.is_empty() => WindowType::from_atoms(&list, &self.atoms),
            // Untyped transients behave like dialogs
            _ if client.transient_for.is_some() => WindowType::Dialog,
            _ => WindowType::Normal,
        };
        if window_type == WindowType::Dialog && client.state.contains(ClientFlags::MODAL) {
            window_type = WindowType::ModalDialog;
        }
        if window_type != client.window_type {
            debug!("Props: {} is a {:?}", client.desc(), window_type);
        }
        client.window_type = window_type;
        if window_type.is_dock_or_desktop() {
            client.state.insert(ClientFlags::STICKY);
        }
        if !initial {
            self.update_layer(window)?;
            self.set_allowed_actions(window)?;
        }
        Ok(())
    }

    fn reload_title(&mut self, window: Window) -> Result<()> {
        let title = match self.conn.get_text_property(window, self.atoms.net_wm_name)? {
            Some(title) => Some(title),
            None => self.conn.get_text_property(window, AtomEnum::WM_NAME.into())?,
        };
        if let Some(client) = self.clients.get_mut(&window) {
            client.title = title.unwrap_or_default();
        }
        Ok(())
    }

    fn reload_motif_hints(&mut self, window: Window, initial: bool) -> Result<()> {
        let wants = self
            .conn
            .get_property32(window, self.atoms.motif_wm_hints)?
            .and_then(|data| Atoms::motif_wants_decorations(&data));
        let Some(client) = self.clients.get_mut(&window) else {
            return Ok(());
        };
        let decorated = wants.unwrap_or(true);
        if initial {
            client.decorated = decorated;
        } else if client.decorated != decorated {
            // The frame is only created or destroyed at manage time
            info!("Props: {} changed decorations after mapping, keeping current frame", client.desc());
        }
        Ok(())
    }

    fn reload_struts(&mut self, window: Window, initial: bool) -> Result<()> {
        let data = match self.conn.get_property32(window, self.atoms.net_wm_strut_partial)? {
            Some(data) => Some(data),
            None => self.conn.get_property32(window, self.atoms.net_wm_strut)?,
        };
        let struts = data
            .and_then(|d| Struts::from_raw(&d, self.screen.width, self.screen.height))
            .filter(|s| !s.is_empty());
        let Some(client) = self.clients.get_mut(&window) else {
            return Ok(());
        };
        if client.struts == struts {
            return Ok(());
        }
        debug!("Props: {} struts {:?}", client.desc(), struts);
        client.struts = struts;
        if !initial {
            self.update_work_area()?;
        }
        Ok(())
    }

    fn reload_user_time_window(&mut self, window: Window) -> Result<()> {
        let user_time_window = self
            .conn
            .get_property32(window, self.atoms.net_wm_user_time_window)?
            .and_then(|data| data.first().copied())
            .filter(|&w| w != x11rb::NONE && w != window);
        let Some(client) = self.clients.get_mut(&window) else {
            return Ok(());
        };
        let previous = std::mem::replace(&mut client.user_time_window, user_time_window);
        if previous == user_time_window {
            return Ok(());
        }
        if let Some(old) = previous {
            self.unregister_xid(old);
            self.conn.select_input(old, EventMask::NO_EVENT)?;
        }
        if let Some(new) = user_time_window {
            debug!("Props: 0x{:x} keeps its user time on 0x{:x}", window, new);
            self.register_xid(new, window);
            self.conn.select_input(new, EventMask::PROPERTY_CHANGE)?;
        }
        self.reload_user_time(window)
    }

    fn reload_user_time(&mut self, window: Window) -> Result<()> {
        let source = self
            .clients
            .get(&window)
            .and_then(|c| c.user_time_window)
            .unwrap_or(window);
        let Some(time) = self
            .conn
            .get_property32(source, self.atoms.net_wm_user_time)?
            .and_then(|data| data.first().copied())
        else {
            return Ok(());
        };
        let Some(client) = self.clients.get_mut(&window) else {
            return Ok(());
        };
        client.net_wm_user_time = Some(time);
        if time != 0 && is_before(self.time.last_user_time, time) {
            self.time.last_user_time = time;
        }
        Ok(())
    }

    fn reload_sync_counter(&mut self, window: Window) -> Result<()> {
        let counter = self
            .conn
            .get_property32(window, self.atoms.net_wm_sync_request_counter)?
            .and_then(|data| data.first().copied())
            .filter(|&c| c != 0);
        if let Some(client) = self.clients.get_mut(&window) {
            client.sync_request_counter = counter;
        }
        Ok(())
    }
}

/// Protocol support advertised in `WM_PROTOCOLS`
fn protocol_flags(protocols: &[Atom], atoms: &Atoms) -> WmFlags {
    let mut flags = WmFlags::empty();
    for &atom in protocols {
        if atom == atoms.wm_delete_window {
            flags.insert(WmFlags::DELETE);
        } else if atom == atoms.wm_take_focus {
            flags.insert(WmFlags::TAKEFOCUS);
        } else if atom == atoms.net_wm_ping {
            flags.insert(WmFlags::PING);
        } else if atom == atoms.net_wm_sync_request {
            flags.insert(WmFlags::SYNC_REQUEST);
        }
    }
    flags
}
