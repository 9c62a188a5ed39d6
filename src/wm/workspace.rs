//! Workspace Module
//!
//! Virtual desktops: membership lists, the active workspace, and the
//! EWMH desktop properties.

use anyhow::Result;
use tracing::{debug, info, warn};
use x11rb::protocol::xproto::{AtomEnum, Window};

use crate::wm::client_flags::ClientFlags;
use crate::wm::conn::XConn;
use crate::wm::display::Display;
use crate::wm::timestamp::Timestamp;

/// Special `_NET_WM_DESKTOP` value for sticky windows (all workspaces)
pub const ALL_WORKSPACES: u32 = 0xFFFF_FFFF;

#[derive(Debug, Clone, Default)]
pub struct Workspace {
    /// Member windows in the order they were added
    pub windows: Vec<Window>,
}

/// Workspace manager
#[derive(Debug)]
pub struct WorkspaceManager {
    workspaces: Vec<Workspace>,
    active: usize,
}

impl WorkspaceManager {
    /// Create a new workspace manager; there is always at least one workspace
    pub fn new(workspace_count: u32) -> Self {
        let count = workspace_count.max(1) as usize;
        Self {
            workspaces: vec![Workspace::default(); count],
            active: 0,
        }
    }

    pub fn count(&self) -> usize {
        self.workspaces.len()
    }

    pub fn active(&self) -> usize {
        self.active
    }

    /// Make `index` active; false when out of range or already active
    pub fn set_active(&mut self, index: usize) -> bool {
        if index >= self.workspaces.len() || index == self.active {
            return false;
        }
        self.active = index;
        true
    }

    pub fn add_window(&mut self, index: usize, window: Window) {
        let Some(workspace) = self.workspaces.get_mut(index) else {
            warn!("Workspace: no workspace {} for 0x{:x}", index, window);
            return;
        };
        if !workspace.windows.contains(&window) {
            workspace.windows.push(window);
        }
    }

    /// Remove a window from every workspace
    pub fn remove_window(&mut self, window: Window) {
        for workspace in &mut self.workspaces {
            workspace.windows.retain(|w| *w != window);
        }
    }

    pub fn workspace_of(&self, window: Window) -> Option<usize> {
        self.workspaces.iter().position(|ws| ws.windows.contains(&window))
    }

    pub fn windows_on(&self, index: usize) -> &[Window] {
        self.workspaces.get(index).map(|ws| ws.windows.as_slice()).unwrap_or(&[])
    }

    /// Change the number of workspaces
    ///
    /// Windows on removed workspaces move to the new last one; they are
    /// returned so their `_NET_WM_DESKTOP` can be rewritten.
    pub fn set_count(&mut self, count: u32) -> Vec<Window> {
        let count = count.max(1) as usize;
        let mut moved = Vec::new();
        if count < self.workspaces.len() {
            for workspace in self.workspaces.drain(count..) {
                moved.extend(workspace.windows);
            }
            if let Some(last) = self.workspaces.last_mut() {
                last.windows.extend(moved.iter().copied());
            }
        } else {
            self.workspaces.resize_with(count, Workspace::default);
        }
        if self.active >= count {
            self.active = count - 1;
        }
        moved
    }
}

impl<C: XConn> Display<C> {
    /// Publish `_NET_NUMBER_OF_DESKTOPS` and `_NET_CURRENT_DESKTOP`
    pub fn update_desktop_properties(&self) -> Result<()> {
        let root = self.screen.root;
        self.conn.change_property32(
            root,
            self.atoms.net_number_of_desktops,
            AtomEnum::CARDINAL.into(),
            &[self.workspaces.count() as u32],
        )?;
        self.conn.change_property32(
            root,
            self.atoms.net_current_desktop,
            AtomEnum::CARDINAL.into(),
            &[self.workspaces.active() as u32],
        )
    }

    /// Write `_NET_WM_DESKTOP` for a client
    pub fn set_net_wm_desktop(&self, window: Window) -> Result<()> {
        let Some(client) = self.clients.get(&window) else {
            return Ok(());
        };
        let value = if client.is_sticky() {
            ALL_WORKSPACES
        } else {
            client.workspace as u32
        };
        self.conn
            .change_property32(window, self.atoms.net_wm_desktop, AtomEnum::CARDINAL.into(), &[value])
    }

    /// Switch to a workspace and focus something on it
    pub fn activate_workspace(&mut self, index: usize, timestamp: Timestamp) -> Result<()> {
        if index >= self.workspaces.count() {
            warn!("Workspace: invalid index {} (have {})", index, self.workspaces.count());
            return Ok(());
        }
        if !self.workspaces.set_active(index) {
            debug!("Workspace: already on {}", index);
            return Ok(());
        }
        info!("Workspace: switching to {}", index);

        if self.settings.focus_mode != crate::wm::settings::FocusMode::Click {
            self.increment_focus_sentinel()?;
        }
        // A window being moved comes along
        let carried = self.grab.window.filter(|_| self.grab.op.is_moving());
        if let Some(window) = carried {
            self.change_workspace(window, index)?;
        }

        let windows: Vec<Window> = self.clients.keys().copied().collect();
        for window in windows {
            self.calc_showing(window)?;
        }
        self.update_desktop_properties()?;
        self.focus_default_window(timestamp)
    }

    /// Move a client to another workspace
    pub fn change_workspace(&mut self, window: Window, index: usize) -> Result<()> {
        if index >= self.workspaces.count() {
            warn!("Workspace: invalid index {} for 0x{:x}", index, window);
            return Ok(());
        }
        let Some(client) = self.clients.get_mut(&window) else {
            return Ok(());
        };
        client.workspace = index;
        client.state.remove(ClientFlags::STICKY);
        debug!("Workspace: {} moves to {}", client.desc(), index);
        self.workspaces.remove_window(window);
        self.workspaces.add_window(index, window);
        self.set_net_wm_desktop(window)?;
        self.set_net_wm_state(window)?;
        self.calc_showing(window)
    }

    /// Put a client on all workspaces, or back on the active one
    pub fn set_sticky(&mut self, window: Window, sticky: bool) -> Result<()> {
        let active = self.workspaces.active();
        let Some(client) = self.clients.get_mut(&window) else {
            return Ok(());
        };
        if client.is_sticky() == sticky {
            return Ok(());
        }
        client.state.set(ClientFlags::STICKY, sticky);
        self.workspaces.remove_window(window);
        if !sticky {
            client.workspace = active;
            self.workspaces.add_window(active, window);
        }
        self.set_net_wm_desktop(window)?;
        self.set_net_wm_state(window)?;
        self.calc_showing(window)
    }

    /// Resize the workspace list
    pub fn set_workspace_count(&mut self, count: u32) -> Result<()> {
        if count == 0 {
            warn!("Workspace: refusing to set count to 0");
            return Ok(());
        }
        info!("Workspace: setting count to {}", count);
        let moved = self.workspaces.set_count(count);
        let last = self.workspaces.count() - 1;
        for window in moved {
            if let Some(client) = self.clients.get_mut(&window) {
                client.workspace = last;
            }
            self.set_net_wm_desktop(window)?;
            self.calc_showing(window)?;
        }
        self.update_desktop_properties()?;
        self.atoms
            .update_workarea(&self.conn, self.screen.root, &self.screen.work_area, self.workspaces.count())
    }

    /// Hide everything but docks and desktops, or bring it all back
    pub fn set_showing_desktop(&mut self, showing: bool, timestamp: Timestamp) -> Result<()> {
        if self.showing_desktop == showing {
            return Ok(());
        }
        self.showing_desktop = showing;
        info!("Workspace: showing desktop = {}", showing);
        let windows: Vec<Window> = self.clients.keys().copied().collect();
        for window in windows {
            self.calc_showing(window)?;
        }
        self.conn.change_property32(
            self.screen.root,
            self.atoms.net_showing_desktop,
            AtomEnum::CARDINAL.into(),
            &[showing as u32],
        )?;
        if showing {
            let desktop = self
                .clients
                .values()
                .find(|c| c.window_type == crate::wm::client_flags::WindowType::Desktop)
                .map(|c| c.window);
            if let Some(desktop) = desktop {
                self.focus_client(desktop, timestamp)?;
            }
        } else {
            self.focus_default_window(timestamp)?;
        }
        Ok(())
    }
}
