//! Window actions
//!
//! Maximize, minimize, fullscreen, shade, tile and activate. Each one
//! updates the client flags, lets the geometry pipeline recompute the
//! rectangle and republishes `_NET_WM_STATE`.

use anyhow::Result;
use tracing::{debug, info};
use x11rb::protocol::xproto::Window;

use crate::wm::client_flags::ClientFlags;
use crate::wm::conn::XConn;
use crate::wm::display::Display;
use crate::wm::geometry::{Gravity, MoveResizeFlags};
use crate::wm::grab::TileMode;
use crate::wm::moveresize::tile_rect;
use crate::wm::timestamp::Timestamp;

impl<C: XConn> Display<C> {
    /// Maximize in the given directions (a subset of [`ClientFlags::maximized`])
    pub fn maximize(&mut self, window: Window, directions: ClientFlags) -> Result<()> {
        let directions = directions & ClientFlags::maximized();
        let Some(client) = self.clients.get_mut(&window) else {
            return Ok(());
        };
        if client.state.contains(directions) {
            return Ok(());
        }
        if !client.state.intersects(ClientFlags::maximized() | ClientFlags::FULLSCREEN) {
            client.saved_rect = client.rect;
        }
        info!("Actions: maximizing {} {:?}", client.desc(), directions);
        client.state.insert(directions);
        self.refit_maximized(window)?;
        self.set_net_wm_state(window)
    }

    /// Drop maximization in the given directions, restoring the saved geometry there
    pub fn unmaximize(&mut self, window: Window, directions: ClientFlags) -> Result<()> {
        let directions = directions & ClientFlags::maximized();
        let Some(client) = self.clients.get_mut(&window) else {
            return Ok(());
        };
        if !client.state.intersects(directions) {
            return Ok(());
        }
        info!("Actions: unmaximizing {} {:?}", client.desc(), directions);
        client.state.remove(directions);
        let saved = client.saved_rect;
        let mut target = client.rect;
        if directions.contains(ClientFlags::MAXIMIZED_HORZ) {
            target.x = saved.x;
            target.width = saved.width;
        }
        if directions.contains(ClientFlags::MAXIMIZED_VERT) {
            target.y = saved.y;
            target.height = saved.height;
        }
        self.move_resize_internal(
            window,
            MoveResizeFlags::IS_MOVE_ACTION | MoveResizeFlags::IS_RESIZE_ACTION,
            Gravity::NorthWest,
            target.x,
            target.y,
            target.width,
            target.height,
        )?;
        self.set_net_wm_state(window)
    }

    /// Run the current geometry back through the constraints
    ///
    /// Maximized and fullscreen windows pick up a new work area this way.
    pub fn refit_maximized(&mut self, window: Window) -> Result<()> {
        let Some(rect) = self.clients.get(&window).map(|c| c.rect) else {
            return Ok(());
        };
        self.move_resize_internal(
            window,
            MoveResizeFlags::IS_MOVE_ACTION | MoveResizeFlags::IS_RESIZE_ACTION,
            Gravity::NorthWest,
            rect.x,
            rect.y,
            rect.width,
            rect.height,
        )
    }

    /// Fill half of the work area under the window
    pub fn tile_window(&mut self, window: Window, mode: TileMode) -> Result<()> {
        let Some(client) = self.clients.get_mut(&window) else {
            return Ok(());
        };
        let (cx, cy) = client.outer_rect().center();
        let work = self.screen.work_area_at(cx, cy);
        let Some(target) = tile_rect(mode, &work) else {
            return Ok(());
        };
        if !client.is_resizable() {
            debug!("Actions: {} is not resizable, not tiling", client.desc());
            return Ok(());
        }
        if !client.state.intersects(ClientFlags::maximized() | ClientFlags::FULLSCREEN) {
            client.saved_rect = client.rect;
        }
        info!("Actions: tiling {} {:?}", client.desc(), mode);
        client.state.insert(ClientFlags::MAXIMIZED_VERT);
        let b = client.borders_or_zero();
        self.move_resize_window(
            window,
            true,
            target.x + b.left,
            target.y + b.top,
            target.width - b.left - b.right,
            target.height - b.top - b.bottom,
        )?;
        self.set_net_wm_state(window)
    }

    pub fn minimize(&mut self, window: Window) -> Result<()> {
        let Some(client) = self.clients.get_mut(&window) else {
            return Ok(());
        };
        if client.is_minimized() {
            return Ok(());
        }
        info!("Actions: minimizing {}", client.desc());
        client.state.insert(ClientFlags::MINIMIZED);
        self.calc_showing(window)?;
        self.set_net_wm_state(window)
    }

    pub fn unminimize(&mut self, window: Window) -> Result<()> {
        let Some(client) = self.clients.get_mut(&window) else {
            return Ok(());
        };
        if !client.is_minimized() {
            return Ok(());
        }
        info!("Actions: unminimizing {}", client.desc());
        client.state.remove(ClientFlags::MINIMIZED);
        self.calc_showing(window)?;
        self.set_net_wm_state(window)
    }

    /// Enter or leave fullscreen; the frame borders collapse while fullscreen
    pub fn set_fullscreen(&mut self, window: Window, fullscreen: bool) -> Result<()> {
        let Some(client) = self.clients.get_mut(&window) else {
            return Ok(());
        };
        if client.is_fullscreen() == fullscreen {
            return Ok(());
        }
        info!("Actions: {} fullscreen = {}", client.desc(), fullscreen);
        let was_maximized = client.state.intersects(ClientFlags::maximized());
        if fullscreen && !was_maximized {
            client.saved_rect = client.rect;
        }
        client.state.set(ClientFlags::FULLSCREEN, fullscreen);
        let saved = client.saved_rect;

        if fullscreen || was_maximized {
            self.refit_maximized(window)?;
        } else {
            self.move_resize_internal(
                window,
                MoveResizeFlags::IS_MOVE_ACTION | MoveResizeFlags::IS_RESIZE_ACTION,
                Gravity::NorthWest,
                saved.x,
                saved.y,
                saved.width,
                saved.height,
            )?;
        }
        self.update_layer(window)?;
        self.set_net_wm_state(window)
    }

    /// Roll the window up into its titlebar, or back down
    pub fn set_shaded(&mut self, window: Window, shaded: bool) -> Result<()> {
        let Some(client) = self.clients.get_mut(&window) else {
            return Ok(());
        };
        if client.is_shaded() == shaded {
            return Ok(());
        }
        if client.frame.is_none() && shaded {
            debug!("Actions: {} has no frame to shade into", client.desc());
            return Ok(());
        }
        info!("Actions: {} shaded = {}", client.desc(), shaded);
        client.state.set(ClientFlags::SHADED, shaded);
        self.refit_maximized(window)?;
        self.set_net_wm_state(window)
    }

    /// Bring a window to the user: its workspace, unminimized, raised and focused
    pub fn activate(&mut self, window: Window, timestamp: Timestamp) -> Result<()> {
        let Some(client) = self.clients.get(&window) else {
            return Ok(());
        };
        let (sticky, workspace) = (client.is_sticky(), client.workspace);
        if !sticky && workspace != self.workspaces.active() {
            self.activate_workspace(workspace, timestamp)?;
        }
        self.unminimize(window)?;
        self.raise_window(window)?;
        self.focus_client(window, timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wm::testing::{test_display, Request};

    #[test]
    fn test_maximize_fills_work_area_and_restores() {
        let mut display = test_display();
        let window = display.add_test_client(0x400001);
        let before = display.clients[&window].rect;

        display.maximize(window, ClientFlags::maximized()).unwrap();
        let client = &display.clients[&window];
        assert_eq!(client.outer_rect(), display.screen.work_area);
        assert_eq!(client.saved_rect, before);

        display.unmaximize(window, ClientFlags::maximized()).unwrap();
        assert_eq!(display.clients[&window].rect, before);
    }

    #[test]
    fn test_unmaximize_one_direction() {
        let mut display = test_display();
        let window = display.add_test_client(0x400001);
        let before = display.clients[&window].rect;
        display.maximize(window, ClientFlags::maximized()).unwrap();
        display.unmaximize(window, ClientFlags::MAXIMIZED_HORZ).unwrap();
        let client = &display.clients[&window];
        assert!(client.state.contains(ClientFlags::MAXIMIZED_VERT));
        assert_eq!(client.rect.width, before.width);
        assert_eq!(client.outer_rect().height, display.screen.work_area.height);
    }

    #[test]
    fn test_fullscreen_covers_monitor() {
        let mut display = test_display();
        let window = display.add_test_client(0x400001);
        let before = display.clients[&window].rect;
        display.set_fullscreen(window, true).unwrap();
        assert_eq!(display.clients[&window].rect, display.screen.rect());

        display.set_fullscreen(window, false).unwrap();
        assert_eq!(display.clients[&window].rect, before);
    }

    #[test]
    fn test_minimize_hides_frame() {
        let mut display = test_display();
        let window = display.add_test_client(0x400001);
        let frame = display.clients[&window].frame.unwrap().xwindow;
        display.minimize(window).unwrap();
        assert!(!display.clients[&window].mapped);
        assert!(display
            .conn
            .requests()
            .iter()
            .any(|r| matches!(r, Request::UnmapWindow { window } if *window == frame)));

        display.unminimize(window).unwrap();
        assert!(display.clients[&window].mapped);
    }

    #[test]
    fn test_tile_left_half() {
        let mut display = test_display();
        let window = display.add_test_client(0x400001);
        display.tile_window(window, TileMode::Left).unwrap();
        let work = display.screen.work_area;
        let outer = display.clients[&window].outer_rect();
        assert_eq!(outer.x, work.x);
        assert_eq!(outer.width, work.width / 2);
        assert_eq!(outer.height, work.height);
    }

    #[test]
    fn test_activate_switches_workspace() {
        let mut display = test_display();
        let window = display.add_test_client(0x400001);
        display.change_workspace(window, 1).unwrap();
        display.minimize(window).unwrap();
        display.activate(window, 100).unwrap();
        assert_eq!(display.workspaces.active(), 1);
        assert!(display.clients[&window].mapped);
        assert_eq!(display.focus.expected_focus_window, Some(window));
    }
}
