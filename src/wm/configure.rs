//! Window geometry pipeline: stateful part
//!
//! Every size or position change of a managed window ends up in
//! [`Display::move_resize_internal`], which constrains the request, decides
//! the frame and client configures with [`plan_configure`] and issues them.

use anyhow::Result;
use tracing::{debug, warn};
use x11rb::protocol::xproto::{ConfigWindow, ConfigureRequestEvent, EventMask, StackMode, Window};

use crate::shared::Geometry;
use crate::wm::client_flags::{ClientFlags, WindowType, WmFlags};
use crate::wm::conn::XConn;
use crate::wm::constraints::{constrain, ConstraintInput, ConstraintState};
use crate::wm::display::Display;
use crate::wm::error_trap::ErrorTrap;
use crate::wm::geometry::{
    adjust_for_gravity, gravity_position, mouse_deltas_for_resize, plan_configure, resize_with_gravity, Gravity,
    MoveResizeFlags, PlanInput,
};
use crate::wm::hints::SizeHintFlags;

impl<C: XConn> Display<C> {
    /// Move and/or resize a client
    ///
    /// `(x, y)` is the client's north-west corner in root coordinates, or the
    /// gravity reference point for configure requests and gravity adjusts.
    #[allow(clippy::too_many_arguments)]
    pub fn move_resize_internal(
        &mut self,
        window: Window,
        flags: MoveResizeFlags,
        resize_gravity: Gravity,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
    ) -> Result<()> {
        let Some(client) = self.clients.get(&window) else {
            debug!("Configure: 0x{:x} is not managed", window);
            return Ok(());
        };
        let is_configure_request = flags.contains(MoveResizeFlags::IS_CONFIGURE_REQUEST);
        let old_rect = client.rect;
        let old_frame = client.frame;
        let new_borders = old_frame.map(|_| self.ui.frame_borders(client));

        let (mut x, mut y) = (x, y);
        if is_configure_request || flags.contains(MoveResizeFlags::DO_GRAVITY_ADJUST) {
            (x, y) = adjust_for_gravity(
                client.size_hints.gravity(),
                new_borders.as_ref(),
                is_configure_request,
                client.border_width,
                x,
                y,
                width,
                height,
            );
        }

        // The moving edges follow the size change; the resize gravity anchor stays
        let proposed = resize_with_gravity(
            &Geometry::new(x, y, old_rect.width, old_rect.height),
            width,
            height,
            resize_gravity,
        );
        let deltas = mouse_deltas_for_resize(resize_gravity, &old_rect, width, height);
        let monitors = self.screen.monitor_rects();
        let grabbed_move = self.grab.window == Some(window) && self.grab.op.is_moving();
        let snap_distance = (grabbed_move && self.grab.snap).then_some(self.settings.snap_distance);
        let state = ConstraintState {
            maximized_horizontally: client.state.contains(ClientFlags::MAXIMIZED_HORZ),
            maximized_vertically: client.state.contains(ClientFlags::MAXIMIZED_VERT),
            fullscreen: client.is_fullscreen(),
            shaded: client.is_shaded(),
            exempt_from_onscreen: client.is_dock_or_desktop(),
            require_fully_onscreen: client.require_fully_onscreen,
        };
        let new_rect = constrain(&ConstraintInput {
            flags,
            resize_gravity,
            orig: old_rect,
            proposed,
            deltas,
            hints: &client.size_hints,
            borders: new_borders.unwrap_or_default(),
            monitors: &monitors,
            work_area: self.screen.work_area,
            state,
            snap_distance,
        });

        let plan = plan_configure(&PlanInput {
            flags,
            old_rect,
            new_rect,
            old_frame_rect: old_frame.map(|f| f.rect),
            old_borders: old_frame.map(|f| f.borders),
            new_borders,
            shaded: client.is_shaded(),
            border_width: client.border_width,
            static_gravity_works: self.settings.use_static_gravity,
        });

        if self.verbose {
            debug!(
                "Configure: {} {:?} -> {:?} (flags {:?}, frame first {})",
                client.desc(),
                old_rect,
                new_rect,
                flags,
                plan.configure_frame_first
            );
        }

        let wants_sync = plan.need_resize_client
            && self.grab.window == Some(window)
            && self.grab.sync_alarm.is_some()
            && client.sync_request_counter.is_some()
            && client.sync_request_time.is_none()
            && !client.disable_sync;
        let border_width = client.border_width;

        if plan.extents_changed {
            if let Some(borders) = new_borders {
                self.atoms
                    .update_frame_extents(&self.conn, window, borders.as_extents())?;
            }
        }

        if wants_sync {
            self.send_sync_request(window)?;
        }

        if plan.use_static_gravity {
            self.conn.set_window_gravity(window, Gravity::Static)?;
        }

        let frame_xwindow = old_frame.map(|f| f.xwindow);
        if plan.configure_frame_first {
            if let (Some(frame), Some(changes)) = (frame_xwindow, &plan.frame_changes) {
                self.conn.configure_window(frame, changes)?;
            }
        }

        if let Some(changes) = &plan.client_changes {
            let trap = ErrorTrap::new(&self.conn);
            self.conn.configure_window(window, changes)?;
            if let Err(err) = trap.finish() {
                debug!("Configure: 0x{:x} went away during configure ({})", window, err);
            }
        }

        if !plan.configure_frame_first {
            if let (Some(frame), Some(changes)) = (frame_xwindow, &plan.frame_changes) {
                self.conn.configure_window(frame, changes)?;
            }
        }

        if plan.use_static_gravity {
            self.conn.set_window_gravity(window, Gravity::NorthWest)?;
        }

        let work_area = self.screen.work_area;
        let Some(client) = self.clients.get_mut(&window) else {
            return Ok(());
        };
        client.rect = new_rect;
        if let (Some(frame), Some(rect), Some(borders)) = (client.frame.as_mut(), plan.new_frame_rect, new_borders) {
            frame.rect = rect;
            frame.borders = borders;
        }
        if flags.contains(MoveResizeFlags::IS_USER_ACTION) {
            client.user_rect = new_rect;
            let outer = client.outer_rect();
            client.require_fully_onscreen = outer.intersection(&work_area) == Some(outer);
        }

        if plan.need_configure_notify {
            self.conn.send_configure_notify(window, new_rect, border_width)?;
        }
        if plan.need_resize_frame && client.has_shape {
            let client = &self.clients[&window];
            self.ui.apply_frame_shape(client);
        }
        Ok(())
    }

    /// Ask a client to update its sync counter after the next configure
    pub fn send_sync_request(&mut self, window: Window) -> Result<()> {
        let now = self.instant();
        let timestamp = self.now();
        let Some(client) = self.clients.get_mut(&window) else {
            return Ok(());
        };
        if !client.wm_flags.contains(WmFlags::SYNC_REQUEST) {
            return Ok(());
        }
        client.sync_request_serial += 1;
        client.sync_request_time = Some(now);
        let serial = client.sync_request_serial;
        debug!("Configure: sync request {} to {}", serial, client.desc());
        self.conn.send_client_message(
            window,
            window,
            self.atoms.wm_protocols,
            [
                self.atoms.net_wm_sync_request,
                timestamp,
                (serial & 0xFFFF_FFFF) as u32,
                (serial >> 32) as u32,
                0,
            ],
            EventMask::NO_EVENT,
        )
    }

    /// Move a client, keeping its size
    pub fn move_window(&mut self, window: Window, user: bool, x: i32, y: i32) -> Result<()> {
        let Some(client) = self.clients.get(&window) else {
            return Ok(());
        };
        let rect = client.rect;
        let mut flags = MoveResizeFlags::IS_MOVE_ACTION;
        flags.set(MoveResizeFlags::IS_USER_ACTION, user);
        self.move_resize_internal(window, flags, Gravity::NorthWest, x, y, rect.width, rect.height)
    }

    /// Resize a client, keeping its north-west corner
    pub fn resize_window(&mut self, window: Window, user: bool, width: i32, height: i32) -> Result<()> {
        self.resize_window_with_gravity(window, user, width, height, Gravity::NorthWest)
    }

    pub fn move_resize_window(
        &mut self,
        window: Window,
        user: bool,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
    ) -> Result<()> {
        let mut flags = MoveResizeFlags::IS_MOVE_ACTION | MoveResizeFlags::IS_RESIZE_ACTION;
        flags.set(MoveResizeFlags::IS_USER_ACTION, user);
        self.move_resize_internal(window, flags, Gravity::NorthWest, x, y, width, height)
    }

    /// Resize a client; `gravity` is the anchor the constraints keep fixed
    pub fn resize_window_with_gravity(
        &mut self,
        window: Window,
        user: bool,
        width: i32,
        height: i32,
        gravity: Gravity,
    ) -> Result<()> {
        let Some(client) = self.clients.get(&window) else {
            return Ok(());
        };
        let rect = client.rect;
        let mut flags = MoveResizeFlags::IS_RESIZE_ACTION;
        flags.set(MoveResizeFlags::IS_USER_ACTION, user);
        self.move_resize_internal(window, flags, gravity, rect.x, rect.y, width, height)
    }

    /// Whether a configure request may move this window
    fn configure_request_may_move(&self, window: Window) -> bool {
        let Some(client) = self.clients.get(&window) else {
            return false;
        };
        if !self.settings.disable_workarounds {
            return true;
        }
        match client.window_type {
            WindowType::Dialog | WindowType::ModalDialog | WindowType::Splashscreen => false,
            _ => {
                let flags = client.size_hints.flags;
                flags.contains(SizeHintFlags::P_POSITION)
                    || (flags.contains(SizeHintFlags::US_POSITION) && !client.placed)
            }
        }
    }

    /// A client asked to change its own geometry or stacking
    pub fn configure_request(&mut self, window: Window, event: &ConfigureRequestEvent) -> Result<()> {
        let mask = event.value_mask;
        let in_grab = self.grab.window == Some(window) && self.grab.op.is_mouse_only();
        let may_move = !in_grab && self.configure_request_may_move(window);

        let Some(client) = self.clients.get_mut(&window) else {
            return Ok(());
        };
        if mask.contains(ConfigWindow::BORDER_WIDTH) {
            client.border_width = i32::from(event.border_width);
        }

        let gravity = client.size_hints.gravity();
        let (mut x, mut y) = gravity_position(gravity, &client.rect, client.borders().as_ref(), client.is_shaded());
        let (mut width, mut height) = (client.rect.width, client.rect.height);

        let mut only_resize = true;
        if may_move {
            if mask.contains(ConfigWindow::X) {
                x = i32::from(event.x);
                only_resize = false;
            }
            if mask.contains(ConfigWindow::Y) {
                y = i32::from(event.y);
                only_resize = false;
            }
            if !only_resize {
                client.placed = true;
            }
        } else if mask.contains(ConfigWindow::X) || mask.contains(ConfigWindow::Y) {
            debug!("Configure: ignoring position request from {}", client.desc());
        }

        if in_grab {
            debug!("Configure: {} is being moved or resized, answering with current geometry", client.desc());
        } else {
            if mask.contains(ConfigWindow::WIDTH) {
                width = i32::from(event.width);
            }
            if mask.contains(ConfigWindow::HEIGHT) {
                height = i32::from(event.height);
            }
        }
        if width <= 0 || height <= 0 {
            warn!("Configure: {} asked for {}x{}, ignoring size", client.desc(), width, height);
            width = client.rect.width;
            height = client.rect.height;
        }

        let resize_gravity = if only_resize { gravity } else { Gravity::NorthWest };
        self.move_resize_internal(
            window,
            MoveResizeFlags::IS_CONFIGURE_REQUEST,
            resize_gravity,
            x,
            y,
            width,
            height,
        )?;

        if mask.contains(ConfigWindow::STACK_MODE) {
            match event.stack_mode {
                StackMode::ABOVE => self.raise_window(window)?,
                StackMode::BELOW => self.lower_window(window)?,
                mode => debug!("Configure: ignoring stack mode {:?} for 0x{:x}", mode, window),
            }
        }
        Ok(())
    }
}
