//! UI hooks
//!
//! Presentation that lives outside the core: frame decorations, menus,
//! popups, previews and the wireframe outline. The core only calls these
//! hooks; [`LoggingUi`] is the headless implementation.

use tracing::debug;
use x11rb::protocol::xproto::Window;

use crate::shared::{FrameBorders, Geometry};
use crate::wm::client::Client;
use crate::wm::grab::GrabOp;
use crate::wm::settings::FrameSettings;
use crate::wm::timestamp::Timestamp;

pub trait WmUi {
    /// Decoration extents for a framed client
    fn frame_borders(&self, client: &Client) -> FrameBorders;

    fn apply_frame_shape(&mut self, client: &Client) {
        debug!("UI: frame shape for {} (shaped={})", client.desc(), client.has_shape);
    }

    fn show_window_menu(&mut self, window: Window, root_x: i32, root_y: i32, button: u8, time: Timestamp) {
        debug!("UI: window menu for 0x{:x} at ({}, {}) button {} time {}", window, root_x, root_y, button, time);
    }

    fn tile_preview_show(&mut self, rect: Geometry) {
        debug!("UI: tile preview {:?}", rect);
    }

    fn tile_preview_hide(&mut self) {}

    fn tab_popup_show(&mut self, op: GrabOp, windows: &[Window]) {
        debug!("UI: popup for {:?} with {} windows", op, windows.len());
    }

    fn tab_popup_free(&mut self) {}

    fn resize_popup_free(&mut self) {}

    fn wireframe_begin(&mut self, rect: Geometry) {
        debug!("UI: wireframe begin {:?}", rect);
    }

    fn wireframe_update(&mut self, _rect: Geometry) {}

    fn wireframe_end(&mut self) {}

    /// A window failed to answer a ping after a close request
    fn show_unresponsive(&mut self, window: Window, title: &str) {
        debug!("UI: 0x{:x} ({}) is not responding", window, title);
    }
}

/// Headless UI: fixed frame sizes from the settings, hooks only log
#[derive(Debug, Clone)]
pub struct LoggingUi {
    frame: FrameSettings,
}

impl LoggingUi {
    pub fn new(frame: FrameSettings) -> Self {
        Self { frame }
    }
}

impl WmUi for LoggingUi {
    fn frame_borders(&self, client: &Client) -> FrameBorders {
        if client.is_fullscreen() {
            return FrameBorders::default();
        }
        let bw = self.frame.border_width;
        FrameBorders::new(bw, bw, self.frame.title_height + bw, bw)
    }
}
