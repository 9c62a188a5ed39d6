//! Settings Module
//!
//! Window manager preferences, read from the `[window_manager]` table of the
//! configuration file.

use serde::{Deserialize, Serialize};
use x11rb::protocol::xproto::KeyButMask;

/// Focus policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FocusMode {
    Click,
    Sloppy,
    Mouse,
}

/// Modifier that turns a button press anywhere on a window into a move or resize
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModifierKey {
    Shift,
    Control,
    Mod1,
    Mod2,
    Mod3,
    Mod4,
    Mod5,
}

impl ModifierKey {
    pub fn mask(self) -> u16 {
        let mask = match self {
            ModifierKey::Shift => KeyButMask::SHIFT,
            ModifierKey::Control => KeyButMask::CONTROL,
            ModifierKey::Mod1 => KeyButMask::MOD1,
            ModifierKey::Mod2 => KeyButMask::MOD2,
            ModifierKey::Mod3 => KeyButMask::MOD3,
            ModifierKey::Mod4 => KeyButMask::MOD4,
            ModifierKey::Mod5 => KeyButMask::MOD5,
        };
        u16::from(mask)
    }
}

/// Frame border sizes handed to the geometry pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameSettings {
    pub title_height: i32,
    pub border_width: i32,
}

impl Default for FrameSettings {
    fn default() -> Self {
        Self {
            title_height: 24,
            border_width: 2,
        }
    }
}

/// Window manager settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowManagerSettings {
    /// Focus policy
    pub focus_mode: FocusMode,

    /// Raise on click
    pub raise_on_click: bool,

    /// Raise windows a while after they gain focus by entering them
    pub auto_raise: bool,
    pub auto_raise_delay_ms: u64,

    /// Use wireframe move/resize
    pub reduced_resources: bool,

    /// Accessibility tools are running; disables wireframe mode
    pub accessibility: bool,

    /// Stop accommodating applications that position themselves
    pub disable_workarounds: bool,

    /// Modifier for window-anywhere move/resize
    pub mouse_button_mods: ModifierKey,

    /// Resize with the right button and show the menu on the middle one
    pub resize_with_right_button: bool,

    /// Modal dialogs move together with their parent
    pub attach_modal_dialogs: bool,

    /// Workspace count
    pub workspace_count: u32,

    /// Snap to edges
    pub snap_to_edges: bool,

    /// Snap distance
    pub snap_distance: i32,

    /// Pointer travel before a press turns into a drag
    pub drag_threshold: i32,

    /// How long a client gets to answer _NET_WM_PING
    pub ping_timeout_ms: u64,

    /// Let the server keep client positions during frame reconfiguration
    pub use_static_gravity: bool,

    /// Tile windows dragged to a screen edge
    pub edge_tiling: bool,

    /// Frame border sizes
    pub frame: FrameSettings,
}

impl Default for WindowManagerSettings {
    fn default() -> Self {
        Self {
            focus_mode: FocusMode::Click,
            raise_on_click: true,
            auto_raise: false,
            auto_raise_delay_ms: 500,
            reduced_resources: false,
            accessibility: false,
            disable_workarounds: false,
            mouse_button_mods: ModifierKey::Mod1,
            resize_with_right_button: false,
            attach_modal_dialogs: false,
            workspace_count: 4,
            snap_to_edges: true,
            snap_distance: 10,
            drag_threshold: 8,
            ping_timeout_ms: 5000,
            use_static_gravity: false,
            edge_tiling: false,
            frame: FrameSettings::default(),
        }
    }
}

impl WindowManagerSettings {
    /// Mouse buttons for resizing and for the window menu
    pub fn resize_and_menu_buttons(&self) -> (u8, u8) {
        if self.resize_with_right_button {
            (3, 2)
        } else {
            (2, 3)
        }
    }
}
