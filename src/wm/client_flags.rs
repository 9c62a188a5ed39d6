//! Client Flags
//!
//! Bitfield flags for client state and protocol support.

use bitflags::bitflags;
use x11rb::protocol::xproto::Atom;

use crate::wm::ewmh::Atoms;

bitflags! {
    /// Window state flags, mirrored into _NET_WM_STATE
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ClientFlags: u32 {
        const ABOVE                = 1 << 0;
        const BELOW                = 1 << 1;
        const FULLSCREEN           = 1 << 2;
        const MINIMIZED            = 1 << 3;
        const MAXIMIZED_VERT       = 1 << 4;
        const MAXIMIZED_HORZ       = 1 << 5;
        const SHADED               = 1 << 6;
        const SKIP_PAGER           = 1 << 7;
        const SKIP_TASKBAR         = 1 << 8;
        const MODAL                = 1 << 9;
        const STICKY               = 1 << 10;
        const DEMANDS_ATTENTION    = 1 << 11;
    }
}

impl ClientFlags {
    pub fn maximized() -> Self {
        Self::MAXIMIZED_VERT | Self::MAXIMIZED_HORZ
    }

    pub fn is_maximized(&self) -> bool {
        self.contains(Self::maximized())
    }

    /// The flag a `_NET_WM_STATE_*` atom toggles
    pub fn from_state_atom(atom: Atom, atoms: &Atoms) -> Option<Self> {
        let table = [
            (atoms.net_wm_state_shaded, Self::SHADED),
            (atoms.net_wm_state_fullscreen, Self::FULLSCREEN),
            (atoms.net_wm_state_maximized_horz, Self::MAXIMIZED_HORZ),
            (atoms.net_wm_state_maximized_vert, Self::MAXIMIZED_VERT),
            (atoms.net_wm_state_modal, Self::MODAL),
            (atoms.net_wm_state_skip_pager, Self::SKIP_PAGER),
            (atoms.net_wm_state_skip_taskbar, Self::SKIP_TASKBAR),
            (atoms.net_wm_state_above, Self::ABOVE),
            (atoms.net_wm_state_below, Self::BELOW),
            (atoms.net_wm_state_demands_attention, Self::DEMANDS_ATTENTION),
            (atoms.net_wm_state_sticky, Self::STICKY),
        ];
        table.iter().find(|(a, _)| *a == atom).map(|(_, f)| *f)
    }
}

bitflags! {
    /// WM flags - ICCCM input model and WM_PROTOCOLS support
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct WmFlags: u32 {
        const DELETE       = 1 << 0;
        const INPUT        = 1 << 1;
        const TAKEFOCUS    = 1 << 2;
        const URGENT       = 1 << 3;
        const PING         = 1 << 4;
        const SYNC_REQUEST = 1 << 5;
    }
}

/// Window type (EWMH _NET_WM_WINDOW_TYPE)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WindowType {
    #[default]
    Normal,
    Desktop,
    Dock,
    Dialog,
    ModalDialog,
    Toolbar,
    Menu,
    Utility,
    Splashscreen,
}

impl WindowType {
    /// First recognized atom in a `_NET_WM_WINDOW_TYPE` list wins
    pub fn from_atoms(list: &[Atom], atoms: &Atoms) -> Self {
        for &atom in list {
            let t = if atom == atoms.net_wm_window_type_desktop {
                Self::Desktop
            } else if atom == atoms.net_wm_window_type_dock {
                Self::Dock
            } else if atom == atoms.net_wm_window_type_dialog {
                Self::Dialog
            } else if atom == atoms.net_wm_window_type_utility {
                Self::Utility
            } else if atom == atoms.net_wm_window_type_toolbar {
                Self::Toolbar
            } else if atom == atoms.net_wm_window_type_splash {
                Self::Splashscreen
            } else if atom == atoms.net_wm_window_type_menu {
                Self::Menu
            } else if atom == atoms.net_wm_window_type_normal {
                Self::Normal
            } else {
                continue;
            };
            return t;
        }
        Self::Normal
    }

    /// Docks and desktops take no focus on click and ignore work areas
    pub fn is_dock_or_desktop(self) -> bool {
        matches!(self, Self::Dock | Self::Desktop)
    }
}

/// Window layer (for stacking)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum WindowLayer {
    Desktop = 0,
    Below = 1,
    Normal = 2,
    Above = 3,
    Dock = 4,
    Fullscreen = 5,
}
