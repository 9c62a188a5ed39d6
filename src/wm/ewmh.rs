//! EWMH (Extended Window Manager Hints) atoms and root properties
//!
//! Provides compatibility with desktop apps, panels, and other X11 clients.

use anyhow::Result;
use x11rb::protocol::xproto::{Atom, AtomEnum, Window};

use crate::shared::Geometry;
use crate::wm::conn::XConn;

macro_rules! atoms {
    ($($field:ident => $name:literal,)*) => {
        /// Holds all interned ICCCM/EWMH and private atoms
        #[derive(Debug, Clone)]
        pub struct Atoms {
            $(pub $field: Atom,)*
        }

        impl Atoms {
            /// Intern every atom through `intern`
            pub fn intern_with<F>(mut intern: F) -> Result<Self>
            where
                F: FnMut(&str) -> Result<Atom>,
            {
                Ok(Self {
                    $($field: intern($name)?,)*
                })
            }

            /// Name of an atom this table knows about
            pub fn name_of(&self, atom: Atom) -> Option<&'static str> {
                $(if atom == self.$field {
                    return Some($name);
                })*
                None
            }
        }
    };
}

atoms! {
    // ICCCM
    wm_protocols => "WM_PROTOCOLS",
    wm_delete_window => "WM_DELETE_WINDOW",
    wm_take_focus => "WM_TAKE_FOCUS",
    wm_state => "WM_STATE",
    wm_change_state => "WM_CHANGE_STATE",
    wm_name => "WM_NAME",
    wm_normal_hints => "WM_NORMAL_HINTS",
    wm_hints => "WM_HINTS",
    wm_transient_for => "WM_TRANSIENT_FOR",
    utf8_string => "UTF8_STRING",
    motif_wm_hints => "_MOTIF_WM_HINTS",

    // Root properties
    net_supported => "_NET_SUPPORTED",
    net_supporting_wm_check => "_NET_SUPPORTING_WM_CHECK",
    net_client_list => "_NET_CLIENT_LIST",
    net_client_list_stacking => "_NET_CLIENT_LIST_STACKING",
    net_number_of_desktops => "_NET_NUMBER_OF_DESKTOPS",
    net_current_desktop => "_NET_CURRENT_DESKTOP",
    net_active_window => "_NET_ACTIVE_WINDOW",
    net_workarea => "_NET_WORKAREA",
    net_showing_desktop => "_NET_SHOWING_DESKTOP",

    // Window properties
    net_wm_name => "_NET_WM_NAME",
    net_wm_desktop => "_NET_WM_DESKTOP",
    net_wm_strut => "_NET_WM_STRUT",
    net_wm_strut_partial => "_NET_WM_STRUT_PARTIAL",
    net_frame_extents => "_NET_FRAME_EXTENTS",
    net_request_frame_extents => "_NET_REQUEST_FRAME_EXTENTS",
    net_wm_user_time => "_NET_WM_USER_TIME",
    net_wm_user_time_window => "_NET_WM_USER_TIME_WINDOW",
    net_wm_ping => "_NET_WM_PING",
    net_wm_sync_request => "_NET_WM_SYNC_REQUEST",
    net_wm_sync_request_counter => "_NET_WM_SYNC_REQUEST_COUNTER",
    net_close_window => "_NET_CLOSE_WINDOW",
    net_wm_moveresize => "_NET_WM_MOVERESIZE",

    net_wm_window_type => "_NET_WM_WINDOW_TYPE",
    net_wm_window_type_desktop => "_NET_WM_WINDOW_TYPE_DESKTOP",
    net_wm_window_type_dock => "_NET_WM_WINDOW_TYPE_DOCK",
    net_wm_window_type_toolbar => "_NET_WM_WINDOW_TYPE_TOOLBAR",
    net_wm_window_type_menu => "_NET_WM_WINDOW_TYPE_MENU",
    net_wm_window_type_utility => "_NET_WM_WINDOW_TYPE_UTILITY",
    net_wm_window_type_splash => "_NET_WM_WINDOW_TYPE_SPLASH",
    net_wm_window_type_dialog => "_NET_WM_WINDOW_TYPE_DIALOG",
    net_wm_window_type_normal => "_NET_WM_WINDOW_TYPE_NORMAL",

    net_wm_state => "_NET_WM_STATE",
    net_wm_state_shaded => "_NET_WM_STATE_SHADED",
    net_wm_state_modal => "_NET_WM_STATE_MODAL",
    net_wm_state_skip_pager => "_NET_WM_STATE_SKIP_PAGER",
    net_wm_state_skip_taskbar => "_NET_WM_STATE_SKIP_TASKBAR",
    net_wm_state_maximized_horz => "_NET_WM_STATE_MAXIMIZED_HORZ",
    net_wm_state_maximized_vert => "_NET_WM_STATE_MAXIMIZED_VERT",
    net_wm_state_fullscreen => "_NET_WM_STATE_FULLSCREEN",
    net_wm_state_hidden => "_NET_WM_STATE_HIDDEN",
    net_wm_state_above => "_NET_WM_STATE_ABOVE",
    net_wm_state_below => "_NET_WM_STATE_BELOW",
    net_wm_state_demands_attention => "_NET_WM_STATE_DEMANDS_ATTENTION",
    net_wm_state_sticky => "_NET_WM_STATE_STICKY",

    net_wm_allowed_actions => "_NET_WM_ALLOWED_ACTIONS",
    net_wm_action_move => "_NET_WM_ACTION_MOVE",
    net_wm_action_resize => "_NET_WM_ACTION_RESIZE",
    net_wm_action_fullscreen => "_NET_WM_ACTION_FULLSCREEN",
    net_wm_action_minimize => "_NET_WM_ACTION_MINIMIZE",
    net_wm_action_shade => "_NET_WM_ACTION_SHADE",
    net_wm_action_maximize_horz => "_NET_WM_ACTION_MAXIMIZE_HORZ",
    net_wm_action_maximize_vert => "_NET_WM_ACTION_MAXIMIZE_VERT",
    net_wm_action_change_desktop => "_NET_WM_ACTION_CHANGE_DESKTOP",
    net_wm_action_close => "_NET_WM_ACTION_CLOSE",

    // Private protocol
    areawm_timestamp_ping => "_AREAWM_TIMESTAMP_PING",
    areawm_focus_set => "_AREAWM_FOCUS_SET",
    areawm_sentinel => "_AREAWM_SENTINEL",
    areawm_restart_message => "_AREAWM_RESTART_MESSAGE",
    areawm_reload_theme_message => "_AREAWM_RELOAD_THEME_MESSAGE",
    areawm_set_keybindings_message => "_AREAWM_SET_KEYBINDINGS_MESSAGE",
    areawm_set_mousemods_message => "_AREAWM_SET_MOUSEMODS_MESSAGE",
    areawm_toggle_verbose => "_AREAWM_TOGGLE_VERBOSE",
}

impl Atoms {
    // MOTIF WM Hints constants
    pub const MWM_HINTS_DECORATIONS: u32 = 1 << 1;
    pub const MWM_DECOR_ALL: u32 = 1 << 0;
    pub const MWM_DECOR_TITLE: u32 = 1 << 3;

    /// Atoms advertised in _NET_SUPPORTED
    pub fn supported(&self) -> Vec<Atom> {
        vec![
            self.net_supported,
            self.net_supporting_wm_check,
            self.net_client_list,
            self.net_client_list_stacking,
            self.net_number_of_desktops,
            self.net_current_desktop,
            self.net_active_window,
            self.net_workarea,
            self.net_showing_desktop,
            self.net_wm_name,
            self.net_wm_desktop,
            self.net_wm_strut,
            self.net_wm_strut_partial,
            self.net_frame_extents,
            self.net_request_frame_extents,
            self.net_wm_user_time,
            self.net_wm_user_time_window,
            self.net_wm_ping,
            self.net_wm_sync_request,
            self.net_wm_sync_request_counter,
            self.net_close_window,
            self.net_wm_moveresize,
            self.net_wm_window_type,
            self.net_wm_window_type_desktop,
            self.net_wm_window_type_dock,
            self.net_wm_window_type_toolbar,
            self.net_wm_window_type_menu,
            self.net_wm_window_type_utility,
            self.net_wm_window_type_splash,
            self.net_wm_window_type_dialog,
            self.net_wm_window_type_normal,
            self.net_wm_state,
            self.net_wm_state_shaded,
            self.net_wm_state_modal,
            self.net_wm_state_skip_pager,
            self.net_wm_state_skip_taskbar,
            self.net_wm_state_maximized_horz,
            self.net_wm_state_maximized_vert,
            self.net_wm_state_fullscreen,
            self.net_wm_state_hidden,
            self.net_wm_state_above,
            self.net_wm_state_below,
            self.net_wm_state_demands_attention,
            self.net_wm_state_sticky,
            self.net_wm_allowed_actions,
            self.net_wm_action_move,
            self.net_wm_action_resize,
            self.net_wm_action_fullscreen,
            self.net_wm_action_minimize,
            self.net_wm_action_shade,
            self.net_wm_action_maximize_horz,
            self.net_wm_action_maximize_vert,
            self.net_wm_action_change_desktop,
            self.net_wm_action_close,
        ]
    }

    /// Set up _NET_SUPPORTED on root window
    pub fn setup_supported<C: XConn>(&self, conn: &C, root: Window) -> Result<()> {
        conn.change_property32(root, self.net_supported, AtomEnum::ATOM.into(), &self.supported())
    }

    /// Update _NET_ACTIVE_WINDOW
    pub fn update_active_window<C: XConn>(&self, conn: &C, root: Window, window: Option<Window>) -> Result<()> {
        conn.change_property32(
            root,
            self.net_active_window,
            AtomEnum::WINDOW.into(),
            &[window.unwrap_or(x11rb::NONE)],
        )
    }

    /// Update _NET_CLIENT_LIST or _NET_CLIENT_LIST_STACKING
    pub fn update_client_list<C: XConn>(&self, conn: &C, root: Window, stacking: bool, windows: &[Window]) -> Result<()> {
        let property = if stacking {
            self.net_client_list_stacking
        } else {
            self.net_client_list
        };
        conn.change_property32(root, property, AtomEnum::WINDOW.into(), windows)
    }

    /// Update _NET_FRAME_EXTENTS for a window
    pub fn update_frame_extents<C: XConn>(&self, conn: &C, window: Window, extents: [u32; 4]) -> Result<()> {
        conn.change_property32(window, self.net_frame_extents, AtomEnum::CARDINAL.into(), &extents)
    }

    /// Update _NET_WORKAREA, one rectangle per desktop
    pub fn update_workarea<C: XConn>(&self, conn: &C, root: Window, work_area: &Geometry, desktops: usize) -> Result<()> {
        let mut data = Vec::with_capacity(desktops * 4);
        for _ in 0..desktops.max(1) {
            data.extend_from_slice(&[
                work_area.x.max(0) as u32,
                work_area.y.max(0) as u32,
                work_area.width.max(0) as u32,
                work_area.height.max(0) as u32,
            ]);
        }
        conn.change_property32(root, self.net_workarea, AtomEnum::CARDINAL.into(), &data)
    }

    /// Whether `_MOTIF_WM_HINTS` data asks for decorations
    ///
    /// Returns `None` when the hints do not express a preference.
    pub fn motif_wants_decorations(data: &[u32]) -> Option<bool> {
        if data.len() < 3 || data[0] & Self::MWM_HINTS_DECORATIONS == 0 {
            return None;
        }
        let decorations = data[2];
        if decorations == 0 {
            return Some(false);
        }
        Some(decorations & (Self::MWM_DECOR_ALL | Self::MWM_DECOR_TITLE) != 0)
    }
}
