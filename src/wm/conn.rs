//! X connection seam
//!
//! Every protocol request the window manager makes goes through [`XConn`].
//! The live implementation is [`crate::wm::x11::X11Conn`]; unit tests use a
//! recording mock.

use anyhow::Result;
use x11rb::protocol::xproto::{Allow, Atom, ConfigureWindowAux, EventMask, Window};

use crate::shared::Geometry;
use crate::wm::error::TrappedError;
use crate::wm::geometry::Gravity;
use crate::wm::timestamp::Timestamp;

/// Cursor shown during a grab
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CursorShape {
    Default,
    Move,
    NorthWest,
    North,
    NorthEast,
    East,
    SouthEast,
    South,
    SouthWest,
    West,
}

/// Pointer position and button/modifier state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PointerState {
    pub root_x: i32,
    pub root_y: i32,
    pub mask: u16,
}

/// What the window manager needs to know about a window before managing it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientAttributes {
    pub override_redirect: bool,
    pub viewable: bool,
    /// Geometry relative to the parent, which is the root for new clients
    pub geometry: Geometry,
    pub border_width: i32,
}

/// Protocol requests issued by the window manager
pub trait XConn: 'static {
    fn flush(&self) -> Result<()>;

    fn grab_server(&self) -> Result<()>;
    fn ungrab_server(&self) -> Result<()>;

    /// Set the input focus; returns the serial of the request
    fn set_input_focus(&self, window: Window, time: Timestamp) -> Result<u64>;

    fn change_property32(&self, window: Window, property: Atom, type_: Atom, data: &[u32]) -> Result<()>;
    fn change_property8(&self, window: Window, property: Atom, type_: Atom, data: &[u8]) -> Result<()>;
    /// Zero-length append, used to provoke a PropertyNotify
    fn append_empty_property(&self, window: Window, property: Atom, type_: Atom) -> Result<()>;
    fn delete_property(&self, window: Window, property: Atom) -> Result<()>;
    /// Read a format-32 property of any type; `None` if unset
    fn get_property32(&self, window: Window, property: Atom) -> Result<Option<Vec<u32>>>;
    fn get_text_property(&self, window: Window, property: Atom) -> Result<Option<String>>;

    fn send_client_message(
        &self,
        destination: Window,
        window: Window,
        message_type: Atom,
        data: [u32; 5],
        mask: EventMask,
    ) -> Result<()>;
    /// Synthetic ConfigureNotify telling a client where it is on the root
    fn send_configure_notify(&self, window: Window, rect: Geometry, border_width: i32) -> Result<()>;

    fn configure_window(&self, window: Window, changes: &ConfigureWindowAux) -> Result<()>;
    fn set_window_gravity(&self, window: Window, gravity: Gravity) -> Result<()>;
    fn map_window(&self, window: Window) -> Result<()>;
    fn unmap_window(&self, window: Window) -> Result<()>;
    fn reparent_window(&self, window: Window, parent: Window, x: i32, y: i32) -> Result<()>;
    fn destroy_window(&self, window: Window) -> Result<()>;
    fn create_frame_window(&self, rect: Geometry) -> Result<Window>;
    fn select_input(&self, window: Window, mask: EventMask) -> Result<()>;
    fn change_save_set(&self, window: Window, insert: bool) -> Result<()>;
    fn kill_client(&self, window: Window) -> Result<()>;
    fn client_attributes(&self, window: Window) -> Result<Option<ClientAttributes>>;
    fn select_shape_input(&self, window: Window) -> Result<()>;
    fn is_shaped(&self, window: Window) -> Result<bool>;

    /// Returns whether the pointer grab succeeded
    fn grab_pointer(&self, window: Window, confine_to: Window, cursor: CursorShape, time: Timestamp) -> Result<bool>;
    fn ungrab_pointer(&self, time: Timestamp) -> Result<()>;
    /// Returns whether the keyboard grab succeeded
    fn grab_keyboard(&self, window: Window, time: Timestamp) -> Result<bool>;
    fn ungrab_keyboard(&self, time: Timestamp) -> Result<()>;
    fn allow_events(&self, mode: Allow, time: Timestamp) -> Result<()>;
    fn query_pointer(&self) -> Result<PointerState>;

    fn keycode_to_keysym(&self, keycode: u8, state: u16) -> u32;
    fn refresh_keyboard_mapping(&self) -> Result<()>;

    /// Block until a PropertyNotify for `atom` on `window` arrives and
    /// return its time; other events are queued for later dispatch
    fn wait_for_property_notify(&self, window: Window, atom: Atom) -> Result<Timestamp>;

    /// Create a Sync alarm on `counter`, triggering when it reaches the next value
    fn create_sync_alarm(&self, counter: u32) -> Result<Option<u32>>;
    fn destroy_sync_alarm(&self, alarm: u32) -> Result<()>;

    /// Start collecting errors; returns the first serial covered
    fn push_error_trap(&self) -> u64;
    /// Stop collecting errors for a trap started at `start`
    ///
    /// With `sync`, waits for the server so that every error for the covered
    /// requests has arrived and returns the first one.
    fn pop_error_trap(&self, start: u64, sync: bool) -> Result<Option<TrappedError>>;
}
