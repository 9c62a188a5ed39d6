//! Live X connection
//!
//! [`X11Conn`] implements [`XConn`] over an x11rb `RustConnection`. Events
//! read while blocking for a reply (timestamp round trips, trap syncs) are
//! kept in a local queue and handed to the dispatcher in order. X errors whose
//! sequence falls inside an open error trap are captured instead of queued.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};
use x11rb::connection::{Connection, RequestConnection};
use x11rb::cookie::VoidCookie;
use x11rb::errors::ReplyError;
use x11rb::protocol::shape::ConnectionExt as _;
use x11rb::protocol::sync::{self, ConnectionExt as _};
use x11rb::protocol::xproto::{
    self, Allow, Atom, AtomEnum, ChangeWindowAttributesAux, ClientMessageEvent, ConfigureNotifyEvent,
    ConfigureWindowAux, ConnectionExt as _, CreateWindowAux, EventMask, GrabMode, GrabStatus, InputFocus, MapState,
    PropMode, SetMode, Window, WindowClass,
};
use x11rb::protocol::Event;
use x11rb::rust_connection::RustConnection;
use x11rb::wrapper::ConnectionExt as _;
use x11rb::x11_utils::X11Error;

use crate::shared::Geometry;
use crate::wm::conn::{ClientAttributes, CursorShape, PointerState, XConn};
use crate::wm::display::{Display, Extensions};
use crate::wm::error::{TrappedError, WmError};
use crate::wm::ewmh::Atoms;
use crate::wm::geometry::Gravity;
use crate::wm::screen::{Monitor, ScreenInfo};
use crate::wm::settings::WindowManagerSettings;
use crate::wm::timers::SystemClock;
use crate::wm::timestamp::Timestamp;
use crate::wm::ui::WmUi;

/// Closed trap ranges remembered so late errors for them stay quiet
const CLOSED_TRAP_HISTORY: usize = 64;

/// Glyphs in the core cursor font
mod glyph {
    pub const FLEUR: u16 = 52;
    pub const LEFT_PTR: u16 = 68;
    pub const TOP_LEFT_CORNER: u16 = 134;
    pub const TOP_SIDE: u16 = 138;
    pub const TOP_RIGHT_CORNER: u16 = 136;
    pub const RIGHT_SIDE: u16 = 96;
    pub const BOTTOM_RIGHT_CORNER: u16 = 14;
    pub const BOTTOM_SIDE: u16 = 16;
    pub const BOTTOM_LEFT_CORNER: u16 = 12;
    pub const LEFT_SIDE: u16 = 70;
}

#[derive(Debug, Default)]
struct KeyboardMap {
    min_keycode: u8,
    keysyms_per_keycode: u8,
    keysyms: Vec<u32>,
}

impl KeyboardMap {
    fn keysym(&self, keycode: u8, shifted: bool) -> u32 {
        let per = usize::from(self.keysyms_per_keycode);
        if per == 0 || keycode < self.min_keycode {
            return 0;
        }
        let base = usize::from(keycode - self.min_keycode) * per;
        let lookup = |col: usize| self.keysyms.get(base + col).copied().unwrap_or(0);
        if shifted && per > 1 {
            match lookup(1) {
                0 => lookup(0),
                sym => sym,
            }
        } else {
            lookup(0)
        }
    }
}

/// An open error trap: errors for requests from `start` on are captured
#[derive(Debug)]
struct Trap {
    start: u64,
    errors: Vec<TrappedError>,
}

/// x11rb-backed connection for one screen
pub struct X11Conn {
    conn: Arc<RustConnection>,
    screen_num: usize,
    root: Window,
    black_pixel: u32,
    have_sync: bool,
    cursors: HashMap<CursorShape, u32>,
    keymap: RefCell<KeyboardMap>,
    last_serial: Cell<u64>,
    pending: RefCell<VecDeque<(Event, u64)>>,
    traps: RefCell<Vec<Trap>>,
    closed_traps: RefCell<VecDeque<(u64, u64)>>,
}

fn trapped_from(error: &X11Error, sequence: u64) -> TrappedError {
    TrappedError {
        error_code: error.error_code,
        major_opcode: error.major_opcode,
        minor_opcode: error.minor_opcode,
        bad_value: error.bad_value,
        sequence,
    }
}

/// Clamp a coordinate into the 16-bit protocol range
fn coord(v: i32) -> i16 {
    v.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16
}

fn extent(v: i32) -> u16 {
    v.clamp(1, i32::from(u16::MAX)) as u16
}

impl X11Conn {
    /// Wrap a connection; loads the cursors and the keyboard map
    pub fn new(conn: Arc<RustConnection>, screen_num: usize, have_sync: bool) -> Result<Self> {
        let screen = conn
            .setup()
            .roots
            .get(screen_num)
            .ok_or_else(|| WmError::Connection(format!("no screen {}", screen_num)))?;
        let (root, black_pixel) = (screen.root, screen.black_pixel);
        let cursors = Self::create_cursors(&conn)?;

        let x11 = Self {
            conn,
            screen_num,
            root,
            black_pixel,
            have_sync,
            cursors,
            keymap: RefCell::new(KeyboardMap::default()),
            last_serial: Cell::new(0),
            pending: RefCell::new(VecDeque::new()),
            traps: RefCell::new(Vec::new()),
            closed_traps: RefCell::new(VecDeque::new()),
        };
        x11.refresh_keyboard_mapping()?;
        Ok(x11)
    }

    fn create_cursors(conn: &RustConnection) -> Result<HashMap<CursorShape, u32>> {
        let font = conn.generate_id()?;
        conn.open_font(font, b"cursor")?;

        let create = |glyph: u16| -> Result<u32> {
            let cursor = conn.generate_id()?;
            conn.create_glyph_cursor(cursor, font, font, glyph, glyph + 1, 0, 0, 0, 0xffff, 0xffff, 0xffff)?;
            Ok(cursor)
        };

        let mut cursors = HashMap::new();
        cursors.insert(CursorShape::Default, create(glyph::LEFT_PTR)?);
        cursors.insert(CursorShape::Move, create(glyph::FLEUR)?);
        cursors.insert(CursorShape::NorthWest, create(glyph::TOP_LEFT_CORNER)?);
        cursors.insert(CursorShape::North, create(glyph::TOP_SIDE)?);
        cursors.insert(CursorShape::NorthEast, create(glyph::TOP_RIGHT_CORNER)?);
        cursors.insert(CursorShape::East, create(glyph::RIGHT_SIDE)?);
        cursors.insert(CursorShape::SouthEast, create(glyph::BOTTOM_RIGHT_CORNER)?);
        cursors.insert(CursorShape::South, create(glyph::BOTTOM_SIDE)?);
        cursors.insert(CursorShape::SouthWest, create(glyph::BOTTOM_LEFT_CORNER)?);
        cursors.insert(CursorShape::West, create(glyph::LEFT_SIDE)?);
        conn.close_font(font)?;
        Ok(cursors)
    }

    pub fn connection(&self) -> &Arc<RustConnection> {
        &self.conn
    }

    pub fn screen_num(&self) -> usize {
        self.screen_num
    }

    pub fn cursor(&self, shape: CursorShape) -> u32 {
        self.cursors.get(&shape).copied().unwrap_or(x11rb::NONE)
    }

    /// Send a request whose errors arrive as events
    fn send<C: RequestConnection + ?Sized>(&self, cookie: VoidCookie<'_, C>) {
        self.last_serial.set(cookie.sequence_number());
        drop(cookie);
    }

    /// Route one event read off the wire: trapped errors are captured, the rest queued
    fn classify(&self, event: Event, sequence: u64) {
        if let Event::Error(ref error) = event {
            let mut traps = self.traps.borrow_mut();
            if let Some(trap) = traps.iter_mut().rev().find(|t| sequence >= t.start) {
                trap.errors.push(trapped_from(error, sequence));
                return;
            }
            let closed = self.closed_traps.borrow();
            if closed.iter().any(|&(start, end)| sequence >= start && sequence <= end) {
                debug!("X11: late error for a closed trap: {:?}", error.error_kind);
                return;
            }
        }
        self.pending.borrow_mut().push_back((event, sequence));
    }

    /// Move everything the server already sent into the local queue
    fn drain(&self) -> Result<()> {
        while let Some((event, sequence)) = self.conn.poll_for_event_with_sequence()? {
            self.classify(event, sequence);
        }
        Ok(())
    }

    /// Next event with its full sequence number, without blocking
    pub fn poll_event(&self) -> Result<Option<(Event, u64)>> {
        self.drain()?;
        Ok(self.pending.borrow_mut().pop_front())
    }

    /// Treat a reply error for a vanished resource as absence
    fn absent_on_x11_error<T>(result: Result<T, ReplyError>) -> Result<Option<T>> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(ReplyError::X11Error(error)) => {
                debug!("X11: request failed with {:?}", error.error_kind);
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }
}

impl XConn for X11Conn {
    fn flush(&self) -> Result<()> {
        self.conn.flush()?;
        Ok(())
    }

    fn grab_server(&self) -> Result<()> {
        self.send(self.conn.grab_server()?);
        Ok(())
    }

    fn ungrab_server(&self) -> Result<()> {
        self.send(self.conn.ungrab_server()?);
        Ok(())
    }

    fn set_input_focus(&self, window: Window, time: Timestamp) -> Result<u64> {
        let cookie = self.conn.set_input_focus(InputFocus::POINTER_ROOT, window, time)?;
        let serial = cookie.sequence_number();
        self.send(cookie);
        Ok(serial)
    }

    fn change_property32(&self, window: Window, property: Atom, type_: Atom, data: &[u32]) -> Result<()> {
        self.send(self.conn.change_property32(PropMode::REPLACE, window, property, type_, data)?);
        Ok(())
    }

    fn change_property8(&self, window: Window, property: Atom, type_: Atom, data: &[u8]) -> Result<()> {
        self.send(self.conn.change_property8(PropMode::REPLACE, window, property, type_, data)?);
        Ok(())
    }

    fn append_empty_property(&self, window: Window, property: Atom, type_: Atom) -> Result<()> {
        self.send(self.conn.change_property8(PropMode::APPEND, window, property, type_, &[])?);
        Ok(())
    }

    fn delete_property(&self, window: Window, property: Atom) -> Result<()> {
        self.send(self.conn.delete_property(window, property)?);
        Ok(())
    }

    fn get_property32(&self, window: Window, property: Atom) -> Result<Option<Vec<u32>>> {
        let cookie = self
            .conn
            .get_property(false, window, property, AtomEnum::ANY, 0, u32::MAX / 4)?;
        let Some(reply) = Self::absent_on_x11_error(cookie.reply())? else {
            return Ok(None);
        };
        if reply.type_ == x11rb::NONE {
            return Ok(None);
        }
        match reply.value32() {
            Some(values) => Ok(Some(values.collect())),
            None => {
                warn!("X11: property {} on 0x{:x} has format {}, expected 32", property, window, reply.format);
                Ok(None)
            }
        }
    }

    fn get_text_property(&self, window: Window, property: Atom) -> Result<Option<String>> {
        let cookie = self
            .conn
            .get_property(false, window, property, AtomEnum::ANY, 0, u32::MAX / 4)?;
        let Some(reply) = Self::absent_on_x11_error(cookie.reply())? else {
            return Ok(None);
        };
        if reply.type_ == x11rb::NONE || reply.format != 8 {
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&reply.value).into_owned()))
    }

    fn send_client_message(
        &self,
        destination: Window,
        window: Window,
        message_type: Atom,
        data: [u32; 5],
        mask: EventMask,
    ) -> Result<()> {
        let event = ClientMessageEvent::new(32, window, message_type, data);
        self.send(self.conn.send_event(false, destination, mask, event)?);
        Ok(())
    }

    fn send_configure_notify(&self, window: Window, rect: Geometry, border_width: i32) -> Result<()> {
        let event = ConfigureNotifyEvent {
            response_type: xproto::CONFIGURE_NOTIFY_EVENT,
            sequence: 0,
            event: window,
            window,
            above_sibling: x11rb::NONE,
            x: coord(rect.x),
            y: coord(rect.y),
            width: extent(rect.width),
            height: extent(rect.height),
            border_width: border_width.clamp(0, i32::from(u16::MAX)) as u16,
            override_redirect: false,
        };
        self.send(self.conn.send_event(false, window, EventMask::STRUCTURE_NOTIFY, event)?);
        Ok(())
    }

    fn configure_window(&self, window: Window, changes: &ConfigureWindowAux) -> Result<()> {
        self.send(self.conn.configure_window(window, changes)?);
        Ok(())
    }

    fn set_window_gravity(&self, window: Window, gravity: Gravity) -> Result<()> {
        let aux = ChangeWindowAttributesAux::new().win_gravity(xproto::Gravity::from(gravity.to_raw() as u8));
        self.send(self.conn.change_window_attributes(window, &aux)?);
        Ok(())
    }

    fn map_window(&self, window: Window) -> Result<()> {
        self.send(self.conn.map_window(window)?);
        Ok(())
    }

    fn unmap_window(&self, window: Window) -> Result<()> {
        self.send(self.conn.unmap_window(window)?);
        Ok(())
    }

    fn reparent_window(&self, window: Window, parent: Window, x: i32, y: i32) -> Result<()> {
        self.send(self.conn.reparent_window(window, parent, coord(x), coord(y))?);
        Ok(())
    }

    fn destroy_window(&self, window: Window) -> Result<()> {
        self.send(self.conn.destroy_window(window)?);
        Ok(())
    }

    fn create_frame_window(&self, rect: Geometry) -> Result<Window> {
        let frame = self.conn.generate_id()?;
        let aux = CreateWindowAux::new()
            .background_pixel(self.black_pixel)
            .override_redirect(1u32)
            .cursor(self.cursor(CursorShape::Default));
        self.send(self.conn.create_window(
            x11rb::COPY_DEPTH_FROM_PARENT,
            frame,
            self.root,
            coord(rect.x),
            coord(rect.y),
            extent(rect.width),
            extent(rect.height),
            0,
            WindowClass::INPUT_OUTPUT,
            x11rb::COPY_FROM_PARENT,
            &aux,
        )?);
        Ok(frame)
    }

    fn select_input(&self, window: Window, mask: EventMask) -> Result<()> {
        let aux = ChangeWindowAttributesAux::new().event_mask(mask);
        self.send(self.conn.change_window_attributes(window, &aux)?);
        Ok(())
    }

    fn change_save_set(&self, window: Window, insert: bool) -> Result<()> {
        let mode = if insert { SetMode::INSERT } else { SetMode::DELETE };
        self.send(self.conn.change_save_set(mode, window)?);
        Ok(())
    }

    fn kill_client(&self, window: Window) -> Result<()> {
        self.send(self.conn.kill_client(window)?);
        Ok(())
    }

    fn client_attributes(&self, window: Window) -> Result<Option<ClientAttributes>> {
        let attrs_cookie = self.conn.get_window_attributes(window)?;
        let geometry_cookie = self.conn.get_geometry(window)?;
        let Some(attrs) = Self::absent_on_x11_error(attrs_cookie.reply())? else {
            return Ok(None);
        };
        let Some(geometry) = Self::absent_on_x11_error(geometry_cookie.reply())? else {
            return Ok(None);
        };
        Ok(Some(ClientAttributes {
            override_redirect: attrs.override_redirect,
            viewable: attrs.map_state == MapState::VIEWABLE,
            geometry: Geometry::new(
                i32::from(geometry.x),
                i32::from(geometry.y),
                i32::from(geometry.width),
                i32::from(geometry.height),
            ),
            border_width: i32::from(geometry.border_width),
        }))
    }

    fn select_shape_input(&self, window: Window) -> Result<()> {
        self.send(self.conn.shape_select_input(window, true)?);
        Ok(())
    }

    fn is_shaped(&self, window: Window) -> Result<bool> {
        let cookie = self.conn.shape_query_extents(window)?;
        Ok(Self::absent_on_x11_error(cookie.reply())?.is_some_and(|r| r.bounding_shaped))
    }

    fn grab_pointer(&self, window: Window, confine_to: Window, cursor: CursorShape, time: Timestamp) -> Result<bool> {
        let mask = EventMask::BUTTON_PRESS
            | EventMask::BUTTON_RELEASE
            | EventMask::POINTER_MOTION
            | EventMask::ENTER_WINDOW
            | EventMask::LEAVE_WINDOW;
        let cookie = self.conn.grab_pointer(
            false,
            window,
            mask,
            GrabMode::ASYNC,
            GrabMode::ASYNC,
            confine_to,
            self.cursor(cursor),
            time,
        )?;
        let status = cookie.reply()?.status;
        if status != GrabStatus::SUCCESS {
            debug!("X11: pointer grab on 0x{:x} failed: {:?}", window, status);
        }
        Ok(status == GrabStatus::SUCCESS)
    }

    fn ungrab_pointer(&self, time: Timestamp) -> Result<()> {
        self.send(self.conn.ungrab_pointer(time)?);
        Ok(())
    }

    fn grab_keyboard(&self, window: Window, time: Timestamp) -> Result<bool> {
        let cookie = self
            .conn
            .grab_keyboard(false, window, time, GrabMode::ASYNC, GrabMode::ASYNC)?;
        let status = cookie.reply()?.status;
        if status != GrabStatus::SUCCESS {
            debug!("X11: keyboard grab on 0x{:x} failed: {:?}", window, status);
        }
        Ok(status == GrabStatus::SUCCESS)
    }

    fn ungrab_keyboard(&self, time: Timestamp) -> Result<()> {
        self.send(self.conn.ungrab_keyboard(time)?);
        Ok(())
    }

    fn allow_events(&self, mode: Allow, time: Timestamp) -> Result<()> {
        self.send(self.conn.allow_events(mode, time)?);
        Ok(())
    }

    fn query_pointer(&self) -> Result<PointerState> {
        let reply = self.conn.query_pointer(self.root)?.reply()?;
        Ok(PointerState {
            root_x: i32::from(reply.root_x),
            root_y: i32::from(reply.root_y),
            mask: u16::from(reply.mask),
        })
    }

    fn keycode_to_keysym(&self, keycode: u8, state: u16) -> u32 {
        let shifted = state & u16::from(xproto::KeyButMask::SHIFT) != 0;
        self.keymap.borrow().keysym(keycode, shifted)
    }

    fn refresh_keyboard_mapping(&self) -> Result<()> {
        let setup = self.conn.setup();
        let (min, max) = (setup.min_keycode, setup.max_keycode);
        let reply = self
            .conn
            .get_keyboard_mapping(min, max - min + 1)?
            .reply()
            .context("Failed to read the keyboard mapping")?;
        debug!("X11: loaded keyboard map ({} keysyms)", reply.keysyms.len());
        *self.keymap.borrow_mut() = KeyboardMap {
            min_keycode: min,
            keysyms_per_keycode: reply.keysyms_per_keycode,
            keysyms: reply.keysyms,
        };
        Ok(())
    }

    fn wait_for_property_notify(&self, window: Window, atom: Atom) -> Result<Timestamp> {
        self.conn.flush()?;
        loop {
            let (event, sequence) = self.conn.wait_for_event_with_sequence()?;
            if let Event::PropertyNotify(ref e) = event {
                if e.window == window && e.atom == atom {
                    return Ok(e.time);
                }
            }
            self.classify(event, sequence);
        }
    }

    fn create_sync_alarm(&self, counter: u32) -> Result<Option<u32>> {
        if !self.have_sync {
            return Ok(None);
        }
        let alarm = self.conn.generate_id()?;
        let one = sync::Int64 { hi: 0, lo: 1 };
        let aux = sync::CreateAlarmAux::new()
            .counter(counter)
            .value_type(sync::VALUETYPE::RELATIVE)
            .value(one)
            .test_type(sync::TESTTYPE::POSITIVE_COMPARISON)
            .delta(one)
            .events(1u32);
        self.send(self.conn.sync_create_alarm(alarm, &aux)?);
        Ok(Some(alarm))
    }

    fn destroy_sync_alarm(&self, alarm: u32) -> Result<()> {
        self.send(self.conn.sync_destroy_alarm(alarm)?);
        Ok(())
    }

    fn push_error_trap(&self) -> u64 {
        let start = self.last_serial.get() + 1;
        self.traps.borrow_mut().push(Trap {
            start,
            errors: Vec::new(),
        });
        start
    }

    fn pop_error_trap(&self, start: u64, sync: bool) -> Result<Option<TrappedError>> {
        if sync {
            // Every error for the covered requests precedes this reply
            let cookie = self.conn.get_input_focus()?;
            self.last_serial.set(cookie.sequence_number());
            cookie.reply()?;
            self.drain()?;
        }
        let mut traps = self.traps.borrow_mut();
        let Some(index) = traps.iter().rposition(|t| t.start == start) else {
            warn!("X11: popping unknown error trap starting at {}", start);
            return Ok(None);
        };
        let trap = traps.remove(index);
        let mut closed = self.closed_traps.borrow_mut();
        closed.push_back((trap.start, self.last_serial.get()));
        if closed.len() > CLOSED_TRAP_HISTORY {
            closed.pop_front();
        }
        Ok(trap.errors.into_iter().next())
    }
}

impl Display<X11Conn> {
    /// Connect, take over the WM selection and the root, and set up the display
    ///
    /// With `replace`, an existing window manager is asked to leave by taking
    /// its selection and waiting for its selection window to go away.
    pub fn open(settings: WindowManagerSettings, ui: Box<dyn WmUi>, replace: bool) -> Result<Self> {
        let (conn, screen_num) = x11rb::connect(None).context("Failed to connect to X server")?;
        let conn = Arc::new(conn);
        info!("Display: connected to screen {}", screen_num);

        let extensions = probe_extensions(&conn)?;
        debug!("Display: extensions {:?}", extensions);
        if extensions.have_xsync {
            conn.sync_initialize(3, 1)?.reply().context("Failed to initialize SYNC")?;
        }

        let screen = conn
            .setup()
            .roots
            .get(screen_num)
            .cloned()
            .ok_or_else(|| WmError::Connection(format!("no screen {}", screen_num)))?;
        let root = screen.root;

        let atoms = Atoms::intern_with(|name| {
            Ok(conn
                .intern_atom(false, name.as_bytes())?
                .reply()
                .with_context(|| format!("Failed to intern {}", name))?
                .atom)
        })?;
        let wm_sn_atom = conn
            .intern_atom(false, format!("WM_S{}", screen_num).as_bytes())?
            .reply()
            .context("Failed to intern WM selection atom")?
            .atom;

        let timestamp_window = conn.generate_id()?;
        conn.create_window(
            x11rb::COPY_DEPTH_FROM_PARENT,
            timestamp_window,
            root,
            -100,
            -100,
            1,
            1,
            0,
            WindowClass::INPUT_OUTPUT,
            x11rb::COPY_FROM_PARENT,
            &CreateWindowAux::new()
                .override_redirect(1u32)
                .event_mask(EventMask::PROPERTY_CHANGE | EventMask::STRUCTURE_NOTIFY),
        )?;
        let no_focus_window = conn.generate_id()?;
        conn.create_window(
            0,
            no_focus_window,
            root,
            -100,
            -100,
            1,
            1,
            0,
            WindowClass::INPUT_ONLY,
            x11rb::COPY_FROM_PARENT,
            &CreateWindowAux::new()
                .override_redirect(1u32)
                .event_mask(EventMask::FOCUS_CHANGE | EventMask::KEY_PRESS | EventMask::KEY_RELEASE),
        )?;
        conn.map_window(no_focus_window)?;

        acquire_wm_selection(&conn, wm_sn_atom, timestamp_window, replace)?;

        let root_mask = EventMask::SUBSTRUCTURE_REDIRECT
            | EventMask::SUBSTRUCTURE_NOTIFY
            | EventMask::STRUCTURE_NOTIFY
            | EventMask::PROPERTY_CHANGE
            | EventMask::FOCUS_CHANGE
            | EventMask::ENTER_WINDOW
            | EventMask::LEAVE_WINDOW
            | EventMask::BUTTON_PRESS
            | EventMask::KEY_PRESS;
        conn.change_window_attributes(root, &ChangeWindowAttributesAux::new().event_mask(root_mask))?
            .check()
            .context("Failed to select events on root window - is another WM running?")?;

        let monitors = query_monitors(&conn, root, extensions.have_xrandr);
        let screen_info = ScreenInfo::new(
            root,
            i32::from(screen.width_in_pixels),
            i32::from(screen.height_in_pixels),
            no_focus_window,
            timestamp_window,
            monitors,
        );

        let x11 = X11Conn::new(conn, screen_num, extensions.have_xsync)?;
        let mut display = Display::with_connection(
            x11,
            atoms,
            wm_sn_atom,
            extensions,
            screen_info,
            settings,
            ui,
            Box::new(SystemClock),
        );
        display.init_root_properties()?;
        display.manage_existing_windows()?;
        info!("Display: managing screen {}", screen_num);
        Ok(display)
    }

    /// Manage every viewable top-level window present at startup
    fn manage_existing_windows(&mut self) -> Result<()> {
        let root = self.screen.root;
        let tree = self.conn.connection().query_tree(root)?.reply()?;
        self.grab_server()?;
        for window in tree.children {
            let viewable = self
                .conn
                .client_attributes(window)?
                .is_some_and(|a| a.viewable && !a.override_redirect);
            if viewable {
                self.manage_window(window)?;
            }
        }
        self.ungrab_server()
    }
}

fn probe_extensions(conn: &RustConnection) -> Result<Extensions> {
    let present = |name: &'static str| -> Result<bool> {
        Ok(conn
            .extension_information(name)
            .with_context(|| format!("Failed to query extension {}", name))?
            .is_some())
    };
    Ok(Extensions {
        have_shape: present(x11rb::protocol::shape::X11_EXTENSION_NAME)?,
        have_render: present(x11rb::protocol::render::X11_EXTENSION_NAME)?,
        have_xrandr: present(x11rb::protocol::randr::X11_EXTENSION_NAME)?,
        have_xsync: present(x11rb::protocol::sync::X11_EXTENSION_NAME)?,
        have_composite: present(x11rb::protocol::composite::X11_EXTENSION_NAME)?,
        have_damage: present(x11rb::protocol::damage::X11_EXTENSION_NAME)?,
        have_fixes: present(x11rb::protocol::xfixes::X11_EXTENSION_NAME)?,
    })
}

/// Monitors from RandR, or nothing (one screen-sized monitor) without it
fn query_monitors(conn: &RustConnection, root: Window, have_xrandr: bool) -> Vec<Monitor> {
    use x11rb::protocol::randr::ConnectionExt as _;
    if !have_xrandr {
        return Vec::new();
    }
    let reply = match conn.randr_get_monitors(root, true).map(|c| c.reply()) {
        Ok(Ok(reply)) => reply,
        Ok(Err(err)) => {
            warn!("Display: RandR monitor query failed: {}", err);
            return Vec::new();
        }
        Err(err) => {
            warn!("Display: RandR monitor query failed: {}", err);
            return Vec::new();
        }
    };
    reply
        .monitors
        .iter()
        .map(|m| Monitor {
            rect: Geometry::new(i32::from(m.x), i32::from(m.y), i32::from(m.width), i32::from(m.height)),
            primary: m.primary,
        })
        .collect()
}

/// Own WM_Sn, optionally replacing the current owner
fn acquire_wm_selection(conn: &RustConnection, selection: Atom, owner: Window, replace: bool) -> Result<()> {
    let current = conn
        .get_selection_owner(selection)?
        .reply()
        .context("Failed to get current WM selection owner")?
        .owner;

    if current != x11rb::NONE {
        if !replace {
            return Err(WmError::Connection(format!(
                "another window manager is already running (window 0x{:x}); use --replace",
                current
            ))
            .into());
        }
        info!("Display: replacing window manager owning 0x{:x}", current);
        conn.change_window_attributes(
            current,
            &ChangeWindowAttributesAux::new().event_mask(EventMask::STRUCTURE_NOTIFY),
        )?;
    }

    conn.set_selection_owner(owner, selection, x11rb::CURRENT_TIME)?
        .check()
        .context("Failed to set WM selection owner")?;
    let now_owner = conn
        .get_selection_owner(selection)?
        .reply()
        .context("Failed to verify WM selection ownership")?
        .owner;
    if now_owner != owner {
        return Err(WmError::Connection(format!("lost WM selection to 0x{:x}", now_owner)).into());
    }

    if current != x11rb::NONE {
        let deadline = Instant::now() + Duration::from_secs(15);
        loop {
            match conn.get_window_attributes(current)?.reply() {
                Err(ReplyError::X11Error(_)) => {
                    info!("Display: previous window manager exited");
                    break;
                }
                Err(err) => return Err(err.into()),
                Ok(_) if Instant::now() >= deadline => {
                    warn!("Display: previous window manager did not exit, proceeding anyway");
                    break;
                }
                Ok(_) => std::thread::sleep(Duration::from_millis(100)),
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keymap_falls_back_to_unshifted() {
        let map = KeyboardMap {
            min_keycode: 8,
            keysyms_per_keycode: 2,
            keysyms: vec![0x61, 0x41, 0xff51, 0],
        };
        assert_eq!(map.keysym(8, false), 0x61);
        assert_eq!(map.keysym(8, true), 0x41);
        assert_eq!(map.keysym(9, true), 0xff51);
        assert_eq!(map.keysym(7, false), 0);
        assert_eq!(map.keysym(200, false), 0);
    }

    #[test]
    fn test_coordinates_clamp_to_protocol_range() {
        assert_eq!(coord(40_000), i16::MAX);
        assert_eq!(coord(-5), -5);
        assert_eq!(extent(0), 1);
        assert_eq!(extent(70_000), u16::MAX);
    }
}
