//! Test fixtures: a recording connection, a manual clock and event builders

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::{Duration, Instant};

use anyhow::Result;
use x11rb::protocol::xproto::{
    Allow, Atom, ButtonPressEvent, ClientMessageEvent, ConfigWindow, ConfigureRequestEvent, ConfigureWindowAux,
    EnterNotifyEvent, EventMask, FocusInEvent, KeyButMask, KeyPressEvent, NotifyDetail, NotifyMode, Property,
    PropertyNotifyEvent, StackMode, UnmapNotifyEvent, Window,
};
use x11rb::protocol::Event;

use crate::shared::Geometry;
use crate::wm::client::{Client, Frame};
use crate::wm::conn::{ClientAttributes, CursorShape, PointerState, XConn};
use crate::wm::display::{Display, Extensions};
use crate::wm::error::TrappedError;
use crate::wm::ewmh::Atoms;
use crate::wm::geometry::Gravity;
use crate::wm::screen::ScreenInfo;
use crate::wm::settings::WindowManagerSettings;
use crate::wm::timers::Clock;
use crate::wm::timestamp::Timestamp;
use crate::wm::ui::LoggingUi;

pub const ROOT: Window = 0x100;
pub const NO_FOCUS_WINDOW: Window = 0x101;
pub const TIMESTAMP_WINDOW: Window = 0x102;
pub const WM_SN_ATOM: Atom = 0x1000;

/// A request the core sent, as recorded by [`MockConn`]
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    GrabServer,
    UngrabServer,
    SetInputFocus {
        window: Window,
        time: Timestamp,
    },
    ChangeProperty {
        window: Window,
        property: Atom,
        type_: Atom,
        data: Vec<u32>,
    },
    ChangeProperty8 {
        window: Window,
        property: Atom,
        type_: Atom,
        data: Vec<u8>,
    },
    AppendEmptyProperty {
        window: Window,
        property: Atom,
    },
    DeleteProperty {
        window: Window,
        property: Atom,
    },
    SendClientMessage {
        destination: Window,
        window: Window,
        type_: Atom,
        data: [u32; 5],
        mask: EventMask,
    },
    SendConfigureNotify {
        window: Window,
        rect: Geometry,
        border_width: i32,
    },
    ConfigureWindow {
        window: Window,
        x: Option<i32>,
        y: Option<i32>,
        width: Option<u32>,
        height: Option<u32>,
        border_width: Option<u32>,
        sibling: Option<Window>,
        stack_mode: Option<StackMode>,
    },
    SetWindowGravity {
        window: Window,
        gravity: Gravity,
    },
    MapWindow {
        window: Window,
    },
    UnmapWindow {
        window: Window,
    },
    ReparentWindow {
        window: Window,
        parent: Window,
        x: i32,
        y: i32,
    },
    DestroyWindow {
        window: Window,
    },
    CreateFrameWindow {
        window: Window,
        rect: Geometry,
    },
    SelectInput {
        window: Window,
        mask: EventMask,
    },
    ChangeSaveSet {
        window: Window,
        insert: bool,
    },
    KillClient {
        window: Window,
    },
    GrabPointer {
        window: Window,
        cursor: CursorShape,
        time: Timestamp,
    },
    UngrabPointer,
    GrabKeyboard {
        window: Window,
        time: Timestamp,
    },
    UngrabKeyboard,
    AllowEvents {
        mode: Allow,
        time: Timestamp,
    },
    CreateSyncAlarm {
        counter: u32,
        alarm: u32,
    },
    DestroySyncAlarm {
        alarm: u32,
    },
}

/// Connection that records requests and answers queries from canned state
pub struct MockConn {
    requests: RefCell<Vec<Request>>,
    windows: RefCell<HashMap<Window, ClientAttributes>>,
    properties: RefCell<HashMap<(Window, Atom), Vec<u32>>>,
    text_properties: RefCell<HashMap<(Window, Atom), String>>,
    next_xid: Cell<Window>,
    next_serial: Cell<u64>,
    next_alarm: Cell<u32>,
    server_time: Cell<Timestamp>,
    pointer: Cell<PointerState>,
    pointer_grab_ok: Cell<bool>,
    keyboard_grab_ok: Cell<bool>,
    keysym: Cell<u32>,
    errors: RefCell<Vec<TrappedError>>,
    open_traps: Cell<u32>,
    failing: Cell<Option<fn(&Request) -> bool>>,
    clock: Rc<Cell<Instant>>,
}

impl MockConn {
    pub fn new() -> Self {
        Self {
            requests: RefCell::new(Vec::new()),
            windows: RefCell::new(HashMap::new()),
            properties: RefCell::new(HashMap::new()),
            text_properties: RefCell::new(HashMap::new()),
            next_xid: Cell::new(0x200001),
            next_serial: Cell::new(1),
            next_alarm: Cell::new(0x300001),
            server_time: Cell::new(1),
            pointer: Cell::new(PointerState::default()),
            pointer_grab_ok: Cell::new(true),
            keyboard_grab_ok: Cell::new(true),
            keysym: Cell::new(0),
            errors: RefCell::new(Vec::new()),
            open_traps: Cell::new(0),
            failing: Cell::new(None),
            clock: Rc::new(Cell::new(Instant::now())),
        }
    }

    fn record(&self, request: Request) -> u64 {
        let serial = self.next_serial.get();
        self.next_serial.set(serial + 1);
        self.requests.borrow_mut().push(request);
        serial
    }

    /// Record a request that fails when it matches the installed filter
    fn checked(&self, request: Request) -> Result<u64> {
        let fails = self.failing.get().is_some_and(|pred| pred(&request));
        let serial = self.record(request);
        if fails {
            anyhow::bail!("connection lost at serial {}", serial);
        }
        Ok(serial)
    }

    fn alloc_xid(&self) -> Window {
        let xid = self.next_xid.get();
        self.next_xid.set(xid + 1);
        xid
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.borrow().clone()
    }

    pub fn count(&self, pred: impl Fn(&Request) -> bool) -> usize {
        self.requests.borrow().iter().filter(|r| pred(r)).count()
    }

    pub fn clear(&self) {
        self.requests.borrow_mut().clear();
    }

    pub fn add_window(&self, window: Window, geometry: Geometry, viewable: bool) {
        self.windows.borrow_mut().insert(
            window,
            ClientAttributes {
                override_redirect: false,
                viewable,
                geometry,
                border_width: 0,
            },
        );
    }

    pub fn add_override_redirect(&self, window: Window) {
        self.windows.borrow_mut().insert(
            window,
            ClientAttributes {
                override_redirect: true,
                viewable: true,
                geometry: Geometry::new(0, 0, 100, 100),
                border_width: 0,
            },
        );
    }

    pub fn set_property32(&self, window: Window, property: Atom, data: Vec<u32>) {
        self.properties.borrow_mut().insert((window, property), data);
    }

    pub fn set_text_property(&self, window: Window, property: Atom, text: &str) {
        self.text_properties
            .borrow_mut()
            .insert((window, property), text.to_string());
    }

    pub fn set_server_time(&self, time: Timestamp) {
        self.server_time.set(time);
    }

    pub fn set_next_serial(&self, serial: u64) {
        self.next_serial.set(serial);
    }

    pub fn set_pointer(&self, root_x: i32, root_y: i32, mask: u16) {
        self.pointer.set(PointerState { root_x, root_y, mask });
    }

    pub fn set_pointer_grab_result(&self, ok: bool) {
        self.pointer_grab_ok.set(ok);
    }

    pub fn set_keyboard_grab_result(&self, ok: bool) {
        self.keyboard_grab_ok.set(ok);
    }

    /// Keysym every keycode translates to
    pub fn set_keysym(&self, keysym: u32) {
        self.keysym.set(keysym);
    }

    /// Queue an error for the innermost open trap
    pub fn inject_error(&self, error: TrappedError) {
        self.errors.borrow_mut().push(error);
    }

    /// Make matching checked requests return a connection error
    pub fn fail_requests(&self, pred: fn(&Request) -> bool) {
        self.failing.set(Some(pred));
    }

    pub fn open_traps(&self) -> u32 {
        self.open_traps.get()
    }

    pub fn advance_clock(&self, by: Duration) {
        self.clock.set(self.clock.get() + by);
    }
}

impl Default for MockConn {
    fn default() -> Self {
        Self::new()
    }
}

impl XConn for MockConn {
    fn flush(&self) -> Result<()> {
        Ok(())
    }

    fn grab_server(&self) -> Result<()> {
        self.record(Request::GrabServer);
        Ok(())
    }

    fn ungrab_server(&self) -> Result<()> {
        self.record(Request::UngrabServer);
        Ok(())
    }

    fn set_input_focus(&self, window: Window, time: Timestamp) -> Result<u64> {
        self.checked(Request::SetInputFocus { window, time })
    }

    fn change_property32(&self, window: Window, property: Atom, type_: Atom, data: &[u32]) -> Result<()> {
        self.properties.borrow_mut().insert((window, property), data.to_vec());
        self.record(Request::ChangeProperty {
            window,
            property,
            type_,
            data: data.to_vec(),
        });
        Ok(())
    }

    fn change_property8(&self, window: Window, property: Atom, type_: Atom, data: &[u8]) -> Result<()> {
        self.record(Request::ChangeProperty8 {
            window,
            property,
            type_,
            data: data.to_vec(),
        });
        Ok(())
    }

    fn append_empty_property(&self, window: Window, property: Atom, _type_: Atom) -> Result<()> {
        self.record(Request::AppendEmptyProperty { window, property });
        Ok(())
    }

    fn delete_property(&self, window: Window, property: Atom) -> Result<()> {
        self.properties.borrow_mut().remove(&(window, property));
        self.record(Request::DeleteProperty { window, property });
        Ok(())
    }

    fn get_property32(&self, window: Window, property: Atom) -> Result<Option<Vec<u32>>> {
        Ok(self.properties.borrow().get(&(window, property)).cloned())
    }

    fn get_text_property(&self, window: Window, property: Atom) -> Result<Option<String>> {
        Ok(self.text_properties.borrow().get(&(window, property)).cloned())
    }

    fn send_client_message(
        &self,
        destination: Window,
        window: Window,
        message_type: Atom,
        data: [u32; 5],
        mask: EventMask,
    ) -> Result<()> {
        self.record(Request::SendClientMessage {
            destination,
            window,
            type_: message_type,
            data,
            mask,
        });
        Ok(())
    }

    fn send_configure_notify(&self, window: Window, rect: Geometry, border_width: i32) -> Result<()> {
        self.record(Request::SendConfigureNotify {
            window,
            rect,
            border_width,
        });
        Ok(())
    }

    fn configure_window(&self, window: Window, changes: &ConfigureWindowAux) -> Result<()> {
        self.record(Request::ConfigureWindow {
            window,
            x: changes.x,
            y: changes.y,
            width: changes.width,
            height: changes.height,
            border_width: changes.border_width,
            sibling: changes.sibling,
            stack_mode: changes.stack_mode,
        });
        Ok(())
    }

    fn set_window_gravity(&self, window: Window, gravity: Gravity) -> Result<()> {
        self.record(Request::SetWindowGravity { window, gravity });
        Ok(())
    }

    fn map_window(&self, window: Window) -> Result<()> {
        self.record(Request::MapWindow { window });
        Ok(())
    }

    fn unmap_window(&self, window: Window) -> Result<()> {
        self.record(Request::UnmapWindow { window });
        Ok(())
    }

    fn reparent_window(&self, window: Window, parent: Window, x: i32, y: i32) -> Result<()> {
        self.record(Request::ReparentWindow { window, parent, x, y });
        Ok(())
    }

    fn destroy_window(&self, window: Window) -> Result<()> {
        self.windows.borrow_mut().remove(&window);
        self.record(Request::DestroyWindow { window });
        Ok(())
    }

    fn create_frame_window(&self, rect: Geometry) -> Result<Window> {
        let window = self.alloc_xid();
        self.record(Request::CreateFrameWindow { window, rect });
        Ok(window)
    }

    fn select_input(&self, window: Window, mask: EventMask) -> Result<()> {
        self.record(Request::SelectInput { window, mask });
        Ok(())
    }

    fn change_save_set(&self, window: Window, insert: bool) -> Result<()> {
        self.record(Request::ChangeSaveSet { window, insert });
        Ok(())
    }

    fn kill_client(&self, window: Window) -> Result<()> {
        self.record(Request::KillClient { window });
        Ok(())
    }

    fn client_attributes(&self, window: Window) -> Result<Option<ClientAttributes>> {
        Ok(self.windows.borrow().get(&window).copied())
    }

    fn select_shape_input(&self, _window: Window) -> Result<()> {
        Ok(())
    }

    fn is_shaped(&self, _window: Window) -> Result<bool> {
        Ok(false)
    }

    fn grab_pointer(&self, window: Window, _confine_to: Window, cursor: CursorShape, time: Timestamp) -> Result<bool> {
        self.record(Request::GrabPointer { window, cursor, time });
        Ok(self.pointer_grab_ok.get())
    }

    fn ungrab_pointer(&self, _time: Timestamp) -> Result<()> {
        self.checked(Request::UngrabPointer)?;
        Ok(())
    }

    fn grab_keyboard(&self, window: Window, time: Timestamp) -> Result<bool> {
        self.record(Request::GrabKeyboard { window, time });
        Ok(self.keyboard_grab_ok.get())
    }

    fn ungrab_keyboard(&self, _time: Timestamp) -> Result<()> {
        self.checked(Request::UngrabKeyboard)?;
        Ok(())
    }

    fn allow_events(&self, mode: Allow, time: Timestamp) -> Result<()> {
        self.record(Request::AllowEvents { mode, time });
        Ok(())
    }

    fn query_pointer(&self) -> Result<PointerState> {
        Ok(self.pointer.get())
    }

    fn keycode_to_keysym(&self, _keycode: u8, _state: u16) -> u32 {
        self.keysym.get()
    }

    fn refresh_keyboard_mapping(&self) -> Result<()> {
        Ok(())
    }

    fn wait_for_property_notify(&self, _window: Window, _atom: Atom) -> Result<Timestamp> {
        Ok(self.server_time.get())
    }

    fn create_sync_alarm(&self, counter: u32) -> Result<Option<u32>> {
        let alarm = self.next_alarm.get();
        self.next_alarm.set(alarm + 1);
        self.record(Request::CreateSyncAlarm { counter, alarm });
        Ok(Some(alarm))
    }

    fn destroy_sync_alarm(&self, alarm: u32) -> Result<()> {
        self.record(Request::DestroySyncAlarm { alarm });
        Ok(())
    }

    fn push_error_trap(&self) -> u64 {
        self.open_traps.set(self.open_traps.get() + 1);
        self.next_serial.get()
    }

    fn pop_error_trap(&self, _start: u64, _sync: bool) -> Result<Option<TrappedError>> {
        self.open_traps.set(self.open_traps.get().saturating_sub(1));
        let errors = std::mem::take(&mut *self.errors.borrow_mut());
        Ok(errors.into_iter().next())
    }
}

/// Clock that only moves when a test says so
pub struct ManualClock(Rc<Cell<Instant>>);

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.0.get()
    }
}

/// A 1280x1024 single-monitor display with default settings
pub fn test_display() -> Display<MockConn> {
    let conn = MockConn::new();
    let clock = ManualClock(conn.clock.clone());
    let mut next = 0x200;
    let atoms = Atoms::intern_with(|_| {
        next += 1;
        Ok(next)
    })
    .unwrap();
    let screen = ScreenInfo::new(ROOT, 1280, 1024, NO_FOCUS_WINDOW, TIMESTAMP_WINDOW, Vec::new());
    let settings = WindowManagerSettings::default();
    let ui = LoggingUi::new(settings.frame);
    Display::with_connection(
        conn,
        atoms,
        WM_SN_ATOM,
        Extensions::default(),
        screen,
        settings,
        Box::new(ui),
        Box::new(clock),
    )
}

impl Display<MockConn> {
    /// Framed, mapped client at (100, 100) 400x300 on the active workspace
    ///
    /// Set up directly, without sending any requests or touching focus.
    pub fn add_test_client(&mut self, window: Window) -> Window {
        let mut client = Client::new(window, Geometry::new(100, 100, 400, 300), 0);
        client.workspace = self.workspaces.active();
        let borders = self.ui.frame_borders(&client);
        let frame = Frame {
            xwindow: self.conn.alloc_xid(),
            rect: borders.frame_rect(&client.rect, false),
            borders,
        };
        client.frame = Some(frame);
        client.mapped = true;
        client.placed = true;

        let layer = self.layer_for(&client);
        self.register_xid(frame.xwindow, window);
        self.stack.add(window, layer);
        self.workspaces.add_window(client.workspace, window);
        self.clients.insert(window, client);
        window
    }

    pub fn clock_advance_ms(&mut self, ms: u64) {
        self.conn.advance_clock(Duration::from_millis(ms));
    }
}

pub fn focus_event(window: Window, mode: NotifyMode, detail: NotifyDetail) -> FocusInEvent {
    FocusInEvent {
        response_type: x11rb::protocol::xproto::FOCUS_IN_EVENT,
        detail,
        sequence: 0,
        event: window,
        mode,
    }
}

pub fn configure_request_event(
    window: Window,
    value_mask: ConfigWindow,
    x: i16,
    y: i16,
    width: u16,
    height: u16,
) -> ConfigureRequestEvent {
    ConfigureRequestEvent {
        response_type: x11rb::protocol::xproto::CONFIGURE_REQUEST_EVENT,
        stack_mode: StackMode::ABOVE,
        sequence: 0,
        parent: ROOT,
        window,
        sibling: 0,
        x,
        y,
        width,
        height,
        border_width: 0,
        value_mask,
    }
}

pub fn key_press(window: Window, state: u16) -> KeyPressEvent {
    KeyPressEvent {
        response_type: x11rb::protocol::xproto::KEY_PRESS_EVENT,
        detail: 38,
        sequence: 0,
        time: 1000,
        root: ROOT,
        event: window,
        child: 0,
        root_x: 0,
        root_y: 0,
        event_x: 0,
        event_y: 0,
        state: KeyButMask::from(state),
        same_screen: true,
    }
}

pub fn button_press(window: Window, button: u8, state: u16, root_x: i16, root_y: i16, time: Timestamp) -> Event {
    Event::ButtonPress(ButtonPressEvent {
        response_type: x11rb::protocol::xproto::BUTTON_PRESS_EVENT,
        detail: button,
        sequence: 0,
        time,
        root: ROOT,
        event: window,
        child: 0,
        root_x,
        root_y,
        event_x: 0,
        event_y: 0,
        state: KeyButMask::from(state),
        same_screen: true,
    })
}

/// EnterNotify when `enter`, LeaveNotify otherwise
pub fn crossing_event(window: Window, enter: bool, mode: NotifyMode, detail: NotifyDetail, time: Timestamp) -> Event {
    let event = EnterNotifyEvent {
        response_type: if enter {
            x11rb::protocol::xproto::ENTER_NOTIFY_EVENT
        } else {
            x11rb::protocol::xproto::LEAVE_NOTIFY_EVENT
        },
        detail,
        sequence: 0,
        time,
        root: ROOT,
        event: window,
        child: 0,
        root_x: 0,
        root_y: 0,
        event_x: 0,
        event_y: 0,
        state: KeyButMask::from(0u16),
        mode,
        same_screen_focus: 0,
    };
    if enter {
        Event::EnterNotify(event)
    } else {
        Event::LeaveNotify(event)
    }
}

/// An unmap of `window` as reported to the listener `event`
pub fn unmap_notify(event: Window, window: Window) -> Event {
    Event::UnmapNotify(UnmapNotifyEvent {
        response_type: x11rb::protocol::xproto::UNMAP_NOTIFY_EVENT,
        sequence: 0,
        event,
        window,
        from_configure: false,
    })
}

pub fn property_notify(window: Window, atom: Atom, time: Timestamp) -> Event {
    Event::PropertyNotify(PropertyNotifyEvent {
        response_type: x11rb::protocol::xproto::PROPERTY_NOTIFY_EVENT,
        sequence: 0,
        window,
        atom,
        time,
        state: Property::NEW_VALUE,
    })
}

pub fn client_message(window: Window, type_: Atom, data: [u32; 5]) -> ClientMessageEvent {
    ClientMessageEvent::new(32, window, type_, data)
}
