//! Terminate Module
//!
//! Closing windows and tracking the ones that stop answering.

use anyhow::Result;
use tracing::{debug, info, warn};
use x11rb::protocol::xproto::{EventMask, Window};

use crate::wm::client_flags::WmFlags;
use crate::wm::conn::XConn;
use crate::wm::display::Display;
use crate::wm::timestamp::{Timestamp, CURRENT_TIME};

impl<C: XConn> Display<C> {
    /// Ask a window to close, then check that it is still alive
    ///
    /// Clients that speak `WM_DELETE_WINDOW` get the message; the rest are
    /// killed. A missed ping only marks the window unresponsive.
    pub fn delete_window(&mut self, window: Window, timestamp: Timestamp) -> Result<()> {
        let Some(client) = self.clients.get(&window) else {
            debug!("Terminate: 0x{:x} is not managed", window);
            return Ok(());
        };
        let timestamp = if timestamp == CURRENT_TIME { self.now() } else { timestamp };

        if client.wm_flags.contains(WmFlags::DELETE) {
            info!("Terminate: sending WM_DELETE_WINDOW to {}", client.desc());
            self.conn.send_client_message(
                window,
                window,
                self.atoms.wm_protocols,
                [self.atoms.wm_delete_window, timestamp, 0, 0, 0],
                EventMask::NO_EVENT,
            )?;
        } else {
            info!("Terminate: {} does not support WM_DELETE_WINDOW, killing it", client.desc());
            self.kill_window(window)?;
            return Ok(());
        }

        self.ping(
            window,
            timestamp,
            Box::new(|display: &mut Display<C>, window, _| {
                display.set_responsive(window);
                Ok(())
            }),
            Box::new(|display: &mut Display<C>, window, _| {
                display.set_unresponsive(window);
                Ok(())
            }),
        )
    }

    /// Disconnect the client owning a window
    pub fn kill_window(&mut self, window: Window) -> Result<()> {
        warn!("Terminate: killing client of 0x{:x}", window);
        self.conn.kill_client(window)?;
        self.conn.flush()
    }

    fn set_unresponsive(&mut self, window: Window) {
        let Some(client) = self.clients.get_mut(&window) else {
            return;
        };
        if client.unresponsive {
            return;
        }
        warn!("Terminate: {} is not responding", client.desc());
        client.unresponsive = true;
        let title = client.title.clone();
        self.ui.show_unresponsive(window, &title);
    }

    fn set_responsive(&mut self, window: Window) {
        if let Some(client) = self.clients.get_mut(&window) {
            if client.unresponsive {
                info!("Terminate: {} is responding again", client.desc());
            }
            client.unresponsive = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wm::testing::{test_display, Request};

    #[test]
    fn test_delete_without_protocol_kills() {
        let mut display = test_display();
        let window = display.add_test_client(0x400001);
        display.delete_window(window, 100).unwrap();
        assert!(display
            .conn
            .requests()
            .iter()
            .any(|r| matches!(r, Request::KillClient { window: w } if *w == window)));
        assert!(!display.window_has_pending_pings(window));
    }

    #[test]
    fn test_delete_pings_and_marks_unresponsive() {
        let mut display = test_display();
        let window = display.add_test_client(0x400001);
        display
            .clients
            .get_mut(&window)
            .unwrap()
            .wm_flags
            .insert(WmFlags::DELETE | WmFlags::PING);
        display.delete_window(window, 100).unwrap();
        let delete = display.atoms.wm_delete_window;
        assert!(display
            .conn
            .requests()
            .iter()
            .any(|r| matches!(r, Request::SendClientMessage { data, .. } if data[0] == delete)));
        assert!(display.window_has_pending_pings(window));

        display.clock_advance_ms(display.settings.ping_timeout_ms + 1);
        display.run_timers().unwrap();
        let client = &display.clients[&window];
        assert!(client.unresponsive);
        assert!(!display.conn.requests().iter().any(|r| matches!(r, Request::KillClient { .. })));
    }

    #[test]
    fn test_pong_clears_unresponsive() {
        let mut display = test_display();
        let window = display.add_test_client(0x400001);
        let client = display.clients.get_mut(&window).unwrap();
        client.wm_flags.insert(WmFlags::DELETE | WmFlags::PING);
        client.unresponsive = true;
        display.delete_window(window, 100).unwrap();
        display.pong_received(window, 100).unwrap();
        assert!(!display.clients[&window].unresponsive);
    }
}
