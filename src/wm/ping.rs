//! Liveness Checker
//!
//! `_NET_WM_PING`: send a timestamped probe, then either the client echoes it
//! back to the root or a timer expires. Each pending record is resolved
//! exactly once.

use std::time::Duration;

use anyhow::Result;
use tracing::{debug, warn};
use x11rb::protocol::xproto::{EventMask, Window};

use crate::wm::client_flags::WmFlags;
use crate::wm::conn::XConn;
use crate::wm::display::Display;
use crate::wm::timers::{TimerId, TimerKind};
use crate::wm::timestamp::{Timestamp, CURRENT_TIME};

/// Called with the pinged window and the ping timestamp
pub type PingCallback<C> = Box<dyn FnOnce(&mut Display<C>, Window, Timestamp) -> Result<()>>;

/// One outstanding ping
pub struct PendingPing<C: XConn> {
    pub window: Window,
    pub timestamp: Timestamp,
    pub on_reply: PingCallback<C>,
    pub on_timeout: PingCallback<C>,
    pub timer: TimerId,
}

impl<C: XConn> std::fmt::Debug for PendingPing<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingPing")
            .field("window", &self.window)
            .field("timestamp", &self.timestamp)
            .field("timer", &self.timer)
            .finish()
    }
}

impl<C: XConn> Display<C> {
    /// Probe `window` for liveness
    pub fn ping(
        &mut self,
        window: Window,
        timestamp: Timestamp,
        on_reply: PingCallback<C>,
        on_timeout: PingCallback<C>,
    ) -> Result<()> {
        if timestamp == CURRENT_TIME {
            warn!("Ping: refusing to ping 0x{:x} with CurrentTime", window);
            return Ok(());
        }
        let Some(client) = self.clients.get(&window) else {
            debug!("Ping: 0x{:x} is not managed", window);
            return Ok(());
        };
        if !client.wm_flags.contains(WmFlags::PING) {
            debug!("Ping: {} does not support _NET_WM_PING, assuming alive", client.desc());
            return on_reply(self, window, timestamp);
        }

        debug!("Ping: sending ping {} to {}", timestamp, client.desc());
        self.conn.send_client_message(
            window,
            window,
            self.atoms.wm_protocols,
            [self.atoms.net_wm_ping, timestamp, window, 0, 0],
            EventMask::NO_EVENT,
        )?;

        let delay = Duration::from_millis(self.settings.ping_timeout_ms);
        let timer = self.add_timer(delay, TimerKind::PingTimeout { window, timestamp });
        self.pings.push(PendingPing {
            window,
            timestamp,
            on_reply,
            on_timeout,
            timer,
        });
        Ok(())
    }

    /// Handle a pong echoed to the root window
    pub fn pong_received(&mut self, window: Window, timestamp: Timestamp) -> Result<()> {
        let Some(index) = self
            .pings
            .iter()
            .position(|p| p.window == window && p.timestamp == timestamp)
        else {
            debug!("Ping: unmatched pong {} from 0x{:x}", timestamp, window);
            return Ok(());
        };
        let ping = self.pings.remove(index);
        self.timers.cancel(ping.timer);
        debug!("Ping: pong {} from 0x{:x}", timestamp, window);
        (ping.on_reply)(self, window, timestamp)
    }

    /// Timer expiry for a pending ping
    pub(crate) fn ping_timeout(&mut self, timer: TimerId, window: Window, timestamp: Timestamp) -> Result<()> {
        let Some(index) = self.pings.iter().position(|p| p.timer == timer) else {
            return Ok(());
        };
        let ping = self.pings.remove(index);
        warn!("Ping: 0x{:x} did not answer ping {}", window, timestamp);
        (ping.on_timeout)(self, window, timestamp)
    }

    pub fn window_has_pending_pings(&self, window: Window) -> bool {
        self.pings.iter().any(|p| p.window == window)
    }

    /// Drop every pending ping for a window without running callbacks
    pub fn cancel_pings(&mut self, window: Window) {
        let timers = &mut self.timers;
        self.pings.retain(|p| {
            if p.window == window {
                timers.cancel(p.timer);
                false
            } else {
                true
            }
        });
    }
}
