//! Timestamp Arbiter
//!
//! X server timestamps are 32-bit millisecond counters that wrap roughly
//! every 49.7 days. Every ordering decision goes through [`is_before`].

use anyhow::Result;
use tracing::{debug, warn};

use crate::wm::conn::XConn;
use crate::wm::display::Display;

pub type Timestamp = u32;

/// The `CurrentTime` sentinel
pub const CURRENT_TIME: Timestamp = 0;

/// Wraparound-safe "t1 happened before t2"
///
/// `CurrentTime` (0) as `t1` is before everything; as `t2` nothing is before it.
pub fn is_before(t1: Timestamp, t2: Timestamp) -> bool {
    if t1 == CURRENT_TIME {
        return true;
    }
    if t2 == CURRENT_TIME {
        return false;
    }
    (t1 < t2 && t2 - t1 < (1 << 31)) || (t1 > t2 && t1 - t2 > (1 << 31))
}

/// Per-display time bookkeeping
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeState {
    /// Time of the event being dispatched, 0 outside dispatch
    pub current_time: Timestamp,
    /// Timestamp of the last focus change we requested
    pub last_focus_time: Timestamp,
    /// Most recent user interaction seen on any window
    pub last_user_time: Timestamp,
}

impl<C: XConn> Display<C> {
    /// Time of the event currently being handled
    pub fn now(&self) -> Timestamp {
        self.time.current_time
    }

    /// Like [`Display::now`], but asks the server when no event time is known
    ///
    /// Appends a zero-length property to the timestamp window and waits for
    /// the PropertyNotify that carries the server time.
    pub fn now_roundtrip(&mut self) -> Result<Timestamp> {
        if self.time.current_time == CURRENT_TIME {
            let window = self.screen.timestamp_window;
            let atom = self.atoms.areawm_timestamp_ping;
            self.conn
                .append_empty_property(window, atom, x11rb::protocol::xproto::AtomEnum::STRING.into())?;
            let time = self.conn.wait_for_property_notify(window, atom)?;
            debug!("Time: round trip returned {}", time);
            self.time.current_time = time;
        }
        let now = self.time.current_time;
        self.sanity_check_timestamps(now);
        Ok(now)
    }

    /// Whether a focus-affecting request carrying `timestamp` should be dropped
    ///
    /// A `CurrentTime` timestamp is replaced with the server time. A timestamp
    /// older than the last focus change but newer than the last user time is
    /// bumped up to the last focus time.
    pub fn is_too_old(&mut self, timestamp: &mut Timestamp) -> Result<bool> {
        if *timestamp == CURRENT_TIME {
            *timestamp = self.now_roundtrip()?;
            return Ok(false);
        }

        if is_before(*timestamp, self.time.last_focus_time) {
            if is_before(*timestamp, self.time.last_user_time) {
                debug!(
                    "Time: {} is older than last_focus_time {} and last_user_time {}",
                    timestamp, self.time.last_focus_time, self.time.last_user_time
                );
                return Ok(true);
            }
            debug!(
                "Time: bumping {} to last_focus_time {}",
                timestamp, self.time.last_focus_time
            );
            *timestamp = self.time.last_focus_time;
        }
        Ok(false)
    }

    /// Repair stored timestamps that lie in the future relative to `now`
    ///
    /// This happens when the server clock wrapped or a client lied.
    pub fn sanity_check_timestamps(&mut self, now: Timestamp) {
        if is_before(now, self.time.last_focus_time) {
            warn!(
                "Time: last_focus_time ({}) is greater than comparison timestamp ({}), resetting",
                self.time.last_focus_time, now
            );
            self.time.last_focus_time = now;
        }

        if is_before(now, self.time.last_user_time) {
            warn!(
                "Time: last_user_time ({}) is greater than comparison timestamp ({}), resetting",
                self.time.last_user_time, now
            );
            self.time.last_user_time = now;

            for client in self.clients.values_mut() {
                if let Some(user_time) = client.net_wm_user_time {
                    if is_before(now, user_time) {
                        warn!(
                            "Time: {} net_wm_user_time ({}) is greater than comparison timestamp ({}), resetting",
                            client.desc(),
                            user_time,
                            now
                        );
                        client.net_wm_user_time = Some(now);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wm::testing::{test_display, Request};
    use proptest::prelude::*;

    #[test]
    fn test_is_before_basic() {
        assert!(is_before(1, 2));
        assert!(!is_before(2, 1));
        assert!(!is_before(5, 5));
        assert!(is_before(CURRENT_TIME, 5));
        assert!(!is_before(5, CURRENT_TIME));
    }

    #[test]
    fn test_is_before_wraparound() {
        // 0xFFFF_FFF0 is just before the wrap, 0x10 just after
        assert!(is_before(0xFFFF_FFF0, 0x10));
        assert!(!is_before(0x10, 0xFFFF_FFF0));
    }

    #[test]
    fn test_is_too_old_current_time_round_trips() {
        let mut display = test_display();
        display.conn.set_server_time(4242);
        let mut t = CURRENT_TIME;
        assert!(!display.is_too_old(&mut t).unwrap());
        assert_eq!(t, 4242);
        assert!(display
            .conn
            .requests()
            .iter()
            .any(|r| matches!(r, Request::AppendEmptyProperty { .. })));
    }

    #[test]
    fn test_is_too_old_bumps_to_focus_time() {
        let mut display = test_display();
        display.time.last_focus_time = 1000;
        display.time.last_user_time = 500;
        let mut t = 800;
        assert!(!display.is_too_old(&mut t).unwrap());
        assert_eq!(t, 1000);

        let mut t = 400;
        assert!(display.is_too_old(&mut t).unwrap());
        assert_eq!(t, 400);
    }

    #[test]
    fn test_sanity_check_pulls_user_times_down() {
        let mut display = test_display();
        let window = display.add_test_client(0x400001);
        display.time.last_user_time = 9000;
        display.time.last_focus_time = 9000;
        display.clients.get_mut(&window).unwrap().net_wm_user_time = Some(9500);
        display.sanity_check_timestamps(100);
        assert_eq!(display.time.last_user_time, 100);
        assert_eq!(display.time.last_focus_time, 100);
        assert_eq!(display.clients[&window].net_wm_user_time, Some(100));
    }

    proptest! {
        #[test]
        fn test_is_too_old_false_at_or_after_focus_time(focus in 1u32.., offset in 0u32..(1 << 31)) {
            let mut display = test_display();
            display.time.last_focus_time = focus;
            display.time.last_user_time = focus;
            let mut t = focus.wrapping_add(offset);
            prop_assume!(t != CURRENT_TIME);
            prop_assert!(!display.is_too_old(&mut t).unwrap());
        }
    }
}
