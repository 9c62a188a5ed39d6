//! Scoped X error trap
//!
//! Requests against windows that may vanish at any moment are wrapped in an
//! [`ErrorTrap`]. Errors raised by those requests are collected instead of
//! reaching the dispatcher. Dropping the guard discards them.

use tracing::{debug, warn};

use crate::wm::conn::XConn;
use crate::wm::error::TrappedError;

pub struct ErrorTrap<'a, C: XConn + ?Sized> {
    conn: &'a C,
    start: u64,
    finished: bool,
}

impl<'a, C: XConn + ?Sized> ErrorTrap<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        let start = conn.push_error_trap();
        Self {
            conn,
            start,
            finished: false,
        }
    }

    /// Wait for the server and report the first trapped error
    pub fn finish(mut self) -> Result<(), TrappedError> {
        self.finished = true;
        match self.conn.pop_error_trap(self.start, true) {
            Ok(None) => Ok(()),
            Ok(Some(err)) => {
                debug!("Error trap caught: {}", err);
                Err(err)
            }
            Err(e) => {
                warn!("Error trap: failed to sync with server: {}", e);
                Ok(())
            }
        }
    }
}

impl<C: XConn + ?Sized> Drop for ErrorTrap<'_, C> {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.conn.pop_error_trap(self.start, false) {
                warn!("Error trap: failed to release trap: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wm::testing::MockConn;

    #[test]
    fn test_finish_reports_trapped_error() {
        let conn = MockConn::new();
        let trap = ErrorTrap::new(&conn);
        conn.inject_error(TrappedError {
            error_code: 3,
            major_opcode: 12,
            minor_opcode: 0,
            bad_value: 0x400001,
            sequence: 0,
        });
        let err = trap.finish().unwrap_err();
        assert_eq!(err.bad_value, 0x400001);
        assert_eq!(conn.open_traps(), 0);
    }

    #[test]
    fn test_drop_discards_silently() {
        let conn = MockConn::new();
        {
            let _trap = ErrorTrap::new(&conn);
            conn.inject_error(TrappedError {
                error_code: 3,
                major_opcode: 12,
                minor_opcode: 0,
                bad_value: 1,
                sequence: 0,
            });
        }
        assert_eq!(conn.open_traps(), 0);
    }
}
