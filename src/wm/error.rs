//! Error types for the window manager core

use thiserror::Error;
use x11rb::protocol::xproto::Window;

/// Errors surfaced by the window manager library
#[derive(Debug, Error)]
pub enum WmError {
    #[error("display is already closing")]
    AlreadyClosing,

    #[error("server ungrab without a matching grab")]
    UngrabWithoutGrab,

    #[error("no managed window 0x{0:x}")]
    NoSuchWindow(Window),

    #[error("X11 connection error: {0}")]
    Connection(String),

    #[error("configuration error: {0}")]
    Config(String),
}

/// An X error caught inside an error trap
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("X error code {error_code} (request {major_opcode}.{minor_opcode}) on 0x{bad_value:x}, serial {sequence}")]
pub struct TrappedError {
    pub error_code: u8,
    pub major_opcode: u8,
    pub minor_opcode: u16,
    pub bad_value: u32,
    pub sequence: u64,
}
