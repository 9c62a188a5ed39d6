//! areawm
//!
//! Policy and protocol core of a reparenting X11 window manager: event
//! dispatch, focus and timestamp arbitration, interactive move/resize,
//! the geometry pipeline and client liveness checks.

pub mod config;
pub mod shared;
pub mod wm;
