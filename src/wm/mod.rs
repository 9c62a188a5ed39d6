//! Window Manager Module
//!
//! The display context and every handler that hangs off it: event dispatch,
//! focus, grab ops, geometry, properties and client messages.

pub mod actions;
pub mod client;
pub mod client_flags;
pub mod configure;
pub mod conn;
pub mod constraints;
pub mod display;
pub mod error;
pub mod error_trap;
pub mod events;
pub mod ewmh;
pub mod focus;
pub mod geometry;
pub mod grab;
pub mod hints;
pub mod moveresize;
pub mod netwm;
pub mod ping;
pub mod props;
pub mod screen;
pub mod settings;
pub mod stacking;
pub mod terminate;
pub mod timers;
pub mod timestamp;
pub mod transients;
pub mod ui;
pub mod workspace;
pub mod x11;

#[cfg(test)]
pub(crate) mod testing;

pub use display::Display;
pub use ewmh::Atoms;
