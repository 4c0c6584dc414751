//! Deciding which library tracks are already on a device.
//!
//! Everything here is pure: no I/O, no database, no device handles.

pub mod classify;
pub mod index;
pub mod keys;
pub mod path_map;
pub mod plan;
