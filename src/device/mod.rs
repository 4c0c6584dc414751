//! Everything that talks to a sync target device.

pub mod error;
pub mod ipod;
pub mod monitor;
pub mod profile;
pub mod scan;
pub mod writer;
