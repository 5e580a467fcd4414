// cooperative timer scheduler for pulp-os firmware (ESP32-C3)

#![cfg_attr(not(test), no_std)]

extern crate alloc;

#[cfg(feature = "esp32c3")]
pub mod board;
pub mod kernel;

pub use kernel::{Scheduler, TimerId, then};
