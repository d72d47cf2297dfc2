//! Hardware-independent core of the adaptive datalogger
//!
//! This crate contains the platform-agnostic logic of an unattended
//! temperature/motion logger: the adaptive sampling state machine, the
//! bounded sample buffers it fills, the delta codec used to pack datasets,
//! and the dual-die ring store that persists them to external flash.
//!
//! Physical buses (temperature sensor, accelerometer, SPI flash, RTC and
//! power modes) are reached through the narrow traits in [`sensors`],
//! [`storage::flash`] and [`platform`], so everything here compiles on the
//! MCU and on a desktop host (for the simulator and tests).
//!
//! It is `#![no_std]` with `extern crate alloc`.

#![no_std]

extern crate alloc;

pub mod buffers;
pub mod codec;
pub mod config;
pub mod error;
pub mod events;
pub mod logger;
pub mod mode;
pub mod platform;
pub mod retry;
pub mod sensors;
pub mod storage;

#[cfg(test)]
pub(crate) mod test_support;

pub use buffers::{AccelBuffer, AccelTriple, Dataset, Descriptor, Sample, TemperatureBuffer};
pub use config::LoggerConfig;
pub use error::{FaultCounters, LoggerError};
pub use events::{AccelEvent, EventQueue, LoggerEvent};
pub use logger::Logger;
pub use mode::{Activity, ModeController, ModeState, Motion};
