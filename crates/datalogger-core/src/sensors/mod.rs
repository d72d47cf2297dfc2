//! Sensor collaborator traits
//!
//! The register-level protocols of the temperature sensor and the
//! accelerometer live outside this crate. The logger only needs the narrow
//! operations below; board crates implement them over their buses.

use thiserror_no_std::Error;

use crate::buffers::AccelBuffer;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusError {
    #[error("no response after {attempts} attempts")]
    Timeout { attempts: u8 },
}

/// Accelerometer interrupt sources the logger toggles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptSource {
    Activity,
    Inactivity,
    Watermark,
}

/// One-shot temperature sensor with a switchable power domain
pub trait TemperatureSensor {
    /// Read the raw temperature register (1/128 °C per LSB).
    fn read(&mut self) -> Result<i16, BusError>;

    fn power(&mut self, on: bool);
}

/// Accelerometer with a hardware FIFO and activity/inactivity detection
pub trait Accelerometer {
    /// Move the FIFO contents into `into`, returning how many samples were stored.
    ///
    /// Implementations stop early when `into` is full.
    fn drain_fifo(&mut self, into: &mut AccelBuffer) -> Result<usize, BusError>;

    fn enable_interrupt(&mut self, source: InterruptSource);

    fn disable_interrupt(&mut self, source: InterruptSource);

    /// Enter measurement mode and start filling the FIFO
    fn begin_sampling(&mut self);

    /// Return to standby
    fn end_sampling(&mut self);
}
