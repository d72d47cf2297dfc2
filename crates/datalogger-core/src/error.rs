//! Fault taxonomy and recovered-fault bookkeeping
//!
//! Nothing in the logger is fatal: every fault listed here is recovered
//! locally and recorded in [`FaultCounters`] so it can be inspected later.

use core::fmt::Display;

use thiserror_no_std::Error;

use crate::buffers::BufferError;
use crate::sensors::BusError;
use crate::storage::StorageError;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggerError {
    /// A sensor or flash transaction exceeded its retry budget
    #[error("bus transaction timed out after {attempts} attempts")]
    BusTimeout { attempts: u8 },
    /// A push was attempted beyond capacity; the offload trigger should prevent this
    #[error("sample buffer full")]
    BufferFull,
    /// Flash read-back did not match the programmed byte
    #[error("flash verify failed on die {die} at offset {offset:#x}")]
    WriteVerifyFailed { die: u8, offset: u32 },
    /// Dataset boundary table exhausted
    #[error("dataset boundary table exhausted")]
    TooManyDatasets,
}

impl From<BufferError> for LoggerError {
    fn from(err: BufferError) -> Self {
        match err {
            BufferError::Full { .. } => Self::BufferFull,
            BufferError::TooManyDatasets { .. } => Self::TooManyDatasets,
        }
    }
}

impl From<BusError> for LoggerError {
    fn from(err: BusError) -> Self {
        match err {
            BusError::Timeout { attempts } => Self::BusTimeout { attempts },
        }
    }
}

impl From<StorageError> for LoggerError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::WriteFailed { die, offset, .. } => Self::WriteVerifyFailed { die, offset },
        }
    }
}

/// Counters of recovered faults since boot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FaultCounters {
    pub bus_timeouts: u32,
    pub write_verify_failures: u32,
    pub dropped_samples: u32,
    pub forced_offloads: u32,
    pub dropped_events: u32,
}

impl FaultCounters {
    /// Record a fault in the matching counter
    pub fn record(&mut self, err: LoggerError) {
        match err {
            LoggerError::BusTimeout { .. } => self.bus_timeouts += 1,
            LoggerError::BufferFull => self.dropped_samples += 1,
            LoggerError::WriteVerifyFailed { .. } => self.write_verify_failures += 1,
            LoggerError::TooManyDatasets => self.forced_offloads += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.bus_timeouts
            + self.write_verify_failures
            + self.dropped_samples
            + self.forced_offloads
            + self.dropped_events
    }
}

impl Display for FaultCounters {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "[Faults] bus timeouts: {}, verify failures: {}, dropped samples: {}, forced offloads: {}, dropped events: {}",
            self.bus_timeouts,
            self.write_verify_failures,
            self.dropped_samples,
            self.forced_offloads,
            self.dropped_events
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_routes_to_counters() {
        let mut faults = FaultCounters::default();
        faults.record(LoggerError::BusTimeout { attempts: 3 });
        faults.record(LoggerError::WriteVerifyFailed { die: 1, offset: 4 });
        faults.record(LoggerError::WriteVerifyFailed { die: 1, offset: 5 });
        faults.record(LoggerError::TooManyDatasets);

        assert_eq!(faults.bus_timeouts, 1);
        assert_eq!(faults.write_verify_failures, 2);
        assert_eq!(faults.forced_offloads, 1);
        assert_eq!(faults.dropped_samples, 0);
        assert_eq!(faults.total(), 4);
    }

    #[test]
    fn test_buffer_errors_map_to_taxonomy() {
        assert_eq!(
            LoggerError::from(BufferError::Full { capacity: 72 }),
            LoggerError::BufferFull
        );
        assert_eq!(
            LoggerError::from(BufferError::TooManyDatasets { capacity: 16 }),
            LoggerError::TooManyDatasets
        );
    }
}
