//! Offload of the sample buffers into the flash ring
//!
//! An offload runs to completion with sample interrupts masked: the
//! temperature buffer is encoded and streamed byte by byte into the ring,
//! then the acceleration buffer, then both buffers are cleared and a fresh
//! dataset is opened in each. Buffers without samples are skipped.

use alloc::vec::Vec;
use core::fmt::Display;

use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use super::flash::FlashDevice;
use super::ring::{FlashRingStore, StorageError};
use crate::buffers::{AccelBuffer, TemperatureBuffer};
use crate::codec::encode_buffer;
use crate::platform::{ExclusiveSection, Platform};

/// What to do with the rest of a batch after a byte fails verification
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteFailurePolicy {
    /// Give up on the byte's slot and keep streaming the batch
    #[default]
    Continue,
    /// Stop writing the current batch and move on to the next buffer
    AbortBatch,
}

/// Outcome of one offload
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OffloadReport {
    /// Batches started (one per non-empty buffer)
    pub batches: u8,
    pub bytes_written: u32,
    /// Batches cut short under [`WriteFailurePolicy::AbortBatch`]
    pub aborted: u8,
    /// Every byte given up on, in write order
    pub failures: Vec<StorageError>,
}

impl OffloadReport {
    pub fn write_failures(&self) -> u32 {
        self.failures.len() as u32
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

impl Display for OffloadReport {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{} batches, {} bytes, {} failed writes, {} aborted",
            self.batches,
            self.bytes_written,
            self.write_failures(),
            self.aborted
        )
    }
}

pub struct OffloadEngine<F: FlashDevice> {
    store: FlashRingStore<F>,
    policy: WriteFailurePolicy,
}

impl<F: FlashDevice> OffloadEngine<F> {
    pub fn new(store: FlashRingStore<F>, policy: WriteFailurePolicy) -> Self {
        Self { store, policy }
    }

    pub fn store(&self) -> &FlashRingStore<F> {
        &self.store
    }

    pub fn policy(&self) -> WriteFailurePolicy {
        self.policy
    }

    /// Persist both buffers and reset them.
    ///
    /// Sample interrupts stay masked until this returns. The buffers are
    /// cleared even when some bytes failed to persist; every failure is in
    /// the returned report.
    pub fn offload<P: Platform>(
        &mut self,
        platform: &mut P,
        temperature: &mut TemperatureBuffer,
        accel: &mut AccelBuffer,
    ) -> OffloadReport {
        let section = ExclusiveSection::enter(platform);
        let start = self.store.cursor();
        let mut report = OffloadReport::default();

        if !temperature.is_empty() {
            self.persist(&encode_buffer(temperature), &mut report);
        }
        if !accel.is_empty() {
            self.persist(&encode_buffer(accel), &mut report);
        }

        let now = section.now();
        temperature.clear();
        accel.clear();
        if let Err(e) = temperature.open_dataset_boundary(now) {
            warn!("Could not reopen temperature dataset: {}", e);
        }
        if let Err(e) = accel.open_dataset_boundary(now) {
            warn!("Could not reopen acceleration dataset: {}", e);
        }

        let end = self.store.cursor();
        info!(
            "Offload done: {} (die {} @ {:#x} -> die {} @ {:#x})",
            report, start.die, start.offset, end.die, end.offset
        );
        report
    }

    fn persist(&mut self, bytes: &[u8], report: &mut OffloadReport) {
        report.batches += 1;

        for &byte in bytes {
            match self.store.write_byte(byte) {
                Ok(()) => report.bytes_written += 1,
                Err(e) => {
                    error!("Offload write failed: {}", e);
                    report.failures.push(e);

                    match self.policy {
                        WriteFailurePolicy::Continue => self.store.skip(),
                        WriteFailurePolicy::AbortBatch => {
                            report.aborted += 1;
                            return;
                        }
                    }
                }
            }
        }
    }
}
