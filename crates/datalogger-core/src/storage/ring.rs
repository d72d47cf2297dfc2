//! Dual-die ring store with verified single-byte writes.
//!
//! The two dies form one logical ring of `2 × die_size` bytes. The cursor
//! advances only after a byte has been programmed and read back intact, and
//! wraps from the end of one die to offset 0 of the other. Once the ring is
//! full the oldest bytes are overwritten without any bookkeeping.
//!
//! No erase is issued before a byte is reprogrammed. On real NOR flash a
//! second lap only succeeds where the new value clears bits of the old one;
//! the read-back check reports every other case as a failed write.

use alloc::vec;
use alloc::vec::Vec;

use log::{info, warn};
use thiserror_no_std::Error;

use super::flash::{Die, FlashDevice, FlashError};
use crate::retry::Retry;

/// Where the next byte will be written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StorageCursor {
    pub die: Die,
    pub offset: u32,
}

impl StorageCursor {
    pub const fn new(die: Die, offset: u32) -> Self {
        Self { die, offset }
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    #[error("write of {value:#04x} failed on die {die} at offset {offset:#x}")]
    WriteFailed { die: u8, offset: u32, value: u8 },
}

#[derive(Debug, Clone, Copy)]
enum AttemptError {
    Flash(FlashError),
    Mismatch { read: u8 },
}

impl From<FlashError> for AttemptError {
    fn from(err: FlashError) -> Self {
        Self::Flash(err)
    }
}

pub struct FlashRingStore<F: FlashDevice> {
    flash: F,
    cursor: StorageCursor,
    die_size: u32,
    retry: Retry,
}

impl<F: FlashDevice> FlashRingStore<F> {
    /// Create a store writing from die 0, offset 0.
    ///
    /// `retry` bounds the program/verify attempts spent on each byte.
    pub fn new(flash: F, die_size: u32, retry: Retry) -> Self {
        Self {
            flash,
            cursor: StorageCursor::default(),
            die_size,
            retry,
        }
    }

    /// Continue writing at `cursor` instead of the start of the ring
    pub fn resume_at(mut self, cursor: StorageCursor) -> Self {
        self.cursor = StorageCursor {
            die: cursor.die,
            offset: cursor.offset.checked_rem(self.die_size).unwrap_or(0),
        };
        self
    }

    pub fn cursor(&self) -> StorageCursor {
        self.cursor
    }

    pub fn die_size(&self) -> u32 {
        self.die_size
    }

    /// Total ring capacity in bytes
    pub fn capacity(&self) -> u64 {
        2 * u64::from(self.die_size)
    }

    pub fn flash(&self) -> &F {
        &self.flash
    }

    /// Program `value` at the cursor and verify it by reading it back.
    ///
    /// Each attempt is a program followed by a read-back; the byte is given up
    /// on once the retry budget is spent, leaving the cursor where it was.
    pub fn write_byte(&mut self, value: u8) -> Result<(), StorageError> {
        let StorageCursor { die, offset } = self.cursor;
        let flash = &mut self.flash;

        let verified = self.retry.run(|_| -> Result<(), AttemptError> {
            flash.program_byte(die, offset, value)?;
            let mut read = [0u8];
            flash.read_bytes(die, offset, &mut read)?;
            if read[0] == value {
                Ok(())
            } else {
                Err(AttemptError::Mismatch { read: read[0] })
            }
        });

        match verified {
            Ok(()) => {
                self.advance();
                Ok(())
            }
            Err(exhausted) => {
                match exhausted.last {
                    AttemptError::Flash(e) => warn!(
                        "Flash error writing die {} offset {:#x} after {} attempts: {}",
                        die, offset, exhausted.attempts, e
                    ),
                    AttemptError::Mismatch { read } => warn!(
                        "Verify mismatch on die {} offset {:#x}: wrote {:#04x}, read {:#04x}",
                        die, offset, value, read
                    ),
                }
                Err(StorageError::WriteFailed {
                    die: die.index(),
                    offset,
                    value,
                })
            }
        }
    }

    /// Step the cursor over the current slot without writing it.
    ///
    /// Used after [`FlashRingStore::write_byte`] gave up on a byte, so the
    /// rest of the stream keeps its position and only that slot is lost.
    pub fn skip(&mut self) {
        warn!(
            "Skipping flash slot on die {} at offset {:#x}",
            self.cursor.die, self.cursor.offset
        );
        self.advance();
    }

    /// Read `len` bytes starting at `offset` on `die`, for diagnostics.
    pub fn read_bytes(&mut self, die: Die, offset: u32, len: usize) -> Result<Vec<u8>, FlashError> {
        let mut buf = vec![0u8; len];
        self.flash.read_bytes(die, offset, &mut buf)?;
        Ok(buf)
    }

    fn advance(&mut self) {
        self.cursor.offset += 1;
        if self.cursor.offset >= self.die_size {
            self.cursor.offset = 0;
            self.cursor.die = self.cursor.die.other();
            info!("Flash die full, continuing on die {}", self.cursor.die);
        }
    }
}
