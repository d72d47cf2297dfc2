//! Flash device collaborator and a RAM-backed implementation
//!
//! The external part is a dual-die SPI NOR flash. The logger only programs
//! single bytes and reads them back; erase is never issued.

use alloc::vec;
use alloc::vec::Vec;
use core::fmt::Display;

use thiserror_no_std::Error;

/// 512 Mbit per die
pub const DEFAULT_DIE_SIZE: u32 = 1 << 26;

/// One of the two independently selected dies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Die {
    #[default]
    First,
    Second,
}

impl Die {
    pub const fn index(self) -> u8 {
        match self {
            Self::First => 0,
            Self::Second => 1,
        }
    }

    /// The die the ring continues on after this one fills
    pub const fn other(self) -> Self {
        match self {
            Self::First => Self::Second,
            Self::Second => Self::First,
        }
    }
}

impl Display for Die {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.index())
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashError {
    #[error("flash did not respond")]
    Timeout,
    #[error("write enable latch was not set")]
    WriteEnableRejected,
    #[error("address {addr:#x} is outside the die")]
    OutOfRange { addr: u32 },
}

/// Byte-level access to the external flash
pub trait FlashDevice {
    /// Program one byte at `addr` on `die`
    fn program_byte(&mut self, die: Die, addr: u32, value: u8) -> Result<(), FlashError>;

    /// Fill `buf` with the bytes starting at `addr` on `die`
    fn read_bytes(&mut self, die: Die, addr: u32, buf: &mut [u8]) -> Result<(), FlashError>;
}

/// How a program operation combines with the byte already stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramModel {
    /// The new value replaces the old one
    Overwrite,
    /// Programming can only clear bits, like real NOR flash without an erase
    NorAnd,
}

/// Two dies of RAM standing in for the external flash
///
/// Starts fully erased (`0xFF`).
#[derive(Debug, Clone)]
pub struct RamFlash {
    dies: [Vec<u8>; 2],
    model: ProgramModel,
}

impl RamFlash {
    pub fn new(die_size: u32, model: ProgramModel) -> Self {
        Self {
            dies: [vec![0xFF; die_size as usize], vec![0xFF; die_size as usize]],
            model,
        }
    }

    /// Contents of one die
    pub fn die(&self, die: Die) -> &[u8] {
        &self.dies[die.index() as usize]
    }

    fn slot(&mut self, die: Die, addr: u32) -> Result<&mut u8, FlashError> {
        self.dies[die.index() as usize]
            .get_mut(addr as usize)
            .ok_or(FlashError::OutOfRange { addr })
    }
}

impl FlashDevice for RamFlash {
    fn program_byte(&mut self, die: Die, addr: u32, value: u8) -> Result<(), FlashError> {
        let model = self.model;
        let slot = self.slot(die, addr)?;
        *slot = match model {
            ProgramModel::Overwrite => value,
            ProgramModel::NorAnd => *slot & value,
        };
        Ok(())
    }

    fn read_bytes(&mut self, die: Die, addr: u32, buf: &mut [u8]) -> Result<(), FlashError> {
        let start = addr as usize;
        let src = self.dies[die.index() as usize]
            .get(start..start + buf.len())
            .ok_or(FlashError::OutOfRange { addr })?;
        buf.copy_from_slice(src);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nor_program_only_clears_bits() {
        let mut flash = RamFlash::new(4, ProgramModel::NorAnd);
        flash.program_byte(Die::First, 0, 0b1010_1010).unwrap();
        flash.program_byte(Die::First, 0, 0b0110_0110).unwrap();

        assert_eq!(flash.die(Die::First)[0], 0b0010_0010);
    }

    #[test]
    fn test_dies_are_independent() {
        let mut flash = RamFlash::new(2, ProgramModel::Overwrite);
        flash.program_byte(Die::Second, 1, 0x42).unwrap();

        let mut buf = [0u8; 2];
        flash.read_bytes(Die::Second, 0, &mut buf).unwrap();
        assert_eq!(buf, [0xFF, 0x42]);
        assert_eq!(flash.die(Die::First), &[0xFF, 0xFF]);
    }

    #[test]
    fn test_out_of_range_access() {
        let mut flash = RamFlash::new(2, ProgramModel::Overwrite);
        assert_eq!(
            flash.program_byte(Die::First, 2, 0),
            Err(FlashError::OutOfRange { addr: 2 })
        );
        let mut buf = [0u8; 2];
        assert_eq!(
            flash.read_bytes(Die::First, 1, &mut buf),
            Err(FlashError::OutOfRange { addr: 1 })
        );
    }
}
