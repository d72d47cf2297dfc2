//! Bounded sample buffers and their dataset boundary tables.
//!
//! Each buffer holds samples of one kind and a table of dataset boundaries.
//! A dataset is the half-open range between its boundary and the next one
//! (or the current buffer length for the last dataset), tagged with the
//! descriptor of the buffer and the timestamp captured when it was opened.

use core::fmt::Display;

use heapless::Vec;
use log::debug;
use thiserror_no_std::Error;

/// Temperature buffer capacity: one day of periodic samples at the active cadence
pub const TEMPERATURE_CAPACITY: usize = 72;

/// Samples produced by one periodic temperature wake
pub const TEMPERATURE_BURST: usize = 1;

/// Depth of the accelerometer FIFO, i.e. samples produced by one watermark drain
pub const FIFO_DEPTH: usize = 32;

/// Watermark drains taken before a sampling burst is ended
pub const FIFO_DRAINS_PER_BURST: usize = 2;

/// Acceleration buffer capacity, sized for one full sampling burst
pub const ACCEL_CAPACITY: usize = FIFO_DEPTH * FIFO_DRAINS_PER_BURST;

/// Dataset boundaries a buffer can hold between two offloads
pub const MAX_DATASETS: usize = 16;

/// 4-bit type descriptor written into the batch header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Descriptor {
    Temperature = 0x0,
    Accel = 0x1,
}

impl Descriptor {
    /// Nibble value stored on flash
    pub const fn nibble(self) -> u8 {
        self as u8
    }

    /// Parse a nibble read back from flash
    pub const fn from_nibble(nibble: u8) -> Option<Self> {
        match nibble & 0x0F {
            0x0 => Some(Self::Temperature),
            0x1 => Some(Self::Accel),
            _ => None,
        }
    }
}

/// One accelerometer axis group, truncated to the low byte of each axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AccelTriple {
    pub x: i8,
    pub y: i8,
    pub z: i8,
}

impl AccelTriple {
    pub const fn new(x: i8, y: i8, z: i8) -> Self {
        Self { x, y, z }
    }

    pub const fn to_bytes(self) -> [u8; 3] {
        [self.x as u8, self.y as u8, self.z as u8]
    }

    pub const fn from_bytes(bytes: [u8; 3]) -> Self {
        Self {
            x: bytes[0] as i8,
            y: bytes[1] as i8,
            z: bytes[2] as i8,
        }
    }
}

/// A scalar reading of either kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sample {
    /// Raw sensor register value, 1/128 °C per LSB
    Temperature(i16),
    Accel(AccelTriple),
}

impl Display for Sample {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Temperature(raw) => write!(f, "{:.2}°C (raw {})", *raw as f32 / 128.0, raw),
            Self::Accel(t) => write!(f, "accel x: {}, y: {}, z: {}", t.x, t.y, t.z),
        }
    }
}

/// Sample types that can live in a [`SampleBuffer`]
pub trait BufferedSample: Copy {
    /// Descriptor stamped on every dataset of a buffer holding this type
    const DESCRIPTOR: Descriptor;

    fn into_sample(self) -> Sample;
}

impl BufferedSample for i16 {
    const DESCRIPTOR: Descriptor = Descriptor::Temperature;

    fn into_sample(self) -> Sample {
        Sample::Temperature(self)
    }
}

impl BufferedSample for AccelTriple {
    const DESCRIPTOR: Descriptor = Descriptor::Accel;

    fn into_sample(self) -> Sample {
        Sample::Accel(self)
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferError {
    #[error("sample buffer is full ({capacity} samples)")]
    Full { capacity: usize },
    #[error("dataset table is exhausted ({capacity} boundaries)")]
    TooManyDatasets { capacity: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Boundary {
    start: usize,
    timestamp: u32,
}

/// A contiguous run of samples collected under one stable mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dataset {
    pub start: usize,
    pub end: usize,
    pub descriptor: Descriptor,
    pub timestamp: u32,
}

impl Dataset {
    pub const fn len(&self) -> usize {
        self.end - self.start
    }

    pub const fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Append-only bounded sequence of samples plus its dataset boundary table
///
/// `N` is the sample capacity and `D` the number of dataset boundaries.
/// Writes beyond either capacity are errors, never silent overwrites.
#[derive(Debug, Clone)]
pub struct SampleBuffer<T, const N: usize, const D: usize> {
    samples: Vec<T, N>,
    boundaries: Vec<Boundary, D>,
}

pub type TemperatureBuffer = SampleBuffer<i16, TEMPERATURE_CAPACITY, MAX_DATASETS>;
pub type AccelBuffer = SampleBuffer<AccelTriple, ACCEL_CAPACITY, MAX_DATASETS>;

impl<T: BufferedSample, const N: usize, const D: usize> Default for SampleBuffer<T, N, D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: BufferedSample, const N: usize, const D: usize> SampleBuffer<T, N, D> {
    pub fn new() -> Self {
        Self {
            samples: Vec::new(),
            boundaries: Vec::new(),
        }
    }

    /// Append a sample and return its index.
    ///
    /// Fails with [`BufferError::Full`] when the buffer is at capacity; the
    /// caller must offload first.
    pub fn push(&mut self, sample: T) -> Result<usize, BufferError> {
        self.samples
            .push(sample)
            .map_err(|_| BufferError::Full { capacity: N })?;
        Ok(self.samples.len() - 1)
    }

    /// Start a new dataset at the current write position.
    ///
    /// If the last dataset is still empty it is re-stamped in place instead
    /// of leaving a zero-length entry behind it.
    pub fn open_dataset_boundary(&mut self, timestamp: u32) -> Result<(), BufferError> {
        let start = self.samples.len();

        if let Some(last) = self.boundaries.last_mut()
            && last.start == start
        {
            last.timestamp = timestamp;
            return Ok(());
        }

        self.boundaries
            .push(Boundary { start, timestamp })
            .map_err(|_| BufferError::TooManyDatasets { capacity: D })?;

        debug!(
            "Opened {:?} dataset #{} at index {} (t={})",
            T::DESCRIPTOR,
            self.boundaries.len() - 1,
            start,
            timestamp
        );
        Ok(())
    }

    /// Reset samples and dataset table to empty
    pub fn clear(&mut self) {
        self.samples.clear();
        self.boundaries.clear();
    }

    pub fn samples(&self) -> &[T] {
        &self.samples
    }

    /// Iterate the datasets in table order
    pub fn datasets(&self) -> impl Iterator<Item = Dataset> + '_ {
        let len = self.samples.len();
        self.boundaries.iter().enumerate().map(move |(i, b)| Dataset {
            start: b.start,
            end: self.boundaries.get(i + 1).map_or(len, |next| next.start),
            descriptor: T::DESCRIPTOR,
            timestamp: b.timestamp,
        })
    }

    /// Samples belonging to `dataset`
    pub fn dataset_samples(&self, dataset: &Dataset) -> &[T] {
        &self.samples[dataset.start..dataset.end]
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Free sample slots left before the buffer is full
    pub fn remaining(&self) -> usize {
        N - self.samples.len()
    }

    pub fn dataset_count(&self) -> usize {
        self.boundaries.len()
    }
}
