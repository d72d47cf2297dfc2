//! Batch wire format for persisted datasets.
//!
//! A batch is written in this order:
//!
//! 1. Header
//!    - 1 byte: header length (`2 + ceil(N/2) + N`)
//!    - 1 byte: dataset count `N`
//!    - `ceil(N/2)` bytes: packed 4-bit descriptors, first dataset in the high nibble
//!    - `N` bytes: dataset lengths in samples (truncated to 8 bits)
//! 2. Per dataset, in table order
//!    - 4 bytes: big-endian timestamp
//!    - temperature payload: first sample as 2 big-endian bytes, then one
//!      byte per sample holding `(current - previous) & 0xFF`
//!    - accel payload: 3 raw bytes (x, y, z) per sample
//!
//! The temperature delta is lossy whenever the true step does not fit in a
//! signed byte. Decoding accumulates the truncated deltas from the first raw
//! value and reproduces that loss exactly.

use alloc::vec::Vec;
use thiserror_no_std::Error;

use crate::buffers::{AccelTriple, BufferedSample, Descriptor, Sample, SampleBuffer};

/// Byte value of unprogrammed flash; a batch never starts with it
pub const ERASED: u8 = 0xFF;

/// Borrowed samples of one dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payload<'a> {
    Temperature(&'a [i16]),
    Accel(&'a [AccelTriple]),
}

impl Payload<'_> {
    pub const fn descriptor(&self) -> Descriptor {
        match self {
            Self::Temperature(_) => Descriptor::Temperature,
            Self::Accel(_) => Descriptor::Accel,
        }
    }

    pub const fn len(&self) -> usize {
        match self {
            Self::Temperature(samples) => samples.len(),
            Self::Accel(samples) => samples.len(),
        }
    }

    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A dataset ready to be encoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatasetView<'a> {
    pub timestamp: u32,
    pub payload: Payload<'a>,
}

/// Sample types with a wire payload
pub trait Encodable: BufferedSample {
    fn payload(samples: &[Self]) -> Payload<'_>;
}

impl Encodable for i16 {
    fn payload(samples: &[Self]) -> Payload<'_> {
        Payload::Temperature(samples)
    }
}

impl Encodable for AccelTriple {
    fn payload(samples: &[Self]) -> Payload<'_> {
        Payload::Accel(samples)
    }
}

/// A dataset read back from a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedDataset {
    pub descriptor: Descriptor,
    pub timestamp: u32,
    pub samples: Vec<Sample>,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("input ended at byte {offset} while reading {field}")]
    Truncated { offset: usize, field: &'static str },
    #[error("header length byte is {found}, expected {expected} for {count} datasets")]
    HeaderLength { found: u8, expected: u8, count: u8 },
    #[error("unknown dataset descriptor {0:#x}")]
    UnknownDescriptor(u8),
}

/// Number of header bytes for a batch of `count` datasets
pub const fn header_len(count: usize) -> usize {
    2 + count.div_ceil(2) + count
}

/// Encode a batch of datasets.
pub fn encode(datasets: &[DatasetView<'_>]) -> Vec<u8> {
    let count = datasets.len();
    let body: usize = datasets.iter().map(|d| 4 + payload_size(&d.payload)).sum();
    let mut out = Vec::with_capacity(header_len(count) + body);

    out.push(header_len(count) as u8);
    out.push(count as u8);

    for pair in datasets.chunks(2) {
        let high = pair[0].payload.descriptor().nibble() << 4;
        let low = pair.get(1).map_or(0, |d| d.payload.descriptor().nibble());
        out.push(high | low);
    }

    // Lengths above 255 wrap; buffer capacities keep datasets well below that.
    out.extend(datasets.iter().map(|d| d.payload.len() as u8));

    for dataset in datasets {
        out.extend_from_slice(&dataset.timestamp.to_be_bytes());
        match dataset.payload {
            Payload::Temperature(samples) => encode_temperature(samples, &mut out),
            Payload::Accel(samples) => {
                for triple in samples {
                    out.extend_from_slice(&triple.to_bytes());
                }
            }
        }
    }

    out
}

/// Dataset views over every dataset of a buffer, in table order
pub fn views<T: Encodable, const N: usize, const D: usize>(
    buffer: &SampleBuffer<T, N, D>,
) -> Vec<DatasetView<'_>> {
    buffer
        .datasets()
        .map(|dataset| DatasetView {
            timestamp: dataset.timestamp,
            payload: T::payload(buffer.dataset_samples(&dataset)),
        })
        .collect()
}

/// Encode every dataset of a buffer as one batch
pub fn encode_buffer<T: Encodable, const N: usize, const D: usize>(
    buffer: &SampleBuffer<T, N, D>,
) -> Vec<u8> {
    encode(&views(buffer))
}

fn payload_size(payload: &Payload<'_>) -> usize {
    match payload {
        Payload::Temperature(samples) if samples.is_empty() => 0,
        Payload::Temperature(samples) => samples.len() + 1,
        Payload::Accel(samples) => samples.len() * 3,
    }
}

fn encode_temperature(samples: &[i16], out: &mut Vec<u8>) {
    let Some((first, rest)) = samples.split_first() else {
        return;
    };

    out.extend_from_slice(&first.to_be_bytes());

    let mut previous = *first;
    for &current in rest {
        out.push(current.wrapping_sub(previous) as u8);
        previous = current;
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize, field: &'static str) -> Result<&'a [u8], DecodeError> {
        let end = self.pos + n;
        let slice = self.bytes.get(self.pos..end).ok_or(DecodeError::Truncated {
            offset: self.bytes.len(),
            field,
        })?;
        self.pos = end;
        Ok(slice)
    }

    fn byte(&mut self, field: &'static str) -> Result<u8, DecodeError> {
        Ok(self.take(1, field)?[0])
    }
}

/// Decode one batch from the start of `bytes`.
///
/// Returns the datasets and the number of bytes the batch occupied.
pub fn decode_batch(bytes: &[u8]) -> Result<(Vec<DecodedDataset>, usize), DecodeError> {
    let mut reader = Reader { bytes, pos: 0 };

    let found = reader.byte("header length")?;
    let count = reader.byte("dataset count")?;
    let expected = header_len(count as usize) as u8;
    if found != expected {
        return Err(DecodeError::HeaderLength {
            found,
            expected,
            count,
        });
    }

    let packed = reader.take((count as usize).div_ceil(2), "descriptors")?;
    let lengths = reader.take(count as usize, "dataset lengths")?;

    let mut datasets = Vec::with_capacity(count as usize);
    for (i, &len) in lengths.iter().enumerate() {
        let byte = packed[i / 2];
        let nibble = if i % 2 == 0 { byte >> 4 } else { byte & 0x0F };
        let descriptor =
            Descriptor::from_nibble(nibble).ok_or(DecodeError::UnknownDescriptor(nibble))?;

        let ts = reader.take(4, "timestamp")?;
        let timestamp = u32::from_be_bytes([ts[0], ts[1], ts[2], ts[3]]);

        let samples = match descriptor {
            Descriptor::Temperature => decode_temperature(&mut reader, len as usize)?,
            Descriptor::Accel => {
                let raw = reader.take(len as usize * 3, "accel samples")?;
                raw.chunks_exact(3)
                    .map(|c| Sample::Accel(AccelTriple::from_bytes([c[0], c[1], c[2]])))
                    .collect()
            }
        };

        datasets.push(DecodedDataset {
            descriptor,
            timestamp,
            samples,
        });
    }

    Ok((datasets, reader.pos))
}

fn decode_temperature(reader: &mut Reader<'_>, len: usize) -> Result<Vec<Sample>, DecodeError> {
    let mut samples = Vec::with_capacity(len);
    if len == 0 {
        return Ok(samples);
    }

    let first = reader.take(2, "first temperature")?;
    let mut value = i16::from_be_bytes([first[0], first[1]]);
    samples.push(Sample::Temperature(value));

    for delta in reader.take(len - 1, "temperature deltas")? {
        value = value.wrapping_add(i16::from(*delta as i8));
        samples.push(Sample::Temperature(value));
    }

    Ok(samples)
}

/// Decode consecutive batches until erased flash or the end of input
pub fn decode_log(bytes: &[u8]) -> Result<Vec<Vec<DecodedDataset>>, DecodeError> {
    let mut batches = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() && bytes[pos] != ERASED {
        let (batch, used) = decode_batch(&bytes[pos..])?;
        batches.push(batch);
        pos += used;
    }

    Ok(batches)
}
