//! Scriptable collaborators for unit tests

use alloc::collections::VecDeque;
use alloc::vec::Vec;
use core::cell::Cell;
use core::time::Duration;

use crate::buffers::{AccelBuffer, AccelTriple, FIFO_DEPTH};
use crate::platform::Platform;
use crate::sensors::{Accelerometer, BusError, InterruptSource, TemperatureSensor};

pub(crate) struct MockPlatform {
    pub now: u32,
    /// Seconds the clock moves forward after every read
    pub tick: u32,
    clock_reads: Cell<u32>,
    pub masked: bool,
    pub mask_calls: u32,
    pub unmask_calls: u32,
    pub wakes: Vec<Duration>,
}

impl MockPlatform {
    pub fn at(now: u32) -> Self {
        Self {
            now,
            tick: 0,
            clock_reads: Cell::new(0),
            masked: false,
            mask_calls: 0,
            unmask_calls: 0,
            wakes: Vec::new(),
        }
    }
}

impl Platform for MockPlatform {
    fn now(&self) -> u32 {
        let reads = self.clock_reads.get();
        self.clock_reads.set(reads + 1);
        self.now + self.tick * reads
    }

    fn schedule_next_wake(&mut self, interval: Duration) {
        self.wakes.push(interval);
    }

    fn mask_sample_interrupts(&mut self) {
        self.masked = true;
        self.mask_calls += 1;
    }

    fn unmask_sample_interrupts(&mut self) {
        self.masked = false;
        self.unmask_calls += 1;
    }

    fn sleep(&mut self) {}
}

/// Returns queued readings first, then `fallback`
pub(crate) struct MockThermometer {
    pub readings: VecDeque<i16>,
    pub fallback: i16,
    pub failing: bool,
    pub powered: bool,
    pub reads: u32,
}

impl MockThermometer {
    pub fn new(fallback: i16) -> Self {
        Self {
            readings: VecDeque::new(),
            fallback,
            failing: false,
            powered: false,
            reads: 0,
        }
    }
}

impl TemperatureSensor for MockThermometer {
    fn read(&mut self) -> Result<i16, BusError> {
        self.reads += 1;
        if self.failing {
            return Err(BusError::Timeout { attempts: 1 });
        }
        Ok(self.readings.pop_front().unwrap_or(self.fallback))
    }

    fn power(&mut self, on: bool) {
        self.powered = on;
    }
}

/// Fills a full FIFO of counting samples on every drain
pub(crate) struct MockAccelerometer {
    pub sampling: bool,
    pub fail_drains: bool,
    enabled: [bool; 3],
    next: i8,
}

impl MockAccelerometer {
    pub fn new() -> Self {
        Self {
            sampling: false,
            fail_drains: false,
            enabled: [true; 3],
            next: 0,
        }
    }

    pub fn is_enabled(&self, source: InterruptSource) -> bool {
        self.enabled[Self::slot(source)]
    }

    fn slot(source: InterruptSource) -> usize {
        match source {
            InterruptSource::Activity => 0,
            InterruptSource::Inactivity => 1,
            InterruptSource::Watermark => 2,
        }
    }
}

impl Accelerometer for MockAccelerometer {
    fn drain_fifo(&mut self, into: &mut AccelBuffer) -> Result<usize, BusError> {
        if self.fail_drains {
            return Err(BusError::Timeout { attempts: 1 });
        }

        let mut stored = 0;
        for _ in 0..FIFO_DEPTH {
            let v = self.next;
            self.next = self.next.wrapping_add(1);
            if into.push(AccelTriple::new(v, v.wrapping_neg(), 1)).is_err() {
                break;
            }
            stored += 1;
        }
        Ok(stored)
    }

    fn enable_interrupt(&mut self, source: InterruptSource) {
        self.enabled[Self::slot(source)] = true;
    }

    fn disable_interrupt(&mut self, source: InterruptSource) {
        self.enabled[Self::slot(source)] = false;
    }

    fn begin_sampling(&mut self) {
        self.sampling = true;
    }

    fn end_sampling(&mut self) {
        self.sampling = false;
    }
}
