//! Desktop simulator for the adaptive datalogger core.
//!
//! Runs the logger against simulated collaborators for a few days of
//! virtual time, one second per tick: a body temperature that drops during
//! nightly torpor, bursts of accelerometer activity by day and inactivity
//! interrupts by night. At the end the retrieval switch is triggered and
//! the flash image is decoded and printed.
//!
//! Run with `RUST_LOG=info` (or `debug`) to follow mode changes and offloads.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use log::{info, warn};

use datalogger_core::buffers::{AccelBuffer, AccelTriple};
use datalogger_core::codec::decode_log;
use datalogger_core::platform::Platform;
use datalogger_core::sensors::{Accelerometer, BusError, InterruptSource, TemperatureSensor};
use datalogger_core::storage::{Die, ProgramModel, RamFlash};
use datalogger_core::{AccelEvent, EventQueue, Logger, LoggerConfig, LoggerEvent};

// ---------------------------------------------------------------------------
// Simulation constants
// ---------------------------------------------------------------------------

/// 2024-01-01T00:00:00Z
const START: u32 = 1_704_067_200;

const SIM_DAYS: u32 = 3;

/// Simulated die size, small enough to inspect
const DIE_SIZE: u32 = 64 * 1024;

/// Gap between accelerometer activity bursts while the subject is awake
const ACTIVITY_PERIOD: u32 = 15 * 60;

/// Inactivity interrupt period while at rest (255 s inactivity time)
const INACTIVITY_PERIOD: u32 = 255;

/// Seconds for the FIFO to fill at 12.5 Hz
const WATERMARK_SECS: u32 = 3;

/// 30 °C pivot in the controller's `128 × raw` units
const PIVOT: i32 = 30 * 128 * 128;

static EVENTS: EventQueue = EventQueue::new();

/// Virtual clock shared by the simulated parts
type Clock = Rc<Cell<u32>>;

fn hour_of_day(now: u32) -> u32 {
    (now - START) / 3600 % 24
}

/// Awake from 07:00 to 22:00
fn is_awake(now: u32) -> bool {
    (7..22).contains(&hour_of_day(now))
}

// ---------------------------------------------------------------------------
// Simulated collaborators
// ---------------------------------------------------------------------------

struct SimPlatform {
    clock: Clock,
    next_wake: u32,
}

impl Platform for SimPlatform {
    fn now(&self) -> u32 {
        self.clock.get()
    }

    fn schedule_next_wake(&mut self, interval: Duration) {
        self.next_wake = self.clock.get() + interval.as_secs() as u32;
    }

    fn mask_sample_interrupts(&mut self) {
        log::trace!("Sample interrupts masked");
    }

    fn unmask_sample_interrupts(&mut self) {
        log::trace!("Sample interrupts unmasked");
    }

    fn sleep(&mut self) {}
}

/// Core body temperature: 37 °C awake, cooling to 12 °C in torpor
struct SimThermometer {
    clock: Clock,
}

impl TemperatureSensor for SimThermometer {
    fn read(&mut self) -> Result<i16, BusError> {
        let now = self.clock.get();
        let celsius = if is_awake(now) {
            37.0 + 0.4 * ((now as f64) / 5400.0).sin()
        } else {
            12.0 + 1.5 * ((now as f64) / 3000.0).cos()
        };
        Ok((celsius * 128.0) as i16)
    }

    fn power(&mut self, _on: bool) {}
}

struct SimAccelerometer {
    clock: Clock,
    sampling: bool,
}

impl Accelerometer for SimAccelerometer {
    fn drain_fifo(&mut self, into: &mut AccelBuffer) -> Result<usize, BusError> {
        let t = self.clock.get() as f64;
        let mut stored = 0;
        for i in 0..datalogger_core::buffers::FIFO_DEPTH {
            let phase = t + i as f64 * 0.08;
            let triple = AccelTriple::new(
                (40.0 * (phase * 2.1).sin()) as i8,
                (25.0 * (phase * 1.3).cos()) as i8,
                (64.0 + 10.0 * (phase * 3.7).sin()) as i8,
            );
            if into.push(triple).is_err() {
                break;
            }
            stored += 1;
        }
        Ok(stored)
    }

    fn enable_interrupt(&mut self, source: InterruptSource) {
        log::debug!("Accelerometer: {:?} interrupt enabled", source);
    }

    fn disable_interrupt(&mut self, source: InterruptSource) {
        log::debug!("Accelerometer: {:?} interrupt disabled", source);
    }

    fn begin_sampling(&mut self) {
        self.sampling = true;
    }

    fn end_sampling(&mut self) {
        self.sampling = false;
    }
}

fn main() {
    env_logger::init();
    info!("Starting datalogger simulator: {} days of virtual time", SIM_DAYS);

    let config = LoggerConfig {
        activity_threshold: PIVOT,
        inactivity_threshold: PIVOT,
        die_size: DIE_SIZE,
        ..LoggerConfig::default()
    };
    if let Err(e) = config.validate() {
        warn!("Simulator config rejected: {}", e);
        return;
    }

    let clock: Clock = Rc::new(Cell::new(START));
    let platform = SimPlatform {
        clock: clock.clone(),
        next_wake: START,
    };
    let thermometer = SimThermometer {
        clock: clock.clone(),
    };
    let accelerometer = SimAccelerometer {
        clock: clock.clone(),
        sampling: false,
    };
    let flash = RamFlash::new(DIE_SIZE, ProgramModel::NorAnd);

    let mut logger = Logger::new(config, thermometer, accelerometer, flash, platform, &EVENTS);
    let mut burst_started = None;

    for now in START..START + SIM_DAYS * 86_400 {
        clock.set(now);

        if now >= logger.platform().next_wake {
            EVENTS.notify(LoggerEvent::Alarm);
        }

        if is_awake(now) && (now - START) % ACTIVITY_PERIOD == 0 {
            EVENTS.notify(LoggerEvent::Accel(AccelEvent::Activity));
            burst_started = Some(now);
        } else if !is_awake(now) && (now - START) % INACTIVITY_PERIOD == 0 {
            EVENTS.notify(LoggerEvent::Accel(AccelEvent::Inactivity));
        }

        if let Some(start) = burst_started
            && logger.accelerometer().sampling
            && (now - start) > 0
            && (now - start) % WATERMARK_SECS == 0
        {
            EVENTS.notify(LoggerEvent::Accel(AccelEvent::Watermark));
        }

        logger.run_once();
    }

    info!("Retrieval: closing the magnetic switch");
    EVENTS.notify(LoggerEvent::Switch);
    logger.run_once();

    dump_flash(&logger);
    info!("{}", logger.faults());
}

fn dump_flash(logger: &Logger<'_, SimThermometer, SimAccelerometer, RamFlash, SimPlatform>) {
    let flash = logger.store().flash();
    let mut image = flash.die(Die::First).to_vec();
    image.extend_from_slice(flash.die(Die::Second));

    let cursor = logger.store().cursor();
    info!(
        "Flash cursor at die {} offset {:#x} ({} bytes used)",
        cursor.die,
        cursor.offset,
        u64::from(cursor.die.index()) * u64::from(DIE_SIZE) + u64::from(cursor.offset)
    );

    let batches = match decode_log(&image) {
        Ok(batches) => batches,
        Err(e) => {
            warn!("Flash image did not decode: {}", e);
            return;
        }
    };

    for (n, batch) in batches.iter().enumerate() {
        for dataset in batch {
            let first = dataset
                .samples
                .first()
                .map(|s| s.to_string())
                .unwrap_or_else(|| "-".to_string());
            println!(
                "batch {:>3}  {:?}  t={}  {:>3} samples  first: {}",
                n,
                dataset.descriptor,
                dataset.timestamp,
                dataset.samples.len(),
                first
            );
        }
    }
    info!("Decoded {} batches", batches.len());
}
