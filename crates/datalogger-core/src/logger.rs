//! The logger main loop
//!
//! [`Logger`] owns the collaborators, both sample buffers, the mode
//! controller and the offload engine. Interrupt handlers only post events
//! to the [`EventQueue`]; the loop applies them one at a time, checks the
//! offload trigger after each, and sleeps once the queue is empty.

use log::{debug, info, warn};

use crate::buffers::{AccelBuffer, FIFO_DEPTH, TEMPERATURE_BURST, TemperatureBuffer};
use crate::config::LoggerConfig;
use crate::error::{FaultCounters, LoggerError};
use crate::events::{EventQueue, LoggerEvent};
use crate::mode::{ModeController, wake_interval};
use crate::platform::Platform;
use crate::retry::Retry;
use crate::sensors::{Accelerometer, TemperatureSensor};
use crate::storage::{FlashDevice, FlashRingStore, OffloadEngine, OffloadReport};

/// Whether either buffer is too full to take its next burst
///
/// One periodic sample for temperature, one FIFO drain for acceleration.
pub fn offload_due(temperature: &TemperatureBuffer, accel: &AccelBuffer) -> bool {
    temperature.remaining() < TEMPERATURE_BURST || accel.remaining() < FIFO_DEPTH
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Temperature,
    Accel,
}

pub struct Logger<'a, T, A, F, P>
where
    T: TemperatureSensor,
    A: Accelerometer,
    F: FlashDevice,
    P: Platform,
{
    config: LoggerConfig,
    thermometer: T,
    accelerometer: A,
    platform: P,
    events: &'a EventQueue,
    temperature: TemperatureBuffer,
    accel: AccelBuffer,
    mode: ModeController,
    offload: OffloadEngine<F>,
    bus_retry: Retry,
    faults: FaultCounters,
}

impl<'a, T, A, F, P> Logger<'a, T, A, F, P>
where
    T: TemperatureSensor,
    A: Accelerometer,
    F: FlashDevice,
    P: Platform,
{
    /// Build the logger, open the first dataset of each buffer and arm the
    /// first wake.
    pub fn new(
        config: LoggerConfig,
        thermometer: T,
        accelerometer: A,
        flash: F,
        mut platform: P,
        events: &'a EventQueue,
    ) -> Self {
        let now = platform.now();
        let mode = ModeController::new(&config);

        let mut temperature = TemperatureBuffer::new();
        if let Err(e) = temperature.open_dataset_boundary(now) {
            warn!("Could not open first temperature dataset: {}", e);
        }
        let mut accel = AccelBuffer::new();
        if let Err(e) = accel.open_dataset_boundary(now) {
            warn!("Could not open first acceleration dataset: {}", e);
        }

        let store = FlashRingStore::new(
            flash,
            config.die_size,
            Retry::new(config.flash_write_attempts),
        );
        let offload = OffloadEngine::new(store, config.write_failure_policy);

        platform.schedule_next_wake(wake_interval(mode.state().activity, &config));
        info!("Logger started at t={} in {}", now, mode.state());

        Self {
            bus_retry: Retry::new(config.bus_retry_attempts),
            config,
            thermometer,
            accelerometer,
            platform,
            events,
            temperature,
            accel,
            mode,
            offload,
            faults: FaultCounters::default(),
        }
    }

    pub fn config(&self) -> &LoggerConfig {
        &self.config
    }

    pub fn mode(&self) -> &ModeController {
        &self.mode
    }

    pub fn temperature(&self) -> &TemperatureBuffer {
        &self.temperature
    }

    pub fn accel(&self) -> &AccelBuffer {
        &self.accel
    }

    pub fn store(&self) -> &FlashRingStore<F> {
        self.offload.store()
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }

    pub fn thermometer_mut(&mut self) -> &mut T {
        &mut self.thermometer
    }

    pub fn accelerometer(&self) -> &A {
        &self.accelerometer
    }

    /// Recovered faults since boot, including events the queue dropped
    pub fn faults(&self) -> FaultCounters {
        FaultCounters {
            dropped_events: self.events.dropped(),
            ..self.faults
        }
    }

    /// Apply one event, then offload if a buffer can no longer take its
    /// next burst.
    pub fn handle_event(&mut self, event: LoggerEvent) {
        debug!("Handling {:?}", event);
        match event {
            LoggerEvent::Alarm => {
                self.sample_temperature();
                let interval = wake_interval(self.mode.state().activity, &self.config);
                self.platform.schedule_next_wake(interval);
            }
            LoggerEvent::Accel(kind) => {
                let now = self.platform.now();
                let result =
                    self.mode
                        .on_accel_event(kind, now, &mut self.accel, &mut self.accelerometer);
                self.absorb(result, now, Target::Accel);
            }
            LoggerEvent::Switch => {
                info!("Retrieval switch: flushing buffers");
                self.force_offload();
            }
        }

        self.offload_if_needed();
    }

    /// Read the temperature sensor and feed the sample to the mode controller.
    ///
    /// A read that exhausts its retry budget, or is still failing once the
    /// bus deadline has passed, is counted and skipped.
    pub fn sample_temperature(&mut self) {
        let now = self.platform.now();
        let deadline = now.saturating_add(self.config.bus_deadline_secs);

        let platform = &self.platform;
        let thermometer = &mut self.thermometer;
        thermometer.power(true);
        let reading = self
            .bus_retry
            .run_until(|| platform.now(), deadline, |_| thermometer.read());
        thermometer.power(false);

        let value = match reading {
            Ok(value) => value,
            Err(exhausted) => {
                warn!(
                    "Temperature read gave up after {} attempts: {}",
                    exhausted.attempts, exhausted.last
                );
                self.faults.record(LoggerError::BusTimeout {
                    attempts: exhausted.attempts,
                });
                return;
            }
        };

        debug!("Temperature raw {} at t={}", value, now);
        let result = self.mode.on_temperature_sample(
            value,
            now,
            &mut self.temperature,
            &mut self.accelerometer,
        );
        self.absorb(result.map(|_| ()), now, Target::Temperature);
    }

    /// Offload if the trigger fires
    pub fn offload_if_needed(&mut self) -> Option<OffloadReport> {
        if offload_due(&self.temperature, &self.accel) {
            Some(self.force_offload())
        } else {
            None
        }
    }

    /// Offload both buffers now, regardless of fill level
    pub fn force_offload(&mut self) -> OffloadReport {
        let report = self
            .offload
            .offload(&mut self.platform, &mut self.temperature, &mut self.accel);
        for failure in &report.failures {
            self.faults.record(LoggerError::from(*failure));
        }
        report
    }

    /// Drain the event queue, returning how many events were applied
    pub fn run_once(&mut self) -> usize {
        let mut handled = 0;
        while let Some(event) = self.events.try_next() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    /// Apply events and sleep between them, forever
    pub fn run(&mut self) -> ! {
        loop {
            self.run_once();
            self.platform.sleep();
        }
    }

    fn absorb(&mut self, result: Result<(), LoggerError>, now: u32, target: Target) {
        let Err(err) = result else {
            return;
        };
        self.faults.record(err);

        match err {
            LoggerError::TooManyDatasets => {
                warn!("{:?} dataset table full, forcing offload", target);
                self.force_offload();

                // The fresh dataset carries the transition time
                let reopened = match target {
                    Target::Temperature => self.temperature.open_dataset_boundary(now),
                    Target::Accel => self.accel.open_dataset_boundary(now),
                };
                if let Err(e) = reopened {
                    warn!("Could not restamp dataset: {}", e);
                }
            }
            LoggerError::BufferFull => {
                debug_assert!(false, "{:?} buffer overflowed past the offload trigger", target);
                warn!("{:?} sample dropped: buffer full", target);
            }
            other => warn!("{:?} fault recovered: {}", target, other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffers::{
        ACCEL_CAPACITY, AccelTriple, Descriptor, MAX_DATASETS, TEMPERATURE_CAPACITY,
    };
    use crate::codec::decode_log;
    use crate::events::AccelEvent;
    use crate::mode::Activity;
    use crate::sensors::InterruptSource;
    use crate::storage::{Die, ProgramModel, RamFlash};
    use crate::test_support::{MockAccelerometer, MockPlatform, MockThermometer};
    use core::time::Duration;

    const DIE: u32 = 4096;
    const WARM: i16 = 37 * 128;

    type TestLogger<'a> = Logger<'a, MockThermometer, MockAccelerometer, RamFlash, MockPlatform>;

    fn logger(events: &EventQueue, fallback: i16) -> TestLogger<'_> {
        logger_with_flash(events, fallback, RamFlash::new(DIE, ProgramModel::NorAnd))
    }

    fn logger_with_flash(events: &EventQueue, fallback: i16, flash: RamFlash) -> TestLogger<'_> {
        let config = LoggerConfig {
            die_size: DIE,
            ..LoggerConfig::default()
        };
        Logger::new(
            config,
            MockThermometer::new(fallback),
            MockAccelerometer::new(),
            flash,
            MockPlatform::at(1_000),
            events,
        )
    }

    fn alarm_at(logger: &mut TestLogger<'_>, now: u32) {
        logger.platform_mut().now = now;
        logger.handle_event(LoggerEvent::Alarm);
    }

    #[test]
    fn test_new_opens_datasets_and_arms_wake() {
        let events = EventQueue::new();
        let logger = logger(&events, WARM);

        assert_eq!(logger.temperature().dataset_count(), 1);
        assert_eq!(logger.accel().dataset_count(), 1);
        assert_eq!(logger.temperature().datasets().next().unwrap().timestamp, 1_000);
        assert_eq!(logger.platform().wakes, [Duration::from_secs(1200)]);
    }

    #[test]
    fn test_alarm_samples_and_reschedules() {
        let events = EventQueue::new();
        let mut logger = logger(&events, 0);

        alarm_at(&mut logger, 2_000);

        assert_eq!(logger.temperature().samples(), &[0]);
        assert_eq!(logger.mode().state().activity, Activity::Inactive);
        assert!(!logger.accelerometer().is_enabled(InterruptSource::Activity));
        assert_eq!(
            logger.platform().wakes.last(),
            Some(&Duration::from_secs(3600))
        );
        assert_eq!(logger.temperature().dataset_count(), 2);
    }

    #[test]
    fn test_offload_triggers_on_last_free_slot() {
        let events = EventQueue::new();
        let mut logger = logger(&events, WARM);

        for i in 0..TEMPERATURE_CAPACITY - 1 {
            alarm_at(&mut logger, 2_000 + i as u32);
        }
        assert_eq!(logger.temperature().len(), TEMPERATURE_CAPACITY - 1);
        assert_eq!(logger.store().cursor().offset, 0);

        alarm_at(&mut logger, 9_000);

        assert_eq!(logger.temperature().len(), 0);
        let pending: alloc::vec::Vec<_> = logger.temperature().datasets().collect();
        assert_eq!(pending.len(), 1);
        assert_eq!((pending[0].start, pending[0].end), (0, 0));

        let log = decode_log(logger.store().flash().die(Die::First)).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0][0].samples.len(), TEMPERATURE_CAPACITY);
        assert_eq!(log[0][0].timestamp, 1_000);
    }

    #[test]
    fn test_accel_burst_fills_and_offloads() {
        let events = EventQueue::new();
        let mut logger = logger(&events, WARM);

        logger.handle_event(LoggerEvent::Accel(AccelEvent::Activity));
        logger.handle_event(LoggerEvent::Accel(AccelEvent::Watermark));
        assert_eq!(logger.accel().len(), FIFO_DEPTH);

        logger.handle_event(LoggerEvent::Accel(AccelEvent::Watermark));

        // A full burst leaves no room for another drain
        assert_eq!(logger.accel().len(), 0);
        assert!(!logger.mode().is_sampling());

        let log = decode_log(logger.store().flash().die(Die::First)).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0][0].descriptor, Descriptor::Accel);
        assert_eq!(log[0][0].samples.len(), ACCEL_CAPACITY);
    }

    #[test]
    fn test_switch_forces_offload() {
        let events = EventQueue::new();
        let mut logger = logger(&events, WARM);
        alarm_at(&mut logger, 1_100);
        alarm_at(&mut logger, 1_200);

        logger.handle_event(LoggerEvent::Switch);

        assert!(logger.temperature().is_empty());
        let log = decode_log(logger.store().flash().die(Die::First)).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0][0].samples.len(), 2);
    }

    #[test]
    fn test_bus_timeout_is_counted_and_skipped() {
        let events = EventQueue::new();
        let mut logger = logger(&events, WARM);
        logger.thermometer_mut().failing = true;

        alarm_at(&mut logger, 2_000);

        assert!(logger.temperature().is_empty());
        assert_eq!(logger.faults().bus_timeouts, 1);
        assert_eq!(logger.thermometer_mut().reads, 8);
        assert!(!logger.thermometer_mut().powered);
        // The wake is still rescheduled
        assert_eq!(logger.platform().wakes.len(), 2);
    }

    #[test]
    fn test_dataset_exhaustion_forces_offload() {
        let events = EventQueue::new();
        let mut logger = logger(&events, WARM);

        // Every sample flips the activity, opening a boundary each time
        for i in 0..16u32 {
            let value = if i % 2 == 0 { 0 } else { WARM };
            logger.thermometer_mut().readings.push_back(value);
            alarm_at(&mut logger, 5_000 + i);
        }

        let faults = logger.faults();
        assert_eq!(faults.forced_offloads, 1);
        assert!(logger.temperature().is_empty());
        let pending: alloc::vec::Vec<_> = logger.temperature().datasets().collect();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].timestamp, 5_015);

        let log = decode_log(logger.store().flash().die(Die::First)).unwrap();
        assert_eq!(log[0].len(), 16);
    }

    #[test]
    fn test_bus_deadline_cuts_retries_short() {
        let events = EventQueue::new();
        let mut logger = logger(&events, WARM);
        logger.thermometer_mut().failing = true;
        logger.platform_mut().tick = 1;

        // Deadline is two seconds after the first clock read; the clock
        // passes it after the third failed read.
        logger.sample_temperature();

        assert_eq!(logger.thermometer_mut().reads, 3);
        assert_eq!(logger.faults().bus_timeouts, 1);
        assert!(!logger.thermometer_mut().powered);
    }

    #[test]
    fn test_accel_dataset_exhaustion_forces_offload() {
        let events = EventQueue::new();
        let mut logger = logger(&events, WARM);
        for i in 1..MAX_DATASETS as u32 {
            logger.accel.push(AccelTriple::new(1, 1, 1)).unwrap();
            logger.accel.open_dataset_boundary(1_000 + i).unwrap();
        }
        logger.accel.push(AccelTriple::new(2, 2, 2)).unwrap();
        assert_eq!(logger.accel().dataset_count(), MAX_DATASETS);

        logger.platform_mut().now = 3_000;
        logger.handle_event(LoggerEvent::Accel(AccelEvent::Activity));

        assert_eq!(logger.faults().forced_offloads, 1);
        assert!(logger.mode().is_sampling());
        assert!(logger.accel().is_empty());
        let pending: alloc::vec::Vec<_> = logger.accel().datasets().collect();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].timestamp, 3_000);

        let log = decode_log(logger.store().flash().die(Die::First)).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].len(), MAX_DATASETS);
        assert_eq!(log[0][0].descriptor, Descriptor::Accel);
    }

    #[test]
    fn test_write_failures_are_recorded() {
        let events = EventQueue::new();
        // Offset 0 already reads 0x00, so the header length byte cannot verify
        let mut flash = RamFlash::new(DIE, ProgramModel::NorAnd);
        flash.program_byte(Die::First, 0, 0x00).unwrap();
        let mut logger = logger_with_flash(&events, WARM, flash);
        alarm_at(&mut logger, 1_100);

        let report = logger.force_offload();

        assert_eq!(report.write_failures(), 1);
        assert_eq!(logger.faults().write_verify_failures, 1);
    }

    #[test]
    fn test_run_once_drains_queue() {
        let events = EventQueue::new();
        let mut logger = logger(&events, WARM);

        events.notify(LoggerEvent::Alarm);
        events.notify(LoggerEvent::Accel(AccelEvent::Inactivity));
        events.notify(LoggerEvent::Alarm);

        assert_eq!(logger.run_once(), 3);
        assert_eq!(logger.temperature().len(), 2);
        assert_eq!(logger.mode().inactivity_count(), 1);
        assert_eq!(logger.run_once(), 0);
    }

    #[test]
    fn test_dropped_events_show_in_faults() {
        let events = EventQueue::new();
        let logger = logger(&events, WARM);

        for _ in 0..crate::events::EVENT_QUEUE_CAPACITY + 3 {
            events.notify(LoggerEvent::Alarm);
        }

        assert_eq!(logger.faults().dropped_events, 3);
    }
}
