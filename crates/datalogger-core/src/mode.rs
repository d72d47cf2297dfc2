//! Adaptive sampling state machine
//!
//! [`ModeController`] is the only writer of [`ModeState`]. Temperature
//! samples move the logger between active and inactive; accelerometer
//! interrupts drive sampling bursts and the seasonal duty-cycle flag.
//!
//! ```text
//!            128 × t <= inactivity threshold
//!   Active ----------------------------------> Inactive
//!      ^                                          |
//!      +------------------------------------------+
//!            128 × t >  activity threshold
//! ```
//!
//! Every activity change opens a new temperature dataset stamped with the
//! sample time. Each sampling burst opens a new acceleration dataset.

use core::fmt::Display;
use core::time::Duration;

use log::{debug, info, warn};

use crate::buffers::{AccelBuffer, FIFO_DEPTH, FIFO_DRAINS_PER_BURST, TemperatureBuffer};
use crate::config::LoggerConfig;
use crate::error::LoggerError;
use crate::events::AccelEvent;
use crate::sensors::{Accelerometer, InterruptSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Activity {
    #[default]
    Active,
    Inactive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Motion {
    #[default]
    Stationary,
    Motion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModeState {
    pub activity: Activity,
    /// Never leaves `Stationary`: no transition sets `Motion` yet.
    pub motion: Motion,
}

impl Display for ModeState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:?}/{:?}", self.activity, self.motion)
    }
}

/// Coarse seasonal duty cycle toggled by accelerometer activity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DutyCycle {
    #[default]
    High,
    Low,
}

impl DutyCycle {
    pub const fn flipped(self) -> Self {
        match self {
            Self::High => Self::Low,
            Self::Low => Self::High,
        }
    }
}

/// Next wake interval for `activity`
pub fn wake_interval(activity: Activity, config: &LoggerConfig) -> Duration {
    match activity {
        Activity::Active => config.active_wake(),
        Activity::Inactive => config.inactive_wake(),
    }
}

#[derive(Debug, Clone)]
pub struct ModeController {
    state: ModeState,
    duty: DutyCycle,
    activity_threshold: i32,
    inactivity_threshold: i32,
    debounce: u8,
    inactivity_count: u8,
    inactivity_armed: bool,
    /// Watermark drains taken in the current burst, `None` outside a burst
    burst: Option<usize>,
}

impl ModeController {
    pub fn new(config: &LoggerConfig) -> Self {
        Self {
            state: ModeState::default(),
            duty: DutyCycle::default(),
            activity_threshold: config.activity_threshold,
            inactivity_threshold: config.inactivity_threshold,
            debounce: config.inactivity_debounce,
            inactivity_count: 0,
            inactivity_armed: true,
            burst: None,
        }
    }

    pub fn state(&self) -> ModeState {
        self.state
    }

    pub fn duty(&self) -> DutyCycle {
        self.duty
    }

    pub fn is_sampling(&self) -> bool {
        self.burst.is_some()
    }

    pub fn inactivity_count(&self) -> u8 {
        self.inactivity_count
    }

    /// Store a temperature sample and apply any activity change it causes.
    ///
    /// Returns the new activity when it changed. On a change the boundary is
    /// opened after the state and interrupts were updated, so a
    /// [`LoggerError::TooManyDatasets`] leaves the transition applied.
    pub fn on_temperature_sample<A: Accelerometer>(
        &mut self,
        value: i16,
        now: u32,
        buffer: &mut TemperatureBuffer,
        accelerometer: &mut A,
    ) -> Result<Option<Activity>, LoggerError> {
        buffer.push(value)?;

        let scaled = i32::from(value) * 128;
        let next = match self.state.activity {
            Activity::Active if scaled <= self.inactivity_threshold => Activity::Inactive,
            Activity::Inactive if scaled > self.activity_threshold => Activity::Active,
            _ => return Ok(None),
        };

        self.state = ModeState {
            activity: next,
            motion: Motion::Stationary,
        };
        match next {
            Activity::Inactive => accelerometer.disable_interrupt(InterruptSource::Activity),
            Activity::Active => accelerometer.enable_interrupt(InterruptSource::Activity),
        }
        info!("Mode -> {} at t={} (raw {})", self.state, now, value);

        buffer.open_dataset_boundary(now)?;
        Ok(Some(next))
    }

    /// Apply one accelerometer interrupt.
    pub fn on_accel_event<A: Accelerometer>(
        &mut self,
        kind: AccelEvent,
        now: u32,
        buffer: &mut AccelBuffer,
        accelerometer: &mut A,
    ) -> Result<(), LoggerError> {
        match kind {
            AccelEvent::Activity => self.on_activity(now, buffer, accelerometer),
            AccelEvent::Watermark => self.on_watermark(buffer, accelerometer),
            AccelEvent::Inactivity => {
                self.on_inactivity(accelerometer);
                Ok(())
            }
        }
    }

    fn on_activity<A: Accelerometer>(
        &mut self,
        now: u32,
        buffer: &mut AccelBuffer,
        accelerometer: &mut A,
    ) -> Result<(), LoggerError> {
        self.duty = self.duty.flipped();

        self.inactivity_count = 0;
        if !self.inactivity_armed {
            accelerometer.enable_interrupt(InterruptSource::Inactivity);
            self.inactivity_armed = true;
        }

        accelerometer.begin_sampling();
        self.burst = Some(0);
        debug!("Sampling burst started at t={}, duty {:?}", now, self.duty);

        buffer.open_dataset_boundary(now)?;
        Ok(())
    }

    fn on_watermark<A: Accelerometer>(
        &mut self,
        buffer: &mut AccelBuffer,
        accelerometer: &mut A,
    ) -> Result<(), LoggerError> {
        let overflow = buffer.remaining() < FIFO_DEPTH;
        let drained = accelerometer.drain_fifo(buffer);

        if let Some(drains) = self.burst.as_mut() {
            *drains += 1;
            if *drains >= FIFO_DRAINS_PER_BURST {
                accelerometer.end_sampling();
                self.burst = None;
                debug!("Sampling burst complete, {} samples buffered", buffer.len());
            }
        }

        let drained = drained?;
        if overflow {
            warn!("FIFO drain found only {} free slots", drained);
            return Err(LoggerError::BufferFull);
        }
        Ok(())
    }

    fn on_inactivity<A: Accelerometer>(&mut self, accelerometer: &mut A) {
        self.inactivity_count = self.inactivity_count.saturating_add(1);
        if self.inactivity_count >= self.debounce {
            self.duty = self.duty.flipped();
            info!("Inactivity debounced, duty {:?}", self.duty);
        }

        if self.duty == DutyCycle::Low && self.inactivity_armed {
            accelerometer.disable_interrupt(InterruptSource::Inactivity);
            self.inactivity_armed = false;
        }
    }
}
