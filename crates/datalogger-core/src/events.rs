//! Interrupt-to-main-loop event queue
//!
//! Interrupt handlers never touch logger state. They post a [`LoggerEvent`]
//! with [`EventQueue::notify`] and the main loop applies it, so every
//! mutation happens on one thread of control.
//!
//! ```rust,ignore
//! static EVENTS: EventQueue = EventQueue::new();
//!
//! // In the accelerometer INT1 handler
//! EVENTS.notify(LoggerEvent::Accel(AccelEvent::Watermark));
//! ```

use core::cell::Cell;

use critical_section::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, TrySendError};
use log::trace;

/// Events buffered between two main-loop passes
pub const EVENT_QUEUE_CAPACITY: usize = 16;

/// Accelerometer interrupt sources
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccelEvent {
    Activity,
    Inactivity,
    /// FIFO reached its watermark
    Watermark,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggerEvent {
    /// RTC alarm: periodic wake
    Alarm,
    Accel(AccelEvent),
    /// Magnetic retrieval switch
    Switch,
}

pub struct EventQueue {
    channel: Channel<CriticalSectionRawMutex, LoggerEvent, EVENT_QUEUE_CAPACITY>,
    dropped: Mutex<Cell<u32>>,
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl EventQueue {
    pub const fn new() -> Self {
        Self {
            channel: Channel::new(),
            dropped: Mutex::new(Cell::new(0)),
        }
    }

    /// Post an event; safe to call from interrupt context.
    ///
    /// Returns `false` and counts the event as dropped when the queue is full.
    pub fn notify(&self, event: LoggerEvent) -> bool {
        match self.channel.try_send(event) {
            Ok(()) => {
                trace!("Queued {:?}", event);
                true
            }
            Err(TrySendError::Full(_)) => {
                critical_section::with(|cs| {
                    let dropped = self.dropped.borrow(cs);
                    dropped.set(dropped.get().saturating_add(1));
                });
                false
            }
        }
    }

    pub fn try_next(&self) -> Option<LoggerEvent> {
        self.channel.try_receive().ok()
    }

    /// Events lost to a full queue since boot
    pub fn dropped(&self) -> u32 {
        critical_section::with(|cs| self.dropped.borrow(cs).get())
    }

    pub fn len(&self) -> usize {
        self.channel.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channel.is_empty()
    }
}
