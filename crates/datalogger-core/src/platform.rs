//! MCU facilities the logger relies on: clock, wake alarm, interrupt gating and sleep

use core::time::Duration;

/// Clock, alarm and power-mode entry of the host MCU
pub trait Platform {
    /// Seconds since epoch as kept by the RTC
    fn now(&self) -> u32;

    /// Arm the RTC alarm `interval` from now
    fn schedule_next_wake(&mut self, interval: Duration);

    /// Mask every interrupt whose handler can produce buffer-mutating events
    fn mask_sample_interrupts(&mut self);

    fn unmask_sample_interrupts(&mut self);

    /// Enter the low-power wait until the next alarm or sensor interrupt
    fn sleep(&mut self);
}

/// Masks sample interrupts for as long as it lives
pub struct ExclusiveSection<'a, P: Platform> {
    platform: &'a mut P,
}

impl<'a, P: Platform> ExclusiveSection<'a, P> {
    pub fn enter(platform: &'a mut P) -> Self {
        platform.mask_sample_interrupts();
        Self { platform }
    }

    /// Current RTC time, readable while the section is held
    pub fn now(&self) -> u32 {
        self.platform.now()
    }
}

impl<P: Platform> Drop for ExclusiveSection<'_, P> {
    fn drop(&mut self) {
        self.platform.unmask_sample_interrupts();
    }
}
