//! Bounded retry for collaborator transactions
//!
//! Bus transactions never block forever: they are retried a fixed number of
//! times (and optionally until a deadline) and then given up on, leaving the
//! caller to continue with stale data or skip the write.

use log::trace;

/// Attempt budget for one transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retry {
    attempts: u8,
}

/// The last error seen once the budget is spent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exhausted<E> {
    pub attempts: u8,
    pub last: E,
}

impl Retry {
    /// A budget of `attempts` tries; zero is treated as one.
    pub const fn new(attempts: u8) -> Self {
        Self {
            attempts: if attempts == 0 { 1 } else { attempts },
        }
    }

    pub const fn attempts(&self) -> u8 {
        self.attempts
    }

    /// Run `op` until it succeeds or the budget is spent.
    ///
    /// `op` receives the zero-based attempt number.
    pub fn run<T, E>(&self, mut op: impl FnMut(u8) -> Result<T, E>) -> Result<T, Exhausted<E>> {
        let mut attempt = 0;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(last) if attempt + 1 >= self.attempts => {
                    return Err(Exhausted {
                        attempts: attempt + 1,
                        last,
                    });
                }
                Err(_) => {
                    trace!("Attempt {} of {} failed, retrying", attempt + 1, self.attempts);
                    attempt += 1;
                }
            }
        }
    }

    /// Like [`Retry::run`], but also gives up once `now()` passes `deadline`.
    ///
    /// The first attempt always runs.
    pub fn run_until<T, E>(
        &self,
        now: impl Fn() -> u32,
        deadline: u32,
        mut op: impl FnMut(u8) -> Result<T, E>,
    ) -> Result<T, Exhausted<E>> {
        let mut attempt = 0;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(last) if attempt + 1 >= self.attempts || now() > deadline => {
                    return Err(Exhausted {
                        attempts: attempt + 1,
                        last,
                    });
                }
                Err(_) => attempt += 1,
            }
        }
    }
}
