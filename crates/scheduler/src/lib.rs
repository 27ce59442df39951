use std::time::{Duration, Instant};

use wallconfig::RetryOptions;

/// Why a timer was armed; logged when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerPurpose {
    Cycle,
    Retry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Armed {
    deadline: Instant,
    purpose: TimerPurpose,
}

/// Single-shot timer slot. Arming replaces any pending deadline.
#[derive(Debug, Default)]
pub struct Timer {
    armed: Option<Armed>,
}

impl Timer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm(&mut self, delay: Duration, purpose: TimerPurpose, now: Instant) {
        let deadline = now + delay;
        if let Some(previous) = self.armed {
            tracing::trace!(
                previous = ?previous.purpose,
                ?purpose,
                delay_ms = delay.as_millis() as u64,
                "rearming timer"
            );
        }
        self.armed = Some(Armed { deadline, purpose });
    }

    /// Arms the timer only when nothing is pending. Returns whether it armed.
    pub fn arm_if_idle(&mut self, delay: Duration, purpose: TimerPurpose, now: Instant) -> bool {
        if self.armed.is_some() {
            return false;
        }
        self.arm(delay, purpose, now);
        true
    }

    pub fn disarm(&mut self) {
        self.armed = None;
    }

    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.armed.map(|armed| armed.deadline)
    }

    pub fn purpose(&self) -> Option<TimerPurpose> {
        self.armed.map(|armed| armed.purpose)
    }

    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.deadline()
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    /// Consumes the pending deadline once it has passed.
    pub fn fire_if_due(&mut self, now: Instant) -> Option<TimerPurpose> {
        match self.armed {
            Some(armed) if now >= armed.deadline => {
                self.armed = None;
                Some(armed.purpose)
            }
            _ => None,
        }
    }
}

/// Earliest of a set of optional deadlines.
pub fn earliest<I>(deadlines: I) -> Option<Instant>
where
    I: IntoIterator<Item = Option<Instant>>,
{
    deadlines.into_iter().flatten().min()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Reissue the fetch right away.
    Immediate,
    /// Stop retrying this cycle and wait for the backoff timer.
    Backoff(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub threshold: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn from_options(options: &RetryOptions) -> Self {
        Self {
            threshold: options.threshold,
            backoff: options.backoff,
        }
    }

    /// `failures` is the consecutive failure count after the latest failure.
    pub fn decide(&self, failures: u32) -> RetryDecision {
        if failures > self.threshold {
            RetryDecision::Backoff(self.backoff)
        } else {
            RetryDecision::Immediate
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_options(&RetryOptions::default())
    }
}
