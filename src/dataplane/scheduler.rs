//! Fixed-period cycle scheduler
//!
//! Keeps an absolute monotonic deadline and pushes it forward by exactly one
//! period per cycle, then sleeps until that instant with
//! `clock_nanosleep(TIMER_ABSTIME)`. Time spent processing a cycle therefore
//! never accumulates as drift.
//!
//! When a cycle overruns, the new deadline is already in the past and the
//! wait returns at once. There is no catch-up: the deadline keeps advancing
//! one period at a time, so under sustained overload the loop runs back to
//! back until it is on schedule again.

use std::cmp::Ordering;
use std::time::Duration;

/// Nanoseconds per second
pub const NSEC_PER_SEC: i64 = 1_000_000_000;

/// Absolute monotonic timestamp, kept normalized so `0 <= nsec < 1e9`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Timespec {
    pub sec: i64,
    pub nsec: i64,
}

impl Timespec {
    pub fn new(sec: i64, nsec: i64) -> Self {
        Self { sec, nsec }.normalized()
    }

    /// Carries whole seconds out of the nanosecond field.
    pub fn normalized(mut self) -> Self {
        self.sec += self.nsec.div_euclid(NSEC_PER_SEC);
        self.nsec = self.nsec.rem_euclid(NSEC_PER_SEC);
        self
    }

    pub fn add(self, d: Duration) -> Self {
        Self {
            sec: self.sec + d.as_secs() as i64,
            nsec: self.nsec + d.subsec_nanos() as i64,
        }
        .normalized()
    }

    /// `self - earlier`, saturating at zero.
    pub fn saturating_sub(self, earlier: Timespec) -> Duration {
        let nanos = (self.sec - earlier.sec) as i128 * NSEC_PER_SEC as i128
            + (self.nsec - earlier.nsec) as i128;
        if nanos <= 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos(nanos.min(u64::MAX as i128) as u64)
        }
    }
}

impl Ord for Timespec {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.sec, self.nsec).cmp(&(other.sec, other.nsec))
    }
}

impl PartialOrd for Timespec {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<libc::timespec> for Timespec {
    fn from(ts: libc::timespec) -> Self {
        Timespec::new(ts.tv_sec as i64, ts.tv_nsec as i64)
    }
}

impl From<Timespec> for libc::timespec {
    fn from(ts: Timespec) -> Self {
        libc::timespec {
            tv_sec: ts.sec as libc::time_t,
            tv_nsec: ts.nsec as _,
        }
    }
}

/// Time source the scheduler reads and sleeps on.
pub trait Clock {
    fn now(&self) -> Timespec;

    /// Blocks until `deadline`; returns at once if it has already passed.
    fn sleep_until(&self, deadline: Timespec);
}

/// `CLOCK_MONOTONIC` with absolute sleeps
#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now(&self) -> Timespec {
        let mut ts = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) };
        ts.into()
    }

    fn sleep_until(&self, deadline: Timespec) {
        let ts: libc::timespec = deadline.into();
        loop {
            let ret = unsafe {
                libc::clock_nanosleep(
                    libc::CLOCK_MONOTONIC,
                    libc::TIMER_ABSTIME,
                    &ts,
                    std::ptr::null_mut(),
                )
            };
            // clock_nanosleep returns the error number rather than setting errno
            if ret != libc::EINTR {
                break;
            }
        }
    }
}

/// How the scheduler came out of a wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    /// Slept until the deadline
    OnTime,
    /// Deadline had already passed; returned without sleeping
    Overrun,
}

/// Constant-period gate for the polling loop
pub struct CycleScheduler<C: Clock = MonotonicClock> {
    clock: C,
    period: Duration,
    next_deadline: Option<Timespec>,
    overruns: u64,
}

impl<C: Clock> CycleScheduler<C> {
    pub fn new(period: Duration, clock: C) -> Self {
        Self {
            clock,
            period,
            next_deadline: None,
            overruns: 0,
        }
    }

    /// Anchors the schedule at the current monotonic time.
    pub fn start(&mut self) {
        self.next_deadline = Some(self.clock.now());
    }

    /// Advances the deadline by one period and sleeps until it.
    ///
    /// Starts the schedule first if [`start`](Self::start) was never called.
    pub fn advance_and_wait(&mut self) -> Wake {
        let clock = &self.clock;
        let base = *self.next_deadline.get_or_insert_with(|| clock.now());
        let deadline = base.add(self.period);
        self.next_deadline = Some(deadline);

        if deadline <= self.clock.now() {
            self.overruns += 1;
            return Wake::Overrun;
        }

        self.clock.sleep_until(deadline);
        Wake::OnTime
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn next_deadline(&self) -> Option<Timespec> {
        self.next_deadline
    }

    /// Waits that found their deadline already passed.
    pub fn overruns(&self) -> u64 {
        self.overruns
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }
}
