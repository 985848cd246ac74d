//! Data plane components
//!
//! Classification, in-place rewrite, cycle timing and the polling engine
//! that ties them together.

mod classifier;
mod engine;
mod mutator;
mod scheduler;

pub use classifier::{classify, Classification, Protocol};
pub use engine::{
    CycleReport, EngineSettings, Mode, RedirectEngine, RunSummary, DEFAULT_BURST_SIZE,
    DEFAULT_PERIOD,
};
pub use mutator::{mutate, mutate_bytes};
pub use scheduler::{Clock, CycleScheduler, MonotonicClock, Timespec, Wake, NSEC_PER_SEC};
