//! Process runtime
//!
//! Brought up once before the polling loop and torn down after it:
//! SIGINT/SIGTERM handling, pinning the polling thread to its core, and
//! optional memory locking and real-time priority.

use crate::config::RuntimeConfig;
use crate::{Error, Result};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

/// Set by SIGINT/SIGTERM; the engine checks it once per cycle.
static SHUTDOWN: AtomicBool = AtomicBool::new(false);

extern "C" fn signal_handler(_sig: libc::c_int) {
    SHUTDOWN.store(true, Ordering::Relaxed);
}

/// Handle to an initialised runtime
#[derive(Debug)]
pub struct Runtime {
    core: Option<usize>,
    socket: Option<u32>,
    memory_locked: bool,
}

impl Runtime {
    /// Installs signal handlers and applies the CPU and memory settings to
    /// the calling thread, which becomes the polling thread.
    pub fn init(config: &RuntimeConfig) -> Result<Self> {
        SHUTDOWN.store(false, Ordering::Relaxed);
        unsafe {
            libc::signal(libc::SIGINT, signal_handler as *const () as libc::sighandler_t);
            libc::signal(libc::SIGTERM, signal_handler as *const () as libc::sighandler_t);
        }

        let core = config.cores.first().copied();
        if config.cores.len() > 1 {
            warn!(
                "Too many cores enabled ({:?}). Only core {} is used.",
                config.cores,
                config.cores[0]
            );
        }
        if let Some(core) = core {
            pin_to_core(core)?;
        }

        let memory_locked = if config.lock_memory {
            let ret = unsafe { libc::mlockall(libc::MCL_CURRENT | libc::MCL_FUTURE) };
            if ret != 0 {
                return Err(init_error("mlockall", io::Error::last_os_error()));
            }
            true
        } else {
            false
        };

        if config.realtime_priority > 0 {
            set_fifo_priority(config.realtime_priority)?;
        }

        let cpu = core.or_else(current_cpu);
        let socket = cpu.and_then(numa_node_of_cpu);

        info!(
            "Runtime ready: core={}, NUMA socket={}, mlock={}, rt_priority={}",
            cpu.map_or_else(|| "any".to_string(), |c| c.to_string()),
            socket.map_or_else(|| "unknown".to_string(), |s| s.to_string()),
            memory_locked,
            config.realtime_priority
        );

        Ok(Self {
            core,
            socket,
            memory_locked,
        })
    }

    /// Process-wide stop flag, raised by SIGINT/SIGTERM.
    pub fn stop_token(&self) -> &'static AtomicBool {
        &SHUTDOWN
    }

    /// Core the polling thread is pinned to, if any.
    pub fn polling_core(&self) -> Option<usize> {
        self.core
    }

    /// NUMA node of the polling core, if known.
    pub fn socket_id(&self) -> Option<u32> {
        self.socket
    }

    pub fn cleanup(self) {
        if self.memory_locked {
            unsafe { libc::munlockall() };
        }
        info!("Runtime cleaned up");
    }
}

fn init_error(what: &str, err: io::Error) -> Error {
    Error::Init(format!("{} failed: {}", what, err))
}

fn pin_to_core(core: usize) -> Result<()> {
    if core >= libc::CPU_SETSIZE as usize {
        return Err(Error::Init(format!("core {} out of range", core)));
    }
    unsafe {
        let mut cpuset: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_SET(core, &mut cpuset);
        if libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &cpuset) != 0 {
            return Err(init_error("sched_setaffinity", io::Error::last_os_error()));
        }
    }
    Ok(())
}

fn set_fifo_priority(priority: u8) -> Result<()> {
    let param = libc::sched_param {
        sched_priority: priority as libc::c_int,
    };
    if unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) } != 0 {
        return Err(init_error("sched_setscheduler", io::Error::last_os_error()));
    }
    Ok(())
}

fn current_cpu() -> Option<usize> {
    let cpu = unsafe { libc::sched_getcpu() };
    usize::try_from(cpu).ok()
}

/// NUMA node of a CPU, from the `nodeN` link sysfs keeps under each CPU.
pub fn numa_node_of_cpu(cpu: usize) -> Option<u32> {
    let dir = format!("/sys/devices/system/cpu/cpu{}", cpu);
    std::fs::read_dir(dir)
        .ok()?
        .filter_map(|entry| entry.ok())
        .find_map(|entry| parse_node_name(&entry.file_name().to_string_lossy()))
}

fn parse_node_name(name: &str) -> Option<u32> {
    name.strip_prefix("node")?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_node_name() {
        assert_eq!(parse_node_name("node0"), Some(0));
        assert_eq!(parse_node_name("node12"), Some(12));
        assert_eq!(parse_node_name("nodes"), None);
        assert_eq!(parse_node_name("cpufreq"), None);
    }

    #[test]
    fn test_pin_out_of_range_core() {
        assert!(matches!(pin_to_core(usize::MAX), Err(Error::Init(_))));
    }

    #[test]
    fn test_init_without_pinning() {
        let runtime = Runtime::init(&RuntimeConfig::default()).unwrap();
        assert_eq!(runtime.polling_core(), None);
        assert!(!runtime.stop_token().load(Ordering::Relaxed));
        runtime.cleanup();
    }
}
