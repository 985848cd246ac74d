//! veth pair test helpers

use std::process::{Command, Output};
use std::sync::atomic::{AtomicU64, Ordering};

/// Global counter for unique interface names
static PAIR_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A veth pair that is deleted again on drop
pub struct VethPair {
    pub a: String,
    pub b: String,
}

impl VethPair {
    /// Create and bring up a veth pair with unique names
    pub fn create() -> Result<Self, String> {
        let count = PAIR_COUNTER.fetch_add(1, Ordering::SeqCst);
        // IFNAMSIZ leaves room for 15 characters
        let suffix = format!("{}{}", std::process::id() % 10000, count);
        let a = format!("iecA{}", suffix);
        let b = format!("iecB{}", suffix);

        run(&["link", "add", &a, "type", "veth", "peer", "name", &b])?;
        let pair = Self { a, b };
        for name in [&pair.a, &pair.b] {
            run(&["link", "set", name, "up"])?;
        }
        // Keep IPv6 autoconfiguration chatter off the link
        for name in [&pair.a, &pair.b] {
            let _ = sysctl(&format!("net.ipv6.conf.{}.disable_ipv6=1", name));
        }
        Ok(pair)
    }
}

impl Drop for VethPair {
    fn drop(&mut self) {
        let _ = run(&["link", "del", &self.a]);
    }
}

fn run(args: &[&str]) -> Result<Output, String> {
    let output = Command::new("sudo")
        .arg("ip")
        .args(args)
        .output()
        .map_err(|e| format!("Failed to run ip: {}", e))?;
    if !output.status.success() {
        return Err(format!(
            "ip {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr)
        ));
    }
    Ok(output)
}

fn sysctl(setting: &str) -> Result<Output, String> {
    Command::new("sudo")
        .args(["sysctl", "-w", setting])
        .output()
        .map_err(|e| format!("Failed to run sysctl: {}", e))
}
