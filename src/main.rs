use clap::{Parser, Subcommand};
use iecloop::buffer::FramePool;
use iecloop::capture::{bring_up, AfPacketPort, MemoryPort, Port, PortConf};
use iecloop::config::{self, Config, PortConfig};
use iecloop::dataplane::{EngineSettings, Mode, MonotonicClock, RedirectEngine};
use iecloop::protocol::{EtherType, FrameBuilder, MacAddr};
use iecloop::runtime::Runtime;
use iecloop::telemetry::{init_logging, MetricsRegistry};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(name = "iecloop")]
#[command(about = "Cyclic SV/GOOSE frame redirector")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the polling loop on real interfaces
    Run(RunArgs),
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Push synthetic traffic through in-memory ports and check the result
    Selftest {
        /// Frames injected per port
        #[arg(long, default_value_t = 1000)]
        frames: usize,

        #[arg(long, value_enum, default_value_t = Mode::Forwarding)]
        mode: Mode,
    },
}

#[derive(clap::Args)]
struct RunArgs {
    /// Path to config.toml
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    #[arg(long, value_enum)]
    mode: Option<Mode>,

    /// Interface to poll, repeatable; replaces the configured ports
    #[arg(long = "port")]
    ports: Vec<String>,

    #[arg(long)]
    period_us: Option<u64>,

    #[arg(long)]
    burst: Option<usize>,

    /// Core to pin the polling thread to
    #[arg(long)]
    core: Option<usize>,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Validate config.toml
    Validate {
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
    },
    /// Print config.toml with every default filled in
    Show {
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run(args) => cmd_run(args),
        Commands::Config { action } => match action {
            ConfigAction::Validate { config } => cmd_config_validate(&config),
            ConfigAction::Show { config } => cmd_config_show(&config),
        },
        Commands::Selftest { frames, mode } => cmd_selftest(frames, mode),
    };

    if let Err(e) = result {
        eprintln!("[ERROR] {}", e);
        std::process::exit(1);
    }
}

fn load_config(path: &Path) -> Result<Config, String> {
    config::load(path).map_err(|e| format!("Failed to load {}: {}", path.display(), e))
}

fn cmd_run(args: RunArgs) -> Result<(), String> {
    // The file may be skipped when the ports come from the command line
    let mut cfg = if args.config.exists() || args.ports.is_empty() {
        load_config(&args.config)?
    } else {
        Config::default()
    };

    if let Some(mode) = args.mode {
        cfg.mode = mode;
    }
    if !args.ports.is_empty() {
        cfg.ports = args.ports.iter().map(PortConfig::new).collect();
    }
    if let Some(period_us) = args.period_us {
        cfg.cycle.period_us = period_us;
    }
    if let Some(burst) = args.burst {
        cfg.cycle.burst_size = burst;
    }
    if let Some(core) = args.core {
        cfg.runtime.cores = vec![core];
    }

    init_logging(Some(&cfg.logging));

    let validation = config::validate(&cfg);
    validation.print_diagnostics();
    if validation.has_errors() {
        return Err("Configuration has errors".to_string());
    }

    let runtime = Runtime::init(&cfg.runtime).map_err(|e| e.to_string())?;

    let pool = FramePool::new(cfg.pool.capacity, cfg.pool.buffer_size)
        .map_err(|e| format!("Cannot create frame pool: {}", e))?;
    info!(
        "Frame pool: {} buffers of {} bytes",
        pool.capacity(),
        pool.buffer_size()
    );

    let mut ports = Vec::with_capacity(cfg.ports.len());
    for (index, port_cfg) in cfg.ports.iter().enumerate() {
        let id = u16::try_from(index).map_err(|_| "Too many ports".to_string())?;
        let mut port = AfPacketPort::open(&port_cfg.name, id, pool.clone()).map_err(|e| {
            format!(
                "Cannot init port {} ({}): {}. Run with root privileges.",
                id, port_cfg.name, e
            )
        })?;
        bring_up(&mut port, &port_cfg.port_conf())
            .map_err(|e| format!("Cannot init port {} ({}): {}", id, port_cfg.name, e))?;
        ports.push(port);
    }

    let metrics = Arc::new(MetricsRegistry::new());
    let mut engine = RedirectEngine::new(
        ports,
        cfg.engine_settings(),
        MonotonicClock,
        metrics.clone(),
    )
    .map_err(|e| e.to_string())?;
    engine.check_locality(runtime.socket_id());

    info!("Core {:?} forwarding packets. [Ctrl+C to quit]", runtime.polling_core());
    let summary = engine.run(runtime.stop_token());

    info!(
        "Stopped after {} cycles ({} overruns): received={} redirected={} rejected={} ignored={} malformed={}",
        summary.cycles,
        summary.overruns,
        summary.frames.received,
        summary.frames.redirected,
        summary.frames.rejected,
        summary.frames.ignored,
        summary.frames.malformed
    );
    info!("stats: {}", metrics.summary());

    drop(engine);
    runtime.cleanup();
    Ok(())
}

fn cmd_config_validate(config_path: &Path) -> Result<(), String> {
    let cfg = load_config(config_path)?;
    let result = config::validate(&cfg);
    result.print_diagnostics();

    if result.has_errors() {
        return Err("Configuration has errors".to_string());
    }

    println!(
        "Configuration is valid: {} port(s), mode={}",
        cfg.ports.len(),
        cfg.mode
    );
    Ok(())
}

fn cmd_config_show(config_path: &Path) -> Result<(), String> {
    let cfg = load_config(config_path)?;
    let text = config::to_toml(&cfg).map_err(|e| e.to_string())?;
    print!("{}", text);
    Ok(())
}

/// Synthetic traffic mix: SV, GOOSE, ARP and a runt, in rotation
fn synthetic_frame(seq: usize, src: MacAddr) -> Vec<u8> {
    let dst = MacAddr([0x01, 0x0c, 0xcd, 0x04, 0x00, 0x01]);
    let appid = (seq as u8, (seq >> 8) as u8);
    match seq % 4 {
        0 => FrameBuilder::new()
            .dst_mac(dst)
            .src_mac(src)
            .ethertype(EtherType::SampledValues as u16)
            .appid(appid.0, appid.1)
            .payload(&[0u8; 96])
            .build(),
        1 => FrameBuilder::new()
            .dst_mac(dst)
            .src_mac(src)
            .ethertype(EtherType::Goose as u16)
            .appid(appid.0, appid.1)
            .payload(&[0u8; 64])
            .build(),
        2 => FrameBuilder::new()
            .dst_mac(MacAddr::BROADCAST)
            .src_mac(src)
            .ethertype(EtherType::Arp as u16)
            .payload(&[0u8; 28])
            .build(),
        _ => vec![0xee; 13],
    }
}

fn cmd_selftest(frames: usize, mode: Mode) -> Result<(), String> {
    init_logging(None);

    const PORTS: u16 = 2;
    let settings = EngineSettings {
        mode,
        period: Duration::from_micros(100),
        ..EngineSettings::default()
    };
    let pool_capacity = (frames * PORTS as usize).max(settings.burst_size);
    let pool = FramePool::new(pool_capacity, 2048).map_err(|e| e.to_string())?;

    let mut ports = Vec::new();
    for id in 0..PORTS {
        let mut port = MemoryPort::new(id, format!("mem{}", id), pool.clone());
        bring_up(&mut port, &PortConf::default()).map_err(|e| e.to_string())?;
        for seq in 0..frames {
            port.inject(&synthetic_frame(seq, port.mac_addr()))
                .map_err(|e| e.to_string())?;
        }
        ports.push(port);
    }

    let metrics = Arc::new(MetricsRegistry::new());
    let mut engine = RedirectEngine::new(ports, settings, MonotonicClock, metrics.clone())
        .map_err(|e| e.to_string())?;

    let mut sent = vec![0usize; PORTS as usize];
    let mut cycles = 0u64;
    while engine.ports().iter().any(|p| p.rx_pending() > 0) {
        engine.run_cycles(1);
        cycles += 1;
        for (index, port) in engine.ports_mut().iter_mut().enumerate() {
            sent[index] += port.complete_tx().len();
        }
    }

    let expected_per_port = (frames + 3) / 4 + (frames + 2) / 4;
    let snapshot = pool.snapshot();
    println!("selftest: mode={} cycles={}", mode, cycles);
    for (index, count) in sent.iter().enumerate() {
        println!("  mem{}: transmitted {} frame(s)", index, count);
    }
    println!("  {}", metrics.summary());
    println!(
        "  pool: leased={} released={} reclaimed={} outstanding={}",
        snapshot.leased,
        snapshot.released,
        snapshot.reclaimed,
        snapshot.outstanding()
    );

    if snapshot.outstanding() != 0 || snapshot.reclaimed != 0 {
        return Err("Frame leases were not all returned".to_string());
    }
    if sent.iter().any(|&count| count != expected_per_port) {
        return Err(format!(
            "Expected {} redirected frame(s) per port",
            expected_per_port
        ));
    }
    println!("selftest: OK");
    Ok(())
}
