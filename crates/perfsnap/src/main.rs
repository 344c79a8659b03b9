//! perfsnap - device performance snapshot sampler.
//!
//! Polls CPU, memory, disk, network and GPU metrics at a fixed interval and
//! prints one JSON object per record to stdout. Diagnostics go to stderr.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;
#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use clap::{Parser, ValueEnum};
use serde::Serialize;
use tracing::level_filters::LevelFilter;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use perfsnap_core::collector::{Clock, FileSystem, MonotonicClock, RealFs};
use perfsnap_core::probe::{CapabilityProvider, ProbeError, StaticProvider, VulkanProvider};
use perfsnap_core::{MetricsContext, SamplerConfig};

/// Device performance snapshot sampler.
#[derive(Parser)]
#[command(name = "perfsnap", about = "Device performance snapshot sampler", version)]
struct Args {
    /// Sampling interval in milliseconds.
    #[arg(short, long, default_value = "1000", env = "PERFSNAP_INTERVAL_MS")]
    interval_ms: u64,

    /// Number of samples to take. Runs until interrupted when omitted.
    #[arg(short = 'n', long)]
    count: Option<u64>,

    /// Which record to emit each interval.
    #[arg(short, long, value_enum, default_value = "mini")]
    domain: Domain,

    /// Mount point whose filesystem and block device are reported.
    #[arg(long, default_value = "/", env = "PERFSNAP_MOUNT_POINT")]
    mount_point: PathBuf,

    /// Path to /proc filesystem (for testing/mocking).
    #[arg(long, default_value = "/proc")]
    proc_path: PathBuf,

    /// Path to /sys filesystem (for testing/mocking).
    #[arg(long, default_value = "/sys")]
    sys_path: PathBuf,

    /// Longest wait for the GPU capability probe, in milliseconds.
    #[arg(long, default_value = "2000", env = "PERFSNAP_PROBE_TIMEOUT_MS")]
    probe_timeout_ms: u64,

    /// Never load the Vulkan loader; GPU records report the probe as disabled.
    #[arg(long)]
    no_gpu_probe: bool,

    /// Pretty-print JSON instead of one object per line.
    #[arg(long)]
    pretty: bool,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is warn level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Domain {
    Cpu,
    Memory,
    Disk,
    Net,
    Gpu,
    Vulkan,
    Mini,
    /// cpu, memory, disk, net and gpu records.
    All,
}

impl Domain {
    fn name(self) -> &'static str {
        match self {
            Domain::Cpu => "cpu",
            Domain::Memory => "memory",
            Domain::Disk => "disk",
            Domain::Net => "net",
            Domain::Gpu => "gpu",
            Domain::Vulkan => "vulkan",
            Domain::Mini => "mini",
            Domain::All => "all",
        }
    }

    fn expand(self) -> &'static [Domain] {
        match self {
            Domain::Cpu => &[Domain::Cpu],
            Domain::Memory => &[Domain::Memory],
            Domain::Disk => &[Domain::Disk],
            Domain::Net => &[Domain::Net],
            Domain::Gpu => &[Domain::Gpu],
            Domain::Vulkan => &[Domain::Vulkan],
            Domain::Mini => &[Domain::Mini],
            Domain::All => &[Domain::Cpu, Domain::Memory, Domain::Disk, Domain::Net, Domain::Gpu],
        }
    }
}

/// One emitted line: a record stamped with wall-clock time.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Emitted<T: Serialize> {
    collected_at: String,
    domain: &'static str,
    sample: u64,
    record: T,
}

/// Initializes the tracing subscriber on stderr.
/// Default level is WARN so stdout stays clean JSON. Use -q for errors only.
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn emit<T: Serialize>(out: &mut impl Write, domain: Domain, sample: u64, record: T, pretty: bool) {
    let line = Emitted {
        collected_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        domain: domain.name(),
        sample,
        record,
    };
    let encoded = if pretty {
        serde_json::to_string_pretty(&line)
    } else {
        serde_json::to_string(&line)
    };
    match encoded {
        Ok(json) => {
            if let Err(e) = writeln!(out, "{}", json) {
                error!("Failed to write {} record: {}", domain.name(), e);
            }
        }
        Err(e) => error!("Failed to encode {} record: {}", domain.name(), e),
    }
}

fn collect<F: FileSystem, C: Clock>(
    ctx: &MetricsContext<F, C>,
    out: &mut impl Write,
    domain: Domain,
    sample: u64,
    pretty: bool,
) {
    for &d in domain.expand() {
        match d {
            Domain::Cpu => emit(out, d, sample, ctx.cpu_snapshot(), pretty),
            Domain::Memory => emit(out, d, sample, ctx.memory_snapshot(), pretty),
            Domain::Disk => emit(out, d, sample, ctx.disk_snapshot(), pretty),
            Domain::Net => emit(out, d, sample, ctx.net_snapshot(), pretty),
            Domain::Gpu => emit(out, d, sample, ctx.gpu_snapshot(), pretty),
            Domain::Vulkan => emit(out, d, sample, ctx.vulkan_info(), pretty),
            Domain::Mini => emit(out, d, sample, ctx.mini_snapshot(), pretty),
            Domain::All => {}
        }
    }
    if let Err(e) = out.flush() {
        warn!("Failed to flush stdout: {}", e);
    }
}

fn main() {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet);

    info!("perfsnap {} starting", env!("CARGO_PKG_VERSION"));
    info!(
        "Config: interval={}ms, domain={}, mount={}, proc={}, sys={}",
        args.interval_ms,
        args.domain.name(),
        args.mount_point.display(),
        args.proc_path.display(),
        args.sys_path.display()
    );

    let config = SamplerConfig {
        proc_root: args.proc_path.clone(),
        sys_root: args.sys_path.clone(),
        mount_point: args.mount_point.clone(),
        probe_timeout: Duration::from_millis(args.probe_timeout_ms),
        ..SamplerConfig::default()
    };

    let provider: Arc<dyn CapabilityProvider> = if args.no_gpu_probe {
        debug!("GPU capability probe: disabled");
        Arc::new(StaticProvider::failing(ProbeError::Unavailable("disabled".to_string())))
    } else {
        Arc::new(VulkanProvider::new())
    };
    let ctx = MetricsContext::new(RealFs::new(), MonotonicClock::new(), config, provider);

    // Setup graceful shutdown
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    }) {
        warn!("Failed to set Ctrl-C handler: {}", e);
    }

    let interval = Duration::from_millis(args.interval_ms);
    let stdout = std::io::stdout();
    let mut sample: u64 = 0;

    while running.load(Ordering::SeqCst) {
        sample += 1;
        collect(&ctx, &mut stdout.lock(), args.domain, sample, args.pretty);

        if args.count.is_some_and(|count| sample >= count) {
            break;
        }

        // Sleep with periodic checks for shutdown signal
        let sleep_interval = Duration::from_millis(100);
        let mut remaining = interval;
        while remaining > Duration::ZERO && running.load(Ordering::SeqCst) {
            let sleep_time = remaining.min(sleep_interval);
            std::thread::sleep(sleep_time);
            remaining = remaining.saturating_sub(sleep_time);
        }
    }

    if ctx.probe().worker_abandoned() && !ctx.probe().worker_finished() {
        warn!("GPU capability probe still running at exit");
    }
    info!("Shutting down after {} samples", sample);
}
