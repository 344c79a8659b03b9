//! One-shot, deadline-bounded capability probe.
//!
//! Detecting the GPU driver means loading a native library and calling into
//! it, which can hang on broken vendor stacks. [`CapabilityProbe`] runs the
//! detection once per probe instance on a background thread and guarantees
//! that no caller waits longer than the configured timeout. Whatever
//! resolves first (the worker or the deadline) is the final answer.
//!
//! # State machine
//!
//! ```text
//! Unattempted ──first get()──▶ Probing{deadline} ──worker done──▶ Resolved(result)
//!                                     │
//!                                     └──deadline passed──▶ Resolved(timeout)
//! ```

pub mod vulkan;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

pub use vulkan::VulkanProvider;

// ---------------------------------------------------------------------------
// Provider seam
// ---------------------------------------------------------------------------

/// Static description of the probed GPU.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GpuProperties {
    pub device_name: String,
    pub vendor_id: u32,
    pub device_id: u32,
    /// Packed Vulkan version supported by the loader.
    pub instance_version: u32,
    /// Packed Vulkan version supported by the device.
    pub api_version: u32,
    /// Vendor-specific packed driver version.
    pub driver_version: u32,
    /// Whether live budget and usage per heap can be queried.
    pub has_memory_budget: bool,
}

impl GpuProperties {
    pub fn instance_version_string(&self) -> String {
        format_api_version(self.instance_version)
    }

    pub fn api_version_string(&self) -> String {
        format_api_version(self.api_version)
    }

    pub fn driver_version_string(&self) -> String {
        format!("0x{:08X}", self.driver_version)
    }
}

/// Formats a packed Vulkan version as `major.minor.patch`; empty for 0.
pub fn format_api_version(version: u32) -> String {
    if version == 0 {
        return String::new();
    }
    format!("{}.{}.{}", version >> 22, (version >> 12) & 0x3ff, version & 0xfff)
}

/// GPU memory split into device-local (dedicated) and host-visible (shared) heaps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GpuMemory {
    pub dedicated_total_bytes: i64,
    pub shared_total_bytes: i64,
    pub dedicated_budget_bytes: i64,
    pub dedicated_used_bytes: i64,
    pub shared_budget_bytes: i64,
    pub shared_used_bytes: i64,
    pub has_budget: bool,
}

/// Live memory query against an initialized backend.
pub trait GpuMemoryQuery: Send + Sync {
    fn memory(&self) -> Result<GpuMemory, ProbeError>;
}

/// A successfully initialized device.
pub struct ProbedDevice {
    pub properties: GpuProperties,
    pub memory: Option<Box<dyn GpuMemoryQuery>>,
}

/// Why a provider could not initialize its backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    /// No candidate library could be loaded.
    BackendNotFound(String),
    /// A required entry point could not be resolved.
    MissingEntryPoint(String),
    /// Instance creation returned an error code.
    InstanceCreation(i32),
    /// Enumeration succeeded but reported no device.
    NoDevices,
    /// Device enumeration returned an error code.
    Enumeration(i32),
    /// The probe could not run at all.
    Unavailable(String),
}

impl std::fmt::Display for ProbeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeError::BackendNotFound(detail) => write!(f, "backend not found: {}", detail),
            ProbeError::MissingEntryPoint(name) => write!(f, "missing entry point {}", name),
            ProbeError::InstanceCreation(code) => write!(f, "instance creation failed ({})", code),
            ProbeError::NoDevices => write!(f, "no devices"),
            ProbeError::Enumeration(code) => write!(f, "device enumeration failed ({})", code),
            ProbeError::Unavailable(reason) => write!(f, "probe unavailable: {}", reason),
        }
    }
}

impl std::error::Error for ProbeError {}

/// Something that can detect and initialize the optional capability.
///
/// Implementations may block for an arbitrary time; the probe bounds callers,
/// not the provider.
pub trait CapabilityProvider: Send + Sync + 'static {
    fn probe(&self) -> Result<ProbedDevice, ProbeError>;
}

// ---------------------------------------------------------------------------
// Result
// ---------------------------------------------------------------------------

/// Final outcome of a probe. Immutable once created.
pub struct CapabilityResult {
    pub attempted: bool,
    pub supported: bool,
    pub properties: Option<GpuProperties>,
    pub error: Option<String>,
    memory: Option<Box<dyn GpuMemoryQuery>>,
}

impl CapabilityResult {
    fn timeout() -> Self {
        Self::failure("timeout".to_string())
    }

    fn failure(reason: String) -> Self {
        Self {
            attempted: true,
            supported: false,
            properties: None,
            error: Some(reason),
            memory: None,
        }
    }

    fn from_outcome(outcome: Result<ProbedDevice, ProbeError>) -> Self {
        match outcome {
            Ok(device) => Self {
                attempted: true,
                supported: true,
                properties: Some(device.properties),
                error: None,
                memory: device.memory,
            },
            Err(e) => Self::failure(e.to_string()),
        }
    }

    /// Whether this result was produced by the deadline rather than the worker.
    pub fn timed_out(&self) -> bool {
        self.error.as_deref() == Some("timeout")
    }

    /// Queries live GPU memory. `None` when the capability is unsupported
    /// or the backend cannot report memory.
    pub fn memory(&self) -> Option<Result<GpuMemory, ProbeError>> {
        self.memory.as_ref().map(|q| q.memory())
    }
}

impl std::fmt::Debug for CapabilityResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityResult")
            .field("attempted", &self.attempted)
            .field("supported", &self.supported)
            .field("properties", &self.properties)
            .field("error", &self.error)
            .field("memory", &self.memory.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Probe
// ---------------------------------------------------------------------------

enum ProbeState {
    Unattempted,
    Probing { deadline: Instant },
    Resolved(Arc<CapabilityResult>),
}

struct Shared {
    state: Mutex<ProbeState>,
    resolved: Condvar,
}

/// Runs a [`CapabilityProvider`] at most once, bounded by a timeout.
pub struct CapabilityProbe {
    provider: Arc<dyn CapabilityProvider>,
    timeout: Duration,
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
    abandoned: AtomicBool,
}

impl CapabilityProbe {
    pub fn new(provider: Arc<dyn CapabilityProvider>, timeout: Duration) -> Self {
        Self {
            provider,
            timeout,
            shared: Arc::new(Shared {
                state: Mutex::new(ProbeState::Unattempted),
                resolved: Condvar::new(),
            }),
            worker: Mutex::new(None),
            abandoned: AtomicBool::new(false),
        }
    }

    /// Returns the probe result, starting the probe on first use.
    ///
    /// Blocks at most until the probe's deadline. Safe to call from any
    /// number of threads; all of them observe the same `Arc`.
    pub fn get(&self) -> Arc<CapabilityResult> {
        // The state lock is held for every transition; the condvar releases
        // it while waiting for the worker.
        let mut state = self.shared.state.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            match &*state {
                ProbeState::Resolved(result) => return Arc::clone(result),
                ProbeState::Unattempted => {
                    let deadline = Instant::now() + self.timeout;
                    *state = ProbeState::Probing { deadline };
                    if let Err(e) = self.spawn_worker() {
                        warn!(error = %e, "failed to spawn capability probe worker");
                        let result = Arc::new(CapabilityResult::failure(
                            ProbeError::Unavailable(e.to_string()).to_string(),
                        ));
                        *state = ProbeState::Resolved(Arc::clone(&result));
                        self.shared.resolved.notify_all();
                        return result;
                    }
                }
                ProbeState::Probing { deadline } => {
                    let now = Instant::now();
                    if now >= *deadline {
                        warn!(
                            timeout_ms = self.timeout.as_millis() as u64,
                            "capability probe timed out, abandoning worker"
                        );
                        self.abandoned.store(true, Ordering::SeqCst);
                        let result = Arc::new(CapabilityResult::timeout());
                        *state = ProbeState::Resolved(Arc::clone(&result));
                        self.shared.resolved.notify_all();
                        return result;
                    }
                    let wait = *deadline - now;
                    state = self
                        .shared
                        .resolved
                        .wait_timeout(state, wait)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                }
            }
        }
    }

    /// Returns the result if the probe has already resolved, without starting it.
    pub fn peek(&self) -> Option<Arc<CapabilityResult>> {
        match &*self.shared.state.lock().unwrap_or_else(PoisonError::into_inner) {
            ProbeState::Resolved(result) => Some(Arc::clone(result)),
            _ => None,
        }
    }

    /// True when the deadline passed while the worker was still running.
    pub fn worker_abandoned(&self) -> bool {
        self.abandoned.load(Ordering::SeqCst)
    }

    /// True once the worker thread has exited. False if it never started.
    pub fn worker_finished(&self) -> bool {
        self.worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|h| h.is_finished())
    }

    fn spawn_worker(&self) -> std::io::Result<()> {
        let provider = Arc::clone(&self.provider);
        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("capability-probe".to_string())
            .spawn(move || {
                let started = Instant::now();
                let outcome = provider.probe();
                let elapsed_ms = started.elapsed().as_millis() as u64;

                let mut state = shared.state.lock().unwrap_or_else(PoisonError::into_inner);
                match &*state {
                    ProbeState::Probing { .. } => {
                        let result = CapabilityResult::from_outcome(outcome);
                        match &result.error {
                            None => info!(elapsed_ms, "capability probe succeeded"),
                            Some(e) => info!(elapsed_ms, error = %e, "capability probe failed"),
                        }
                        *state = ProbeState::Resolved(Arc::new(result));
                        shared.resolved.notify_all();
                    }
                    _ => debug!(elapsed_ms, "discarding capability probe result after timeout"),
                }
            })?;
        *self.worker.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Canned provider
// ---------------------------------------------------------------------------

struct StaticMemory(GpuMemory);

impl GpuMemoryQuery for StaticMemory {
    fn memory(&self) -> Result<GpuMemory, ProbeError> {
        Ok(self.0)
    }
}

/// Provider returning a fixed outcome, optionally after a delay.
///
/// Used by tests and by callers that want the GPU probe disabled.
pub struct StaticProvider {
    outcome: Result<(GpuProperties, Option<GpuMemory>), ProbeError>,
    delay: Duration,
    calls: AtomicUsize,
}

impl StaticProvider {
    pub fn supported(properties: GpuProperties, memory: Option<GpuMemory>) -> Self {
        Self {
            outcome: Ok((properties, memory)),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(error: ProbeError) -> Self {
        Self {
            outcome: Err(error),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    /// Delays every probe by `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of times `probe` has been entered.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CapabilityProvider for StaticProvider {
    fn probe(&self) -> Result<ProbedDevice, ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        let (properties, memory) = self.outcome.clone()?;
        Ok(ProbedDevice {
            properties,
            memory: memory.map(|m| Box::new(StaticMemory(m)) as Box<dyn GpuMemoryQuery>),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adreno() -> GpuProperties {
        GpuProperties {
            device_name: "Adreno (TM) 740".to_string(),
            vendor_id: 0x5143,
            device_id: 0x43050a01,
            instance_version: (1 << 22) | (3 << 12) | 239,
            api_version: (1 << 22) | (3 << 12) | 128,
            driver_version: 0x8029_0000,
            has_memory_budget: true,
        }
    }

    #[test]
    fn test_version_formatting() {
        let props = adreno();
        assert_eq!(props.instance_version_string(), "1.3.239");
        assert_eq!(props.api_version_string(), "1.3.128");
        assert_eq!(props.driver_version_string(), "0x80290000");
        assert_eq!(format_api_version(0), "");
        assert_eq!(
            GpuProperties {
                driver_version: 0x1f,
                ..Default::default()
            }
            .driver_version_string(),
            "0x0000001F"
        );
    }

    #[test]
    fn test_successful_probe_is_cached() {
        let memory = GpuMemory {
            shared_total_bytes: 8 << 30,
            ..Default::default()
        };
        let provider = Arc::new(StaticProvider::supported(adreno(), Some(memory)));
        let probe = CapabilityProbe::new(provider.clone(), Duration::from_secs(5));
        assert!(probe.peek().is_none());

        let first = probe.get();
        assert!(first.attempted);
        assert!(first.supported);
        assert_eq!(first.error, None);
        assert_eq!(first.properties.as_ref().unwrap().device_name, "Adreno (TM) 740");
        assert_eq!(first.memory().unwrap().unwrap(), memory);

        let second = probe.get();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(provider.calls(), 1);
        assert!(!probe.worker_abandoned());
    }

    #[test]
    fn test_failure_is_cached_without_retry() {
        let provider = Arc::new(StaticProvider::failing(ProbeError::NoDevices));
        let probe = CapabilityProbe::new(provider.clone(), Duration::from_secs(5));

        let result = probe.get();
        assert!(result.attempted);
        assert!(!result.supported);
        assert_eq!(result.error.as_deref(), Some("no devices"));
        assert!(result.memory().is_none());
        assert!(!result.timed_out());

        probe.get();
        probe.get();
        assert_eq!(provider.calls(), 1);
    }

    #[test]
    fn test_concurrent_callers_share_one_timeout() {
        let provider = Arc::new(StaticProvider::supported(adreno(), None).with_delay(Duration::from_millis(600)));
        let probe = Arc::new(CapabilityProbe::new(provider.clone(), Duration::from_millis(100)));

        let started = Instant::now();
        let handles: Vec<_> = (0..100)
            .map(|_| {
                let probe = Arc::clone(&probe);
                thread::spawn(move || probe.get())
            })
            .collect();
        let results: Vec<Arc<CapabilityResult>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        // Nobody waited for the slow backend
        assert!(started.elapsed() < Duration::from_millis(550));
        for result in &results {
            assert!(Arc::ptr_eq(result, &results[0]));
        }
        assert!(results[0].timed_out());
        assert!(results[0].attempted);
        assert!(!results[0].supported);
        assert!(probe.worker_abandoned());

        // Let the backend finish; its late answer must be discarded
        let deadline = Instant::now() + Duration::from_secs(5);
        while !probe.worker_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(20));
        }
        assert!(probe.worker_finished());
        let later = probe.get();
        assert!(Arc::ptr_eq(&later, &results[0]));
        assert_eq!(later.error.as_deref(), Some("timeout"));
        assert_eq!(provider.calls(), 1);
    }

    #[test]
    fn test_late_caller_waits_only_until_shared_deadline() {
        let provider = Arc::new(StaticProvider::failing(ProbeError::NoDevices).with_delay(Duration::from_millis(1000)));
        let probe = Arc::new(CapabilityProbe::new(provider, Duration::from_millis(400)));

        let first = {
            let probe = Arc::clone(&probe);
            thread::spawn(move || probe.get())
        };
        thread::sleep(Duration::from_millis(200));
        let started = Instant::now();
        let late = probe.get();
        assert!(started.elapsed() < Duration::from_millis(390));
        assert!(late.timed_out());
        assert!(Arc::ptr_eq(&late, &first.join().unwrap()));
    }
}
