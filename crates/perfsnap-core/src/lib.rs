//! perfsnap-core: delta sampling and sensor arbitration for device metrics.
//!
//! Provides:
//! - `collector`: filesystem and clock abstractions, `/proc` and `/sys` readers
//! - `history`: last counter sample per stream
//! - `rates`: clamped deltas, per-second rates, busy shares
//! - `arbitration`: picks one temperature out of many sensors
//! - `probe`: one-shot, deadline-bounded GPU capability probe (Vulkan)
//! - `snapshot`: `MetricsContext`, the per-domain record assembler

pub mod arbitration;
pub mod collector;
pub mod config;
pub mod error;
pub mod history;
pub mod probe;
pub mod rates;
pub mod snapshot;

pub use config::SamplerConfig;
pub use error::SampleError;
pub use snapshot::MetricsContext;
