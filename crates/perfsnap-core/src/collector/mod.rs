//! Raw counter access for the sampling engine.
//!
//! Everything the engine knows about the machine arrives through the
//! [`FileSystem`] trait, and every timestamp through the [`Clock`] trait.
//! Parsers are pure functions over file contents; the `sysfs` helpers walk
//! `/sys` directories to discover CPUs, sensors, GPUs and interfaces.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                     MetricsContext                     │
//! │  ┌──────────────────┐      ┌────────────────────────┐  │
//! │  │  procfs::parser  │      │        sysfs           │  │
//! │  │  - /proc/stat    │      │  - cpu topology/freq   │  │
//! │  │  - /proc/meminfo │      │  - thermal zones/hwmon │  │
//! │  │  - /proc/net/dev │      │  - kgsl, net state     │  │
//! │  └────────┬─────────┘      └───────────┬────────────┘  │
//! │           └──────────────┬─────────────┘               │
//! │                   ┌──────▼──────┐    ┌─────────┐       │
//! │                   │  FileSystem │    │  Clock  │       │
//! │                   └──────┬──────┘    └────┬────┘       │
//! └──────────────────────────┼────────────────┼────────────┘
//!              ┌─────────────┴──┐       ┌─────┴──────────┐
//!       ┌──────▼──────┐ ┌──────▼──────┐ │ MonotonicClock │
//!       │   RealFs    │ │   MockFs    │ │  ManualClock   │
//!       └─────────────┘ └─────────────┘ └────────────────┘
//! ```
//!
//! # Testing
//!
//! ```
//! use perfsnap_core::collector::{FileSystem, MockFs};
//! use std::path::Path;
//!
//! let fs = MockFs::typical_device();
//! assert_eq!(fs.read_int(Path::new("/sys/class/thermal/thermal_zone0/temp")), Some(42000));
//! ```

pub mod clock;
pub mod mock;
pub mod procfs;
pub mod sysfs;
pub mod traits;

pub use clock::{Clock, MonotonicClock};
pub use mock::{ManualClock, MockFs};
pub use procfs::ParseError;
pub use traits::{FileSystem, FsUsage, RealFs};
