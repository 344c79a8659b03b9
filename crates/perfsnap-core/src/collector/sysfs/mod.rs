//! `/sys` discovery helpers.
//!
//! Every function takes the sysfs root explicitly so tests and the CLI can
//! point the sampler at a different tree.

pub mod cpu;
pub mod kgsl;
pub mod net;
pub mod thermal;
