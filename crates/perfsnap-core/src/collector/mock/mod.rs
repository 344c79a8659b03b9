//! Test doubles for the raw counter source and the clock.

mod clock;
mod filesystem;
mod scenarios;

pub use clock::ManualClock;
pub use filesystem::MockFs;
