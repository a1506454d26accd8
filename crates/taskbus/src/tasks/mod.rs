//! Task bodies for the simulated device: one continuous, one one-shot.

pub mod blinker;
pub mod worker;
