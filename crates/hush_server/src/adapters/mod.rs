#![forbid(unsafe_code)]

pub mod console;
pub mod sim;

pub use sim::SimulatedPlatform;
