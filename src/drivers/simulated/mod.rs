pub mod driver;
pub mod motion;

#[cfg(test)]
mod driver_test;

pub use driver::SimulatedDevice;
