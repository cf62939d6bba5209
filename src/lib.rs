pub mod cli;
pub mod config;
pub mod constants;
pub mod device;
pub mod drivers;
pub mod session;
pub mod sync;
