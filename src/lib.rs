pub mod climate;
pub mod config;
pub mod driver;
pub mod emulator;
pub mod follow_me;
pub mod interpreter;
pub mod protocol;
pub mod runner;
pub mod telemetry;
