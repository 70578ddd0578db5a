pub mod channels;
pub mod completions;
pub mod config;
pub mod log;
pub mod pending;
