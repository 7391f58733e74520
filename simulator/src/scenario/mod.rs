pub mod config;
pub mod deploy;
