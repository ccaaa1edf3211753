pub mod config;
pub mod update;
