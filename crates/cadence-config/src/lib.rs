//! Configuration management for the cadence system.
//!
//! This crate handles loading and saving `.cadence/config.yaml` files,
//! layering environment overrides on top, and discovering `.cadence/`
//! directories in the filesystem.

pub mod config;
pub mod data_dir;

pub use config::{CadenceConfig, ConfigError, StorageBackend};
