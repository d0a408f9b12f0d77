//! Storage infrastructure: the daemon's configuration file.
//!
//! The `config` sub-module reads the TOML file from the platform config
//! directory (or an explicit `--config` path), fills in defaults for anything
//! missing, and validates the operator's alias mappings up front so a typo
//! stops the daemon at startup instead of silently renaming a device.

pub mod config;
