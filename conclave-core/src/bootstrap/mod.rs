//! Bootstrap module for initializing the Conclave server
//!
//! This module handles configuration discovery and loading. Logging is
//! initialized afterwards from the loaded configuration.

pub mod config;

pub use self::config::load_config;
