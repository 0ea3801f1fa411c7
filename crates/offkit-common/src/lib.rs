//! # OffKit Common
//!
//! Shared logging configuration for the OffKit offline caching toolkit.

pub mod logging;

pub use logging::{init_logging, LogConfig, LogFormat};
