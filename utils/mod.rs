//! Utility functions
//!
//! Kernel logging backend for the `log` facade.

pub mod log;
