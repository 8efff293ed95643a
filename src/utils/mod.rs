//! Utility functions and helpers.

pub mod french;
pub mod http;
