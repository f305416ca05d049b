//! Utility functions and helpers.

pub mod http;
pub mod log;
pub mod set_spec;

pub use set_spec::SetSpecMatcher;
