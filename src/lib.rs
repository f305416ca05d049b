// src/lib.rs

//! Metadata harvester library

pub mod error;
pub mod models;
pub mod pipeline;
pub mod pmh;
pub mod services;
pub mod utils;
