//! Pipeline entry points for harvesting.
//!
//! - `Harvester::run`: Harvest one source into a sink
//! - `Harvester::run_all`: Harvest several sources in turn

pub mod harvest;

pub use harvest::{Harvester, format_percent};
