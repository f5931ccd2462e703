//! Glucose rules engine: risk bands, insights, aggregation and export.
//!
//! Everything in here is synchronous and pure. Callers hand in a borrowed
//! snapshot of readings and get derived values back; nothing is stored.

pub mod export;
pub mod insights;
pub mod risk;
pub mod stats;
mod types;

pub use types::{GlucoseError, NewReading, Reading, ReadingType};
