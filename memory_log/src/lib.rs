//! # Memory Log
//!
//! The source of truth for personal memories. This crate owns the memory
//! records, the sanitizing ingestion boundary for extractor output, and the
//! settings shared by the rest of the system. It holds no derived state.

pub mod error;
pub mod log;
pub mod memory;
pub mod settings;

pub use error::*;
pub use log::*;
pub use memory::*;
pub use settings::*;
