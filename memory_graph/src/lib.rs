//! # Memory Graph
//!
//! The derived side of the memory system. Everything here can be recomputed
//! from the `memory_log` crate's records plus the explicit edges.
//!
//! ## Core Components
//!
//! - **knowledge_base**: Entity normalization, the canonical graph, its
//!   builder and incremental synchronizer, and the explicit edge store
//! - **view**: Node-type and time filters projecting the graph into a view
//! - **analytics**: Statistics, trends and insights
//! - **service**: `MemoryGraphService`, which owns the state and keeps the
//!   graph in step with the log
//!
//! ## Invariants
//!
//! - The incrementally synchronized graph always equals a full rebuild
//! - Entity nodes without incident edges never survive a mutation
//! - Views and analytics never modify the canonical graph

pub mod analytics;
pub mod error;
pub mod knowledge_base;
pub mod service;
pub mod view;

pub use analytics::*;
pub use error::*;
pub use knowledge_base::*;
pub use service::*;
pub use view::*;
