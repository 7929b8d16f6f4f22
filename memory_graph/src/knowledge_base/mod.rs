//! Knowledge Base module - the canonical graph derived from the memory log.
//!
//! The knowledge graph consists of:
//! - **Memory nodes**: one per memory in the log
//! - **Entity nodes**: people, places and events, deduplicated by normalized value
//! - **Implicit edges**: memory -> entity `contains` edges, regenerated from mentions
//! - **Explicit edges**: asserted relations, stored separately and passed through

mod edge;
mod explicit;
mod graph;
mod node;
mod sync;

pub use edge::*;
pub use explicit::*;
pub use graph::*;
pub use node::*;
pub use sync::*;
