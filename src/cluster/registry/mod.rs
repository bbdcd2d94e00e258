//! Node Registry Module
//!
//! Join-ordered ledger of active simulated nodes and the membership events
//! it fans out to them.

pub mod node_registry;
pub mod events;

pub use node_registry::*;
pub use events::*;
