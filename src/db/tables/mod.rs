//! Database model modules - extends Database with domain-specific methods
//!
//! Each module adds `impl Database` blocks with methods for a specific table group.

pub mod agents;       // agents (identity, reputation, availability, card fields)
pub mod capabilities; // capabilities (per-agent capability set)
