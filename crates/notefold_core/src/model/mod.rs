//! Domain model for the container tree, notes and access groups.
//!
//! # Responsibility
//! - Define canonical data structures used by repositories and services.
//! - Own identifier derivation and materialized path construction.
//!
//! # Invariants
//! - Container ids are content-derived, opaque and immutable.
//! - A container path never changes once assigned.
//! - Inherited access entries are a by-value snapshot of the parent.

pub mod container;
pub mod group;
pub mod identity;
pub mod note;
pub mod path;
