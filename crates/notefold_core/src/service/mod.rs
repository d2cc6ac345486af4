//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into container/group use cases.
//! - Run every authorization and not-found check before any mutation.

pub mod access;
pub mod container_service;
pub mod group_service;
