//! Core domain logic for notefold.
//! Hierarchical containers, inheritable access lists and cascading deletes.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use auth::{AuthError, IdentityProvider, StaticIdentityProvider};
pub use config::{load_config, ConfigLoadError, CoreConfig};
pub use db::{open_db, open_db_in_memory, DbError};
pub use error::ErrorKind;
pub use gateway::{CoreGateway, GatewayError, GatewayResult};
pub use logging::{default_log_level, init_logging, init_logging_from_config, logging_status};
pub use model::container::{
    AccessEntry, AccessFilter, ChildKind, Container, ContainerId, ContainerMeta, Visibility,
};
pub use model::group::NamedGroup;
pub use model::identity::VerifiedIdentity;
pub use model::note::{NoteId, NoteRecord};
pub use repo::{RepoError, RepoResult};
pub use service::access::{GrantRequest, GrantScope};
pub use service::container_service::{
    ContainerService, ContainerServiceError, DeleteOutcome, GrantOutcome, ParentRef,
    RecoveryOutcome,
};
pub use service::group_service::{GroupService, GroupServiceError};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
