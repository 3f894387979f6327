//! # relay-store
//!
//! Durable registration table backed by `SQLite`.
//!
//! - **[`connection`]**: `r2d2` pool with WAL mode and busy-timeout pragmas
//!   applied to every connection.
//! - **[`migrations`]**: version-tracked schema, embedded at compile time and
//!   applied transactionally.
//! - **[`repository`]**: stateless SQL; every method takes `&Connection`.
//! - **[`store`]**: the [`RegistrationStore`] trait the runtime depends on,
//!   and its pooled `SQLite` implementation.

#![deny(unsafe_code)]

pub mod connection;
pub mod errors;
pub mod migrations;
pub mod repository;
pub mod store;

pub use connection::{ConnectionConfig, ConnectionPool, new_file, new_in_memory};
pub use errors::{Result, StoreError};
pub use migrations::run_migrations;
pub use store::{FindOrCreate, RegistrationStore, SqliteRegistrationStore};
