//! # relay-core
//!
//! Shared vocabulary for the push relay crates:
//!
//! - **Registrations**: [`Registration`] rows and the [`IdentityKey`] that
//!   identifies a registration and its at-most-one live upstream connection
//! - **Redaction**: helpers that keep credentials out of log output
//! - **Logging**: `tracing` subscriber setup and in-memory capture for tests

#![deny(unsafe_code)]

pub mod logging;
pub mod registration;
pub mod text;

pub use registration::{IdentityKey, Registration};
