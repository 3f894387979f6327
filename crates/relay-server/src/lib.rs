//! # relay-server
//!
//! axum HTTP surface of the push relay.
//!
//! | route              | purpose                                     |
//! |--------------------|---------------------------------------------|
//! | `GET /`            | liveness, `204`                             |
//! | `GET /health`      | uptime and live connection count            |
//! | `POST /register`   | persist a registration and connect it       |
//! | `POST /unregister` | tear a registration down                    |

#![deny(unsafe_code)]

pub mod errors;
pub mod health;
pub mod routes;
pub mod server;
pub mod shutdown;

pub use errors::ApiError;
pub use server::{AppState, RelayServer};
pub use shutdown::ShutdownCoordinator;
