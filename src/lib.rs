//! Lily - a multi-tenant network file server.
//!
//! Authenticated clients issue framed binary commands against named drives
//! with clearance-tiered access control and chunked streaming I/O. The
//! building blocks live in the workspace crates (`lily-api-types`,
//! `lily-protocol`, `lily-config`, `lily-datastore`); this crate ties them
//! together into the dispatcher and the running server.

pub mod api;
pub mod auth;
pub mod error;
pub mod server;
pub mod session;

pub use error::LilyError;
pub use server::Server;
