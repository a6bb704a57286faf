//! Client-side authentication session manager.
//!
//! Issues, persists, validates and revokes the bearer credential used to call
//! the API, and exposes the resulting session state (current user, loading,
//! error) to whatever front end drives it.
//!
//! - [`api`]: the request transport and its error type
//! - [`auth`]: the session manager and credential storage
//! - [`config`]: API host, storage backend and directory configuration
//! - [`models`]: wire types

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

pub use api::{ApiClient, ApiError};
pub use auth::{KeyValueStore, SessionManager, SessionPhase, SessionState};
pub use config::Config;
pub use models::UserProfile;
