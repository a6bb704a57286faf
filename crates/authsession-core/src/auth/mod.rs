//! Authentication module for managing the user session and its credential.
//!
//! This module provides:
//! - `SessionManager`: login, registration, logout and startup validation
//! - `KeyValueStore`: durable storage for the bearer credential, with file,
//!   OS keychain and in-memory backends
//!
//! The credential lives under the `access_token` key and is validated against
//! `/users/me/` at startup and after every login.

pub mod session;
pub mod store;

pub use session::{SessionManager, SessionPhase, SessionState, SESSION_EXPIRED_MESSAGE, TOKEN_KEY};
pub use store::{FileStore, KeyValueStore, KeyringStore, MemoryStore};
