//! Data models exchanged with the authentication API.
//!
//! - `UserProfile`: the authenticated user, as returned by `/users/me/`
//! - `TokenResponse`: the `/token` success body
//! - `RegisterRequest`: the `/register` request body

pub mod user;

pub use user::{RegisterRequest, TokenResponse, UserProfile};
