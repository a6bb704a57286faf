//! HTTP transport for the authentication API.
//!
//! This module provides the `ApiClient`, the single choke point for outbound
//! requests, and `ApiError`, the uniform failure shape it produces.
//!
//! The API uses OAuth2 password-flow bearer tokens obtained from `/token`.

pub mod client;
pub mod error;

pub use client::{ApiClient, RequestBody, RequestOptions};
pub use error::ApiError;
