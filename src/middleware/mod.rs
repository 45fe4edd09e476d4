//! Tower/axum middleware layers.
//!
//! [`session`] resolves the caller's identity from the session cookie
//! before any proxy handler runs.

pub mod session;
