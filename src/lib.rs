//! Relaygate is a multi-endpoint request fan-out gateway.
//!
//! An authenticated caller sends one request naming several backend
//! endpoints; the gateway replays it against each of them concurrently,
//! signing every copy with the caller's credentials for that endpoint,
//! and answers with either the single backend's raw response or one JSON
//! object keyed by endpoint.
//!
//! # Architecture
//!
//! - [`cli`] -- Command-line argument parsing with clap derive macros.
//! - [`cmd`] -- Subcommand dispatch and execution (run, init, validate, health).
//! - [`config`] -- Configuration loading, validation, and hot-reloading via the
//!   [`ConfigSource`](config::ConfigSource) trait.
//! - [`directory`] -- Endpoint and token lookup behind the
//!   [`EndpointDirectory`](directory::EndpointDirectory) and
//!   [`TokenStore`](directory::TokenStore) traits.
//! - [`auth`] -- Per-auth-type request signing strategies.
//! - [`error`] -- Unified error types using `thiserror`.
//! - [`health`] -- `GET /health` endpoint handler returning runtime diagnostics.
//! - [`logging`] -- Structured tracing setup with JSON and pretty-print output.
//! - [`middleware`] -- Session cookie resolution.
//! - [`proxy`] -- Envelope construction, concurrent fan-out/fan-in, and
//!   response aggregation.
//! - [`server`] -- Axum server setup, shared application state, HTTP client, and
//!   graceful shutdown.
//!
//! # Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `yaml` | YAML config file support _(enabled by default)_ |
//! | `json` | JSON config file support |
//! | `toml` | TOML config file support |
//! | `file-backends` | All file format backends |
//! | `full` | All features |

// Binary crate: public functions are internal, not consumed by external users.
#![allow(clippy::missing_errors_doc)]

pub mod auth;
pub mod cli;
pub mod cmd;
pub mod config;
pub mod directory;
pub mod error;
pub mod health;
pub mod logging;
pub mod middleware;
pub mod proxy;
pub mod server;
