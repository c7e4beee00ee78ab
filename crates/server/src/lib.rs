//! HTTP and streaming-session gateway for the TTS proxy.
//!
//! Wires the request pipeline (spec §4.H) on top of the leaf crates:
//! `ovp_core` (data model, errors), `ovp_config` (settings), `ovp_keys`
//! (credentials, key repository, rate limiter, usage tracker),
//! `ovp_providers` (adapters, engine registry) and `ovp_voice` (resolver,
//! synthesized alignment).

pub mod auth;
pub mod error;
pub mod http;
pub mod ip_filter;
pub mod session;
pub mod state;
pub mod wire;

pub use error::{ApiError, ApiResult};
pub use http::create_router;
pub use state::AppState;
