//! HTTP adapter for the doppel mock server: an `axum`/`hyper`
//! `HttpExchange` implementation, an on-disk configuration loader, a plain
//! REST plugin, and the router that wires them together.
//!
//! `doppel-core` never depends on anything in this crate; this crate only
//! depends on `doppel-core`'s traits and types.

pub mod config_loader;
pub mod exchange;
pub mod rest_plugin;
pub mod router;
