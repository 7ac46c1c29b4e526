//! Request-handling pipeline for a configuration-driven HTTP mock server.
//!
//! This crate is protocol-agnostic: it consumes an [`exchange::HttpExchange`]
//! trait object, already-parsed [`config::PluginConfig`] trees, a
//! [`store::StoreFactory`], and a [`plugin::PluginManager`], and drives the
//! resolve → build-behaviour → capture → simulate-latency → render →
//! transmit pipeline. The HTTP adapter, on-disk configuration loader, and
//! concrete plugins live in `doppel-http`.
//!
//! # Quick start (embedding)
//!
//! ```ignore
//! use doppel_core::matcher::match_resource;
//! use doppel_core::behaviour::behaviour_from_resource;
//!
//! let plugin_config = load_plugin_config(); // from doppel-http's loader
//! if let Some(found) = match_resource(&request_view, &plugin_config.resources) {
//!     let behaviour = behaviour_from_resource(
//!         found.resource,
//!         plugin_config.root_response.as_ref(),
//!         plugin_config.defaults_from_root_response,
//!     );
//!     // hand `behaviour` to response_service::respond
//! }
//! ```

pub mod behaviour;
pub mod cache;
pub mod capture;
pub mod config;
pub mod error;
pub mod exchange;
pub mod lifecycle;
pub mod matcher;
pub mod metrics;
pub mod plugin;
pub mod router;
#[cfg(feature = "scripting")]
pub mod script;
pub mod latency;
pub mod response_service;
pub mod store;

pub use error::{Error, Result};
