//! # tweb
//!
//! Building blocks for JSON web services backed by MySQL or PostgreSQL.
//!
//! ## Features
//!
//! - Pooled database handle with one-shot retry on broken connections and
//!   automatic primary to replica failover
//! - Route registry with modules, version groups and `:param` paths
//! - JSON envelope responses (`{"code", "msg", "data"}`)
//! - INI configuration generated on first start
//! - String and hash caches, HS256 access tokens, salted password digests
//! - Structured logging through `tracing`
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tweb::config::{Config, ConfigPath};
//! use tweb::database::{Database, DatabasePlugin};
//! use tweb::{Response, Router};
//!
//! let config = Arc::new(Config::open(&ConfigPath::from_env())?);
//! tweb::logging::init(&config)?;
//!
//! let db = Database::from_config(MySqlConnector::default(), &config)?;
//! let mut router = Router::new();
//! router.plugin(DatabasePlugin::new(db));
//! router.get("/", |_req| async { Response::success("ok", &tweb::json!({})) });
//! ```

pub mod cache;
pub mod config;
pub mod database;
pub mod error;
pub mod handler;
pub mod http;
pub mod logging;
pub mod plugins;
pub mod router;
pub mod security;
pub mod token;
pub extern crate serde_json;

pub use error::{ServerError, ServerResult};
pub use http::{Method, Request, Response};
pub use router::Router;

// Reexport serde_json
pub use serde_json::{json, Value};
