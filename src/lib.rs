//! # axum-pprof
//!
//! Dynamic, configuration-driven profiling middleware for axum.
//!
//! Operators declare which route templates to profile — until when, for how
//! long per session, at what sampling rate, and in which mode — in a
//! live-reloadable YAML source. Requests matching a declared task open a
//! short-lived profiling session whose artifact is persisted to a storage
//! backend. The declaration can change at any time without restarting the
//! process, and profiling failures are never surfaced to clients.
//!
//! Built-in modes: `cpu` (pprof sampling profile), `heap` (jemalloc
//! allocation snapshot), and `goroutine` (runtime task/thread dump, also
//! registered under a `tasks` alias).
//!
//! ```rust,no_run
//! use axum::{middleware, routing::get, Router};
//! use axum_pprof::ProfilerBuilder;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = ProfilerBuilder::new()
//!         .with_file_config("profiling.yaml")
//!         .with_file_storage("./profiles")
//!         .build()
//!         .await?;
//!
//!     let app = Router::new()
//!         .route("/users/{id}", get(|| async { "hello" }))
//!         .nest("/debug/profiling", axum_pprof::routes::router(manager.clone()))
//!         .layer(middleware::from_fn_with_state(
//!             manager.clone(),
//!             axum_pprof::middleware::profile,
//!         ));
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//!     axum::serve(listener, app).await?;
//!
//!     manager.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! A matching declaration:
//!
//! ```yaml
//! profiles:
//!   - path: "/users/:id"
//!     methods: ["GET"]
//!     expires_at: "2025-12-31T23:59:59Z"
//!     duration: 10
//!     sample_rate: 5
//!     profile_type: "cpu"    # cpu | heap | goroutine
//! ```

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod builder;
pub mod config;
pub mod error;
pub mod manager;
pub mod matcher;
pub mod middleware;
pub mod options;
pub mod profiler;
pub mod routes;
pub mod storage;
pub mod types;

pub use builder::ProfilerBuilder;
pub use error::{Error, Result};
pub use manager::{ActiveProfile, Admission, Manager};
pub use options::Options;
pub use types::{ProfilingResult, ProfilingStats, ProfilingTask};
