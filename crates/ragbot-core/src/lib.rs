//! # ragbot core
//!
//! I/O-free logic shared by the ragbot server and CLI: chunking, the
//! embedding and completion seams, similarity ranking, prompt assembly,
//! tag classification, and the tenant-scoped store abstraction.
//!
//! This crate has no HTTP client, database driver, or async runtime
//! dependency. Network-backed implementations of [`embedding::Embedder`],
//! [`completion::Completer`], [`crawl::Crawler`] and [`store::Store`] live
//! in the `ragbot` application crate.
//!
//! ## Retrieval pipeline
//!
//! ```text
//! text ─▶ chunk ─▶ embed ─▶ store
//!                              │
//! query ─▶ embed ─▶ rank (cosine, top-k) ─▶ context ─▶ prompt ─▶ completion
//! ```

pub mod chunk;
pub mod completion;
pub mod crawl;
pub mod embedding;
pub mod error;
pub mod models;
pub mod prompt;
pub mod qa;
pub mod rate_limit;
pub mod retrieval;
pub mod store;
pub mod tags;
pub mod ttl;

pub use error::{ApiError, ApiResult};
