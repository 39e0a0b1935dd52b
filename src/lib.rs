//! # ragbot
//!
//! A multi-tenant retrieval-augmented chatbot backend. Each tenant trains
//! its bot on text, Q&A files, web pages, and documents; visitors ask
//! questions through an embeddable widget and get answers that cite the
//! training passages they were drawn from.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────────┐   ┌──────────┐
//! │  Training    │──▶│ Chunk+Embed+Tag  │──▶│  SQLite  │
//! │ text/QA/URL/ │   │   (ingest)       │   │  store   │
//! │ file/dir     │   └──────────────────┘   └────┬─────┘
//! └──────────────┘                               │
//!                   ┌────────────────────────────┤
//!                   ▼                            ▼
//!              ┌──────────┐  embed query  ┌─────────────┐
//!              │   CLI    │  top-k chunks │  HTTP API   │
//!              │ (ragbot) │  prompt+cite  │  (axum)     │
//!              └──────────┘               └─────────────┘
//! ```
//!
//! Pure logic (chunking, scoring, prompt assembly, tag parsing, rate
//! limiting) lives in the `ragbot-core` crate; this crate adds the OpenAI
//! client, the crawler client, file extraction, SQLite persistence, the
//! HTTP server, and the CLI.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite implementation of the core `Store` |
//! | [`openai`] | Embedding and chat completion client |
//! | [`crawler`] | Web page crawling client |
//! | [`extract`] | Text extraction from PDF, OOXML, and text files |
//! | [`services`] | Shared application state |
//! | [`ingest`] | Training pipeline and tenant administration |
//! | [`chat`] | Answering pipeline and similarity search |
//! | [`server`] | HTTP API |

pub mod chat;
pub mod config;
pub mod crawler;
pub mod db;
pub mod extract;
pub mod ingest;
pub mod migrate;
pub mod openai;
pub mod server;
pub mod services;
pub mod sqlite_store;
