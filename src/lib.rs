//! # ragwatch
//!
//! Watch an upload folder, turn new PDFs and text files into embedded
//! chunks, and answer questions grounded in them over HTTP.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐  FileTask  ┌──────────┐   ┌──────────────────────────┐   ┌──────────┐
//! │ watcher  │──(mpsc)───▶│  ingest  │──▶│ partition → chunk → embed │──▶│  SQLite  │
//! └────┬─────┘            └────┬─────┘   └──────────────────────────┘   └────┬─────┘
//!      │ processing            │ completed / failed                          │
//!      ▼                       ▼                                             ▼
//!   ┌──────────────────────────────┐                              ┌────────────────┐
//!   │   status ledger (JSON file)  │◀──── GET /api/file-status ───│  HTTP server   │
//!   └──────────────────────────────┘                              │ /response/{q}  │
//!                                                                 └────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! ragwatch init                            # create database + collection
//! ragwatch watch                           # ingest files dropped in ./uploads
//! ragwatch serve                           # answer on 127.0.0.1:5050
//! ragwatch ask "when is the final exam?"   # one-shot answer
//! ragwatch status                          # print the ledger
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`error`] | Pipeline error types |
//! | [`models`] | Core data types |
//! | [`partition`] | PDF / text → typed elements |
//! | [`chunk`] | Title-aware chunk aggregation |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`store`] | Vector store facade and backends |
//! | [`status`] | File status ledger |
//! | [`watcher`] | Filesystem watcher |
//! | [`ingest`] | Ingestion worker and `watch` command |
//! | [`llm`] | Chat-completion providers |
//! | [`query`] | Retrieval-augmented answering |
//! | [`server`] | HTTP server |
//! | [`probe`] | Client-side smoke test |

pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod ingest;
pub mod llm;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod partition;
pub mod probe;
pub mod query;
pub mod server;
pub mod status;
pub mod store;
pub mod watcher;
