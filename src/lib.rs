//! # O-RAN / Nephio RAG
//!
//! Retrieval-augmented question answering over the official O-RAN SC and
//! Nephio documentation.
//!
//! The crate fetches documentation pages, cleans and chunks them, embeds the
//! chunks into a vector store, retrieves relevant chunks for a question
//! (with MMR re-ranking), and asks a pluggable LLM adapter to answer from
//! that context.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌─────────┐   ┌───────────┐   ┌──────────┐
//! │ Sources  │──▶│  Loader  │──▶│ Chunker │──▶│ Embedding │──▶│  Vector  │
//! │ registry │   │ (HTTP)   │   │         │   │ provider  │   │  store   │
//! └──────────┘   └──────────┘   └─────────┘   └───────────┘   └────┬─────┘
//!                                                                   │
//!            ┌──────────────┐   ┌─────────────┐   ┌───────────┐     │
//!            │ QueryResult  │◀──│ Synthesizer │◀──│ Retriever │◀────┘
//!            └──────────────┘   │ + LLM       │   │ (MMR)     │
//!                               └─────────────┘   └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! nrag sources                          # list configured documentation sources
//! nrag build                            # fetch, chunk, embed, and store
//! nrag query "How does Nephio use kpt?"
//! nrag update                           # re-index changed pages only
//! nrag serve                            # start the HTTP query surface
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`sources`] | Built-in documentation source registry |
//! | [`fetch`] | HTTP fetch capability |
//! | [`loader`] | Fetch, clean, and quality-gate documents |
//! | [`chunk`] | Overlapping-window text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`store`] | Vector store backends (memory, SQLite) |
//! | [`index`] | Embedding + similarity search with MMR |
//! | [`retriever`] | Question → context chunks |
//! | [`llm`] | LLM adapter capability |
//! | [`synth`] | Prompt assembly and answer synthesis |
//! | [`rag`] | Async orchestrator |
//! | [`blocking`] | Sync orchestrator |
//! | [`server`] | HTTP query surface |
//! | [`stats`] | Status report rendering |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod blocking;
pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod fetch;
pub mod index;
pub mod llm;
pub mod loader;
pub mod migrate;
pub mod models;
pub mod rag;
pub mod retriever;
pub mod server;
pub mod sources;
pub mod stats;
pub mod store;
pub mod synth;
