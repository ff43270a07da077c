//! Folio: book metadata resolution and distributed catalog backfill.
//!
//! Providers for ISBN resolution, metadata, covers, ratings, public-domain
//! status, external identifiers, editions, author biographies and
//! generative book lists sit behind typed capability traits. Orchestrators
//! combine them by cascading fallback, parallel aggregation with merge,
//! and concurrent generation with deduplication. A quota manager meters
//! the paid provider, and the backfill scheduler hands month-sized units
//! of work to any number of workers through an advisory-lock claim
//! protocol.

pub mod app;
pub mod cli;
pub mod config;
pub mod dedup;
pub mod http_client;
pub mod llm;
pub mod models;
pub mod orchestrators;
pub mod providers;
pub mod quota;
pub mod repository;
pub mod scheduler;
pub mod utils;
