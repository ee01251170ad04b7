//! # Tender Match
//!
//! **Match company capability profiles against government tenders.**
//!
//! Tender and profile documents are converted to text, chunked, embedded,
//! and stored in two vector collections. Each document also gets one
//! summary vector (the normalized mean of its chunks); a profile's embedding
//! is the normalized mean of its documents' summaries. Search ranks tender
//! chunks against that embedding, optionally blended with a free-text query,
//! and explains each hit with a passage from the tender and the closest
//! passage from the profile.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌──────────────────┐
//! │  PDF / txt  │──▶│   Indexer     │──▶│ SQLite           │
//! │  converter  │   │ chunk+embed  │   │ outputs, vectors │
//! └─────────────┘   └──────────────┘   └────────┬─────────┘
//!                                               ▼
//!                                       ┌──────────────┐
//!                                       │ Search (tm)  │
//!                                       └──────────────┘
//! ```
//!
//! The pipeline itself lives in `tender-match-core`; this crate supplies
//! the SQLite store, the embedding backends, file conversion, and the `tm`
//! CLI.
//!
//! ## Quick Start
//!
//! ```bash
//! tm init
//! tm tender import ./tenders.json
//! tm tender attach T-1042 ./T-1042.pdf
//! tm profile create "Acme Infra"
//! tm profile add <profile_id> ./brochure.pdf ./past-work.pdf
//! tm search <profile_id> --query "bridge repair" --location Pune
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`db`] | SQLite connection pool |
//! | [`migrate`] | Schema creation |
//! | [`sqlite_store`] | Metadata store and vector collections on SQLite |
//! | [`embedding`] | OpenAI, Ollama, and fastembed providers |
//! | [`extract`] | PDF and plain-text conversion |
//! | [`context`] | Store, index, and provider wiring |
//! | [`ingest`] | Profile jobs, tender attach, indexing, rebuild |
//! | [`tenders`] | Tender record import |
//! | [`search`] | Search and one-off file matching |
//! | [`progress`] | Progress output on stderr |

pub mod config;
pub mod context;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod ingest;
pub mod migrate;
pub mod progress;
pub mod search;
pub mod sqlite_store;
pub mod tenders;
