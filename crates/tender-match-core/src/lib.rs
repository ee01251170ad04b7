//! # Tender Match Core
//!
//! Shared logic for Tender Match: data models, chunking, the embedding
//! provider trait, the vector index and metadata store abstractions, the
//! document indexing pipeline, and the hybrid search engine.
//!
//! This crate contains no tokio, sqlx, filesystem I/O, or other
//! runtime-specific dependencies. Storage and model backends are supplied
//! by the application through the [`index::VectorIndex`],
//! [`store::MetadataStore`], and [`embedding::EmbeddingProvider`] traits.

pub mod chunk;
pub mod embedding;
pub mod error;
pub mod index;
pub mod indexer;
pub mod jobs;
pub mod models;
pub mod progress;
pub mod search;
pub mod store;
