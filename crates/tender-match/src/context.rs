//! Wiring of the SQLite store, vector collections, and embedding provider.

use anyhow::Result;
use sqlx::SqlitePool;
use std::sync::Arc;

use tender_match_core::index::VectorIndex;
use tender_match_core::indexer::DocumentIndexer;
use tender_match_core::search::SearchEngine;
use tender_match_core::store::MetadataStore;

use crate::config::Config;
use crate::db;
use crate::embedding;
use crate::sqlite_store::{SqliteStore, SqliteVectorIndex};

/// Store-only handle for commands that never embed.
pub struct StoreContext {
    pub pool: SqlitePool,
    pub store: Arc<dyn MetadataStore>,
}

impl StoreContext {
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        let store: Arc<dyn MetadataStore> = Arc::new(SqliteStore::new(pool.clone()));
        Ok(Self { pool, store })
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

/// Everything the indexing and search commands need.
pub struct AppContext {
    pub pool: SqlitePool,
    pub store: Arc<dyn MetadataStore>,
    pub indexer: DocumentIndexer,
    pub engine: SearchEngine,
}

impl AppContext {
    /// Open the database and build the provider.
    ///
    /// Fails before touching the database if the embedding provider is
    /// disabled or cannot be initialized.
    pub async fn open(config: &Config) -> Result<Self> {
        let embedder = embedding::shared_provider(&config.embedding)?;
        let StoreContext { pool, store } = StoreContext::open(config).await?;

        let tenders: Arc<dyn VectorIndex> = Arc::new(SqliteVectorIndex::new(
            pool.clone(),
            &config.collections.tenders,
        ));
        let profiles: Arc<dyn VectorIndex> = Arc::new(SqliteVectorIndex::new(
            pool.clone(),
            &config.collections.profiles,
        ));

        let indexer = DocumentIndexer::new(
            Arc::clone(&embedder),
            Arc::clone(&store),
            Arc::clone(&tenders),
            Arc::clone(&profiles),
            config.indexer_settings(),
        );
        let engine = SearchEngine::new(
            embedder,
            Arc::clone(&store),
            tenders,
            profiles,
            config.search_params(),
        );

        Ok(Self {
            pool,
            store,
            indexer,
            engine,
        })
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}
