use std::sync::Arc;

use agora_domain::forum::ForumService;
use agora_domain::listing::ListingService;
use agora_domain::ports::db::DbAdapter;
use agora_domain::ports::forum::ForumRepository;
use agora_domain::ports::listing::ListingRepository;
use agora_infra::config::AppConfig;
use agora_infra::db::{DbConfig, SurrealAdapter};
use agora_infra::repositories::{InMemoryForumStore, SurrealForumStore};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub forum: ForumService,
    pub listings: ListingService,
    pub db: Arc<dyn DbAdapter>,
}

impl AppState {
    pub async fn new(config: AppConfig) -> anyhow::Result<Self> {
        if !config.uses_surreal() {
            tracing::warn!("data_backend=memory; forum data will not survive a restart");
            return Ok(Self::in_memory(config));
        }
        let db_config = DbConfig::from_app_config(&config);
        let store = Arc::new(SurrealForumStore::new(&db_config).await?);
        Ok(Self::from_parts(
            config,
            store.clone(),
            store,
            Arc::new(SurrealAdapter::new(db_config)),
        ))
    }

    pub fn in_memory(config: AppConfig) -> Self {
        let store = Arc::new(InMemoryForumStore::new());
        Self::from_parts(config, store.clone(), store.clone(), store)
    }

    fn from_parts(
        config: AppConfig,
        forum_repo: Arc<dyn ForumRepository>,
        listing_repo: Arc<dyn ListingRepository>,
        db: Arc<dyn DbAdapter>,
    ) -> Self {
        let limits = config.page_limits();
        Self {
            forum: ForumService::new(forum_repo),
            listings: ListingService::with_limits(listing_repo, limits),
            config,
            db,
        }
    }
}
