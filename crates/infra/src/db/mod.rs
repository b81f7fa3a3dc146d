use std::time::Duration;

use agora_domain::ports::BoxFuture;
use agora_domain::ports::db::{DbAdapter, DbError};
use surrealdb::Surreal;
use surrealdb::engine::remote::ws::{Client, Ws};
use surrealdb::opt::auth::Root;
use tokio::net::TcpStream;
use tokio::time::timeout;
use url::Url;

use crate::config::AppConfig;

const HEALTH_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Indexes backing the listing filters and the one-vote-per-user rule.
const SCHEMA: &str = "\
    DEFINE INDEX IF NOT EXISTS topic_id_unique ON TABLE topic FIELDS topic_id UNIQUE; \
    DEFINE INDEX IF NOT EXISTS post_id_unique ON TABLE post FIELDS post_id UNIQUE; \
    DEFINE INDEX IF NOT EXISTS post_topic ON TABLE post FIELDS topic_id; \
    DEFINE INDEX IF NOT EXISTS comment_id_unique ON TABLE comment FIELDS comment_id UNIQUE; \
    DEFINE INDEX IF NOT EXISTS comment_post ON TABLE comment FIELDS post_id; \
    DEFINE INDEX IF NOT EXISTS post_vote_target ON TABLE post_vote FIELDS post_id; \
    DEFINE INDEX IF NOT EXISTS comment_vote_target ON TABLE comment_vote FIELDS comment_id; \
    DEFINE INDEX IF NOT EXISTS topic_follow_user ON TABLE topic_follow FIELDS user_id;";

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub endpoint: String,
    pub namespace: String,
    pub database: String,
    pub username: String,
    pub password: String,
}

impl DbConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            endpoint: config.surreal_endpoint.clone(),
            namespace: config.surreal_ns.clone(),
            database: config.surreal_db.clone(),
            username: config.surreal_user.clone(),
            password: config.surreal_pass.clone(),
        }
    }
}

/// Opens an authenticated session and makes sure the forum indexes exist.
pub async fn connect(config: &DbConfig) -> anyhow::Result<Surreal<Client>> {
    let db = Surreal::<Client>::init();
    db.connect::<Ws>(&config.endpoint).await?;
    db.signin(Root {
        username: &config.username,
        password: &config.password,
    })
    .await?;
    db.use_ns(&config.namespace)
        .use_db(&config.database)
        .await?;
    db.query(SCHEMA).await?.check()?;
    tracing::info!(
        endpoint = %config.endpoint,
        namespace = %config.namespace,
        database = %config.database,
        "connected to surrealdb"
    );
    Ok(db)
}

/// TCP reachability check for the configured SurrealDB endpoint.
#[derive(Debug, Clone)]
pub struct SurrealAdapter {
    config: DbConfig,
}

impl SurrealAdapter {
    pub fn new(config: DbConfig) -> Self {
        Self { config }
    }
}

impl DbAdapter for SurrealAdapter {
    fn backend(&self) -> &'static str {
        "surrealdb"
    }

    fn health_check(&self) -> BoxFuture<'_, Result<(), DbError>> {
        Box::pin(async move {
            let address = socket_address(&self.config.endpoint)?;
            timeout(HEALTH_CONNECT_TIMEOUT, TcpStream::connect(&address))
                .await
                .map_err(|_| DbError::Unreachable(format!("connect to {address} timed out")))?
                .map_err(|err| {
                    DbError::Unreachable(format!("connect to {address} failed: {err}"))
                })?;
            tracing::debug!(%address, "surreal health check succeeded");
            Ok(())
        })
    }
}

fn socket_address(endpoint: &str) -> Result<String, DbError> {
    let normalized = if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("ws://{endpoint}")
    };
    let parsed = Url::parse(&normalized)
        .map_err(|err| DbError::Unreachable(format!("invalid endpoint '{endpoint}': {err}")))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| DbError::Unreachable(format!("endpoint '{endpoint}' has no host")))?;
    let port = parsed.port().unwrap_or(match parsed.scheme() {
        "wss" | "https" => 443,
        _ => 8000,
    });
    Ok(format!("{host}:{port}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_address_defaults_ports_by_scheme() {
        assert_eq!(
            socket_address("ws://db.internal").expect("address"),
            "db.internal:8000"
        );
        assert_eq!(
            socket_address("wss://db.internal").expect("address"),
            "db.internal:443"
        );
        assert_eq!(
            socket_address("127.0.0.1:9000").expect("address"),
            "127.0.0.1:9000"
        );
    }

    #[test]
    fn socket_address_rejects_garbage() {
        assert!(socket_address("ws://").is_err());
    }
}
