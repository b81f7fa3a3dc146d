use agora_domain::listing::PageLimits;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub app_env: String,
    pub port: u16,
    pub log_level: String,
    /// `memory` or `surreal`.
    pub data_backend: String,
    pub surreal_endpoint: String,
    pub surreal_ns: String,
    pub surreal_db: String,
    pub surreal_user: String,
    pub surreal_pass: String,
    pub jwt_secret: String,
    pub default_page_size: i64,
    pub max_page_size: i64,
    pub request_timeout_ms: u64,
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();
        let cfg = config::Config::builder()
            .set_default("app_env", "development")?
            .set_default("port", 3000)?
            .set_default("log_level", "info")?
            .set_default("data_backend", "memory")?
            .set_default("surreal_endpoint", "ws://127.0.0.1:8000")?
            .set_default("surreal_ns", "agora")?
            .set_default("surreal_db", "forum")?
            .set_default("surreal_user", "root")?
            .set_default("surreal_pass", "root")?
            .set_default("jwt_secret", "dev-secret")?
            .set_default("default_page_size", 20)?
            .set_default("max_page_size", 100)?
            .set_default("request_timeout_ms", 30_000)?
            .add_source(config::Environment::default().separator("__"))
            .build()?;
        let config: Self = cfg.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn is_production(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("production")
    }

    pub fn is_test(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("test")
    }

    pub fn uses_surreal(&self) -> bool {
        self.data_backend.eq_ignore_ascii_case("surreal")
    }

    pub fn page_limits(&self) -> PageLimits {
        PageLimits {
            default_page_size: self.default_page_size,
            max_page_size: self.max_page_size,
        }
    }

    fn validate(&self) -> Result<(), config::ConfigError> {
        if !matches!(
            self.data_backend.to_ascii_lowercase().as_str(),
            "memory" | "surreal"
        ) {
            return Err(config::ConfigError::Message(format!(
                "data_backend must be 'memory' or 'surreal', got '{}'",
                self.data_backend
            )));
        }
        if self.default_page_size <= 0 || self.default_page_size > self.max_page_size {
            return Err(config::ConfigError::Message(
                "default_page_size must be between 1 and max_page_size".into(),
            ));
        }
        Ok(())
    }

    /// Defaults used by in-process tests; never reads the environment.
    pub fn for_tests() -> Self {
        Self {
            app_env: "test".into(),
            port: 0,
            log_level: "warn".into(),
            data_backend: "memory".into(),
            surreal_endpoint: "ws://127.0.0.1:8000".into(),
            surreal_ns: "agora".into(),
            surreal_db: "forum_test".into(),
            surreal_user: "root".into(),
            surreal_pass: "root".into(),
            jwt_secret: "test-secret".into(),
            default_page_size: 20,
            max_page_size: 100,
            request_timeout_ms: 5_000,
        }
    }
}
