use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    pub security: SecurityConfig,
    pub gateway: GatewayConfig,
    pub translator: TranslatorConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Server URL; each target database swaps in its own path
    pub url: Option<String>,
    /// Database holding the pending store and history when persisted
    pub system_database: String,
    pub max_connections: u32,
    pub connection_timeout: u64,
    pub enable_query_logging: bool,
    pub enable_slow_query_warning: bool,
    pub slow_query_threshold_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub port: u16,
    pub enable_request_logging: bool,
    pub max_request_size_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub enable_cors: bool,
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub store_backend: StoreBackend,
    /// Maximum audit history entries kept; oldest are dropped first
    pub history_limit: usize,
    /// Logical target name -> physical database name
    pub databases: BTreeMap<String, String>,
    /// Targets whose writes are never rated below MEDIUM risk
    pub sensitive_databases: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslatorConfig {
    /// OpenAI-compatible chat completions endpoint
    pub endpoint: String,
    pub model: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Database overrides
        if let Ok(v) = env::var("DATABASE_URL") {
            self.database.url = Some(v);
        }
        if let Ok(v) = env::var("DATABASE_SYSTEM_NAME") {
            self.database.system_database = v;
        }
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout = v.parse().unwrap_or(self.database.connection_timeout);
        }
        if let Ok(v) = env::var("DATABASE_ENABLE_QUERY_LOGGING") {
            self.database.enable_query_logging = v.parse().unwrap_or(self.database.enable_query_logging);
        }
        if let Ok(v) = env::var("DATABASE_ENABLE_SLOW_QUERY_WARNING") {
            self.database.enable_slow_query_warning = v.parse().unwrap_or(self.database.enable_slow_query_warning);
        }
        if let Ok(v) = env::var("DATABASE_SLOW_QUERY_THRESHOLD_MS") {
            self.database.slow_query_threshold_ms = v.parse().unwrap_or(self.database.slow_query_threshold_ms);
        }

        // API overrides
        if let Some(v) = env::var("GATE_API_PORT").ok().or_else(|| env::var("PORT").ok()) {
            self.api.port = v.parse().unwrap_or(self.api.port);
        }
        if let Ok(v) = env::var("API_ENABLE_REQUEST_LOGGING") {
            self.api.enable_request_logging = v.parse().unwrap_or(self.api.enable_request_logging);
        }
        if let Ok(v) = env::var("API_MAX_REQUEST_SIZE_BYTES") {
            self.api.max_request_size_bytes = v.parse().unwrap_or(self.api.max_request_size_bytes);
        }

        // Security overrides
        if let Ok(v) = env::var("SECURITY_ENABLE_CORS") {
            self.security.enable_cors = v.parse().unwrap_or(self.security.enable_cors);
        }
        if let Ok(v) = env::var("SECURITY_CORS_ORIGINS") {
            self.security.cors_origins = v.split(',').map(|s| s.trim().to_string()).collect();
        }

        // Gateway overrides
        if let Ok(v) = env::var("GATE_STORE_BACKEND") {
            self.gateway.store_backend = match v.to_ascii_lowercase().as_str() {
                "postgres" | "pg" => StoreBackend::Postgres,
                "memory" => StoreBackend::Memory,
                _ => self.gateway.store_backend,
            };
        }
        if let Ok(v) = env::var("GATE_HISTORY_LIMIT") {
            self.gateway.history_limit = v.parse().unwrap_or(self.gateway.history_limit);
        }
        if let Ok(v) = env::var("GATE_DATABASES") {
            let parsed = parse_database_map(&v);
            if !parsed.is_empty() {
                self.gateway.databases = parsed;
            }
        }
        if let Ok(v) = env::var("GATE_SENSITIVE_DATABASES") {
            self.gateway.sensitive_databases = split_list(&v);
        }

        // Translator overrides
        if let Ok(v) = env::var("TRANSLATOR_ENDPOINT") {
            self.translator.endpoint = v;
        }
        if let Ok(v) = env::var("TRANSLATOR_MODEL") {
            self.translator.model = v;
        }
        if let Ok(v) = env::var("TRANSLATOR_API_KEY") {
            self.translator.api_key = Some(v).filter(|k| !k.is_empty());
        }
        if let Ok(v) = env::var("TRANSLATOR_TIMEOUT_SECS") {
            self.translator.timeout_secs = v.parse().unwrap_or(self.translator.timeout_secs);
        }

        self
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            database: DatabaseConfig {
                url: None,
                system_database: "approval_gate".to_string(),
                max_connections: 10,
                connection_timeout: 30,
                enable_query_logging: true,
                enable_slow_query_warning: true,
                slow_query_threshold_ms: 100,
            },
            api: ApiConfig {
                port: 8000,
                enable_request_logging: true,
                max_request_size_bytes: 1024 * 1024, // 1MB
            },
            security: SecurityConfig {
                enable_cors: true,
                cors_origins: vec!["http://localhost:8000".to_string(), "http://localhost:5173".to_string()],
            },
            gateway: GatewayConfig {
                store_backend: StoreBackend::Memory,
                history_limit: 100,
                databases: default_databases(),
                sensitive_databases: vec!["finance".to_string(), "healthcare".to_string()],
            },
            translator: TranslatorConfig::default(),
        }
    }

    fn staging() -> Self {
        let mut config = Self::development();
        config.environment = Environment::Staging;
        config.database.max_connections = 20;
        config.database.connection_timeout = 10;
        config.database.slow_query_threshold_ms = 500;
        config.security.cors_origins = vec!["https://staging.example.com".to_string()];
        config.gateway.store_backend = StoreBackend::Postgres;
        config.gateway.history_limit = 500;
        config
    }

    fn production() -> Self {
        let mut config = Self::development();
        config.environment = Environment::Production;
        config.database.max_connections = 50;
        config.database.connection_timeout = 5;
        config.database.enable_query_logging = false;
        config.database.slow_query_threshold_ms = 1000;
        config.api.enable_request_logging = false;
        config.security.cors_origins = vec!["https://app.example.com".to_string()];
        config.gateway.store_backend = StoreBackend::Postgres;
        config.gateway.history_limit = 1000;
        config
    }

    /// Development defaults without reading the environment (tests, embedding)
    pub fn defaults() -> Self {
        Self::development()
    }
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            timeout_secs: 30,
        }
    }
}

fn default_databases() -> BTreeMap<String, String> {
    ["hr", "healthcare", "ecommerce", "finance", "education"]
        .iter()
        .map(|name| (name.to_string(), name.to_string()))
        .collect()
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Parse `hr=hr_db,finance` into {hr: hr_db, finance: finance}
pub fn parse_database_map(value: &str) -> BTreeMap<String, String> {
    split_list(value)
        .into_iter()
        .filter_map(|entry| match entry.split_once('=') {
            Some((logical, physical)) => {
                let (logical, physical) = (logical.trim(), physical.trim());
                (!logical.is_empty() && !physical.is_empty())
                    .then(|| (logical.to_string(), physical.to_string()))
            }
            None => Some((entry.clone(), entry)),
        })
        .collect()
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}
