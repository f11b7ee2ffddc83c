use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    pub server: ServerConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub bind_addr: Option<String>,
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    /// リアルタイムデータベースのベースURL
    pub base_url: String,
    /// フェッチのタイムアウト（秒）
    pub timeout_seconds: Option<u64>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                bind_addr: Some("0.0.0.0:8000".to_string()),
                log_level: Some("info".to_string()),
            },
            store: StoreConfig {
                base_url: "http://127.0.0.1:9000".to_string(),
                timeout_seconds: Some(10),
            },
        }
    }
}

impl ServiceConfig {
    /// 設定ファイルから読み込み、環境変数で上書き
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder();

        // デフォルト値を設定
        let default_config = ServiceConfig::default();
        settings = settings.add_source(
            config::Config::try_from(&default_config)
                .map_err(|e| Error::Config(e.to_string()))?,
        );

        // 設定ファイルを読み込み（複数の場所を試行）
        let config_paths = ["attendai.toml", "config.toml", "config/attendai.toml"];

        for path in &config_paths {
            if std::path::Path::new(path).exists() {
                tracing::info!("Loading configuration file: {}", path);
                settings = settings.add_source(config::File::with_name(path));
                break;
            }
        }

        let config: ServiceConfig = settings
            .build()
            .map_err(|e| Error::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| Error::Config(e.to_string()))?;

        // 環境変数による個別上書き
        let mut final_config = config;

        if let Ok(bind_addr) = std::env::var("ATTENDAI_BIND_ADDR") {
            final_config.server.bind_addr = Some(bind_addr);
        }

        if let Ok(base_url) = std::env::var("ATTENDAI_STORE_BASE_URL") {
            final_config.store.base_url = base_url;
        }

        if let Ok(timeout) = std::env::var("ATTENDAI_STORE_TIMEOUT_SECONDS") {
            if let Ok(seconds) = timeout.parse() {
                final_config.store.timeout_seconds = Some(seconds);
            }
        }

        Ok(final_config)
    }
}
