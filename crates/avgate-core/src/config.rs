//! Configuration module
//!
//! This module provides the configuration structures for the upload service:
//! server settings, the storage root, pipeline bounds and the clamd channel.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

// Common constants
const SERVER_PORT: u16 = 3001;
const HTTP_CONCURRENCY_LIMIT: usize = 10_000;
const UPLOAD_DIR: &str = "./uploads";
const MAX_UPLOAD_SIZE_MB: u64 = 1024;
const PIPELINE_TIMEOUT_SECS: u64 = 300;
const CLAMAV_PORT: u16 = 3310;
const CLAMAV_TIMEOUT_SECS: u64 = 60;
const CLAMAV_CONNECT_RETRIES: u32 = 3;
const CLAMAV_RETRY_BACKOFF_MS: u64 = 200;
const CLAMAV_CHUNK_SIZE: usize = 64 * 1024;
const SCAN_QUEUE_DEPTH: usize = 16;
/// Half of tokio's default blocking pool (512 threads)
const CLAMAV_MAX_CONCURRENT_SCANS: usize = 256;

/// Base configuration shared by every binary
#[derive(Clone, Debug)]
pub struct BaseConfig {
    pub server_port: u16,
    pub environment: String,
    pub http_concurrency_limit: usize,
    pub cors_origins: Vec<String>,
}

/// Upload pipeline configuration
#[derive(Clone, Debug)]
pub struct UploadConfig {
    pub base: BaseConfig,
    // Storage root; staging lives in a hidden directory below it
    pub upload_dir: PathBuf,
    /// 0 disables the limit.
    pub max_upload_size_bytes: u64,
    pub pipeline_timeout_secs: u64,
    // ClamAV configuration
    pub clamav_host: String,
    pub clamav_port: u16,
    pub clamav_timeout_secs: u64,
    pub clamav_connect_retries: u32,
    pub clamav_retry_backoff_ms: u64,
    pub clamav_chunk_size: usize,
    /// Chunks that may wait for the scanner before the passthrough applies backpressure.
    pub scan_queue_depth: usize,
    /// Each clamd conversation occupies one blocking-pool thread
    pub clamav_max_concurrent_scans: usize,
}

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config(pub Box<UploadConfig>);

impl Config {
    fn as_upload(&self) -> &UploadConfig {
        &self.0
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let env = self.as_upload().base.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn from_env() -> Result<Self, anyhow::Error> {
        let config = UploadConfig::from_env()?;
        Ok(Config(Box::new(config)))
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.as_upload().validate()
    }

    pub fn server_port(&self) -> u16 {
        self.as_upload().base.server_port
    }

    pub fn environment(&self) -> &str {
        &self.as_upload().base.environment
    }

    pub fn http_concurrency_limit(&self) -> usize {
        self.as_upload().base.http_concurrency_limit
    }

    pub fn cors_origins(&self) -> &[String] {
        &self.as_upload().base.cors_origins
    }

    pub fn upload_dir(&self) -> &PathBuf {
        &self.as_upload().upload_dir
    }

    pub fn max_upload_size_bytes(&self) -> Option<u64> {
        match self.as_upload().max_upload_size_bytes {
            0 => None,
            n => Some(n),
        }
    }

    pub fn pipeline_timeout(&self) -> Duration {
        Duration::from_secs(self.as_upload().pipeline_timeout_secs)
    }

    pub fn clamav_host(&self) -> &str {
        &self.as_upload().clamav_host
    }

    pub fn clamav_port(&self) -> u16 {
        self.as_upload().clamav_port
    }

    pub fn clamav_timeout(&self) -> Duration {
        Duration::from_secs(self.as_upload().clamav_timeout_secs)
    }

    pub fn clamav_connect_retries(&self) -> u32 {
        self.as_upload().clamav_connect_retries
    }

    pub fn clamav_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.as_upload().clamav_retry_backoff_ms)
    }

    pub fn clamav_chunk_size(&self) -> usize {
        self.as_upload().clamav_chunk_size
    }

    pub fn scan_queue_depth(&self) -> usize {
        self.as_upload().scan_queue_depth
    }

    pub fn clamav_max_concurrent_scans(&self) -> usize {
        self.as_upload().clamav_max_concurrent_scans
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl UploadConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let base = BaseConfig {
            server_port: env::var("PORT")
                .unwrap_or_else(|_| SERVER_PORT.to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number"))?,
            environment,
            http_concurrency_limit: env_or("HTTP_CONCURRENCY_LIMIT", HTTP_CONCURRENCY_LIMIT)
                .max(1),
            cors_origins: env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "*".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        };

        let config = UploadConfig {
            base,
            upload_dir: PathBuf::from(
                env::var("UPLOAD_DIR").unwrap_or_else(|_| UPLOAD_DIR.to_string()),
            ),
            max_upload_size_bytes: env_or("MAX_UPLOAD_SIZE_MB", MAX_UPLOAD_SIZE_MB) * 1024 * 1024,
            pipeline_timeout_secs: env_or("PIPELINE_TIMEOUT_SECS", PIPELINE_TIMEOUT_SECS),
            clamav_host: env::var("CLAMAV_HOST").unwrap_or_else(|_| "localhost".to_string()),
            clamav_port: env::var("CLAMAV_PORT")
                .unwrap_or_else(|_| CLAMAV_PORT.to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("CLAMAV_PORT must be a valid port number"))?,
            clamav_timeout_secs: env_or("CLAMAV_TIMEOUT_SECS", CLAMAV_TIMEOUT_SECS),
            clamav_connect_retries: env_or("CLAMAV_CONNECT_RETRIES", CLAMAV_CONNECT_RETRIES),
            clamav_retry_backoff_ms: env_or("CLAMAV_RETRY_BACKOFF_MS", CLAMAV_RETRY_BACKOFF_MS),
            clamav_chunk_size: env_or("CLAMAV_CHUNK_SIZE", CLAMAV_CHUNK_SIZE),
            scan_queue_depth: env_or("SCAN_QUEUE_DEPTH", SCAN_QUEUE_DEPTH),
            clamav_max_concurrent_scans: env_or(
                "CLAMAV_MAX_CONCURRENT_SCANS",
                CLAMAV_MAX_CONCURRENT_SCANS,
            ),
        };

        config.validate()?;
        Ok(config)
    }

    /// Defaults rooted at `upload_dir`, without reading the environment.
    pub fn with_upload_dir(upload_dir: impl Into<PathBuf>) -> Self {
        UploadConfig {
            base: BaseConfig {
                server_port: SERVER_PORT,
                environment: "development".to_string(),
                http_concurrency_limit: HTTP_CONCURRENCY_LIMIT,
                cors_origins: vec!["*".to_string()],
            },
            upload_dir: upload_dir.into(),
            max_upload_size_bytes: MAX_UPLOAD_SIZE_MB * 1024 * 1024,
            pipeline_timeout_secs: PIPELINE_TIMEOUT_SECS,
            clamav_host: "localhost".to_string(),
            clamav_port: CLAMAV_PORT,
            clamav_timeout_secs: CLAMAV_TIMEOUT_SECS,
            clamav_connect_retries: CLAMAV_CONNECT_RETRIES,
            clamav_retry_backoff_ms: CLAMAV_RETRY_BACKOFF_MS,
            clamav_chunk_size: CLAMAV_CHUNK_SIZE,
            scan_queue_depth: SCAN_QUEUE_DEPTH,
            clamav_max_concurrent_scans: CLAMAV_MAX_CONCURRENT_SCANS,
        }
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.upload_dir.as_os_str().is_empty() {
            return Err(anyhow::anyhow!("UPLOAD_DIR cannot be empty"));
        }

        if self.pipeline_timeout_secs == 0 {
            return Err(anyhow::anyhow!("PIPELINE_TIMEOUT_SECS must be greater than 0"));
        }

        if self.clamav_timeout_secs == 0 {
            return Err(anyhow::anyhow!("CLAMAV_TIMEOUT_SECS must be greater than 0"));
        }

        if self.clamav_timeout_secs > self.pipeline_timeout_secs {
            return Err(anyhow::anyhow!(
                "CLAMAV_TIMEOUT_SECS ({}) cannot exceed PIPELINE_TIMEOUT_SECS ({})",
                self.clamav_timeout_secs,
                self.pipeline_timeout_secs
            ));
        }

        if self.clamav_host.trim().is_empty() {
            return Err(anyhow::anyhow!("CLAMAV_HOST cannot be empty"));
        }

        if self.clamav_chunk_size == 0 || self.scan_queue_depth == 0 {
            return Err(anyhow::anyhow!(
                "CLAMAV_CHUNK_SIZE and SCAN_QUEUE_DEPTH must be greater than 0"
            ));
        }

        if self.clamav_max_concurrent_scans == 0 {
            return Err(anyhow::anyhow!(
                "CLAMAV_MAX_CONCURRENT_SCANS must be greater than 0"
            ));
        }

        Ok(())
    }
}
