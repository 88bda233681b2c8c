//! Configuration validation
//!
//! Validates critical configuration values at startup to catch misconfigurations early.

use anyhow::Result;
use avgate_core::Config;

/// Validate critical configuration values
///
/// Runs the config's own checks, then the ones that only matter for a
/// served deployment. Fails fast on anything that would make every upload
/// fail later.
pub fn validate_config(config: &Config) -> Result<()> {
    config.validate()?;

    // Validate production mode detection
    let is_production = config.is_production();
    let env_var = std::env::var("ENVIRONMENT")
        .or_else(|_| std::env::var("APP_ENV"))
        .ok();

    if is_production && env_var.is_none() {
        tracing::warn!(
            "Production mode detected but ENVIRONMENT/APP_ENV not set - error details may leak"
        );
    }

    if is_production && config.cors_origins().iter().any(|o| o == "*") {
        tracing::warn!(
            "CORS configured to allow all origins (*) in production - set CORS_ORIGINS to the form's origin"
        );
    }

    if config.server_port() == 0 {
        return Err(anyhow::anyhow!("PORT cannot be 0"));
    }

    match config.max_upload_size_bytes() {
        None => tracing::warn!("MAX_UPLOAD_SIZE_MB is 0 - upload size is unlimited"),
        Some(limit) if limit > usize::MAX as u64 => {
            return Err(anyhow::anyhow!(
                "MAX_UPLOAD_SIZE_MB ({} bytes) exceeds the addressable request body size",
                limit
            ));
        }
        Some(_) => {}
    }

    if config.clamav_chunk_size() > 16 * 1024 * 1024 {
        tracing::warn!(
            chunk_size = config.clamav_chunk_size(),
            "CLAMAV_CHUNK_SIZE is above 16 MiB - clamd may reject chunks larger than StreamMaxLength"
        );
    }

    tracing::info!("Configuration validation passed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use avgate_core::UploadConfig;

    #[test]
    fn defaults_pass() {
        let config = Config(Box::new(UploadConfig::with_upload_dir("/tmp/avgate")));
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn zero_port_is_rejected() {
        let mut upload = UploadConfig::with_upload_dir("/tmp/avgate");
        upload.base.server_port = 0;
        assert!(validate_config(&Config(Box::new(upload))).is_err());
    }

    #[test]
    fn invalid_pipeline_timeout_is_rejected() {
        let mut upload = UploadConfig::with_upload_dir("/tmp/avgate");
        upload.pipeline_timeout_secs = 0;
        assert!(validate_config(&Config(Box::new(upload))).is_err());
    }
}
