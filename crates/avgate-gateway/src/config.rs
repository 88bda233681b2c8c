//! Gateway command line and environment configuration.

use clap::Parser;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "avgate-gateway",
    about = "Upload form and streaming proxy in front of the avgate API"
)]
pub struct GatewayArgs {
    /// Port to listen on
    #[arg(long, env = "GATEWAY_PORT", default_value_t = 3000)]
    pub port: u16,

    /// Upload endpoint that receives forwarded requests
    #[arg(long, env = "UPSTREAM_URL", default_value = "http://localhost:3001")]
    pub upstream_url: reqwest::Url,

    /// Seconds to wait for a TCP connection to the upload endpoint
    #[arg(long, env = "UPSTREAM_CONNECT_TIMEOUT_SECS", default_value_t = 10)]
    pub connect_timeout_secs: u64,

    #[arg(long, env = "ENVIRONMENT", default_value = "development")]
    pub environment: String,
}

impl GatewayArgs {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn is_production(&self) -> bool {
        let env = self.environment.to_lowercase();
        env == "production" || env == "prod"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let args = GatewayArgs::parse_from([
            "avgate-gateway",
            "--port",
            "8080",
            "--upstream-url",
            "http://api.internal:3001/",
        ]);
        assert_eq!(args.port, 8080);
        assert_eq!(args.upstream_url.host_str(), Some("api.internal"));
        assert_eq!(args.connect_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn invalid_upstream_is_rejected() {
        let parsed = GatewayArgs::try_parse_from(["avgate-gateway", "--upstream-url", "not a url"]);
        assert!(parsed.is_err());
    }
}
