//! Rate Limiting for remote command endpoints
//!
//! Commands reach the vehicle, so callers are throttled per peer IP with
//! tower_governor (GCRA, no background task).

use governor::middleware::StateInformationMiddleware;
use serde::Deserialize;
use std::sync::Arc;
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::key_extractor::PeerIpKeyExtractor;

use crate::settings::SettingsError;

/// Governor config with X-RateLimit-* headers enabled
pub type CommandGovernorConfig =
    tower_governor::governor::GovernorConfig<PeerIpKeyExtractor, StateInformationMiddleware>;

/// Command rate limit per peer
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Seconds between replenished requests
    pub per_second: u64,
    /// Requests allowed back to back
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_second: 10, // One command every 10 seconds
            burst_size: 3,
        }
    }
}

/// Build the governor config for the command routes.
///
/// Peer extraction needs the service to be built with
/// `into_make_service_with_connect_info::<SocketAddr>()`.
pub fn create_governor_config(config: &RateLimitConfig) -> Result<Arc<CommandGovernorConfig>, SettingsError> {
    GovernorConfigBuilder::default()
        .per_second(config.per_second)
        .burst_size(config.burst_size)
        .use_headers()
        .finish()
        .map(Arc::new)
        .ok_or(SettingsError::RateLimit {
            per_second: config.per_second,
            burst_size: config.burst_size,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RateLimitConfig::default();
        assert_eq!(config.per_second, 10);
        assert_eq!(config.burst_size, 3);
        assert!(create_governor_config(&config).is_ok());
    }

    #[test]
    fn test_zero_burst_rejected() {
        let config = RateLimitConfig {
            per_second: 1,
            burst_size: 0,
        };
        assert!(matches!(
            create_governor_config(&config),
            Err(SettingsError::RateLimit { burst_size: 0, .. })
        ));
    }
}
