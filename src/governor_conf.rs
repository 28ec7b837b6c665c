use crate::server::rate_limiter::ClientIpExtractor;
use anyhow::anyhow;
use governor::middleware::NoOpMiddleware;
use tower_governor::governor::{GovernorConfig, GovernorConfigBuilder};

/// One request replenished per second, `burst` requests allowed at once, per
/// client IP.
pub fn get_governor_conf(
    burst: u32,
) -> Result<GovernorConfig<ClientIpExtractor, NoOpMiddleware>, anyhow::Error> {
    GovernorConfigBuilder::default()
        .per_second(1)
        .burst_size(burst.max(1))
        .key_extractor(ClientIpExtractor)
        .finish()
        .ok_or_else(|| anyhow!("invalid rate limit configuration (burst {})", burst))
}
