use herenow_core::config::HereNowAppConfig;

/// 网关运行配置（从应用配置中提取）
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub service_name: String,
    pub version: String,
    pub listen_addr: String,
    pub session_store_redis_url: Option<String>,
    pub session_key_prefix: String,
    pub session_ttl_seconds: Option<u64>,
    pub guest_ttl_seconds: u64,
    pub hotspot_schema: String,
    pub nearby_radius_meters: f64,
}

impl GatewayConfig {
    pub fn from_app_config(app: &HereNowAppConfig) -> Self {
        Self {
            service_name: app.service.name.clone(),
            version: app.service.version.clone(),
            listen_addr: app.listen_addr(),
            session_store_redis_url: app.redis.url.clone().filter(|url| !url.is_empty()),
            session_key_prefix: app.redis.key_prefix().to_string(),
            session_ttl_seconds: app.redis.ttl_seconds,
            guest_ttl_seconds: app.auth.guest_ttl_seconds(),
            hotspot_schema: app.hotspot.schema().to_string(),
            nearby_radius_meters: app.hotspot.nearby_radius_meters(),
        }
    }
}
