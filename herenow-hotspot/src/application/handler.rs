//! here-now 消息处理器
//!
//! | type  | subtype                   | text                                  |
//! |-------|---------------------------|---------------------------------------|
//! | `map` | `byPosition`              | `{latitude, longitude}`               |
//! | `map` | `getHotspotsByBoundaries` | `{northEast:{..}, southWest:{..}}`    |
//!
//! 回复为热点数组的 JSON。

use std::sync::Arc;

use async_trait::async_trait;
use herenow_core::error::{HereNowError, Result};
use herenow_core::feature::FeatureHandler;
use tracing::debug;

use crate::domain::{Boundaries, HotspotRepository, Location};

pub const HERE_NOW_APP_ID: &str = "here-now";

pub struct HereNowHandler {
    repository: Arc<dyn HotspotRepository>,
    nearby_radius_meters: f64,
}

impl HereNowHandler {
    pub fn new(repository: Arc<dyn HotspotRepository>, nearby_radius_meters: f64) -> Self {
        Self {
            repository,
            nearby_radius_meters,
        }
    }
}

#[async_trait]
impl FeatureHandler for HereNowHandler {
    fn app_id(&self) -> &str {
        HERE_NOW_APP_ID
    }

    async fn handle(&self, user_id: &str, kind: &str, subtype: &str, text: &str) -> Result<String> {
        if kind != "map" {
            return Err(HereNowError::protocol(format!("Unexpected type: {kind}")));
        }

        let hotspots = match subtype {
            "byPosition" => {
                let position: Location = serde_json::from_str(text).map_err(|err| {
                    HereNowError::bad_request(format!("Error parsing location string: {err}"))
                })?;
                self.repository
                    .nearby(user_id, position, self.nearby_radius_meters)
                    .await?
            }
            "getHotspotsByBoundaries" => {
                let boundaries: Boundaries = serde_json::from_str(text).map_err(|err| {
                    HereNowError::bad_request(format!("Error parsing boundaries string: {err}"))
                })?;
                self.repository.within_boundaries(user_id, boundaries).await?
            }
            other => {
                return Err(HereNowError::protocol(format!("Unexpected subtype: {other}")));
            }
        };

        debug!(user_id = %user_id, subtype = %subtype, found = hotspots.len(), "hotspots found");
        serde_json::to_string(&hotspots).map_err(|err| HereNowError::internal(err.to_string()))
    }
}
