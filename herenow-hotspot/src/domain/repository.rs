use async_trait::async_trait;
use herenow_core::error::Result;

use super::{Boundaries, Hotspot, Location};

/// 热点查询
///
/// 只返回启用、当前处于有效时间窗内、公开或属于 `user_id` 的热点
#[async_trait]
pub trait HotspotRepository: Send + Sync {
    /// `position` 半径 `radius_meters` 米内的热点
    async fn nearby(&self, user_id: &str, position: Location, radius_meters: f64) -> Result<Vec<Hotspot>>;

    /// 矩形范围内的热点
    async fn within_boundaries(&self, user_id: &str, boundaries: Boundaries) -> Result<Vec<Hotspot>>;
}
