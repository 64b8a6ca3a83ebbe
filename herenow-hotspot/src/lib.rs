//! here-now 热点功能
//!
//! 通过长连接消息查询附近或地图可视范围内的热点

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::HereNowHandler;
pub use domain::{Boundaries, Hotspot, HotspotRepository, Location};
pub use infrastructure::PostgresHotspotRepository;
