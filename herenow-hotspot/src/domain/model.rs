use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

/// 地图可视范围
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Boundaries {
    pub north_east: Location,
    pub south_west: Location,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hotspot {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: String,
    pub owner: String,
    pub owned_by_me: bool,
    pub enabled: bool,
    pub private: bool,
    pub position: Location,
    pub start_time: String,
    pub end_time: String,
    pub likes: i64,
    pub liked_by_me: bool,
    pub subscriptions: i64,
    pub subscribed: bool,
    pub created: String,
    pub updated: String,
}
