//! # 热点仓储实现（PostgreSQL + PostGIS）

use std::sync::Arc;

use async_trait::async_trait;
use herenow_core::database::{DatabaseHandle, qualified_table};
use herenow_core::error::{ErrorCode, InfraResultExt, Result};
use sqlx::FromRow;
use tracing::debug;

use crate::domain::{Boundaries, Hotspot, HotspotRepository, Location};

#[derive(FromRow)]
struct HotspotRow {
    id: String,
    name: String,
    description: String,
    category: String,
    owner: String,
    owned_by_me: bool,
    enabled: bool,
    private: bool,
    latitude: f64,
    longitude: f64,
    start_time: String,
    end_time: String,
    likes: i64,
    liked_by_me: bool,
    subscriptions: i64,
    subscribed: bool,
    created: String,
    updated: String,
}

impl From<HotspotRow> for Hotspot {
    fn from(row: HotspotRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            description: row.description,
            category: row.category,
            owner: row.owner,
            owned_by_me: row.owned_by_me,
            enabled: row.enabled,
            private: row.private,
            position: Location {
                latitude: row.latitude,
                longitude: row.longitude,
            },
            start_time: row.start_time,
            end_time: row.end_time,
            likes: row.likes,
            liked_by_me: row.liked_by_me,
            subscriptions: row.subscriptions,
            subscribed: row.subscribed,
            created: row.created,
            updated: row.updated,
        }
    }
}

pub struct PostgresHotspotRepository {
    database: Arc<DatabaseHandle>,
    schema: String,
}

impl PostgresHotspotRepository {
    pub fn new(database: Arc<DatabaseHandle>, schema: impl Into<String>) -> Self {
        Self {
            database,
            schema: schema.into(),
        }
    }

    /// 公共查询：`$1` 为当前用户，`spatial` 为空间过滤条件
    fn select(&self, spatial: &str) -> Result<String> {
        let hotspots = qualified_table(&self.schema, "HOTSPOTS")?;
        let likes = qualified_table(&self.schema, "LIKES")?;
        let subscriptions = qualified_table(&self.schema, "SUBSCRIPTIONS")?;

        Ok(format!(
            "SELECT h.id::text AS id, \
                    h.name::text AS name, \
                    COALESCE(h.description::text, '') AS description, \
                    COALESCE(h.category::text, '') AS category, \
                    h.owner::text AS owner, \
                    (h.owner::text = $1) AS owned_by_me, \
                    h.enabled, h.private, \
                    ST_Y(h.position::geometry) AS latitude, \
                    ST_X(h.position::geometry) AS longitude, \
                    COALESCE(h.start_time::text, '') AS start_time, \
                    COALESCE(h.end_time::text, '') AS end_time, \
                    (SELECT COUNT(*) FROM {likes} l WHERE l.hotspot_id = h.id) AS likes, \
                    EXISTS(SELECT 1 FROM {likes} l WHERE l.hotspot_id = h.id AND l.user_id::text = $1) AS liked_by_me, \
                    (SELECT COUNT(*) FROM {subscriptions} s WHERE s.hotspot_id = h.id) AS subscriptions, \
                    EXISTS(SELECT 1 FROM {subscriptions} s WHERE s.hotspot_id = h.id AND s.user_id::text = $1) AS subscribed, \
                    COALESCE(h.created::text, '') AS created, \
                    COALESCE(h.updated::text, '') AS updated \
             FROM {hotspots} h \
             WHERE {spatial} \
               AND NOW() BETWEEN h.start_time AND h.end_time \
               AND h.enabled = true \
               AND (h.private = false OR h.owner::text = $1)"
        ))
    }
}

#[async_trait]
impl HotspotRepository for PostgresHotspotRepository {
    async fn nearby(&self, user_id: &str, position: Location, radius_meters: f64) -> Result<Vec<Hotspot>> {
        let pool = self.database.require().await?;
        let query = self.select(
            "ST_DWithin(h.position::geography, ST_SetSRID(ST_MakePoint($2, $3), 4326)::geography, $4)",
        )?;

        let rows = sqlx::query_as::<_, HotspotRow>(&query)
            .bind(user_id)
            .bind(position.longitude)
            .bind(position.latitude)
            .bind(radius_meters)
            .fetch_all(&pool)
            .await
            .into_herenow(ErrorCode::StoreError, "failed to query nearby hotspots")?;

        debug!(user_id = %user_id, count = rows.len(), "Loaded nearby hotspots");
        Ok(rows.into_iter().map(Hotspot::from).collect())
    }

    async fn within_boundaries(&self, user_id: &str, boundaries: Boundaries) -> Result<Vec<Hotspot>> {
        let pool = self.database.require().await?;
        let query = self.select(
            "ST_Contains(ST_MakeEnvelope($2, $3, $4, $5, 4326), h.position::geometry)",
        )?;

        let rows = sqlx::query_as::<_, HotspotRow>(&query)
            .bind(user_id)
            .bind(boundaries.south_west.longitude)
            .bind(boundaries.south_west.latitude)
            .bind(boundaries.north_east.longitude)
            .bind(boundaries.north_east.latitude)
            .fetch_all(&pool)
            .await
            .into_herenow(ErrorCode::StoreError, "failed to query hotspots in boundaries")?;

        debug!(user_id = %user_id, count = rows.len(), "Loaded hotspots in boundaries");
        Ok(rows.into_iter().map(Hotspot::from).collect())
    }
}
