//! # 用户目录仓储实现
//!
//! 用户、角色、权限保存在 PostgreSQL 中；密码比对使用数据库的 `crypt()`。

use std::sync::Arc;

use async_trait::async_trait;
use herenow_core::database::DatabaseHandle;
use herenow_core::error::{ErrorCode, InfraResultExt, Result};
use tracing::debug;

use crate::domain::{UserDirectory, UserRecord};

type UserRow = (String, String, Option<bool>, Option<String>, Option<String>);

pub struct PostgresUserDirectory {
    database: Arc<DatabaseHandle>,
}

impl PostgresUserDirectory {
    pub fn new(database: Arc<DatabaseHandle>) -> Self {
        Self { database }
    }
}

#[async_trait]
impl UserDirectory for PostgresUserDirectory {
    async fn verify_credentials(&self, email: &str, password: &str) -> Result<Option<UserRecord>> {
        let pool = self.database.require().await?;
        let users = self.database.table("users")?;
        let user_roles = self.database.table("user_roles")?;
        let roles_privileges = self.database.table("roles_privileges")?;

        let query = format!(
            "SELECT u.id::text, u.name::text, \
                    (u.password = crypt($1, u.password)) AS password_match, \
                    STRING_AGG(DISTINCT ur.roles::text, ', ') AS roles, \
                    STRING_AGG(DISTINCT rp.id_privilege::text, ', ') AS privileges \
             FROM {users} u \
             JOIN {user_roles} ur ON u.id = ur.user_id \
             LEFT JOIN {roles_privileges} rp ON ur.roles = rp.id_role \
             WHERE LOWER(u.email) = LOWER($2) AND u.status = 'enabled' \
             GROUP BY u.id"
        );

        let row = sqlx::query_as::<_, UserRow>(&query)
            .bind(password)
            .bind(email)
            .fetch_optional(&pool)
            .await
            .into_herenow(ErrorCode::StoreError, "failed to query user")?;

        debug!(email = %email, found = row.is_some(), "Checked user credentials");

        Ok(row.map(|(id, name, password_match, roles, privileges)| UserRecord {
            id,
            name,
            password_match: password_match.unwrap_or(false),
            roles: roles.unwrap_or_default(),
            privileges: privileges.unwrap_or_default(),
        }))
    }

    async fn touch_last_access(&self, user_id: &str) -> Result<()> {
        let pool = self.database.require().await?;
        let users = self.database.table("users")?;

        sqlx::query(&format!(
            "UPDATE {users} SET last_access = now(), updated = now() WHERE id::text = $1"
        ))
        .bind(user_id)
        .execute(&pool)
        .await
        .into_herenow(ErrorCode::StoreError, "failed to update last access")?;

        debug!(user_id = %user_id, "Updated last access");
        Ok(())
    }
}
