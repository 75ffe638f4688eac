use sqlx::Row;

use unibox_core::domain::interaction::TenantId;
use unibox_core::sla::TenantSlaOverrides;

use super::{RepositoryError, SlaOverrideRepository};
use crate::DbPool;

pub struct SqlSlaOverrideRepository {
    pool: DbPool,
}

impl SqlSlaOverrideRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl SlaOverrideRepository for SqlSlaOverrideRepository {
    async fn get(&self, tenant: &TenantId) -> Result<Option<TenantSlaOverrides>, RepositoryError> {
        let row = sqlx::query(
            "SELECT overrides_json FROM tenant_sla_overrides WHERE tenant_id = ?",
        )
        .bind(&tenant.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            let raw = row.try_get::<String, _>("overrides_json")?;
            serde_json::from_str(&raw)
                .map_err(|error| RepositoryError::Decode(format!("overrides decode: {error}")))
        })
        .transpose()
    }

    async fn set(
        &self,
        tenant: &TenantId,
        overrides: &TenantSlaOverrides,
    ) -> Result<(), RepositoryError> {
        let overrides_json = serde_json::to_string(overrides)
            .map_err(|error| RepositoryError::Decode(format!("overrides encode: {error}")))?;

        sqlx::query(
            "INSERT INTO tenant_sla_overrides (tenant_id, overrides_json, updated_at)
             VALUES (?, ?, datetime('now'))
             ON CONFLICT(tenant_id) DO UPDATE SET
                overrides_json = excluded.overrides_json,
                updated_at = excluded.updated_at",
        )
        .bind(&tenant.0)
        .bind(&overrides_json)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
