use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use unibox_core::domain::interaction::{
    Channel, ExtensionBag, IdentityKey, Interaction, InteractionId, InteractionStatus,
    Marketplace, Priority, ReplySource, TenantId,
};

use super::{InteractionRepository, RepositoryError};
use crate::DbPool;

const INTERACTION_COLUMNS: &str = "id,
    tenant_id,
    marketplace,
    channel,
    external_id,
    customer_id,
    order_id,
    product_id,
    thread_id,
    subject,
    body,
    rating,
    status,
    priority,
    needs_response,
    source,
    occurred_at,
    last_reply_source,
    last_reply_at,
    extensions_json,
    created_at,
    updated_at";

pub struct SqlInteractionRepository {
    pool: DbPool,
}

impl SqlInteractionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl InteractionRepository for SqlInteractionRepository {
    async fn find_by_id(
        &self,
        id: &InteractionId,
    ) -> Result<Option<Interaction>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {INTERACTION_COLUMNS} FROM interactions WHERE id = ?"
        ))
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(interaction_from_row).transpose()
    }

    async fn find_by_identity(
        &self,
        identity: &IdentityKey,
    ) -> Result<Option<Interaction>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {INTERACTION_COLUMNS} FROM interactions
             WHERE tenant_id = ? AND marketplace = ? AND channel = ? AND external_id = ?"
        ))
        .bind(&identity.tenant_id.0)
        .bind(&identity.marketplace.0)
        .bind(identity.channel.as_str())
        .bind(&identity.external_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(interaction_from_row).transpose()
    }

    async fn save(&self, interaction: Interaction) -> Result<(), RepositoryError> {
        let extensions_json = serde_json::to_string(&interaction.extensions)
            .map_err(|error| RepositoryError::Decode(format!("extensions encode: {error}")))?;

        sqlx::query(
            "INSERT INTO interactions (
                id,
                tenant_id,
                marketplace,
                channel,
                external_id,
                customer_id,
                order_id,
                product_id,
                thread_id,
                subject,
                body,
                rating,
                status,
                priority,
                needs_response,
                source,
                occurred_at,
                last_reply_source,
                last_reply_at,
                extensions_json,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                customer_id = excluded.customer_id,
                order_id = excluded.order_id,
                product_id = excluded.product_id,
                thread_id = excluded.thread_id,
                subject = excluded.subject,
                body = excluded.body,
                rating = excluded.rating,
                status = excluded.status,
                priority = excluded.priority,
                needs_response = excluded.needs_response,
                source = excluded.source,
                occurred_at = excluded.occurred_at,
                last_reply_source = excluded.last_reply_source,
                last_reply_at = excluded.last_reply_at,
                extensions_json = excluded.extensions_json,
                updated_at = excluded.updated_at",
        )
        .bind(&interaction.id.0)
        .bind(&interaction.identity.tenant_id.0)
        .bind(&interaction.identity.marketplace.0)
        .bind(interaction.identity.channel.as_str())
        .bind(&interaction.identity.external_id)
        .bind(interaction.customer_id.as_deref())
        .bind(interaction.order_id.as_deref())
        .bind(interaction.product_id.as_deref())
        .bind(interaction.thread_id.as_deref())
        .bind(interaction.subject.as_deref())
        .bind(interaction.text.as_deref())
        .bind(interaction.rating.map(i64::from))
        .bind(interaction.status.as_str())
        .bind(interaction.priority.as_str())
        .bind(i64::from(interaction.needs_response))
        .bind(&interaction.source)
        .bind(interaction.occurred_at.to_rfc3339())
        .bind(interaction.last_reply_source.as_ref().map(ReplySource::as_str))
        .bind(interaction.last_reply_at.map(|value| value.to_rfc3339()))
        .bind(&extensions_json)
        .bind(interaction.created_at.to_rfc3339())
        .bind(interaction.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_recent(
        &self,
        tenant: &TenantId,
        since: DateTime<Utc>,
    ) -> Result<Vec<Interaction>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {INTERACTION_COLUMNS} FROM interactions
             WHERE tenant_id = ? AND occurred_at >= ?
             ORDER BY occurred_at DESC"
        ))
        .bind(&tenant.0)
        .bind(since.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(interaction_from_row).collect()
    }
}

fn interaction_from_row(row: SqliteRow) -> Result<Interaction, RepositoryError> {
    let channel_raw = row.try_get::<String, _>("channel")?;
    let channel = Channel::parse(&channel_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown channel `{channel_raw}`")))?;

    let status_raw = row.try_get::<String, _>("status")?;
    let status = InteractionStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown status `{status_raw}`")))?;

    let priority_raw = row.try_get::<String, _>("priority")?;
    let priority = Priority::parse(&priority_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown priority `{priority_raw}`")))?;

    let last_reply_source = row
        .try_get::<Option<String>, _>("last_reply_source")?
        .map(|value| {
            ReplySource::parse(&value).ok_or_else(|| {
                RepositoryError::Decode(format!("unknown reply source `{value}`"))
            })
        })
        .transpose()?;

    let extensions_raw = row.try_get::<String, _>("extensions_json")?;
    let extensions: ExtensionBag = serde_json::from_str(&extensions_raw)
        .map_err(|error| RepositoryError::Decode(format!("extensions decode: {error}")))?;

    let rating = row
        .try_get::<Option<i64>, _>("rating")?
        .map(|value| {
            u8::try_from(value).map_err(|_| {
                RepositoryError::Decode(format!("rating out of range: {value}"))
            })
        })
        .transpose()?;

    Ok(Interaction {
        id: InteractionId(row.try_get("id")?),
        identity: IdentityKey {
            tenant_id: TenantId(row.try_get("tenant_id")?),
            marketplace: Marketplace(row.try_get("marketplace")?),
            channel,
            external_id: row.try_get("external_id")?,
        },
        customer_id: row.try_get("customer_id")?,
        order_id: row.try_get("order_id")?,
        product_id: row.try_get("product_id")?,
        thread_id: row.try_get("thread_id")?,
        subject: row.try_get("subject")?,
        text: row.try_get("body")?,
        rating,
        status,
        priority,
        needs_response: row.try_get::<i64, _>("needs_response")? != 0,
        source: row.try_get("source")?,
        occurred_at: parse_timestamp("occurred_at", row.try_get("occurred_at")?)?,
        last_reply_source,
        last_reply_at: parse_optional_timestamp("last_reply_at", row.try_get("last_reply_at")?)?,
        extensions,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

pub(crate) fn parse_timestamp(
    column: &str,
    value: String,
) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|timestamp| parse_timestamp(column, timestamp)).transpose()
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, Utc};

    use unibox_core::domain::interaction::{
        Channel, ExtensionBag, IdentityKey, Interaction, InteractionId, InteractionStatus,
        Marketplace, Priority, ReplySource, TenantId,
    };
    use unibox_core::intent::IntentLabel;

    use super::SqlInteractionRepository;
    use crate::migrations;
    use crate::repositories::InteractionRepository;
    use crate::{connect, DbPool};

    async fn setup_pool() -> DbPool {
        let config = unibox_core::config::DatabaseConfig {
            url: "sqlite::memory:?cache=shared".to_string(),
            max_connections: 1,
            timeout_secs: 30,
        };
        let pool = connect(&config).await.expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    fn sample(id: &str, external_id: &str, occurred_at: DateTime<Utc>) -> Interaction {
        Interaction {
            id: InteractionId(id.to_string()),
            identity: IdentityKey {
                tenant_id: TenantId("t-1".to_string()),
                marketplace: Marketplace("testmart".to_string()),
                channel: Channel::Question,
                external_id: external_id.to_string(),
            },
            customer_id: Some("c-1".to_string()),
            order_id: None,
            product_id: Some("p-9".to_string()),
            thread_id: None,
            subject: None,
            text: Some("Does this fit a 15 inch laptop?".to_string()),
            rating: None,
            status: InteractionStatus::Open,
            priority: Priority::Normal,
            needs_response: true,
            source: "testmart".to_string(),
            occurred_at,
            last_reply_source: None,
            last_reply_at: None,
            extensions: ExtensionBag::default(),
            created_at: occurred_at,
            updated_at: occurred_at,
        }
    }

    fn parse_ts(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).expect("valid rfc3339").with_timezone(&Utc)
    }

    #[tokio::test]
    async fn save_and_find_round_trips_all_fields() {
        let pool = setup_pool().await;
        let repo = SqlInteractionRepository::new(pool.clone());

        let mut interaction = sample("int-1", "Q-100", parse_ts("2026-08-20T09:00:00Z"));
        interaction.extensions.set_intent(IntentLabel::SpecCompatibility);
        interaction.extensions.set_sla_deadline(parse_ts("2026-08-20T21:00:00Z"));

        repo.save(interaction.clone()).await.expect("save");

        let by_id = repo.find_by_id(&interaction.id).await.expect("find by id");
        assert_eq!(by_id, Some(interaction.clone()));

        let by_identity =
            repo.find_by_identity(&interaction.identity).await.expect("find by identity");
        assert_eq!(by_identity, Some(interaction));

        pool.close().await;
    }

    #[tokio::test]
    async fn saving_twice_updates_in_place() {
        let pool = setup_pool().await;
        let repo = SqlInteractionRepository::new(pool.clone());

        let interaction = sample("int-1", "Q-100", parse_ts("2026-08-20T09:00:00Z"));
        repo.save(interaction.clone()).await.expect("save");

        let mut updated = interaction.clone();
        updated.mark_replied_local(parse_ts("2026-08-20T10:00:00Z"));
        repo.save(updated.clone()).await.expect("save again");

        let found = repo.find_by_id(&interaction.id).await.expect("find").expect("exists");
        assert_eq!(found.status, InteractionStatus::Responded);
        assert_eq!(found.last_reply_source, Some(ReplySource::Local));

        let recent = repo
            .list_recent(&interaction.identity.tenant_id, parse_ts("2026-08-01T00:00:00Z"))
            .await
            .expect("list recent");
        assert_eq!(recent.len(), 1);

        pool.close().await;
    }

    #[tokio::test]
    async fn recent_listing_is_tenant_scoped_and_window_bounded() {
        let pool = setup_pool().await;
        let repo = SqlInteractionRepository::new(pool.clone());
        let now = parse_ts("2026-08-20T12:00:00Z");

        repo.save(sample("int-new", "Q-1", now - Duration::days(2))).await.expect("save");
        repo.save(sample("int-old", "Q-2", now - Duration::days(45))).await.expect("save");

        let mut other_tenant = sample("int-other", "Q-3", now - Duration::days(1));
        other_tenant.identity.tenant_id = TenantId("t-2".to_string());
        repo.save(other_tenant).await.expect("save");

        let recent = repo
            .list_recent(&TenantId("t-1".to_string()), now - Duration::days(30))
            .await
            .expect("list recent");
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].id.0, "int-new");

        pool.close().await;
    }
}
