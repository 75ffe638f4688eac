use std::collections::BTreeMap;

use sqlx::{sqlite::SqliteRow, Row};

use unibox_core::domain::event::InteractionEvent;
use unibox_core::domain::interaction::InteractionId;

use super::interaction::parse_timestamp;
use super::{EventRepository, RepositoryError};
use crate::DbPool;

pub struct SqlEventRepository {
    pool: DbPool,
}

impl SqlEventRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl EventRepository for SqlEventRepository {
    async fn append(&self, event: InteractionEvent) -> Result<(), RepositoryError> {
        let detail_json = serde_json::to_string(&event.detail)
            .map_err(|error| RepositoryError::Decode(format!("detail encode: {error}")))?;

        sqlx::query(
            "INSERT INTO interaction_events (
                event_id,
                interaction_id,
                event_type,
                actor,
                detail_json,
                occurred_at
             ) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&event.event_id)
        .bind(&event.interaction_id.0)
        .bind(&event.event_type)
        .bind(&event.actor)
        .bind(&detail_json)
        .bind(event.occurred_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_for_interaction(
        &self,
        interaction_id: &InteractionId,
    ) -> Result<Vec<InteractionEvent>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT event_id, interaction_id, event_type, actor, detail_json, occurred_at
             FROM interaction_events
             WHERE interaction_id = ?
             ORDER BY occurred_at ASC, event_id ASC",
        )
        .bind(&interaction_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(event_from_row).collect()
    }
}

fn event_from_row(row: SqliteRow) -> Result<InteractionEvent, RepositoryError> {
    let detail_raw = row.try_get::<String, _>("detail_json")?;
    let detail: BTreeMap<String, String> = serde_json::from_str(&detail_raw)
        .map_err(|error| RepositoryError::Decode(format!("detail decode: {error}")))?;

    Ok(InteractionEvent {
        event_id: row.try_get("event_id")?,
        interaction_id: InteractionId(row.try_get("interaction_id")?),
        event_type: row.try_get("event_type")?,
        actor: row.try_get("actor")?,
        detail,
        occurred_at: parse_timestamp("occurred_at", row.try_get("occurred_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};

    use unibox_core::domain::event::InteractionEvent;
    use unibox_core::domain::interaction::{
        Channel, ExtensionBag, IdentityKey, Interaction, InteractionId, InteractionStatus,
        Marketplace, Priority, TenantId,
    };

    use super::SqlEventRepository;
    use crate::migrations;
    use crate::repositories::{EventRepository, InteractionRepository, SqlInteractionRepository};
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

    fn parse_ts(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).expect("valid rfc3339").with_timezone(&Utc)
    }

    async fn insert_interaction(pool: &DbPool, id: &str) {
        let occurred_at = parse_ts("2026-08-20T09:00:00Z");
        let interaction = Interaction {
            id: InteractionId(id.to_string()),
            identity: IdentityKey {
                tenant_id: TenantId("t-1".to_string()),
                marketplace: Marketplace("testmart".to_string()),
                channel: Channel::Chat,
                external_id: format!("ext-{id}"),
            },
            customer_id: None,
            order_id: None,
            product_id: None,
            thread_id: None,
            subject: None,
            text: Some("hello".to_string()),
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
        };
        SqlInteractionRepository::new(pool.clone()).save(interaction).await.expect("save");
    }

    #[tokio::test]
    async fn appended_events_list_back_in_order() {
        let pool = setup_pool().await;
        insert_interaction(&pool, "int-1").await;
        let repo = SqlEventRepository::new(pool.clone());
        let interaction_id = InteractionId("int-1".to_string());

        let mut first = InteractionEvent::new(interaction_id.clone(), "created", "sync")
            .with_detail("channel", "chat");
        first.occurred_at = parse_ts("2026-08-20T09:00:00Z");
        let mut second = InteractionEvent::new(interaction_id.clone(), "reply_sent", "reply-path");
        second.occurred_at = parse_ts("2026-08-20T09:05:00Z");

        repo.append(first.clone()).await.expect("append first");
        repo.append(second.clone()).await.expect("append second");

        let events = repo.list_for_interaction(&interaction_id).await.expect("list");
        assert_eq!(events, vec![first, second]);

        pool.close().await;
    }

    #[tokio::test]
    async fn events_require_an_existing_interaction() {
        let pool = setup_pool().await;
        let repo = SqlEventRepository::new(pool.clone());

        let orphan =
            InteractionEvent::new(InteractionId("missing".to_string()), "created", "sync");
        assert!(repo.append(orphan).await.is_err());

        pool.close().await;
    }
}
