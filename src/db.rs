use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{CancellationResponse, FollowupResponse, RecordId};
use crate::store::{Collection, ResponseStore, Responses, StoreError, StoredDocument};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Postgres-backed document store; every collection shares one jsonb table.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResponseStore for PgStore {
    async fn append(&self, collection: Collection, document: Value) -> Result<RecordId, StoreError> {
        let id: Uuid = sqlx::query(
            r#"
            INSERT INTO feedback.documents (id, collection, body)
            VALUES ($1, $2, $3)
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(collection.name())
        .bind(&document)
        .fetch_one(&self.pool)
        .await?
        .get("id");

        Ok(id)
    }

    async fn list_all(&self, collection: Collection) -> Result<Vec<StoredDocument>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, body, created_at FROM feedback.documents WHERE collection = $1",
        )
        .bind(collection.name())
        .fetch_all(&self.pool)
        .await?;

        let mut documents = Vec::with_capacity(rows.len());
        for row in rows {
            documents.push(StoredDocument {
                id: row.get("id"),
                created_at: row.get("created_at"),
                body: row.get("body"),
            });
        }

        Ok(documents)
    }

    async fn delete_all(&self, collection: Collection) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM feedback.documents WHERE collection = $1")
            .bind(collection.name())
            .execute(&self.pool)
            .await?;
        tracing::info!(
            collection = collection.name(),
            deleted = result.rows_affected(),
            "collection cleared"
        );
        Ok(())
    }
}

pub async fn seed(store: &dyn ResponseStore) -> anyhow::Result<()> {
    let now = Utc::now();
    let responses = Responses::new(store);

    let cancellations = vec![
        (true, true, false, "Precio", 1),
        (true, false, true, "Precio", 3),
        (false, true, false, "Servicio", 9),
        (false, false, true, "Cambio de fechas", 35),
    ];

    for (proposal_adjusted, attention_met, found_alternative, reason, days_ago) in cancellations {
        responses
            .append_cancellation(&CancellationResponse {
                id: Uuid::nil(),
                submitted_at: days_before(now, days_ago),
                proposal_adjusted,
                attention_met,
                found_alternative,
                main_reason: reason.to_string(),
                contact_name: None,
                contact_phone: None,
                device_id: None,
            })
            .await
            .context("failed to seed cancellation response")?;
    }

    let followups = vec![
        ("Precio", true, "Excelente", true, false, Some(("Avery Lee", "5551234567")), 2),
        ("Ubicación", false, "Buena", false, false, None, 6),
        ("Precio", true, "Regular", false, true, Some(("Jules Moreno", "5559876543")), 20),
    ];

    for (aspect, adjust, attention, visit, contact_24h, contact, days_ago) in followups {
        responses
            .append_followup(&FollowupResponse {
                id: Uuid::nil(),
                submitted_at: days_before(now, days_ago),
                blocking_aspect: aspect.to_string(),
                wants_adjustment: adjust,
                team_attention: attention.to_string(),
                wants_visit_or_call: visit,
                wants_contact_24h: contact_24h,
                contact_name: contact.map(|(name, _)| name.to_string()),
                contact_phone: contact.map(|(_, phone)| phone.to_string()),
                device_id: None,
            })
            .await
            .context("failed to seed follow-up response")?;
    }

    Ok(())
}

fn days_before(now: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    now - Duration::days(days)
}
