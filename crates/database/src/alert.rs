//! Service alerts per locality.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::error::Result;
use crate::models::{timestamp, AlertKind, ServiceAlert};

/// Publish an alert.
pub async fn create_alert(
    pool: &SqlitePool,
    locality: &str,
    kind: AlertKind,
    message: &str,
    starts_at: DateTime<Utc>,
    ends_at: Option<DateTime<Utc>>,
) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO service_alerts (locality, kind, message, starts_at, ends_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(locality)
    .bind(kind)
    .bind(message)
    .bind(timestamp(starts_at))
    .bind(ends_at.map(timestamp))
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Alerts active at `now`, optionally restricted to one locality
/// (case-insensitive).
pub async fn active_alerts(
    pool: &SqlitePool,
    locality: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Vec<ServiceAlert>> {
    let now = timestamp(now);
    let locality = locality.map(str::trim).filter(|l| !l.is_empty());

    let alerts = sqlx::query_as::<_, ServiceAlert>(
        r#"
        SELECT id, locality, kind, message, starts_at, ends_at
        FROM service_alerts
        WHERE starts_at <= ?1
          AND (ends_at IS NULL OR ends_at >= ?1)
          AND (?2 IS NULL OR lower(locality) = lower(?2))
        ORDER BY starts_at DESC, id DESC
        "#,
    )
    .bind(&now)
    .bind(locality)
    .fetch_all(pool)
    .await?;

    Ok(alerts)
}
