//! Incident persistence.

use chrono::{DateTime, FixedOffset, Utc};
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

use crate::error::{map_insert_error, DatabaseError, Result};
use crate::models::{timestamp, Incident, IncidentStatus, NewIncident, DEFAULT_CHANNEL};

const INCIDENT_COLUMNS: &str = "id, category, description, severity, status, latitude, longitude, \
     address, locality, contract_number, reporter_name, reporter_phone, channel, \
     created_at, updated_at";

/// Build an incident identifier: `INC-{YYYYMMDD}-{8 hex chars}`.
pub fn incident_id(now: DateTime<Utc>, offset: FixedOffset) -> String {
    let short = Uuid::new_v4().simple().to_string()[..8].to_uppercase();
    format!(
        "INC-{}-{}",
        now.with_timezone(&offset).format("%Y%m%d"),
        short
    )
}

/// Record a new incident in `pending` status.
pub async fn create_incident(
    pool: &SqlitePool,
    new: &NewIncident,
    now: DateTime<Utc>,
    offset: FixedOffset,
) -> Result<Incident> {
    let id = incident_id(now, offset);
    insert_incident(pool, &id, new, now).await
}

/// Record a new incident under an identifier chosen by the caller.
pub async fn insert_incident(
    pool: &SqlitePool,
    id: &str,
    new: &NewIncident,
    now: DateTime<Utc>,
) -> Result<Incident> {
    let created_at = timestamp(now);

    sqlx::query(
        r#"
        INSERT INTO incidents (
            id, category, description, severity, status, latitude, longitude,
            address, locality, contract_number, reporter_name, reporter_phone,
            channel, created_at, updated_at
        )
        VALUES (?, ?, ?, ?, 'pending', ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id)
    .bind(new.category)
    .bind(&new.description)
    .bind(new.severity)
    .bind(new.latitude)
    .bind(new.longitude)
    .bind(&new.address)
    .bind(&new.locality)
    .bind(&new.contract_number)
    .bind(&new.reporter_name)
    .bind(&new.reporter_phone)
    .bind(new.channel.as_deref().unwrap_or(DEFAULT_CHANNEL))
    .bind(&created_at)
    .bind(&created_at)
    .execute(pool)
    .await
    .map_err(|e| map_insert_error(e, "Incident", id))?;

    info!(incident_id = %id, severity = new.severity.as_str(), "Incident recorded");
    get_incident(pool, id).await
}

/// Get an incident by ID.
pub async fn get_incident(pool: &SqlitePool, id: &str) -> Result<Incident> {
    sqlx::query_as::<_, Incident>(&format!(
        "SELECT {} FROM incidents WHERE id = ?",
        INCIDENT_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| DatabaseError::NotFound {
        entity: "Incident",
        id: id.to_string(),
    })
}

/// List incidents reported for a contract or by a phone number, newest first.
pub async fn list_incidents(
    pool: &SqlitePool,
    contract_number: Option<&str>,
    reporter_phone: Option<&str>,
    limit: i64,
) -> Result<Vec<Incident>> {
    let incidents = sqlx::query_as::<_, Incident>(&format!(
        "SELECT {} FROM incidents \
         WHERE (?1 IS NOT NULL AND contract_number = ?1) \
            OR (?2 IS NOT NULL AND reporter_phone = ?2) \
         ORDER BY created_at DESC, id DESC \
         LIMIT ?3",
        INCIDENT_COLUMNS
    ))
    .bind(contract_number)
    .bind(reporter_phone)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(incidents)
}

/// Move an incident forward in its lifecycle.
pub async fn advance_incident(
    pool: &SqlitePool,
    id: &str,
    next: IncidentStatus,
    now: DateTime<Utc>,
) -> Result<Incident> {
    let current = get_incident(pool, id).await?;
    if !current.status.can_advance_to(next) {
        return Err(DatabaseError::InvalidState {
            entity: "Incident",
            id: id.to_string(),
            reason: format!(
                "cannot move from {} to {}",
                current.status.as_str(),
                next.as_str()
            ),
        });
    }

    sqlx::query("UPDATE incidents SET status = ?, updated_at = ? WHERE id = ?")
        .bind(next)
        .bind(timestamp(now))
        .bind(id)
        .execute(pool)
        .await?;

    get_incident(pool, id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IncidentCategory, IncidentSeverity};
    use crate::Database;
    use chrono::{Duration, TimeZone};

    async fn test_db() -> Database {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db.migrate().await.unwrap();
        db
    }

    fn offset() -> FixedOffset {
        FixedOffset::west_opt(6 * 3600).unwrap()
    }

    fn leak(contract: Option<&str>, phone: Option<&str>) -> NewIncident {
        NewIncident {
            category: IncidentCategory::Leak,
            description: "Fuga en la calle".into(),
            severity: IncidentSeverity::Medium,
            latitude: Some(19.43),
            longitude: Some(-99.13),
            address: Some("Calle 5 de Mayo".into()),
            locality: Some("Centro".into()),
            contract_number: contract.map(str::to_string),
            reporter_name: None,
            reporter_phone: phone.map(str::to_string),
            channel: None,
        }
    }

    #[test]
    fn test_incident_id_format() {
        let now = Utc.with_ymd_and_hms(2024, 5, 2, 3, 0, 0).unwrap();
        let id = incident_id(now, offset());
        assert!(id.starts_with("INC-20240501-"), "{id}");
        assert_eq!(id.len(), "INC-20240501-".len() + 8);
    }

    #[tokio::test]
    async fn test_create_and_list() {
        let db = test_db().await;
        let now = Utc::now();
        let created = create_incident(db.pool(), &leak(Some("123456"), None), now, offset())
            .await
            .unwrap();
        assert_eq!(created.status, IncidentStatus::Pending);
        assert_eq!(created.latitude, Some(19.43));

        create_incident(
            db.pool(),
            &leak(None, Some("+5215550001111")),
            now + Duration::seconds(1),
            offset(),
        )
        .await
        .unwrap();

        let by_contract = list_incidents(db.pool(), Some("123456"), None, 10).await.unwrap();
        assert_eq!(by_contract.len(), 1);
        assert_eq!(by_contract[0].id, created.id);

        let by_phone = list_incidents(db.pool(), None, Some("+5215550001111"), 10)
            .await
            .unwrap();
        assert_eq!(by_phone.len(), 1);

        let either = list_incidents(db.pool(), Some("123456"), Some("+5215550001111"), 10)
            .await
            .unwrap();
        assert_eq!(either.len(), 2);

        assert!(list_incidents(db.pool(), None, None, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_status_only_moves_forward() {
        let db = test_db().await;
        let incident = create_incident(db.pool(), &leak(None, None), Utc::now(), offset())
            .await
            .unwrap();

        let acked = advance_incident(db.pool(), &incident.id, IncidentStatus::Acknowledged, Utc::now())
            .await
            .unwrap();
        assert_eq!(acked.status, IncidentStatus::Acknowledged);

        let err = advance_incident(db.pool(), &incident.id, IncidentStatus::Pending, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidState { .. }));
    }
}
