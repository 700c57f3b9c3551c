//! Ticket persistence.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{map_insert_error, DatabaseError, Result};
use crate::folio::FolioGenerator;
use crate::models::{timestamp, NewTicket, Ticket, TicketStatus, TicketUpdate, DEFAULT_CHANNEL};

const TICKET_COLUMNS: &str = "id, folio, category, title, description, status, priority, \
     contract_number, client_name, client_email, location, channel, notes, \
     created_at, updated_at, resolved_at";

/// Insert a ticket under an already computed folio.
///
/// Fails with [`DatabaseError::AlreadyExists`] when the folio is taken.
pub async fn insert_ticket(
    pool: &SqlitePool,
    folio: &str,
    new: &NewTicket,
    now: DateTime<Utc>,
) -> Result<Ticket> {
    let id = Uuid::new_v4().to_string();
    let created_at = timestamp(now);
    let channel = new.channel.as_deref().unwrap_or(DEFAULT_CHANNEL);

    sqlx::query(
        r#"
        INSERT INTO tickets (
            id, folio, category, title, description, status, priority,
            contract_number, client_name, client_email, location, channel,
            notes, created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, 'open', ?, ?, ?, ?, ?, ?, '', ?, ?)
        "#,
    )
    .bind(&id)
    .bind(folio)
    .bind(new.category)
    .bind(&new.title)
    .bind(&new.description)
    .bind(new.priority)
    .bind(&new.contract_number)
    .bind(&new.client_name)
    .bind(&new.client_email)
    .bind(&new.location)
    .bind(channel)
    .bind(&created_at)
    .bind(&created_at)
    .execute(pool)
    .await
    .map_err(|e| map_insert_error(e, "Ticket", folio))?;

    get_ticket_by_folio(pool, folio).await
}

/// Create a ticket, assigning the next folio for its category and day.
///
/// A folio taken by a concurrent insert is recomputed, up to the
/// generator's attempt limit.
pub async fn create_ticket(
    pool: &SqlitePool,
    generator: &FolioGenerator,
    new: &NewTicket,
    now: DateTime<Utc>,
) -> Result<Ticket> {
    let mut last_conflict = None;

    for attempt in 1..=generator.max_attempts() {
        let folio = generator.next(pool, new.category, now).await?;
        match insert_ticket(pool, &folio, new, now).await {
            Ok(ticket) => {
                info!(folio = %ticket.folio, category = new.category.as_str(), "Ticket created");
                return Ok(ticket);
            }
            Err(DatabaseError::AlreadyExists { id, .. }) => {
                debug!(folio = %id, attempt, "Folio taken, recomputing");
                last_conflict = Some(id);
            }
            Err(e) => return Err(e),
        }
    }

    let id = last_conflict.unwrap_or_else(|| generator.prefix(new.category, now));
    warn!(folio = %id, attempts = generator.max_attempts(), "Gave up allocating a folio");
    Err(DatabaseError::AlreadyExists {
        entity: "Ticket",
        id,
    })
}

/// Get a ticket by folio.
pub async fn get_ticket_by_folio(pool: &SqlitePool, folio: &str) -> Result<Ticket> {
    sqlx::query_as::<_, Ticket>(&format!(
        "SELECT {} FROM tickets WHERE folio = ?",
        TICKET_COLUMNS
    ))
    .bind(folio.trim())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| DatabaseError::NotFound {
        entity: "Ticket",
        id: folio.to_string(),
    })
}

/// List tickets for a contract, newest first.
pub async fn list_tickets_by_contract(
    pool: &SqlitePool,
    contract_number: &str,
    limit: i64,
) -> Result<Vec<Ticket>> {
    let tickets = sqlx::query_as::<_, Ticket>(&format!(
        "SELECT {} FROM tickets WHERE contract_number = ? ORDER BY created_at DESC, folio DESC LIMIT ?",
        TICKET_COLUMNS
    ))
    .bind(contract_number.trim())
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(tickets)
}

/// Apply a partial update to a ticket.
///
/// Terminal tickets (closed, cancelled) reject every change. Moving to
/// `resolved` stamps `resolved_at`; notes are appended as timestamped lines.
pub async fn update_ticket(
    pool: &SqlitePool,
    folio: &str,
    update: &TicketUpdate,
    now: DateTime<Utc>,
) -> Result<Ticket> {
    let current = get_ticket_by_folio(pool, folio).await?;

    if current.status.is_terminal() {
        return Err(DatabaseError::InvalidState {
            entity: "Ticket",
            id: current.folio,
            reason: format!("ticket is {} and can no longer change", current.status.as_str()),
        });
    }

    if update.is_empty() {
        return Ok(current);
    }

    let updated_at = timestamp(now);
    let status = update.status.unwrap_or(current.status);
    let priority = update.priority.unwrap_or(current.priority);

    let resolved_at = if status == TicketStatus::Resolved && current.status != TicketStatus::Resolved
    {
        Some(updated_at.clone())
    } else {
        current.resolved_at.clone()
    };

    let mut notes = current.notes.clone();
    if let Some(note) = update.note.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
        notes.push_str(&format!("[{}] {}\n", updated_at, note));
    }

    sqlx::query(
        r#"
        UPDATE tickets
        SET status = ?, priority = ?, notes = ?, resolved_at = ?, updated_at = ?
        WHERE folio = ?
        "#,
    )
    .bind(status)
    .bind(priority)
    .bind(&notes)
    .bind(&resolved_at)
    .bind(&updated_at)
    .bind(&current.folio)
    .execute(pool)
    .await?;

    debug!(folio = %current.folio, status = status.as_str(), "Ticket updated");
    get_ticket_by_folio(pool, &current.folio).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::folio::is_valid_folio;
    use crate::models::{TicketCategory, TicketPriority};
    use crate::Database;
    use chrono::{Duration, TimeZone};
    use std::collections::HashSet;

    async fn test_db() -> Database {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db.migrate().await.unwrap();
        db
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 18, 0, 0).unwrap()
    }

    fn new_ticket(contract: &str) -> NewTicket {
        NewTicket {
            category: TicketCategory::Payment,
            title: "Pago no reflejado".into(),
            description: "Pagué el día 3 y sigue apareciendo adeudo".into(),
            contract_number: Some(contract.into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let db = test_db().await;
        let generator = FolioGenerator::default();

        let ticket = create_ticket(db.pool(), &generator, &new_ticket("123456"), now())
            .await
            .unwrap();
        assert!(is_valid_folio(&ticket.folio));
        assert_eq!(ticket.status, TicketStatus::Open);
        assert_eq!(ticket.priority, TicketPriority::Medium);
        assert_eq!(ticket.channel, "whatsapp");
        assert!(ticket.resolved_at.is_none());

        let fetched = get_ticket_by_folio(db.pool(), &ticket.folio).await.unwrap();
        assert_eq!(fetched, ticket);
    }

    #[tokio::test]
    async fn test_duplicate_folio_rejected() {
        let db = test_db().await;
        insert_ticket(db.pool(), "PAG-20240501-0001", &new_ticket("1"), now())
            .await
            .unwrap();
        let err = insert_ticket(db.pool(), "PAG-20240501-0001", &new_ticket("2"), now())
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_list_by_contract() {
        let db = test_db().await;
        let generator = FolioGenerator::default();

        assert!(list_tickets_by_contract(db.pool(), "123456", 10)
            .await
            .unwrap()
            .is_empty());

        create_ticket(db.pool(), &generator, &new_ticket("123456"), now())
            .await
            .unwrap();
        create_ticket(db.pool(), &generator, &new_ticket("123456"), now() + Duration::minutes(5))
            .await
            .unwrap();
        create_ticket(db.pool(), &generator, &new_ticket("999999"), now())
            .await
            .unwrap();

        let tickets = list_tickets_by_contract(db.pool(), "123456", 10).await.unwrap();
        assert_eq!(tickets.len(), 2);
        assert_eq!(tickets[0].folio, "PAG-20240501-0002");
    }

    #[tokio::test]
    async fn test_partial_update() {
        let db = test_db().await;
        let generator = FolioGenerator::default();
        let ticket = create_ticket(db.pool(), &generator, &new_ticket("1"), now())
            .await
            .unwrap();

        let update = TicketUpdate {
            priority: Some(TicketPriority::High),
            note: Some("Cliente envió comprobante".into()),
            ..Default::default()
        };
        let updated = update_ticket(db.pool(), &ticket.folio, &update, now())
            .await
            .unwrap();
        assert_eq!(updated.status, TicketStatus::Open);
        assert_eq!(updated.priority, TicketPriority::High);
        assert!(updated.notes.contains("Cliente envió comprobante"));
        assert_eq!(updated.title, ticket.title);

        let resolve = TicketUpdate {
            status: Some(TicketStatus::Resolved),
            ..Default::default()
        };
        let resolved = update_ticket(db.pool(), &ticket.folio, &resolve, now())
            .await
            .unwrap();
        assert_eq!(resolved.status, TicketStatus::Resolved);
        assert!(resolved.resolved_at.is_some());
        assert_eq!(resolved.priority, TicketPriority::High);
    }

    #[tokio::test]
    async fn test_terminal_ticket_rejects_updates() {
        let db = test_db().await;
        let generator = FolioGenerator::default();
        let ticket = create_ticket(db.pool(), &generator, &new_ticket("1"), now())
            .await
            .unwrap();

        let cancel = TicketUpdate {
            status: Some(TicketStatus::Cancelled),
            ..Default::default()
        };
        update_ticket(db.pool(), &ticket.folio, &cancel, now())
            .await
            .unwrap();

        let reopen = TicketUpdate {
            status: Some(TicketStatus::Open),
            ..Default::default()
        };
        let err = update_ticket(db.pool(), &ticket.folio, &reopen, now())
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn test_update_unknown_folio() {
        let db = test_db().await;
        let err = update_ticket(db.pool(), "FUG-20240101-0001", &TicketUpdate::default(), now())
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_closed_pool_is_unavailable() {
        let db = test_db().await;
        db.close().await;
        let err = create_ticket(
            db.pool(),
            &FolioGenerator::default(),
            &new_ticket("1"),
            now(),
        )
        .await
        .unwrap_err();
        assert!(err.is_unavailable(), "{err:?}");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_creation_yields_distinct_folios() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}?mode=rwc", dir.path().join("desk.db").display());
        let db = Database::connect(&url).await.unwrap();
        db.migrate().await.unwrap();
        let generator = FolioGenerator::default();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let pool = db.pool().clone();
            handles.push(tokio::spawn(async move {
                create_ticket(&pool, &generator, &new_ticket("123456"), now()).await
            }));
        }

        let mut folios = HashSet::new();
        for handle in handles {
            let ticket = handle.await.unwrap().unwrap();
            assert!(is_valid_folio(&ticket.folio));
            folios.insert(ticket.folio);
        }
        assert_eq!(folios.len(), 8);

        let stored: i64 = sqlx::query_scalar("SELECT COUNT(DISTINCT folio) FROM tickets")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(stored, 8);
    }
}
