//! Water-delivery orders.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

use crate::error::{map_insert_error, DatabaseError, Result};
use crate::models::{timestamp, NewOrder, Order, OrderStatus};

const ORDER_COLUMNS: &str = "id, contract_number, address, locality, volume_m3, status, notes, \
     cancel_reason, created_at, updated_at";

/// Result of a cancellation request.
#[derive(Debug, Clone, PartialEq)]
pub enum CancelOutcome {
    /// The order was cancelled by this request.
    Cancelled(Order),
    /// The order had already been cancelled; nothing changed.
    AlreadyCancelled(Order),
}

impl CancelOutcome {
    pub fn order(&self) -> &Order {
        match self {
            CancelOutcome::Cancelled(order) | CancelOutcome::AlreadyCancelled(order) => order,
        }
    }
}

/// Place a new order in `pending` status.
pub async fn create_order(pool: &SqlitePool, new: &NewOrder, now: DateTime<Utc>) -> Result<Order> {
    let id = Uuid::new_v4().to_string();
    let created_at = timestamp(now);

    sqlx::query(
        r#"
        INSERT INTO orders (id, contract_number, address, locality, volume_m3, status, notes, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, 'pending', ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&new.contract_number)
    .bind(&new.address)
    .bind(&new.locality)
    .bind(new.volume_m3)
    .bind(&new.notes)
    .bind(&created_at)
    .bind(&created_at)
    .execute(pool)
    .await
    .map_err(|e| map_insert_error(e, "Order", &id))?;

    info!(order_id = %id, contract_number = %new.contract_number, "Order created");
    get_order(pool, &id).await
}

/// Get an order by ID.
pub async fn get_order(pool: &SqlitePool, id: &str) -> Result<Order> {
    sqlx::query_as::<_, Order>(&format!("SELECT {} FROM orders WHERE id = ?", ORDER_COLUMNS))
        .bind(id.trim())
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| DatabaseError::NotFound {
            entity: "Order",
            id: id.to_string(),
        })
}

/// List orders for a contract, newest first.
pub async fn list_orders(pool: &SqlitePool, contract_number: &str, limit: i64) -> Result<Vec<Order>> {
    let orders = sqlx::query_as::<_, Order>(&format!(
        "SELECT {} FROM orders WHERE contract_number = ? ORDER BY created_at DESC, id DESC LIMIT ?",
        ORDER_COLUMNS
    ))
    .bind(contract_number.trim())
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(orders)
}

/// Set an order's status (dispatch side).
pub async fn set_order_status(
    pool: &SqlitePool,
    id: &str,
    status: OrderStatus,
    now: DateTime<Utc>,
) -> Result<Order> {
    let result = sqlx::query("UPDATE orders SET status = ?, updated_at = ? WHERE id = ?")
        .bind(status)
        .bind(timestamp(now))
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound {
            entity: "Order",
            id: id.to_string(),
        });
    }

    get_order(pool, id).await
}

/// Cancel an order.
///
/// Delivered orders cannot be cancelled. Cancelling twice is not an error.
pub async fn cancel_order(
    pool: &SqlitePool,
    id: &str,
    reason: Option<&str>,
    now: DateTime<Utc>,
) -> Result<CancelOutcome> {
    let order = get_order(pool, id).await?;

    match order.status {
        OrderStatus::Delivered => Err(DatabaseError::InvalidState {
            entity: "Order",
            id: order.id,
            reason: "order was already delivered".to_string(),
        }),
        OrderStatus::Cancelled => Ok(CancelOutcome::AlreadyCancelled(order)),
        _ => {
            sqlx::query(
                "UPDATE orders SET status = 'cancelled', cancel_reason = ?, updated_at = ? WHERE id = ?",
            )
            .bind(reason)
            .bind(timestamp(now))
            .bind(&order.id)
            .execute(pool)
            .await?;

            info!(order_id = %order.id, "Order cancelled");
            Ok(CancelOutcome::Cancelled(get_order(pool, &order.id).await?))
        }
    }
}
