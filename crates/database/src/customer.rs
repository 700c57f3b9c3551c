//! Customer lookups.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::{map_insert_error, Result};
use crate::models::{timestamp, Customer};

/// Register a customer.
#[allow(clippy::too_many_arguments)]
pub async fn create_customer(
    pool: &SqlitePool,
    contract_number: &str,
    name: &str,
    email: Option<&str>,
    phone: Option<&str>,
    address: Option<&str>,
    metadata: &serde_json::Value,
    now: DateTime<Utc>,
) -> Result<Customer> {
    let id = Uuid::new_v4().to_string();

    sqlx::query(
        r#"
        INSERT INTO customers (id, contract_number, name, email, phone, address, metadata, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(contract_number)
    .bind(name)
    .bind(email)
    .bind(phone)
    .bind(address)
    .bind(metadata.to_string())
    .bind(timestamp(now))
    .execute(pool)
    .await
    .map_err(|e| map_insert_error(e, "Customer", contract_number))?;

    Ok(Customer {
        id,
        contract_number: contract_number.to_string(),
        name: name.to_string(),
        email: email.map(str::to_string),
        phone: phone.map(str::to_string),
        address: address.map(str::to_string),
        metadata: metadata.to_string(),
        created_at: timestamp(now),
    })
}

/// Find a customer by contract number.
///
/// Matches the contract column or a `contract_number` custom field. A miss
/// is `Ok(None)`, not an error.
pub async fn find_by_contract(pool: &SqlitePool, contract_number: &str) -> Result<Option<Customer>> {
    let contract_number = contract_number.trim();
    let customer = sqlx::query_as::<_, Customer>(
        r#"
        SELECT id, contract_number, name, email, phone, address, metadata, created_at
        FROM customers
        WHERE contract_number = ?
           OR (json_valid(metadata) AND CAST(json_extract(metadata, '$.contract_number') AS TEXT) = ?)
        ORDER BY contract_number = ? DESC
        LIMIT 1
        "#,
    )
    .bind(contract_number)
    .bind(contract_number)
    .bind(contract_number)
    .fetch_optional(pool)
    .await?;

    Ok(customer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DatabaseError};
    use serde_json::json;

    async fn test_db() -> Database {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db.migrate().await.unwrap();
        db
    }

    #[tokio::test]
    async fn test_find_by_contract_column() {
        let db = test_db().await;
        create_customer(
            db.pool(),
            "123456",
            "María López",
            Some("maria@example.com"),
            None,
            Some("Av. Juárez 10"),
            &json!({}),
            Utc::now(),
        )
        .await
        .unwrap();

        let found = find_by_contract(db.pool(), " 123456 ").await.unwrap().unwrap();
        assert_eq!(found.name, "María López");
        assert_eq!(found.email.as_deref(), Some("maria@example.com"));
    }

    #[tokio::test]
    async fn test_find_by_custom_field() {
        let db = test_db().await;
        create_customer(
            db.pool(),
            "CL-0099",
            "Juan Pérez",
            None,
            Some("+5215550000000"),
            None,
            &json!({ "contract_number": "654321" }),
            Utc::now(),
        )
        .await
        .unwrap();

        let found = find_by_contract(db.pool(), "654321").await.unwrap().unwrap();
        assert_eq!(found.contract_number, "CL-0099");
        assert_eq!(found.metadata_value()["contract_number"], "654321");
    }

    #[tokio::test]
    async fn test_missing_customer_is_none() {
        let db = test_db().await;
        assert!(find_by_contract(db.pool(), "000000").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_contract_rejected() {
        let db = test_db().await;
        let create = |name: &'static str| {
            let pool = db.pool().clone();
            async move {
                create_customer(&pool, "1", name, None, None, None, &json!({}), Utc::now()).await
            }
        };
        create("A").await.unwrap();
        assert!(matches!(
            create("B").await,
            Err(DatabaseError::AlreadyExists { .. })
        ));
    }
}
