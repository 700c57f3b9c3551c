//! SQLite persistence for the service desk.
//!
//! This crate stores tickets, customers, incidents, water-delivery orders
//! and service alerts using SQLx with SQLite, and allocates ticket folios.
//!
//! # Example
//!
//! ```no_run
//! use chrono::Utc;
//! use database::{ticket, Database, FolioGenerator, NewTicket, TicketCategory};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Connect and run migrations
//!     let db = Database::connect("sqlite:data/desk.db?mode=rwc").await?;
//!     db.migrate().await?;
//!
//!     // Open a ticket
//!     let new = NewTicket {
//!         category: TicketCategory::Leak,
//!         title: "Fuga en banqueta".to_string(),
//!         description: "Sale agua frente al domicilio".to_string(),
//!         ..Default::default()
//!     };
//!     let ticket = ticket::create_ticket(db.pool(), &FolioGenerator::default(), &new, Utc::now()).await?;
//!     println!("Folio: {}", ticket.folio);
//!
//!     Ok(())
//! }
//! ```

pub mod alert;
pub mod customer;
pub mod error;
pub mod folio;
pub mod incident;
pub mod models;
pub mod order;
pub mod ticket;

pub use error::{DatabaseError, Result};
pub use folio::{is_valid_folio, parse_utc_offset, FolioGenerator};
pub use models::{
    AlertKind, Customer, Incident, IncidentCategory, IncidentSeverity, IncidentStatus, NewIncident,
    NewOrder, NewTicket, Order, OrderStatus, ServiceAlert, SeveritySignals, Ticket,
    TicketCategory, TicketPriority, TicketStatus, TicketUpdate,
};
pub use order::CancelOutcome;

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::{info, warn};

/// Used when `DATABASE_URL` is unset.
pub const DEFAULT_DATABASE_URL: &str = "sqlite:data/desk.db?mode=rwc";

/// Connections per pool unless `DATABASE_POOL_SIZE` overrides it.
pub const DEFAULT_POOL_SIZE: u32 = 8;

/// Handle to the desk's SQLite pool. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open `url` (for example `sqlite:data/desk.db?mode=rwc` or
    /// `sqlite::memory:`), creating the file when missing.
    pub async fn connect(url: &str) -> Result<Self> {
        Self::open(url, DEFAULT_POOL_SIZE).await
    }

    /// Open the database named by `DATABASE_URL` (default
    /// [`DEFAULT_DATABASE_URL`]) with `DATABASE_POOL_SIZE` connections.
    pub async fn from_env() -> Result<Self> {
        let url = std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string());
        let pool_size = match std::env::var("DATABASE_POOL_SIZE") {
            Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
                warn!(value = %raw, "Invalid DATABASE_POOL_SIZE, using default");
                DEFAULT_POOL_SIZE
            }),
            Err(_) => DEFAULT_POOL_SIZE,
        };
        Self::open(&url, pool_size.max(1)).await
    }

    async fn open(url: &str, pool_size: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(pool_size)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await?;

        info!(url, pool_size, "Database pool open");
        Ok(Self { pool })
    }

    /// Apply pending schema migrations. Safe to call on every start.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database schema up to date");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close every connection. Later queries fail with
    /// [`DatabaseError::Unavailable`].
    pub async fn close(&self) {
        self.pool.close().await;
        warn!("Database pool closed");
    }
}
