//! Database models.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Render a timestamp the way every table stores it (`2024-05-01T12:00:00Z`).
///
/// A single fixed format keeps text comparison equivalent to time comparison.
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Default channel for records created from conversations.
pub const DEFAULT_CHANNEL: &str = "whatsapp";

/// Ticket category. Each category owns a 3-letter folio code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum TicketCategory {
    Leak,
    Payment,
    MeterReading,
    ReceiptReview,
    DigitalReceipt,
    #[default]
    Clarifications,
    Urgent,
}

impl TicketCategory {
    pub const ALL: [TicketCategory; 7] = [
        TicketCategory::Leak,
        TicketCategory::Payment,
        TicketCategory::MeterReading,
        TicketCategory::ReceiptReview,
        TicketCategory::DigitalReceipt,
        TicketCategory::Clarifications,
        TicketCategory::Urgent,
    ];

    /// Folio code for this category.
    pub fn code(&self) -> &'static str {
        match self {
            TicketCategory::Leak => "FUG",
            TicketCategory::Payment => "PAG",
            TicketCategory::MeterReading => "LEC",
            TicketCategory::ReceiptReview => "REV",
            TicketCategory::DigitalReceipt => "DIG",
            TicketCategory::Clarifications => "ACL",
            TicketCategory::Urgent => "URG",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TicketCategory::Leak => "leak",
            TicketCategory::Payment => "payment",
            TicketCategory::MeterReading => "meter_reading",
            TicketCategory::ReceiptReview => "receipt_review",
            TicketCategory::DigitalReceipt => "digital_receipt",
            TicketCategory::Clarifications => "clarifications",
            TicketCategory::Urgent => "urgent",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == raw.trim())
    }
}

/// Ticket lifecycle status.
///
/// `Closed` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum TicketStatus {
    Open,
    InProgress,
    WaitingClient,
    WaitingInternal,
    Escalated,
    Resolved,
    Closed,
    Cancelled,
}

impl TicketStatus {
    pub const ALL: [TicketStatus; 8] = [
        TicketStatus::Open,
        TicketStatus::InProgress,
        TicketStatus::WaitingClient,
        TicketStatus::WaitingInternal,
        TicketStatus::Escalated,
        TicketStatus::Resolved,
        TicketStatus::Closed,
        TicketStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Open => "open",
            TicketStatus::InProgress => "in_progress",
            TicketStatus::WaitingClient => "waiting_client",
            TicketStatus::WaitingInternal => "waiting_internal",
            TicketStatus::Escalated => "escalated",
            TicketStatus::Resolved => "resolved",
            TicketStatus::Closed => "closed",
            TicketStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == raw.trim())
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TicketStatus::Closed | TicketStatus::Cancelled)
    }
}

/// Ticket priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum TicketPriority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl TicketPriority {
    pub const ALL: [TicketPriority; 4] = [
        TicketPriority::Low,
        TicketPriority::Medium,
        TicketPriority::High,
        TicketPriority::Urgent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TicketPriority::Low => "low",
            TicketPriority::Medium => "medium",
            TicketPriority::High => "high",
            TicketPriority::Urgent => "urgent",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == raw.trim())
    }
}

/// A support ticket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Ticket {
    /// Internal UUID.
    pub id: String,
    /// Public identifier (e.g., "FUG-20240501-0003").
    pub folio: String,
    pub category: TicketCategory,
    pub title: String,
    pub description: String,
    pub status: TicketStatus,
    pub priority: TicketPriority,
    pub contract_number: Option<String>,
    pub client_name: Option<String>,
    pub client_email: Option<String>,
    /// Free-text location.
    pub location: Option<String>,
    pub channel: String,
    /// Timestamped note lines, oldest first.
    pub notes: String,
    pub created_at: String,
    pub updated_at: String,
    pub resolved_at: Option<String>,
}

/// Fields supplied when opening a ticket.
#[derive(Debug, Clone, Default)]
pub struct NewTicket {
    pub category: TicketCategory,
    pub title: String,
    pub description: String,
    pub priority: TicketPriority,
    pub contract_number: Option<String>,
    pub client_name: Option<String>,
    pub client_email: Option<String>,
    pub location: Option<String>,
    pub channel: Option<String>,
}

/// Partial ticket update. `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct TicketUpdate {
    pub status: Option<TicketStatus>,
    pub priority: Option<TicketPriority>,
    /// Note to append.
    pub note: Option<String>,
}

impl TicketUpdate {
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.priority.is_none() && self.note.is_none()
    }
}

/// A customer of the utility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Customer {
    pub id: String,
    pub contract_number: String,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    /// Custom fields as a JSON object.
    pub metadata: String,
    pub created_at: String,
}

impl Customer {
    /// Custom fields parsed as JSON. Unreadable metadata yields `Null`.
    pub fn metadata_value(&self) -> serde_json::Value {
        serde_json::from_str(&self.metadata).unwrap_or(serde_json::Value::Null)
    }
}

/// Incident category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum IncidentCategory {
    Leak,
    NoWater,
    LowPressure,
    Sewage,
    Contamination,
    Other,
}

impl IncidentCategory {
    pub const ALL: [IncidentCategory; 6] = [
        IncidentCategory::Leak,
        IncidentCategory::NoWater,
        IncidentCategory::LowPressure,
        IncidentCategory::Sewage,
        IncidentCategory::Contamination,
        IncidentCategory::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentCategory::Leak => "leak",
            IncidentCategory::NoWater => "no_water",
            IncidentCategory::LowPressure => "low_pressure",
            IncidentCategory::Sewage => "sewage",
            IncidentCategory::Contamination => "contamination",
            IncidentCategory::Other => "other",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == raw.trim())
    }
}

/// Incident severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum IncidentSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// Signals reported with an incident, used to derive its severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeveritySignals {
    /// More than one household is affected.
    pub affects_many: bool,
    /// Water is flooding the street or a property.
    pub is_flooding: bool,
    /// Water looks, smells or tastes wrong.
    pub water_quality: bool,
}

impl IncidentSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentSeverity::Low => "low",
            IncidentSeverity::Medium => "medium",
            IncidentSeverity::High => "high",
            IncidentSeverity::Critical => "critical",
        }
    }

    /// Derive severity from the category and reported signals.
    pub fn derive(category: IncidentCategory, signals: SeveritySignals) -> Self {
        let quality = signals.water_quality || category == IncidentCategory::Contamination;

        if (signals.is_flooding || quality) && signals.affects_many {
            return IncidentSeverity::Critical;
        }
        if signals.is_flooding || quality || category == IncidentCategory::Sewage {
            return IncidentSeverity::High;
        }
        if signals.affects_many
            || matches!(category, IncidentCategory::Leak | IncidentCategory::NoWater)
        {
            return IncidentSeverity::Medium;
        }
        IncidentSeverity::Low
    }
}

/// Incident status: pending -> acknowledged -> in_progress -> resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum IncidentStatus {
    Pending,
    Acknowledged,
    InProgress,
    Resolved,
}

impl IncidentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentStatus::Pending => "pending",
            IncidentStatus::Acknowledged => "acknowledged",
            IncidentStatus::InProgress => "in_progress",
            IncidentStatus::Resolved => "resolved",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            IncidentStatus::Pending => 0,
            IncidentStatus::Acknowledged => 1,
            IncidentStatus::InProgress => 2,
            IncidentStatus::Resolved => 3,
        }
    }

    /// Incidents only move forward.
    pub fn can_advance_to(&self, next: IncidentStatus) -> bool {
        next.rank() > self.rank()
    }
}

/// A reported incident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Incident {
    /// Identifier (e.g., "INC-20240501-3F9A1C2B").
    pub id: String,
    pub category: IncidentCategory,
    pub description: String,
    pub severity: IncidentSeverity,
    pub status: IncidentStatus,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub address: Option<String>,
    pub locality: Option<String>,
    pub contract_number: Option<String>,
    pub reporter_name: Option<String>,
    pub reporter_phone: Option<String>,
    pub channel: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Fields supplied when reporting an incident.
#[derive(Debug, Clone, Serialize)]
pub struct NewIncident {
    pub category: IncidentCategory,
    pub description: String,
    pub severity: IncidentSeverity,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub address: Option<String>,
    pub locality: Option<String>,
    pub contract_number: Option<String>,
    pub reporter_name: Option<String>,
    pub reporter_phone: Option<String>,
    pub channel: Option<String>,
}

/// Water-delivery order status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Accepted,
    InTransit,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Accepted => "accepted",
            OrderStatus::InTransit => "in_transit",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

/// A water-delivery order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Order {
    pub id: String,
    pub contract_number: String,
    pub address: String,
    pub locality: Option<String>,
    /// Requested volume in cubic meters.
    pub volume_m3: f64,
    pub status: OrderStatus,
    pub notes: Option<String>,
    pub cancel_reason: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Fields supplied when placing an order.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub contract_number: String,
    pub address: String,
    pub locality: Option<String>,
    pub volume_m3: f64,
    pub notes: Option<String>,
}

/// Kind of service alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum AlertKind {
    Outage,
    LowPressure,
    Maintenance,
    Quality,
}

/// A scheduled or ongoing service disruption in a locality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ServiceAlert {
    pub id: i64,
    pub locality: String,
    pub kind: AlertKind,
    pub message: String,
    pub starts_at: String,
    /// Open-ended when absent.
    pub ends_at: Option<String>,
}
