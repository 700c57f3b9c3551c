//! Tool registry and service-desk tools.
//!
//! This crate provides a [`ToolRegistry`] holding the tools a persona may
//! call, and the tools themselves. Every tool declares a JSON schema; the
//! registry validates arguments against it, applies the retry policy to
//! read-only tools and converts every error into a [`ToolOutput::Failure`],
//! so executing a tool never fails.
//!
//! The [`RegistryToolExecutor`] adapter exposes the registry to a model as a
//! `brain_core::ToolExecutor`, restricted to the tools a persona is allowed
//! to use.
//!
//! # Tools
//!
//! ## Upstream (billing system)
//! - [`GetDebt`] - Outstanding balance with the most recent charges.
//! - [`GetConsumption`] - Consumption history, monthly average and trend.
//! - [`GetContractDetails`] - Holder, address, tariff and service status.
//! - [`GetConsumptionPrediction`] - Next-period forecast.
//!
//! ## Local store
//! - [`CreateTicket`], [`GetClientTickets`], [`GetTicket`], [`UpdateTicket`]
//! - [`SearchCustomerByContract`]
//! - [`ReportIncident`] (ordered backend chain), [`GetIncidents`]
//! - [`ListOrders`], [`CreateOrder`], [`GetOrder`], [`CancelOrder`]
//! - [`GetServiceAlerts`]
//!
//! # Example
//!
//! ```rust,ignore
//! use agent_tools::{default_registry, names, DeskServices};
//! use brain_core::ToolRequestMeta;
//! use serde_json::json;
//! use std::collections::HashMap;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let services = DeskServices::from_env().await?;
//!     let registry = default_registry(&services);
//!
//!     let params = HashMap::from([("contract_number".to_string(), json!("123456"))]);
//!     let output = registry.execute(names::GET_DEBT, params, ToolRequestMeta::default()).await;
//!     println!("{}", output.to_json());
//!     Ok(())
//! }
//! ```

mod error;
mod executor;
mod registry;
mod tool;
pub mod tools;

use std::env;
use std::sync::Arc;

use database::{parse_utc_offset, Database, FolioGenerator};
use tracing::{info, warn};
use upstream_api::UpstreamClient;

pub use error::ToolError;
pub use executor::{RegistryToolExecutor, ToolPolicy};
pub use registry::{RetryPolicy, ToolRegistry};
pub use tool::{FailureKind, Tool, ToolArgs, ToolKind, ToolOutput, CONTRACT_SLOT, LOCALITY_SLOT};
pub use tools::{
    CancelOrder, CreateOrder, CreateTicket, DatabaseIncidentBackend, GetClientTickets,
    GetConsumption, GetConsumptionPrediction, GetContractDetails, GetDebt, GetIncidents, GetOrder,
    GetServiceAlerts, GetTicket, IncidentBackend, IncidentBackendConfig, ListOrders,
    ReportIncident, SearchCustomerByContract, UpdateTicket, WebhookIncidentBackend,
};

// Re-export async_trait for convenience
pub use async_trait::async_trait;

/// Tool names as the model sees them.
pub mod names {
    pub const GET_DEBT: &str = "get_debt";
    pub const GET_CONSUMPTION: &str = "get_consumption";
    pub const GET_CONTRACT_DETAILS: &str = "get_contract_details";
    pub const GET_CONSUMPTION_PREDICTION: &str = "get_consumption_prediction";
    pub const CREATE_TICKET: &str = "create_ticket";
    pub const GET_CLIENT_TICKETS: &str = "get_client_tickets";
    pub const GET_TICKET: &str = "get_ticket";
    pub const UPDATE_TICKET: &str = "update_ticket";
    pub const SEARCH_CUSTOMER_BY_CONTRACT: &str = "search_customer_by_contract";
    pub const REPORT_INCIDENT: &str = "report_incident";
    pub const GET_INCIDENTS: &str = "get_incidents";
    pub const LIST_ORDERS: &str = "list_orders";
    pub const CREATE_ORDER: &str = "create_order";
    pub const GET_ORDER: &str = "get_order";
    pub const CANCEL_ORDER: &str = "cancel_order";
    pub const GET_SERVICE_ALERTS: &str = "get_service_alerts";
}

/// Backing services the tools run against.
#[derive(Clone)]
pub struct DeskServices {
    /// Billing system client. Upstream tools are not registered without it.
    pub upstream: Option<UpstreamClient>,
    pub db: Database,
    pub folios: FolioGenerator,
    /// Incident backends, in preference order.
    pub incident_backends: Vec<Arc<dyn IncidentBackend>>,
}

impl DeskServices {
    /// Services over a database, with the database as the only incident
    /// backend and no upstream client.
    pub fn new(db: Database) -> Self {
        Self {
            upstream: None,
            incident_backends: vec![Arc::new(DatabaseIncidentBackend::new(db.clone()))],
            folios: FolioGenerator::default(),
            db,
        }
    }

    pub fn with_upstream(mut self, client: UpstreamClient) -> Self {
        self.upstream = Some(client);
        self
    }

    pub fn with_folios(mut self, folios: FolioGenerator) -> Self {
        self.folios = folios;
        self
    }

    pub fn with_incident_backends(mut self, backends: Vec<Arc<dyn IncidentBackend>>) -> Self {
        self.incident_backends = backends;
        self
    }

    /// Build services from environment variables.
    ///
    /// - `DATABASE_URL` - SQLite URL (migrations are applied)
    /// - `UPSTREAM_API_URL` and friends - see `UpstreamConfig::from_env`
    /// - `BUSINESS_UTC_OFFSET` - folio timezone, e.g. `-06:00` (default)
    /// - `INCIDENT_BACKEND_ORDER` / `INCIDENT_WEBHOOK_URL`
    pub async fn from_env() -> Result<Self, ToolError> {
        let db = Database::from_env().await?;
        db.migrate().await?;

        let mut folios = FolioGenerator::default();
        if let Ok(raw) = env::var("BUSINESS_UTC_OFFSET") {
            match parse_utc_offset(&raw) {
                Some(offset) => folios = FolioGenerator::new(offset),
                None => warn!(value = %raw, "Invalid BUSINESS_UTC_OFFSET, using default"),
            }
        }

        let upstream = match UpstreamClient::from_env() {
            Ok(client) => Some(client),
            Err(e) => {
                warn!(error = %e, "Upstream client not configured, billing tools disabled");
                None
            }
        };

        let http = reqwest::Client::new();
        let incident_backends = IncidentBackendConfig::from_env().build(&db, &http);

        Ok(Self {
            upstream,
            db,
            folios,
            incident_backends,
        })
    }

    /// The ticket tool, for callers that open tickets outside a model turn.
    pub fn ticket_creator(&self) -> CreateTicket {
        CreateTicket::new(self.db.clone(), self.folios)
    }
}

/// Create a registry with every service-desk tool registered.
pub fn default_registry(services: &DeskServices) -> ToolRegistry {
    let mut registry = ToolRegistry::with_retry_policy(RetryPolicy::from_env());

    if let Some(client) = &services.upstream {
        registry.register(GetDebt::new(client.clone()));
        registry.register(GetConsumption::new(client.clone()));
        registry.register(GetContractDetails::new(client.clone()));
        registry.register(GetConsumptionPrediction::new(client.clone()));
    }

    let db = &services.db;
    registry.register(services.ticket_creator());
    registry.register(GetClientTickets::new(db.clone()));
    registry.register(GetTicket::new(db.clone()));
    registry.register(UpdateTicket::new(db.clone()));
    registry.register(SearchCustomerByContract::new(db.clone()));
    registry.register(ReportIncident::new(
        services.incident_backends.clone(),
        services.folios.offset(),
    ));
    registry.register(GetIncidents::new(db.clone()));
    registry.register(ListOrders::new(db.clone()));
    registry.register(CreateOrder::new(db.clone()));
    registry.register(GetOrder::new(db.clone()));
    registry.register(CancelOrder::new(db.clone()));
    registry.register(GetServiceAlerts::new(db.clone()));

    info!(tools = registry.list_tools().len(), "Tool registry ready");
    registry
}
